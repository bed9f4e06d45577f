// ABOUTME: Declarative description of a denormalized entity spanning several tables
// ABOUTME: Loaded from JSON or TOML, validated once, then shared read-only by both compilers

use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SyncError};

/// How one value of the entity's JSON shape is derived from the current table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Schema {
    /// The current row's column value.
    Column(ColumnSchema),
    /// A JSON object, one key per property, in declaration order.
    Object(ObjectSchema),
    /// Belongs-to: follow `column` to the row of `references_table` whose
    /// `references_column` matches, and project `schema` from it.
    ManyToOne(ManyToOneSchema),
    /// Has-many: every row of `referencing_table` whose `referencing_column`
    /// matches `column`, each projected through `schema`, as an array.
    OneToMany(OneToManySchema),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManyToOneSchema {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
    /// An enforced foreign key backs this relation, so inserting or deleting
    /// the referenced row cannot change which rows point at it.
    #[serde(rename = "hasFKConstraint")]
    pub has_fk_constraint: bool,
    pub schema: Box<Schema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneToManySchema {
    pub column: String,
    pub referencing_table: String,
    pub referencing_column: String,
    pub schema: Box<Schema>,
}

/// Object properties in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties(Vec<(String, Schema)>);

impl Properties {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Schema)> {
        self.0.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    pub fn values(&self) -> impl Iterator<Item = &Schema> {
        self.0.iter().map(|(_, schema)| schema)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Schema)> for Properties {
    fn from_iter<T: IntoIterator<Item = (K, Schema)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, schema) in &self.0 {
            map.serialize_entry(name, schema)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Properties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PropertiesVisitor;

        impl<'de> Visitor<'de> for PropertiesVisitor {
            type Value = Properties;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of property names to schemas")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Properties, A::Error> {
                let mut entries: Vec<(String, Schema)> = Vec::new();
                while let Some((name, schema)) = access.next_entry::<String, Schema>()? {
                    if entries.iter().any(|(existing, _)| *existing == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate property '{}'",
                            name
                        )));
                    }
                    entries.push((name, schema));
                }
                Ok(Properties(entries))
            }
        }

        deserializer.deserialize_map(PropertiesVisitor)
    }
}

impl Schema {
    pub fn column(column: impl Into<String>) -> Self {
        Schema::Column(ColumnSchema {
            column: column.into(),
        })
    }

    pub fn object<K: Into<String>>(properties: impl IntoIterator<Item = (K, Schema)>) -> Self {
        Schema::Object(ObjectSchema {
            properties: properties.into_iter().collect(),
        })
    }

    pub fn many_to_one(
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
        has_fk_constraint: bool,
        schema: Schema,
    ) -> Self {
        Schema::ManyToOne(ManyToOneSchema {
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
            has_fk_constraint,
            schema: Box::new(schema),
        })
    }

    pub fn one_to_many(
        column: impl Into<String>,
        referencing_table: impl Into<String>,
        referencing_column: impl Into<String>,
        schema: Schema,
    ) -> Self {
        Schema::OneToMany(OneToManySchema {
            column: column.into(),
            referencing_table: referencing_table.into(),
            referencing_column: referencing_column.into(),
            schema: Box::new(schema),
        })
    }

    /// Columns of the current table this node reads: a column's own column,
    /// a relation's local join column, recursing through objects only.
    pub fn local_columns(&self) -> Vec<&str> {
        match self {
            Schema::Column(s) => vec![s.column.as_str()],
            Schema::ManyToOne(s) => vec![s.column.as_str()],
            Schema::OneToMany(s) => vec![s.column.as_str()],
            Schema::Object(s) => s.properties.values().flat_map(Schema::local_columns).collect(),
        }
    }

    fn validate(&self, table: &str, at: &str) -> Result<()> {
        match self {
            Schema::Column(s) => require("column", &s.column, table, at),
            Schema::Object(s) => {
                for (name, schema) in s.properties.iter() {
                    if name.is_empty() {
                        return Err(SyncError::config(format!(
                            "empty property name in table '{}' at {}",
                            table, at
                        )));
                    }
                    schema.validate(table, &format!("{}.{}", at, name))?;
                }
                Ok(())
            }
            Schema::ManyToOne(s) => {
                require("column", &s.column, table, at)?;
                require("referencesTable", &s.references_table, table, at)?;
                require("referencesColumn", &s.references_column, table, at)?;
                s.schema.validate(&s.references_table, at)
            }
            Schema::OneToMany(s) => {
                require("column", &s.column, table, at)?;
                require("referencingTable", &s.referencing_table, table, at)?;
                require("referencingColumn", &s.referencing_column, table, at)?;
                s.schema.validate(&s.referencing_table, &format!("{}[]", at))
            }
        }
    }
}

fn require(field: &str, value: &str, table: &str, at: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SyncError::config(format!(
            "{} cannot be empty (table '{}' at {})",
            field, table, at
        )));
    }
    Ok(())
}

/// The entity whose ids drive both compilers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootSchema {
    pub table: String,
    pub primary_key: String,
    pub schema: Schema,
}

impl RootSchema {
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>, schema: Schema) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            schema,
        }
    }

    /// Rejects empty table, column and property names.
    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(SyncError::config("root table cannot be empty"));
        }
        if self.primary_key.trim().is_empty() {
            return Err(SyncError::config(format!(
                "primary key of table '{}' cannot be empty",
                self.table
            )));
        }
        self.schema.validate(&self.table, "$")
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let schema: RootSchema = serde_json::from_str(contents)
            .map_err(|e| SyncError::config(format!("invalid schema: {}", e)))?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let schema: RootSchema = toml::from_str(contents)
            .map_err(|e| SyncError::config(format!("invalid schema: {}", e)))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Loads a schema file; `.toml` files are read as TOML, anything else as JSON.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::file(path, e))?;
        let parsed = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            _ => Self::from_json_str(&contents),
        };
        parsed.map_err(|e| match e {
            SyncError::Config(message) => SyncError::file(path, message),
            other => other,
        })
    }
}
