// ABOUTME: Static description of what a schema reads and what it produces
// ABOUTME: Lists source columns per table and the JSON shape of built objects

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::schema::{RootSchema, Schema};

/// Columns of one source table the schema depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumns {
    pub table: String,
    pub columns: Vec<String>,
}

/// Shape of a built object, after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutputShape {
    Column {
        table: String,
        column: String,
    },
    Object {
        #[serde(serialize_with = "serialize_entries")]
        properties: Vec<(String, OutputShape)>,
    },
    Array {
        items: Box<OutputShape>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Introspection {
    pub tables: Vec<TableColumns>,
    pub output: OutputShape,
}

fn serialize_entries<S: Serializer>(
    entries: &[(String, OutputShape)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (name, shape) in entries {
        map.serialize_entry(name, shape)?;
    }
    map.end()
}

/// Describes the tables and columns `root` reads and the shape it outputs.
///
/// Tables are listed in first-use order with the root table first and its
/// primary key as its first column.
pub fn introspect(root: &RootSchema) -> Introspection {
    let mut tables = vec![TableColumns {
        table: root.table.clone(),
        columns: vec![root.primary_key.clone()],
    }];
    let mut uses = Vec::new();
    let output = describe(&root.schema, &root.table, &mut uses);

    for (table, column) in uses {
        let position = tables.iter().position(|entry| entry.table == table);
        let entry = match position {
            Some(index) => &mut tables[index],
            None => {
                tables.push(TableColumns {
                    table: table.to_string(),
                    columns: Vec::new(),
                });
                let last = tables.len() - 1;
                &mut tables[last]
            }
        };
        if !entry.columns.iter().any(|existing| existing == column) {
            entry.columns.push(column.to_string());
        }
    }

    Introspection { tables, output }
}

/// Returns the shape of `schema` read from `table`, appending every
/// `(table, column)` it touches to `uses`. Related tables are recorded
/// before the join columns that lead to them.
fn describe<'a>(
    schema: &'a Schema,
    table: &'a str,
    uses: &mut Vec<(&'a str, &'a str)>,
) -> OutputShape {
    match schema {
        Schema::Column(s) => {
            uses.push((table, s.column.as_str()));
            OutputShape::Column {
                table: table.to_string(),
                column: s.column.clone(),
            }
        }
        Schema::Object(s) => OutputShape::Object {
            properties: s
                .properties
                .iter()
                .map(|(name, property)| (name.to_string(), describe(property, table, uses)))
                .collect(),
        },
        Schema::ManyToOne(s) => {
            let output = describe(&s.schema, &s.references_table, uses);
            uses.push((table, s.column.as_str()));
            uses.push((s.references_table.as_str(), s.references_column.as_str()));
            output
        }
        Schema::OneToMany(s) => {
            let items = match describe(&s.schema, &s.referencing_table, uses) {
                OutputShape::Array { items } => items,
                other => Box::new(other),
            };
            uses.push((table, s.column.as_str()));
            uses.push((s.referencing_table.as_str(), s.referencing_column.as_str()));
            OutputShape::Array { items }
        }
    }
}
