// ABOUTME: Row-level change events as delivered by the replication feed
// ABOUTME: Computes changed columns and extracts ids from row images

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::id_string;

/// A row image keyed by column name.
pub type RowData = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Insert,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Insert => "INSERT",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        }
    }
}

/// One observed change to one row.
///
/// INSERT carries `data`, DELETE carries `data_old`, UPDATE carries both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub table: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RowData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_old: Option<RowData>,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, data: RowData) -> Self {
        Self {
            table: table.into(),
            action: Action::Insert,
            data: Some(data),
            data_old: None,
        }
    }

    pub fn update(table: impl Into<String>, data: RowData, data_old: RowData) -> Self {
        Self {
            table: table.into(),
            action: Action::Update,
            data: Some(data),
            data_old: Some(data_old),
        }
    }

    pub fn delete(table: impl Into<String>, data_old: RowData) -> Self {
        Self {
            table: table.into(),
            action: Action::Delete,
            data: None,
            data_old: Some(data_old),
        }
    }

    /// Columns whose new value differs from the old one. Empty unless this
    /// is an UPDATE.
    pub fn changed_columns(&self) -> Vec<&str> {
        let (Action::Update, Some(data)) = (self.action, &self.data) else {
            return Vec::new();
        };
        data.iter()
            .filter(|(column, value)| {
                self.data_old
                    .as_ref()
                    .and_then(|old| old.get(column.as_str()))
                    != Some(*value)
            })
            .map(|(column, _)| column.as_str())
            .collect()
    }

    /// The id values of `column` in the new then old row image, read with
    /// [`id_string`]. Other values and missing columns are skipped.
    pub fn string_values(&self, column: &str) -> Vec<String> {
        [self.data.as_ref(), self.data_old.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|row| row.get(column))
            .filter_map(id_string)
            .collect()
    }
}
