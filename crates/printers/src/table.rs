//! Server-side `meta.k8s.io/v1 Table` objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use orka_core::object;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub column_definitions: Vec<TableColumnDefinition>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableColumnDefinition {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub cells: Vec<Value>,
    /// Partial object metadata the server embeds per row, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TableDecodeError {
    #[error("object is not a Table (kind {0:?})")]
    NotATable(String),
    #[error("failed to decode Table: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Decode a generic object into a [`Table`] when it is one.
pub fn decode_into_table(obj: &Value) -> Result<Table, TableDecodeError> {
    if !object::is_table(obj) {
        return Err(TableDecodeError::NotATable(object::kind(obj).to_string()));
    }
    Ok(Table::deserialize(obj)?)
}

/// Return the decoded table when `prefer` is set and decoding succeeds; otherwise `None`
/// so the caller keeps the original object. Decode failures are only logged.
pub fn substitute_server_table(obj: &Value, prefer: bool) -> Option<Table> {
    if !prefer || !object::is_table(obj) {
        return None;
    }
    match decode_into_table(obj) {
        Ok(t) => Some(t),
        Err(e) => {
            debug!(error = %e, "keeping original object, table decode failed");
            None
        }
    }
}
