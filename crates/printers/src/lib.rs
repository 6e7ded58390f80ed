//! Orka printers: turn an `-o/--output` value into exactly one resource printer
//! and render API objects with it.
//!
//! - [`format`] parses the raw output string into a [`FormatSpec`]
//! - [`resolve`] walks a fixed, ordered list of builders and returns the first match
//! - the printer modules implement [`ResourcePrinter`] for every supported format

#![forbid(unsafe_code)]

use std::fmt;
use std::io::Write;

use serde_json::Value;

pub mod columns;
pub mod custom_columns;
pub mod format;
pub mod human;
pub mod json_yaml;
pub mod jsonpath;
pub mod name;
pub mod resolve;
pub mod table;
pub mod tabwriter;
pub mod template;

pub use format::{FormatKind, FormatSpec};
pub use human::{HumanOptions, HumanTablePrinter};
pub use resolve::{default_builders, resolve, resolve_spec, PrintFlags, PrinterBuilder};
pub use table::{decode_into_table, substitute_server_table, Table, TableDecodeError};
pub use tabwriter::TabWriter;

/// Concrete printer strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrinterKind {
    Json,
    Yaml,
    Name,
    GoTemplate,
    JsonPath,
    CustomColumns,
    HumanTable,
}

/// A strategy that renders one object (or list object) to a sink.
pub trait ResourcePrinter: Send {
    /// Render `obj` to `out`. Errors are scoped to this object; the printer stays usable.
    fn print_obj(&mut self, obj: &Value, out: &mut dyn Write) -> Result<(), PrintError>;

    /// Generic printers render objects in whatever version they arrive in, so callers
    /// need not convert them for display first.
    fn is_generic(&self) -> bool;

    /// Trailing summary after all objects were printed.
    fn after_print(&mut self, _out: &mut dyn Write, _note: &str) -> Result<(), PrintError> {
        Ok(())
    }

    fn kind(&self) -> PrinterKind;
}

impl fmt::Debug for dyn ResourcePrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePrinter").field("kind", &self.kind()).finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PrintError {
    #[error("output format {0:?} not recognized")]
    UnrecognizedFormat(String),
    #[error("{0}")]
    MissingArgument(String),
    #[error("error reading {path}: {reason}")]
    ReadFile { path: String, reason: String },
    #[error("error parsing template {template}: {reason}")]
    Template { template: String, reason: String },
    #[error("error parsing jsonpath {expr}: {reason}")]
    JsonPath { expr: String, reason: String },
    #[error("{0}")]
    CustomColumns(String),
    #[error("{0}")]
    MissingKey(String),
    #[error("{0}")]
    Render(String),
    #[error("failed to encode object: {0}")]
    Encode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PrintError {
    /// No builder recognised the output format.
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, PrintError::UnrecognizedFormat(_))
    }

    /// A builder matched but could not construct its printer.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            PrintError::MissingArgument(_)
                | PrintError::ReadFile { .. }
                | PrintError::Template { .. }
                | PrintError::JsonPath { .. }
                | PrintError::CustomColumns(_)
        )
    }
}

/// Plain-text rendering of a scalar or structure: strings verbatim, everything else as JSON.
pub(crate) fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxed_printers_debug_as_their_kind() {
        let printer = resolve("name", &PrintFlags::new()).unwrap();
        assert_eq!(format!("{:?}", printer), "ResourcePrinter { kind: Name }");
    }
}
