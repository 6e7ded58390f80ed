//! `-o custom-columns=HEADER:expr,...` and `-o custom-columns-file=path`.

use std::io::Write;

use orka_core::object;
use serde_json::Value;

use crate::jsonpath::{relaxed_expression, JsonPath};
use crate::{text_of, PrintError, PrinterKind, ResourcePrinter};

const NONE: &str = "<none>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub header: String,
    /// Braced JSONPath, e.g. `{.metadata.name}`.
    pub field_spec: String,
}

/// Parse the inline `HEADER:expr,HEADER:expr` form.
pub fn parse_spec(spec: &str) -> Result<Vec<Column>, PrintError> {
    spec.split(',')
        .map(|part| {
            let (header, expr) = part.split_once(':').ok_or_else(|| {
                PrintError::CustomColumns(format!("unexpected custom-columns spec: {}, expected <header>:<json-path-expr>", part))
            })?;
            let field_spec = relaxed_expression(expr).map_err(|e| PrintError::CustomColumns(e.to_string()))?;
            Ok(Column { header: header.to_string(), field_spec })
        })
        .collect()
}

/// Parse the file form: one line of whitespace-separated headers, one line of expressions.
pub fn parse_template(text: &str) -> Result<Vec<Column>, PrintError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let (Some(headers), Some(specs)) = (lines.next(), lines.next()) else {
        return Err(PrintError::CustomColumns(
            "invalid template, missing header line. Expected format is one line of space separated headers, one line of space separated column specs."
                .into(),
        ));
    };
    let headers: Vec<&str> = headers.split_whitespace().collect();
    let specs: Vec<&str> = specs.split_whitespace().collect();
    if headers.len() != specs.len() {
        return Err(PrintError::CustomColumns(format!("expected {} columns, found {}", headers.len(), specs.len())));
    }
    headers
        .into_iter()
        .zip(specs)
        .map(|(h, s)| {
            let field_spec = relaxed_expression(s).map_err(|e| PrintError::CustomColumns(e.to_string()))?;
            Ok(Column { header: h.to_string(), field_spec })
        })
        .collect()
}

pub struct CustomColumnsPrinter {
    headers: Vec<String>,
    paths: Vec<JsonPath>,
    no_headers: bool,
    header_printed: bool,
}

impl CustomColumnsPrinter {
    pub fn new(columns: Vec<Column>, no_headers: bool) -> Result<Self, PrintError> {
        let mut headers = Vec::with_capacity(columns.len());
        let mut paths = Vec::with_capacity(columns.len());
        for c in columns {
            let path = JsonPath::parse(&c.field_spec)
                .map_err(|e| PrintError::JsonPath { expr: c.field_spec.clone(), reason: e.to_string() })?
                .allow_missing_keys(true);
            headers.push(c.header);
            paths.push(path);
        }
        Ok(Self { headers, paths, no_headers, header_printed: false })
    }

    fn row(&self, obj: &Value, out: &mut dyn Write) -> Result<(), PrintError> {
        let mut cells = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let results = path
                .find_results(obj)
                .map_err(|e| PrintError::Render(format!("error executing jsonpath {:?}: {}", path.source(), e)))?;
            let values: Vec<String> = results.iter().flatten().map(text_of).collect();
            cells.push(if values.is_empty() { NONE.to_string() } else { values.join(",") });
        }
        writeln!(out, "{}", cells.join("\t"))?;
        Ok(())
    }
}

impl ResourcePrinter for CustomColumnsPrinter {
    fn print_obj(&mut self, obj: &Value, out: &mut dyn Write) -> Result<(), PrintError> {
        if !self.no_headers && !self.header_printed {
            writeln!(out, "{}", self.headers.join("\t"))?;
            self.header_printed = true;
        }
        match object::list_items(obj) {
            Some(items) => items.iter().try_for_each(|item| self.row(item, out)),
            None => self.row(obj, out),
        }
    }

    fn is_generic(&self) -> bool {
        false
    }

    fn kind(&self) -> PrinterKind {
        PrinterKind::CustomColumns
    }
}
