//! Human-readable tables.
//!
//! Objects are either server-side [`Table`]s or plain API objects rendered through the
//! built-in column registry. The header row is printed once per contiguous run of the
//! same kind; a kind change prints a blank line and a fresh header.

use std::io::Write;

use chrono::{DateTime, Utc};
use orka_core::object;
use serde_json::Value;

use crate::columns::{builtin_columns_for, builtin_projector_for, ColumnKind, ColumnSpec};
use crate::table::{decode_into_table, Table, TableRow};
use crate::{PrintError, PrinterKind, ResourcePrinter};

const NONE: &str = "<none>";
static NULL: Value = Value::Null;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HumanOptions {
    pub no_headers: bool,
    /// Prepend a NAMESPACE column (`--all-namespaces`).
    pub with_namespace: bool,
    /// Prefix names with their kind, e.g. `pod/web-1`.
    pub with_kind: bool,
    /// Append a LABELS column.
    pub show_labels: bool,
    /// Print timestamps verbatim instead of as ages.
    pub absolute_timestamps: bool,
    pub wide: bool,
    /// One extra column per label key (`-L`).
    pub column_labels: Vec<String>,
}

pub struct HumanTablePrinter {
    options: HumanOptions,
    last_group: Option<String>,
    rows_printed: usize,
    now: Option<DateTime<Utc>>,
}

impl HumanTablePrinter {
    pub fn new(options: HumanOptions) -> Self {
        Self { options, last_group: None, rows_printed: 0, now: None }
    }

    /// Pin the clock used for ages.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    fn age(&self, ts: Option<&str>) -> String {
        if self.options.absolute_timestamps {
            return ts.unwrap_or(NONE).to_string();
        }
        translate_timestamp(ts, self.now())
    }

    /// Print the header when `group` starts a new run.
    fn begin_group(&mut self, group: &str, headers: &[String], out: &mut dyn Write) -> Result<(), PrintError> {
        if self.last_group.as_deref() == Some(group) {
            return Ok(());
        }
        if self.last_group.is_some() && !self.options.no_headers && self.rows_printed > 0 {
            writeln!(out)?;
        }
        self.last_group = Some(group.to_string());
        if !self.options.no_headers {
            writeln!(out, "{}", headers.join("\t"))?;
        }
        Ok(())
    }

    fn decorate_headers(&self, mut core: Vec<String>) -> Vec<String> {
        let mut headers = Vec::with_capacity(core.len() + 2 + self.options.column_labels.len());
        if self.options.with_namespace {
            headers.push("NAMESPACE".to_string());
        }
        headers.append(&mut core);
        for key in &self.options.column_labels {
            let last = key.rsplit('/').next().unwrap_or(key);
            headers.push(last.to_uppercase());
        }
        if self.options.show_labels {
            headers.push("LABELS".to_string());
        }
        headers
    }

    /// Wrap core cells with namespace, label-column and labels cells taken from `meta`.
    fn decorate_row(&self, meta: Option<&Value>, mut core: Vec<String>) -> Vec<String> {
        let mut row = Vec::with_capacity(core.len() + 2 + self.options.column_labels.len());
        if self.options.with_namespace {
            row.push(meta.and_then(object::namespace).unwrap_or_default().to_string());
        }
        row.append(&mut core);
        let labels = meta.map(object::labels).unwrap_or_default();
        for key in &self.options.column_labels {
            row.push(labels.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()).unwrap_or_default());
        }
        if self.options.show_labels {
            if labels.is_empty() {
                row.push(NONE.to_string());
            } else {
                let pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                row.push(pairs.join(","));
            }
        }
        row
    }

    fn print_resource(&mut self, obj: &Value, out: &mut dyn Write) -> Result<(), PrintError> {
        let kind = object::kind(obj);
        let group = api_group(object::api_version(obj));
        let columns: Vec<ColumnSpec> = builtin_columns_for(group, kind).into_iter().filter(|c| self.options.wide || !c.wide).collect();

        let headers = self.decorate_headers(columns.iter().map(|c| c.label.to_string()).collect());
        self.begin_group(&format!("{}/{}", group, kind), &headers, out)?;

        let projected = builtin_projector_for(group, kind).map(|p| p.project(obj)).unwrap_or_default();
        let mut cells = Vec::with_capacity(columns.len());
        for c in &columns {
            let cell = match &c.kind {
                ColumnKind::Name => {
                    let name = object::name(obj).unwrap_or_default();
                    if self.options.with_kind && !kind.is_empty() {
                        format!("{}/{}", qualified_kind(group, kind), name)
                    } else {
                        name.to_string()
                    }
                }
                ColumnKind::Age => self.age(object::creation_timestamp(obj)),
                ColumnKind::Since(ptr) => match obj.pointer(ptr).and_then(|v| v.as_str()) {
                    Some(ts) => self.age(Some(ts)),
                    None => NONE.to_string(),
                },
                ColumnKind::Projected(id) => {
                    projected.iter().find(|(i, _)| i == id).map(|(_, v)| v.clone()).unwrap_or_else(|| NONE.to_string())
                }
            };
            cells.push(cell);
        }
        let row = self.decorate_row(Some(obj), cells);
        writeln!(out, "{}", row.join("\t"))?;
        self.rows_printed += 1;
        Ok(())
    }

    fn print_table(&mut self, table: &Table, out: &mut dyn Write) -> Result<(), PrintError> {
        if table.is_empty() {
            return Ok(());
        }
        let visible: Vec<usize> = table
            .column_definitions
            .iter()
            .enumerate()
            .filter(|(_, c)| self.options.wide || c.priority == 0)
            .map(|(i, _)| i)
            .collect();
        let names: Vec<String> = visible.iter().map(|&i| table.column_definitions[i].name.to_uppercase()).collect();
        let columns_key = names.join(",");
        let headers = self.decorate_headers(names);

        for row in &table.rows {
            // rows carrying their object group by kind, so one table run per kind
            let kind = row_kind(row);
            let group = row.object.as_ref().map(|o| api_group(object::api_version(o))).unwrap_or("");
            let key = match kind {
                Some(kind) => format!("table/{}/{}/{}", group, kind, columns_key),
                None => format!("table/{}", columns_key),
            };
            self.begin_group(&key, &headers, out)?;

            let mut cells = Vec::with_capacity(visible.len());
            for &i in &visible {
                let def = &table.column_definitions[i];
                let cell = row.cells.get(i).unwrap_or(&NULL);
                let is_date = def.type_ == "date" || def.format == "date";
                let text = match cell {
                    Value::String(s) if is_date && DateTime::parse_from_rfc3339(s).is_ok() => self.age(Some(s)),
                    other => cell_text(other),
                };
                cells.push(text);
            }
            if self.options.with_kind {
                if let (Some(first), Some(kind)) = (cells.first_mut(), kind) {
                    *first = format!("{}/{}", qualified_kind(group, kind), first);
                }
            }
            let line = self.decorate_row(row.object.as_ref(), cells);
            writeln!(out, "{}", line.join("\t"))?;
            self.rows_printed += 1;
        }
        Ok(())
    }
}

fn row_kind(row: &TableRow) -> Option<&str> {
    row.object.as_ref().map(object::kind).filter(|k| !k.is_empty() && *k != "PartialObjectMetadata")
}

fn api_group(api_version: &str) -> &str {
    api_version.split_once('/').map(|(g, _)| g).unwrap_or("")
}

fn qualified_kind(group: &str, kind: &str) -> String {
    if group.is_empty() {
        kind.to_lowercase()
    } else {
        format!("{}.{}", kind.to_lowercase(), group)
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => NONE.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ResourcePrinter for HumanTablePrinter {
    fn print_obj(&mut self, obj: &Value, out: &mut dyn Write) -> Result<(), PrintError> {
        if object::is_table(obj) {
            let table = decode_into_table(obj).map_err(|e| PrintError::Render(e.to_string()))?;
            return self.print_table(&table, out);
        }
        match object::list_items(obj) {
            Some(items) => items.iter().try_for_each(|item| self.print_resource(item, out)),
            None => self.print_resource(obj, out),
        }
    }

    fn is_generic(&self) -> bool {
        false
    }

    fn after_print(&mut self, out: &mut dyn Write, note: &str) -> Result<(), PrintError> {
        if !note.is_empty() {
            writeln!(out, "{}", note)?;
        }
        Ok(())
    }

    fn kind(&self) -> PrinterKind {
        PrinterKind::HumanTable
    }
}

/// Age of an RFC 3339 timestamp relative to `now`.
pub fn translate_timestamp(ts: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(parsed) = ts.and_then(|s| DateTime::parse_from_rfc3339(s).ok()) else {
        return "<unknown>".to_string();
    };
    short_human_duration(now.signed_duration_since(parsed.with_timezone(&Utc)))
}

/// `Ns`, `Nm`, `Nh` below 48 hours, `Nd` below two years, then `Ny`.
pub fn short_human_duration(d: chrono::Duration) -> String {
    let seconds = d.num_seconds();
    if seconds < -1 {
        return "<invalid>".to_string();
    }
    if seconds < 0 {
        return "0s".to_string();
    }
    if seconds < 60 {
        return format!("{}s", seconds);
    }
    let minutes = d.num_minutes();
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    let hours = d.num_hours();
    if hours < 48 {
        return format!("{}h", hours);
    }
    if hours < 24 * 365 * 2 {
        return format!("{}d", hours / 24);
    }
    format!("{}y", hours / 24 / 365)
}
