//! One-shot print session: flush, render, collect, summarise.

use std::io::Write;

use metrics::counter;
use orka_core::{object, Info};
use orka_printers::{substitute_server_table, PrintError, ResourcePrinter};
use tracing::debug;

use crate::sort::SortState;
use crate::{AggregateError, GetError};

pub const NO_RESOURCES_FOUND: &str = "No resources found.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub ignore_not_found: bool,
    /// The request asked the server for tables.
    pub prefer_tables: bool,
    /// Trailing summary handed to the printer once something was printed.
    pub note: Option<String>,
}

/// Expand list objects into one item per member, keeping their mapping. Tables
/// stay whole.
pub fn flatten_lists(items: Vec<Info>) -> Vec<Info> {
    let mut out = Vec::with_capacity(items.len());
    for info in items {
        match object::list_items(&info.object) {
            Some(members) if !object::is_table(&info.object) => {
                out.extend(members.iter().map(|m| Info::new(m.clone(), info.mapping.clone())));
            }
            _ => out.push(info),
        }
    }
    out
}

pub struct PrintSession<'p> {
    printer: &'p mut dyn ResourcePrinter,
    options: SessionOptions,
}

impl<'p> PrintSession<'p> {
    pub fn new(printer: &'p mut dyn ResourcePrinter, options: SessionOptions) -> Self {
        Self { printer, options }
    }

    /// Render `items` in display order, then let the printer close the run with the
    /// session note. Per-object failures are collected and the loop carries on.
    /// Returns the number of objects handed to the printer.
    pub fn run(
        &mut self,
        items: &[Info],
        sort: Option<&SortState>,
        out: &mut dyn Write,
        err_out: &mut dyn Write,
    ) -> Result<usize, GetError> {
        let mut errors = AggregateError::new();
        let mut attempted = 0usize;

        for ix in 0..items.len() {
            let pos = sort.map(|s| s.original_position(ix)).unwrap_or(ix);
            let Some(info) = items.get(pos) else { continue };

            if let Some(table) = substitute_server_table(&info.object, self.options.prefer_tables) {
                if table.is_empty() {
                    debug!(kind = %info.mapping.kind, "skipping empty table");
                    continue;
                }
            }

            out.flush().map_err(PrintError::from)?;
            attempted += 1;
            match self.printer.print_obj(&info.object, out) {
                Ok(()) => {
                    counter!("get_objects_printed_total", 1u64);
                }
                Err(e) => {
                    debug!(kind = %info.mapping.kind, name = ?object::name(&info.object), error = %e, "print failed");
                    counter!("get_print_errors_total", 1u64);
                    errors.push(e);
                }
            }
        }
        if attempted > 0 {
            self.printer.after_print(out, self.options.note.as_deref().unwrap_or_default())?;
        }
        out.flush().map_err(PrintError::from)?;

        if attempted == 0 && !self.options.ignore_not_found {
            writeln!(err_out, "{}", NO_RESOURCES_FOUND).map_err(PrintError::from)?;
        }
        errors.into_result().map(|()| attempted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orka_core::Mapping;
    use orka_printers::{resolve, PrintFlags, PrinterKind, TabWriter};
    use serde_json::{json, Value};

    fn pod(name: &str) -> Info {
        Info::new(json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": name}}), Mapping::new("", "v1", "Pod", "pods", true))
    }

    fn table(rows: Vec<Value>) -> Info {
        Info::new(
            json!({
                "apiVersion": "meta.k8s.io/v1",
                "kind": "Table",
                "columnDefinitions": [{"name": "Name", "type": "string", "format": "name", "priority": 0}],
                "rows": rows
            }),
            Mapping::new("", "v1", "Pod", "pods", true),
        )
    }

    fn run(output: &str, items: &[Info], sort: Option<&SortState>, opts: SessionOptions) -> (Result<usize, GetError>, String, String) {
        let mut printer = resolve(output, &PrintFlags::new()).unwrap();
        let mut out = TabWriter::new(Vec::new());
        let mut err = Vec::new();
        let res = PrintSession::new(printer.as_mut(), opts).run(items, sort, &mut out, &mut err);
        (res, String::from_utf8(out.into_inner().unwrap()).unwrap(), String::from_utf8(err).unwrap())
    }

    #[test]
    fn empty_result_reports_no_resources() {
        let (res, out, err) = run("", &[], None, SessionOptions::default());
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, "");
        assert_eq!(err, "No resources found.\n");

        let (res, _, err) = run("", &[], None, SessionOptions { ignore_not_found: true, ..Default::default() });
        assert!(res.is_ok());
        assert_eq!(err, "");
    }

    #[test]
    fn zero_row_tables_are_skipped_silently() {
        let items = vec![table(vec![]), table(vec![json!({"cells": ["web"]})])];
        let (res, out, err) = run("", &items, None, SessionOptions { prefer_tables: true, ..Default::default() });
        assert_eq!(res.unwrap(), 1);
        assert_eq!(out, "NAME\nweb\n");
        assert_eq!(err, "");
    }

    #[test]
    fn per_object_errors_do_not_stop_the_run() {
        let items = vec![pod("a"), Info::new(json!({"kind": "Pod", "metadata": {}}), Mapping::default()), pod("c")];
        let (res, out, _) = run("custom-columns=NAME:.metadata.name", &items, None, SessionOptions::default());
        assert!(res.is_ok());
        assert_eq!(out, "NAME\na\n<none>\nc\n");

        let flags = PrintFlags { allow_missing_keys: false, ..PrintFlags::new() };
        let mut printer = resolve("jsonpath={.metadata.name}", &flags).unwrap();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let res = PrintSession::new(printer.as_mut(), SessionOptions::default()).run(&items, None, &mut out, &mut err);
        assert!(matches!(res, Err(GetError::Aggregate(ref a)) if a.len() == 1));
        assert_eq!(String::from_utf8(out).unwrap(), "ac");
    }

    #[test]
    fn sort_state_drives_display_order() {
        let items = vec![pod("b"), pod("c"), pod("a")];
        let objs: Vec<&Value> = items.iter().map(|i| &i.object).collect();
        let sort = SortState::new(".metadata.name", &objs).unwrap();
        let (_, out, _) = run("custom-columns=N:.metadata.name", &items, Some(&sort), SessionOptions::default());
        assert_eq!(out, "N\na\nb\nc\n");
    }

    #[derive(Default)]
    struct Recording {
        printed: usize,
        notes: Vec<String>,
    }

    impl ResourcePrinter for Recording {
        fn print_obj(&mut self, _obj: &Value, _out: &mut dyn Write) -> Result<(), PrintError> {
            self.printed += 1;
            Ok(())
        }

        fn is_generic(&self) -> bool {
            false
        }

        fn after_print(&mut self, _out: &mut dyn Write, note: &str) -> Result<(), PrintError> {
            self.notes.push(note.to_string());
            Ok(())
        }

        fn kind(&self) -> PrinterKind {
            PrinterKind::HumanTable
        }
    }

    #[test]
    fn after_print_closes_a_non_empty_run_with_the_note() {
        let mut printer = Recording::default();
        let opts = SessionOptions { note: Some("2 hidden".into()), ..Default::default() };
        let mut out = Vec::new();
        let mut err = Vec::new();
        PrintSession::new(&mut printer, opts).run(&[pod("a"), pod("b")], None, &mut out, &mut err).unwrap();
        assert_eq!(printer.printed, 2);
        assert_eq!(printer.notes, vec!["2 hidden".to_string()]);

        let mut printer = Recording::default();
        PrintSession::new(&mut printer, SessionOptions::default()).run(&[], None, &mut out, &mut err).unwrap();
        assert!(printer.notes.is_empty());
    }

    #[test]
    fn human_tables_write_the_note_last() {
        let opts = SessionOptions { note: Some("(1 more on the next page)".into()), ..Default::default() };
        let (res, out, _) = run("custom-columns=N:.metadata.name", &[pod("a")], None, opts.clone());
        res.unwrap();
        assert_eq!(out, "N\na\n");

        let (res, out, _) = run("", &[pod("a")], None, opts);
        res.unwrap();
        assert!(out.ends_with("(1 more on the next page)\n"));
    }

    #[test]
    fn flattens_lists_but_not_tables() {
        let list = Info::new(json!({"kind": "PodList", "items": [{"metadata": {"name": "a"}}, {"metadata": {"name": "b"}}]}), Mapping::default());
        let flat = flatten_lists(vec![list, table(vec![])]);
        assert_eq!(flat.len(), 3);
        assert!(object::is_table(&flat[2].object));
    }
}
