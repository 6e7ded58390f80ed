//! Generic printers (json, yaml, name, templates) see one combined object.

use std::io::Write;

use metrics::counter;
use orka_core::{object, FetchResult};
use orka_printers::{PrintError, ResourcePrinter};
use serde_json::{json, Value};
use tracing::debug;

use crate::sort::SortState;
use crate::{AggregateError, GetError};

/// Wrap objects into a `v1` `List`, flattening nested lists.
pub fn wrap_in_list<'a>(objects: impl IntoIterator<Item = &'a Value>) -> Value {
    let mut items = Vec::new();
    for obj in objects {
        match object::list_items(obj) {
            Some(members) => items.extend(members.iter().cloned()),
            None => items.push(obj.clone()),
        }
    }
    json!({
        "apiVersion": "v1",
        "kind": "List",
        "metadata": {"resourceVersion": ""},
        "items": items,
    })
}

/// Print `result` once: the bare object when exactly one was asked for by name,
/// otherwise a wrapping list. Fetch errors are reported alongside whatever printed.
pub fn print_generic(
    result: &FetchResult,
    printer: &mut dyn ResourcePrinter,
    sort_by: Option<&str>,
    ignore_not_found: bool,
    out: &mut dyn Write,
) -> Result<(), GetError> {
    let mut errors: AggregateError = result.errors.iter().cloned().collect();

    if result.single_item_implied {
        if let Some(first) = result.errors.first() {
            return Err(first.clone().into());
        }
    }
    if result.is_empty() && ignore_not_found {
        return errors.into_result();
    }

    let mut obj = if !result.single_item_implied || result.len() > 1 {
        wrap_in_list(result.items.iter().map(|i| &i.object))
    } else {
        match result.items.first() {
            Some(info) => info.object.clone(),
            None => return errors.into_result(),
        }
    };

    if let Some(field) = sort_by.filter(|f| !f.is_empty()) {
        sort_list_items(&mut obj, field)?;
    }

    debug!(kind = %object::kind(&obj), items = result.len(), "printing combined object");
    match printer.print_obj(&obj, out) {
        Ok(()) => {
            counter!("get_objects_printed_total", 1u64);
        }
        Err(e) => {
            counter!("get_print_errors_total", 1u64);
            errors.push(e);
        }
    }
    out.flush().map_err(PrintError::from)?;
    errors.into_result()
}

fn sort_list_items(list: &mut Value, field: &str) -> Result<(), GetError> {
    let Some(items) = list.get_mut("items").and_then(|v| v.as_array_mut()) else {
        return Ok(());
    };
    if items.len() < 2 {
        return Ok(());
    }
    let refs: Vec<&Value> = items.iter().collect();
    let order = SortState::new(field, &refs)?.order().to_vec();
    let mut taken: Vec<Option<Value>> = items.drain(..).map(Some).collect();
    items.extend(order.into_iter().filter_map(|ix| taken.get_mut(ix).and_then(Option::take)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orka_core::{FetchError, Info, Mapping};
    use orka_printers::{resolve, PrintFlags};

    fn pod(name: &str) -> Info {
        Info::new(json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": name}}), Mapping::new("", "v1", "Pod", "pods", true))
    }

    fn render(output: &str, result: &FetchResult, sort_by: Option<&str>) -> (Result<(), GetError>, String) {
        let mut printer = resolve(output, &PrintFlags::new()).unwrap();
        let mut out = Vec::new();
        let res = print_generic(result, printer.as_mut(), sort_by, false, &mut out);
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn named_single_item_prints_bare() {
        let result = FetchResult { items: vec![pod("web")], errors: vec![], single_item_implied: true };
        let (res, out) = render("jsonpath={.kind}", &result, None);
        res.unwrap();
        assert_eq!(out, "Pod");
    }

    #[test]
    fn everything_else_is_wrapped_and_flattened() {
        let chunk = Info::new(json!({"kind": "PodList", "items": [{"metadata": {"name": "b"}}, {"metadata": {"name": "a"}}]}), Mapping::default());
        let result = FetchResult { items: vec![pod("c"), chunk], errors: vec![], single_item_implied: false };
        let (res, out) = render("jsonpath={.kind} {.items[*].metadata.name}", &result, None);
        res.unwrap();
        assert_eq!(out, "List c b a");

        let (_, sorted) = render("jsonpath={.items[*].metadata.name}", &result, Some(".metadata.name"));
        assert_eq!(sorted, "a b c");
    }

    #[test]
    fn errors_are_reported_after_printing() {
        let result = FetchResult {
            items: vec![pod("a")],
            errors: vec![FetchError::NotFound("pods \"b\"".into())],
            single_item_implied: false,
        };
        let (res, out) = render("name", &result, None);
        assert_eq!(out, "pod/a\n");
        assert_eq!(res.unwrap_err().to_string(), "pods \"b\" not found");
    }

    #[test]
    fn ignore_not_found_on_empty_prints_nothing() {
        let mut printer = resolve("json", &PrintFlags::new()).unwrap();
        let mut out = Vec::new();
        print_generic(&FetchResult::default(), printer.as_mut(), None, true, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn empty_list_still_prints_without_ignore() {
        let (res, out) = render("jsonpath={.kind}", &FetchResult::default(), None);
        res.unwrap();
        assert_eq!(out, "List");
    }
}
