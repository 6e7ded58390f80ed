#![forbid(unsafe_code)]

use orka_printers::{resolve, PrintFlags, PrinterKind, ResourcePrinter, TabWriter};
use serde_json::{json, Value};

fn pod(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": name, "namespace": "default", "creationTimestamp": "2020-01-01T00:00:00Z"},
        "spec": {"containers": [{"name": "app", "image": "nginx"}]},
        "status": {"phase": "Running"}
    })
}

fn deployment(name: &str) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": name, "namespace": "default", "creationTimestamp": "2020-01-01T00:00:00Z"},
        "spec": {"replicas": 2},
        "status": {"readyReplicas": 2, "updatedReplicas": 2, "availableReplicas": 2}
    })
}

fn render_all(p: &mut dyn ResourcePrinter, objs: &[Value]) -> String {
    let mut out = TabWriter::new(Vec::new());
    for o in objs {
        p.print_obj(o, &mut out).unwrap();
    }
    String::from_utf8(out.into_inner().unwrap()).unwrap()
}

#[test]
fn every_documented_format_resolves_to_its_printer() {
    let dir = tempfile::tempdir().unwrap();
    let tpl = dir.path().join("t.tpl");
    let path = dir.path().join("p.jsonpath");
    let cols = dir.path().join("cols.txt");
    std::fs::write(&tpl, "{{.metadata.name}}").unwrap();
    std::fs::write(&path, "{.metadata.name}").unwrap();
    std::fs::write(&cols, "NAME\n.metadata.name\n").unwrap();

    let cases = [
        ("json".to_string(), PrinterKind::Json),
        ("yaml".to_string(), PrinterKind::Yaml),
        ("name".to_string(), PrinterKind::Name),
        ("wide".to_string(), PrinterKind::HumanTable),
        ("".to_string(), PrinterKind::HumanTable),
        ("go-template={{.x}}".to_string(), PrinterKind::GoTemplate),
        (format!("go-template-file={}", tpl.display()), PrinterKind::GoTemplate),
        ("template={{.x}}".to_string(), PrinterKind::GoTemplate),
        ("jsonpath={.x}".to_string(), PrinterKind::JsonPath),
        (format!("jsonpath-file={}", path.display()), PrinterKind::JsonPath),
        ("custom-columns=NAME:.metadata.name".to_string(), PrinterKind::CustomColumns),
        (format!("custom-columns-file={}", cols.display()), PrinterKind::CustomColumns),
    ];
    let flags = PrintFlags::new();
    for (output, want) in cases {
        let printer = resolve(&output, &flags).unwrap_or_else(|e| panic!("{output}: {e}"));
        assert_eq!(printer.kind(), want, "{output}");
    }

    for bad in ["xml", "table", "jsonpath2={.x}", "Wide"] {
        let err = resolve(bad, &flags).err().unwrap();
        assert!(err.is_unrecognized(), "{bad}: {err}");
    }
}

#[test]
fn rendering_twice_is_byte_identical() {
    let objs = [pod("a"), deployment("d"), pod("b")];
    for output in ["json", "yaml", "name", "wide", "jsonpath={.metadata.name}", "custom-columns=N:.metadata.name"] {
        let first = render_all(resolve(output, &PrintFlags::new()).unwrap().as_mut(), &objs);
        let second = render_all(resolve(output, &PrintFlags::new()).unwrap().as_mut(), &objs);
        assert_eq!(first, second, "{output}");
    }
}

#[test]
fn human_headers_reprint_on_kind_change() {
    let mut p = resolve("", &PrintFlags::new()).unwrap();
    let text = render_all(p.as_mut(), &[pod("a"), pod("b"), deployment("d"), pod("c")]);
    let lines: Vec<&str> = text.lines().collect();
    let header_at: Vec<usize> = lines.iter().enumerate().filter(|(_, l)| l.starts_with("NAME")).map(|(i, _)| i).collect();
    // pods a,b | blank, header, deployment | blank, header, pod c
    assert_eq!(header_at, vec![0, 4, 7]);
    assert!(lines[1].starts_with("a "));
    assert!(lines[2].starts_with("b "));
    assert!(lines[5].starts_with("d "));
    assert!(lines[8].starts_with("c "));
}

#[test]
fn custom_columns_single_column() {
    let mut p = resolve("custom-columns=NAME:.metadata.name", &PrintFlags::new()).unwrap();
    let text = render_all(p.as_mut(), &[json!({"metadata": {"name": "x"}})]);
    assert_eq!(text, "NAME\nx\n");
}

#[test]
fn missing_keys_fail_per_object_when_disallowed() {
    let flags = PrintFlags { allow_missing_keys: false, ..PrintFlags::new() };
    let mut p = resolve("jsonpath={.spec.nodeName}{\"\\n\"}", &flags).unwrap();
    let mut out = Vec::new();
    assert!(p.print_obj(&pod("a"), &mut out).is_err());
    let mut with_node = pod("b");
    with_node["spec"]["nodeName"] = json!("n1");
    p.print_obj(&with_node, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "n1\n");
}
