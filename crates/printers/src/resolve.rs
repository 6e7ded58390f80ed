//! Output format → printer resolution.
//!
//! Builders are consulted in a fixed order. The first builder that recognises the
//! format wins, even when it then fails to construct its printer; that failure is
//! returned as-is and no later builder is tried.

use std::fs;
use std::sync::Arc;

use orka_core::TypeResolver;
use tracing::debug;

use crate::custom_columns::{self, CustomColumnsPrinter};
use crate::format::{FormatKind, FormatSpec};
use crate::human::{HumanOptions, HumanTablePrinter};
use crate::json_yaml::{JsonPrinter, YamlPrinter};
use crate::jsonpath::JsonPathPrinter;
use crate::name::NamePrinter;
use crate::template::GoTemplatePrinter;
use crate::{PrintError, ResourcePrinter};

/// Printer configuration captured once at construction.
#[derive(Clone)]
pub struct PrintFlags {
    pub allow_missing_keys: bool,
    /// Separate `--template` value.
    pub template_argument: Option<String>,
    pub human: HumanOptions,
    pub type_resolver: Option<Arc<dyn TypeResolver>>,
}

impl PrintFlags {
    pub fn new() -> Self {
        Self { allow_missing_keys: true, template_argument: None, human: HumanOptions::default(), type_resolver: None }
    }
}

impl Default for PrintFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PrintFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintFlags")
            .field("allow_missing_keys", &self.allow_missing_keys)
            .field("template_argument", &self.template_argument)
            .field("human", &self.human)
            .field("type_resolver", &self.type_resolver.is_some())
            .finish()
    }
}

pub type BuildResult = Result<Box<dyn ResourcePrinter>, PrintError>;

/// `None` means "not my format"; `Some` ends resolution with that result.
pub type PrinterBuilder = fn(&FormatSpec, &PrintFlags) -> Option<BuildResult>;

/// The production builder order.
pub fn default_builders() -> Vec<PrinterBuilder> {
    vec![build_json_yaml, build_name, build_go_template, build_jsonpath, build_custom_columns, build_human]
}

/// Parse `output` and resolve it with [`default_builders`].
pub fn resolve(output: &str, flags: &PrintFlags) -> BuildResult {
    let spec = FormatSpec::parse(output, flags.template_argument.as_deref());
    resolve_spec(&spec, flags, &default_builders())
}

pub fn resolve_spec(spec: &FormatSpec, flags: &PrintFlags, builders: &[PrinterBuilder]) -> BuildResult {
    for (ix, build) in builders.iter().enumerate() {
        if let Some(result) = build(spec, flags) {
            debug!(format = %spec.raw, builder = ix, ok = result.is_ok(), "output format resolved");
            return result;
        }
    }
    Err(PrintError::UnrecognizedFormat(spec.raw.clone()))
}

/// The template text for a template kind: inline, or read once from the named file.
fn template_source(spec: &FormatSpec, missing: &str) -> Result<String, PrintError> {
    let arg = spec.argument.as_deref().filter(|a| !a.is_empty()).ok_or_else(|| PrintError::MissingArgument(missing.to_string()))?;
    if !spec.kind.is_file() {
        return Ok(arg.to_string());
    }
    fs::read_to_string(arg).map_err(|e| PrintError::ReadFile { path: arg.to_string(), reason: e.to_string() })
}

fn boxed<P: ResourcePrinter + 'static>(p: P) -> Box<dyn ResourcePrinter> {
    Box::new(p)
}

fn build_json_yaml(spec: &FormatSpec, _flags: &PrintFlags) -> Option<BuildResult> {
    match spec.kind {
        FormatKind::Json => Some(Ok(boxed(JsonPrinter))),
        FormatKind::Yaml => Some(Ok(boxed(YamlPrinter::default()))),
        _ => None,
    }
}

fn build_name(spec: &FormatSpec, flags: &PrintFlags) -> Option<BuildResult> {
    (spec.kind == FormatKind::Name).then(|| Ok(boxed(NamePrinter::new(flags.type_resolver.clone()))))
}

fn build_go_template(spec: &FormatSpec, flags: &PrintFlags) -> Option<BuildResult> {
    if !matches!(spec.kind, FormatKind::GoTemplate | FormatKind::GoTemplateFile) {
        return None;
    }
    Some(
        template_source(spec, "template format specified but no template given")
            .and_then(|src| GoTemplatePrinter::new(&src, flags.allow_missing_keys))
            .map(boxed),
    )
}

fn build_jsonpath(spec: &FormatSpec, flags: &PrintFlags) -> Option<BuildResult> {
    if !matches!(spec.kind, FormatKind::JsonPath | FormatKind::JsonPathFile) {
        return None;
    }
    Some(
        template_source(spec, "jsonpath format specified but no jsonpath template given")
            .and_then(|src| JsonPathPrinter::new(&src, flags.allow_missing_keys))
            .map(boxed),
    )
}

fn build_custom_columns(spec: &FormatSpec, flags: &PrintFlags) -> Option<BuildResult> {
    let no_headers = flags.human.no_headers;
    match spec.kind {
        FormatKind::CustomColumns => Some(
            template_source(spec, "custom-columns format specified but no custom columns given")
                .and_then(|src| custom_columns::parse_spec(&src))
                .and_then(|cols| CustomColumnsPrinter::new(cols, no_headers))
                .map(boxed),
        ),
        FormatKind::CustomColumnsFile => Some(
            template_source(spec, "custom-columns-file format specified but no file given")
                .and_then(|text| custom_columns::parse_template(&text))
                .and_then(|cols| CustomColumnsPrinter::new(cols, no_headers))
                .map(boxed),
        ),
        _ => None,
    }
}

fn build_human(spec: &FormatSpec, flags: &PrintFlags) -> Option<BuildResult> {
    let wide = match spec.kind {
        FormatKind::Table => false,
        FormatKind::Wide => true,
        _ => return None,
    };
    let options = HumanOptions { wide, ..flags.human.clone() };
    Some(Ok(boxed(HumanTablePrinter::new(options))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PrinterKind;
    use std::io::Write as _;

    fn kind_of(output: &str) -> PrinterKind {
        resolve(output, &PrintFlags::new()).unwrap().kind()
    }

    #[test]
    fn resolves_every_known_format() {
        assert_eq!(kind_of("json"), PrinterKind::Json);
        assert_eq!(kind_of("yaml"), PrinterKind::Yaml);
        assert_eq!(kind_of("name"), PrinterKind::Name);
        assert_eq!(kind_of("go-template={{.kind}}"), PrinterKind::GoTemplate);
        assert_eq!(kind_of("template={{.kind}}"), PrinterKind::GoTemplate);
        assert_eq!(kind_of("jsonpath={.kind}"), PrinterKind::JsonPath);
        assert_eq!(kind_of("custom-columns=NAME:.metadata.name"), PrinterKind::CustomColumns);
        assert_eq!(kind_of(""), PrinterKind::HumanTable);
        assert_eq!(kind_of("wide"), PrinterKind::HumanTable);
    }

    #[test]
    fn unknown_format_is_not_recognized() {
        let err = resolve("xml", &PrintFlags::new()).unwrap_err();
        assert!(err.is_unrecognized());
        assert_eq!(err.to_string(), "output format \"xml\" not recognized");
    }

    #[test]
    fn matched_builder_errors_are_final() {
        let err = resolve("custom-columns=", &PrintFlags::new()).unwrap_err();
        assert!(err.is_resolution());
        assert_eq!(err.to_string(), "custom-columns format specified but no custom columns given");

        let err = resolve("go-template={{.a", &PrintFlags::new()).unwrap_err();
        assert!(matches!(err, PrintError::Template { .. }));

        let err = resolve("jsonpath", &PrintFlags::new()).unwrap_err();
        assert!(matches!(err, PrintError::MissingArgument(_)));
    }

    fn claims_everything(_: &FormatSpec, _: &PrintFlags) -> Option<BuildResult> {
        Some(Err(PrintError::MissingArgument("first".into())))
    }

    #[test]
    fn first_match_wins_even_when_it_fails() {
        let spec = FormatSpec::parse("json", None);
        let builders: Vec<PrinterBuilder> = vec![claims_everything, build_json_yaml];
        let err = resolve_spec(&spec, &PrintFlags::new(), &builders).unwrap_err();
        assert_eq!(err.to_string(), "first");

        let builders: Vec<PrinterBuilder> = vec![build_json_yaml, claims_everything];
        assert_eq!(resolve_spec(&spec, &PrintFlags::new(), &builders).unwrap().kind(), PrinterKind::Json);
    }

    #[test]
    fn template_flag_supplies_argument() {
        let flags = PrintFlags { template_argument: Some("{{.kind}}".into()), ..PrintFlags::new() };
        assert_eq!(resolve("", &flags).unwrap().kind(), PrinterKind::GoTemplate);
    }

    #[test]
    fn file_formats_read_their_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "NAME KIND").unwrap();
        writeln!(f, ".metadata.name .kind").unwrap();
        let out = format!("custom-columns-file={}", f.path().display());
        assert_eq!(kind_of(&out), PrinterKind::CustomColumns);

        let err = resolve("jsonpath-file=/nonexistent/orka/path", &PrintFlags::new()).unwrap_err();
        assert!(matches!(err, PrintError::ReadFile { .. }));
    }

    #[test]
    fn wide_is_carried_into_human_options() {
        let flags = PrintFlags { human: HumanOptions { no_headers: true, ..Default::default() }, ..PrintFlags::new() };
        let spec = FormatSpec::parse("wide", None);
        let p = build_human(&spec, &flags).unwrap().unwrap();
        assert_eq!(p.kind(), PrinterKind::HumanTable);
    }
}
