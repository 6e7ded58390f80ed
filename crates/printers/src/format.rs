//! Output format parsing.
//!
//! Parsing never fails: an unknown kind is carried as [`FormatKind::Unknown`] and the
//! resolver reports it once every builder has declined.

/// Closed set of output kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    /// `""`: the human-readable table.
    Table,
    Wide,
    Json,
    Yaml,
    Name,
    /// `go-template` and its `template` alias.
    GoTemplate,
    /// `go-template-file` and its `templatefile` alias.
    GoTemplateFile,
    JsonPath,
    JsonPathFile,
    CustomColumns,
    CustomColumnsFile,
    Unknown,
}

impl FormatKind {
    /// Kinds whose argument is a template, expression or file path.
    pub fn takes_argument(self) -> bool {
        matches!(
            self,
            FormatKind::GoTemplate
                | FormatKind::GoTemplateFile
                | FormatKind::JsonPath
                | FormatKind::JsonPathFile
                | FormatKind::CustomColumns
                | FormatKind::CustomColumnsFile
        )
    }

    /// Kinds whose argument names a file to read.
    pub fn is_file(self) -> bool {
        matches!(self, FormatKind::GoTemplateFile | FormatKind::JsonPathFile | FormatKind::CustomColumnsFile)
    }

    fn from_template_name(name: &str) -> Option<FormatKind> {
        match name {
            "go-template" | "template" => Some(FormatKind::GoTemplate),
            "go-template-file" | "templatefile" => Some(FormatKind::GoTemplateFile),
            "jsonpath" => Some(FormatKind::JsonPath),
            "jsonpath-file" => Some(FormatKind::JsonPathFile),
            "custom-columns" => Some(FormatKind::CustomColumns),
            "custom-columns-file" => Some(FormatKind::CustomColumnsFile),
            _ => None,
        }
    }
}

/// Parsed `(kind, argument)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    pub kind: FormatKind,
    /// Present only for kinds that [take an argument](FormatKind::takes_argument).
    pub argument: Option<String>,
    /// The string the user typed, for error messages.
    pub raw: String,
}

impl FormatSpec {
    /// Parse an `-o` value. `template_flag` is the separate `--template` value, used when
    /// the output names a template kind without `=argument`, or is empty altogether.
    pub fn parse(raw: &str, template_flag: Option<&str>) -> FormatSpec {
        let flag = template_flag.filter(|t| !t.is_empty()).map(|t| t.to_string());

        if raw.is_empty() {
            return match flag {
                Some(t) => FormatSpec { kind: FormatKind::GoTemplate, argument: Some(t), raw: String::new() },
                None => FormatSpec { kind: FormatKind::Table, argument: None, raw: String::new() },
            };
        }

        if let Some((head, rest)) = raw.split_once('=') {
            let kind = FormatKind::from_template_name(head).unwrap_or(FormatKind::Unknown);
            let argument = if kind == FormatKind::Unknown { None } else { Some(rest.to_string()) };
            return FormatSpec { kind, argument, raw: raw.to_string() };
        }

        let kind = match raw {
            "wide" => FormatKind::Wide,
            "name" => FormatKind::Name,
            other if other.eq_ignore_ascii_case("json") => FormatKind::Json,
            other if other.eq_ignore_ascii_case("yaml") => FormatKind::Yaml,
            other => FormatKind::from_template_name(other).unwrap_or(FormatKind::Unknown),
        };
        let argument = if kind.takes_argument() { flag } else { None };
        FormatSpec { kind, argument, raw: raw.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(raw: &str) -> FormatKind {
        FormatSpec::parse(raw, None).kind
    }

    #[test]
    fn parses_plain_kinds() {
        assert_eq!(kind(""), FormatKind::Table);
        assert_eq!(kind("wide"), FormatKind::Wide);
        assert_eq!(kind("json"), FormatKind::Json);
        assert_eq!(kind("JSON"), FormatKind::Json);
        assert_eq!(kind("yaml"), FormatKind::Yaml);
        assert_eq!(kind("name"), FormatKind::Name);
        assert_eq!(kind("xml"), FormatKind::Unknown);
    }

    #[test]
    fn splits_argument_after_first_equals() {
        let spec = FormatSpec::parse("go-template={{.a}}=={{.b}}", None);
        assert_eq!(spec.kind, FormatKind::GoTemplate);
        assert_eq!(spec.argument.as_deref(), Some("{{.a}}=={{.b}}"));

        let spec = FormatSpec::parse("custom-columns-file=cols.txt", None);
        assert_eq!(spec.kind, FormatKind::CustomColumnsFile);
        assert_eq!(spec.argument.as_deref(), Some("cols.txt"));

        assert_eq!(kind("template={{.x}}"), FormatKind::GoTemplate);
        assert_eq!(kind("templatefile=t.tpl"), FormatKind::GoTemplateFile);
        assert_eq!(kind("jsonpath={.x}"), FormatKind::JsonPath);
        assert_eq!(kind("jsonpath-file=p"), FormatKind::JsonPathFile);
        assert_eq!(kind("custom-columns=A:.a"), FormatKind::CustomColumns);
    }

    #[test]
    fn unknown_prefix_is_not_an_argument() {
        let spec = FormatSpec::parse("json=x", None);
        assert_eq!(spec.kind, FormatKind::Unknown);
        assert_eq!(spec.argument, None);
        assert_eq!(spec.raw, "json=x");
    }

    #[test]
    fn template_flag_fills_missing_argument() {
        let spec = FormatSpec::parse("", Some("{{.kind}}"));
        assert_eq!(spec.kind, FormatKind::GoTemplate);
        assert_eq!(spec.argument.as_deref(), Some("{{.kind}}"));

        let spec = FormatSpec::parse("jsonpath", Some("{.kind}"));
        assert_eq!(spec.kind, FormatKind::JsonPath);
        assert_eq!(spec.argument.as_deref(), Some("{.kind}"));

        let spec = FormatSpec::parse("json", Some("{.kind}"));
        assert_eq!(spec.argument, None);

        let spec = FormatSpec::parse("", Some(""));
        assert_eq!(spec.kind, FormatKind::Table);
    }
}
