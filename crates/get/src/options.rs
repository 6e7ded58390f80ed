//! Command-level configuration for `get`, built once from CLI flags.

use std::collections::BTreeSet;
use std::sync::Arc;

use orka_core::{FetchRequest, TypeResolver};
use orka_printers::{HumanOptions, PrintFlags};

use crate::GetError;

pub const DEFAULT_CHUNK_SIZE: u32 = 500;

/// Page size for list requests: `ORKA_CHUNK_SIZE`, else 500.
pub fn chunk_size_from_env() -> u32 {
    std::env::var("ORKA_CHUNK_SIZE").ok().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_CHUNK_SIZE)
}

#[derive(Debug, Clone)]
pub struct GetOptions {
    pub args: Vec<String>,
    pub output: String,
    pub template: Option<String>,
    pub allow_missing_template_keys: bool,
    pub no_headers: bool,
    pub show_labels: bool,
    pub show_kind: bool,
    pub label_columns: Vec<String>,
    pub all_namespaces: bool,
    pub namespace: Option<String>,
    pub selector: Option<String>,
    pub field_selector: Option<String>,
    pub sort_by: Option<String>,
    pub watch: bool,
    pub watch_only: bool,
    pub ignore_not_found: bool,
    pub server_print: bool,
    pub chunk_size: u32,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            output: String::new(),
            template: None,
            allow_missing_template_keys: true,
            no_headers: false,
            show_labels: false,
            show_kind: false,
            label_columns: Vec::new(),
            all_namespaces: false,
            namespace: None,
            selector: None,
            field_selector: None,
            sort_by: None,
            watch: false,
            watch_only: false,
            ignore_not_found: false,
            server_print: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl GetOptions {
    pub fn is_watch(&self) -> bool {
        self.watch || self.watch_only
    }

    pub fn validate(&self) -> Result<(), GetError> {
        if self.args.is_empty() {
            return Err(GetError::Validation("You must specify the type of resource to get.".into()));
        }
        if self.show_labels && !matches!(self.output.as_str(), "" | "wide") {
            return Err(GetError::Validation(format!("--show-labels option cannot be used with {} printer", self.output)));
        }
        if self.is_watch() && self.sort_by.as_deref().is_some_and(|s| !s.is_empty()) {
            return Err(GetError::Validation("--sort-by cannot be used with --watch or --watch-only".into()));
        }
        Ok(())
    }

    /// Renderer configuration. Kind prefixes are on when asked for or when the
    /// arguments name more than one resource type.
    pub fn print_flags(&self, type_resolver: Option<Arc<dyn TypeResolver>>) -> PrintFlags {
        PrintFlags {
            allow_missing_keys: self.allow_missing_template_keys,
            template_argument: self.template.clone().filter(|t| !t.is_empty()),
            human: HumanOptions {
                no_headers: self.no_headers,
                with_namespace: self.all_namespaces,
                with_kind: self.show_kind || multiple_types_requested(&self.args),
                show_labels: self.show_labels,
                // --watch-only keeps relative ages
                absolute_timestamps: self.watch,
                wide: false,
                column_labels: self.label_columns.clone(),
            },
            type_resolver,
        }
    }

    pub fn fetch_request(&self, server_print: bool) -> FetchRequest {
        FetchRequest {
            args: self.args.clone(),
            namespace: self.namespace.clone(),
            all_namespaces: self.all_namespaces,
            label_selector: self.selector.clone().filter(|s| !s.is_empty()),
            field_selector: self.field_selector.clone().filter(|s| !s.is_empty()),
            chunk_size: self.chunk_size,
            server_print,
        }
    }
}

/// `pods,services` or `pods/a services/b` name two types; `pods a b` names one.
pub fn multiple_types_requested(args: &[String]) -> bool {
    let mut types = BTreeSet::new();
    if args.iter().any(|a| a.contains('/')) {
        for arg in args {
            let ty = arg.split_once('/').map(|(t, _)| t).unwrap_or(arg);
            types.extend(ty.split(',').filter(|t| !t.is_empty()));
        }
    } else if let Some(first) = args.first() {
        types.extend(first.split(',').filter(|t| !t.is_empty()));
    }
    types.contains("all") || types.len() > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn validation_rules() {
        let none = GetOptions::default();
        assert_eq!(none.validate().unwrap_err().to_string(), "You must specify the type of resource to get.");

        let labels = GetOptions { args: args(&["pods"]), show_labels: true, output: "json".into(), ..Default::default() };
        assert_eq!(labels.validate().unwrap_err().to_string(), "--show-labels option cannot be used with json printer");
        let wide = GetOptions { output: "wide".into(), ..labels };
        assert!(wide.validate().is_ok());

        let sorted_watch = GetOptions { args: args(&["pods"]), watch: true, sort_by: Some(".metadata.name".into()), ..Default::default() };
        assert!(sorted_watch.validate().is_err());
    }

    #[test]
    fn detects_multiple_types() {
        assert!(!multiple_types_requested(&args(&["pods"])));
        assert!(!multiple_types_requested(&args(&["pods", "a", "b"])));
        assert!(multiple_types_requested(&args(&["pods,svc"])));
        assert!(multiple_types_requested(&args(&["pods/a", "svc/b"])));
        assert!(!multiple_types_requested(&args(&["pods/a", "pods/b"])));
        assert!(multiple_types_requested(&args(&["all"])));
    }

    #[test]
    fn watch_turns_on_absolute_timestamps() {
        let o = GetOptions { args: args(&["pods,svc"]), watch: true, all_namespaces: true, ..Default::default() };
        let flags = o.print_flags(None);
        assert!(flags.human.absolute_timestamps);
        assert!(flags.human.with_kind);
        assert!(flags.human.with_namespace);

        let only = GetOptions { watch: false, watch_only: true, ..o };
        assert!(!only.print_flags(None).human.absolute_timestamps);
    }

    #[test]
    fn request_drops_empty_selectors() {
        let o = GetOptions { args: args(&["pods"]), selector: Some(String::new()), chunk_size: 50, ..Default::default() };
        let req = o.fetch_request(true);
        assert_eq!(req.label_selector, None);
        assert_eq!(req.chunk_size, 50);
        assert!(req.server_print);
    }
}
