//! `-o name`: one `resource/name` line per object.

use std::io::Write;
use std::sync::Arc;

use orka_core::{object, TypeResolver};
use serde_json::Value;

use crate::{PrintError, PrinterKind, ResourcePrinter};

pub struct NamePrinter {
    resolver: Option<Arc<dyn TypeResolver>>,
}

impl NamePrinter {
    pub fn new(resolver: Option<Arc<dyn TypeResolver>>) -> Self {
        Self { resolver }
    }

    fn resource_for(&self, kind: &str) -> String {
        self.resolver.as_ref().and_then(|r| r.plural_name(kind)).unwrap_or_else(|| kind.to_lowercase())
    }

    fn print_one(&self, obj: &Value, out: &mut dyn Write) -> Result<(), PrintError> {
        let kind = object::kind(obj);
        if kind.is_empty() {
            return Err(PrintError::Render("missing kind in object; cannot print name".into()));
        }
        let name = object::name(obj).ok_or_else(|| PrintError::Render(format!("missing name in {} object", kind)))?;
        writeln!(out, "{}/{}", self.resource_for(kind), name)?;
        Ok(())
    }
}

impl ResourcePrinter for NamePrinter {
    fn print_obj(&mut self, obj: &Value, out: &mut dyn Write) -> Result<(), PrintError> {
        match object::list_items(obj) {
            Some(items) => items.iter().try_for_each(|item| self.print_one(item, out)),
            None => self.print_one(obj, out),
        }
    }

    fn is_generic(&self) -> bool {
        true
    }

    fn kind(&self) -> PrinterKind {
        PrinterKind::Name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orka_core::StaticTypeResolver;
    use serde_json::json;

    #[test]
    fn uses_resolver_plural_and_falls_back_to_lowercase_kind() {
        let resolver: Arc<dyn TypeResolver> = Arc::new(StaticTypeResolver::from_pairs([("Deployment", "deployments.apps")]));
        let mut p = NamePrinter::new(Some(resolver));
        let list = json!({"kind": "List", "items": [
            {"kind": "Deployment", "metadata": {"name": "web"}},
            {"kind": "Widget", "metadata": {"name": "w1"}}
        ]});
        let mut out = Vec::new();
        p.print_obj(&list, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "deployments.apps/web\nwidget/w1\n");
    }

    #[test]
    fn missing_name_is_an_error() {
        let mut p = NamePrinter::new(None);
        let mut out = Vec::new();
        assert!(p.print_obj(&json!({"kind": "Pod", "metadata": {}}), &mut out).is_err());
        assert!(p.print_obj(&json!({"metadata": {"name": "x"}}), &mut out).is_err());
        assert!(out.is_empty());
    }
}
