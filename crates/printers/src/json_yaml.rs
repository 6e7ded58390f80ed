//! Structured encoders.

use std::io::Write;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

use crate::{PrintError, PrinterKind, ResourcePrinter};

/// Pretty JSON with a 4-space indent and a trailing newline.
#[derive(Debug, Default)]
pub struct JsonPrinter;

impl ResourcePrinter for JsonPrinter {
    fn print_obj(&mut self, obj: &Value, out: &mut dyn Write) -> Result<(), PrintError> {
        let mut buf = Vec::with_capacity(256);
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        obj.serialize(&mut ser).map_err(|e| PrintError::Encode(e.to_string()))?;
        buf.push(b'\n');
        out.write_all(&buf)?;
        Ok(())
    }

    fn is_generic(&self) -> bool {
        true
    }

    fn kind(&self) -> PrinterKind {
        PrinterKind::Json
    }
}

/// YAML documents; every document after the first is preceded by `---`.
#[derive(Debug, Default)]
pub struct YamlPrinter {
    printed: usize,
}

impl ResourcePrinter for YamlPrinter {
    fn print_obj(&mut self, obj: &Value, out: &mut dyn Write) -> Result<(), PrintError> {
        let doc = serde_yaml::to_string(obj).map_err(|e| PrintError::Encode(e.to_string()))?;
        self.printed += 1;
        if self.printed > 1 {
            out.write_all(b"---\n")?;
        }
        out.write_all(doc.as_bytes())?;
        Ok(())
    }

    fn is_generic(&self) -> bool {
        true
    }

    fn kind(&self) -> PrinterKind {
        PrinterKind::Yaml
    }
}
