//! `get` end to end: validate, resolve a printer, fetch, then print or watch.

use std::io::Write;
use std::sync::Arc;

use orka_core::{FetchResult, ObjectConverter, ResourceFetcher, TypeResolver};
use orka_printers::{resolve, PrintError, PrinterKind, TabWriter};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::generic::print_generic;
use crate::options::GetOptions;
use crate::session::{flatten_lists, PrintSession, SessionOptions};
use crate::sort::SortState;
use crate::watch::WatchLoop;
use crate::{AggregateError, GetError};

pub struct GetCommand<'a> {
    fetcher: &'a dyn ResourceFetcher,
    converter: &'a dyn ObjectConverter,
    type_resolver: Option<Arc<dyn TypeResolver>>,
}

impl<'a> GetCommand<'a> {
    pub fn new(fetcher: &'a dyn ResourceFetcher, converter: &'a dyn ObjectConverter) -> Self {
        Self { fetcher, converter, type_resolver: None }
    }

    pub fn with_type_resolver(mut self, resolver: Arc<dyn TypeResolver>) -> Self {
        self.type_resolver = Some(resolver);
        self
    }

    pub async fn run(
        &self,
        opts: &GetOptions,
        out: &mut dyn Write,
        err_out: &mut dyn Write,
        cancel: &CancellationToken,
    ) -> Result<(), GetError> {
        opts.validate()?;
        let flags = opts.print_flags(self.type_resolver.clone());
        let mut printer = resolve(&opts.output, &flags)?;

        if opts.is_watch() {
            let request = opts.fetch_request(false);
            let mut sink = TabWriter::new(out);
            let mut watch = WatchLoop::new(self.fetcher, self.converter, opts.watch_only);
            let res = watch.run(&request, printer.as_mut(), &mut sink, cancel).await;
            sink.flush().map_err(PrintError::from)?;
            let state = res?;
            info!(state = ?state, rendered = watch.rendered(), "watch finished");
            return Ok(());
        }

        let generic = printer.is_generic();
        let sort_by = opts.sort_by.as_deref().filter(|s| !s.is_empty());
        let server_print = opts.server_print && printer.kind() == PrinterKind::HumanTable && sort_by.is_none();
        let request = opts.fetch_request(server_print);
        let mut result = match self.fetcher.fetch(&request).await {
            Ok(r) => r,
            Err(e) if e.is_not_found() && opts.ignore_not_found => FetchResult::default(),
            Err(e) => return Err(e.into()),
        };
        if opts.ignore_not_found {
            result.errors.retain(|e| !e.is_not_found());
        }
        debug!(items = result.len(), errors = result.errors.len(), generic, server_print, "fetched");

        if generic {
            return print_generic(&result, printer.as_mut(), sort_by, opts.ignore_not_found, out);
        }
        if !result.errors.is_empty() {
            let errors: AggregateError = result.errors.into_iter().collect();
            return errors.into_result();
        }

        let items = flatten_lists(result.items);
        let sort = match sort_by {
            Some(field) if items.len() > 1 => {
                let objs: Vec<&Value> = items.iter().map(|i| &i.object).collect();
                Some(SortState::new(field, &objs)?)
            }
            _ => None,
        };

        let mut sink = TabWriter::new(out);
        let options = SessionOptions { ignore_not_found: opts.ignore_not_found, prefer_tables: server_print, note: None };
        let res = PrintSession::new(printer.as_mut(), options).run(&items, sort.as_ref(), &mut sink, err_out);
        sink.flush().map_err(PrintError::from)?;
        res.map(|_| ())
    }
}
