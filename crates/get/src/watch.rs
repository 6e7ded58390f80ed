//! `get --watch`: one fetch, an optional snapshot render, then a stream of changes.
//!
//! ```text
//! Init -> InitialSnapshot (skipped with --watch-only) -> Streaming -> ClosedClean
//!                                                                  -> ClosedError
//!                                                                  -> Cancelled
//! ```

use std::io::Write;

use futures::StreamExt;
use metrics::counter;
use orka_core::{object, EventType, FetchError, FetchRequest, Info, Mapping, ObjectConverter, ResourceFetcher};
use orka_printers::{PrintError, ResourcePrinter};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::GetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Init,
    InitialSnapshot,
    Streaming,
    ClosedClean,
    ClosedError,
    Cancelled,
}

impl WatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WatchState::ClosedClean | WatchState::ClosedError | WatchState::Cancelled)
    }
}

pub struct WatchLoop<'a> {
    fetcher: &'a dyn ResourceFetcher,
    converter: &'a dyn ObjectConverter,
    watch_only: bool,
    state: WatchState,
    rendered: usize,
}

impl<'a> WatchLoop<'a> {
    pub fn new(fetcher: &'a dyn ResourceFetcher, converter: &'a dyn ObjectConverter, watch_only: bool) -> Self {
        Self { fetcher, converter, watch_only, state: WatchState::Init, rendered: 0 }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Objects rendered so far, snapshot included.
    pub fn rendered(&self) -> usize {
        self.rendered
    }

    /// Drive the loop to a terminal state. `Ok` carries `ClosedClean` or `Cancelled`;
    /// every failure leaves the loop in `ClosedError`.
    pub async fn run(
        &mut self,
        request: &FetchRequest,
        printer: &mut dyn ResourcePrinter,
        out: &mut dyn Write,
        cancel: &CancellationToken,
    ) -> Result<WatchState, GetError> {
        let res = self.drive(request, printer, out, cancel).await;
        if res.is_err() {
            self.state = WatchState::ClosedError;
        }
        res
    }

    async fn drive(
        &mut self,
        request: &FetchRequest,
        printer: &mut dyn ResourcePrinter,
        out: &mut dyn Write,
        cancel: &CancellationToken,
    ) -> Result<WatchState, GetError> {
        self.state = WatchState::Init;
        let result = self.fetcher.fetch(request).await?;
        if let Some(e) = result.errors.first() {
            return Err(e.clone().into());
        }
        let Some(first) = result.items.first() else {
            return Err(FetchError::NotFound(request.args.join(" ")).into());
        };

        let kinds = distinct_kinds(&result.items);
        if kinds > 1 {
            return Err(GetError::Validation(format!(
                "watch is only supported on individual resources and resource collections - {} resources were found",
                kinds
            )));
        }

        // several named objects would need one watch each; chunked lists are fine
        if result.items.len() > 1 && result.items.iter().any(|i| !object::is_list(&i.object)) {
            return Err(GetError::Validation(format!(
                "watch is only supported on individual resources and resource collections - {} resources were found",
                result.items.len()
            )));
        }

        let mapping = first.mapping.clone();
        let is_list = object::is_list(&first.object);
        let cursor = match object::resource_version(&first.object) {
            Some(rv) if is_list && !rv.is_empty() => rv.to_string(),
            _ => "0".to_string(),
        };

        if !self.watch_only {
            self.state = WatchState::InitialSnapshot;
            for info in &result.items {
                match object::list_items(&info.object) {
                    Some(members) => {
                        for m in members {
                            self.render(m, &info.mapping, printer, out)?;
                        }
                    }
                    None => self.render(&info.object, &info.mapping, printer, out)?,
                }
            }
            out.flush().map_err(PrintError::from)?;
        }

        self.state = WatchState::Streaming;
        let mut stream = self.fetcher.watch(request, &mapping, &cursor).await?;
        info!(kind = %mapping.kind, resource_version = %cursor, list = is_list, "watch opened");

        let mut suppress_first = !is_list;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    drop(stream);
                    info!(kind = %mapping.kind, rendered = self.rendered, "watch cancelled");
                    self.state = WatchState::Cancelled;
                    return Ok(self.state);
                }
                next = stream.next() => next,
            };
            let event = match next {
                None => {
                    info!(kind = %mapping.kind, rendered = self.rendered, "watch closed");
                    self.state = WatchState::ClosedClean;
                    return Ok(self.state);
                }
                Some(Err(e)) => {
                    warn!(kind = %mapping.kind, error = %e, "watch stream error");
                    return Err(GetError::WatchStream(e.to_string()));
                }
                Some(Ok(ev)) => ev,
            };
            counter!("watch_events_total", 1u64);
            match event.event_type {
                EventType::Bookmark => continue,
                EventType::Error => {
                    let msg = status_message(&event.object);
                    warn!(kind = %mapping.kind, error = %msg, "watch error event");
                    return Err(GetError::WatchStream(msg));
                }
                EventType::Added | EventType::Modified | EventType::Deleted => {}
            }
            if suppress_first {
                suppress_first = false;
                counter!("watch_events_suppressed_total", 1u64);
                debug!(kind = %mapping.kind, "suppressed first event of single-object watch");
                continue;
            }
            self.render(&event.object, &mapping, printer, out)?;
            out.flush().map_err(PrintError::from)?;
        }
    }

    /// Render the display conversion of `obj`, or `obj` itself when conversion fails.
    fn render(&mut self, obj: &Value, mapping: &Mapping, printer: &mut dyn ResourcePrinter, out: &mut dyn Write) -> Result<(), GetError> {
        let converted = match self.converter.convert_for_display(obj, mapping) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(kind = %mapping.kind, error = %e, "printing unconverted object");
                None
            }
        };
        printer.print_obj(converted.as_ref().unwrap_or(obj), out)?;
        self.rendered += 1;
        Ok(())
    }
}

fn distinct_kinds(items: &[Info]) -> usize {
    let mut seen: Vec<&Mapping> = Vec::new();
    for info in items {
        if !seen.iter().any(|m| m.same_kind(&info.mapping)) {
            seen.push(&info.mapping);
        }
    }
    seen.len()
}

fn status_message(obj: &Value) -> String {
    obj.get("message").and_then(|m| m.as_str()).map(|s| s.to_string()).unwrap_or_else(|| obj.to_string())
}
