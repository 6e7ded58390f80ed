//! Orka `get`: drives fetched objects through a resolved printer, either once
//! (print session) or continuously (watch loop).

#![forbid(unsafe_code)]

pub mod command;
pub mod error;
pub mod generic;
pub mod options;
pub mod session;
pub mod sort;
pub mod watch;

pub use command::GetCommand;
pub use error::{AggregateError, GetError};
pub use generic::{print_generic, wrap_in_list};
pub use options::{chunk_size_from_env, GetOptions, DEFAULT_CHUNK_SIZE};
pub use session::{flatten_lists, PrintSession, SessionOptions, NO_RESOURCES_FOUND};
pub use sort::SortState;
pub use watch::{WatchLoop, WatchState};
