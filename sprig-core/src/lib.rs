//! Core implementation of the sprig subprocess execution library. Implements
//! process launching with correct pipe, descriptor, and signal discipline,
//! concurrent output capture, and executable resolution.

mod error;
mod escape;
mod pathcache;
mod pathsearch;
mod processes;
mod resolve;
mod results;
mod sys;
mod trace_categories;

pub use error::{Error, ErrorKind};
pub use pathcache::PathCache;
pub use pathsearch::{search_for_executable, ExecutablePathSearch};
pub use processes::{ChildInput, OutputCallback, OutputRedirection, Process, ProcessId};
pub use resolve::resolve_executable;
pub use results::{ExitStatus, OutputError, OutputResult, ProcessResult};
pub use sys::fs::PathExt;
