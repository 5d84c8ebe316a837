//! `nodes` crate — the `TaskRunner` trait, its collaborators, and the
//! built-in sailing tasks.
//!
//! Every task must implement [`TaskRunner`]. The engine crate dispatches
//! execution through this trait object and owns the shared state; runners
//! only ever see a read-only [`Snapshot`].

pub mod error;
pub mod mock;
pub mod oracle;
pub mod resolver;
pub mod sailing;
pub mod source;
pub mod traits;

pub use error::NodeError;
pub use oracle::{Oracle, OracleError, OracleRequest, StructuredOutput};
pub use resolver::{resolve, resolve_source, CandidateFailure, ExhaustedError, Outcome, Resolved};
pub use source::{DataSource, DataSourceError, SourceQuery, SourceResponse};
pub use traits::{LogEntry, RunContext, Snapshot, TaskRegistry, TaskRunner};
