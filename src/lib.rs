//! # foldersync - one-way periodic directory mirroring
//!
//! Keeps a replica directory tree identical to a source tree by re-running a
//! reconciliation cycle on a fixed interval, forever.
//!
//! ## Overview
//!
//! After every successful cycle:
//! - every source directory exists in the replica at the same relative path
//! - every source file exists in the replica with identical content
//! - the replica holds no file or directory the source does not have
//!
//! Between cycles the replica may be stale. The source is never modified.
//!
//! ## Architecture
//!
//! - **[`Reconciler`]**: the tree differ and applier. Phase 1 walks the source
//!   top-down, creating directories and copying new or drifted files. Phase 2
//!   walks the replica bottom-up, deleting extraneous entries. Files are
//!   compared by SHA-256 content [`Fingerprint`], never by timestamp.
//! - **[`Scheduler`]**: runs one cycle per [`Scheduler::step`], and loops with a
//!   pluggable [`Sleeper`] in [`Scheduler::run`].
//! - **[`EventSink`]**: the logging capability both components report to.
//!   [`TracingSink`] feeds `tracing`; [`MemorySink`] is for tests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use foldersync::{MemorySink, Reconciler};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(MemorySink::new());
//! let reconciler = Reconciler::new("./source", "./replica", sink.clone());
//!
//! let report = reconciler.reconcile()?;
//! for message in sink.messages() {
//!     println!("{}", message);
//! }
//! assert_eq!(report.mutation_count(), sink.actions().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, SyncError>`. A missing source root or an
//! unusable replica root stops the cycle; a single unreadable or undeletable
//! entry is logged, recorded in [`CycleReport::failures`], and skipped.
//!
//! ## Limitations
//!
//! Relative paths are compared byte for byte. On case-insensitive
//! filesystems, names differing only in case are not treated as the same
//! entry.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod reconcile;
pub mod scheduler;
pub mod sink;
pub mod types;

mod utils;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use fingerprint::{DigestCache, Fingerprint};
pub use reconcile::Reconciler;
pub use scheduler::{Scheduler, Sleeper, ThreadSleeper};
pub use sink::{EventSink, MemorySink, TracingSink};
pub use types::*;
