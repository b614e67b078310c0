//! Bounded-concurrency recursive export
//!
//! The engine walks a store of unknown depth and fan-out, exporting children
//! in parallel while a single [`ConcurrencyGate`] caps the number of tasks
//! doing store work across the whole tree. The first failure anywhere cancels
//! the traversal and is returned with the path of every level it unwound
//! through.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docsnap::export::Exporter;
//! use docsnap::store::MemoryStore;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> docsnap::error::Result<()> {
//! let store = MemoryStore::builder()
//!     .document("users/alice", json!({ "age": 30 }))
//!     .build()?;
//! let exporter = Exporter::new(Arc::new(store), 16);
//! let snapshot = exporter.export_all(&CancellationToken::new()).await?;
//! assert!(snapshot.get_record("users").is_some());
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod gate;
pub mod group;
pub mod progress;
pub mod record;
pub mod writer;

#[cfg(test)]
mod tests;

pub use engine::{Exporter, ROOT_SCOPE};
pub use gate::{ConcurrencyGate, GatePermit};
pub use group::JoinGroup;
pub use progress::{ExportSummary, ProgressTracker};
pub use record::{ExportRecord, ExportValue};
pub use writer::{OutputOptions, render, write_record, write_record_to};
