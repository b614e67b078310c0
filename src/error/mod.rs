//! Error handling for docsnap.
//!
//! - [`ExportError`]: failures of the traversal engine, carrying the path of
//!   every level an error unwound through
//! - [`StoreError`]: failures reported by a store backend, classified by
//!   [`StoreErrorKind`] so that "document not found" can be told apart
//! - [`DocsnapError`]: the process-level error the CLI reports
//!
//! # Example
//!
//! ```rust
//! use docsnap::error::{DocsnapError, ExportError};
//!
//! let err: DocsnapError = ExportError::Cancelled.within_collection("users").into();
//! assert!(err.is_cancelled());
//! ```

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ConnectionError, DocsnapError, ExportError, Result, StoreError, StoreErrorKind,
};
pub use mongo::ErrorInfo;
