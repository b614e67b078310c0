//! docsnap library
//!
//! Exports the whole tree of a hierarchical document store (collections
//! holding documents, documents holding nested sub-collections) into one
//! nested record, walking the tree in parallel under a global concurrency
//! limit.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: MongoDB connection management
//! - `error`: Error types and handling
//! - `export`: The traversal engine, records and output
//! - `store`: Store backends (MongoDB and in-memory)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use docsnap::{config::Config, connection::ConnectionManager, export::Exporter, store::MongoStore};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let mut manager = ConnectionManager::new(config.store.clone());
//!     manager.connect().await?;
//!
//!     let store = MongoStore::new(manager.database()?);
//!     let exporter = Exporter::new(Arc::new(store), config.export.max_concurrency);
//!     let snapshot = exporter.export_all(&CancellationToken::new()).await?;
//!     println!("{} root collections", snapshot.len());
//!
//!     manager.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{DocsnapError, Result};
pub use export::{ExportRecord, ExportValue, Exporter};
pub use store::{DocumentStore, MemoryStore, MongoStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
