//! Document store collaborators
//!
//! The traversal engine only talks to a store through [`DocumentStore`]:
//! three lazy enumerations and one field fetch. Two backends ship with the
//! crate:
//!
//! - [`MongoStore`]: a MongoDB database whose slash-separated collection
//!   names (`users/alice/orders`) describe the tree
//! - [`MemoryStore`]: an in-memory tree with fault injection and a
//!   concurrency probe, used by tests and `--from-json` dry runs

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreError;

pub mod bson_json;
pub mod memory;
pub mod mongo;

pub use memory::{ConcurrencyProbe, MemoryStore, MemoryStoreBuilder};
pub use mongo::MongoStore;

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '/';

/// A document's own fields, normalised to JSON values by the backend.
pub type FieldData = BTreeMap<String, serde_json::Value>;

/// Lazy enumeration of store references; the end of the stream is the end
/// marker, an `Err` item aborts the enumeration.
pub type RefStream<T> = BoxStream<'static, std::result::Result<T, StoreError>>;

/// Identifies a named collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    pub id: String,
    pub path: String,
}

/// Identifies a document inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub id: String,
    pub path: String,
}

/// Common view over collection and document references.
pub trait NodeRef {
    fn id(&self) -> &str;
    fn path(&self) -> &str;
}

impl CollectionRef {
    /// A top-level collection.
    pub fn root(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            path: id.clone(),
            id,
        }
    }

    /// Reference a document of this collection.
    pub fn document(&self, id: impl Into<String>) -> DocumentRef {
        let id = id.into();
        DocumentRef {
            path: format!("{}{PATH_SEPARATOR}{id}", self.path),
            id,
        }
    }
}

impl DocumentRef {
    /// Path of the collection holding this document.
    ///
    /// The id is stripped as a whole, so ids that contain the separator
    /// still resolve to their own collection.
    pub fn collection_path(&self) -> Option<&str> {
        self.path
            .strip_suffix(self.id.as_str())?
            .strip_suffix(PATH_SEPARATOR)
            .filter(|parent| !parent.is_empty())
    }

    /// Reference a sub-collection of this document.
    pub fn sub_collection(&self, id: impl Into<String>) -> CollectionRef {
        let id = id.into();
        CollectionRef {
            path: format!("{}{PATH_SEPARATOR}{id}", self.path),
            id,
        }
    }
}

impl NodeRef for CollectionRef {
    fn id(&self) -> &str {
        &self.id
    }

    fn path(&self) -> &str {
        &self.path
    }
}

impl NodeRef for DocumentRef {
    fn id(&self) -> &str {
        &self.id
    }

    fn path(&self) -> &str {
        &self.path
    }
}

/// Capability set the traversal needs from a hierarchical document store.
///
/// Enumerations must be lazy: no store work happens until the returned
/// stream is polled, so the caller controls when each call is made.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Top-level collections of the store.
    fn list_root_collections(&self) -> RefStream<CollectionRef>;

    /// Documents of a collection, including documents that exist only as
    /// containers of sub-collections.
    fn list_documents(&self, collection: &CollectionRef) -> RefStream<DocumentRef>;

    /// Sub-collections nested directly under a document.
    fn list_sub_collections(&self, document: &DocumentRef) -> RefStream<CollectionRef>;

    /// A document's own fields.
    ///
    /// Must fail with [`StoreErrorKind::NotFound`](crate::error::StoreErrorKind::NotFound)
    /// when the document has no stored content.
    async fn fetch_fields(&self, document: &DocumentRef) -> Result<FieldData, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_paths() {
        let users = CollectionRef::root("users");
        assert_eq!(users.path, "users");

        let alice = users.document("alice");
        assert_eq!(alice.id, "alice");
        assert_eq!(alice.path, "users/alice");

        let orders = alice.sub_collection("orders");
        assert_eq!(orders.id, "orders");
        assert_eq!(orders.path(), "users/alice/orders");
    }

    #[test]
    fn test_collection_path_keeps_whole_id() {
        let users = CollectionRef::root("users");
        assert_eq!(users.document("alice").collection_path(), Some("users"));

        let slashed = users.document("a/b");
        assert_eq!(slashed.path, "users/a/b");
        assert_eq!(slashed.collection_path(), Some("users"));

        let nested = users.document("alice").sub_collection("orders").document("o1");
        assert_eq!(nested.collection_path(), Some("users/alice/orders"));

        let orphan = DocumentRef {
            id: "x".to_string(),
            path: "x".to_string(),
        };
        assert_eq!(orphan.collection_path(), None);
    }
}
