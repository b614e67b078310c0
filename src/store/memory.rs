//! In-memory document store
//!
//! A tree of collections and documents held in memory. Besides serving
//! `--from-json` dry runs it is the instrumented store of the test-suite:
//! enumerations and fetches can be made to fail at a given path, every call
//! can be slowed down, and a [`ConcurrencyProbe`] records how many store calls
//! were in flight at once.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use serde_json::Value;

use crate::error::{StoreError, StoreErrorKind};

use super::{
    CollectionRef, DocumentRef, DocumentStore, FieldData, PATH_SEPARATOR, RefStream,
};

/// Counts concurrent store calls.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

/// Marks one store call as in flight until dropped.
#[derive(Debug)]
pub struct ProbeGuard {
    probe: Arc<ConcurrencyProbe>,
}

impl ConcurrencyProbe {
    pub fn enter(self: &Arc<Self>) -> ProbeGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        ProbeGuard {
            probe: Arc::clone(self),
        }
    }

    /// Store calls in flight right now.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of store calls observed in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Store calls started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
struct MemCollection {
    documents: BTreeMap<String, MemDocument>,
}

#[derive(Debug, Clone, Default)]
struct MemDocument {
    /// `None` for documents that only hold sub-collections.
    fields: Option<FieldData>,
    collections: BTreeMap<String, MemCollection>,
}

#[derive(Debug, Default)]
struct Faults {
    /// Listing path (empty for the root) -> items yielded before failing.
    listings: HashMap<String, usize>,
    fetches: HashSet<String>,
}

#[derive(Debug)]
struct Inner {
    root: BTreeMap<String, MemCollection>,
    faults: Faults,
    latency: Option<Duration>,
    probe: Arc<ConcurrencyProbe>,
}

/// Immutable in-memory store; cheap to clone.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

/// Builder for [`MemoryStore`], addressed by slash-separated paths.
#[derive(Debug, Default)]
pub struct MemoryStoreBuilder {
    root: BTreeMap<String, MemCollection>,
    faults: Faults,
    latency: Option<Duration>,
    invalid_paths: Vec<String>,
}

fn split_path(path: &str) -> Vec<&str> {
    path.split(PATH_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect()
}

fn collection_mut<'a>(
    collections: &'a mut BTreeMap<String, MemCollection>,
    segments: &[&str],
) -> &'a mut MemCollection {
    let collection = collections.entry(segments[0].to_string()).or_default();
    if segments.len() == 1 {
        return collection;
    }
    let document = collection.documents.entry(segments[1].to_string()).or_default();
    collection_mut(&mut document.collections, &segments[2..])
}

impl MemoryStoreBuilder {
    fn document_mut(&mut self, path: &str) -> Option<&mut MemDocument> {
        let segments = split_path(path);
        if segments.is_empty() || segments.len() % 2 != 0 {
            self.invalid_paths.push(path.to_string());
            return None;
        }
        let (id, parent) = segments.split_last()?;
        let collection = collection_mut(&mut self.root, parent);
        Some(collection.documents.entry(id.to_string()).or_default())
    }

    /// Ensure a (possibly empty) collection exists at `path`.
    pub fn collection(mut self, path: &str) -> Self {
        let segments = split_path(path);
        if segments.len() % 2 == 1 {
            collection_mut(&mut self.root, &segments);
        } else {
            self.invalid_paths.push(path.to_string());
        }
        self
    }

    /// Store a document with its own fields.
    ///
    /// A JSON object becomes the document's fields, `null` leaves the document
    /// without stored content, any other value is stored under `value`.
    /// Missing ancestors are created as field-less containers.
    pub fn document(mut self, path: &str, fields: Value) -> Self {
        if let Some(document) = self.document_mut(path) {
            document.fields = match fields {
                Value::Object(map) => Some(map.into_iter().collect()),
                Value::Null => None,
                other => Some(FieldData::from([("value".to_string(), other)])),
            };
        }
        self
    }

    /// A document that exists only as a container of sub-collections.
    pub fn container(mut self, path: &str) -> Self {
        self.document_mut(path);
        self
    }

    /// Make the listing under `path` fail on its first element. The empty
    /// path addresses the root collection listing.
    pub fn fail_listing(self, path: &str) -> Self {
        self.fail_listing_after(path, 0)
    }

    /// Make the listing under `path` fail after yielding `items` elements.
    pub fn fail_listing_after(mut self, path: &str, items: usize) -> Self {
        self.faults
            .listings
            .insert(split_path(path).join("/"), items);
        self
    }

    /// Make fetching the fields of the document at `path` fail.
    pub fn fail_fetch(mut self, path: &str) -> Self {
        self.faults.fetches.insert(split_path(path).join("/"));
        self
    }

    /// Delay every store call.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn build(self) -> Result<MemoryStore, StoreError> {
        if !self.invalid_paths.is_empty() {
            return Err(StoreError::new(
                StoreErrorKind::InvalidData,
                format!("invalid store paths: {}", self.invalid_paths.join(", ")),
            ));
        }

        Ok(MemoryStore {
            inner: Arc::new(Inner {
                root: self.root,
                faults: self.faults,
                latency: self.latency,
                probe: Arc::new(ConcurrencyProbe::default()),
            }),
        })
    }
}

impl MemoryStore {
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    /// Build a store from a nested JSON description:
    ///
    /// ```json
    /// { "users": { "alice": { "fields": { "age": 30 },
    ///                         "collections": { "orders": { "o1": { "fields": {} } } } } } }
    /// ```
    ///
    /// A document without a `fields` key has no stored content.
    pub fn from_json(description: &Value) -> Result<Self, StoreError> {
        fn invalid(path: &str, expected: &str) -> StoreError {
            StoreError::new(
                StoreErrorKind::InvalidData,
                format!("expected {expected} at '{path}'"),
            )
        }

        fn collections(
            mut builder: MemoryStoreBuilder,
            prefix: &str,
            value: &Value,
        ) -> Result<MemoryStoreBuilder, StoreError> {
            let entries = value
                .as_object()
                .ok_or_else(|| invalid(prefix, "an object of collections"))?;

            for (collection_id, documents) in entries {
                let collection_path = if prefix.is_empty() {
                    collection_id.clone()
                } else {
                    format!("{prefix}/{collection_id}")
                };
                builder = builder.collection(&collection_path);

                let documents = documents
                    .as_object()
                    .ok_or_else(|| invalid(&collection_path, "an object of documents"))?;

                for (document_id, document) in documents {
                    let document_path = format!("{collection_path}/{document_id}");
                    let document = document
                        .as_object()
                        .ok_or_else(|| invalid(&document_path, "a document object"))?;

                    builder = match document.get("fields") {
                        Some(fields @ Value::Object(_)) => {
                            builder.document(&document_path, fields.clone())
                        }
                        Some(_) => return Err(invalid(&document_path, "an object of fields")),
                        None => builder.container(&document_path),
                    };

                    if let Some(nested) = document.get("collections") {
                        builder = collections(builder, &document_path, nested)?;
                    }
                }
            }

            Ok(builder)
        }

        collections(Self::builder(), "", description)?.build()
    }

    /// Probe shared by every call made against this store.
    pub fn probe(&self) -> Arc<ConcurrencyProbe> {
        Arc::clone(&self.inner.probe)
    }

    fn listing<T>(&self, key: &str, ids: Vec<String>, make: impl Fn(String) -> T + Send + 'static) -> RefStream<T>
    where
        T: Send + 'static,
    {
        let fail_after = self.inner.faults.listings.get(key).copied();
        let key = key.to_string();
        let state = (Arc::clone(&self.inner), ids.into_iter(), 0usize, false);

        stream::unfold(state, move |(inner, mut ids, yielded, failed)| {
            let key = key.clone();
            async move {
                if failed {
                    return None;
                }

                let outcome = {
                    let _call = inner.probe.enter();
                    inner.pause().await;
                    if fail_after == Some(yielded) {
                        Some(Err(StoreError::new(
                            StoreErrorKind::Unavailable,
                            format!("injected listing failure at '{key}'"),
                        )))
                    } else {
                        ids.next().map(Ok)
                    }
                };

                let failed = matches!(outcome, Some(Err(_)));
                outcome.map(|item| (item, (inner, ids, yielded + 1, failed)))
            }
        })
        .map_ok(make)
        .boxed()
    }
}

impl Inner {
    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn collection(&self, path: &str) -> Option<&MemCollection> {
        let segments = split_path(path);
        let (first, rest) = segments.split_first()?;
        let mut collection = self.root.get(*first)?;
        for pair in rest.chunks(2) {
            let [document_id, collection_id] = pair else {
                return None;
            };
            collection = collection
                .documents
                .get(*document_id)?
                .collections
                .get(*collection_id)?;
        }
        Some(collection)
    }

    fn document(&self, path: &str) -> Option<&MemDocument> {
        let (collection_path, document_id) = path.rsplit_once(PATH_SEPARATOR)?;
        self.collection(collection_path)?.documents.get(document_id)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn list_root_collections(&self) -> RefStream<CollectionRef> {
        let ids = self.inner.root.keys().cloned().collect();
        self.listing("", ids, CollectionRef::root)
    }

    fn list_documents(&self, collection: &CollectionRef) -> RefStream<DocumentRef> {
        let ids = self
            .inner
            .collection(&collection.path)
            .map(|found| found.documents.keys().cloned().collect())
            .unwrap_or_default();
        let parent = collection.clone();
        self.listing(&collection.path, ids, move |id| parent.document(id))
    }

    fn list_sub_collections(&self, document: &DocumentRef) -> RefStream<CollectionRef> {
        let ids = self
            .inner
            .document(&document.path)
            .map(|found| found.collections.keys().cloned().collect())
            .unwrap_or_default();
        let parent = document.clone();
        self.listing(&document.path, ids, move |id| parent.sub_collection(id))
    }

    async fn fetch_fields(&self, document: &DocumentRef) -> Result<FieldData, StoreError> {
        let _call = self.inner.probe.enter();
        self.inner.pause().await;

        if self.inner.faults.fetches.contains(&document.path) {
            return Err(StoreError::new(
                StoreErrorKind::Unavailable,
                format!("injected fetch failure at '{}'", document.path),
            ));
        }

        match self.inner.document(&document.path) {
            Some(MemDocument {
                fields: Some(fields),
                ..
            }) => Ok(fields.clone()),
            _ => Err(StoreError::not_found(format!(
                "document '{}' has no stored content",
                document.path
            ))),
        }
    }
}
