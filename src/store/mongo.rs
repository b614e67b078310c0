//! MongoDB-backed document store
//!
//! MongoDB has no nested collections, so the tree is encoded in collection
//! names: `users` is a root collection, `users/alice/orders` is the
//! `orders` sub-collection of document `alice` in `users`. A document id that
//! appears only in sub-collection names (no stored document) is listed as a
//! container document whose fields are not found.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use mongodb::Database;
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{StoreError, StoreErrorKind};

use super::bson_json::{document_to_fields, id_to_string};
use super::{CollectionRef, DocumentRef, DocumentStore, FieldData, PATH_SEPARATOR, RefStream};

/// Store over one MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
    /// Collection names, read once per store.
    names: Arc<OnceCell<Arc<Vec<String>>>>,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            names: Arc::new(OnceCell::new()),
        }
    }

    /// All non-system collection names of the database.
    async fn collection_names(
        db: Database,
        names: Arc<OnceCell<Arc<Vec<String>>>>,
    ) -> Result<Arc<Vec<String>>, StoreError> {
        let names = names
            .get_or_try_init(|| async {
                let mut all = db.list_collection_names().await?;
                all.retain(|name| !name.starts_with("system."));
                all.sort();
                debug!(database = %db.name(), collections = all.len(), "listed collections");
                Ok::<_, StoreError>(Arc::new(all))
            })
            .await?;
        Ok(Arc::clone(names))
    }

    /// Collections nested directly under `prefix` (or at the root when
    /// `prefix` is `None`).
    fn children_of(&self, prefix: Option<String>) -> RefStream<String> {
        let db = self.db.clone();
        let names = Arc::clone(&self.names);

        stream::once(async move {
            let all = Self::collection_names(db, names).await?;
            let children: Vec<Result<String, StoreError>> = all
                .iter()
                .filter_map(|name| match &prefix {
                    None => Some(name.as_str()),
                    Some(prefix) => name.strip_prefix(prefix.as_str()),
                })
                .filter(|rest| !rest.is_empty() && !rest.contains(PATH_SEPARATOR))
                .map(|rest| Ok(rest.to_string()))
                .collect();
            Ok::<_, StoreError>(stream::iter(children))
        })
        .try_flatten()
        .boxed()
    }

    /// Candidate `_id` values for a document identifier.
    fn id_candidates(id: &str) -> Vec<Bson> {
        let mut candidates = vec![Bson::String(id.to_string())];
        if let Ok(oid) = ObjectId::parse_str(id) {
            candidates.push(Bson::ObjectId(oid));
        }
        if let Ok(n) = id.parse::<i64>() {
            candidates.push(Bson::Int64(n));
            if let Ok(n) = i32::try_from(n) {
                candidates.push(Bson::Int32(n));
            }
        }
        // non-scalar ids are listed in relaxed extended JSON
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(id) {
            if !json.is_string() {
                if let Ok(value) = Bson::try_from(json) {
                    if !candidates.contains(&value) {
                        candidates.push(value);
                    }
                }
            }
        }
        candidates
    }

    /// Identifier of a stored `_id`, provided a later fetch can find the
    /// document again from it.
    fn addressable_id(collection: &str, id: &Bson) -> Result<String, StoreError> {
        let rendered = id_to_string(id);
        if Self::id_candidates(&rendered).contains(id) {
            Ok(rendered)
        } else {
            Err(StoreError::new(
                StoreErrorKind::InvalidData,
                format!("_id {rendered} in '{collection}' cannot be addressed by its identifier"),
            ))
        }
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn list_root_collections(&self) -> RefStream<CollectionRef> {
        self.children_of(None).map_ok(CollectionRef::root).boxed()
    }

    fn list_documents(&self, collection: &CollectionRef) -> RefStream<DocumentRef> {
        let db = self.db.clone();
        let names = Arc::clone(&self.names);
        let parent = collection.clone();
        let prefix = format!("{}{PATH_SEPARATOR}", collection.path);

        // Ids implied by sub-collection names; the ones seen in stored
        // documents are removed while streaming.
        let implied = Arc::new(Mutex::new(BTreeSet::new()));
        let remaining = Arc::clone(&implied);

        let stored = stream::once(async move {
            let all = Self::collection_names(db.clone(), names).await?;
            {
                let mut implied = implied.lock().unwrap_or_else(PoisonError::into_inner);
                for name in all.iter() {
                    if let Some(rest) = name.strip_prefix(prefix.as_str()) {
                        if let Some((id, _)) = rest.split_once(PATH_SEPARATOR) {
                            implied.insert(id.to_string());
                        }
                    }
                }
            }

            let cursor = db
                .collection::<Document>(&parent.path)
                .find(doc! {})
                .projection(doc! { "_id": 1 })
                .await?;

            let collection = parent.path.clone();
            let ids = cursor.map(move |item| {
                let doc = item?;
                let id = match doc.get("_id") {
                    Some(id) => Self::addressable_id(&collection, id)?,
                    None => {
                        return Err(StoreError::new(
                            StoreErrorKind::InvalidData,
                            format!("document without _id in '{collection}'"),
                        ));
                    }
                };
                implied
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                Ok::<_, StoreError>(id)
            });
            Ok::<_, StoreError>(ids)
        })
        .try_flatten();

        let containers = stream::once(async move {
            let ids = std::mem::take(&mut *remaining.lock().unwrap_or_else(PoisonError::into_inner));
            stream::iter(ids.into_iter().map(Ok::<_, StoreError>))
        })
        .flatten();

        let parent = collection.clone();
        stored
            .chain(containers)
            .map_ok(move |id| parent.document(id))
            .boxed()
    }

    fn list_sub_collections(&self, document: &DocumentRef) -> RefStream<CollectionRef> {
        let parent = document.clone();
        self.children_of(Some(format!("{}{PATH_SEPARATOR}", document.path)))
            .map_ok(move |id| parent.sub_collection(id))
            .boxed()
    }

    async fn fetch_fields(&self, document: &DocumentRef) -> Result<FieldData, StoreError> {
        let Some(collection_path) = document.collection_path() else {
            return Err(StoreError::not_found(format!(
                "'{}' is not a document path",
                document.path
            )));
        };

        let filter = doc! { "_id": { "$in": Self::id_candidates(&document.id) } };
        let stored = self
            .db
            .collection::<Document>(collection_path)
            .find_one(filter)
            .await?;

        match stored {
            Some(doc) => Ok(document_to_fields(&doc)),
            None => Err(StoreError::not_found(format!(
                "document '{}' not found",
                document.path
            ))),
        }
    }
}
