//! Recursive export engine
//!
//! Collections fan out into documents, documents fan out into their
//! sub-collections, and every level folds its children into its own record.
//! All levels share one [`ConcurrencyGate`]; each level owns its own
//! [`JoinGroup`] and aggregator, so the only global state is the gate.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ExportError;
use crate::store::{CollectionRef, DocumentRef, DocumentStore, FieldData, NodeRef, RefStream};

use super::gate::{ConcurrencyGate, Lease};
use super::group::JoinGroup;
use super::progress::{ExportSummary, ProgressTracker};
use super::record::ExportRecord;

/// Label used for failures while listing the root collections.
pub const ROOT_SCOPE: &str = "root collections";

/// Exports a whole store, or one subtree of it, into an [`ExportRecord`].
///
/// Cheap to clone; clones share the store, the gate and the progress
/// counters.
#[derive(Clone)]
pub struct Exporter {
    store: Arc<dyn DocumentStore>,
    gate: ConcurrencyGate,
    progress: Arc<ProgressTracker>,
}

/// A node of the tree the engine knows how to export. Boxing the returned
/// future is what lets collections and documents recurse into each other.
trait ExportNode: NodeRef + Send + 'static {
    fn export(
        self,
        exporter: Exporter,
        cancel: CancellationToken,
        lease: Lease,
    ) -> BoxFuture<'static, Result<ExportRecord, ExportError>>;
}

impl ExportNode for CollectionRef {
    fn export(
        self,
        exporter: Exporter,
        cancel: CancellationToken,
        lease: Lease,
    ) -> BoxFuture<'static, Result<ExportRecord, ExportError>> {
        async move {
            let path = self.path.clone();
            exporter
                .run_collection(cancel, lease, self)
                .await
                .map_err(|err| err.within_collection(&path))
        }
        .boxed()
    }
}

impl ExportNode for DocumentRef {
    fn export(
        self,
        exporter: Exporter,
        cancel: CancellationToken,
        lease: Lease,
    ) -> BoxFuture<'static, Result<ExportRecord, ExportError>> {
        exporter.run_document(cancel, lease, self).boxed()
    }
}

/// Per-level accumulation of child records.
#[derive(Clone, Default)]
struct Aggregator {
    record: Arc<Mutex<ExportRecord>>,
}

impl Aggregator {
    fn insert(&self, key: String, child: ExportRecord) {
        let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        if record.insert_record(key.as_str(), child).is_some() {
            warn!(key = %key, "identifier enumerated twice, keeping the last export");
        }
    }

    fn into_record(self) -> ExportRecord {
        std::mem::take(&mut *self.record.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Run a store call, giving up as soon as `cancel` fires.
async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = T>,
) -> Result<T, ExportError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExportError::Cancelled),
        out = call => Ok(out),
    }
}

impl Exporter {
    /// Create an exporter allowing at most `max_concurrency` export tasks to
    /// work against the store at once.
    pub fn new(store: Arc<dyn DocumentStore>, max_concurrency: usize) -> Self {
        Self {
            store,
            gate: ConcurrencyGate::new(max_concurrency),
            progress: Arc::new(ProgressTracker::hidden()),
        }
    }

    /// Report progress through `progress` instead of a hidden tracker.
    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn summary(&self) -> ExportSummary {
        self.progress.summary()
    }

    /// Export every root collection of the store.
    ///
    /// The returned record is keyed by root collection id. On failure no
    /// partial record is returned, and no task of the traversal is still
    /// running when this returns.
    pub async fn export_all(&self, cancel: &CancellationToken) -> Result<ExportRecord, ExportError> {
        info!(max_concurrency = self.gate.capacity(), "starting export");

        let mut lease = Lease::vacant(self.gate.clone());
        let roots = self.store.list_root_collections();
        let result = self.fan_out(cancel, &mut lease, ROOT_SCOPE, roots).await;
        self.progress.finish();

        let summary = self.summary();
        match &result {
            Ok(record) => info!(
                root_collections = record.len(),
                collections = summary.collections,
                documents = summary.documents,
                elapsed_ms = summary.elapsed_ms,
                "export finished"
            ),
            Err(err) if err.is_cancelled() => info!("export cancelled"),
            Err(err) => error!(error = %err, "export failed"),
        }
        result
    }

    /// Export a single collection and everything beneath it.
    pub async fn export_collection(
        &self,
        cancel: &CancellationToken,
        collection: CollectionRef,
    ) -> Result<ExportRecord, ExportError> {
        let lease = Lease::vacant(self.gate.clone());
        collection.export(self.clone(), cancel.clone(), lease).await
    }

    /// Export a single document: its sub-collections merged with its own
    /// fields.
    pub async fn export_document(
        &self,
        cancel: &CancellationToken,
        document: DocumentRef,
    ) -> Result<ExportRecord, ExportError> {
        let lease = Lease::vacant(self.gate.clone());
        document.export(self.clone(), cancel.clone(), lease).await
    }

    async fn run_collection(
        self,
        cancel: CancellationToken,
        mut lease: Lease,
        collection: CollectionRef,
    ) -> Result<ExportRecord, ExportError> {
        debug!(path = %collection.path, "exporting collection");

        let documents = self.store.list_documents(&collection);
        let record = self
            .fan_out(&cancel, &mut lease, &collection.path, documents)
            .await?;

        self.progress.collection_exported();
        Ok(record)
    }

    async fn run_document(
        self,
        cancel: CancellationToken,
        mut lease: Lease,
        document: DocumentRef,
    ) -> Result<ExportRecord, ExportError> {
        debug!(path = %document.path, "exporting document");

        let sub_collections = self.store.list_sub_collections(&document);
        let mut record = self
            .fan_out(&cancel, &mut lease, &document.path, sub_collections)
            .await
            .map_err(|err| err.within_document(&document.path))?;

        lease.hold(&cancel).await?;
        let fields = match cancellable(&cancel, self.store.fetch_fields(&document)).await? {
            Ok(fields) => fields,
            Err(err) if err.is_not_found() => {
                debug!(path = %document.path, "document has no stored fields");
                FieldData::new()
            }
            Err(source) => {
                return Err(ExportError::Fetch {
                    path: document.path.clone(),
                    source,
                });
            }
        };
        lease.release();

        record.merge_fields(fields);
        self.progress.document_exported();
        Ok(record)
    }

    /// Spawn one task per node of `nodes` and collect their records by id.
    ///
    /// The lease is held while pulling the next node and released while
    /// waiting for a child's token or for the children to finish. Each child
    /// starts with the token acquired for it here.
    async fn fan_out<N: ExportNode>(
        &self,
        cancel: &CancellationToken,
        lease: &mut Lease,
        scope: &str,
        mut nodes: RefStream<N>,
    ) -> Result<ExportRecord, ExportError> {
        let aggregator = Aggregator::default();
        let mut group = JoinGroup::new(cancel);
        let token = group.token().clone();

        loop {
            if let Err(err) = lease.hold(&token).await {
                group.fail(err);
                break;
            }

            let node = match cancellable(&token, nodes.next()).await {
                Err(err) => {
                    group.fail(err);
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(source))) => {
                    group.fail(ExportError::Enumeration {
                        path: scope.to_string(),
                        source,
                    });
                    break;
                }
                Ok(Some(Ok(node))) => node,
            };
            lease.release();

            let permit = match self.gate.acquire(&token).await {
                Ok(permit) => permit,
                Err(err) => {
                    group.fail(err);
                    break;
                }
            };

            let exporter = self.clone();
            let aggregator = aggregator.clone();
            let child_lease = Lease::held(self.gate.clone(), permit);
            group.spawn(move |child_cancel| async move {
                let key = node.id().to_string();
                let record = node.export(exporter, child_cancel, child_lease).await?;
                aggregator.insert(key, record);
                Ok(())
            });
        }

        lease.release();
        drop(nodes);
        group.wait().await?;
        Ok(aggregator.into_record())
    }
}
