use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::{ExportError, StoreError, StoreErrorKind};
use crate::store::{
    CollectionRef, DocumentRef, DocumentStore, FieldData, MemoryStore, MemoryStoreBuilder,
    RefStream,
};

use super::{ExportRecord, ExportValue, Exporter};

const DEADLINE: Duration = Duration::from_secs(10);

fn scenario() -> MemoryStoreBuilder {
    MemoryStore::builder()
        .document("A/d1", json!({ "x": 1 }))
        .document("A/d1/C/d2", json!({ "y": 2 }))
        .collection("B")
}

/// Three levels of collections, `width` documents per collection.
fn wide_tree(width: usize) -> MemoryStoreBuilder {
    let mut builder = MemoryStore::builder();
    for a in 0..width {
        builder = builder.document(&format!("top/t{a}"), json!({ "n": a }));
        for b in 0..width {
            let mid = format!("top/t{a}/mid/m{b}");
            builder = builder.document(&mid, json!({ "n": b, "tag": format!("{a}-{b}") }));
            for c in 0..width {
                builder = builder.document(&format!("{mid}/leaf/l{c}"), json!({ "n": c }));
            }
        }
    }
    builder.collection("empty")
}

async fn export(store: MemoryStore, capacity: usize) -> Result<ExportRecord, ExportError> {
    let exporter = Exporter::new(Arc::new(store), capacity);
    tokio::time::timeout(DEADLINE, exporter.export_all(&CancellationToken::new()))
        .await
        .expect("export did not finish, traversal is stuck")
}

fn as_json(record: &ExportRecord) -> serde_json::Value {
    serde_json::to_value(record).unwrap()
}

#[tokio::test]
async fn test_scenario_snapshot() {
    let record = export(scenario().build().unwrap(), 4).await.unwrap();

    assert_eq!(
        as_json(&record),
        json!({
            "A": { "d1": { "x": 1, "C": { "d2": { "y": 2 } } } },
            "B": {}
        })
    );
}

#[tokio::test]
async fn test_capacity_one_matches_capacity_hundred() {
    let narrow = export(scenario().build().unwrap(), 1).await.unwrap();
    let wide = export(scenario().build().unwrap(), 100).await.unwrap();
    assert_eq!(narrow, wide);

    let narrow = export(wide_tree(4).build().unwrap(), 1).await.unwrap();
    let wide = export(wide_tree(4).build().unwrap(), 100).await.unwrap();
    assert_eq!(narrow, wide);
}

#[tokio::test]
async fn test_collection_keys_match_enumerated_documents() {
    let record = export(wide_tree(5).build().unwrap(), 8).await.unwrap();

    let top = record.get_record("top").unwrap();
    let keys: Vec<_> = top.keys().collect();
    assert_eq!(keys, vec!["t0", "t1", "t2", "t3", "t4"]);

    let mid = top
        .get_record("t3")
        .and_then(|t3| t3.get_record("mid"))
        .unwrap();
    assert_eq!(mid.len(), 5);
    assert!(record.get_record("empty").unwrap().is_empty());
}

#[tokio::test]
async fn test_field_wins_over_sub_collection() {
    let store = MemoryStore::builder()
        .document("A/d1", json!({ "C": "field value", "z": true }))
        .document("A/d1/C/d2", json!({ "y": 2 }))
        .build()
        .unwrap();

    let record = export(store, 2).await.unwrap();
    assert_eq!(
        as_json(&record),
        json!({ "A": { "d1": { "C": "field value", "z": true } } })
    );
}

#[tokio::test]
async fn test_container_document_exports_only_its_sub_collections() {
    let store = MemoryStore::builder()
        .container("A/ghost")
        .document("A/ghost/C/d2", json!({ "y": 2 }))
        .build()
        .unwrap();

    let record = export(store, 2).await.unwrap();
    let ghost = record
        .get_record("A")
        .and_then(|a| a.get_record("ghost"))
        .unwrap();
    assert_eq!(as_json(ghost), json!({ "C": { "d2": { "y": 2 } } }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_store_calls_never_exceed_capacity() {
    for capacity in [1, 3, 7] {
        let store = wide_tree(3)
            .latency(Duration::from_millis(2))
            .build()
            .unwrap();
        let probe = store.probe();

        export(store, capacity).await.unwrap();
        assert!(
            probe.peak() <= capacity,
            "peak {} above capacity {capacity}",
            probe.peak()
        );
        assert_eq!(probe.active(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_work_runs_in_parallel() {
    let store = wide_tree(3)
        .latency(Duration::from_millis(5))
        .build()
        .unwrap();
    let probe = store.probe();

    export(store, 16).await.unwrap();
    assert!(probe.peak() > 1);
    assert!(probe.peak() <= 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deep_fetch_failure_fails_the_export() {
    let store = wide_tree(3)
        .fail_fetch("top/t1/mid/m2/leaf/l0")
        .latency(Duration::from_millis(1))
        .build()
        .unwrap();
    let probe = store.probe();

    let err = export(store, 4).await.unwrap_err();
    assert!(!err.is_cancelled());
    assert_eq!(err.origin_path(), Some("top/t1/mid/m2/leaf/l0"));

    let message = err.to_string();
    assert!(message.starts_with("failed to export collection top: "));
    assert!(message.contains("failed to export sub-collections for document top/t1/mid/m2"));
    assert!(message.contains("failed to get document data top/t1/mid/m2/leaf/l0"));

    // nothing keeps running once the export has returned
    assert_eq!(probe.active(), 0);
    let calls = probe.calls();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(probe.calls(), calls);
}

#[tokio::test]
async fn test_enumeration_failure_fails_the_export() {
    let store = wide_tree(2).fail_listing_after("top/t1/mid", 1).build().unwrap();

    let err = export(store, 4).await.unwrap_err();
    match &err {
        ExportError::Collection { path, source } => {
            assert_eq!(path, "top");
            assert!(matches!(**source, ExportError::Document { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.origin_path(), Some("top/t1/mid"));
    assert!(err.to_string().contains("failed to iterate over top/t1/mid"));
}

#[tokio::test]
async fn test_root_listing_failure() {
    let store = scenario().fail_listing("").build().unwrap();

    let err = export(store, 4).await.unwrap_err();
    assert!(matches!(err, ExportError::Enumeration { .. }));
    assert_eq!(err.origin_path(), Some(super::ROOT_SCOPE));
}

#[tokio::test]
async fn test_cancel_before_start() {
    let store = scenario().build().unwrap();
    let probe = store.probe();
    let exporter = Exporter::new(Arc::new(store), 4);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = exporter.export_all(&cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(probe.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_during_export() {
    let store = wide_tree(4)
        .latency(Duration::from_millis(20))
        .build()
        .unwrap();
    let probe = store.probe();
    let exporter = Exporter::new(Arc::new(store), 2);
    let cancel = CancellationToken::new();

    let running = {
        let exporter = exporter.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { exporter.export_all(&cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(60)).await;
    cancel.cancel();

    let result = tokio::time::timeout(DEADLINE, running)
        .await
        .expect("cancelled export did not return")
        .unwrap();
    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(probe.active(), 0);
    assert_eq!(exporter.gate().outstanding(), 0);
}

#[tokio::test]
async fn test_export_subtrees() {
    let store = scenario().build().unwrap();
    let exporter = Exporter::new(Arc::new(store), 2);
    let cancel = CancellationToken::new();

    let a = CollectionRef::root("A");
    let collection = exporter.export_collection(&cancel, a.clone()).await.unwrap();
    assert_eq!(
        as_json(&collection),
        json!({ "d1": { "x": 1, "C": { "d2": { "y": 2 } } } })
    );

    let document = exporter
        .export_document(&cancel, a.document("d1").sub_collection("C").document("d2"))
        .await
        .unwrap();
    assert_eq!(document.get("y"), Some(&ExportValue::Field(json!(2))));
}

#[tokio::test]
async fn test_summary_counts_exported_nodes() {
    let store = scenario().build().unwrap();
    let exporter = Exporter::new(Arc::new(store), 2);
    exporter.export_all(&CancellationToken::new()).await.unwrap();

    let summary = exporter.summary();
    assert_eq!(summary.documents, 2);
    // A, B and A/d1/C
    assert_eq!(summary.collections, 3);
}

/// Lists the root collection `A` twice.
struct RepeatingStore;

#[async_trait]
impl DocumentStore for RepeatingStore {
    fn list_root_collections(&self) -> RefStream<CollectionRef> {
        stream::iter(["A", "A"].map(|id| Ok(CollectionRef::root(id)))).boxed()
    }

    fn list_documents(&self, collection: &CollectionRef) -> RefStream<DocumentRef> {
        let document = collection.document("d1");
        stream::iter([Ok(document)]).boxed()
    }

    fn list_sub_collections(&self, _document: &DocumentRef) -> RefStream<CollectionRef> {
        stream::empty().boxed()
    }

    async fn fetch_fields(&self, document: &DocumentRef) -> Result<FieldData, StoreError> {
        match document.id.as_str() {
            "d1" => Ok(FieldData::from([("x".to_string(), json!(1))])),
            _ => Err(StoreError::new(StoreErrorKind::Other, "unexpected document")),
        }
    }
}

#[tokio::test]
async fn test_repeated_identifier_keeps_one_entry() {
    let exporter = Exporter::new(Arc::new(RepeatingStore), 4);
    let record = exporter
        .export_all(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(as_json(&record), json!({ "A": { "d1": { "x": 1 } } }));
}

/// Delegates to a [`MemoryStore`] and records every fetched document path.
struct FetchLog {
    inner: MemoryStore,
    fetched: std::sync::Mutex<Vec<String>>,
}

impl FetchLog {
    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for FetchLog {
    fn list_root_collections(&self) -> RefStream<CollectionRef> {
        self.inner.list_root_collections()
    }

    fn list_documents(&self, collection: &CollectionRef) -> RefStream<DocumentRef> {
        self.inner.list_documents(collection)
    }

    fn list_sub_collections(&self, document: &DocumentRef) -> RefStream<CollectionRef> {
        self.inner.list_sub_collections(document)
    }

    async fn fetch_fields(&self, document: &DocumentRef) -> Result<FieldData, StoreError> {
        self.fetched.lock().unwrap().push(document.path.clone());
        self.inner.fetch_fields(document).await
    }
}

#[tokio::test]
async fn test_fields_not_fetched_when_sub_collections_fail() {
    let store = Arc::new(FetchLog {
        inner: scenario().fail_listing("A/d1").build().unwrap(),
        fetched: std::sync::Mutex::new(Vec::new()),
    });
    let exporter = Exporter::new(Arc::clone(&store) as Arc<dyn DocumentStore>, 4);

    let err = exporter
        .export_all(&CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.origin_path(), Some("A/d1"));
    assert!(err.to_string().contains("failed to iterate over A/d1"));
    assert!(store.fetched().is_empty());
}
