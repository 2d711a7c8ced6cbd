//! In-process record/edge/cluster/golden-record store (§6): the default
//! backend for single-process runs. Records, edges, clusters and golden
//! records live in locked in-memory maps; `text_search` is backed by the
//! same tantivy views `entitylink::index_setup::IndexSetup` builds, so
//! blocking strategies get a real BM25 score rather than a stub.
//!
//! "Embedded" means one process owns both the document store and the
//! index, with no network round-trip between them.

use async_trait::async_trait;
use entitylink::index_setup::{AnalyzerKind, IndexSetup};
use entitylink::model::{Cluster, GoldenRecord, SimilarityEdge};
use entitylink::record::{Record, RecordId};
use entitylink::store::{
    ClusterStore, EdgeFilter, EdgeStore, GoldenRecordStore, RecordStore, TextQuerySpec,
    TextSearchHit,
};
use entitylink::{config::AnalyzersConfig, Error, Result};
use futures::stream::{self, BoxStream};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{TantivyDocument, Term};

/// Declares one indexed view over a single field (§4A `create_view`):
/// which analyzer builds it and, optionally, which other field narrows
/// hits to a shared bucket (the "constraint field" §4B strategy 3 needs).
#[derive(Debug, Clone)]
pub struct ViewSpec {
    pub name: String,
    pub field: String,
    pub analyzer: AnalyzerKind,
    pub constraint_field: Option<String>,
}

type RecordMap = HashMap<RecordId, Record>;

/// The embedded backend. Construct with [`EmbeddedStore::in_memory`] for
/// tests/ephemeral runs or [`EmbeddedStore::on_disk`] to persist the
/// tantivy text-index segments; records/edges/clusters/golden records
/// themselves stay process-lifetime only even in the on-disk mode, since
/// spec.md explicitly scopes out persistence-format lock-in beyond the
/// abstract store traits (§1 Non-goals).
pub struct EmbeddedStore {
    records: RwLock<HashMap<String, RecordMap>>,
    edges: RwLock<HashMap<(RecordId, RecordId), SimilarityEdge>>,
    clusters: RwLock<Vec<Cluster>>,
    golden: RwLock<HashMap<String, GoldenRecord>>,
    index: Mutex<IndexSetup>,
    view_specs: RwLock<Vec<ViewSpec>>,
}

impl EmbeddedStore {
    pub fn in_memory() -> Self {
        Self::new(IndexSetup::in_memory())
    }

    pub fn on_disk(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(IndexSetup::on_disk(base_dir))
    }

    fn new(index: IndexSetup) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            edges: RwLock::new(HashMap::new()),
            clusters: RwLock::new(Vec::new()),
            golden: RwLock::new(HashMap::new()),
            index: Mutex::new(index),
            view_specs: RwLock::new(Vec::new()),
        }
    }

    /// Text index setup (§4A `initialize`): build one tantivy view per
    /// entry in `specs`, then remember the field each view indexes so
    /// later `ingest` calls know what to feed it.
    pub fn setup_views(&self, analyzers: &AnalyzersConfig, specs: Vec<ViewSpec>) -> Result<()> {
        let views: Vec<(String, AnalyzerKind, bool)> = specs
            .iter()
            .map(|s| (s.name.clone(), s.analyzer, s.constraint_field.is_some()))
            .collect();
        self.index.lock().initialize(analyzers, &views)?;
        *self.view_specs.write() = specs;
        Ok(())
    }

    pub fn setup_status(&self) -> Vec<String> {
        self.index.lock().setup_status()
    }

    /// Add one record to the store, and to every view whose field it
    /// carries a non-empty value for.
    pub fn ingest(&self, collection: &str, record: Record) -> Result<()> {
        self.index_into_views(&record)?;
        self.records
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record);
        Ok(())
    }

    pub fn ingest_many(&self, collection: &str, records: Vec<Record>) -> Result<()> {
        for record in records {
            self.ingest(collection, record)?;
        }
        Ok(())
    }

    fn index_into_views(&self, record: &Record) -> Result<()> {
        let specs = self.view_specs.read().clone();
        if specs.is_empty() {
            return Ok(());
        }
        let index_setup = self.index.lock();
        for spec in &specs {
            let Some(text) = record.field_str(&spec.field) else {
                continue;
            };
            if text.trim().is_empty() {
                continue;
            }
            let view = index_setup
                .view(&spec.name)
                .ok_or_else(|| Error::not_found(format!("view \"{}\" is not set up", spec.name)))?;
            let mut writer = index_setup.writer_for(&spec.name, 15_000_000)?;
            let mut doc = TantivyDocument::default();
            doc.add_text(view.fields.id, &record.id);
            doc.add_text(view.fields.text, text);
            if let (Some(constraint_field), Some(constraint_name)) =
                (view.fields.constraint, spec.constraint_field.as_ref())
            {
                if let Some(value) = record.field_str(constraint_name) {
                    doc.add_text(constraint_field, value);
                }
            }
            writer.add_document(doc)?;
            writer.commit()?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for EmbeddedStore {
    async fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        Ok(self
            .records
            .read()
            .get(collection)
            .and_then(|m| m.get(id))
            .cloned())
    }

    async fn get_many(&self, collection: &str, ids: &[RecordId]) -> Result<Vec<Record>> {
        let guard = self.records.read();
        let Some(map) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }

    async fn scan(&self, collection: &str) -> Result<BoxStream<'static, Result<Record>>> {
        let items: Vec<Result<Record>> = self
            .records
            .read()
            .get(collection)
            .map(|m| m.values().cloned().map(Ok).collect())
            .unwrap_or_default();
        Ok(Box::pin(stream::iter(items)))
    }

    async fn text_search(
        &self,
        view: &str,
        query: &TextQuerySpec,
        limit: usize,
    ) -> Result<Vec<TextSearchHit>> {
        let view = {
            let index_setup = self.index.lock();
            index_setup
                .view(view)
                .ok_or_else(|| Error::not_found(format!("view \"{view}\" is not set up")))?
        };

        let mut analyzer = view
            .index
            .tokenizers()
            .get(view.analyzer.tokenizer_name())
            .expect("analyzer registered when the view was created");
        let mut terms = Vec::new();
        {
            let mut stream = analyzer.token_stream(&query.query_text);
            stream.process(&mut |token| {
                terms.push(Term::from_field_text(view.fields.text, &token.text));
            });
        }
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .into_iter()
            .map(|term| {
                let q: Box<dyn Query> = Box::new(TermQuery::new(term, IndexRecordOption::WithFreqsAndPositions));
                (Occur::Should, q)
            })
            .collect();

        if let (Some(constraint_field), Some(value)) =
            (view.fields.constraint, query.constraint_value.as_deref())
        {
            let term = Term::from_field_text(constraint_field, value);
            let q: Box<dyn Query> = Box::new(TermQuery::new(term, IndexRecordOption::Basic));
            clauses.push((Occur::Must, q));
        }

        let boolean_query = BooleanQuery::new(clauses);
        let searcher = view.reader.searcher();
        let top_docs = searcher.search(&boolean_query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr)?;
            let id = doc
                .get_first(view.fields.id)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if id.is_empty() {
                continue;
            }
            hits.push(TextSearchHit { id, score });
        }
        Ok(hits)
    }

    async fn record_count(&self, collection: &str) -> Result<usize> {
        Ok(self.records.read().get(collection).map(HashMap::len).unwrap_or(0))
    }
}

#[async_trait]
impl EdgeStore for EmbeddedStore {
    async fn get_edge(&self, from: &str, to: &str) -> Result<Option<SimilarityEdge>> {
        Ok(self
            .edges
            .read()
            .get(&(from.to_string(), to.to_string()))
            .cloned())
    }

    async fn upsert_edge(&self, edge: SimilarityEdge) -> Result<()> {
        self.edges.write().insert(edge.key(), edge);
        Ok(())
    }

    async fn bulk_upsert(&self, edges: Vec<SimilarityEdge>) -> Result<()> {
        let mut guard = self.edges.write();
        for edge in edges {
            guard.insert(edge.key(), edge);
        }
        Ok(())
    }

    async fn delete_where(&self, filter: &EdgeFilter) -> Result<usize> {
        let mut guard = self.edges.write();
        let before = guard.len();
        guard.retain(|_, edge| !filter.matches(edge));
        Ok(before - guard.len())
    }

    async fn scan_edges(&self) -> Result<BoxStream<'static, Result<SimilarityEdge>>> {
        let items: Vec<Result<SimilarityEdge>> = self.edges.read().values().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }

    async fn truncate(&self) -> Result<()> {
        self.edges.write().clear();
        Ok(())
    }

    async fn edge_count(&self) -> Result<usize> {
        Ok(self.edges.read().len())
    }
}

#[async_trait]
impl ClusterStore for EmbeddedStore {
    async fn truncate(&self) -> Result<()> {
        self.clusters.write().clear();
        Ok(())
    }

    async fn bulk_insert(&self, clusters: Vec<Cluster>) -> Result<()> {
        self.clusters.write().extend(clusters);
        Ok(())
    }

    async fn find_cluster_by_member(&self, id: &str) -> Result<Option<Cluster>> {
        Ok(self
            .clusters
            .read()
            .iter()
            .find(|c| c.member_ids.iter().any(|m| m == id))
            .cloned())
    }

    async fn scan_clusters(&self) -> Result<BoxStream<'static, Result<Cluster>>> {
        let items: Vec<Result<Cluster>> = self.clusters.read().clone().into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

#[async_trait]
impl GoldenRecordStore for EmbeddedStore {
    async fn truncate(&self) -> Result<()> {
        self.golden.write().clear();
        Ok(())
    }

    async fn bulk_insert(&self, records: Vec<GoldenRecord>) -> Result<()> {
        let mut guard = self.golden.write();
        for record in records {
            guard.insert(record.cluster_id.clone(), record);
        }
        Ok(())
    }

    async fn find_by_cluster(&self, cluster_id: &str) -> Result<Option<GoldenRecord>> {
        Ok(self.golden.read().get(cluster_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitylink::config::{AnalyzersConfig, PhoneticAlgorithm};
    use serde_json::json;

    #[tokio::test]
    async fn ingested_records_are_retrievable() {
        let store = EmbeddedStore::in_memory();
        store
            .ingest("people", Record::new("1", "crm").with_field("name", json!("Jon Smith")))
            .unwrap();
        let fetched = store.get_record("people", "1").await.unwrap();
        assert_eq!(fetched.unwrap().id, "1");
    }

    #[tokio::test]
    async fn ngram_view_returns_self_and_near_duplicate() {
        let store = EmbeddedStore::in_memory();
        store
            .setup_views(
                &AnalyzersConfig::default(),
                vec![ViewSpec {
                    name: "people_name_ngram".to_string(),
                    field: "name".to_string(),
                    analyzer: AnalyzerKind::Ngram,
                    constraint_field: None,
                }],
            )
            .unwrap();
        store
            .ingest("people", Record::new("1", "crm").with_field("name", json!("Jon Smith")))
            .unwrap();
        store
            .ingest("people", Record::new("2", "billing").with_field("name", json!("John Smith")))
            .unwrap();

        let hits = store
            .text_search(
                "people_name_ngram",
                &TextQuerySpec {
                    query_text: "Jon Smith".to_string(),
                    fields: vec!["name".to_string()],
                    constraint_field: None,
                    constraint_value: None,
                },
                10,
            )
            .await
            .unwrap();
        assert!(hits.iter().any(|h| h.id == "1"));
        assert!(hits.iter().any(|h| h.id == "2"));
    }

    #[tokio::test]
    async fn constraint_field_narrows_hits() {
        let store = EmbeddedStore::in_memory();
        store
            .setup_views(
                &AnalyzersConfig::default(),
                vec![ViewSpec {
                    name: "people_name_ngram".to_string(),
                    field: "name".to_string(),
                    analyzer: AnalyzerKind::Ngram,
                    constraint_field: Some("state".to_string()),
                }],
            )
            .unwrap();
        store
            .ingest(
                "people",
                Record::new("1", "crm")
                    .with_field("name", json!("Jon Smith"))
                    .with_field("state", json!("CA")),
            )
            .unwrap();
        store
            .ingest(
                "people",
                Record::new("2", "billing")
                    .with_field("name", json!("Jon Smith"))
                    .with_field("state", json!("NY")),
            )
            .unwrap();

        let hits = store
            .text_search(
                "people_name_ngram",
                &TextQuerySpec {
                    query_text: "Jon Smith".to_string(),
                    fields: vec!["name".to_string()],
                    constraint_field: Some("state".to_string()),
                    constraint_value: Some("CA".to_string()),
                },
                10,
            )
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.id != "2"));
    }

    #[tokio::test]
    async fn unknown_view_is_not_found() {
        let store = EmbeddedStore::in_memory();
        let result = store
            .text_search(
                "missing_view",
                &TextQuerySpec {
                    query_text: "x".to_string(),
                    ..Default::default()
                },
                10,
            )
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn phonetic_algorithm_is_just_re_exported_for_callers_building_analyzers_config() {
        let _ = PhoneticAlgorithm::Soundex;
    }
}
