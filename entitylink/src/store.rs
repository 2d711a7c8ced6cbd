//! External collaborator abstractions (§6): the record, edge and cluster
//! stores the engine is injected with. Concrete backends (in-memory,
//! file-backed) live in the `entitylink-storage` crate; this crate only
//! depends on the trait.

use crate::model::{Cluster, GoldenRecord, SimilarityEdge};
use crate::record::{Record, RecordId};
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// A single hit from `RecordStore::text_search`: a record id and its
/// relevance score. The score's scale is backend-defined (BM25 for the
/// tantivy-backed implementation) but must be monotonic in relevance —
/// that is the contract blocking strategies rely on, not the underlying
/// index structure (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct TextSearchHit {
    pub id: RecordId,
    pub score: f32,
}

/// A query against an indexed text view. `terms` is the already-tokenized
/// query text (the caller is responsible for running it through the same
/// analyzer the view was built with); `constraint` optionally restricts
/// hits to records sharing a value in `constraint_field` (§4B strategy 3's
/// "constraint field").
#[derive(Debug, Clone, Default)]
pub struct TextQuerySpec {
    pub query_text: String,
    pub fields: Vec<String>,
    pub constraint_field: Option<String>,
    pub constraint_value: Option<String>,
}

/// Consumed by the blocking engine and the similarity scorer. Implementors
/// own whatever indexed views text-index setup (§4A) created.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>>;

    /// Fetch many records in one round-trip. Missing ids are simply absent
    /// from the result, not an error.
    async fn get_many(&self, collection: &str, ids: &[RecordId]) -> Result<Vec<Record>>;

    /// Stream every record in a collection, in store-defined order.
    async fn scan(&self, collection: &str) -> Result<BoxStream<'static, Result<Record>>>;

    /// BM25-style lexical search against a named indexed view.
    async fn text_search(
        &self,
        view: &str,
        query: &TextQuerySpec,
        limit: usize,
    ) -> Result<Vec<TextSearchHit>>;

    async fn record_count(&self, collection: &str) -> Result<usize>;
}

/// Filter used by `EdgeStore::delete_where` and `scan_edges`.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub algorithm: Option<String>,
    pub older_than: Option<chrono::DateTime<chrono::Utc>>,
    pub min_weight: Option<f64>,
}

impl EdgeFilter {
    pub fn matches(&self, edge: &SimilarityEdge) -> bool {
        if let Some(algo) = &self.algorithm {
            if &edge.algorithm != algo {
                return false;
            }
        }
        if let Some(cutoff) = self.older_than {
            if edge.created_at >= cutoff {
                return false;
            }
        }
        if let Some(min_weight) = self.min_weight {
            if edge.weight < min_weight {
                return false;
            }
        }
        true
    }
}

/// The one write hotspot in the pipeline (§5): every upsert for a given
/// `(from, to)` key must be applied in arrival order, but implementations
/// are free to serialize however they like internally.
#[async_trait]
pub trait EdgeStore: Send + Sync {
    async fn get_edge(&self, from: &str, to: &str) -> Result<Option<SimilarityEdge>>;

    async fn upsert_edge(&self, edge: SimilarityEdge) -> Result<()>;

    /// Bulk path for runs above ~100k edges (§4D). A backend with no native
    /// bulk API may fall back to calling `upsert_edge` per item internally;
    /// the contract is "all-or-visibly-partial", not necessarily atomic.
    async fn bulk_upsert(&self, edges: Vec<SimilarityEdge>) -> Result<()>;

    async fn delete_where(&self, filter: &EdgeFilter) -> Result<usize>;

    async fn scan_edges(&self) -> Result<BoxStream<'static, Result<SimilarityEdge>>>;

    async fn truncate(&self) -> Result<()>;

    async fn edge_count(&self) -> Result<usize>;
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn truncate(&self) -> Result<()>;

    async fn bulk_insert(&self, clusters: Vec<Cluster>) -> Result<()>;

    async fn find_cluster_by_member(&self, id: &str) -> Result<Option<Cluster>>;

    async fn scan_clusters(&self) -> Result<BoxStream<'static, Result<Cluster>>>;
}

#[async_trait]
pub trait GoldenRecordStore: Send + Sync {
    async fn truncate(&self) -> Result<()>;

    async fn bulk_insert(&self, records: Vec<GoldenRecord>) -> Result<()>;

    async fn find_by_cluster(&self, cluster_id: &str) -> Result<Option<GoldenRecord>>;
}
