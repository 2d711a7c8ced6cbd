//! Pipeline coordinator (4H): sequences text-index setup, blocking,
//! scoring, edge materialization, clustering, quality validation and
//! golden-record synthesis into one run, across every configured
//! collection. Stores and the clusterer are injected as trait objects
//! (§6) so this crate never hard-codes a backend or the clustering
//! algorithm.

use crate::blocking::{BlockingEngine, BlockingStats};
use crate::clusterer::Clusterer;
use crate::config::Config;
use crate::edges::EdgeWriter;
use crate::golden::GoldenRecordSynthesizer;
use crate::quality::{QualityReport, QualityValidator};
use crate::record::{Record, RecordId};
use crate::similarity::scorer::Scorer;
use crate::store::{ClusterStore, EdgeStore, GoldenRecordStore, RecordStore};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument};

/// Cooperative cancellation shared between a caller (e.g. a CLI signal
/// handler) and the coordinator. Checked between stages and between
/// per-collection batches — a cancelled run stops promptly but leaves
/// whatever edges/clusters/golden records it already wrote in place,
/// per §7's "not a failure" contract for `Error::Cancelled`.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-collection contribution to a run, surfaced by the `stats` CLI
/// command (SPEC_FULL.md supplemented feature).
#[derive(Debug, Clone, Default)]
pub struct CollectionReport {
    pub collection: String,
    pub blocking_stats: Vec<BlockingStats>,
    /// Strategies that failed during this collection's blocking pass
    /// (§4B: a fatal query error aborts only the failing strategy). Empty
    /// when every configured strategy ran cleanly.
    pub blocking_errors: Vec<String>,
    pub candidates_scored: usize,
    pub edges_written: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub collections: Vec<CollectionReport>,
    pub clusters_emitted: usize,
    pub golden_records_written: usize,
    pub quality: QualityReport,
}

pub struct Pipeline<'a> {
    config: &'a Config,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Run blocking through golden-record synthesis for every configured
    /// collection, then cluster and synthesize once over the union of all
    /// edges written (clusters and golden records are not scoped to a
    /// single collection — a pair blocked from two different collections
    /// still lands in the same edge graph, enabling cross-collection
    /// matching).
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        record_store: &dyn RecordStore,
        edge_store: &dyn EdgeStore,
        cluster_store: &dyn ClusterStore,
        golden_store: &dyn GoldenRecordStore,
        clusterer: &dyn Clusterer,
        cancel: &CancelToken,
    ) -> Result<RunReport> {
        let mut edges_config = self.config.edges.clone();
        edges_config.force_update = edges_config.force_update || self.config.run.force_update_edges;
        let edge_writer = EdgeWriter::new(&edges_config, "fellegi_sunter");

        if self.config.run.clean_before {
            let removed = edge_writer.clear(edge_store, None, None).await?;
            info!(removed, "cleared prior edges before run");
        }

        let blocking_engine = BlockingEngine::from_config(&self.config.blocking);
        let scorer = Scorer::new(&self.config.scoring);
        let scoring_batch_size = self.config.scoring.batch_size.max(1);

        let mut report = RunReport::default();
        for collection in &self.config.collections {
            cancel.check()?;
            let (candidates, blocking_stats, blocking_errors) = blocking_engine
                .run(collection, record_store, Some(edge_store))
                .await?;

            metrics::counter!("entitylink_candidates_total", "collection" => collection.clone())
                .increment(candidates.len() as u64);
            for stat in &blocking_stats {
                metrics::counter!(
                    "entitylink_skipped_blocks_total",
                    "collection" => collection.clone(),
                    "strategy" => stat.strategy.clone(),
                )
                .increment(stat.dropped_blocks as u64);
            }

            let mut candidates_scored = 0;
            let mut edges_written = 0;
            for chunk in candidates.chunks(scoring_batch_size) {
                cancel.check()?;
                let scored = scorer.score_batch(collection, record_store, chunk).await?;
                candidates_scored += scored.len();
                edges_written += edge_writer.write(edge_store, &scored).await?;
            }
            metrics::counter!("entitylink_edges_written_total", "collection" => collection.clone())
                .increment(edges_written as u64);

            info!(
                collection = %collection,
                candidates = candidates.len(),
                scored = candidates_scored,
                edges_written,
                "collection pass complete"
            );
            report.collections.push(CollectionReport {
                collection: collection.clone(),
                blocking_stats,
                blocking_errors,
                candidates_scored,
                edges_written,
            });
        }

        cancel.check()?;
        let mut clusters = clusterer
            .cluster(
                edge_store,
                self.config.clustering.min_similarity,
                self.config.clustering.min_cluster_size,
                self.config.clustering.max_cluster_size,
            )
            .await?;
        info!(clusters = clusters.len(), "clustering complete");
        metrics::gauge!("entitylink_clusters_emitted").set(clusters.len() as f64);

        let quality = QualityValidator::new(&self.config.quality).evaluate_all(clusters.iter_mut());
        report.clusters_emitted = clusters.len();
        report.quality = quality;

        if self.config.clustering.store_results {
            if self.config.clustering.truncate_existing {
                cluster_store.truncate().await?;
            }
            cluster_store.bulk_insert(clusters.clone()).await?;
        }

        cancel.check()?;
        golden_store.truncate().await?;
        let synthesizer = GoldenRecordSynthesizer::new(&self.config.golden);
        let mut golden_records = Vec::new();
        for cluster in clusters.iter().filter(|c| c.valid) {
            let members = self.fetch_members(record_store, &cluster.member_ids).await?;
            if members.is_empty() {
                continue;
            }
            golden_records.push(synthesizer.synthesize(&cluster.cluster_id, &members));
        }
        report.golden_records_written = golden_records.len();
        info!(golden_records = golden_records.len(), "golden-record synthesis complete");
        golden_store.bulk_insert(golden_records).await?;

        Ok(report)
    }

    /// Resolve a cluster's member ids to records without assuming which
    /// configured collection each one lives in — a cluster produced by
    /// cross-collection matching can span more than one.
    async fn fetch_members(&self, record_store: &dyn RecordStore, ids: &[RecordId]) -> Result<Vec<Record>> {
        let mut found: HashMap<RecordId, Record> = HashMap::new();
        let mut remaining: Vec<RecordId> = ids.to_vec();
        for collection in &self.config.collections {
            if remaining.is_empty() {
                break;
            }
            let batch = record_store.get_many(collection, &remaining).await?;
            for record in batch {
                remaining.retain(|id| id != &record.id);
                found.insert(record.id.clone(), record);
            }
        }
        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldWeightConfig, ScoringConfig, SimilarityFn, StrategyConfig};
    use crate::model::{Cluster, ClusterQualityFlags, GoldenRecord, SimilarityEdge};
    use crate::store::{EdgeFilter, TextQuerySpec, TextSearchHit};
    use async_trait::async_trait;
    use chrono::Utc;
    use futures::stream::{self, BoxStream};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap as StdMap;

    #[derive(Default)]
    struct MemRecordStore {
        by_collection: StdMap<String, Vec<Record>>,
    }

    #[async_trait]
    impl RecordStore for MemRecordStore {
        async fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>> {
            Ok(self
                .by_collection
                .get(collection)
                .and_then(|rs| rs.iter().find(|r| r.id == id).cloned()))
        }

        async fn get_many(&self, collection: &str, ids: &[RecordId]) -> Result<Vec<Record>> {
            Ok(self
                .by_collection
                .get(collection)
                .map(|rs| rs.iter().filter(|r| ids.contains(&r.id)).cloned().collect())
                .unwrap_or_default())
        }

        async fn scan(&self, collection: &str) -> Result<BoxStream<'static, Result<Record>>> {
            let items: Vec<Result<Record>> = self
                .by_collection
                .get(collection)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(Ok)
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }

        async fn text_search(&self, _view: &str, _query: &TextQuerySpec, _limit: usize) -> Result<Vec<TextSearchHit>> {
            Ok(Vec::new())
        }

        async fn record_count(&self, collection: &str) -> Result<usize> {
            Ok(self.by_collection.get(collection).map(Vec::len).unwrap_or(0))
        }
    }

    #[derive(Default)]
    struct MemEdgeStore {
        edges: Mutex<StdMap<(String, String), SimilarityEdge>>,
    }

    #[async_trait]
    impl EdgeStore for MemEdgeStore {
        async fn get_edge(&self, from: &str, to: &str) -> Result<Option<SimilarityEdge>> {
            Ok(self.edges.lock().get(&(from.to_string(), to.to_string())).cloned())
        }

        async fn upsert_edge(&self, edge: SimilarityEdge) -> Result<()> {
            self.edges.lock().insert(edge.key(), edge);
            Ok(())
        }

        async fn bulk_upsert(&self, edges: Vec<SimilarityEdge>) -> Result<()> {
            let mut guard = self.edges.lock();
            for edge in edges {
                guard.insert(edge.key(), edge);
            }
            Ok(())
        }

        async fn delete_where(&self, _filter: &EdgeFilter) -> Result<usize> {
            Ok(0)
        }

        async fn scan_edges(&self) -> Result<BoxStream<'static, Result<SimilarityEdge>>> {
            let items: Vec<Result<SimilarityEdge>> = self.edges.lock().values().cloned().map(Ok).collect();
            Ok(Box::pin(stream::iter(items)))
        }

        async fn truncate(&self) -> Result<()> {
            self.edges.lock().clear();
            Ok(())
        }

        async fn edge_count(&self) -> Result<usize> {
            Ok(self.edges.lock().len())
        }
    }

    #[derive(Default)]
    struct MemClusterStore {
        clusters: Mutex<Vec<Cluster>>,
    }

    #[async_trait]
    impl ClusterStore for MemClusterStore {
        async fn truncate(&self) -> Result<()> {
            self.clusters.lock().clear();
            Ok(())
        }

        async fn bulk_insert(&self, clusters: Vec<Cluster>) -> Result<()> {
            self.clusters.lock().extend(clusters);
            Ok(())
        }

        async fn find_cluster_by_member(&self, id: &str) -> Result<Option<Cluster>> {
            Ok(self
                .clusters
                .lock()
                .iter()
                .find(|c| c.member_ids.iter().any(|m| m == id))
                .cloned())
        }

        async fn scan_clusters(&self) -> Result<BoxStream<'static, Result<Cluster>>> {
            let items: Vec<Result<Cluster>> = self.clusters.lock().clone().into_iter().map(Ok).collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    #[derive(Default)]
    struct MemGoldenStore {
        records: Mutex<Vec<GoldenRecord>>,
    }

    #[async_trait]
    impl GoldenRecordStore for MemGoldenStore {
        async fn truncate(&self) -> Result<()> {
            self.records.lock().clear();
            Ok(())
        }

        async fn bulk_insert(&self, records: Vec<GoldenRecord>) -> Result<()> {
            self.records.lock().extend(records);
            Ok(())
        }

        async fn find_by_cluster(&self, cluster_id: &str) -> Result<Option<GoldenRecord>> {
            Ok(self
                .records
                .lock()
                .iter()
                .find(|r| r.cluster_id == cluster_id)
                .cloned())
        }
    }

    /// A trivial single-component clusterer: every pair of endpoints seen
    /// across all scanned edges collapses into one cluster. Sufficient for
    /// exercising the coordinator's wiring without pulling in the real
    /// union-find implementation from the separate clustering crate.
    struct SingleComponentClusterer;

    #[async_trait]
    impl Clusterer for SingleComponentClusterer {
        async fn cluster(
            &self,
            edge_store: &dyn EdgeStore,
            min_similarity: f64,
            min_cluster_size: usize,
            _max_cluster_size: usize,
        ) -> Result<Vec<Cluster>> {
            use futures::StreamExt;
            let mut stream = edge_store.scan_edges().await?;
            let mut members: Vec<RecordId> = Vec::new();
            let mut weights = Vec::new();
            while let Some(edge) = stream.next().await {
                let edge = edge?;
                if edge.weight < min_similarity {
                    continue;
                }
                if !members.contains(&edge.from) {
                    members.push(edge.from.clone());
                }
                if !members.contains(&edge.to) {
                    members.push(edge.to.clone());
                }
                weights.push(edge.weight);
            }
            if members.len() < min_cluster_size {
                return Ok(Vec::new());
            }
            members.sort();
            let avg = weights.iter().sum::<f64>() / weights.len().max(1) as f64;
            let min_w = weights.iter().cloned().fold(f64::INFINITY, f64::min);
            let max_w = weights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let possible_edges = members.len() * (members.len() - 1) / 2;
            Ok(vec![Cluster {
                cluster_id: members.join(":"),
                size: members.len(),
                edge_count: weights.len(),
                avg_weight: avg,
                min_weight: min_w,
                max_weight: max_w,
                density: weights.len() as f64 / possible_edges.max(1) as f64,
                member_ids: members,
                created_at: Utc::now(),
                quality: ClusterQualityFlags::default(),
                quality_score: 0.0,
                valid: false,
            }])
        }
    }

    fn config() -> Config {
        let mut field_weights = StdMap::new();
        field_weights.insert(
            "email".to_string(),
            FieldWeightConfig {
                m_prob: 0.95,
                u_prob: 0.02,
                threshold: 0.95,
                similarity_fn: SimilarityFn::Exact,
                strip_punctuation: false,
                ngram_n: None,
            },
        );
        Config {
            collections: vec!["people".to_string()],
            blocking: crate::config::BlockingConfig {
                strategies: vec![StrategyConfig::Exact {
                    field: "email".to_string(),
                    min_block_size: 2,
                    max_block_size: 100,
                }],
                limit: 100,
            },
            scoring: ScoringConfig {
                field_weights,
                ..ScoringConfig::default()
            },
            quality: crate::config::QualityConfig {
                min_cluster_size: 2,
                max_cluster_size: 50,
                min_avg_similarity: 0.0,
                min_density: 0.0,
                max_score_range: 10.0,
                min_quality_score: 0.0,
            },
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn a_minimal_duplicate_flows_end_to_end_to_a_golden_record() {
        let config = config();
        let record_store = MemRecordStore {
            by_collection: StdMap::from([(
                "people".to_string(),
                vec![
                    Record::new("1", "crm").with_field("email", json!("a@example.com")),
                    Record::new("2", "billing").with_field("email", json!("a@example.com")),
                ],
            )]),
        };
        let edge_store = MemEdgeStore::default();
        let cluster_store = MemClusterStore::default();
        let golden_store = MemGoldenStore::default();
        let clusterer = SingleComponentClusterer;
        let cancel = CancelToken::new();

        let pipeline = Pipeline::new(&config);
        let report = pipeline
            .run(
                &record_store,
                &edge_store,
                &cluster_store,
                &golden_store,
                &clusterer,
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(report.collections[0].edges_written, 1);
        assert_eq!(report.clusters_emitted, 1);
        assert_eq!(golden_store.records.lock().len(), 1);
        assert_eq!(edge_store.edge_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn a_cancelled_token_stops_the_run_before_clustering() {
        let config = config();
        let record_store = MemRecordStore::default();
        let edge_store = MemEdgeStore::default();
        let cluster_store = MemClusterStore::default();
        let golden_store = MemGoldenStore::default();
        let clusterer = SingleComponentClusterer;
        let cancel = CancelToken::new();
        cancel.cancel();

        let pipeline = Pipeline::new(&config);
        let err = pipeline
            .run(
                &record_store,
                &edge_store,
                &cluster_store,
                &golden_store,
                &clusterer,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
