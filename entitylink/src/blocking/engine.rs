//! Orchestrates the configured list of blocking strategies and unions
//! their candidates (§4B).

use super::{
    composite::CompositeStrategy, exact::ExactStrategy, geographic::GeographicStrategy,
    graph_traversal::GraphTraversalStrategy, hybrid::HybridStrategy, ngram::NgramStrategy,
    phonetic::PhoneticStrategy, BlockingStats, BlockingStrategy,
};
use crate::config::{BlockingConfig, StrategyConfig};
use crate::model::CandidatePair;
use crate::record::RecordId;
use crate::store::{EdgeStore, RecordStore};
use crate::Result;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

pub struct BlockingEngine {
    strategies: Vec<Box<dyn BlockingStrategy>>,
    limit: usize,
}

impl BlockingEngine {
    pub fn from_config(config: &BlockingConfig) -> Self {
        let strategies = config.strategies.iter().map(build_strategy).collect();
        Self {
            strategies,
            limit: config.limit,
        }
    }

    /// Run every configured strategy, union their candidates (merging
    /// same-key pairs), then cap the number of partners any single record
    /// carries to `limit` (§6 `blocking.limit`), keeping the
    /// highest-bm25-scored partners first.
    ///
    /// A strategy that fails is skipped, not fatal to the whole pass (§4B:
    /// "a fatal query error aborts the current strategy only; the engine
    /// returns whatever other strategies produced plus an error list").
    #[instrument(skip(self, store, edge_store))]
    pub async fn run(
        &self,
        collection: &str,
        store: &dyn RecordStore,
        edge_store: Option<&dyn EdgeStore>,
    ) -> Result<(Vec<CandidatePair>, Vec<BlockingStats>, Vec<String>)> {
        let mut merged: HashMap<(RecordId, RecordId), CandidatePair> = HashMap::new();
        let mut all_stats = Vec::with_capacity(self.strategies.len());
        let mut errors = Vec::new();

        for strategy in &self.strategies {
            match strategy.generate_candidates(collection, store, edge_store).await {
                Ok((pairs, stats)) => {
                    info!(
                        strategy = strategy.name(),
                        candidates = stats.candidates_generated,
                        blocks = stats.blocks_formed,
                        "blocking strategy complete"
                    );
                    for pair in pairs {
                        let key = pair.key();
                        merged
                            .entry(key)
                            .and_modify(|existing| existing.merge(pair.clone()))
                            .or_insert(pair);
                    }
                    all_stats.push(stats);
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "blocking strategy failed; skipping");
                    errors.push(format!("{}: {e}", strategy.name()));
                }
            }
        }

        let pairs = self.apply_limit(merged.into_values().collect());
        Ok((pairs, all_stats, errors))
    }

    fn apply_limit(&self, mut pairs: Vec<CandidatePair>) -> Vec<CandidatePair> {
        if self.limit == 0 {
            return pairs;
        }
        let mut per_record: HashMap<RecordId, usize> = HashMap::new();
        pairs.sort_by(|a, b| {
            b.bm25_score
                .unwrap_or(0.0)
                .partial_cmp(&a.bm25_score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pairs.retain(|pair| {
            let a_count = *per_record.get(&pair.record_id_a).unwrap_or(&0);
            let b_count = *per_record.get(&pair.record_id_b).unwrap_or(&0);
            if a_count >= self.limit || b_count >= self.limit {
                return false;
            }
            *per_record.entry(pair.record_id_a.clone()).or_insert(0) += 1;
            *per_record.entry(pair.record_id_b.clone()).or_insert(0) += 1;
            true
        });
        pairs
    }
}

fn build_strategy(config: &StrategyConfig) -> Box<dyn BlockingStrategy> {
    match config.clone() {
        StrategyConfig::Exact {
            field,
            min_block_size,
            max_block_size,
        } => Box::new(ExactStrategy {
            field,
            min_block_size,
            max_block_size,
        }),
        StrategyConfig::Composite {
            fields,
            min_block_size,
            max_block_size,
        } => Box::new(CompositeStrategy {
            fields,
            min_block_size,
            max_block_size,
        }),
        StrategyConfig::Ngram {
            field,
            view,
            min_score,
            max_candidates,
            constraint_field,
        } => Box::new(NgramStrategy {
            field,
            view,
            min_score,
            max_candidates,
            constraint_field,
        }),
        StrategyConfig::Phonetic {
            field,
            view,
            max_candidates,
        } => Box::new(PhoneticStrategy {
            field,
            view,
            max_candidates,
        }),
        StrategyConfig::Geographic {
            field,
            fallbacks,
            min_block_size,
            max_block_size,
        } => Box::new(GeographicStrategy {
            field,
            fallbacks,
            min_block_size,
            max_block_size,
        }),
        StrategyConfig::Hybrid {
            field,
            view,
            bm25_weight,
            levenshtein_weight,
            threshold,
            max_candidates,
        } => Box::new(HybridStrategy {
            field,
            view,
            bm25_weight,
            levenshtein_weight,
            threshold,
            max_candidates,
        }),
        StrategyConfig::GraphTraversal { max_hops, min_weight } => {
            Box::new(GraphTraversalStrategy { max_hops, min_weight })
        }
    }
}
