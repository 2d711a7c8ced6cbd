//! Strategy 7 (§4B): expand candidates from already-materialized edges
//! rather than from raw records — pairs within `max_hops` of a seed edge
//! whose weight is at least `min_weight`. Requires an `EdgeStore`; the
//! only strategy that does, since it operates on a prior run's output.

use super::{BlockingStats, BlockingStrategy};
use crate::model::CandidatePair;
use crate::record::RecordId;
use crate::store::{EdgeStore, RecordStore};
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};

pub struct GraphTraversalStrategy {
    pub max_hops: usize,
    pub min_weight: f64,
}

#[async_trait]
impl BlockingStrategy for GraphTraversalStrategy {
    fn name(&self) -> &'static str {
        "graph_traversal"
    }

    async fn generate_candidates(
        &self,
        _collection: &str,
        _store: &dyn RecordStore,
        edge_store: Option<&dyn EdgeStore>,
    ) -> Result<(Vec<CandidatePair>, BlockingStats)> {
        let Some(edge_store) = edge_store else {
            return Ok((Vec::new(), BlockingStats {
                strategy: self.name().to_string(),
                ..Default::default()
            }));
        };

        let mut adjacency: HashMap<RecordId, Vec<RecordId>> = HashMap::new();
        let mut stream = edge_store.scan_edges().await?;
        while let Some(edge) = stream.next().await {
            let edge = edge?;
            if edge.weight < self.min_weight {
                continue;
            }
            adjacency.entry(edge.from.clone()).or_default().push(edge.to.clone());
            adjacency.entry(edge.to.clone()).or_default().push(edge.from.clone());
        }

        let mut merged: HashMap<(RecordId, RecordId), CandidatePair> = HashMap::new();
        let mut largest_block = 0;

        for start in adjacency.keys().cloned().collect::<Vec<_>>() {
            let mut visited: HashSet<RecordId> = HashSet::new();
            visited.insert(start.clone());
            let mut frontier: VecDeque<(RecordId, usize)> = VecDeque::new();
            frontier.push_back((start.clone(), 0));

            while let Some((node, depth)) = frontier.pop_front() {
                if depth >= self.max_hops {
                    continue;
                }
                if let Some(neighbors) = adjacency.get(&node) {
                    largest_block = largest_block.max(neighbors.len());
                    for neighbor in neighbors {
                        if visited.insert(neighbor.clone()) {
                            let mut pair = CandidatePair::new(
                                start.clone(),
                                neighbor.clone(),
                                self.name(),
                            );
                            pair.block_key = Some(format!("hop<={}", depth + 1));
                            let key = pair.key();
                            merged
                                .entry(key)
                                .and_modify(|existing| existing.merge(pair.clone()))
                                .or_insert(pair);
                            frontier.push_back((neighbor.clone(), depth + 1));
                        }
                    }
                }
            }
        }

        let pairs: Vec<CandidatePair> = merged.into_values().collect();
        let stats = BlockingStats {
            strategy: self.name().to_string(),
            candidates_generated: pairs.len(),
            blocks_formed: pairs.len(),
            largest_block,
            dropped_blocks: 0,
        };
        Ok((pairs, stats))
    }
}
