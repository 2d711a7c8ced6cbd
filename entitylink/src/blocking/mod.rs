//! Blocking (§4B): cut the O(n^2) all-pairs space down to a tractable
//! candidate set. Each strategy implements [`BlockingStrategy`]
//! independently; [`engine::BlockingEngine`] runs the configured list and
//! unions their output, same-key candidates merging their strategy lists
//! (`CandidatePair::merge`) rather than duplicating.

pub mod composite;
pub mod engine;
pub mod exact;
pub mod geographic;
pub mod graph_traversal;
pub mod hybrid;
pub mod ngram;
pub mod phonetic;

pub use engine::BlockingEngine;

use crate::model::CandidatePair;
use crate::store::{EdgeStore, RecordStore};
use crate::Result;
use async_trait::async_trait;

/// Default bound on how many ids an exact/composite/geographic block (a
/// group of records sharing one key) may contain before the whole block is
/// dropped rather than paired (§4B: "Drop groups larger than
/// max_block_size ... to prevent worst-case fan-out").
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 100;

/// Default bound below which a block contributes no pairs either — a
/// singleton group has nothing to pair against.
pub const DEFAULT_MIN_BLOCK_SIZE: usize = 2;

/// Diagnostics returned alongside a strategy's candidates (§4B, surfaced
/// by the `stats` CLI command per SPEC_FULL.md's supplemented features).
#[derive(Debug, Clone, Default)]
pub struct BlockingStats {
    pub strategy: String,
    pub candidates_generated: usize,
    pub blocks_formed: usize,
    pub largest_block: usize,
    /// Number of blocks dropped entirely for exceeding `max_block_size`
    /// (§4B, §8 boundary scenario: "zero pairs emitted from that block;
    /// counted as skipped").
    pub dropped_blocks: usize,
}

#[async_trait]
pub trait BlockingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `edge_store` is only consulted by [`graph_traversal::GraphTraversalStrategy`];
    /// every other strategy ignores it. Threading it through the shared
    /// trait keeps the engine's dispatch loop uniform across strategies.
    async fn generate_candidates(
        &self,
        collection: &str,
        store: &dyn RecordStore,
        edge_store: Option<&dyn EdgeStore>,
    ) -> Result<(Vec<CandidatePair>, BlockingStats)>;
}

/// Outcome of considering one block for pairing: either its pairs, or a
/// note that it was dropped for being outside `[min_block_size,
/// max_block_size]`.
pub(crate) enum BlockOutcome {
    Pairs(Vec<CandidatePair>),
    Dropped,
}

/// Generate every unordered pair within one block. A block smaller than
/// `min_block_size` contributes nothing (too small to need blocking at
/// all); a block larger than `max_block_size` is dropped in its entirety —
/// not truncated — so a pathological key (every record sharing a blank
/// field) can't silently degrade into a partial quadratic blowup (§4B).
pub(crate) fn pairs_within_block(
    ids: &[crate::record::RecordId],
    strategy: &'static str,
    block_key: Option<String>,
    min_block_size: usize,
    max_block_size: usize,
) -> BlockOutcome {
    if ids.len() < min_block_size {
        return BlockOutcome::Dropped;
    }
    if ids.len() > max_block_size {
        return BlockOutcome::Dropped;
    }
    let mut pairs = Vec::new();
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let mut pair = CandidatePair::new(ids[i].clone(), ids[j].clone(), strategy);
            pair.block_key = block_key.clone();
            pairs.push(pair);
        }
    }
    BlockOutcome::Pairs(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// §8 testable property: a block of `n` ids within
        /// `[min_block_size, max_block_size]` yields exactly `n*(n-1)/2`
        /// pairs — never more, never a partial/truncated set.
        #[test]
        fn pairs_within_block_respects_the_quadratic_upper_bound(
            n in 0usize..40,
            min in 0usize..5,
            max in 5usize..50,
        ) {
            let ids: Vec<crate::record::RecordId> = (0..n).map(|i| format!("r{i}")).collect();
            let outcome = pairs_within_block(&ids, "exact", None, min, max);
            match outcome {
                BlockOutcome::Pairs(pairs) => {
                    prop_assert!(n >= min && n <= max);
                    prop_assert_eq!(pairs.len(), n * n.saturating_sub(1) / 2);
                }
                BlockOutcome::Dropped => {
                    prop_assert!(n < min || n > max);
                }
            }
        }
    }
}
