//! Candidate pairs, scored pairs, similarity edges, clusters and golden
//! records (§3 Data Model).

use crate::record::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A pair of record ids produced by blocking, always `a < b`.
///
/// `strategy` names the blocking strategy that produced it (or, after
/// multi-strategy union, the list joined with `+`); `block_key` is the
/// grouping key within that strategy for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidatePair {
    pub record_id_a: RecordId,
    pub record_id_b: RecordId,
    pub strategies: Vec<String>,
    pub block_key: Option<String>,
    pub bm25_score: Option<f32>,
    pub matched_fields: Vec<String>,
}

impl CandidatePair {
    /// Construct a pair, normalizing endpoint order so `a < b` always holds.
    pub fn new(a: RecordId, b: RecordId, strategy: impl Into<String>) -> Self {
        let (record_id_a, record_id_b) = crate::record::ordered_pair(a, b);
        Self {
            record_id_a,
            record_id_b,
            strategies: vec![strategy.into()],
            block_key: None,
            bm25_score: None,
            matched_fields: Vec::new(),
        }
    }

    pub fn key(&self) -> (RecordId, RecordId) {
        (self.record_id_a.clone(), self.record_id_b.clone())
    }

    /// Merge another candidate producing the same `(a,b)` key into this one:
    /// strategies are unioned, the best (highest) bm25 score is kept.
    pub fn merge(&mut self, other: CandidatePair) {
        for s in other.strategies {
            if !self.strategies.contains(&s) {
                self.strategies.push(s);
            }
        }
        for f in other.matched_fields {
            if !self.matched_fields.contains(&f) {
                self.matched_fields.push(f);
            }
        }
        self.bm25_score = match (self.bm25_score, other.bm25_score) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        };
        if self.block_key.is_none() {
            self.block_key = other.block_key;
        }
    }
}

/// Per-field similarity/agreement/weight contribution for one scored pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldScore {
    pub similarity: f64,
    pub agreement: bool,
    pub weight: f64,
}

/// Fellegi-Sunter match decision (§4C).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    Match,
    PossibleMatch,
    NonMatch,
}

/// A candidate pair extended with per-field scores and an aggregate
/// decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPair {
    pub record_id_a: RecordId,
    pub record_id_b: RecordId,
    pub per_field_scores: HashMap<String, FieldScore>,
    pub total_score: f64,
    pub decision: MatchDecision,
    pub confidence: f64,
}

/// A directed similarity edge persisted by the edge writer (§4D). The
/// `(from, to)` pair is the primary key and `from < to` always holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityEdge {
    pub from: RecordId,
    pub to: RecordId,
    pub weight: f64,
    pub per_field_scores: HashMap<String, FieldScore>,
    pub algorithm: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub update_count: u32,
}

impl SimilarityEdge {
    pub fn key(&self) -> (RecordId, RecordId) {
        (self.from.clone(), self.to.clone())
    }
}

/// Quality-check outcome flags for a single cluster (§4F).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ClusterQualityFlags {
    pub size_appropriate: bool,
    pub similarity_coherent: bool,
    pub density_adequate: bool,
    pub score_range_reasonable: bool,
}

impl ClusterQualityFlags {
    pub fn passed(&self) -> usize {
        [
            self.size_appropriate,
            self.similarity_coherent,
            self.density_adequate,
            self.score_range_reasonable,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    pub const TOTAL_CHECKS: usize = 4;
}

/// A weakly connected component emitted by the clusterer (§4E), annotated
/// with quality metrics by the validator (§4F).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub cluster_id: String,
    pub member_ids: Vec<RecordId>,
    pub size: usize,
    pub edge_count: usize,
    pub avg_weight: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    pub density: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub quality: ClusterQualityFlags,
    pub quality_score: f64,
    pub valid: bool,
}

/// How a golden-record field's value was chosen (§4G).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceStrategy {
    Consensus,
    ConflictResolution,
    SingleSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldProvenance {
    pub source: String,
    pub strategy: ProvenanceStrategy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Value>,
}

/// A single consolidated record representing a cluster's real-world entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoldenRecord {
    pub cluster_id: String,
    pub consolidated_fields: HashMap<String, Value>,
    pub provenance: HashMap<String, FieldProvenance>,
    pub source_record_ids: Vec<RecordId>,
    pub quality_score: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// §8 testable property: every candidate pair has `record_id_a <
        /// record_id_b` (or equal, for a degenerate self-pair), regardless
        /// of the order the two ids were passed in.
        #[test]
        fn candidate_pair_endpoints_are_always_ordered(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
            let pair = CandidatePair::new(a, b, "exact");
            prop_assert!(pair.record_id_a <= pair.record_id_b);
        }

        #[test]
        fn candidate_pair_key_is_order_independent(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
            let forward = CandidatePair::new(a.clone(), b.clone(), "exact");
            let backward = CandidatePair::new(b, a, "exact");
            prop_assert_eq!(forward.key(), backward.key());
        }
    }
}
