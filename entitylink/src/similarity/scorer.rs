//! Fellegi-Sunter pairwise scoring (§4C).
//!
//! For each configured field, agreement contributes `ln(m_prob/u_prob)`
//! to the pair's total score and disagreement contributes
//! `ln((1-m_prob)/(1-u_prob))`; a field missing on either side
//! contributes nothing (neither confirms nor denies a match) and is
//! absent from `per_field_scores`. The aggregate score is compared
//! against `scoring.global.{upper,lower}_threshold` to produce a
//! [`MatchDecision`].

use super::{exact_equals, jaro_winkler, levenshtein_normalized, ngram_similarity, normalize, phonetic_match};
use crate::cache::RecordCache;
use crate::config::{FieldWeightConfig, ScoringConfig, SimilarityFn};
use crate::model::{CandidatePair, FieldScore, MatchDecision, ScoredPair};
use crate::record::Record;
use crate::store::RecordStore;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

pub struct Scorer<'a> {
    config: &'a ScoringConfig,
    cache: RecordCache,
}

impl<'a> Scorer<'a> {
    pub fn new(config: &'a ScoringConfig) -> Self {
        Self {
            config,
            // One cache entry per record seen in an average-sized batch;
            // generous enough that a batch's pairs rarely need a second
            // fetch for the same record (§4C batch contract).
            cache: RecordCache::new(config.batch_size.saturating_mul(2).max(256)),
        }
    }

    /// Score one batch of candidate pairs, fetching records through the
    /// cache (§5 record-fetch cache).
    #[instrument(skip(self, store, pairs))]
    pub async fn score_batch(
        &self,
        collection: &str,
        store: &dyn RecordStore,
        pairs: &[CandidatePair],
    ) -> Result<Vec<ScoredPair>> {
        let mut out = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let a = self.fetch(collection, store, &pair.record_id_a).await?;
            let b = self.fetch(collection, store, &pair.record_id_b).await?;
            let (Some(a), Some(b)) = (a, b) else {
                continue;
            };
            out.push(self.score_pair(&pair.record_id_a, &pair.record_id_b, &a, &b));
        }
        Ok(out)
    }

    async fn fetch(
        &self,
        collection: &str,
        store: &dyn RecordStore,
        id: &str,
    ) -> Result<Option<Arc<Record>>> {
        if let Some(cached) = self.cache.get(collection, id) {
            return Ok(Some(cached));
        }
        match store.get_record(collection, id).await? {
            Some(record) => Ok(Some(self.cache.put(collection, record))),
            None => Ok(None),
        }
    }

    /// Explain/dry-run mode (SPEC_FULL.md supplemented feature): compute
    /// the same per-field scores without requiring a live store — used by
    /// the CLI's explain path against two records the caller already has.
    pub fn score_pair(
        &self,
        record_id_a: &str,
        record_id_b: &str,
        a: &Record,
        b: &Record,
    ) -> ScoredPair {
        let mut per_field_scores = HashMap::new();
        let mut total_score = 0.0;

        for (field, weight_config) in &self.config.field_weights {
            if a.field_is_null_or_absent(field) || b.field_is_null_or_absent(field) {
                continue;
            }
            let Some(raw_a) = a.field_str(field) else { continue };
            let Some(raw_b) = b.field_str(field) else { continue };

            let similarity = self.similarity_for(weight_config, raw_a, raw_b);
            let agreement = similarity > weight_config.threshold;
            let weight = field_weight(weight_config, agreement);

            total_score += weight;
            per_field_scores.insert(
                field.clone(),
                FieldScore {
                    similarity,
                    agreement,
                    weight,
                },
            );
        }

        let decision = if total_score > self.config.global.upper_threshold {
            MatchDecision::Match
        } else if total_score <= self.config.global.lower_threshold {
            MatchDecision::NonMatch
        } else {
            MatchDecision::PossibleMatch
        };

        let confidence = clip01(
            (total_score - self.config.global.lower_threshold)
                / (self.config.global.upper_threshold - self.config.global.lower_threshold),
        );

        ScoredPair {
            record_id_a: record_id_a.to_string(),
            record_id_b: record_id_b.to_string(),
            per_field_scores,
            total_score,
            decision,
            confidence,
        }
    }

    fn similarity_for(&self, config: &FieldWeightConfig, raw_a: &str, raw_b: &str) -> f64 {
        let a = normalize(raw_a, config.strip_punctuation);
        let b = normalize(raw_b, config.strip_punctuation);
        match config.similarity_fn {
            SimilarityFn::Exact => exact_equals(&a, &b),
            SimilarityFn::Levenshtein => levenshtein_normalized(&a, &b),
            SimilarityFn::JaroWinkler => jaro_winkler(&a, &b),
            SimilarityFn::Ngram => ngram_similarity(&a, &b, config.ngram_n.unwrap_or(3)),
            SimilarityFn::Phonetic => {
                phonetic_match(&a, &b, crate::config::PhoneticAlgorithm::Soundex)
            }
        }
    }
}

/// Natural-log Fellegi-Sunter weight: `ln(m/u)` on agreement,
/// `ln((1-m)/(1-u))` on disagreement (§4C).
fn field_weight(config: &FieldWeightConfig, agreement: bool) -> f64 {
    if agreement {
        (config.m_prob / config.u_prob).ln()
    } else {
        ((1.0 - config.m_prob) / (1.0 - config.u_prob)).ln()
    }
}

fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap as StdHashMap;

    fn scoring_config() -> ScoringConfig {
        let mut field_weights = StdHashMap::new();
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
        field_weights.insert(
            "name".to_string(),
            FieldWeightConfig {
                m_prob: 0.85,
                u_prob: 0.1,
                threshold: 0.8,
                similarity_fn: SimilarityFn::JaroWinkler,
                strip_punctuation: false,
                ngram_n: None,
            },
        );
        ScoringConfig {
            field_weights,
            global: crate::config::GlobalScoringConfig {
                upper_threshold: 2.0,
                lower_threshold: -1.0,
            },
            batch_size: 100,
        }
    }

    #[test]
    fn identical_records_score_as_match() {
        let config = scoring_config();
        let scorer = Scorer::new(&config);
        let a = Record::new("1", "people")
            .with_field("email", json!("a@example.com"))
            .with_field("name", json!("Jon Smith"));
        let b = Record::new("2", "people")
            .with_field("email", json!("a@example.com"))
            .with_field("name", json!("Jon Smith"));

        let scored = scorer.score_pair("1", "2", &a, &b);
        assert_eq!(scored.decision, MatchDecision::Match);
        assert!(scored.per_field_scores["email"].agreement);
    }

    #[test]
    fn missing_field_is_excluded_not_penalized() {
        let config = scoring_config();
        let scorer = Scorer::new(&config);
        let a = Record::new("1", "people").with_field("name", json!("Jon Smith"));
        let b = Record::new("2", "people").with_field("name", json!("Jon Smith"));

        let scored = scorer.score_pair("1", "2", &a, &b);
        assert!(!scored.per_field_scores.contains_key("email"));
    }

    #[test]
    fn completely_different_records_score_as_non_match() {
        let config = scoring_config();
        let scorer = Scorer::new(&config);
        let a = Record::new("1", "people")
            .with_field("email", json!("a@example.com"))
            .with_field("name", json!("Jon Smith"));
        let b = Record::new("2", "people")
            .with_field("email", json!("zzz@other.com"))
            .with_field("name", json!("Maria Souza"));

        let scored = scorer.score_pair("1", "2", &a, &b);
        assert_eq!(scored.decision, MatchDecision::NonMatch);
    }
}
