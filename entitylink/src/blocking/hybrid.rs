//! Strategy 6 (§4B): a weighted combination of a BM25 pre-filter and a
//! Levenshtein similarity gate on the raw field value. Each record's hit
//! list is normalized against its own max BM25 score (the same max-norm
//! treatment the teacher's hybrid search backend gives unbounded BM25
//! scores before merging them with a bounded metric), then combined with
//! the Levenshtein similarity under the configured weights; only pairs
//! clearing `threshold` survive.

use super::{BlockingStats, BlockingStrategy};
use crate::model::CandidatePair;
use crate::similarity::levenshtein_normalized;
use crate::store::{RecordStore, TextQuerySpec};
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;

pub struct HybridStrategy {
    pub field: String,
    pub view: String,
    pub bm25_weight: f32,
    pub levenshtein_weight: f32,
    pub threshold: f64,
    pub max_candidates: usize,
}

#[async_trait]
impl BlockingStrategy for HybridStrategy {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    async fn generate_candidates(
        &self,
        collection: &str,
        store: &dyn RecordStore,
        _edge_store: Option<&dyn crate::store::EdgeStore>,
    ) -> Result<(Vec<CandidatePair>, BlockingStats)> {
        let mut merged: HashMap<(String, String), CandidatePair> = HashMap::new();
        let mut stream = store.scan(collection).await?;
        let mut largest_block = 0;

        while let Some(record) = stream.next().await {
            let record = record?;
            let Some(query_text) = record.field_str(&self.field) else {
                continue;
            };
            if query_text.trim().is_empty() {
                continue;
            }

            let spec = TextQuerySpec {
                query_text: query_text.to_string(),
                fields: vec![self.field.clone()],
                constraint_field: None,
                constraint_value: None,
            };
            let hits = store
                .text_search(&self.view, &spec, self.max_candidates)
                .await?;
            largest_block = largest_block.max(hits.len());

            // BM25 scores are unbounded positive, so normalize each hit
            // against the max score in this record's own hit set before
            // combining it with the Levenshtein similarity, which is
            // already in [0, 1].
            let bm25_max = hits.iter().map(|h| h.score).fold(f32::NAN, f32::max);

            for hit in hits {
                if hit.id == record.id {
                    continue;
                }
                let Some(other) = store.get_record(collection, &hit.id).await? else {
                    continue;
                };
                let Some(other_text) = other.field_str(&self.field) else {
                    continue;
                };

                let bm25_norm = if bm25_max.is_nan() || bm25_max == 0.0 {
                    hit.score as f64
                } else {
                    (hit.score / bm25_max) as f64
                };
                let levenshtein_sim = levenshtein_normalized(query_text, other_text);
                let combined = self.bm25_weight as f64 * bm25_norm
                    + self.levenshtein_weight as f64 * levenshtein_sim;
                if combined < self.threshold {
                    continue;
                }

                let mut pair = CandidatePair::new(record.id.clone(), hit.id.clone(), self.name());
                pair.bm25_score = Some(hit.score);
                pair.matched_fields = vec![self.field.clone()];
                let key = pair.key();
                merged
                    .entry(key)
                    .and_modify(|existing| existing.merge(pair.clone()))
                    .or_insert(pair);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::store::TextSearchHit;
    use futures::stream::{self, BoxStream};
    use serde_json::json;

    struct FixedStore {
        records: Vec<Record>,
        hits: Vec<TextSearchHit>,
    }

    #[async_trait]
    impl RecordStore for FixedStore {
        async fn get_record(&self, _collection: &str, id: &str) -> Result<Option<Record>> {
            Ok(self.records.iter().find(|r| r.id == id).cloned())
        }

        async fn get_many(&self, _collection: &str, ids: &[crate::record::RecordId]) -> Result<Vec<Record>> {
            Ok(self.records.iter().filter(|r| ids.contains(&r.id)).cloned().collect())
        }

        async fn scan(&self, _collection: &str) -> Result<BoxStream<'static, Result<Record>>> {
            let items: Vec<Result<Record>> = self.records.clone().into_iter().map(Ok).collect();
            Ok(Box::pin(stream::iter(items)))
        }

        async fn text_search(
            &self,
            _view: &str,
            _query: &TextQuerySpec,
            _limit: usize,
        ) -> Result<Vec<TextSearchHit>> {
            Ok(self.hits.clone())
        }

        async fn record_count(&self, _collection: &str) -> Result<usize> {
            Ok(self.records.len())
        }
    }

    fn record(id: &str, name: &str) -> Record {
        Record::new(id, "people").with_field("name", json!(name))
    }

    #[tokio::test]
    async fn weak_bm25_with_strong_levenshtein_still_clears_threshold() {
        // A decoy hit with the top score suppresses the real candidate's
        // bm25_norm to 0.1; "jon smith" vs "jon smith " differ by one
        // trailing space, so its Levenshtein similarity is 0.9. Weighting
        // heavily toward Levenshtein still clears threshold 0.8.
        let store = FixedStore {
            records: vec![record("1", "jon smith"), record("2", "jon smith ")],
            hits: vec![
                TextSearchHit { id: "2".to_string(), score: 0.1 },
                TextSearchHit { id: "decoy".to_string(), score: 1.0 },
            ],
        };
        let strategy = HybridStrategy {
            field: "name".to_string(),
            view: "name_ngrams".to_string(),
            bm25_weight: 0.1,
            levenshtein_weight: 0.9,
            threshold: 0.8,
            max_candidates: 10,
        };
        let (pairs, _) = strategy.generate_candidates("people", &store, None).await.unwrap();
        assert_eq!(pairs.len(), 1);
    }

    #[tokio::test]
    async fn weak_combined_score_is_dropped() {
        let store = FixedStore {
            records: vec![record("1", "jon smith"), record("2", "someone else entirely")],
            hits: vec![TextSearchHit { id: "2".to_string(), score: 1.0 }],
        };
        let strategy = HybridStrategy {
            field: "name".to_string(),
            view: "name_ngrams".to_string(),
            bm25_weight: 0.5,
            levenshtein_weight: 0.5,
            threshold: 0.8,
            max_candidates: 10,
        };
        let (pairs, _) = strategy.generate_candidates("people", &store, None).await.unwrap();
        // A single hit normalizes to bm25_norm = 1.0 (it's its own max), but
        // the weak Levenshtein similarity drags the combined score below
        // threshold.
        assert!(pairs.is_empty());
    }
}
