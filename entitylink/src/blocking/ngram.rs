//! Strategy 3 (§4B): lexical BM25 search against an n-gram-analyzed view.
//! For every record, its own field value becomes the query against the
//! view built from the same field; hits above `min_score` become
//! candidates.

use super::{BlockingStats, BlockingStrategy};
use crate::model::CandidatePair;
use crate::store::{RecordStore, TextQuerySpec};
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;

pub struct NgramStrategy {
    pub field: String,
    pub view: String,
    pub min_score: f32,
    pub max_candidates: usize,
    pub constraint_field: Option<String>,
}

#[async_trait]
impl BlockingStrategy for NgramStrategy {
    fn name(&self) -> &'static str {
        "ngram"
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

            let constraint_value = self
                .constraint_field
                .as_ref()
                .and_then(|f| record.field_str(f))
                .map(str::to_string);

            let spec = TextQuerySpec {
                query_text: query_text.to_string(),
                fields: vec![self.field.clone()],
                constraint_field: self.constraint_field.clone(),
                constraint_value,
            };

            let hits = store
                .text_search(&self.view, &spec, self.max_candidates)
                .await?;
            largest_block = largest_block.max(hits.len());

            for hit in hits {
                if hit.id == record.id || hit.score < self.min_score {
                    continue;
                }
                let mut pair = CandidatePair::new(record.id.clone(), hit.id, self.name());
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
