//! Strategy 4 (§4B): same mechanism as n-gram blocking, but against a
//! view built with the phonetic analyzer — records whose field values
//! sound alike end up in the same block even when spelled differently.

use super::{BlockingStats, BlockingStrategy};
use crate::model::CandidatePair;
use crate::store::{RecordStore, TextQuerySpec};
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;

pub struct PhoneticStrategy {
    pub field: String,
    pub view: String,
    pub max_candidates: usize,
}

#[async_trait]
impl BlockingStrategy for PhoneticStrategy {
    fn name(&self) -> &'static str {
        "phonetic"
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

            for hit in hits {
                if hit.id == record.id {
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
