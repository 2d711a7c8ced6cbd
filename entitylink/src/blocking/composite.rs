//! Strategy 2 (§4B): group records by the concatenation of several exact
//! fields, so records only block together when all of them agree.

use super::{pairs_within_block, BlockOutcome, BlockingStats, BlockingStrategy};
use crate::model::CandidatePair;
use crate::record::RecordId;
use crate::store::RecordStore;
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;

pub struct CompositeStrategy {
    pub fields: Vec<String>,
    pub min_block_size: usize,
    pub max_block_size: usize,
}

#[async_trait]
impl BlockingStrategy for CompositeStrategy {
    fn name(&self) -> &'static str {
        "composite"
    }

    async fn generate_candidates(
        &self,
        collection: &str,
        store: &dyn RecordStore,
        _edge_store: Option<&dyn crate::store::EdgeStore>,
    ) -> Result<(Vec<CandidatePair>, BlockingStats)> {
        let mut groups: HashMap<String, Vec<RecordId>> = HashMap::new();
        let mut stream = store.scan(collection).await?;
        while let Some(record) = stream.next().await {
            let record = record?;
            let mut parts = Vec::with_capacity(self.fields.len());
            let mut all_present = true;
            for field in &self.fields {
                match record.field_str(field) {
                    Some(v) => parts.push(v.to_string()),
                    None => {
                        all_present = false;
                        break;
                    }
                }
            }
            if !all_present {
                continue;
            }
            groups.entry(parts.join("\u{1f}")).or_default().push(record.id);
        }

        let mut pairs = Vec::new();
        let mut blocks_formed = 0;
        let mut dropped_blocks = 0;
        let mut largest_block = 0;
        for (key, ids) in groups {
            largest_block = largest_block.max(ids.len());
            match pairs_within_block(
                &ids,
                self.name(),
                Some(key),
                self.min_block_size,
                self.max_block_size,
            ) {
                BlockOutcome::Pairs(block_pairs) => {
                    if block_pairs.is_empty() {
                        continue;
                    }
                    blocks_formed += 1;
                    pairs.extend(block_pairs);
                }
                BlockOutcome::Dropped => {
                    if ids.len() > self.max_block_size {
                        dropped_blocks += 1;
                    }
                }
            }
        }

        let stats = BlockingStats {
            strategy: self.name().to_string(),
            candidates_generated: pairs.len(),
            blocks_formed,
            largest_block,
            dropped_blocks,
        };
        Ok((pairs, stats))
    }
}
