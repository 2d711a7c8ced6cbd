//! Golden-record synthesis (§4G): consolidate a cluster's member records
//! into a single representative record, deciding each field independently.
//!
//! Decision rule per field:
//! 1. Only one member has a non-null value for it -> `SingleSource`.
//! 2. Every member that has the field agrees on one value -> `Consensus`.
//! 3. Otherwise -> `ConflictResolution`: pick the value from the member
//!    record with the highest `0.7*source_preference + 0.3*record_quality`
//!    composite score, keeping the other distinct values as `alternatives`.
//!
//! Fields whose name starts with `_` are internal/system fields and never
//! appear in the golden record.

use crate::config::GoldenConfig;
use crate::model::{FieldProvenance, GoldenRecord, ProvenanceStrategy};
use crate::record::Record;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

pub struct GoldenRecordSynthesizer<'a> {
    config: &'a GoldenConfig,
}

impl<'a> GoldenRecordSynthesizer<'a> {
    pub fn new(config: &'a GoldenConfig) -> Self {
        Self { config }
    }

    pub fn synthesize(&self, cluster_id: &str, members: &[Record]) -> GoldenRecord {
        let mut field_names: Vec<&str> = members
            .iter()
            .flat_map(|r| r.fields.keys())
            .map(String::as_str)
            .filter(|f| !f.starts_with('_'))
            .collect();
        field_names.sort_unstable();
        field_names.dedup();

        let record_quality: HashMap<&str, f64> = members
            .iter()
            .map(|r| (r.id.as_str(), self.record_quality(r)))
            .collect();

        let mut consolidated_fields = HashMap::new();
        let mut provenance = HashMap::new();

        for field in field_names {
            let present: Vec<(&Record, &Value)> = members
                .iter()
                .filter_map(|r| match r.fields.get(field) {
                    Some(v) if !v.is_null() => Some((r, v)),
                    _ => None,
                })
                .collect();
            if present.is_empty() {
                continue;
            }

            if present.len() == 1 {
                let (record, value) = present[0];
                consolidated_fields.insert(field.to_string(), value.clone());
                provenance.insert(
                    field.to_string(),
                    FieldProvenance {
                        source: record.source.clone(),
                        strategy: ProvenanceStrategy::SingleSource,
                        alternatives: Vec::new(),
                    },
                );
                continue;
            }

            let mut distinct_values: Vec<&Value> = Vec::new();
            for (_, value) in &present {
                if !distinct_values.iter().any(|v| *v == value) {
                    distinct_values.push(value);
                }
            }

            if distinct_values.len() == 1 {
                let value = distinct_values[0];
                let source = present
                    .iter()
                    .find(|(_, v)| *v == value)
                    .map(|(r, _)| r.source.clone())
                    .unwrap_or_default();
                consolidated_fields.insert(field.to_string(), value.clone());
                provenance.insert(
                    field.to_string(),
                    FieldProvenance {
                        source,
                        strategy: ProvenanceStrategy::Consensus,
                        alternatives: Vec::new(),
                    },
                );
                continue;
            }

            let (best_record, best_value) = present
                .iter()
                .max_by(|(ra, _), (rb, _)| {
                    self.composite_score(ra, &record_quality)
                        .partial_cmp(&self.composite_score(rb, &record_quality))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .copied()
                .expect("present is non-empty");

            let alternatives = distinct_values
                .iter()
                .filter(|v| **v != best_value)
                .map(|v| (*v).clone())
                .collect();
            consolidated_fields.insert(field.to_string(), best_value.clone());
            provenance.insert(
                field.to_string(),
                FieldProvenance {
                    source: best_record.source.clone(),
                    strategy: ProvenanceStrategy::ConflictResolution,
                    alternatives,
                },
            );
        }

        let quality_score = if members.is_empty() {
            0.0
        } else {
            members.iter().map(|r| self.record_quality(r)).sum::<f64>() / members.len() as f64
        };

        GoldenRecord {
            cluster_id: cluster_id.to_string(),
            consolidated_fields,
            provenance,
            source_record_ids: members.iter().map(|r| r.id.clone()).collect(),
            quality_score,
            created_at: Utc::now(),
        }
    }

    fn composite_score(&self, record: &Record, record_quality: &HashMap<&str, f64>) -> f64 {
        let preference = self.config.preference_for(&record.source);
        let quality = record_quality.get(record.id.as_str()).copied().unwrap_or(0.5);
        0.7 * preference + 0.3 * quality
    }

    /// Monotonic in completeness (fraction of non-system fields populated)
    /// and recency (exponential decay on an `_ingested_at` timestamp, the
    /// same decay shape spec.md's ranking guidance uses elsewhere).
    fn record_quality(&self, record: &Record) -> f64 {
        let total = record.fields.keys().filter(|f| !f.starts_with('_')).count();
        let populated = record
            .fields
            .iter()
            .filter(|(k, v)| !k.starts_with('_') && !v.is_null())
            .count();
        let completeness = if total == 0 {
            0.0
        } else {
            populated as f64 / total as f64
        };

        let recency = record
            .fields
            .get("_ingested_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| exponential_recency(ts.with_timezone(&Utc)))
            .unwrap_or(0.5);

        0.6 * completeness + 0.4 * recency
    }
}

/// `exp(-age_days / half_life_days)`, half-life of 365 days: a
/// year-old record still carries roughly 37% of a fresh record's recency
/// weight rather than falling off a cliff.
fn exponential_recency(timestamp: DateTime<Utc>) -> f64 {
    let age_days = (Utc::now() - timestamp).num_seconds() as f64 / 86_400.0;
    (-age_days.max(0.0) / 365.0).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, source: &str, fields: &[(&str, Value)]) -> Record {
        let mut r = Record::new(id, source);
        for (k, v) in fields {
            r = r.with_field(*k, v.clone());
        }
        r
    }

    #[test]
    fn single_source_field_is_tagged_accordingly() {
        let config = GoldenConfig::default();
        let synthesizer = GoldenRecordSynthesizer::new(&config);
        let members = vec![
            record("1", "crm", &[("email", json!("a@example.com"))]),
            record("2", "billing", &[]),
        ];
        let golden = synthesizer.synthesize("c1", &members);
        assert_eq!(
            golden.provenance["email"].strategy,
            ProvenanceStrategy::SingleSource
        );
    }

    #[test]
    fn unanimous_value_is_tagged_consensus() {
        let config = GoldenConfig::default();
        let synthesizer = GoldenRecordSynthesizer::new(&config);
        let members = vec![
            record("1", "crm", &[("city", json!("Lisbon"))]),
            record("2", "billing", &[("city", json!("Lisbon"))]),
        ];
        let golden = synthesizer.synthesize("c1", &members);
        assert_eq!(golden.consolidated_fields["city"], json!("Lisbon"));
        assert_eq!(golden.provenance["city"].strategy, ProvenanceStrategy::Consensus);
        assert!(golden.provenance["city"].alternatives.is_empty());
    }

    #[test]
    fn a_two_way_split_is_conflict_resolution_not_consensus() {
        let config = GoldenConfig::default();
        let synthesizer = GoldenRecordSynthesizer::new(&config);
        let members = vec![
            record("1", "crm", &[("city", json!("Lisbon"))]),
            record("2", "billing", &[("city", json!("Lisbon"))]),
            record("3", "support", &[("city", json!("Porto"))]),
        ];
        let golden = synthesizer.synthesize("c1", &members);
        assert_eq!(
            golden.provenance["city"].strategy,
            ProvenanceStrategy::ConflictResolution
        );
        assert_eq!(golden.provenance["city"].alternatives.len(), 1);
    }

    #[test]
    fn internal_fields_are_excluded() {
        let config = GoldenConfig::default();
        let synthesizer = GoldenRecordSynthesizer::new(&config);
        let members = vec![record(
            "1",
            "crm",
            &[("_ingested_at", json!("2024-01-01T00:00:00Z"))],
        )];
        let golden = synthesizer.synthesize("c1", &members);
        assert!(!golden.consolidated_fields.contains_key("_ingested_at"));
    }

    #[test]
    fn tied_values_fall_back_to_conflict_resolution() {
        let mut config = GoldenConfig::default();
        config.source_preference.insert("crm".to_string(), 0.9);
        config.source_preference.insert("billing".to_string(), 0.1);
        let synthesizer = GoldenRecordSynthesizer::new(&config);
        let members = vec![
            record("1", "crm", &[("city", json!("Lisbon"))]),
            record("2", "billing", &[("city", json!("Porto"))]),
        ];
        let golden = synthesizer.synthesize("c1", &members);
        assert_eq!(golden.consolidated_fields["city"], json!("Lisbon"));
        assert_eq!(
            golden.provenance["city"].strategy,
            ProvenanceStrategy::ConflictResolution
        );
    }
}
