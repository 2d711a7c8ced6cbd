//! Cluster quality validation (§4F): four structural checks against each
//! cluster's already-computed edge statistics, an aggregate score, and a
//! pass/fail verdict.

use crate::config::QualityConfig;
use crate::model::{Cluster, ClusterQualityFlags};
use std::collections::HashMap;

pub struct QualityValidator<'a> {
    config: &'a QualityConfig,
}

/// Aggregate stats + a failure histogram across a whole clustering run,
/// surfaced by the `stats` CLI command (SPEC_FULL.md supplemented
/// feature).
#[derive(Debug, Clone, Default)]
pub struct QualityReport {
    pub clusters_checked: usize,
    pub clusters_valid: usize,
    pub failure_histogram: HashMap<&'static str, usize>,
    /// Free-form guidance derived from the failure histogram (§4F
    /// "aggregate statistics... plus free-form recommendations"), e.g.
    /// "3 clusters oversized — consider raising similarity threshold".
    pub recommendations: Vec<String>,
}

/// Minimum failure count before a recommendation is worth surfacing; a
/// single stray cluster isn't a pattern.
const RECOMMENDATION_THRESHOLD: usize = 1;

fn recommendations_for(histogram: &HashMap<&'static str, usize>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(&n) = histogram.get("size_appropriate") {
        if n >= RECOMMENDATION_THRESHOLD {
            out.push(format!(
                "{n} cluster(s) failed the size check — consider raising the blocking or \
                 similarity threshold to shrink oversized clusters, or lowering min_cluster_size \
                 if too many singletons/pairs are being dropped"
            ));
        }
    }
    if let Some(&n) = histogram.get("similarity_coherent") {
        if n >= RECOMMENDATION_THRESHOLD {
            out.push(format!(
                "{n} cluster(s) had average similarity below min_avg_similarity — consider \
                 raising clustering.min_similarity so weak edges never reach a cluster"
            ));
        }
    }
    if let Some(&n) = histogram.get("density_adequate") {
        if n >= RECOMMENDATION_THRESHOLD {
            out.push(format!(
                "{n} cluster(s) were too sparse — consider raising min_density or reviewing \
                 whether the blocking strategies are under-connecting true matches"
            ));
        }
    }
    if let Some(&n) = histogram.get("score_range_reasonable") {
        if n >= RECOMMENDATION_THRESHOLD {
            out.push(format!(
                "{n} cluster(s) had a wide score spread between their weakest and strongest \
                 edge — consider tightening field weights or splitting heterogeneous clusters"
            ));
        }
    }
    out
}

impl<'a> QualityValidator<'a> {
    pub fn new(config: &'a QualityConfig) -> Self {
        Self { config }
    }

    /// Annotate a cluster's `quality`, `quality_score` and `valid` fields
    /// in place from its already-populated edge statistics.
    pub fn evaluate(&self, cluster: &mut Cluster) {
        let size_appropriate =
            cluster.size >= self.config.min_cluster_size && cluster.size <= self.config.max_cluster_size;
        let similarity_coherent = cluster.avg_weight >= self.config.min_avg_similarity;
        let density_adequate = cluster.density >= self.config.min_density;
        let score_range_reasonable =
            (cluster.max_weight - cluster.min_weight) <= self.config.max_score_range;

        let flags = ClusterQualityFlags {
            size_appropriate,
            similarity_coherent,
            density_adequate,
            score_range_reasonable,
        };
        let quality_score = flags.passed() as f64 / ClusterQualityFlags::TOTAL_CHECKS as f64;

        cluster.quality = flags;
        cluster.quality_score = quality_score;
        cluster.valid = quality_score >= self.config.min_quality_score;
    }

    /// Evaluate every cluster and aggregate both the overall pass rate and
    /// a per-check failure histogram (§4F: the two are distinct
    /// statistics — a cluster can fail one check and still be `valid`
    /// overall, but that one failure still belongs in the histogram).
    pub fn evaluate_all<'c>(&self, clusters: impl IntoIterator<Item = &'c mut Cluster>) -> QualityReport {
        let mut report = QualityReport::default();
        for cluster in clusters {
            self.evaluate(cluster);
            report.clusters_checked += 1;
            if cluster.valid {
                report.clusters_valid += 1;
            }
            if !cluster.quality.size_appropriate {
                *report.failure_histogram.entry("size_appropriate").or_insert(0) += 1;
            }
            if !cluster.quality.similarity_coherent {
                *report.failure_histogram.entry("similarity_coherent").or_insert(0) += 1;
            }
            if !cluster.quality.density_adequate {
                *report.failure_histogram.entry("density_adequate").or_insert(0) += 1;
            }
            if !cluster.quality.score_range_reasonable {
                *report
                    .failure_histogram
                    .entry("score_range_reasonable")
                    .or_insert(0) += 1;
            }
        }
        report.recommendations = recommendations_for(&report.failure_histogram);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn base_cluster() -> Cluster {
        Cluster {
            cluster_id: "c1".to_string(),
            member_ids: vec!["1".to_string(), "2".to_string()],
            size: 2,
            edge_count: 1,
            avg_weight: 0.9,
            min_weight: 0.9,
            max_weight: 0.9,
            density: 1.0,
            created_at: Utc::now(),
            quality: Default::default(),
            quality_score: 0.0,
            valid: false,
        }
    }

    #[test]
    fn a_coherent_cluster_passes_all_checks() {
        let config = QualityConfig {
            min_cluster_size: 2,
            max_cluster_size: 50,
            min_avg_similarity: 0.7,
            min_density: 0.3,
            max_score_range: 0.5,
            min_quality_score: 0.6,
        };
        let validator = QualityValidator::new(&config);
        let mut cluster = base_cluster();
        validator.evaluate(&mut cluster);
        assert!(cluster.valid);
        assert_eq!(cluster.quality.passed(), 4);
    }

    #[test]
    fn an_oversized_cluster_fails_size_check() {
        let config = QualityConfig {
            min_cluster_size: 2,
            max_cluster_size: 50,
            min_avg_similarity: 0.7,
            min_density: 0.3,
            max_score_range: 0.5,
            min_quality_score: 0.6,
        };
        let validator = QualityValidator::new(&config);
        let mut cluster = base_cluster();
        cluster.size = 100;
        validator.evaluate(&mut cluster);
        assert!(!cluster.quality.size_appropriate);
    }

    #[test]
    fn oversized_clusters_produce_a_size_recommendation() {
        let config = QualityConfig {
            min_cluster_size: 2,
            max_cluster_size: 50,
            min_avg_similarity: 0.7,
            min_density: 0.3,
            max_score_range: 0.5,
            min_quality_score: 0.6,
        };
        let validator = QualityValidator::new(&config);
        let mut cluster = base_cluster();
        cluster.size = 100;
        let report = validator.evaluate_all(std::iter::once(&mut cluster));
        assert_eq!(report.failure_histogram["size_appropriate"], 1);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("size check")));
    }
}
