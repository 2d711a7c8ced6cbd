//! Typed, eagerly-validated configuration surface (§6, Design Notes §9).
//!
//! Every option spec.md's §6 "Configuration surface" names has a typed
//! home here instead of a bag of dictionaries: illegal configurations
//! (negative probabilities, threshold > 1, an unknown similarity-function
//! name, an identifier that isn't `[A-Za-z_][A-Za-z0-9_]*`) are rejected by
//! `Config::validate` before any stage runs, rather than surfacing as a
//! runtime error on the first offending pair.

mod identifier;
mod strategy;

pub use identifier::validate_identifier;
pub use strategy::{GeoFallbackRule, StrategyConfig};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration object. Deserializable from TOML or YAML (the
/// engine doesn't mandate a format; the CLI picks by file extension).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Which record collections the engine operates on.
    pub collections: Vec<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub analyzers: AnalyzersConfig,

    #[serde(default)]
    pub blocking: BlockingConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub edges: EdgesConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub golden: GoldenConfig,

    #[serde(default)]
    pub run: RunConfig,
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str::<Config>(&content)?,
            _ => toml::from_str::<Config>(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole config up front. This is the one place the
    /// engine is allowed to reject configuration; once a run starts every
    /// other error kind in §7 applies instead.
    pub fn validate(&self) -> Result<()> {
        if self.collections.is_empty() {
            return Err(Error::config("`collections` must name at least one collection"));
        }
        for c in &self.collections {
            validate_identifier(c)?;
        }

        self.blocking.validate()?;
        self.scoring.validate()?;
        self.edges.validate()?;
        self.clustering.validate()?;
        self.quality.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// `analyzers.ngram.n`, `analyzers.phonetic.enabled` (§6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyzersConfig {
    #[serde(default)]
    pub ngram: NgramAnalyzerConfig,
    #[serde(default)]
    pub phonetic: PhoneticAnalyzerConfig,
}

impl Default for AnalyzersConfig {
    fn default() -> Self {
        Self {
            ngram: NgramAnalyzerConfig::default(),
            phonetic: PhoneticAnalyzerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NgramAnalyzerConfig {
    #[serde(default = "default_ngram_n")]
    pub n: usize,
    #[serde(default = "default_true")]
    pub lowercase: bool,
    #[serde(default = "default_true")]
    pub strip_accents: bool,
    #[serde(default)]
    pub preserve_original: bool,
}

fn default_ngram_n() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl Default for NgramAnalyzerConfig {
    fn default() -> Self {
        Self {
            n: default_ngram_n(),
            lowercase: true,
            strip_accents: true,
            preserve_original: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PhoneticAnalyzerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub algorithm: PhoneticAlgorithm,
}

impl Default for PhoneticAnalyzerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: PhoneticAlgorithm::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhoneticAlgorithm {
    #[default]
    Soundex,
    Metaphone,
}

/// `blocking.strategies` (§6, §4B).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BlockingConfig {
    pub strategies: Vec<StrategyConfig>,
    /// Total pairs per target entity cap after union of all strategies.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

impl BlockingConfig {
    fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(Error::config("blocking.limit must be > 0"));
        }
        for s in &self.strategies {
            s.validate()?;
        }
        Ok(())
    }
}

/// `scoring.field_weights` and `scoring.global` (§6, §4C).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    pub field_weights: HashMap<String, FieldWeightConfig>,
    #[serde(default)]
    pub global: GlobalScoringConfig,
    /// Batch size for record fetches during scoring (§4C batch contract).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    5000
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            field_weights: HashMap::new(),
            global: GlobalScoringConfig::default(),
            batch_size: default_batch_size(),
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<()> {
        if self.field_weights.is_empty() {
            return Err(Error::config(
                "scoring.field_weights must configure at least one field",
            ));
        }
        for (field, w) in &self.field_weights {
            validate_identifier(field)?;
            w.validate(field)?;
        }
        if self.batch_size == 0 {
            return Err(Error::config("scoring.batch_size must be > 0"));
        }
        if self.global.upper_threshold <= self.global.lower_threshold {
            return Err(Error::config(
                "scoring.global.upper_threshold must be greater than lower_threshold",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityFn {
    Ngram,
    Levenshtein,
    JaroWinkler,
    Exact,
    Phonetic,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldWeightConfig {
    /// P(field agrees | records truly match), must be in (0,1).
    pub m_prob: f64,
    /// P(field agrees | records do not match), must be in (0,1).
    pub u_prob: f64,
    /// Similarity value above which agreement is declared, in [0,1].
    pub threshold: f64,
    #[serde(default = "default_similarity_fn")]
    pub similarity_fn: SimilarityFn,
    /// Whether to remove punctuation during normalization for this field
    /// (opt-in per §4C normalization policy; trim/collapse/lowercase/strip
    /// accents always apply).
    #[serde(default)]
    pub strip_punctuation: bool,
    /// For `similarity_fn = ngram`, the n-gram size (defaults to
    /// `analyzers.ngram.n` if unset).
    #[serde(default)]
    pub ngram_n: Option<usize>,
}

fn default_similarity_fn() -> SimilarityFn {
    SimilarityFn::JaroWinkler
}

impl FieldWeightConfig {
    fn validate(&self, field: &str) -> Result<()> {
        if !(self.m_prob > 0.0 && self.m_prob < 1.0) {
            return Err(Error::config(format!(
                "scoring.field_weights.{field}.m_prob must be in (0,1), got {}",
                self.m_prob
            )));
        }
        if !(self.u_prob > 0.0 && self.u_prob < 1.0) {
            return Err(Error::config(format!(
                "scoring.field_weights.{field}.u_prob must be in (0,1), got {}",
                self.u_prob
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::config(format!(
                "scoring.field_weights.{field}.threshold must be in [0,1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct GlobalScoringConfig {
    #[serde(default = "default_upper_threshold")]
    pub upper_threshold: f64,
    #[serde(default = "default_lower_threshold")]
    pub lower_threshold: f64,
}

fn default_upper_threshold() -> f64 {
    2.0
}

fn default_lower_threshold() -> f64 {
    -1.0
}

impl Default for GlobalScoringConfig {
    fn default() -> Self {
        Self {
            upper_threshold: default_upper_threshold(),
            lower_threshold: default_lower_threshold(),
        }
    }
}

/// How re-scoring of an existing edge combines with the prior weight.
/// Open Question in Design Notes §9: the source's running-mean update is
/// order-dependent; `keep_max` is the reproducible default this engine
/// ships, with `running_mean` and `overwrite` available as explicit
/// opt-ins.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WeightUpdateStrategy {
    RunningMean,
    #[default]
    KeepMax,
    Overwrite,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BulkMethod {
    Api,
    Csv,
}

impl Default for BulkMethod {
    fn default() -> Self {
        BulkMethod::Api
    }
}

/// `edges.*` (§6, §4D).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EdgesConfig {
    #[serde(default = "default_edge_threshold")]
    pub weight_threshold: f64,
    #[serde(default = "default_edge_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub bulk_method: BulkMethod,
    #[serde(default)]
    pub weight_update: WeightUpdateStrategy,
    #[serde(default)]
    pub force_update: bool,
    /// Switch to the bulk (CSV export + loader) path above this many edges.
    #[serde(default = "default_bulk_path_threshold")]
    pub bulk_path_threshold: usize,
}

fn default_edge_threshold() -> f64 {
    0.8
}

fn default_edge_batch_size() -> usize {
    1000
}

fn default_bulk_path_threshold() -> usize {
    100_000
}

impl Default for EdgesConfig {
    fn default() -> Self {
        Self {
            weight_threshold: default_edge_threshold(),
            batch_size: default_edge_batch_size(),
            bulk_method: BulkMethod::default(),
            weight_update: WeightUpdateStrategy::default(),
            force_update: false,
            bulk_path_threshold: default_bulk_path_threshold(),
        }
    }
}

impl EdgesConfig {
    fn validate(&self) -> Result<()> {
        // `weight_threshold` compares directly against the Fellegi-Sunter
        // total score (§3: edge weight = total_score), an unbounded
        // log-odds scalar, not a [0,1] similarity — only reject non-finite
        // values, not a particular range.
        if !self.weight_threshold.is_finite() {
            return Err(Error::config("edges.weight_threshold must be finite"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("edges.batch_size must be > 0"));
        }
        Ok(())
    }
}

/// `clustering.*` (§6, §4E).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusteringConfig {
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    #[serde(default = "default_max_cluster_size_clustering")]
    pub max_cluster_size: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
    pub store_results: bool,
    #[serde(default = "default_true")]
    pub truncate_existing: bool,
}

fn default_min_cluster_size() -> usize {
    2
}

fn default_max_cluster_size_clustering() -> usize {
    100
}

fn default_min_similarity() -> f64 {
    0.8
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: default_min_cluster_size(),
            max_cluster_size: default_max_cluster_size_clustering(),
            min_similarity: default_min_similarity(),
            store_results: true,
            truncate_existing: true,
        }
    }
}

impl ClusteringConfig {
    fn validate(&self) -> Result<()> {
        if self.min_cluster_size < 2 {
            return Err(Error::config("clustering.min_cluster_size must be >= 2"));
        }
        if self.max_cluster_size < self.min_cluster_size {
            return Err(Error::config(
                "clustering.max_cluster_size must be >= min_cluster_size",
            ));
        }
        // Same log-odds scale as `edges.weight_threshold` — see that
        // validator's comment.
        if !self.min_similarity.is_finite() {
            return Err(Error::config("clustering.min_similarity must be finite"));
        }
        Ok(())
    }
}

/// `quality.thresholds` (§6, §4F). Deliberately separate from
/// `ClusteringConfig`'s size bounds: §4F's defaults (2..=50) differ from
/// §4E's (2..=100), matching spec.md's own two tables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QualityConfig {
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    #[serde(default = "default_max_cluster_size_quality")]
    pub max_cluster_size: usize,
    #[serde(default = "default_min_avg_similarity")]
    pub min_avg_similarity: f64,
    #[serde(default = "default_min_density")]
    pub min_density: f64,
    #[serde(default = "default_max_score_range")]
    pub max_score_range: f64,
    #[serde(default = "default_min_quality_score")]
    pub min_quality_score: f64,
}

fn default_max_cluster_size_quality() -> usize {
    50
}

fn default_min_avg_similarity() -> f64 {
    0.7
}

fn default_min_density() -> f64 {
    0.3
}

fn default_max_score_range() -> f64 {
    0.5
}

fn default_min_quality_score() -> f64 {
    0.6
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: default_min_cluster_size(),
            max_cluster_size: default_max_cluster_size_quality(),
            min_avg_similarity: default_min_avg_similarity(),
            min_density: default_min_density(),
            max_score_range: default_max_score_range(),
            min_quality_score: default_min_quality_score(),
        }
    }
}

impl QualityConfig {
    fn validate(&self) -> Result<()> {
        if self.max_cluster_size < self.min_cluster_size {
            return Err(Error::config(
                "quality.max_cluster_size must be >= min_cluster_size",
            ));
        }
        for (name, v) in [
            ("min_avg_similarity", self.min_avg_similarity),
            ("min_density", self.min_density),
            ("min_quality_score", self.min_quality_score),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::config(format!("quality.{name} must be in [0,1]")));
            }
        }
        Ok(())
    }
}

/// `golden.source_preference` (§6, §4G).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GoldenConfig {
    #[serde(default)]
    pub source_preference: HashMap<String, f64>,
}

impl GoldenConfig {
    pub fn preference_for(&self, source: &str) -> f64 {
        self.source_preference.get(source).copied().unwrap_or(0.5)
    }
}

/// `run.clean_before`, `run.force_update_edges` (§6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default = "default_true")]
    pub clean_before: bool,
    #[serde(default)]
    pub force_update_edges: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            clean_before: true,
            force_update_edges: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> Config {
        let mut field_weights = HashMap::new();
        field_weights.insert(
            "email".to_string(),
            FieldWeightConfig {
                m_prob: 0.9,
                u_prob: 0.01,
                threshold: 0.9,
                similarity_fn: SimilarityFn::Exact,
                strip_punctuation: false,
                ngram_n: None,
            },
        );
        Config {
            collections: vec!["people".to_string()],
            scoring: ScoringConfig {
                field_weights,
                ..ScoringConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn rejects_m_prob_at_boundary() {
        let mut cfg = minimal_config();
        cfg.scoring
            .field_weights
            .get_mut("email")
            .unwrap()
            .m_prob = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_identifier() {
        let mut cfg = minimal_config();
        cfg.collections.push("bad collection".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut cfg = minimal_config();
        cfg.scoring.global.upper_threshold = -5.0;
        assert!(cfg.validate().is_err());
    }
}
