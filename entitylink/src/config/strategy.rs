//! `blocking.strategies[]` entries (§4B). One tagged variant per strategy;
//! the blocking engine (`crate::blocking::engine`) turns each entry into a
//! live `BlockingStrategy` impl.

use super::identifier::validate_identifier;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Group by an exact field value (§4B strategy 1).
    Exact {
        field: String,
        #[serde(default = "default_min_block_size")]
        min_block_size: usize,
        #[serde(default = "default_max_block_size")]
        max_block_size: usize,
    },

    /// Group by the concatenation of several exact fields (§4B strategy 2).
    Composite {
        fields: Vec<String>,
        #[serde(default = "default_min_block_size")]
        min_block_size: usize,
        #[serde(default = "default_max_block_size")]
        max_block_size: usize,
    },

    /// Lexical BM25 search against an n-gram-analyzed view (§4B strategy 3).
    Ngram {
        field: String,
        view: String,
        min_score: f32,
        max_candidates: usize,
        constraint_field: Option<String>,
    },

    /// Same mechanism as `Ngram` against a phonetic-analyzed view
    /// (§4B strategy 4).
    Phonetic {
        field: String,
        view: String,
        max_candidates: usize,
    },

    /// Group by a geographic key, with declarative fallback between key
    /// granularities when the primary key is absent (§4B strategy 5,
    /// Design Notes §9 Open Question 2).
    Geographic {
        field: String,
        fallbacks: Vec<GeoFallbackRule>,
        #[serde(default = "default_min_block_size")]
        min_block_size: usize,
        #[serde(default = "default_max_block_size")]
        max_block_size: usize,
    },

    /// Weighted combination of a BM25 pre-filter and a Levenshtein
    /// similarity gate on the raw field value (§4B strategy 6):
    /// `combined = bm25_weight * bm25_norm + levenshtein_weight *
    /// levenshtein_sim`, kept when `combined >= threshold`. Weights sum
    /// to 1.0.
    Hybrid {
        field: String,
        view: String,
        bm25_weight: f32,
        levenshtein_weight: f32,
        threshold: f64,
        max_candidates: usize,
    },

    /// Graph-traversal expansion from already-materialized edges
    /// (§4B strategy 7): pairs within `max_hops` of a seed pair whose
    /// weight is at least `min_weight`.
    GraphTraversal {
        max_hops: usize,
        min_weight: f64,
    },
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::Exact { .. } => "exact",
            StrategyConfig::Composite { .. } => "composite",
            StrategyConfig::Ngram { .. } => "ngram",
            StrategyConfig::Phonetic { .. } => "phonetic",
            StrategyConfig::Geographic { .. } => "geographic",
            StrategyConfig::Hybrid { .. } => "hybrid",
            StrategyConfig::GraphTraversal { .. } => "graph_traversal",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            StrategyConfig::Exact {
                field,
                min_block_size,
                max_block_size,
            } => {
                validate_identifier(field)?;
                validate_block_bounds(*min_block_size, *max_block_size)
            }
            StrategyConfig::Composite {
                fields,
                min_block_size,
                max_block_size,
            } => {
                if fields.len() < 2 {
                    return Err(Error::config(
                        "blocking strategy `composite` needs at least 2 fields",
                    ));
                }
                fields.iter().try_for_each(|f| validate_identifier(f))?;
                validate_block_bounds(*min_block_size, *max_block_size)
            }
            StrategyConfig::Ngram {
                field,
                view,
                min_score,
                max_candidates,
                constraint_field,
            } => {
                validate_identifier(field)?;
                validate_identifier(view)?;
                if let Some(cf) = constraint_field {
                    validate_identifier(cf)?;
                }
                if *min_score < 0.0 {
                    return Err(Error::config("blocking strategy `ngram`.min_score must be >= 0"));
                }
                if *max_candidates == 0 {
                    return Err(Error::config(
                        "blocking strategy `ngram`.max_candidates must be > 0",
                    ));
                }
                Ok(())
            }
            StrategyConfig::Phonetic {
                field,
                view,
                max_candidates,
            } => {
                validate_identifier(field)?;
                validate_identifier(view)?;
                if *max_candidates == 0 {
                    return Err(Error::config(
                        "blocking strategy `phonetic`.max_candidates must be > 0",
                    ));
                }
                Ok(())
            }
            StrategyConfig::Geographic {
                field,
                fallbacks,
                min_block_size,
                max_block_size,
            } => {
                validate_identifier(field)?;
                for rule in fallbacks {
                    rule.validate()?;
                }
                validate_block_bounds(*min_block_size, *max_block_size)
            }
            StrategyConfig::Hybrid {
                field,
                view,
                bm25_weight,
                levenshtein_weight,
                threshold,
                max_candidates,
            } => {
                validate_identifier(field)?;
                validate_identifier(view)?;
                if *bm25_weight < 0.0 || *levenshtein_weight < 0.0 {
                    return Err(Error::config(
                        "blocking strategy `hybrid`.bm25_weight and levenshtein_weight must be >= 0",
                    ));
                }
                if (bm25_weight + levenshtein_weight - 1.0).abs() > 1e-6 {
                    return Err(Error::config(
                        "blocking strategy `hybrid`.bm25_weight and levenshtein_weight must sum to 1.0",
                    ));
                }
                if !(0.0..=1.0).contains(threshold) {
                    return Err(Error::config(
                        "blocking strategy `hybrid`.threshold must be in [0,1]",
                    ));
                }
                if *max_candidates == 0 {
                    return Err(Error::config(
                        "blocking strategy `hybrid`.max_candidates must be > 0",
                    ));
                }
                Ok(())
            }
            StrategyConfig::GraphTraversal { max_hops, min_weight } => {
                if *max_hops == 0 {
                    return Err(Error::config(
                        "blocking strategy `graph_traversal`.max_hops must be > 0",
                    ));
                }
                if !(0.0..=1.0).contains(min_weight) {
                    return Err(Error::config(
                        "blocking strategy `graph_traversal`.min_weight must be in [0,1]",
                    ));
                }
                Ok(())
            }
        }
    }
}

fn default_min_block_size() -> usize {
    crate::blocking::DEFAULT_MIN_BLOCK_SIZE
}

fn default_max_block_size() -> usize {
    crate::blocking::DEFAULT_MAX_BLOCK_SIZE
}

fn validate_block_bounds(min_block_size: usize, max_block_size: usize) -> Result<()> {
    if min_block_size < 2 {
        return Err(Error::config("blocking strategy min_block_size must be >= 2"));
    }
    if max_block_size < min_block_size {
        return Err(Error::config(
            "blocking strategy max_block_size must be >= min_block_size",
        ));
    }
    Ok(())
}

/// One fallback rung in a geographic blocking strategy: if `field` is
/// absent or null, try `fallback_field` instead (§4B strategy 5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeoFallbackRule {
    pub fallback_field: String,
    /// Coarsen the fallback key to its first `prefix_len` characters (e.g.
    /// postal code -> region prefix). `None` uses the fallback field as-is.
    pub prefix_len: Option<usize>,
}

impl GeoFallbackRule {
    fn validate(&self) -> Result<()> {
        validate_identifier(&self.fallback_field)?;
        if let Some(0) = self.prefix_len {
            return Err(Error::config(
                "geographic fallback rule prefix_len must be > 0 when set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_requires_two_fields() {
        let cfg = StrategyConfig::Composite {
            fields: vec!["last_name".to_string()],
            min_block_size: default_min_block_size(),
            max_block_size: default_max_block_size(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn exact_validates_field_identifier() {
        let cfg = StrategyConfig::Exact {
            field: "bad field".to_string(),
            min_block_size: default_min_block_size(),
            max_block_size: default_max_block_size(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn geo_fallback_rejects_zero_prefix() {
        let rule = GeoFallbackRule {
            fallback_field: "region".to_string(),
            prefix_len: Some(0),
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn rejects_max_block_size_below_min() {
        let cfg = StrategyConfig::Exact {
            field: "email".to_string(),
            min_block_size: 10,
            max_block_size: 5,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn defaults_match_the_documented_block_bounds() {
        assert_eq!(default_min_block_size(), 2);
        assert_eq!(default_max_block_size(), 100);
    }

    #[test]
    fn hybrid_accepts_weights_summing_to_one() {
        let cfg = StrategyConfig::Hybrid {
            field: "name".to_string(),
            view: "name_ngrams".to_string(),
            bm25_weight: 0.4,
            levenshtein_weight: 0.6,
            threshold: 0.75,
            max_candidates: 20,
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn hybrid_rejects_weights_not_summing_to_one() {
        let cfg = StrategyConfig::Hybrid {
            field: "name".to_string(),
            view: "name_ngrams".to_string(),
            bm25_weight: 0.5,
            levenshtein_weight: 0.6,
            threshold: 0.75,
            max_candidates: 20,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn hybrid_rejects_threshold_outside_unit_interval() {
        let cfg = StrategyConfig::Hybrid {
            field: "name".to_string(),
            view: "name_ngrams".to_string(),
            bm25_weight: 0.4,
            levenshtein_weight: 0.6,
            threshold: 1.5,
            max_candidates: 20,
        };
        assert!(cfg.validate().is_err());
    }
}
