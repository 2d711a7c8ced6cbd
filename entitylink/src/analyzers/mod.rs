//! Analyzer kinds (§4A): `exact`, `ngram`, `phonetic`. Each is registered
//! under a stable name on a `tantivy::tokenizer::TokenizerManager` so a
//! view's field can name the analyzer it was built with independently of
//! the index that stores it.

pub mod exact;
pub mod ngram;
pub mod phonetic;

use crate::config::{AnalyzersConfig, PhoneticAlgorithm};
use ngram::NgramFilter;
use phonetic::PhoneticFilter;
use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer,
    TokenizerManager,
};

pub const EXACT_ANALYZER: &str = "entitylink_exact";
pub const NGRAM_ANALYZER: &str = "entitylink_ngram";
pub const PHONETIC_ANALYZER: &str = "entitylink_phonetic";

/// Build and register all three analyzer kinds on `manager`, configured
/// per `config`. Idempotent: re-registering under the same name replaces
/// the prior analyzer, matching `TokenizerManager::register`'s semantics.
pub fn register_all(manager: &TokenizerManager, config: &AnalyzersConfig) {
    exact::register(manager, EXACT_ANALYZER);
    manager.register(NGRAM_ANALYZER, build_ngram_analyzer(config));
    manager.register(PHONETIC_ANALYZER, build_phonetic_analyzer(config));
}

fn build_ngram_analyzer(config: &AnalyzersConfig) -> TextAnalyzer {
    let mut builder = TextAnalyzer::builder(SimpleTokenizer::default()).dynamic();
    if config.ngram.lowercase {
        builder = builder.filter_dyn(LowerCaser);
    }
    if config.ngram.strip_accents {
        builder = builder.filter_dyn(AsciiFoldingFilter);
    }
    builder = builder
        .filter_dyn(RemoveLongFilter::limit(256))
        .filter_dyn(NgramFilter {
            n: config.ngram.n,
            preserve_original: config.ngram.preserve_original,
        });
    builder.build()
}

fn build_phonetic_analyzer(config: &AnalyzersConfig) -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(PhoneticFilter {
            algorithm: config.phonetic.algorithm,
        })
        .build()
}

/// Resolve an analyzer name that may come back from a storage layer
/// prefixed with its own namespace (e.g. `db::entitylink_ngram`) — strip
/// everything up to and including the last `::` before comparing.
pub fn resolve_analyzer_name(raw: &str) -> &str {
    raw.rsplit("::").next().unwrap_or(raw)
}

pub fn analyzer_for_phonetic_algorithm(algorithm: PhoneticAlgorithm) -> PhoneticFilter {
    PhoneticFilter { algorithm }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_storage_namespace_prefix() {
        assert_eq!(resolve_analyzer_name("db::entitylink_ngram"), "entitylink_ngram");
        assert_eq!(resolve_analyzer_name("entitylink_ngram"), "entitylink_ngram");
    }
}
