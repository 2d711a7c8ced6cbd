//! The `exact` analyzer kind (§4A): lowercases and trims the whole field
//! value into a single token, used to back exact-match blocking views.

use tantivy::tokenizer::{TextAnalyzer, TokenizerManager};

pub fn register(manager: &TokenizerManager, name: &str) {
    let analyzer = TextAnalyzer::builder(tantivy::tokenizer::RawTokenizer::default())
        .filter(tantivy::tokenizer::LowerCaser)
        .filter(tantivy::tokenizer::RemoveLongFilter::limit(1024))
        .build();
    manager.register(name, analyzer);
}
