//! Character n-gram token filter (§4A analyzer kind `ngram`), built the
//! same way the splitting filter is: a `TokenFilter` that buffers derived
//! tokens and drains them before pulling from the wrapped stream.

use tantivy::tokenizer::{Token, TokenFilter, TokenStream, Tokenizer};

/// Emits overlapping `n`-character grams for every incoming token. With
/// `preserve_original` set, the whole token is also emitted once alongside
/// its grams (useful for short fields like postal codes where a full-token
/// exact hit should also count).
#[derive(Clone, Debug)]
pub struct NgramFilter {
    pub n: usize,
    pub preserve_original: bool,
}

impl TokenFilter for NgramFilter {
    type Tokenizer<T: Tokenizer> = NgramFilterWrapper<T>;

    fn transform<T: Tokenizer>(self, tokenizer: T) -> Self::Tokenizer<T> {
        NgramFilterWrapper {
            config: self,
            inner: tokenizer,
            parts: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct NgramFilterWrapper<T> {
    config: NgramFilter,
    inner: T,
    parts: Vec<Token>,
}

impl<T: Tokenizer> Tokenizer for NgramFilterWrapper<T> {
    type TokenStream<'a> = NgramFilterStream<'a, T::TokenStream<'a>>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        self.parts.clear();
        NgramFilterStream {
            config: &self.config,
            tail: self.inner.token_stream(text),
            parts: &mut self.parts,
        }
    }
}

pub struct NgramFilterStream<'a, T> {
    config: &'a NgramFilter,
    tail: T,
    parts: &'a mut Vec<Token>,
}

impl<'a, T: TokenStream> NgramFilterStream<'a, T> {
    fn gram_token(&self) {
        let token = self.tail.token();
        let chars: Vec<char> = token.text.chars().collect();
        let n = self.config.n.max(1);

        let mut grams = Vec::new();
        if chars.len() < n {
            grams.push(token.text.clone());
        } else {
            for window in chars.windows(n) {
                grams.push(window.iter().collect());
            }
        }
        if self.config.preserve_original && chars.len() >= n {
            grams.push(token.text.clone());
        }

        // push in reverse so pop() yields grams in left-to-right order.
        for gram in grams.into_iter().rev() {
            self.parts.push(Token {
                text: gram,
                ..*token
            });
        }
    }
}

impl<'a, T: TokenStream> TokenStream for NgramFilterStream<'a, T> {
    fn advance(&mut self) -> bool {
        self.parts.pop();
        if !self.parts.is_empty() {
            return true;
        }
        if !self.tail.advance() {
            return false;
        }
        self.gram_token();
        !self.parts.is_empty()
    }

    fn token(&self) -> &Token {
        self.parts.last().unwrap_or_else(|| self.tail.token())
    }

    fn token_mut(&mut self) -> &mut Token {
        self.parts.last_mut().unwrap_or_else(|| self.tail.token_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer};

    fn grams(text: &str, n: usize, preserve_original: bool) -> Vec<String> {
        let mut analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(NgramFilter { n, preserve_original })
            .build();
        let mut stream = analyzer.token_stream(text);
        let mut out = Vec::new();
        let mut add = |t: &Token| out.push(t.text.clone());
        stream.process(&mut add);
        out
    }

    #[test]
    fn trigrams_of_word() {
        assert_eq!(grams("smith", 3, false), vec!["smi", "mit", "ith"]);
    }

    #[test]
    fn short_token_falls_back_to_whole_token() {
        assert_eq!(grams("al", 3, false), vec!["al"]);
    }

    #[test]
    fn preserve_original_appends_whole_token() {
        assert_eq!(grams("al", 3, true), vec!["al"]);
        assert_eq!(grams("jon", 3, true), vec!["jon", "jon"]);
    }
}
