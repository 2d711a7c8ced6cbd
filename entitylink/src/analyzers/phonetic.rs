//! Phonetic encoding token filter (§4A analyzer kind `phonetic`). Each
//! token is replaced in place by its Soundex or Metaphone code, so the
//! filter never buffers more than one token at a time (unlike
//! [`crate::analyzers::ngram::NgramFilter`], which fans one token out into
//! many).

use crate::config::PhoneticAlgorithm;
use tantivy::tokenizer::{Token, TokenFilter, TokenStream, Tokenizer};

#[derive(Clone, Debug)]
pub struct PhoneticFilter {
    pub algorithm: PhoneticAlgorithm,
}

impl TokenFilter for PhoneticFilter {
    type Tokenizer<T: Tokenizer> = PhoneticFilterWrapper<T>;

    fn transform<T: Tokenizer>(self, tokenizer: T) -> Self::Tokenizer<T> {
        PhoneticFilterWrapper {
            algorithm: self.algorithm,
            inner: tokenizer,
        }
    }
}

#[derive(Clone)]
pub struct PhoneticFilterWrapper<T> {
    algorithm: PhoneticAlgorithm,
    inner: T,
}

impl<T: Tokenizer> Tokenizer for PhoneticFilterWrapper<T> {
    type TokenStream<'a> = PhoneticFilterStream<'a, T::TokenStream<'a>>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        PhoneticFilterStream {
            algorithm: self.algorithm,
            tail: self.inner.token_stream(text),
        }
    }
}

pub struct PhoneticFilterStream<'a, T> {
    algorithm: PhoneticAlgorithm,
    tail: T,
}

impl<'a, T: TokenStream> TokenStream for PhoneticFilterStream<'a, T> {
    fn advance(&mut self) -> bool {
        if !self.tail.advance() {
            return false;
        }
        let code = match self.algorithm {
            PhoneticAlgorithm::Soundex => soundex(&self.tail.token().text),
            PhoneticAlgorithm::Metaphone => metaphone(&self.tail.token().text),
        };
        self.tail.token_mut().text = code;
        true
    }

    fn token(&self) -> &Token {
        self.tail.token()
    }

    fn token_mut(&mut self) -> &mut Token {
        self.tail.token_mut()
    }
}

/// Encode `text` with the given algorithm. Exposed so the similarity
/// scorer's `phonetic_match` can agree with whatever this filter indexed.
pub fn encode(text: &str, algorithm: PhoneticAlgorithm) -> String {
    match algorithm {
        PhoneticAlgorithm::Soundex => soundex(text),
        PhoneticAlgorithm::Metaphone => metaphone(text),
    }
}

/// Classic American Soundex: first letter kept, remaining consonants
/// mapped to digit classes, vowels dropped, padded/truncated to 4 chars.
fn soundex(word: &str) -> String {
    let chars: Vec<char> = word.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    if chars.is_empty() {
        return String::new();
    }

    fn code(c: char) -> Option<char> {
        match c.to_ascii_uppercase() {
            'B' | 'F' | 'P' | 'V' => Some('1'),
            'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
            'D' | 'T' => Some('3'),
            'L' => Some('4'),
            'M' | 'N' => Some('5'),
            'R' => Some('6'),
            _ => None,
        }
    }

    let first = chars[0].to_ascii_uppercase();
    let mut out = String::new();
    out.push(first);
    let mut last_code = code(chars[0]);

    for &c in &chars[1..] {
        let c_code = code(c);
        if let Some(digit) = c_code {
            if c_code != last_code {
                out.push(digit);
            }
        }
        if !matches!(c.to_ascii_uppercase(), 'H' | 'W') {
            last_code = c_code;
        }
        if out.len() == 4 {
            break;
        }
    }

    while out.len() < 4 {
        out.push('0');
    }
    out
}

/// A simplified Metaphone: drops silent letters and common digraphs,
/// collapses to a consonant skeleton. Not a full implementation of the
/// original algorithm's exception table, but stable and sufficient as a
/// blocking key.
fn metaphone(word: &str) -> String {
    let upper: Vec<char> = word.to_ascii_uppercase().chars().filter(|c| c.is_ascii_alphabetic()).collect();
    if upper.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let mut i = 0;
    while i < upper.len() {
        let c = upper[i];
        let next = upper.get(i + 1).copied();
        match c {
            'A' | 'E' | 'I' | 'O' | 'U' => {
                if i == 0 {
                    out.push(c);
                }
            }
            'C' if next == Some('H') => {
                out.push('X');
                i += 1;
            }
            'S' if next == Some('H') => {
                out.push('X');
                i += 1;
            }
            'P' if next == Some('H') => {
                out.push('F');
                i += 1;
            }
            'W' | 'H' | 'Y' => {}
            other => out.push(other),
        }
        i += 1;
        if out.len() >= 6 {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soundex_matches_classic_examples() {
        assert_eq!(soundex("Robert"), "R163");
        assert_eq!(soundex("Rupert"), "R163");
        assert_eq!(soundex("Ashcraft"), "A261");
    }

    #[test]
    fn soundex_empty_for_non_alphabetic() {
        assert_eq!(soundex("123"), "");
    }

    #[test]
    fn metaphone_drops_silent_h() {
        assert_eq!(metaphone("Knight"), "KNGT");
    }

    #[test]
    fn metaphone_maps_ch_digraph() {
        assert_eq!(metaphone("Charles"), "XRLS");
    }
}
