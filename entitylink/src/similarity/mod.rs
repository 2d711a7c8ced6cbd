//! Field-level similarity functions and string normalization (§4C).
//!
//! Normalization policy applied before every comparison, regardless of
//! `similarity_fn`: trim, collapse internal whitespace, lowercase, strip
//! accents. Punctuation stripping is opt-in per field
//! (`FieldWeightConfig::strip_punctuation`) since some fields (phone
//! numbers, postal codes) carry meaning in their punctuation.

pub mod scorer;

pub use scorer::Scorer;

/// Apply the fixed normalization policy, plus optional punctuation
/// stripping.
pub fn normalize(value: &str, strip_punctuation: bool) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let folded: String = collapsed
        .chars()
        .map(strip_accent)
        .collect::<String>()
        .to_lowercase();
    if strip_punctuation {
        folded.chars().filter(|c| !c.is_ascii_punctuation()).collect()
    } else {
        folded
    }
}

fn strip_accent(c: char) -> char {
    // A small, explicit table rather than a full Unicode decomposition
    // dependency: covers the Latin-1 accented ranges this engine's field
    // values realistically contain (names, addresses).
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

/// Normalized Levenshtein similarity in [0,1]: `1 - distance / max_len`.
pub fn levenshtein_normalized(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein_distance(a, b) as f64 / max_len as f64)
}

/// Raw edit distance (insert/delete/substitute).
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

/// Jaro-Winkler similarity in [0,1].
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let jaro_sim = jaro(a, b);
    if jaro_sim <= 0.0 {
        return jaro_sim;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let prefix_len = a
        .iter()
        .zip(b.iter())
        .take(4)
        .take_while(|(x, y)| x == y)
        .count();
    jaro_sim + (prefix_len as f64 * 0.1 * (1.0 - jaro_sim))
}

fn jaro(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (a_len, b_len) = (a.len(), b.len());
    if a_len == 0 && b_len == 0 {
        return 1.0;
    }
    if a_len == 0 || b_len == 0 {
        return 0.0;
    }

    let match_distance = (a_len.max(b_len) / 2).saturating_sub(1);
    let mut a_matches = vec![false; a_len];
    let mut b_matches = vec![false; b_len];
    let mut matches = 0usize;

    for i in 0..a_len {
        let start = i.saturating_sub(match_distance);
        let end = (i + match_distance + 1).min(b_len);
        for j in start..end {
            if b_matches[j] || a[i] != b[j] {
                continue;
            }
            a_matches[i] = true;
            b_matches[j] = true;
            matches += 1;
            break;
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut k = 0;
    for i in 0..a_len {
        if !a_matches[i] {
            continue;
        }
        while !b_matches[k] {
            k += 1;
        }
        if a[i] != b[k] {
            transpositions += 1;
        }
        k += 1;
    }

    let m = matches as f64;
    (m / a_len as f64 + m / b_len as f64 + (m - (transpositions / 2) as f64) / m) / 3.0
}

/// Similarity over character n-grams (Jaccard over the n-gram sets),
/// matching what the ngram blocking view's BM25 score is a proxy for —
/// used by the scorer itself when `similarity_fn = ngram`.
pub fn ngram_similarity(a: &str, b: &str, n: usize) -> f64 {
    let grams = |s: &str| -> std::collections::HashSet<String> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() < n {
            return std::collections::HashSet::from([s.to_string()]);
        }
        chars.windows(n).map(|w| w.iter().collect()).collect()
    };
    let ga = grams(a);
    let gb = grams(b);
    if ga.is_empty() && gb.is_empty() {
        return 1.0;
    }
    let intersection = ga.intersection(&gb).count();
    let union = ga.union(&gb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

pub fn exact_equals(a: &str, b: &str) -> f64 {
    if a == b {
        1.0
    } else {
        0.0
    }
}

/// Phonetic agreement: codes equal -> 1.0, else 0.0. Reuses the same
/// Soundex/Metaphone encoders the phonetic analyzer is built from so the
/// scorer and the blocking view agree on what "sounds alike" means.
pub fn phonetic_match(a: &str, b: &str, algorithm: crate::config::PhoneticAlgorithm) -> f64 {
    use crate::analyzers::phonetic::encode;
    if encode(a, algorithm) == encode(b, algorithm) {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_lowercases() {
        assert_eq!(normalize("  Jo\u{e3}o   Silva ", false), "joao silva");
    }

    #[test]
    fn levenshtein_identical_strings() {
        assert_eq!(levenshtein_distance("kitten", "kitten"), 0);
    }

    #[test]
    fn levenshtein_classic_example() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn jaro_winkler_favors_common_prefix() {
        let sim = jaro_winkler("martha", "marhta");
        assert!(sim > 0.9, "expected high similarity, got {sim}");
    }

    #[test]
    fn ngram_similarity_identical_is_one() {
        assert_eq!(ngram_similarity("smith", "smith", 3), 1.0);
    }

    #[test]
    fn exact_equals_is_boolean() {
        assert_eq!(exact_equals("a", "a"), 1.0);
        assert_eq!(exact_equals("a", "b"), 0.0);
    }
}
