//! Text featurization for the sentiment model and the medicine matcher.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours", "yourself",
        "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself", "it", "its", "itself",
        "they", "them", "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that",
        "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or", "because", "as",
        "until", "while", "of", "at", "by", "for", "with", "about", "against", "between", "into", "through",
        "during", "before", "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off",
        "over", "under", "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
        "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not",
        "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will", "just", "don", "should",
        "now", "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "couldn", "didn", "doesn", "hadn", "hasn",
        "haven", "isn", "ma", "mightn", "mustn", "needn", "shan", "shouldn", "wasn", "weren", "won", "wouldn",
    ]
    .into_iter()
    .collect()
});

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Lowercase, drop everything but ASCII letters and whitespace, split, drop stop words.
pub fn preprocess(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    cleaned.split_whitespace().filter(|t| !is_stopword(t)).map(str::to_string).collect()
}

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in token.bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Term frequencies hashed into `dim` buckets, normalized by token count.
pub fn hashed_term_frequencies(tokens: &[String], dim: usize) -> Vec<f32> {
    let mut out = vec![0.0_f32; dim];
    if dim == 0 || tokens.is_empty() { return out; }
    for token in tokens {
        out[(fnv1a(token) % dim as u64) as usize] += 1.0;
    }
    let total = tokens.len() as f32;
    out.iter_mut().for_each(|x| *x /= total);
    out
}

/// Word tokens of two or more alphanumeric characters, lowercased.
fn tfidf_tokens(doc: &str) -> Vec<String> {
    doc.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

/// Cosine similarity of `query` against every document, with TF-IDF weights fitted on
/// the query plus the documents. Smoothed idf: `ln((1 + n) / (1 + df)) + 1`.
pub fn tfidf_similarities(query: &str, docs: &[&str]) -> Vec<f64> {
    let corpus: Vec<Vec<String>> = std::iter::once(query).chain(docs.iter().copied()).map(tfidf_tokens).collect();
    let n = corpus.len() as f64;
    let mut df: HashMap<&str, f64> = HashMap::new();
    for doc in &corpus {
        let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
        for term in unique { *df.entry(term).or_default() += 1.0; }
    }
    let vectors: Vec<HashMap<&str, f64>> = corpus
        .iter()
        .map(|doc| {
            let mut tf: HashMap<&str, f64> = HashMap::new();
            for term in doc { *tf.entry(term.as_str()).or_default() += 1.0; }
            for (term, w) in tf.iter_mut() {
                *w *= ((1.0 + n) / (1.0 + df[term])).ln() + 1.0;
            }
            let norm = tf.values().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 { tf.values_mut().for_each(|w| *w /= norm); }
            tf
        })
        .collect();
    let (q, rest) = vectors.split_first().map(|(q, r)| (q.clone(), r)).unwrap_or_default();
    rest.iter().map(|d| q.iter().filter_map(|(t, w)| d.get(t).map(|v| v * w)).sum::<f64>()).collect()
}
