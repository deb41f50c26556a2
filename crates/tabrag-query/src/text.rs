//! Turning free-text questions into full-text queries.

/// English stop words dropped from natural-language queries.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "s", "same", "she",
    "should", "so", "some", "such", "t", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Significant terms of a question: lowercase words without stop words.
pub fn query_terms(question: &str) -> Vec<String> {
    question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !is_stop_word(w))
        .collect()
}

/// Parse a question as a natural-language FTS5 query.
///
/// Every term is quoted and the terms are joined by FTS5's implicit AND.
/// Returns `None` when nothing searchable remains.
pub fn natural_language_query(question: &str) -> Option<String> {
    let terms = query_terms(question);
    if terms.is_empty() {
        return None;
    }

    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_words_sorted() {
        assert!(STOP_WORDS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_query_terms() {
        assert_eq!(
            query_terms("Which is the Premium Package 4dr Sedan (2.4L 4cyl 8AM)?"),
            vec!["premium", "package", "4dr", "sedan", "2", "4l", "4cyl", "8am"]
        );
    }

    #[test]
    fn test_natural_language_query() {
        assert_eq!(
            natural_language_query("What's the cheapest sedan?").as_deref(),
            Some(r#""cheapest" "sedan""#)
        );
    }

    #[test]
    fn test_only_stop_words() {
        assert_eq!(natural_language_query("what is it?"), None);
        assert_eq!(natural_language_query("  "), None);
    }
}
