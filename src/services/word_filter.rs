use std::collections::{BTreeSet, HashSet};

const MIN_WORD_CHARS: usize = 3;

/// Lower-cased stop-word lookup shared by the OCR and classifier stages.
#[derive(Debug, Clone, Default)]
pub struct WordFilter {
    stop_words: HashSet<String>,
}

impl WordFilter {
    pub fn new<I, S>(stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stop_words: stop_words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn accepts(&self, word: &str) -> bool {
        let Some(first) = word.chars().next() else {
            return false;
        };
        word.chars().count() >= MIN_WORD_CHARS
            && first.is_ascii_alphabetic()
            && !self.stop_words.contains(&word.to_lowercase())
    }

    /// Splits `text` on whitespace and adds every accepted word, lower-cased, to `out`.
    pub fn extend_from_text(&self, text: &str, out: &mut BTreeSet<String>) {
        for word in text.split_whitespace() {
            if self.accepts(word) {
                out.insert(word.to_lowercase());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_long_alphabetic_non_stop_words() {
        let filter = WordFilter::new(["the"]);
        let mut words = BTreeSet::new();
        filter.extend_from_text("Hi the CAT sat", &mut words);
        assert_eq!(
            words,
            BTreeSet::from(["cat".to_string(), "sat".to_string()])
        );
    }

    #[test]
    fn test_rejects_words_not_starting_with_ascii_letter() {
        let filter = WordFilter::new(Vec::<String>::new());
        assert!(!filter.accepts("2024"));
        assert!(!filter.accepts("#tag"));
        assert!(!filter.accepts("élan"));
        assert!(filter.accepts("a2b"));
    }

    #[test]
    fn test_stop_words_match_case_insensitively() {
        let filter = WordFilter::new(["The", "AND"]);
        assert!(!filter.accepts("the"));
        assert!(!filter.accepts("And"));
    }

    #[test]
    fn test_duplicates_collapse() {
        let filter = WordFilter::new(Vec::<String>::new());
        let mut words = BTreeSet::new();
        filter.extend_from_text("Receipt receipt RECEIPT\ntotal", &mut words);
        assert_eq!(words.len(), 2);
    }
}
