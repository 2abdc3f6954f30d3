//! Place-name extraction from free-form route descriptions.
//!
//! [`LocationExtractor`] is the seam: the parser only asks "which places does
//! this line mention, in order?". [`CapitalizedWordExtractor`] answers with a
//! capitalized-word scan, which is cheap and usually right for lines shaped
//! like `From Paris to Lyon`.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Finds place names in a piece of text, in order of appearance.
pub trait LocationExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<String>;

    fn name(&self) -> &'static str;
}

/// Runs of capitalized words separated by single spaces, e.g. `San Sebastian`.
static CAPITALIZED_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b\p{Lu}\p{Ll}+(?:[-']\p{Lu}?\p{Ll}+)*(?: \p{Lu}\p{Ll}+(?:[-']\p{Lu}?\p{Ll}+)*)*\b")
        .ok()
});

/// Words that start sentences in itinerary prose but are never places.
const DEFAULT_STOPWORDS: &[&str] = &[
    "A", "An", "And", "Arrive", "At", "Begin", "By", "Continue", "Cycle", "Day", "Depart",
    "Drive", "Enjoy", "Explore", "From", "Head", "In", "Journey", "Leave", "Morning", "Of",
    "On", "Return", "Ride", "Route", "Start", "The", "Then", "To", "Travel", "Via", "Visit",
];

/// Extracts capitalized word runs, splitting them at connective words.
///
/// `"From Paris to Lyon"` yields `["Paris", "Lyon"]`; `"Drive From Nice To
/// Monte Carlo"` yields `["Nice", "Monte Carlo"]`.
#[derive(Debug, Clone)]
pub struct CapitalizedWordExtractor {
    stopwords: HashSet<String>,
}

impl Default for CapitalizedWordExtractor {
    fn default() -> Self {
        Self {
            stopwords: DEFAULT_STOPWORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl CapitalizedWordExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `word` as a connective as well.
    pub fn with_stopword(mut self, word: impl Into<String>) -> Self {
        self.stopwords.insert(word.into());
        self
    }

    fn split_run<'a>(&self, run: &'a str, out: &mut Vec<String>) {
        let mut current: Vec<&'a str> = Vec::new();
        for word in run.split(' ') {
            if self.stopwords.contains(word) {
                if !current.is_empty() {
                    out.push(current.join(" "));
                    current.clear();
                }
            } else {
                current.push(word);
            }
        }
        if !current.is_empty() {
            out.push(current.join(" "));
        }
    }
}

impl LocationExtractor for CapitalizedWordExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        let Some(re) = CAPITALIZED_RUN.as_ref() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for m in re.find_iter(text) {
            self.split_run(m.as_str(), &mut out);
        }
        out
    }

    fn name(&self) -> &'static str {
        "capitalized-words"
    }
}
