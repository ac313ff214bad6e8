//! Keyword-based fraud heuristic.
//!
//! Matching is plain case-insensitive substring containment with no word
//! boundaries: `"pin"` matches `"spinning"`. The heuristic favors recall.

/// Default indicators, used when no keyword list is configured.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "otp",
    "pin",
    "cvv",
    "password",
    "blocked",
    "suspended",
    "arrest",
    "police",
    "legal action",
    "pay now",
    "transfer",
    "kyc",
    "verify",
    "lottery",
    "prize",
    "winner",
    "anydesk",
    "teamviewer",
    "गिरफ्तार",
    "ब्लॉक",
    "केवाईसी",
    "पैसे भेजो",
];

/// Immutable, ordered set of lower-cased fraud indicators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FraudKeywordSet {
    keywords: Vec<String>,
}

impl FraudKeywordSet {
    /// Build a set from raw keywords.
    ///
    /// Entries are trimmed and lower-cased; blanks are dropped and repeats
    /// keep only their first position.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for kw in keywords {
            let kw = kw.as_ref().trim().to_lowercase();
            if !kw.is_empty() && !out.contains(&kw) {
                out.push(kw);
            }
        }
        Self { keywords: out }
    }

    /// Configured keywords in order.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Number of distinct keywords.
    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    /// Whether no keywords are configured.
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Return every configured keyword that occurs in `text`, in configured order.
    pub fn find_matches(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|kw| haystack.contains(kw.as_str()))
            .cloned()
            .collect()
    }
}

impl Default for FraudKeywordSet {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }
}
