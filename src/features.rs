use regex::Regex;
use serde::Serialize;
use std::{collections::HashMap, sync::OnceLock};

pub const FEATURE_COUNT: usize = 57;
pub const KEYWORD_COUNT: usize = 48;
pub const SPECIAL_CHAR_COUNT: usize = 6;

pub const KEYWORDS: [&str; KEYWORD_COUNT] = [
    "make", "address", "all", "3d", "our", "over", "remove", "internet",
    "order", "mail", "receive", "will", "people", "report", "addresses",
    "free", "business", "email", "you", "credit", "your", "font", "000",
    "money", "hp", "hpl", "george", "650", "lab", "labs", "telnet", "857",
    "data", "415", "85", "technology", "1999", "parts", "pm", "direct",
    "cs", "meeting", "original", "project", "re", "edu", "table", "conference",
];

pub const SPECIAL_CHARS: [char; SPECIAL_CHAR_COUNT] = [';', '(', '[', '!', '$', '#'];

pub const CAPITAL_RUN_AVERAGE: usize = 54;
pub const CAPITAL_RUN_LONGEST: usize = 55;
pub const CAPITAL_RUN_TOTAL: usize = 56;

/// Canonical Spambase column names, in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "word_freq_make",
    "word_freq_address",
    "word_freq_all",
    "word_freq_3d",
    "word_freq_our",
    "word_freq_over",
    "word_freq_remove",
    "word_freq_internet",
    "word_freq_order",
    "word_freq_mail",
    "word_freq_receive",
    "word_freq_will",
    "word_freq_people",
    "word_freq_report",
    "word_freq_addresses",
    "word_freq_free",
    "word_freq_business",
    "word_freq_email",
    "word_freq_you",
    "word_freq_credit",
    "word_freq_your",
    "word_freq_font",
    "word_freq_000",
    "word_freq_money",
    "word_freq_hp",
    "word_freq_hpl",
    "word_freq_george",
    "word_freq_650",
    "word_freq_lab",
    "word_freq_labs",
    "word_freq_telnet",
    "word_freq_857",
    "word_freq_data",
    "word_freq_415",
    "word_freq_85",
    "word_freq_technology",
    "word_freq_1999",
    "word_freq_parts",
    "word_freq_pm",
    "word_freq_direct",
    "word_freq_cs",
    "word_freq_meeting",
    "word_freq_original",
    "word_freq_project",
    "word_freq_re",
    "word_freq_edu",
    "word_freq_table",
    "word_freq_conference",
    "char_freq_;",
    "char_freq_(",
    "char_freq_[",
    "char_freq_!",
    "char_freq_$",
    "char_freq_#",
    "capital_run_length_average",
    "capital_run_length_longest",
    "capital_run_length_total",
];

/// Fixed-length Spambase feature vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn zeros() -> Self {
        Self(vec![0.0; FEATURE_COUNT])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Look up a value by its Spambase column name.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.0[idx])
    }

    pub fn keyword_frequencies(&self) -> &[f64] {
        &self.0[..KEYWORD_COUNT]
    }

    pub fn char_frequencies(&self) -> &[f64] {
        &self.0[KEYWORD_COUNT..KEYWORD_COUNT + SPECIAL_CHAR_COUNT]
    }

    pub fn capital_run_stats(&self) -> &[f64] {
        &self.0[CAPITAL_RUN_AVERAGE..]
    }
}

impl TryFrom<Vec<f64>> for FeatureVector {
    type Error = usize;

    /// Fails with the offending length when it is not [`FEATURE_COUNT`].
    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        if values.len() == FEATURE_COUNT {
            Ok(Self(values))
        } else {
            Err(values.len())
        }
    }
}

/// Anything that can turn email text into a feature vector.
pub trait FeatureSource: Send + Sync {
    fn extract(&self, text: &str) -> FeatureVector;

    /// Nullable text, as it arrives from a JSON body. `None` never reaches
    /// [`FeatureSource::extract`].
    fn extract_optional(&self, text: Option<&str>) -> FeatureVector {
        text.map(|t| self.extract(t)).unwrap_or_else(FeatureVector::zeros)
    }
}

/// Spambase extractor: 48 keyword frequencies, 6 character frequencies and 3
/// capital-run statistics. The trained model depends on these counting rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> FeatureVector {
        if text.is_empty() {
            return FeatureVector::zeros();
        }

        let mut features = Vec::with_capacity(FEATURE_COUNT);
        self.extract_keyword_features(text, &mut features);
        self.extract_char_features(text, &mut features);
        self.extract_capital_run_features(text, &mut features);

        debug_assert_eq!(features.len(), FEATURE_COUNT);
        FeatureVector(features)
    }

    fn extract_keyword_features(&self, text: &str, features: &mut Vec<f64>) {
        // ASCII only: U+212A and U+0130 stay separators instead of folding
        // to "k" and "i".
        let lowered = text.to_ascii_lowercase();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut total_words = 0usize;
        for token in token_splitter().split(&lowered).filter(|t| !t.is_empty()) {
            *counts.entry(token).or_insert(0) += 1;
            total_words += 1;
        }

        if total_words == 0 {
            features.extend([0.0; KEYWORD_COUNT]);
            return;
        }

        for keyword in KEYWORDS.iter() {
            let count = counts.get(keyword).copied().unwrap_or(0);
            features.push(100.0 * count as f64 / total_words as f64);
        }
    }

    fn extract_char_features(&self, text: &str, features: &mut Vec<f64>) {
        let mut counts = [0usize; SPECIAL_CHAR_COUNT];
        let mut total_chars = 0usize;
        for ch in text.chars() {
            total_chars += 1;
            if let Some(idx) = SPECIAL_CHARS.iter().position(|c| *c == ch) {
                counts[idx] += 1;
            }
        }

        if total_chars == 0 {
            features.extend([0.0; SPECIAL_CHAR_COUNT]);
            return;
        }

        for count in counts {
            features.push(100.0 * count as f64 / total_chars as f64);
        }
    }

    fn extract_capital_run_features(&self, text: &str, features: &mut Vec<f64>) {
        let runs: Vec<usize> = capital_run_pattern()
            .find_iter(text)
            .map(|m| m.as_str().len())
            .collect();

        if runs.is_empty() {
            features.extend([0.0; 3]);
            return;
        }

        let total: usize = runs.iter().sum();
        let longest = runs.iter().copied().max().unwrap_or(0);
        let average = total as f64 / runs.len() as f64;

        features.extend([average, longest as f64, total as f64]);
    }
}

impl FeatureSource for FeatureExtractor {
    fn extract(&self, text: &str) -> FeatureVector {
        FeatureExtractor::extract(self, text)
    }
}

// Runs of anything outside [a-z0-9] separate tokens; the input is already
// ASCII-lowercased so uppercase never reaches this pattern.
fn token_splitter() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid token pattern"))
}

fn capital_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[A-Z]+").expect("valid capital run pattern"))
}
