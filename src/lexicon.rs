use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::Aspect;
use crate::text::NEGATED_POSITIVE;

const POSITIVE_TERMS: &[&str] = &[
    "excellent",
    "great",
    "good",
    "helpful",
    "efficient",
    "friendly",
    "professional",
    "caring",
    "clean",
    "quick",
    "fast",
    "knowledgeable",
    "attentive",
    "courteous",
    "thorough",
    "amazing",
    "wonderful",
    "kind",
    "comfortable",
    "organized",
];

const NEGATIVE_TERMS: &[&str] = &[
    "terrible",
    "bad",
    "rude",
    "slow",
    "dirty",
    "awful",
    "poor",
    "unprofessional",
    "long",
    "disorganized",
    "unhelpful",
    "horrible",
    "careless",
    "crowded",
    "confusing",
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "nothing", "nobody", "nowhere", "neither", "nor",
];

const STOP_WORDS: &[&str] = &[
    "about", "after", "also", "been", "before", "because", "could", "does", "even", "every",
    "from", "have", "here", "into", "just", "more", "much", "only", "other", "over",
    "really", "should", "some", "than", "that", "their", "them", "then", "there", "they",
    "this", "very", "were", "what", "when", "where", "which", "while", "will", "with",
    "would", "your",
];

const HIGHLIGHT_TERMS: &[&str] = &[
    "excellent",
    "friendly",
    "professional",
    "helpful",
    "caring",
    "knowledgeable",
    "attentive",
    "thorough",
    "efficient",
    "clean",
];

fn aspect_terms(aspect: Aspect) -> &'static [&'static str] {
    match aspect {
        Aspect::Service => &["service", "care", "treatment", "experience", "visit", "consultation"],
        Aspect::Staff => &["doctor", "nurse", "staff", "receptionist", "personnel", "team"],
        Aspect::Facilities => &[
            "facility", "facilities", "building", "room", "equipment", "parking", "clinic",
        ],
        Aspect::WaitTime => &["wait", "waiting", "waited", "queue", "delay", "delayed", "hours"],
        Aspect::Cleanliness => &["clean", "dirty", "hygiene", "sanitary", "spotless", "filthy"],
        Aspect::Communication => &[
            "explain", "explained", "communication", "informed", "listened", "answered",
            "questions",
        ],
    }
}

fn owned(terms: &[&str]) -> BTreeSet<String> {
    terms.iter().map(|term| term.to_string()).collect()
}

/// Word lists driving the rule-based scorer. Loadable from JSON so they can be
/// tuned without a rebuild; any field left out keeps the built-in list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Lexicon {
    /// Term to polarity. Positive values are the positive lexicon.
    pub terms: BTreeMap<String, f64>,
    pub negations: BTreeSet<String>,
    pub aspect_keywords: BTreeMap<Aspect, BTreeSet<String>>,
    pub stop_words: BTreeSet<String>,
    pub highlight_terms: Vec<String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        let terms = POSITIVE_TERMS
            .iter()
            .map(|term| (term.to_string(), 1.0))
            .chain(NEGATIVE_TERMS.iter().map(|term| (term.to_string(), -1.0)))
            .collect();

        Self {
            terms,
            negations: owned(NEGATIONS),
            aspect_keywords: Aspect::ALL
                .iter()
                .map(|aspect| (*aspect, owned(aspect_terms(*aspect))))
                .collect(),
            stop_words: owned(STOP_WORDS),
            highlight_terms: HIGHLIGHT_TERMS.iter().map(|term| term.to_string()).collect(),
        }
    }
}

impl Lexicon {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read lexicon {}", path.display()))?;
        let mut lexicon: Lexicon = serde_json::from_str(&raw)
            .with_context(|| format!("invalid lexicon {}", path.display()))?;
        lexicon.ensure_negation_marker();
        tracing::info!(
            path = %path.display(),
            terms = lexicon.terms.len(),
            "Loaded sentiment lexicon"
        );
        Ok(lexicon)
    }

    /// Negated praise is rewritten to the marker word, which must score negative.
    fn ensure_negation_marker(&mut self) {
        if !self.is_negative(NEGATED_POSITIVE) {
            tracing::warn!(
                marker = NEGATED_POSITIVE,
                "Lexicon gives the negation marker no negative polarity, using -1.0"
            );
            self.terms.insert(NEGATED_POSITIVE.to_string(), -1.0);
        }
    }

    pub fn polarity(&self, word: &str) -> Option<f64> {
        self.terms.get(word).copied().filter(|value| *value != 0.0)
    }

    pub fn is_positive(&self, word: &str) -> bool {
        self.polarity(word).is_some_and(|value| value > 0.0)
    }

    pub fn is_negative(&self, word: &str) -> bool {
        self.polarity(word).is_some_and(|value| value < 0.0)
    }

    pub fn is_negation(&self, word: &str) -> bool {
        self.negations.contains(word)
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    pub fn mentions(&self, aspect: Aspect, word: &str) -> bool {
        self.aspect_keywords
            .get(&aspect)
            .is_some_and(|keywords| keywords.contains(word))
    }
}
