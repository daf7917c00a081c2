use std::sync::Arc;

use crate::lexicon::Lexicon;
use crate::models::{Aspect, AspectScores, SentimentScore};
use crate::text;

/// Short texts with only a couple of matches are damped by this floor.
const MIN_MATCH_DIVISOR: f64 = 5.0;

const BASE_CONFIDENCE: f64 = 0.7;
const ASPECT_SIGNAL_THRESHOLD: f64 = 0.1;
const NEUTRAL_OVERALL_THRESHOLD: f64 = 0.2;

/// Lexicon-based scorer shared by the overall and per-aspect passes.
#[derive(Debug, Clone)]
pub struct SentimentAnalyzer {
    lexicon: Arc<Lexicon>,
}

impl SentimentAnalyzer {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn normalize(&self, raw: &str) -> String {
        text::normalize(raw, &self.lexicon)
    }

    /// Polarity of a normalized text in [-1, 1]; 0 when no lexicon term matches.
    pub fn score(&self, normalized: &str) -> f64 {
        let mut signed = 0.0;
        let mut matches = 0usize;

        for word in text::words(normalized) {
            if let Some(polarity) = self.lexicon.polarity(word) {
                signed += polarity;
                matches += 1;
            }
        }

        if matches == 0 {
            return 0.0;
        }

        (signed / (matches as f64).max(MIN_MATCH_DIVISOR)).clamp(-1.0, 1.0)
    }

    /// Average sentence polarity per aspect, over sentences naming one of its keywords.
    pub fn aspects(&self, normalized: &str) -> AspectScores {
        let sentences: Vec<&str> = text::sentences(normalized).collect();
        let mut scores = AspectScores::neutral();

        for aspect in Aspect::ALL {
            let mut total = 0.0;
            let mut matched = 0usize;

            for sentence in &sentences {
                if text::words(sentence).any(|word| self.lexicon.mentions(aspect, word)) {
                    total += self.score(sentence);
                    matched += 1;
                }
            }

            if matched > 0 {
                scores.set(aspect, total / matched as f64);
            }
        }

        scores
    }

    pub fn confidence(&self, normalized: &str, overall: f64, aspects: &AspectScores) -> f64 {
        let word_count = text::words(normalized).count();
        let mut confidence = BASE_CONFIDENCE;

        if word_count > 20 {
            confidence += 0.1;
        }
        if word_count > 50 {
            confidence += 0.1;
        }

        let signalled = aspects
            .iter()
            .filter(|(_, value)| value.abs() > ASPECT_SIGNAL_THRESHOLD)
            .count();
        confidence += 0.02 * signalled as f64;

        if overall.abs() < NEUTRAL_OVERALL_THRESHOLD {
            confidence -= 0.1;
        }

        confidence.clamp(0.3, 1.0)
    }

    /// Full pass over a raw comment.
    pub fn analyze_text(&self, raw: &str) -> SentimentScore {
        let normalized = self.normalize(raw);
        let overall = self.score(&normalized);
        let aspects = self.aspects(&normalized);
        let confidence = self.confidence(&normalized, overall, &aspects);
        let keywords = text::extract_keywords(&normalized, &self.lexicon);

        SentimentScore {
            overall,
            aspects,
            confidence,
            keywords,
        }
    }
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(Lexicon::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> SentimentAnalyzer {
        SentimentAnalyzer::default()
    }

    fn score_raw(raw: &str) -> f64 {
        let analyzer = analyzer();
        analyzer.score(&analyzer.normalize(raw))
    }

    #[test]
    fn empty_and_blank_comments_score_zero() {
        assert_eq!(score_raw(""), 0.0);
        assert_eq!(score_raw("    "), 0.0);
        assert_eq!(score_raw("we arrived at noon"), 0.0);
    }

    #[test]
    fn few_matches_are_damped() {
        assert!((score_raw("excellent") - 0.2).abs() < 1e-9);
        assert!((score_raw("terrible rude staff, long wait") + 0.6).abs() < 1e-9);
    }

    #[test]
    fn many_matches_normalize_by_match_count() {
        let score = score_raw("great great great great great great terrible");
        assert!((score - 5.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn scores_stay_in_bounds() {
        let samples = [
            "excellent ".repeat(200),
            "terrible ".repeat(200),
            "great rude kind slow clean dirty fast poor".to_string(),
            "!!!???...".to_string(),
        ];
        for sample in &samples {
            let score = score_raw(sample);
            assert!((-1.0..=1.0).contains(&score), "{score} out of range");
        }
    }

    #[test]
    fn negated_praise_scores_like_bad() {
        let not_excellent = score_raw("not excellent");
        assert!(not_excellent <= score_raw("bad"));
        assert!(not_excellent < score_raw("excellent"));
    }

    #[test]
    fn aspects_are_scoped_to_mentioning_sentences() {
        let analyzer = analyzer();
        let normalized = analyzer.normalize("The nurse was rude. The room was clean and comfortable.");
        let aspects = analyzer.aspects(&normalized);

        assert!((aspects.get(Aspect::Staff) + 0.2).abs() < 1e-9);
        assert!((aspects.get(Aspect::Facilities) - 0.4).abs() < 1e-9);
        assert!((aspects.get(Aspect::Cleanliness) - 0.4).abs() < 1e-9);
        assert_eq!(aspects.get(Aspect::WaitTime), 0.0);
        assert_eq!(aspects.get(Aspect::Communication), 0.0);
    }

    #[test]
    fn aspect_score_averages_matching_sentences() {
        let analyzer = analyzer();
        let normalized = analyzer.normalize("Doctor was excellent. Nurse was rude and slow.");
        let aspects = analyzer.aspects(&normalized);
        assert!((aspects.get(Aspect::Staff) - (0.2 - 0.4) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn confidence_bonuses_and_penalty() {
        let analyzer = analyzer();
        let neutral = AspectScores::neutral();

        assert!((analyzer.confidence("short text", 0.5, &neutral) - 0.7).abs() < 1e-9);
        assert!((analyzer.confidence("short text", 0.0, &neutral) - 0.6).abs() < 1e-9);

        let long = "word ".repeat(60);
        assert!((analyzer.confidence(&long, 0.5, &neutral) - 0.9).abs() < 1e-9);

        let mut aspects = AspectScores::neutral();
        aspects.set(Aspect::Staff, -0.5);
        aspects.set(Aspect::WaitTime, 0.3);
        aspects.set(Aspect::Service, 0.05);
        assert!((analyzer.confidence("short text", 0.5, &aspects) - 0.74).abs() < 1e-9);
    }

    #[test]
    fn confidence_stays_in_bounds() {
        let analyzer = analyzer();
        let long = "excellent caring nurse staff room wait. ".repeat(30);
        let samples = ["", "ok", long.as_str()];
        for sample in samples {
            let score = analyzer.analyze_text(sample);
            assert!((0.3..=1.0).contains(&score.confidence));
        }
    }

    #[test]
    fn analyze_text_fills_every_field() {
        let score = analyzer().analyze_text("Terrible rude staff, long wait");
        assert!(score.overall < -0.5);
        assert!(score.aspects.get(Aspect::Staff) < 0.0);
        assert!(score.aspects.get(Aspect::WaitTime) < 0.0);
        assert_eq!(score.keywords[0], "terrible");
        assert!(score.keywords.len() <= 10);
    }
}
