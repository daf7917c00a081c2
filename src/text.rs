use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::lexicon::Lexicon;

/// Punctuation kept by normalization and treated as word/sentence boundaries.
const BOUNDARY_PUNCTUATION: [char; 4] = ['.', ',', '!', '?'];
const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Replaces "negation + positive term".
pub const NEGATED_POSITIVE: &str = "bad";
/// Replaces "negation + negative term".
pub const NEGATED_NEGATIVE: &str = "okay";

pub const MAX_KEYWORDS: usize = 10;

static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.,!?-]").expect("Invalid normalization pattern"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace pattern"));

/// Canonicalize a raw review comment: lower-case, strip symbols, collapse
/// whitespace and fold negated lexicon terms into a single marker word.
///
/// Normalizing an already normalized string returns it unchanged.
pub fn normalize(raw: &str, lexicon: &Lexicon) -> String {
    let lowered = raw.to_lowercase();
    let stripped = DISALLOWED_CHARS.replace_all(&lowered, "");
    let collapsed = WHITESPACE_RUN.replace_all(stripped.trim(), " ");

    if collapsed.is_empty() {
        return String::new();
    }

    let tokens: Vec<String> = collapsed.split(' ').map(str::to_string).collect();
    rewrite_negations(tokens, lexicon).join(" ")
}

/// Rewrites until no negation pair is left, so "not not great" ends as "okay".
fn rewrite_negations(mut tokens: Vec<String>, lexicon: &Lexicon) -> Vec<String> {
    loop {
        let mut rewritten = Vec::with_capacity(tokens.len());
        let mut changed = false;
        let mut index = 0;

        while index < tokens.len() {
            if let Some(next) = tokens.get(index + 1) {
                if lexicon.is_negation(&tokens[index]) {
                    let (core, tail) = split_trailing_punctuation(next);
                    let marker = if lexicon.is_positive(core) {
                        Some(NEGATED_POSITIVE)
                    } else if lexicon.is_negative(core) {
                        Some(NEGATED_NEGATIVE)
                    } else {
                        None
                    };

                    if let Some(marker) = marker {
                        rewritten.push(format!("{marker}{tail}"));
                        index += 2;
                        changed = true;
                        continue;
                    }
                }
            }

            rewritten.push(tokens[index].clone());
            index += 1;
        }

        tokens = rewritten;
        if !changed {
            return tokens;
        }
    }
}

fn split_trailing_punctuation(token: &str) -> (&str, &str) {
    let core = token.trim_end_matches(|c: char| BOUNDARY_PUNCTUATION.contains(&c));
    (core, &token[core.len()..])
}

/// Words of a normalized text with boundary punctuation removed.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || BOUNDARY_PUNCTUATION.contains(&c))
        .map(|word| word.trim_matches('-'))
        .filter(|word| !word.is_empty())
}

pub fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| SENTENCE_TERMINATORS.contains(&c))
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
}

/// Most frequent salient terms, ties broken by first appearance.
pub fn extract_keywords(normalized: &str, lexicon: &Lexicon) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();

    for (position, word) in words(normalized).enumerate() {
        if word.chars().count() <= 3
            || !word.chars().all(char::is_alphabetic)
            || lexicon.is_stop_word(word)
        {
            continue;
        }
        let entry = counts.entry(word).or_insert((0, position));
        entry.0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first_seen))| (word, count, first_seen))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(word, _, _)| word.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(raw: &str) -> String {
        normalize(raw, &Lexicon::default())
    }

    #[test]
    fn lowercases_strips_and_collapses() {
        assert_eq!(
            normalized("  The Nurse   was GREAT!!  (really) :) "),
            "the nurse was great!! really"
        );
    }

    #[test]
    fn keeps_hyphens_and_sentence_punctuation() {
        assert_eq!(normalized("Well-run clinic. Short wait?"), "well-run clinic. short wait?");
    }

    #[test]
    fn empty_and_whitespace_only_yield_empty() {
        assert_eq!(normalized(""), "");
        assert_eq!(normalized("   \t\n "), "");
        assert_eq!(normalized("@@@ ###"), "");
    }

    #[test]
    fn negated_positive_becomes_bad() {
        assert_eq!(normalized("The staff were not friendly."), "the staff were bad.");
    }

    #[test]
    fn negated_negative_becomes_okay() {
        assert_eq!(normalized("Honestly never rude"), "honestly okay");
    }

    #[test]
    fn negation_before_neutral_word_is_kept() {
        assert_eq!(normalized("not sure about parking"), "not sure about parking");
    }

    #[test]
    fn negation_with_attached_punctuation_does_not_cross_sentences() {
        assert_eq!(normalized("I said no. Great visit"), "i said no. great visit");
    }

    #[test]
    fn stacked_negations_reach_a_fixpoint() {
        assert_eq!(normalized("not not excellent"), "okay");
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "Terrible, RUDE staff -- long wait!!!",
            "not not excellent",
            "Nobody was helpful; the room was not dirty at all.",
            "Dr. Smith explained everything?! 10/10",
            "",
        ];
        for sample in samples {
            let once = normalized(sample);
            assert_eq!(normalized(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn words_drop_boundary_punctuation() {
        let collected: Vec<&str> = words("great, staff! well-run -").collect();
        assert_eq!(collected, vec!["great", "staff", "well-run"]);
    }

    #[test]
    fn sentences_split_on_terminators() {
        let collected: Vec<&str> = sentences("rude nurse. clean room! long wait? ").collect();
        assert_eq!(collected, vec!["rude nurse", "clean room", "long wait"]);
    }

    #[test]
    fn keywords_filter_and_rank_by_frequency() {
        let lexicon = Lexicon::default();
        let keywords = extract_keywords(
            "nurse was rude, the nurse ignored questions. with 2024 visits nurse rude",
            &lexicon,
        );
        assert_eq!(keywords[0], "nurse");
        assert_eq!(keywords[1], "rude");
        assert!(!keywords.contains(&"with".to_string()));
        assert!(!keywords.contains(&"was".to_string()));
        assert!(!keywords.contains(&"2024".to_string()));
    }

    #[test]
    fn keywords_are_capped_and_well_formed() {
        let lexicon = Lexicon::default();
        let text = "alpha bravo charlie delta echoes foxtrot golf hotel india juliet kilo lima mike \
                    november oscar papa quebec romeo sierra tango alpha alpha bravo";
        let keywords = extract_keywords(text, &lexicon);
        assert!(keywords.len() <= MAX_KEYWORDS);
        assert_eq!(keywords[0], "alpha");
        assert_eq!(keywords[1], "bravo");
        for keyword in &keywords {
            assert!(keyword.chars().count() > 3);
            assert!(keyword.chars().all(char::is_alphabetic));
        }
    }
}
