//! Key-term detection shared by indexing and querying.
//!
//! A candidate token scores for containing digits, for being written fully in
//! upper case and for belonging to the preferred set. Stop words never score.
//! The highest score wins; ties go to the leftmost token.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TermRules {
    pub stop_words: Vec<String>,
    pub preferred_terms: Vec<String>,
    pub digit_weight: i32,
    pub upper_weight: i32,
    pub preferred_weight: i32,
}

impl Default for TermRules {
    fn default() -> Self {
        let stop_words = [
            // de
            "was", "ist", "das", "der", "die", "und", "ein", "eine", "mit", "im", "in", "de",
            "en", "von", // en
            "what", "is", "are", "were", "the", "and", "for", "to", "of", "or", "an", "a", "on",
            "at", "by", "with", "please", "explain", "define", "about",
        ];
        let preferred_terms = ["CAN", "CAN-FD", "OEM", "RASIC", "CAL", "ISO", "SAE"];

        Self {
            stop_words: stop_words.iter().map(|word| word.to_string()).collect(),
            preferred_terms: preferred_terms.iter().map(|term| term.to_string()).collect(),
            digit_weight: 2,
            upper_weight: 1,
            preferred_weight: 3,
        }
    }
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"\b[A-Za-zÄÖÜäöüß0-9\-/]{2,20}\b").expect("token pattern is valid")
    })
}

fn is_fully_upper(token: &str) -> bool {
    token.chars().any(char::is_alphabetic) && !token.chars().any(char::is_lowercase)
}

impl TermRules {
    fn is_stop_word(&self, token: &str) -> bool {
        let lowered = token.to_lowercase();
        self.stop_words.iter().any(|word| *word == lowered)
    }

    fn is_preferred(&self, token: &str) -> bool {
        self.preferred_terms.iter().any(|term| term == token)
    }

    /// Score of a single token, `None` for stop words.
    pub fn score(&self, token: &str) -> Option<i32> {
        if self.is_stop_word(token) {
            return None;
        }

        let mut score = 0;
        if token.chars().any(|ch| ch.is_ascii_digit()) {
            score += self.digit_weight;
        }
        if is_fully_upper(token) {
            score += self.upper_weight;
        }
        if self.is_preferred(token) {
            score += self.preferred_weight;
        }
        Some(score)
    }

    /// The most likely key term of `text`, upper-cased.
    pub fn detect_term(&self, text: &str) -> Option<String> {
        let mut best: Option<(i32, &str)> = None;

        for found in token_regex().find_iter(text) {
            let token = found.as_str();
            let Some(score) = self.score(token) else {
                continue;
            };
            // strictly greater keeps the leftmost token on ties
            if best.map_or(true, |(best_score, _)| score > best_score) {
                best = Some((score, token));
            }
        }

        match best {
            Some((score, token)) if score > 0 => Some(token.to_uppercase()),
            _ => None,
        }
    }
}

/// Short all-capital acronyms need strict boundaries ("CAN" vs "can").
pub fn is_short_acronym(term: &str) -> bool {
    let count = term.chars().count();
    (2..=5).contains(&count) && term.chars().all(|ch| matches!(ch, 'A'..='Z' | 'Ä' | 'Ö' | 'Ü'))
}

/// Lower-cased text without whitespace, hyphens or slashes.
pub fn normalize_for_match(text: &str) -> String {
    text.chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-' && *ch != '/')
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_word_letter(ch: char) -> bool {
    ch.is_ascii_alphabetic() || matches!(ch, 'Ä' | 'Ö' | 'Ü' | 'ä' | 'ö' | 'ü' | 'ß')
}

/// Whether `text` mentions `term`.
///
/// Short acronyms match case-sensitively and only when not flanked by
/// letters. Anything else matches on the normalized form.
pub fn matches_term(term: &str, text: &str) -> bool {
    if term.is_empty() || text.is_empty() {
        return false;
    }

    if is_short_acronym(term) {
        return text.match_indices(term).any(|(start, found)| {
            let before = text[..start].chars().next_back();
            let after = text[start + found.len()..].chars().next();
            !before.is_some_and(is_word_letter) && !after.is_some_and(is_word_letter)
        });
    }

    let needle = normalize_for_match(term);
    !needle.is_empty() && normalize_for_match(text).contains(&needle)
}
