//! Heuristic complexity classification, used as the fallback when the
//! remote classifier is unavailable (and the only path this deployment
//! ships, until an ml classifier is wired in).

use taskstore::Complexity;

const SIMPLE_KEYWORDS: &[&str] = &["fix", "typo", "small", "minor", "quick", "simple"];
const COMPLEX_KEYWORDS: &[&str] = &["architecture", "refactor", "rewrite", "migration", "complex"];

/// Evaluate the heuristic rules in order; first match wins.
pub fn classify(description: &str) -> Complexity {
    let lower = description.to_lowercase();
    let word_count = description.split_whitespace().count();

    if SIMPLE_KEYWORDS.iter().any(|k| lower.contains(k)) || word_count < 20 {
        return Complexity::Simple;
    }
    if COMPLEX_KEYWORDS.iter().any(|k| lower.contains(k)) || word_count > 100 {
        return Complexity::Complex;
    }
    Complexity::Medium
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_description_is_simple() {
        assert_eq!(classify("fix the bug"), Complexity::Simple);
    }

    #[test]
    fn keyword_triggers_simple_even_if_long() {
        let text = "this is a quick fix for a minor issue that otherwise reads as a fairly long description of the change because it repeats itself several times over to pad the word count past twenty words easily";
        assert_eq!(classify(text), Complexity::Simple);
    }

    #[test]
    fn keyword_triggers_complex() {
        let text = "We need to refactor the entire billing architecture across twenty services";
        assert_eq!(classify(text), Complexity::Complex);
    }

    #[test]
    fn long_description_without_keywords_is_complex() {
        let text = "word ".repeat(101);
        assert_eq!(classify(&text), Complexity::Complex);
    }

    #[test]
    fn mid_length_description_without_keywords_is_medium() {
        let text = "Please update the onboarding email template to include the new pricing tiers and a link to the updated documentation page for customers";
        assert_eq!(classify(text), Complexity::Medium);
    }

    #[test]
    fn epic_is_never_produced_heuristically() {
        let text = "word ".repeat(500);
        assert_ne!(classify(&text), Complexity::Epic);
    }
}
