// src/matching/name.rs

use std::collections::BTreeSet;

use crate::config::MIN_PATTERN_TOKEN_LENGTH;
use crate::utils::{compact_name, token_set, tokenize_name};

// Similarity tiers, strongest first
const EXACT_MATCH_SCORE: f64 = 1.0;
const SEPARATOR_ONLY_SCORE: f64 = 0.95;
const TOKEN_ALIGNED_CONTAINMENT_SCORE: f64 = 0.8;
const CONTAINMENT_SCORE: f64 = 0.7;
const ABBREVIATION_TOKEN_CREDIT: f64 = 0.8;

/// Names shorter than this never qualify for the containment tier
const MIN_CONTAINMENT_LENGTH: usize = 4;

/// Similarity of two column names in [0, 1].
///
/// 1.0 for names equal after lowercasing and trimming, 0.95 when they differ
/// only in separators, 0.7-0.8 when one name contains the other (both longer
/// than three characters; 0.8 when the containment falls on token boundaries),
/// otherwise a Jaccard similarity over word tokens longer than two characters
/// in which abbreviations ("emp" for "employee", "dept" for "department")
/// count as partial overlaps.
pub fn name_similarity(name1: &str, name2: &str) -> f64 {
    let n1 = name1.trim().to_lowercase();
    let n2 = name2.trim().to_lowercase();
    if n1.is_empty() || n2.is_empty() {
        return 0.0;
    }

    if n1 == n2 {
        return EXACT_MATCH_SCORE;
    }

    let c1 = compact_name(&n1);
    let c2 = compact_name(&n2);
    if !c1.is_empty() && c1 == c2 {
        return SEPARATOR_ONLY_SCORE;
    }

    if n1.chars().count() >= MIN_CONTAINMENT_LENGTH && n2.chars().count() >= MIN_CONTAINMENT_LENGTH {
        let (shorter, longer) = if n1.len() <= n2.len() {
            (&n1, &n2)
        } else {
            (&n2, &n1)
        };
        if longer.contains(shorter.as_str()) {
            return if tokens_contiguous(&tokenize_name(shorter), &tokenize_name(longer)) {
                TOKEN_ALIGNED_CONTAINMENT_SCORE
            } else {
                CONTAINMENT_SCORE
            };
        }
    }

    token_jaccard(
        &token_set(&n1, MIN_PATTERN_TOKEN_LENGTH),
        &token_set(&n2, MIN_PATTERN_TOKEN_LENGTH),
    )
}

/// Jaccard similarity where an abbreviation pair contributes partial credit.
fn token_jaccard(tokens1: &BTreeSet<String>, tokens2: &BTreeSet<String>) -> f64 {
    if tokens1.is_empty() || tokens2.is_empty() {
        return 0.0;
    }

    let mut credit = 0.0;
    let mut matched = 0usize;
    let mut used: BTreeSet<&str> = BTreeSet::new();

    // Exact overlaps first so an abbreviation never steals an exact partner
    for token in tokens1 {
        if tokens2.contains(token) {
            credit += 1.0;
            matched += 1;
            used.insert(token.as_str());
        }
    }
    for token in tokens1.iter().filter(|t| !tokens2.contains(*t)) {
        let partner = tokens2
            .iter()
            .filter(|other| !used.contains(other.as_str()) && !tokens1.contains(*other))
            .find(|other| is_abbreviation(token, other) || is_abbreviation(other, token));
        if let Some(other) = partner {
            credit += ABBREVIATION_TOKEN_CREDIT;
            matched += 1;
            used.insert(other.as_str());
        }
    }

    let union = tokens1.len() + tokens2.len() - matched;
    if union == 0 {
        return 0.0;
    }
    credit / union as f64
}

/// True when `short` abbreviates `long`: a strict prefix, or an in-order
/// subsequence of its letters that starts with the same letter.
pub fn is_abbreviation(short: &str, long: &str) -> bool {
    let short_len = short.chars().count();
    if short_len < MIN_PATTERN_TOKEN_LENGTH || short_len >= long.chars().count() {
        return false;
    }
    if long.starts_with(short) {
        return true;
    }

    let mut short_chars = short.chars();
    let mut long_chars = long.chars();
    match (short_chars.next(), long_chars.next()) {
        (Some(a), Some(b)) if a == b => {}
        _ => return false,
    }
    let mut pending = short_chars.next();
    for c in long_chars {
        match pending {
            Some(p) if p == c => pending = short_chars.next(),
            Some(_) => {}
            None => break,
        }
    }
    pending.is_none()
}

fn tokens_contiguous(needle: &[String], haystack: &[String]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_separator_tiers() {
        assert_eq!(name_similarity("ID", "id"), 1.0);
        assert_eq!(name_similarity(" Email ", "email"), 1.0);
        assert_eq!(name_similarity("first_name", "FirstName"), 0.95);
        assert_eq!(name_similarity("first-name", "first name"), 0.95);
    }

    #[test]
    fn containment_tier_respects_length_guard() {
        assert_eq!(name_similarity("salary", "annual_salary"), 0.8);
        assert_eq!(name_similarity("price", "unitprice"), 0.7);
        // "id" is too short to count as contained in "paid"
        assert_eq!(name_similarity("id", "paid"), 0.0);
    }

    #[test]
    fn abbreviations_count_as_token_overlap() {
        assert!(is_abbreviation("emp", "employee"));
        assert!(is_abbreviation("dept", "department"));
        assert!(!is_abbreviation("cost", "customer"));
        assert!(!is_abbreviation("employee", "emp"));

        let sim = name_similarity("employee_id", "emp_id");
        assert!((sim - 0.8).abs() < 1e-9, "got {sim}");
        let sim = name_similarity("dept", "department");
        assert!((sim - 0.8).abs() < 1e-9, "got {sim}");
    }

    #[test]
    fn jaccard_ignores_short_tokens() {
        // shared token "id" is too short to count
        assert_eq!(name_similarity("user_id", "order_id"), 0.0);
        let sim = name_similarity("order_total_amount", "total_amount_usd");
        assert!((sim - 0.5).abs() < 1e-9, "got {sim}");
    }

    #[test]
    fn unrelated_names_score_zero() {
        assert_eq!(name_similarity("salary", "annual_income"), 0.0);
        assert_eq!(name_similarity("", "anything"), 0.0);
    }
}
