// src/matching/pattern.rs

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::spaced_name;

const SAME_KEYWORD_SCORE: f64 = 1.0;
const SAME_CATEGORY_SCORE: f64 = 0.9;

/// Semantic categories a column name can fall into, tested in this order.
pub const PATTERN_CATEGORIES: [&str; 9] = [
    "id",
    "email",
    "date",
    "name",
    "phone",
    "address",
    "price",
    "status",
    "description",
];

static CATEGORY_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    let sources: [(&str, &str); 9] = [
        ("id", r"\b(id|identifier|key|code|number|no|num)\b"),
        ("email", r"\b(email|e mail|mail)\b"),
        (
            "date",
            r"\b(date|time|year|month|day|created|updated|timestamp)\b",
        ),
        ("name", r"\b(name|first|last|full|surname|given)\b"),
        ("phone", r"\b(phone|mobile|cell|contact|tel)\b"),
        (
            "address",
            r"\b(address|city|state|zip|postal|country|location)\b",
        ),
        ("price", r"\b(price|cost|amount|value|total|revenue|fee)\b"),
        ("status", r"\b(status|state|condition|flag)\b"),
        ("description", r"\b(desc|description|details|notes|comment)\b"),
    ];
    sources
        .into_iter()
        .map(|(category, source)| {
            (
                category,
                Regex::new(source).expect("category pattern is a valid regex"),
            )
        })
        .collect()
});

fn category_keywords(regex: &Regex, spaced: &str) -> BTreeSet<String> {
    regex
        .find_iter(spaced)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// First category a column name falls into, if any.
pub fn pattern_category(name: &str) -> Option<&'static str> {
    let spaced = spaced_name(name);
    CATEGORY_PATTERNS
        .iter()
        .find(|(_, regex)| regex.is_match(&spaced))
        .map(|(category, _)| *category)
}

/// Category agreement of two column names: 1.0 when both hit the same keyword
/// of a category, 0.9 when they reach the same category through different
/// keywords, otherwise 0.
pub fn pattern_score(name1: &str, name2: &str) -> f64 {
    let spaced1 = spaced_name(name1);
    let spaced2 = spaced_name(name2);
    if spaced1.is_empty() || spaced2.is_empty() {
        return 0.0;
    }

    for (_, regex) in CATEGORY_PATTERNS.iter() {
        let keywords1 = category_keywords(regex, &spaced1);
        if keywords1.is_empty() {
            continue;
        }
        let keywords2 = category_keywords(regex, &spaced2);
        if keywords2.is_empty() {
            continue;
        }
        return if keywords1.intersection(&keywords2).next().is_some() {
            SAME_KEYWORD_SCORE
        } else {
            SAME_CATEGORY_SCORE
        };
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_keyword_scores_full() {
        assert_eq!(pattern_score("employee_id", "emp_id"), 1.0);
        assert_eq!(pattern_score("Customer-Email", "email"), 1.0);
    }

    #[test]
    fn same_category_different_keyword() {
        assert_eq!(pattern_score("order_date", "created_at"), 0.9);
        assert_eq!(pattern_score("unit_price", "total_cost"), 0.9);
    }

    #[test]
    fn no_shared_category_scores_zero() {
        assert_eq!(pattern_score("salary", "annual_income"), 0.0);
        assert_eq!(pattern_score("dept", "department"), 0.0);
        assert_eq!(pattern_score("user_id", "email"), 0.0);
        // "id" inside a word is not a keyword hit
        assert_eq!(pattern_score("paid", "idle"), 0.0);
    }

    #[test]
    fn categories_follow_table_order() {
        assert_eq!(pattern_category("account_number"), Some("id"));
        assert_eq!(pattern_category("billing state"), Some("address"));
        assert_eq!(pattern_category("salary"), None);
        assert_eq!(PATTERN_CATEGORIES.len(), CATEGORY_PATTERNS.len());
    }
}
