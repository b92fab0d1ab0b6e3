//! Keyword taxonomy used to annotate items with a market-impact level.
//!
//! Matching is case-insensitive over `title + body`. The first tier with at
//! least one hit decides the level; matched keywords are reported in
//! taxonomy order so identical text always yields an identical annotation.

use crate::domain::{ImpactAnnotation, ImpactLevel};

const HIGH_IMPACT: &[&str] = &[
    "interest rate",
    "rate hike",
    "rate cut",
    "federal reserve",
    "inflation",
    "recession",
    "default",
    "bankruptcy",
    "sanctions",
    "tariff",
    "war",
    "crash",
];

const MEDIUM_IMPACT: &[&str] = &[
    "earnings",
    "guidance",
    "merger",
    "acquisition",
    "layoffs",
    "regulation",
    "lawsuit",
    "unemployment",
    "gdp",
    "ipo",
    "downgrade",
    "upgrade",
];

const MAX_REPORTED_KEYWORDS: usize = 3;

pub fn assess(title: &str, body: &str) -> ImpactAnnotation {
    let text = format!("{} {}", title, body).to_lowercase();

    for (level, keywords) in [
        (ImpactLevel::High, HIGH_IMPACT),
        (ImpactLevel::Medium, MEDIUM_IMPACT),
    ] {
        let matched = matched_keywords(&text, keywords);
        if !matched.is_empty() {
            return ImpactAnnotation {
                level,
                description: format!(
                    "{} impact: mentions {}",
                    capitalized(level),
                    matched.join(", ")
                ),
            };
        }
    }

    ImpactAnnotation {
        level: ImpactLevel::Low,
        description: String::from("Low impact: no market-moving keywords detected"),
    }
}

fn matched_keywords<'k>(text: &str, keywords: &[&'k str]) -> Vec<&'k str> {
    keywords
        .iter()
        .copied()
        .filter(|keyword| contains_word(text, keyword))
        .take(MAX_REPORTED_KEYWORDS)
        .collect()
}

/// Substring match anchored on word boundaries so "war" does not hit "award".
/// A trailing plural ending is accepted, so "tariff" matches "tariffs".
fn contains_word(text: &str, keyword: &str) -> bool {
    text.match_indices(keyword).any(|(start, _)| {
        let before_ok = text[..start]
            .chars()
            .next_back()
            .map_or(true, |ch| !ch.is_alphanumeric());
        let rest = &text[start + keyword.len()..];
        before_ok
            && plural_endings(keyword)
                .iter()
                .any(|ending| rest.strip_prefix(ending).is_some_and(ends_word))
    })
}

fn plural_endings(keyword: &str) -> &'static [&'static str] {
    if ["s", "x", "z", "sh", "ch"]
        .iter()
        .any(|tail| keyword.ends_with(tail))
    {
        &["", "es"]
    } else {
        &["", "s"]
    }
}

fn ends_word(rest: &str) -> bool {
    rest.chars().next().map_or(true, |ch| !ch.is_alphanumeric())
}

fn capitalized(level: ImpactLevel) -> &'static str {
    match level {
        ImpactLevel::High => "High",
        ImpactLevel::Medium => "Medium",
        ImpactLevel::Low => "Low",
    }
}
