//! Bundled upstream adapters and the normalization rules they share.
//!
//! Each adapter maps its wire payload into a [`RawArticle`] and hands it to
//! [`normalize`], so every source produces items the same way:
//!
//! - ids are `source:upstream-id`, or `source:` + sha256 of the url (title
//!   when there is no url) for upstreams without stable ids;
//! - text is trimmed with inner whitespace collapsed, and empty text is absent;
//! - categories keep source order, deduplicated case-insensitively;
//! - items without a title or a parseable timestamp are dropped.

mod finnhub;
mod gnews;
mod newsapi;

pub use finnhub::FinnhubAdapter;
pub use gnews::GNewsAdapter;
pub use newsapi::NewsApiAdapter;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{impact, NormalizedItem, SourceId, UtcDateTime};

/// Upper bound most upstreams accept for a page size.
pub(crate) const MAX_PAGE_SIZE: usize = 100;

/// Upstream-agnostic intermediate form of one article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RawArticle {
    pub upstream_id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    pub published_at: Option<UtcDateTime>,
    pub categories: Vec<String>,
}

pub(crate) fn normalize(source: &SourceId, raw: RawArticle) -> Option<NormalizedItem> {
    let title = clean_text(raw.title.as_deref())?;
    let Some(published_at) = raw.published_at else {
        debug!(source = %source, title = %title, "dropping item without a usable timestamp");
        return None;
    };
    let body = clean_text(raw.body.as_deref()).unwrap_or_default();
    let url = clean_text(raw.url.as_deref());
    let id = stable_id(source, raw.upstream_id.as_deref(), url.as_deref(), &title);
    let impact = impact::assess(&title, &body);

    Some(NormalizedItem {
        id,
        source: source.clone(),
        title,
        body,
        url,
        published_at,
        categories: dedupe_categories(raw.categories),
        impact: Some(impact),
    })
}

/// Normalizes a batch, keeping at most `limit` items in upstream order.
pub(crate) fn normalize_all(
    source: &SourceId,
    articles: impl IntoIterator<Item = RawArticle>,
    limit: usize,
) -> Vec<NormalizedItem> {
    articles
        .into_iter()
        .filter_map(|raw| normalize(source, raw))
        .take(limit)
        .collect()
}

pub(crate) fn stable_id(
    source: &SourceId,
    upstream_id: Option<&str>,
    url: Option<&str>,
    title: &str,
) -> String {
    if let Some(upstream) = upstream_id.map(str::trim).filter(|id| !id.is_empty()) {
        return format!("{source}:{upstream}");
    }
    let seed = url.unwrap_or(title);
    format!("{source}:{}", hex::encode(Sha256::digest(seed.as_bytes())))
}

pub(crate) fn clean_text(value: Option<&str>) -> Option<String> {
    let collapsed = value?.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

pub(crate) fn dedupe_categories(categories: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    for category in categories {
        let Some(category) = clean_text(Some(&category)) else {
            continue;
        };
        if !kept
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(&category))
        {
            kept.push(category);
        }
    }
    kept
}

/// RFC3339 with any offset, or a bare unix-seconds string.
pub(crate) fn parse_timestamp(value: Option<&str>) -> Option<UtcDateTime> {
    let value = value?.trim();
    if let Ok(parsed) = UtcDateTime::parse(value) {
        return Some(parsed);
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|seconds| UtcDateTime::from_unix_seconds(seconds).ok())
}

pub(crate) fn clamp_page_size(limit: usize) -> String {
    limit.clamp(1, MAX_PAGE_SIZE).to_string()
}
