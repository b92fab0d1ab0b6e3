//! Behavior-driven tests for the bundled source adapters.
//!
//! These tests verify HOW each upstream is called and how its payload is
//! normalized, using scripted HTTP responses instead of the network.

use std::sync::Arc;

use ferrofeed_core::{
    DateRange, FinnhubAdapter, GNewsAdapter, HttpResponse, ImpactLevel, NewsApiAdapter,
    SourceAdapter, SourceErrorKind, SourceKind, SourceSettings, TransportErrorKind,
};
use ferrofeed_tests::{ts, ScriptedHttpClient};

const NEWSAPI_BODY: &str = r#"{
    "status": "ok",
    "totalResults": 3,
    "articles": [
        {"source": {"id": "reuters", "name": "Reuters"}, "author": "A", "title": "Fed signals  rate hike", "description": "Policy tightens.", "url": "https://n.test/1", "publishedAt": "2024-03-01T12:00:00Z", "content": "Full text"},
        {"source": {"id": null, "name": "Blog"}, "title": "Bakery opens downtown", "description": null, "url": "https://n.test/2", "publishedAt": "2024-02-20T09:00:00Z", "content": "Fresh bread"},
        {"source": {"id": null, "name": "[Removed]"}, "title": "[Removed]", "description": "[Removed]", "url": "https://removed.com", "publishedAt": "1970-01-01T00:00:00Z"}
    ]
}"#;

const FINNHUB_BODY: &str = r#"[
    {"category": "company", "datetime": 1709280000, "headline": "Apple earnings beat", "id": 101, "image": "", "related": "AAPL", "source": "Wire", "summary": "Services grew.", "url": "https://f.test/101"},
    {"category": "company", "datetime": 1709290800, "headline": "Apple faces lawsuit", "id": 102, "image": "", "related": "AAPL", "source": "Wire", "summary": "", "url": "https://f.test/102"}
]"#;

fn settings(kind: SourceKind) -> SourceSettings {
    SourceSettings::new(kind).with_api_key("secret-key")
}

fn scripted(body: &str) -> Arc<ScriptedHttpClient> {
    Arc::new(ScriptedHttpClient::new([Ok(HttpResponse::ok_json(body))]))
}

// =============================================================================
// NewsAPI
// =============================================================================

#[tokio::test]
async fn when_newsapi_returns_headlines_system_normalizes_them() {
    // Given: A NewsAPI adapter over a scripted upstream
    let http = scripted(NEWSAPI_BODY);
    let adapter =
        NewsApiAdapter::with_http_client(&settings(SourceKind::NewsApi), http.clone()).expect("valid");

    // When: The latest five items are fetched
    let items = adapter.fetch_latest(5).await.expect("parses");

    // Then: The request is shaped for top-headlines with bearer auth
    let request = &http.requests()[0];
    assert_eq!(
        request.url,
        "https://newsapi.org/v2/top-headlines?category=business&language=en&pageSize=5"
    );
    assert_eq!(request.header("authorization"), Some("Bearer secret-key"));

    // And: Removed placeholders are skipped and text is cleaned
    assert_eq!(items.len(), 2);
    let first = &items[0];
    assert_eq!(first.title, "Fed signals rate hike");
    assert_eq!(first.body, "Policy tightens.");
    assert_eq!(first.url.as_deref(), Some("https://n.test/1"));
    assert_eq!(first.categories, vec!["business", "Reuters"]);
    assert_eq!(first.impact_level(), Some(ImpactLevel::High));
    assert_eq!(items[1].body, "Fresh bread");
    assert_eq!(items[1].impact_level(), Some(ImpactLevel::Low));
}

#[tokio::test]
async fn when_newsapi_reports_an_error_status_system_surfaces_an_upstream_error() {
    let http = scripted(r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#);
    let adapter =
        NewsApiAdapter::with_http_client(&settings(SourceKind::NewsApi), http).expect("valid");

    let error = adapter.fetch_latest(5).await.expect_err("must fail");

    assert_eq!(error.kind(), SourceErrorKind::Upstream);
    assert!(error.message().contains("apiKeyInvalid") || error.message().contains("invalid"));
    assert!(!error.retryable());
}

#[tokio::test]
async fn when_the_upstream_is_missing_system_classifies_and_degrades() {
    // Given: An upstream that answers 404
    let http = Arc::new(ScriptedHttpClient::statuses(&[404, 404]));
    let adapter =
        NewsApiAdapter::with_http_client(&settings(SourceKind::NewsApi), http.clone()).expect("valid");

    // When: The fallible and infallible variants are called
    let error = adapter.fetch_latest(5).await.expect_err("must fail");
    let degraded = adapter.get_latest(5).await;

    // Then: The error keeps its transport class and the infallible call is empty
    assert_eq!(error.kind(), SourceErrorKind::Upstream);
    assert_eq!(error.transport_kind(), Some(TransportErrorKind::NotFound));
    assert_eq!(error.code(), "source.upstream");
    assert!(degraded.is_empty());
    assert_eq!(http.call_count(), 2);
}

#[tokio::test]
async fn when_newsapi_range_is_requested_system_keeps_only_items_inside_it() {
    let http = scripted(NEWSAPI_BODY);
    let adapter =
        NewsApiAdapter::with_http_client(&settings(SourceKind::NewsApi), http.clone()).expect("valid");
    let range = DateRange::new(ts("2024-03-01T00:00:00Z"), ts("2024-03-02T00:00:00Z"))
        .expect("valid range");

    let items = adapter.fetch_range(range, 10).await.expect("parses");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Fed signals rate hike");
    let url = &http.requests()[0].url;
    assert!(url.starts_with("https://newsapi.org/v2/everything?q=business&from=2024-03-01T00%3A00%3A00Z"));
}

#[tokio::test]
async fn when_newer_items_fall_outside_the_range_system_still_fills_the_limit() {
    // Given: The newest article is after the requested window
    let http = scripted(NEWSAPI_BODY);
    let adapter =
        NewsApiAdapter::with_http_client(&settings(SourceKind::NewsApi), http).expect("valid");
    let range = DateRange::new(ts("2024-02-01T00:00:00Z"), ts("2024-02-28T00:00:00Z"))
        .expect("valid range");

    // When: A single item is requested from the window
    let items = adapter.fetch_range(range, 1).await.expect("parses");

    // Then: The out-of-range article does not use up the limit
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Bakery opens downtown");
}

#[tokio::test]
async fn when_search_query_is_blank_system_rejects_it_without_a_request() {
    let http = Arc::new(ScriptedHttpClient::default());
    let adapter =
        NewsApiAdapter::with_http_client(&settings(SourceKind::NewsApi), http.clone()).expect("valid");

    let error = adapter.fetch_search("  ", 5).await.expect_err("must fail");

    assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
    assert_eq!(http.call_count(), 0);
}

// =============================================================================
// Finnhub
// =============================================================================

#[tokio::test]
async fn when_searching_finnhub_for_a_ticker_system_uses_company_news() {
    // Given: A Finnhub adapter over a scripted upstream
    let http = scripted(FINNHUB_BODY);
    let adapter =
        FinnhubAdapter::with_http_client(&settings(SourceKind::Finnhub), http.clone()).expect("valid");

    // When: A ticker is searched
    let items = adapter.fetch_search("AAPL", 10).await.expect("parses");

    // Then: Company news is requested with the token in a header only
    let request = &http.requests()[0];
    assert!(request
        .url
        .starts_with("https://finnhub.io/api/v1/company-news?symbol=AAPL&from="));
    assert_eq!(request.header("x-finnhub-token"), Some("secret-key"));
    assert!(!request.url.contains("secret-key"));

    // And: Items come back newest first with upstream ids
    let ids: Vec<_> = items.iter().map(|item| item.id.as_str()).collect();
    assert_eq!(ids, vec!["finnhub:102", "finnhub:101"]);
    assert_eq!(items[0].impact_level(), Some(ImpactLevel::Medium));
    assert_eq!(items[0].body, "");
}

#[tokio::test]
async fn when_searching_finnhub_for_a_phrase_system_filters_the_general_feed() {
    let http = scripted(FINNHUB_BODY);
    let adapter =
        FinnhubAdapter::with_http_client(&settings(SourceKind::Finnhub), http.clone()).expect("valid");

    let items = adapter.fetch_search("lawsuit", 10).await.expect("parses");

    assert_eq!(http.requests()[0].url, "https://finnhub.io/api/v1/news?category=general");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "finnhub:102");
}

// =============================================================================
// GNews
// =============================================================================

#[tokio::test]
async fn when_searching_gnews_system_sends_the_key_as_a_query_parameter() {
    // Given: A GNews adapter over a scripted upstream
    let http = scripted(
        r#"{"totalArticles":1,"articles":[{"title":"Oil prices crash","description":"Brent slides.","content":"...","url":"https://g.test/1","image":null,"publishedAt":"2024-03-01T07:00:00Z","source":{"name":"Energy Wire","url":"https://g.test"}}]}"#,
    );
    let adapter =
        GNewsAdapter::with_http_client(&settings(SourceKind::GNews), http.clone()).expect("valid");

    // When: A phrase is searched
    let items = adapter.fetch_search("oil prices", 3).await.expect("parses");

    // Then: The key rides in the query string after the search parameters
    assert_eq!(
        http.requests()[0].url,
        "https://gnews.io/api/v4/search?q=oil%20prices&lang=en&sortby=publishedAt&max=3&apikey=secret-key"
    );
    assert_eq!(items.len(), 1);
    assert!(items[0].id.starts_with("gnews:"));
    assert_eq!(items[0].categories, vec!["business", "Energy Wire"]);
    assert_eq!(items[0].impact_level(), Some(ImpactLevel::High));
}

#[tokio::test]
async fn when_gnews_range_is_requested_system_filters_before_applying_the_limit() {
    let http = scripted(
        r#"{"totalArticles":2,"articles":[
            {"title":"Late story","description":"After the window.","url":"https://g.test/late","publishedAt":"2024-03-05T07:00:00Z","source":{"name":"Wire"}},
            {"title":"Early story","description":"Inside the window.","url":"https://g.test/early","publishedAt":"2024-03-01T07:00:00Z","source":{"name":"Wire"}}
        ]}"#,
    );
    let adapter =
        GNewsAdapter::with_http_client(&settings(SourceKind::GNews), http).expect("valid");
    let range = DateRange::new(ts("2024-03-01T00:00:00Z"), ts("2024-03-02T00:00:00Z"))
        .expect("valid range");

    let items = adapter.fetch_range(range, 1).await.expect("parses");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Early story");
}

#[tokio::test]
async fn when_gnews_returns_malformed_json_system_reports_a_parse_error() {
    let http = scripted("<html>maintenance</html>");
    let adapter =
        GNewsAdapter::with_http_client(&settings(SourceKind::GNews), http).expect("valid");

    let error = adapter.fetch_latest(5).await.expect_err("must fail");

    assert_eq!(error.kind(), SourceErrorKind::Parse);
    assert_eq!(error.code(), "source.parse");
    assert!(adapter.get_latest(5).await.is_empty());
}
