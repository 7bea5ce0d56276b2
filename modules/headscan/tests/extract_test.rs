use std::time::Duration;

use headscan::testing::{MockPage, MockRenderer};
use headscan::{extract_head, ExtractOptions};

fn options() -> ExtractOptions {
    ExtractOptions {
        timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

#[tokio::test]
async fn loaded_page_yields_head_metadata() {
    let renderer = MockRenderer::new().on_page(
        "https://example.com/",
        MockPage::titled("https://example.com/", "Example"),
    );

    let result = extract_head(&renderer, "https://example.com/", 0, 1, &options()).await;

    assert_eq!(result.original_url, "https://example.com/");
    assert_eq!(result.final_url.as_deref(), Some("https://example.com/"));
    assert!(!result.timeout_flag);
    assert_eq!(result.redirect_chain, Some(vec![]));
    assert_eq!(result.redirect_count, 0);

    let head = result.head_elements.expect("head elements");
    let tags: Vec<&str> = head.iter().map(|e| e.tag.as_str()).collect();
    assert_eq!(tags, vec!["title", "meta"], "script must be skipped, tags lowercased");
    assert_eq!(head[0].text, "Example");
    assert_eq!(head[1].attributes.get("charset").map(String::as_str), Some("utf-8"));
    assert_eq!(head[1].text, "");
    assert_eq!(renderer.closed(), 1);
}

#[tokio::test]
async fn scheme_less_input_is_fetched_over_http_but_keeps_its_key() {
    let renderer = MockRenderer::new().on_page(
        "example.org",
        MockPage::titled("http://example.org/", "Org"),
    );

    let result = extract_head(&renderer, "example.org", 0, 1, &options()).await;

    assert_eq!(result.original_url, "example.org");
    assert_eq!(result.final_url.as_deref(), Some("http://example.org/"));
    assert!(result.head_elements.is_some());
}

#[tokio::test]
async fn redirects_and_meta_refresh_are_captured() {
    let page = MockPage::titled("https://www.example.com/", "Moved")
        .with_redirects(&[
            ("http://example.com/", 301, Some("https://example.com/")),
            ("https://example.com/", 302, None),
        ])
        .with_html(r#"<head><meta http-equiv="refresh" content="0;url=https://elsewhere.example/ "></head>"#);
    let renderer = MockRenderer::new().on_page("http://example.com/", page);

    let result = extract_head(&renderer, "http://example.com/", 0, 1, &options()).await;

    let chain = result.redirect_chain.expect("chain recorded");
    assert_eq!(result.redirect_count, 2);
    assert_eq!(chain[0].status_code, 301);
    assert_eq!(chain[0].location, "https://example.com/");
    assert_eq!(chain[1].location, "");
    assert!(result.has_meta_refresh);
    assert_eq!(result.meta_refresh_url.as_deref(), Some("https://elsewhere.example/"));
}

#[tokio::test]
async fn timeout_sets_flag_and_leaves_defaults() {
    let renderer = MockRenderer::new().on_page("slow.example", MockPage::Timeout);

    let result = extract_head(&renderer, "slow.example", 3, 10, &options()).await;

    assert!(result.timeout_flag);
    assert!(result.final_url.is_none());
    assert!(result.redirect_chain.is_none());
    assert!(result.head_elements.is_none());
    assert!(result.duration_seconds >= 0.0);
    assert_eq!(renderer.closed(), 1);
}

#[tokio::test]
async fn navigation_error_is_not_a_timeout() {
    let renderer = MockRenderer::new();

    let result = extract_head(&renderer, "nowhere.invalid", 0, 1, &options()).await;

    assert!(!result.timeout_flag);
    assert!(result.final_url.is_none());
    assert_eq!(renderer.open_now(), 0);
}

#[tokio::test]
async fn failure_to_open_is_reported_as_timeout() {
    let renderer = MockRenderer::new()
        .on_page("example.com", MockPage::titled("http://example.com/", "x"))
        .failing_open();

    let result = extract_head(&renderer, "example.com", 0, 1, &options()).await;

    assert!(result.timeout_flag);
    assert!(result.final_url.is_none());
    assert_eq!(renderer.opened(), 0);
}

#[tokio::test]
async fn dom_query_failure_after_navigation_is_contained() {
    let renderer = MockRenderer::new().on_page(
        "broken.example",
        MockPage::BrokenDom {
            final_url: "http://broken.example/".into(),
        },
    );

    let result = extract_head(&renderer, "broken.example", 0, 1, &options()).await;

    assert!(!result.timeout_flag);
    assert!(result.final_url.is_none());
    assert!(result.head_elements.is_none());
    assert_eq!(renderer.closed(), 1);
}

#[tokio::test]
async fn renderer_panic_still_closes_the_session() {
    let renderer = MockRenderer::new().on_page("crash.example", MockPage::Panic);

    let result = extract_head(&renderer, "crash.example", 0, 1, &options()).await;

    assert_eq!(result.original_url, "crash.example");
    assert!(result.final_url.is_none());
    assert_eq!(renderer.opened(), 1);
    assert_eq!(renderer.closed(), 1);
}

#[tokio::test]
async fn empty_head_is_absent_and_screenshotted_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = MockRenderer::new().on_page("bare.example", MockPage::empty_head("http://bare.example/"));
    let options = ExtractOptions {
        screenshot_dir: Some(dir.path().join("shots")),
        ..options()
    };

    let result = extract_head(&renderer, "bare.example", 4, 10, &options).await;

    assert_eq!(result.final_url.as_deref(), Some("http://bare.example/"));
    assert!(result.head_elements.is_none());
    assert_eq!(renderer.screenshots(), 1);
    assert!(dir.path().join("shots").join("5.png").is_file());
}

#[tokio::test]
async fn no_screenshot_without_a_directory() {
    let renderer = MockRenderer::new().on_page("bare.example", MockPage::empty_head("http://bare.example/"));

    extract_head(&renderer, "bare.example", 0, 1, &options()).await;

    assert_eq!(renderer.screenshots(), 0);
}

#[tokio::test]
async fn renderer_panic_on_open_yields_an_unreachable_result() {
    let renderer = MockRenderer::new()
        .on_page("example.com", MockPage::titled("http://example.com/", "x"))
        .panicking_open_on(1);

    let result = extract_head(&renderer, "example.com", 0, 1, &options()).await;

    assert_eq!(result.original_url, "example.com");
    assert!(result.timeout_flag);
    assert!(result.final_url.is_none());
    assert_eq!(renderer.opened(), 0);
}

#[tokio::test]
async fn renderer_panic_on_close_keeps_the_loaded_result() {
    let renderer = MockRenderer::new()
        .on_page("example.com", MockPage::titled("http://example.com/", "Kept"))
        .panicking_close();

    let result = extract_head(&renderer, "example.com", 0, 1, &options()).await;

    assert_eq!(result.final_url.as_deref(), Some("http://example.com/"));
    assert!(result.head_elements.is_some());
    assert_eq!(renderer.open_now(), 0);
}

#[tokio::test]
async fn hung_navigation_is_abandoned_after_timeout_plus_grace() {
    let renderer = MockRenderer::new().on_page("stuck.example", MockPage::Hang);
    let options = ExtractOptions {
        timeout: Duration::from_millis(100),
        grace: Duration::from_millis(100),
        ..Default::default()
    };

    let started = std::time::Instant::now();
    let result = extract_head(&renderer, "stuck.example", 0, 1, &options).await;

    assert!(result.timeout_flag);
    assert!(result.final_url.is_none());
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    assert_eq!(renderer.closed(), 1);
}

#[test]
fn default_unit_budget_outlasts_the_browserless_request() {
    let options = ExtractOptions::default();
    assert!(options.grace > browserless_client::REQUEST_GRACE);
}
