// Extraction unit: one URL in, one FetchResult out, no errors escape.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use futures::FutureExt;
use headscan_common::{normalize_url, FetchResult, HeadElement, RedirectHop};
use regex::Regex;
use tracing::{error, info, warn};

use crate::renderer::{HeadNode, ObservedResponse, PageRenderer, PageSession, RenderError, WaitUntil};

/// Status codes recorded as redirect hops.
pub const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// Tags dropped from head metadata.
const SKIPPED_TAGS: [&str; 2] = ["style", "script"];

/// Default slack on top of the navigation timeout before the whole unit is
/// abandoned. Longer than the Browserless request grace so the HTTP call
/// reports its own timeout first.
pub const DEFAULT_UNIT_GRACE: Duration =
    Duration::from_secs(browserless_client::REQUEST_GRACE.as_secs() + 5);

static META_REFRESH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]+http-equiv=["']refresh["'][^>]+content=["']\s*\d+\s*;\s*url=([^"']+)["']"#,
    )
    .expect("valid regex")
});

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub timeout: Duration,
    /// Added to `timeout` to bound the whole unit.
    pub grace: Duration,
    pub wait_until: WaitUntil,
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            grace: DEFAULT_UNIT_GRACE,
            wait_until: WaitUntil::DomContentLoaded,
            screenshot_dir: None,
        }
    }
}

/// Fields filled in by a page that loaded.
struct LoadedPage {
    final_url: String,
    redirect_chain: Vec<RedirectHop>,
    meta_refresh_url: Option<String>,
    head_elements: Vec<HeadElement>,
}

/// Fetch `url` and capture its head metadata.
///
/// `index` and `total` only feed progress logging. Always returns a result;
/// a failure to open the renderer, a navigation error, a timeout, or a panic
/// inside the renderer all end up as fields on the returned value.
pub async fn extract_head(
    renderer: &dyn PageRenderer,
    url: &str,
    index: usize,
    total: usize,
    options: &ExtractOptions,
) -> FetchResult {
    let position = index + 1;
    let target = normalize_url(url);
    info!(position, total, url = %target, "Start");
    let started = Instant::now();

    let opened = AssertUnwindSafe(renderer.open()).catch_unwind().await;
    let mut session = match opened {
        Ok(Ok(session)) => session,
        Ok(Err(e)) => {
            error!(position, total, url = %target, error = %e, "Could not open browser context");
            return finish_unreachable(url, position, total, started);
        }
        Err(_panic) => {
            error!(position, total, url = %target, "Renderer panicked opening a browser context");
            return finish_unreachable(url, position, total, started);
        }
    };

    let mut result = FetchResult::new(url);

    let load = tokio::time::timeout(
        options.timeout + options.grace,
        AssertUnwindSafe(load_page(session.as_mut(), &target, options)).catch_unwind(),
    )
    .await;

    let needs_screenshot = match load {
        Ok(Ok(Ok(page))) => {
            if page.head_elements.is_empty() {
                warn!(position, url = %target, "No head elements found");
            }
            apply(&mut result, page);
            result.head_elements.is_none()
        }
        Ok(Ok(Err(e))) => {
            warn!(position, total, url = %target, error = %e, "Error loading page");
            result.timeout_flag = e.is_timeout();
            true
        }
        Ok(Err(_panic)) => {
            error!(position, total, url = %target, "Renderer panicked");
            true
        }
        Err(_elapsed) => {
            warn!(position, total, url = %target, "Unit exceeded its time budget");
            result.timeout_flag = true;
            true
        }
    };

    if needs_screenshot {
        if let Some(dir) = &options.screenshot_dir {
            capture_screenshot(session.as_mut(), dir, position).await;
        }
    }

    match AssertUnwindSafe(session.close()).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(position, url = %target, error = %e, "Failed to close browser context"),
        Err(_panic) => error!(position, url = %target, "Renderer panicked closing a browser context"),
    }

    result.duration_seconds = round2(started.elapsed());
    info!(position, total, duration_secs = result.duration_seconds, "Done");
    result
}

fn finish_unreachable(url: &str, position: usize, total: usize, started: Instant) -> FetchResult {
    let result = FetchResult::unreachable(url, round2(started.elapsed()));
    info!(position, total, duration_secs = result.duration_seconds, "Done");
    result
}

async fn load_page(
    session: &mut dyn PageSession,
    url: &str,
    options: &ExtractOptions,
) -> Result<LoadedPage, RenderError> {
    let navigation = session.navigate(url, options.timeout, options.wait_until).await?;
    let redirect_chain = redirect_chain(&navigation.responses);

    let html = session.content().await?;
    let meta_refresh_url = find_meta_refresh(&html);

    let head_elements = session
        .head_children()
        .await?
        .into_iter()
        .filter_map(head_element)
        .collect();

    Ok(LoadedPage {
        final_url: navigation.final_url,
        redirect_chain,
        meta_refresh_url,
        head_elements,
    })
}

fn apply(result: &mut FetchResult, page: LoadedPage) {
    result.final_url = Some(page.final_url);
    result.redirect_count = page.redirect_chain.len() as u32;
    result.redirect_chain = Some(page.redirect_chain);
    result.has_meta_refresh = page.meta_refresh_url.is_some();
    result.meta_refresh_url = page.meta_refresh_url;
    if !page.head_elements.is_empty() {
        result.head_elements = Some(page.head_elements);
    }
}

/// Keep only 3xx hops, in the order they arrived.
pub fn redirect_chain(responses: &[ObservedResponse]) -> Vec<RedirectHop> {
    responses
        .iter()
        .filter(|r| REDIRECT_STATUSES.contains(&r.status))
        .map(|r| RedirectHop {
            url: r.url.clone(),
            status_code: r.status,
            location: r.location.clone().unwrap_or_default(),
        })
        .collect()
}

/// Target of the first `<meta http-equiv="refresh" content="N;url=...">`.
pub fn find_meta_refresh(html: &str) -> Option<String> {
    META_REFRESH
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn head_element(node: HeadNode) -> Option<HeadElement> {
    let tag = node.tag.to_lowercase();
    if SKIPPED_TAGS.contains(&tag.as_str()) {
        return None;
    }
    Some(HeadElement {
        tag,
        attributes: node.attributes,
        text: node.text.map(|t| t.trim().to_string()).unwrap_or_default(),
    })
}

async fn capture_screenshot(session: &mut dyn PageSession, dir: &std::path::Path, position: usize) {
    let path = dir.join(format!("{position}.png"));
    let bytes = match AssertUnwindSafe(session.screenshot()).catch_unwind().await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            warn!(position, error = %e, "Screenshot failed");
            return;
        }
        Err(_panic) => {
            error!(position, "Renderer panicked taking a screenshot");
            return;
        }
    };
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %e, "Could not create screenshot directory");
        return;
    }
    if let Err(e) = tokio::fs::write(&path, bytes).await {
        warn!(path = %path.display(), error = %e, "Could not write screenshot");
    }
}

fn round2(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}
