pub mod error;
pub mod types;

pub use error::{BrowserlessError, Result};
pub use types::{CapturedElement, CapturedResponse, PageCapture};

use std::time::Duration;

use types::CapturePayload;

/// Extra time granted to the HTTP round trip on top of the navigation timeout,
/// covering browser startup and serialization on the Browserless side.
pub const REQUEST_GRACE: Duration = Duration::from_secs(15);

/// Puppeteer function run by `/function`. Navigates, records every response,
/// then snapshots the rendered HTML and the direct children of `<head>`.
const CAPTURE_FUNCTION: &str = r#"
export default async function ({ page, context }) {
  const responses = [];
  page.on("response", (res) => {
    responses.push({ url: res.url(), status: res.status(), location: res.headers()["location"] ?? null });
  });
  if (context.userAgent) {
    await page.setUserAgent(context.userAgent);
  }
  try {
    await page.goto(context.url, { timeout: context.timeoutMs, waitUntil: context.waitUntil });
  } catch (err) {
    return { data: { error: { name: err.name, message: err.message }, responses }, type: "application/json" };
  }
  const html = await page.content();
  const head = await page.$$eval("head > *", (els) => els.map((el) => ({
    tag: el.tagName,
    attributes: Object.fromEntries([...el.attributes].map((a) => [a.name, a.value])),
    text: el.innerText ?? el.textContent ?? null,
  })));
  return { data: { finalUrl: page.url(), responses, html, head }, type: "application/json" };
}
"#;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    user_agent: String,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}/{}", self.base_url, path);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// Load `url` in a fresh remote page. `wait_until` is a puppeteer
    /// lifecycle event (`domcontentloaded`, `load`, ...).
    ///
    /// A navigation error inside the browser is returned as
    /// [`BrowserlessError::Timeout`] or [`BrowserlessError::Navigation`];
    /// transport problems as `Network`/`Api`.
    pub async fn capture(
        &self,
        url: &str,
        timeout: Duration,
        wait_until: &str,
    ) -> Result<PageCapture> {
        let body = serde_json::json!({
            "code": CAPTURE_FUNCTION,
            "context": {
                "url": url,
                "timeoutMs": timeout.as_millis() as u64,
                "waitUntil": wait_until,
                "userAgent": self.user_agent,
            },
        });

        let resp = self
            .client
            .post(self.endpoint("function"))
            .header("Content-Type", "application/json")
            .timeout(timeout + REQUEST_GRACE)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        parse_capture(&text)
    }

    /// Render `url` and return a full-page PNG.
    pub async fn screenshot(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let body = serde_json::json!({
            "url": url,
            "options": { "fullPage": true, "type": "png" },
            "gotoOptions": { "waitUntil": "domcontentloaded", "timeout": timeout.as_millis() as u64 },
        });

        let resp = self
            .client
            .post(self.endpoint("screenshot"))
            .header("Content-Type", "application/json")
            .timeout(timeout + REQUEST_GRACE)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

fn parse_capture(body: &str) -> Result<PageCapture> {
    match serde_json::from_str::<CapturePayload>(body)? {
        CapturePayload::Captured(capture) => Ok(capture),
        CapturePayload::Failed { error } => {
            tracing::debug!(name = %error.name, message = %error.message, "Remote navigation failed");
            if error.name == "TimeoutError" || error.message.contains("Timeout") {
                Err(BrowserlessError::Timeout(error.message))
            } else {
                Err(BrowserlessError::Navigation {
                    name: error.name,
                    message: error.message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_successful_capture() {
        let body = r#"{
            "finalUrl": "https://example.com/",
            "responses": [
                {"url": "http://example.com/", "status": 301, "location": "https://example.com/"},
                {"url": "https://example.com/", "status": 200, "location": null}
            ],
            "html": "<html><head><title>Hi</title></head></html>",
            "head": [{"tag": "TITLE", "attributes": {}, "text": "Hi"}]
        }"#;

        let capture = parse_capture(body).unwrap();
        assert_eq!(capture.final_url, "https://example.com/");
        assert_eq!(capture.responses.len(), 2);
        assert_eq!(capture.responses[0].location.as_deref(), Some("https://example.com/"));
        assert_eq!(capture.head[0].tag, "TITLE");
        assert_eq!(capture.head[0].text.as_deref(), Some("Hi"));
    }

    #[test]
    fn timeout_error_maps_to_timeout() {
        let body = r#"{
            "error": {"name": "TimeoutError", "message": "Navigation timeout of 10000 ms exceeded"},
            "responses": []
        }"#;

        let err = parse_capture(body).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn other_navigation_errors_are_not_timeouts() {
        let body = r#"{
            "error": {"name": "Error", "message": "net::ERR_NAME_NOT_RESOLVED"},
            "responses": []
        }"#;

        let err = parse_capture(body).unwrap_err();
        assert!(!err.is_timeout());
        assert!(matches!(err, BrowserlessError::Navigation { .. }));
    }

    #[test]
    fn garbage_body_is_parse_error() {
        let err = parse_capture("not json").unwrap_err();
        assert!(matches!(err, BrowserlessError::Parse(_)));
    }
}
