use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Everything the remote browser observed while loading one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCapture {
    pub final_url: String,
    /// Every response seen during navigation, in arrival order.
    #[serde(default)]
    pub responses: Vec<CapturedResponse>,
    #[serde(default)]
    pub html: String,
    /// Direct children of `<head>`, in document order.
    #[serde(default)]
    pub head: Vec<CapturedElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedElement {
    /// Tag name as reported by the DOM (usually upper case).
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Raw payload returned by the capture function. Navigation errors come back
/// as data so the caller can tell timeouts apart from transport failures.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CapturePayload {
    Failed { error: NavigationFailure },
    Captured(PageCapture),
}

#[derive(Debug, Deserialize)]
pub(crate) struct NavigationFailure {
    pub name: String,
    pub message: String,
}
