use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Column layout of a batch artifact, in write order.
pub const RESULT_COLUMNS: [&str; 9] = [
    "original_url",
    "final_url",
    "redirect_chain",
    "redirect_count",
    "head_elements",
    "timeout",
    "has_meta_refresh",
    "meta_refresh_url",
    "duration_sec",
];

/// Prefix `http://` when the input carries no scheme.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

/// One 3xx hop observed while navigating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    pub url: String,
    #[serde(rename = "status")]
    pub status_code: u16,
    /// `Location` header, empty when the server sent none.
    #[serde(default)]
    pub location: String,
}

/// A direct child of `<head>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadElement {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
}

/// Outcome of fetching one input URL. Exactly one exists per input URL,
/// whether or not the fetch succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    /// The URL as it appeared in the input, before scheme normalization.
    pub original_url: String,
    pub final_url: Option<String>,
    /// `None` when navigation never completed; `Some(vec![])` when it did
    /// and nothing redirected.
    pub redirect_chain: Option<Vec<RedirectHop>>,
    pub redirect_count: u32,
    pub head_elements: Option<Vec<HeadElement>>,
    pub timeout_flag: bool,
    pub has_meta_refresh: bool,
    pub meta_refresh_url: Option<String>,
    pub duration_seconds: f64,
}

impl FetchResult {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            final_url: None,
            redirect_chain: None,
            redirect_count: 0,
            head_elements: None,
            timeout_flag: false,
            has_meta_refresh: false,
            meta_refresh_url: None,
            duration_seconds: 0.0,
        }
    }

    /// Result for a unit that could not even start a browser session.
    pub fn unreachable(original_url: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            timeout_flag: true,
            duration_seconds,
            ..Self::new(original_url)
        }
    }

    pub fn is_redirected(&self) -> bool {
        self.redirect_count > 0
    }

    /// Cells in [`RESULT_COLUMNS`] order. `None` marks an absent value.
    pub fn to_record(&self) -> Result<Vec<Option<String>>, RecordError> {
        let redirect_chain = match &self.redirect_chain {
            Some(chain) => Some(serde_json::to_string(chain)?),
            None => None,
        };
        let head_elements = match &self.head_elements {
            Some(elements) => Some(serde_json::to_string(elements)?),
            None => None,
        };

        Ok(vec![
            Some(self.original_url.clone()),
            self.final_url.clone(),
            redirect_chain,
            Some(self.redirect_count.to_string()),
            head_elements,
            Some(self.timeout_flag.to_string()),
            Some(self.has_meta_refresh.to_string()),
            self.meta_refresh_url.clone(),
            Some(format!("{:.2}", self.duration_seconds)),
        ])
    }

    /// Rebuild a result from a stored row. Columns are matched by name so
    /// artifacts with extra or reordered columns still load.
    pub fn from_record(columns: &[String], row: &[Option<String>]) -> Result<Self, RecordError> {
        let cell = |name: &'static str| record_cell(columns, row, name);

        let original_url = cell("original_url")?
            .filter(|v| !v.is_empty())
            .ok_or(RecordError::MissingColumn("original_url"))?
            .to_string();

        let redirect_chain = match cell("redirect_chain")? {
            Some(raw) => Some(parse_json("redirect_chain", raw)?),
            None => None,
        };
        let head_elements = match cell("head_elements")? {
            Some(raw) => Some(parse_json("head_elements", raw)?),
            None => None,
        };

        Ok(Self {
            original_url,
            final_url: cell("final_url")?.map(String::from),
            redirect_chain,
            redirect_count: parse_number("redirect_count", cell("redirect_count")?)?,
            head_elements,
            timeout_flag: parse_bool("timeout", cell("timeout")?)?,
            has_meta_refresh: parse_bool("has_meta_refresh", cell("has_meta_refresh")?)?,
            meta_refresh_url: cell("meta_refresh_url")?.map(String::from),
            duration_seconds: parse_number("duration_sec", cell("duration_sec")?)?,
        })
    }
}

fn record_cell<'a>(
    columns: &[String],
    row: &'a [Option<String>],
    name: &'static str,
) -> Result<Option<&'a str>, RecordError> {
    let idx = columns
        .iter()
        .position(|c| c == name)
        .ok_or(RecordError::MissingColumn(name))?;
    Ok(row.get(idx).and_then(|v| v.as_deref()))
}

fn parse_json<T: serde::de::DeserializeOwned>(
    column: &'static str,
    raw: &str,
) -> Result<T, RecordError> {
    serde_json::from_str(raw).map_err(|e| RecordError::InvalidValue {
        column,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(column: &'static str, raw: Option<&str>) -> Result<bool, RecordError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
        Some(v) => Err(RecordError::InvalidValue {
            column,
            value: v.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_number<T>(column: &'static str, raw: Option<&str>) -> Result<T, RecordError>
where
    T: std::str::FromStr + Default,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim) {
        None | Some("") => Ok(T::default()),
        Some(v) => v.parse().map_err(|e: T::Err| RecordError::InvalidValue {
            column,
            value: v.to_string(),
            reason: e.to_string(),
        }),
    }
}
