//! Application status querying.
//!
//! A single authenticated GET against the Track status endpoint, with the
//! stored cookie string as the only credential. Outcomes are classified so
//! the caller can tell an expired session (re-authenticate) from a
//! transient service problem (wait and retry).

use encoding_rs::{GB18030, GBK};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::client::BROWSER_UA;

pub mod urls {
    /// Track status endpoint; carries the offer counters alongside the
    /// applicant-facing status message.
    pub const STATUS: &str =
        "https://services.ucas.com/track/service/ugtrackapi/application/applicationstatusmessage";
}

const TRACK_REFERER: &str = "https://services.ucas.com/";

/// Field carrying the offer count; the fallback appears on older payloads.
const OFFER_FIELD: &str = "numberOfOffersMade";
const OFFER_FIELD_FALLBACK: &str = "totalOffers";

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The session cookies were rejected; re-authentication is required.
    #[error("authentication expired")]
    AuthExpired,
    #[error("status endpoint returned {0}")]
    Status(StatusCode),
    #[error("status endpoint returned an empty body")]
    EmptyBody,
    #[error("unexpected content type: {0}")]
    ContentType(String),
    #[error("status body is not decodable JSON")]
    Undecodable,
}

pub struct TrackClient {
    client: Client,
    status_url: String,
}

impl TrackClient {
    pub fn new(client: Client) -> Self {
        Self::with_status_url(client, urls::STATUS)
    }

    pub fn with_status_url(client: Client, status_url: impl Into<String>) -> Self {
        Self {
            client,
            status_url: status_url.into(),
        }
    }

    /// Query the current offer count. Read-only with respect to the
    /// session: the cookie string is never modified here.
    pub async fn fetch_offer_count(&self, cookie_header: &str) -> Result<u64, TrackError> {
        let response = self
            .client
            .get(&self.status_url)
            .header(USER_AGENT, BROWSER_UA)
            .header(COOKIE, cookie_header)
            .header(REFERER, TRACK_REFERER)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-origin")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(TrackError::AuthExpired);
        }
        if status != StatusCode::OK {
            return Err(TrackError::Status(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let bytes = response.bytes().await?;
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(TrackError::EmptyBody);
        }
        if !content_type.contains("application/json") && !content_type.contains("text/plain") {
            return Err(TrackError::ContentType(content_type));
        }

        let body = decode_body(&bytes).ok_or(TrackError::Undecodable)?;
        let count = offer_count(&body);
        debug!(count, "status payload parsed");
        Ok(count)
    }
}

/// Decode the body as JSON. The service occasionally mislabels its
/// encoding, so after strict UTF-8 a short fallback list is tried:
/// BOM-prefixed UTF-8, then GBK, then GB18030.
fn decode_body(bytes: &[u8]) -> Option<Value> {
    if let Ok(text) = std::str::from_utf8(bytes)
        && let Ok(value) = serde_json::from_str(text)
    {
        return Some(value);
    }

    if let Some(stripped) = bytes.strip_prefix(UTF8_BOM)
        && let Ok(text) = std::str::from_utf8(stripped)
        && let Ok(value) = serde_json::from_str(text)
    {
        return Some(value);
    }

    for encoding in [GBK, GB18030] {
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors
            && let Ok(value) = serde_json::from_str(&text)
        {
            return Some(value);
        }
    }

    None
}

/// Read the offer count, preferring the current field name and falling
/// back to the older one. Absent both, the count is 0.
fn offer_count(body: &Value) -> u64 {
    field_as_u64(body, OFFER_FIELD)
        .or_else(|| field_as_u64(body, OFFER_FIELD_FALLBACK))
        .unwrap_or(0)
}

fn field_as_u64(body: &Value, key: &str) -> Option<u64> {
    body.get(key).and_then(|v| {
        if let Some(n) = v.as_u64() {
            Some(n)
        } else if let Some(s) = v.as_str() {
            s.parse::<u64>().ok()
        } else {
            None
        }
    })
}
