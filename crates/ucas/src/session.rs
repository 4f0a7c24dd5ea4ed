use reqwest::header::{COOKIE, HeaderMap, HeaderValue, REFERER, SET_COOKIE, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::client::BROWSER_UA;

/// Cookie-bearing HTTP context for one sign-in attempt.
///
/// The provider spreads session state across cookies set by several
/// responses, so the jar is kept by hand: cookies absorbed from each
/// response are replayed on the next request and, once the exchange
/// completes, serialized into a single persistable string.
///
/// Every sign-in attempt starts from an empty jar; no cookie state is
/// carried over from a previous attempt.
pub struct AccountSession {
    client: Client,
    headers: HeaderMap,
    cookies: FxHashMap<String, String>,
}

impl AccountSession {
    pub fn new(client: Client, referer: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(REFERER, HeaderValue::from_static(referer));

        Self {
            client,
            headers,
            cookies: FxHashMap::default(),
        }
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut headers = self.headers.clone();

        if let Some(jar) = self.cookie_header() {
            match HeaderValue::from_str(&jar) {
                Ok(value) => {
                    headers.insert(COOKIE, value);
                }
                Err(e) => {
                    // Skip the Cookie header rather than send an invalid value.
                    debug!(error = %e, "Failed to build Cookie header");
                }
            }
        }

        self.client.request(method, url).headers(headers)
    }

    /// Absorb cookies from a response's Set-Cookie headers into the jar.
    pub fn absorb_cookies(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            if let Ok(cookie_str) = value.to_str()
                && let Some(pair) = cookie_str.split(';').next()
                && let Some((name, value)) = pair.split_once('=')
            {
                let name = name.trim();
                let value = value.trim();
                if name.is_empty() || value.is_empty() {
                    continue;
                }
                debug!(name, "storing session cookie");
                self.cookies.insert(name.to_owned(), value.to_owned());
            }
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// First cookie whose name starts with `prefix`.
    pub fn cookie_with_prefix(&self, prefix: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(name, _)| name.starts_with(prefix))
            .map(|(_, value)| value.as_str())
    }

    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(self.join_cookies())
    }

    /// Serialize the accumulated jar as `name=value; ...` for persistence.
    pub fn into_cookie_string(self) -> String {
        self.join_cookies()
    }

    fn join_cookies(&self) -> String {
        let mut out = String::with_capacity(
            self.cookies
                .iter()
                .map(|(k, v)| k.len() + 1 + v.len() + 2)
                .sum(),
        );

        for (name, value) in &self.cookies {
            if !out.is_empty() {
                out.push_str("; ");
            }
            out.push_str(name);
            out.push('=');
            out.push_str(value);
        }

        out
    }
}
