// Session cookies returned by the authorization server

use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};

/// Name to value map replayed on every token request.
/// Attributes (path, expiry, ...) are ignored, the jar lives as long as the session.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: DashMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store every `Set-Cookie` header of a response
    pub fn capture(&self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(text) = value.to_str() else {
                tracing::debug!("Ignoring Set-Cookie header that isn't valid text");
                continue;
            };
            if let Some((name, value)) = parse_set_cookie(text) {
                tracing::debug!(cookie = %name, "Captured cookie from token endpoint");
                self.cookies.insert(name, value);
            }
        }
    }

    /// `Cookie` request header, `None` while the jar is empty
    pub fn header_value(&self) -> Option<HeaderValue> {
        if self.cookies.is_empty() {
            return None;
        }
        let mut pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|entry| format!("{}={}", entry.key(), entry.value()))
            .collect();
        pairs.sort();
        HeaderValue::from_str(&pairs.join("; ")).ok()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.cookies.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn clear(&self) {
        self.cookies.clear();
    }
}

/// Extract `name=value` from a `Set-Cookie` header
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim().trim_matches('"');
    Some((name.to_string(), value.to_string()))
}
