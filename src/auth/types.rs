// Authentication types

use serde::Deserialize;

/// Access and refresh token as handed to callers.
/// `refresh_token` is empty when none is known.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

/// Identity used to obtain new tokens once the cached ones are unusable.
/// Fixed for the lifetime of a token manager.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Identity {
    /// Only the seed tokens (if any) can be used
    #[default]
    None,

    /// Resource owner password credentials
    Password { username: String, password: String },

    /// Client credentials
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
}

impl Identity {
    pub fn describe(&self) -> &'static str {
        match self {
            Identity::None => "tokens only",
            Identity::Password { .. } => "user password",
            Identity::ClientCredentials { .. } => "client credentials",
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::None => f.write_str("None"),
            Identity::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Identity::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Token endpoint response body. Success and OAuth error payloads share
/// the same shape, so every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Tokens issued by one successful grant
#[derive(Debug, Clone)]
pub struct GrantResponse {
    pub access_token: String,
    /// `None` when the server didn't send one, the cached token is kept
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
}

fn redact(token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }
    let prefix: String = token.chars().take(8).collect();
    format!("{}...", prefix)
}
