// Grant selection
// Pure decision over the cached tokens and the configured identity

use chrono::{DateTime, Duration, Utc};

use super::token::DecodedToken;
use super::types::Identity;

/// Refresh tokens closer than this to their expiry are not worth sending
pub const REFRESH_MIN_VALIDITY_SECS: i64 = 10;

/// One request to the token endpoint
#[derive(Clone, PartialEq, Eq)]
pub enum Grant {
    RefreshToken {
        refresh_token: String,
    },
    Password {
        username: String,
        password: String,
    },
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
}

impl Grant {
    /// Value of the `grant_type` form field
    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::RefreshToken { .. } => "refresh_token",
            Grant::Password { .. } => "password",
            Grant::ClientCredentials { .. } => "client_credentials",
        }
    }

    /// Form fields sent to the token endpoint
    pub fn form(&self) -> Vec<(&'static str, &str)> {
        let mut form = vec![("grant_type", self.grant_type())];
        match self {
            Grant::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token.as_str()));
            }
            Grant::Password { username, password } => {
                form.push(("username", username.as_str()));
                form.push(("password", password.as_str()));
            }
            Grant::ClientCredentials {
                client_id,
                client_secret,
            } => {
                form.push(("client_id", client_id.as_str()));
                form.push(("client_secret", client_secret.as_str()));
            }
        }
        form
    }
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Grant::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Grant::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            Grant::RefreshToken { .. } => f.debug_struct("RefreshToken").finish_non_exhaustive(),
        }
    }
}

/// Outcome of the selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantDecision {
    /// Cached access token satisfies the requested window
    UseCached,

    /// Nothing can replace the access token, but it hasn't expired yet
    UseCachedNearExpiry,

    /// Ask the token endpoint for new tokens
    Request(Grant),

    /// No grant possible and no usable token
    NoGrantAvailable(&'static str),
}

/// Everything the selector looks at
#[derive(Debug, Clone, Copy)]
pub struct SelectorInput<'a> {
    pub access: Option<&'a DecodedToken>,
    pub refresh: Option<&'a DecodedToken>,
    pub identity: &'a Identity,
    pub min_validity: Duration,
    pub now: DateTime<Utc>,
}

/// Decide how to get a usable access token.
///
/// Client credentials are always preferred over the refresh token, even one
/// the server returned for a client credentials grant. A valid refresh token
/// is preferred over the user password.
pub fn select_grant(input: SelectorInput<'_>) -> GrantDecision {
    let SelectorInput {
        access,
        refresh,
        identity,
        min_validity,
        now,
    } = input;

    if let Some(token) = access {
        if token.is_valid_at(now, min_validity) {
            return GrantDecision::UseCached;
        }
    }

    if let Identity::ClientCredentials {
        client_id,
        client_secret,
    } = identity
    {
        return GrantDecision::Request(Grant::ClientCredentials {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
        });
    }

    if let Some(token) = refresh {
        if token.is_valid_at(now, Duration::seconds(REFRESH_MIN_VALIDITY_SECS)) {
            return GrantDecision::Request(Grant::RefreshToken {
                refresh_token: token.raw().to_string(),
            });
        }
    }

    if let Identity::Password { username, password } = identity {
        return GrantDecision::Request(Grant::Password {
            username: username.clone(),
            password: password.clone(),
        });
    }

    match access {
        Some(token) if token.is_valid_at(now, Duration::zero()) => {
            GrantDecision::UseCachedNearExpiry
        }
        Some(_) => GrantDecision::NoGrantAvailable(
            "access token has expired and there is no valid refresh token or identity to get a new one",
        ),
        None if refresh.is_some() => GrantDecision::NoGrantAvailable(
            "refresh token has expired and there is no identity to get a new one",
        ),
        None => GrantDecision::NoGrantAvailable(
            "no tokens, user credentials or client credentials were provided",
        ),
    }
}
