// Bearer token decoding and expiry evaluation

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashSet;

/// Claims we care about; everything else in the payload is ignored
#[derive(Debug, Default, Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    typ: Option<String>,
}

/// A token string plus whatever could be learned from its payload
#[derive(Clone, PartialEq)]
pub struct DecodedToken {
    raw: String,
    expires_at: Option<DateTime<Utc>>,
    typ: Option<String>,
    structured: bool,
}

impl DecodedToken {
    /// Interpret `raw` as a JWT. Never fails: anything that doesn't parse is
    /// kept as an opaque token without expiry.
    pub fn decode(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        match parse_claims(&raw) {
            Some(claims) => {
                let expires_at = claims
                    .exp
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
                Self {
                    raw,
                    expires_at,
                    typ: claims.typ,
                    structured: true,
                }
            }
            None => {
                tracing::debug!("Token can't be parsed as JWT, treating it as opaque");
                Self {
                    raw,
                    expires_at: None,
                    typ: None,
                    structured: false,
                }
            }
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Value of the `typ` claim, if the token carried one
    pub fn token_type(&self) -> Option<&str> {
        self.typ.as_deref()
    }

    /// False for opaque tokens
    pub fn is_structured(&self) -> bool {
        self.structured
    }

    /// Whether the token stays usable for at least `min_validity` after `now`.
    /// Tokens without an expiry claim are always valid.
    pub fn is_valid_at(&self, now: DateTime<Utc>, min_validity: Duration) -> bool {
        match self.expires_at {
            None => true,
            Some(exp) => now + min_validity < exp,
        }
    }

    /// Time left before expiry, `None` for tokens that never expire
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at.map(|exp| exp - now)
    }

    /// Short prefix that is safe to put in logs
    pub fn redacted(&self) -> String {
        let prefix: String = self.raw.chars().take(8).collect();
        format!("{}...", prefix)
    }
}

impl std::fmt::Debug for DecodedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedToken")
            .field("raw", &self.redacted())
            .field("expires_at", &self.expires_at)
            .field("typ", &self.typ)
            .finish()
    }
}

/// Expiry evaluator. A missing token is never valid.
pub fn is_valid(token: Option<&DecodedToken>, now: DateTime<Utc>, min_validity: Duration) -> bool {
    token.is_some_and(|t| t.is_valid_at(now, min_validity))
}

/// Decode the payload without verifying the signature; the authorization
/// server is the one that checks it.
fn parse_claims(raw: &str) -> Option<Claims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    jsonwebtoken::decode::<Claims>(raw, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .ok()
}
