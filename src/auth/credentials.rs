// Seed credential loading and identity validation

use super::token::DecodedToken;
use super::types::Identity;
use crate::error::ConfigError;

/// Tokens supplied at construction, sorted into access and refresh slots
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedTokens {
    pub access: Option<DecodedToken>,
    pub refresh: Option<DecodedToken>,
}

/// Sort the configured tokens by their `typ` claim.
///
/// Opaque tokens carry no type, so their position decides: the first one is
/// the access token, any later one the refresh token.
pub fn classify_tokens(tokens: &[String]) -> Result<SeedTokens, ConfigError> {
    if tokens.len() > 2 {
        return Err(ConfigError::TooManyTokens(tokens.len()));
    }

    let mut seeds = SeedTokens::default();
    for (index, raw) in tokens.iter().enumerate() {
        if raw.is_empty() {
            continue;
        }
        let token = DecodedToken::decode(raw.as_str());
        match token_kind(&token, index)? {
            TokenKind::Access => seeds.access = Some(token),
            TokenKind::Refresh => seeds.refresh = Some(token),
        }
    }

    tracing::debug!(
        access = seeds.access.is_some(),
        refresh = seeds.refresh.is_some(),
        "Classified seed tokens"
    );
    Ok(seeds)
}

enum TokenKind {
    Access,
    Refresh,
}

fn token_kind(token: &DecodedToken, index: usize) -> Result<TokenKind, ConfigError> {
    if !token.is_structured() {
        return Ok(if index == 0 {
            TokenKind::Access
        } else {
            TokenKind::Refresh
        });
    }

    match token.token_type().map(str::to_lowercase).as_deref() {
        None | Some("") | Some("bearer") | Some("id") => Ok(TokenKind::Access),
        Some("refresh") | Some("offline") => Ok(TokenKind::Refresh),
        Some(_) => Err(ConfigError::UnsupportedTokenType(
            token.token_type().unwrap_or_default().to_string(),
        )),
    }
}

/// Build the identity from optional user and client credentials.
/// Halves of a pair must come together, and the two pairs exclude each other.
pub fn detect_identity(
    user: Option<(&str, &str)>,
    client: Option<(&str, &str)>,
) -> Result<Identity, ConfigError> {
    let user = non_empty_pair(user, "user name", "password")?;
    let client = non_empty_pair(client, "client identifier", "client secret")?;

    let identity = match (user, client) {
        (Some(_), Some(_)) => return Err(ConfigError::ConflictingIdentity),
        (Some((username, password)), None) => Identity::Password {
            username: username.to_string(),
            password: password.to_string(),
        },
        (None, Some((client_id, client_secret))) => Identity::ClientCredentials {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        },
        (None, None) => Identity::None,
    };

    tracing::info!("Detected identity: {}", identity.describe());
    Ok(identity)
}

fn non_empty_pair<'a>(
    pair: Option<(&'a str, &'a str)>,
    first: &str,
    second: &str,
) -> Result<Option<(&'a str, &'a str)>, ConfigError> {
    match pair {
        None => Ok(None),
        Some((a, b)) if a.is_empty() && b.is_empty() => Ok(None),
        Some((a, _)) if a.is_empty() => Err(ConfigError::IncompleteIdentity(format!(
            "{} is required when {} is set",
            first, second
        ))),
        Some((_, b)) if b.is_empty() => Err(ConfigError::IncompleteIdentity(format!(
            "{} is required when {} is set",
            second, first
        ))),
        Some(pair) => Ok(Some(pair)),
    }
}
