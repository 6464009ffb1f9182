use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::credentials::{self, SeedTokens};
use super::grant::{self, GrantDecision, SelectorInput};
use super::refresh::TokenEndpoint;
use super::single_flight::SingleFlight;
use super::token::DecodedToken;
use super::types::{Identity, TokenPair};
use crate::config::TransportConfig;
use crate::error::{AuthError, ConfigError, Result};

/// Default look-ahead window: tokens expiring sooner than this are refreshed
pub const DEFAULT_MIN_VALIDITY: Duration = Duration::from_secs(60);

/// Windows are clamped so `now + window` can't overflow
const MAX_WINDOW: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Per-call options for [`TokenManager::tokens_with`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenOptions {
    min_validity: Option<Duration>,
    deadline: Option<Instant>,
}

impl TokenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the access token to stay valid for at least `window`
    pub fn min_validity(mut self, window: Duration) -> Self {
        self.min_validity = Some(window);
        self
    }

    /// Give up waiting after `timeout` from now. A timeout too large to
    /// represent means no deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Give up waiting at `deadline`
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Cached tokens. Only replaced as a whole by a successful grant.
#[derive(Debug, Default)]
struct SessionState {
    access: Option<DecodedToken>,
    refresh: Option<DecodedToken>,
    closed: bool,
}

impl SessionState {
    fn pair(&self) -> TokenPair {
        TokenPair {
            access_token: self
                .access
                .as_ref()
                .map(|t| t.raw().to_string())
                .unwrap_or_default(),
            refresh_token: self
                .refresh
                .as_ref()
                .map(|t| t.raw().to_string())
                .unwrap_or_default(),
        }
    }

    fn decide(&self, identity: &Identity, min_validity: Duration) -> Result<GrantDecision> {
        if self.closed {
            return Err(AuthError::Closed);
        }
        let min_validity = chrono::Duration::from_std(min_validity.min(MAX_WINDOW))
            .unwrap_or_else(|_| chrono::Duration::zero());
        Ok(grant::select_grant(SelectorInput {
            access: self.access.as_ref(),
            refresh: self.refresh.as_ref(),
            identity,
            min_validity,
            now: Utc::now(),
        }))
    }
}

struct Inner {
    state: RwLock<SessionState>,
    identity: Identity,
    endpoint: TokenEndpoint,
    flight: SingleFlight<Result<TokenPair>>,
    default_min_validity: Duration,
    grant_timeout: Duration,
}

impl Inner {
    /// Answer from the cache when possible. `Ok(None)` means a grant is needed.
    async fn cached(&self, min_validity: Duration) -> Result<Option<TokenPair>> {
        let state = self.state.read().await;
        match state.decide(&self.identity, min_validity)? {
            GrantDecision::UseCached => Ok(Some(state.pair())),
            GrantDecision::UseCachedNearExpiry => {
                tracing::warn!(
                    "Access token expires in less than {}s and there is no way to get a new one, using it anyway",
                    min_validity.as_secs()
                );
                Ok(Some(state.pair()))
            }
            GrantDecision::NoGrantAvailable(reason) => {
                tracing::error!("Can't obtain tokens: {}", reason);
                Err(AuthError::NoCredentials(reason.to_string()))
            }
            GrantDecision::Request(_) => Ok(None),
        }
    }

    /// Body of the single-flight operation. Runs on its own task.
    async fn refresh(&self, min_validity: Duration) -> Result<TokenPair> {
        // Decide again: a refresh that finished just before this one started
        // may already have produced usable tokens
        let grant = {
            let state = self.state.read().await;
            match state.decide(&self.identity, min_validity)? {
                GrantDecision::UseCached | GrantDecision::UseCachedNearExpiry => {
                    return Ok(state.pair())
                }
                GrantDecision::NoGrantAvailable(reason) => {
                    return Err(AuthError::NoCredentials(reason.to_string()))
                }
                GrantDecision::Request(grant) => grant,
            }
        };

        tracing::debug!(grant_type = grant.grant_type(), "Requesting new tokens");
        let deadline = Instant::now().checked_add(self.grant_timeout);
        let outcome = self.endpoint.request_grant(&grant, deadline).await;

        let mut state = self.state.write().await;
        if state.closed {
            // Cookies captured by a grant that outlived close
            self.endpoint.cookies().clear();
            return Err(AuthError::Closed);
        }
        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(grant_type = grant.grant_type(), "Token refresh failed: {}", e);
                return Err(e);
            }
        };
        let access = DecodedToken::decode(response.access_token);
        let refresh = match response.refresh_token {
            Some(raw) => Some(DecodedToken::decode(raw)),
            None => state.refresh.take(),
        };
        match access.expires_at() {
            Some(expires_at) => tracing::info!(
                grant_type = grant.grant_type(),
                "Tokens refreshed, access token {} expires: {}",
                access.redacted(),
                expires_at.to_rfc3339()
            ),
            None => tracing::info!(
                grant_type = grant.grant_type(),
                "Tokens refreshed, access token {} has no expiry",
                access.redacted()
            ),
        }
        state.access = Some(access);
        state.refresh = refresh;
        Ok(state.pair())
    }
}

/// Token cache and refresher.
///
/// Hands out the cached access and refresh tokens while they are usable and
/// runs the appropriate OAuth grant when they are not. Concurrent callers
/// share one grant request. Cheap to clone.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Create a token manager from validated configuration
    pub fn new(config: &TransportConfig) -> std::result::Result<Self, ConfigError> {
        let token_url = config.validate()?;
        let seeds = credentials::classify_tokens(&config.tokens)?;
        let client = config.http_client()?;
        let endpoint = TokenEndpoint::new(client, token_url, config.retry.clone());

        tracing::info!(
            token_url = %endpoint.token_url(),
            identity = config.identity.describe(),
            "Token manager created"
        );

        Ok(Self::from_parts(
            endpoint,
            config.identity.clone(),
            seeds,
            config.default_min_validity,
            config.grant_timeout,
        ))
    }

    pub(crate) fn from_parts(
        endpoint: TokenEndpoint,
        identity: Identity,
        seeds: SeedTokens,
        default_min_validity: Duration,
        grant_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(SessionState {
                    access: seeds.access,
                    refresh: seeds.refresh,
                    closed: false,
                }),
                identity,
                endpoint,
                flight: SingleFlight::new(),
                default_min_validity,
                grant_timeout,
            }),
        }
    }

    /// Tokens valid for at least the default window
    pub async fn tokens(&self) -> Result<TokenPair> {
        self.tokens_with(TokenOptions::default()).await
    }

    /// Tokens honoring the window and deadline in `options`
    pub async fn tokens_with(&self, options: TokenOptions) -> Result<TokenPair> {
        let min_validity = options
            .min_validity
            .unwrap_or(self.inner.default_min_validity);

        if let Some(pair) = self.inner.cached(min_validity).await? {
            return Ok(pair);
        }

        let inner = self.inner.clone();
        let flight = self
            .inner
            .flight
            .run(move || async move { inner.refresh(min_validity).await });

        let outcome = match options.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, flight).await.map_err(|_| {
                tracing::warn!("Deadline exceeded while waiting for token refresh");
                AuthError::DeadlineExceeded
            })?,
            None => flight.await,
        };

        outcome.map_err(|e| AuthError::Internal(e.to_string()))?
    }

    /// Drop cached tokens and cookies. Later calls fail with [`AuthError::Closed`].
    pub async fn close(&self) {
        {
            let mut state = self.inner.state.write().await;
            state.closed = true;
            state.access = None;
            state.refresh = None;
        }
        self.inner.endpoint.cookies().clear();
        self.inner.flight.reset().await;
        tracing::debug!("Token manager closed");
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.state.read().await.closed
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }
}
