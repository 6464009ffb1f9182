use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, Response, Url};

use crate::auth::TokenManager;
use crate::config::TransportConfig;
use crate::error::{ConfigError, TransportError};

/// A request/response exchange. Implemented by plain HTTP clients and by
/// [`AuthenticatedTransport`], so API clients can take either.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError>;
}

#[async_trait]
impl HttpTransport for Client {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
        Ok(self.execute(request).await?)
    }
}

/// Transport that adds `Authorization: Bearer <access token>` to every
/// request before handing it to the wrapped transport.
///
/// Only the token endpoint is retried. Responses and errors of the wrapped
/// transport are returned unchanged.
pub struct AuthenticatedTransport<T = Client> {
    inner: T,
    tokens: TokenManager,
}

impl AuthenticatedTransport<Client> {
    /// Authenticated transport over an HTTP client built from `config`
    pub fn connect(config: &TransportConfig) -> Result<Self, ConfigError> {
        let client = config.http_client()?;
        Self::new(config, client)
    }
}

impl<T: HttpTransport> AuthenticatedTransport<T> {
    pub fn new(config: &TransportConfig, inner: T) -> Result<Self, ConfigError> {
        Ok(Self {
            inner,
            tokens: TokenManager::new(config)?,
        })
    }

    pub fn from_manager(tokens: TokenManager, inner: T) -> Self {
        Self { inner, tokens }
    }

    /// Token manager used to authenticate requests
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Wrapped transport
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Authenticated GET of `url`
    pub async fn get(&self, url: Url) -> Result<Response, TransportError> {
        self.round_trip(Request::new(Method::GET, url)).await
    }

    /// Discard tokens and cookies. Tokens are not revoked on the server.
    pub async fn close(&self) {
        self.tokens.close().await;
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for AuthenticatedTransport<T> {
    async fn round_trip(&self, mut request: Request) -> Result<Response, TransportError> {
        let pair = match self.tokens.tokens().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(
                    method = %request.method(),
                    url = %request.url(),
                    "Request not sent, no token available: {}",
                    e
                );
                return Err(e.into());
            }
        };

        let value = HeaderValue::from_str(&format!("Bearer {}", pair.access_token))
            .map_err(|e| TransportError::InvalidHeader(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);

        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            "Sending authenticated request"
        );
        self.inner.round_trip(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::testing::make_token;
    use crate::error::AuthError;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;

    /// Records request headers, then sends through a plain client
    #[derive(Default)]
    struct Recorder {
        client: Client,
        seen: Mutex<Vec<reqwest::header::HeaderMap>>,
    }

    #[async_trait]
    impl HttpTransport for Recorder {
        async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
            self.seen.lock().unwrap().push(request.headers().clone());
            self.client.round_trip(request).await
        }
    }

    fn config(tokens: Vec<String>) -> TransportConfig {
        let mut config = TransportConfig::new("http://127.0.0.1:9/token");
        config.tokens = tokens;
        config
    }

    #[tokio::test]
    async fn test_bearer_header_is_set() {
        let mut server = mockito::Server::new_async().await;
        let access = make_token("Bearer", ChronoDuration::minutes(5));
        let mock = server
            .mock("GET", "/vms")
            .match_header("authorization", format!("Bearer {}", access).as_str())
            .with_status(204)
            .create_async()
            .await;

        let transport =
            AuthenticatedTransport::new(&config(vec![access.clone()]), Recorder::default())
                .unwrap();

        let url: Url = format!("{}/vms", server.url()).parse().unwrap();
        let mut request = Request::new(Method::GET, url);
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));

        let response = transport.round_trip(request).await.unwrap();
        assert_eq!(response.status(), 204);
        mock.assert_async().await;

        let seen = transport.inner().seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let values: Vec<_> = seen[0].get_all(AUTHORIZATION).iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].to_str().unwrap(), format!("Bearer {}", access));
    }

    #[tokio::test]
    async fn test_request_not_sent_without_token() {
        let expired = make_token("Bearer", ChronoDuration::seconds(-5));
        let transport =
            AuthenticatedTransport::new(&config(vec![expired]), Recorder::default()).unwrap();

        let err = transport
            .get("http://api.example.com/vms".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Auth(AuthError::NoCredentials(_))
        ));
        assert!(transport.inner().seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_transport_fails() {
        let access = make_token("Bearer", ChronoDuration::minutes(5));
        let transport =
            AuthenticatedTransport::new(&config(vec![access]), Recorder::default()).unwrap();
        transport.close().await;

        let err = transport
            .get("http://api.example.com/vms".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Auth(AuthError::Closed)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = AuthenticatedTransport::new(&TransportConfig::new(""), Recorder::default());
        assert!(matches!(result, Err(ConfigError::MissingTokenUrl)));
    }
}
