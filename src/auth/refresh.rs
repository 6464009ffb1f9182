// Token endpoint client
// Sends one grant to the authorization server, retrying server errors

use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::{Client, StatusCode, Url};
use tokio::time::Instant;

use super::cookies::CookieJar;
use super::grant::Grant;
use super::types::{GrantResponse, TokenResponse};
use crate::error::AuthError;
use crate::retry::RetryPolicy;

/// Bodies longer than this are cut in error messages
pub const EXCERPT_MAX_CHARS: usize = 250;

/// Client for the OAuth token endpoint. Owns the session cookie jar.
#[derive(Debug)]
pub struct TokenEndpoint {
    client: Client,
    token_url: Url,
    retry: RetryPolicy,
    jar: CookieJar,
}

impl TokenEndpoint {
    pub fn new(client: Client, token_url: Url, retry: RetryPolicy) -> Self {
        Self {
            client,
            token_url,
            retry,
            jar: CookieJar::new(),
        }
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.jar
    }

    /// Execute `grant`, retrying 5xx answers with backoff until the policy
    /// gives up or `deadline` passes
    pub async fn request_grant(
        &self,
        grant: &Grant,
        deadline: Option<Instant>,
    ) -> Result<GrantResponse, AuthError> {
        let grant_type = grant.grant_type();
        let mut attempt: u32 = 0;

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(grant_type, attempt = attempt + 1, "Deadline reached before token request");
                return Err(AuthError::DeadlineExceeded);
            }

            tracing::debug!(
                grant_type,
                url = %self.token_url,
                attempt = attempt + 1,
                max_attempts = self.retry.max_attempts,
                "Sending token request"
            );

            let outcome = with_deadline(deadline, self.send_once(grant)).await?;

            match outcome {
                Attempt::Done(response) => {
                    tracing::info!(
                        grant_type,
                        attempt = attempt + 1,
                        "Token request succeeded"
                    );
                    return Ok(response);
                }
                Attempt::ServerError { status, detail } => {
                    if !self.retry.should_retry(status, attempt) {
                        tracing::error!(
                            grant_type,
                            status = status.as_u16(),
                            attempts = attempt + 1,
                            "Token request failed after all retries"
                        );
                        return Err(AuthError::TransientServer {
                            status: status.as_u16(),
                            attempts: attempt + 1,
                            detail,
                        });
                    }

                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        "Token endpoint returned {}, retrying after {}ms (attempt {}/{})",
                        status,
                        delay.as_millis(),
                        attempt + 1,
                        self.retry.max_attempts
                    );
                    with_deadline(deadline, async {
                        tokio::time::sleep(delay).await;
                        Ok(())
                    })
                    .await?;
                    attempt += 1;
                }
            }
        }
    }

    /// One HTTP exchange. Terminal failures come back as `Err`,
    /// retryable ones as `Attempt::ServerError`.
    async fn send_once(&self, grant: &Grant) -> Result<Attempt, AuthError> {
        let mut request = self.client.post(self.token_url.clone()).form(&grant.form());
        if let Some(cookies) = self.jar.header_value() {
            request = request.header(COOKIE, cookies);
        }

        let response = request.send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection_failed"
            } else {
                "request_error"
            };
            tracing::warn!(error_kind = kind, error = %e, "Token request error");
            AuthError::Transport(format!("{} (kind: {})", e, kind))
        })?;

        let status = response.status();
        self.jar.capture(response.headers());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        // Always read the whole body so the connection can be reused
        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::Transport(format!("failed to read token response: {}", e)))?;

        tracing::debug!(status = %status, content_type = %content_type, "Received token response");

        if status.is_server_error() {
            return Ok(Attempt::ServerError {
                status,
                detail: describe_body(&content_type, &body),
            });
        }

        interpret_response(status, &content_type, &body).map(Attempt::Done)
    }
}

enum Attempt {
    Done(GrantResponse),
    ServerError { status: StatusCode, detail: String },
}

async fn with_deadline<T, F>(deadline: Option<Instant>, fut: F) -> Result<T, AuthError>
where
    F: std::future::Future<Output = Result<T, AuthError>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| AuthError::DeadlineExceeded)?,
        None => fut.await,
    }
}

/// Turn a non-5xx response into tokens or a terminal error
fn interpret_response(
    status: StatusCode,
    content_type: &str,
    body: &[u8],
) -> Result<GrantResponse, AuthError> {
    if !is_json(content_type) {
        let excerpt = describe_body(content_type, body);
        if status.is_success() {
            return Err(AuthError::MalformedResponse {
                status: status.as_u16(),
                content_type: content_type.to_string(),
                excerpt,
            });
        }
        return Err(AuthError::GrantRejected {
            status: status.as_u16(),
            code: String::new(),
            description: excerpt,
        });
    }

    let parsed: TokenResponse = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse token response");
            let excerpt = describe_body(content_type, body);
            if status.is_success() {
                return Err(AuthError::MalformedResponse {
                    status: status.as_u16(),
                    content_type: content_type.to_string(),
                    excerpt,
                });
            }
            return Err(AuthError::GrantRejected {
                status: status.as_u16(),
                code: String::new(),
                description: excerpt,
            });
        }
    };

    if let Some(code) = parsed.error {
        let description = parsed.error_description.unwrap_or_default();
        tracing::error!(
            status = status.as_u16(),
            error = %code,
            description = %description,
            "Token endpoint returned OAuth error"
        );
        return Err(AuthError::GrantRejected {
            status: status.as_u16(),
            code,
            description,
        });
    }

    if !status.is_success() {
        return Err(AuthError::GrantRejected {
            status: status.as_u16(),
            code: String::new(),
            description: describe_body(content_type, body),
        });
    }

    let access_token = match parsed.access_token {
        Some(token) if !token.is_empty() => token,
        _ => {
            return Err(AuthError::MalformedResponse {
                status: status.as_u16(),
                content_type: content_type.to_string(),
                excerpt: "response doesn't contain an access token".to_string(),
            })
        }
    };

    if let Some(expires_in) = parsed.expires_in {
        tracing::debug!(expires_in, "Token endpoint reported access token lifetime");
    }

    Ok(GrantResponse {
        access_token,
        refresh_token: parsed.refresh_token.filter(|t| !t.is_empty()),
        token_type: parsed.token_type,
        expires_in: parsed.expires_in,
    })
}

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|media| media.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// Diagnostic text for a response body: content type plus a bounded excerpt
pub fn describe_body(content_type: &str, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let content_type = if content_type.is_empty() {
        "unknown"
    } else {
        content_type
    };
    format!(
        "response content type '{}' with content '{}'",
        content_type,
        excerpt(&text, EXCERPT_MAX_CHARS)
    )
}

/// First `max_chars` characters of `text`, with `...` appended when cut
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        None => trimmed.to_string(),
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
    }
}
