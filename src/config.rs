use anyhow::{Context, Result};
use clap::Parser;
use reqwest::{Certificate, Client, Url};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{credentials, Identity, DEFAULT_MIN_VALIDITY};
use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Upper bound for the grant and connect timeouts
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

/// cloud-token - print or use an access token for the cloud management API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// OAuth token endpoint
    #[arg(short = 'u', long, env = "TOKEN_URL")]
    pub token_url: Option<String>,

    /// PEM file with additional trusted CA certificates (repeatable)
    #[arg(long = "ca", env = "TRUSTED_CA", value_delimiter = ',')]
    pub trusted_cas: Vec<String>,

    /// Access and/or refresh token to start from (repeatable, at most two)
    #[arg(short = 't', long = "token", env = "TOKENS", value_delimiter = ',')]
    pub tokens: Vec<String>,

    /// User name for the password grant
    #[arg(long, env = "AUTH_USER")]
    pub user: Option<String>,

    /// Password for the password grant
    #[arg(long, env = "AUTH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Client identifier for the client credentials grant
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: Option<String>,

    /// Client secret for the client credentials grant
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Minimum validity of the returned access token, in seconds
    #[arg(long, env = "MIN_VALIDITY", default_value = "60")]
    pub min_validity: u64,

    /// Overall timeout for obtaining a token, in seconds
    #[arg(long, env = "TOKEN_TIMEOUT", default_value = "30")]
    pub timeout: u64,

    /// Maximum attempts for a token request
    #[arg(long, env = "TOKEN_MAX_ATTEMPTS", default_value = "5")]
    pub max_attempts: u32,

    /// Print the refresh token instead of the access token
    #[arg(long)]
    pub refresh: bool,

    /// Send an authenticated GET to this URL and print the response body
    #[arg(long)]
    pub get: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

/// Settings of an authenticating transport, checked once at construction
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// OAuth token endpoint
    pub token_url: String,

    /// PEM files trusted in addition to the system roots
    pub trusted_cas: Vec<PathBuf>,

    /// Seed tokens, sorted into access/refresh by type claim or position
    pub tokens: Vec<String>,

    /// How to get tokens once the seeds are unusable
    pub identity: Identity,

    /// Retries for the token endpoint
    pub retry: RetryPolicy,

    pub connect_timeout: Duration,

    /// Bound for one grant, retries and backoff included
    pub grant_timeout: Duration,

    /// Window used when callers don't ask for one
    pub default_min_validity: Duration,
}

impl TransportConfig {
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            trusted_cas: Vec::new(),
            tokens: Vec::new(),
            identity: Identity::None,
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            grant_timeout: Duration::from_secs(60),
            default_min_validity: DEFAULT_MIN_VALIDITY,
        }
    }

    /// Check the settings and return the parsed token URL
    pub fn validate(&self) -> std::result::Result<Url, ConfigError> {
        if self.token_url.trim().is_empty() {
            return Err(ConfigError::MissingTokenUrl);
        }
        let url = Url::parse(self.token_url.trim()).map_err(|e| ConfigError::InvalidTokenUrl {
            url: self.token_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidTokenUrl {
                url: self.token_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        if self.tokens.len() > 2 {
            return Err(ConfigError::TooManyTokens(self.tokens.len()));
        }

        match &self.identity {
            Identity::None => {}
            Identity::Password { username, password } => {
                credentials::detect_identity(
                    Some((username.as_str(), password.as_str())),
                    None,
                )?;
            }
            Identity::ClientCredentials {
                client_id,
                client_secret,
            } => {
                credentials::detect_identity(
                    None,
                    Some((client_id.as_str(), client_secret.as_str())),
                )?;
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if !self.retry.jitter.is_finite() || self.retry.jitter < 0.0 {
            return Err(ConfigError::InvalidJitter(self.retry.jitter));
        }

        check_timeout("grant timeout", self.grant_timeout)?;
        check_timeout("connect timeout", self.connect_timeout)?;

        Ok(url)
    }

    /// HTTP client trusting the configured CAs, shared by the token endpoint
    /// and, by default, the wrapped transport
    pub fn http_client(&self) -> std::result::Result<Client, ConfigError> {
        let mut builder = Client::builder().connect_timeout(self.connect_timeout);
        for path in &self.trusted_cas {
            builder = builder.add_root_certificate(load_certificate(path)?);
        }
        builder
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))
    }
}

fn check_timeout(name: &'static str, value: Duration) -> std::result::Result<(), ConfigError> {
    if value < Duration::from_millis(1) || value > MAX_TIMEOUT {
        return Err(ConfigError::InvalidTimeout {
            name,
            value,
            max_secs: MAX_TIMEOUT.as_secs(),
        });
    }
    Ok(())
}

fn load_certificate(path: &Path) -> std::result::Result<Certificate, ConfigError> {
    let pem = std::fs::read(path).map_err(|e| ConfigError::TrustedCa {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Certificate::from_pem(&pem).map_err(|e| ConfigError::TrustedCa {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Settings of the command line tool
#[derive(Clone, Debug)]
pub struct Config {
    pub transport: TransportConfig,
    pub min_validity: Duration,
    pub timeout: Duration,
    pub print_refresh: bool,
    pub get_url: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let token_url = args
            .token_url
            .context("TOKEN_URL is required (use -u or set TOKEN_URL env var)")?;

        let user = pair(args.user.as_deref(), args.password.as_deref());
        let client = pair(args.client_id.as_deref(), args.client_secret.as_deref());
        let identity = credentials::detect_identity(user, client)
            .context("Invalid credentials configuration")?;

        let mut transport = TransportConfig::new(token_url);
        transport.trusted_cas = args.trusted_cas.iter().map(|s| expand_tilde(s)).collect();
        transport.tokens = args.tokens.into_iter().filter(|t| !t.is_empty()).collect();
        transport.identity = identity;
        transport.retry.max_attempts = args.max_attempts;
        transport.grant_timeout = Duration::from_secs(args.timeout);

        let config = Config {
            transport,
            min_validity: Duration::from_secs(args.min_validity),
            timeout: Duration::from_secs(args.timeout),
            print_refresh: args.refresh,
            get_url: args.get,
            log_level: args.log_level,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;
        for path in &self.transport.trusted_cas {
            if !path.exists() {
                anyhow::bail!("Trusted CA file does not exist: {}", path.display());
            }
        }
        Ok(())
    }
}

/// Both halves of a credential pair, with a missing half read as empty so
/// validation can report it
fn pair<'a>(first: Option<&'a str>, second: Option<&'a str>) -> Option<(&'a str, &'a str)> {
    match (first, second) {
        (None, None) => None,
        (first, second) => Some((first.unwrap_or_default(), second.unwrap_or_default())),
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
