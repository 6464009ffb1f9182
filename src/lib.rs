// OAuth2 authenticating transport for the cloud management API

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod retry;

pub use auth::{Identity, TokenManager, TokenOptions, TokenPair};
pub use config::TransportConfig;
pub use error::{AuthError, ConfigError, TransportError};
pub use http_client::{AuthenticatedTransport, HttpTransport};
pub use retry::RetryPolicy;
