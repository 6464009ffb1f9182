// Authentication module
// Token decoding, grant selection, the token endpoint client and the
// token manager that ties them together

pub mod cookies;
pub mod credentials;
pub mod grant;
pub mod manager;
pub mod refresh;
pub mod single_flight;
pub mod token;
pub mod types;

pub use cookies::CookieJar;
pub use credentials::{classify_tokens, detect_identity, SeedTokens};
pub use grant::{select_grant, Grant, GrantDecision, SelectorInput, REFRESH_MIN_VALIDITY_SECS};
pub use manager::{TokenManager, TokenOptions, DEFAULT_MIN_VALIDITY};
pub use refresh::TokenEndpoint;
pub use single_flight::{FlightAborted, SingleFlight};
pub use token::DecodedToken;
pub use types::{Identity, TokenPair};
