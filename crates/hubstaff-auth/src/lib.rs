//! Hubstaff personal access token management
//!
//! Persists the access/refresh token pair, decides when the access token is
//! stale, and refreshes it through the authorization server. This crate has no
//! dependency on the API client; anything that needs a bearer token can use
//! `TokenManager::access_token()` directly.
//!
//! Token flow:
//! 1. `state::StateStore::load()` reads `configState.json` (cold start creates it)
//! 2. `manager::TokenManager::access_token()` checks `exp` against the fuzz window
//! 3. When stale, `issuer::IssuerProvider::resolve()` finds the token endpoint
//! 4. `issuer::IssuerProvider::refresh()` exchanges the refresh token
//! 5. The new pair is saved via `state::StateStore::update_token()`

pub mod claims;
pub mod constants;
pub mod error;
pub mod issuer;
pub mod manager;
pub mod metrics;
pub mod state;

pub use constants::*;
pub use error::{Error, Result};
pub use issuer::{IssuerHandle, IssuerProvider, OidcIssuerProvider};
pub use manager::{FailureReason, TokenManager, TokenStatus, is_stale};
pub use state::{StateRecord, StateStore, TokenPair};
