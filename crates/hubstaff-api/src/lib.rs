//! Hubstaff REST API client
//!
//! A thin layer over reqwest that asks an `AccessTokenSource` for a bearer
//! token before every request. The client never touches token state; the
//! source (normally `hubstaff_auth::TokenManager`) decides when to refresh.

pub mod client;
pub mod error;
pub mod source;

pub use client::ApiClient;
pub use error::{Error, Result};
pub use source::AccessTokenSource;
