//! Hubstaff OAuth constants
//!
//! The PAT client identity is not a registered application. Hubstaff's token
//! endpoint requires client authentication on the refresh grant, so every
//! personal access token is refreshed as the placeholder client `PAT:PAT`.
//! The real secrets (access/refresh tokens) live in the state file.

use std::time::Duration;

/// Issuer used when the state file does not name one
pub const DEFAULT_ISSUER_URL: &str = "https://account.hubstaff.com";

/// API base used when the state file does not name one
pub const DEFAULT_API_BASE_URL: &str = "https://api.hubstaff.com/";

/// Placeholder client ID for personal access tokens
pub const PAT_CLIENT_ID: &str = "PAT";

/// Placeholder client secret for personal access tokens
pub const PAT_CLIENT_SECRET: &str = "PAT";

/// An access token is treated as expired this long before its `exp` claim.
pub const ACCESS_TOKEN_EXPIRATION_FUZZ: Duration = Duration::from_secs(30);

/// How long discovered issuer metadata is reused before it is fetched again.
pub const METADATA_CACHE_TTL: Duration = Duration::from_secs(86_400 * 7);

/// Default state file name, relative to the working directory
pub const DEFAULT_STATE_FILE: &str = "configState.json";
