//! Access token seam between the API client and token management

use std::future::Future;
use std::pin::Pin;

use hubstaff_auth::TokenManager;

use crate::error::Result;

/// Anything that can hand out a currently valid access token.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn AccessTokenSource>`).
pub trait AccessTokenSource: Send + Sync {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

impl AccessTokenSource for TokenManager {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move { Ok(TokenManager::access_token(self).await?) })
    }
}
