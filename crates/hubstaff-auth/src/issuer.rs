//! Issuer metadata and the refresh grant
//!
//! The token manager only needs two things from the authorization server:
//! where its token endpoint lives, and a way to trade a refresh token for a new
//! pair. `IssuerProvider` is that seam. `OidcIssuerProvider` implements it with
//! OIDC discovery (`/.well-known/openid-configuration`), caching the metadata in
//! memory and optionally on disk for `METADATA_CACHE_TTL`.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::claims::unix_now;
use crate::constants::{METADATA_CACHE_TTL, PAT_CLIENT_ID, PAT_CLIENT_SECRET};
use crate::error::{Error, Result};
use crate::state::TokenPair;

/// Resolved authorization server metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuerHandle {
    pub issuer: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
}

/// Access to an authorization server.
///
/// Uses `Pin<Box<dyn Future>>` return types so the manager can hold an
/// `Arc<dyn IssuerProvider>` and tests can substitute a fake.
pub trait IssuerProvider: Send + Sync {
    /// Resolve metadata for the issuer at `issuer_url`.
    fn resolve<'a>(
        &'a self,
        issuer_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<IssuerHandle>> + Send + 'a>>;

    /// Exchange a refresh token for a new token pair.
    ///
    /// Rejections by the server are `Error::RefreshRejected`; transport and
    /// unexpected HTTP failures are `Error::Http`.
    fn refresh<'a>(
        &'a self,
        issuer: &'a IssuerHandle,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenPair>> + Send + 'a>>;
}

/// Discovery document fields this client reads.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    issuer: String,
    #[serde(default)]
    token_endpoint: Option<String>,
    #[serde(default)]
    jwks_uri: Option<String>,
}

/// Token endpoint response for the refresh grant.
///
/// Servers that do not rotate refresh tokens omit `refresh_token`; the
/// previous one stays in use.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedMetadata {
    /// Unix seconds
    fetched_at: i64,
    metadata: IssuerHandle,
}

impl CachedMetadata {
    fn is_fresh(&self, ttl: Duration, now: i64) -> bool {
        now.saturating_sub(self.fetched_at) < ttl.as_secs() as i64
    }
}

/// OIDC discovery + refresh grant over reqwest.
pub struct OidcIssuerProvider {
    client: reqwest::Client,
    cache_dir: Option<PathBuf>,
    ttl: Duration,
    cache: Mutex<HashMap<String, CachedMetadata>>,
}

impl OidcIssuerProvider {
    /// Provider with an in-memory metadata cache only.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            cache_dir: None,
            ttl: METADATA_CACHE_TTL,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Also persist discovered metadata under `cache_dir`.
    pub fn with_cache_dir(mut self, cache_dir: PathBuf) -> Self {
        self.cache_dir = Some(cache_dir);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn cache_file(&self, issuer: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(cache_namespace(issuer)).join("metadata.json"))
    }

    async fn read_disk_cache(&self, issuer: &str) -> Option<CachedMetadata> {
        let path = self.cache_file(issuer)?;
        let contents = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str::<CachedMetadata>(&contents) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable metadata cache");
                None
            }
        }
    }

    async fn write_disk_cache(&self, issuer: &str, cached: &CachedMetadata) {
        let Some(path) = self.cache_file(issuer) else {
            return;
        };
        let result = async {
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            let json = serde_json::to_vec_pretty(cached).map_err(std::io::Error::other)?;
            tokio::fs::write(&path, json).await
        }
        .await;
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to write metadata cache");
        }
    }

    async fn discover(&self, issuer: &str) -> Result<IssuerHandle> {
        let url = format!("{issuer}/.well-known/openid-configuration");
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Discovery(format!("{url} returned {status}")));
        }

        let document = response
            .json::<DiscoveryDocument>()
            .await
            .map_err(|e| Error::Discovery(format!("invalid discovery document: {e}")))?;

        let token_endpoint = document
            .token_endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::Discovery("discovery document has no token_endpoint".into()))?;

        let advertised = document.issuer.trim_end_matches('/');
        if advertised != issuer {
            return Err(Error::Discovery(format!(
                "issuer mismatch: expected {issuer}, got {advertised}"
            )));
        }

        Ok(IssuerHandle {
            issuer: issuer.to_string(),
            token_endpoint,
            jwks_uri: document.jwks_uri,
        })
    }
}

impl IssuerProvider for OidcIssuerProvider {
    fn resolve<'a>(
        &'a self,
        issuer_url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<IssuerHandle>> + Send + 'a>> {
        Box::pin(async move {
            let issuer = issuer_url.trim_end_matches('/');
            let now = unix_now();

            let mut cache = self.cache.lock().await;
            if let Some(cached) = cache.get(issuer).filter(|c| c.is_fresh(self.ttl, now)) {
                debug!(issuer, "issuer metadata served from memory");
                return Ok(cached.metadata.clone());
            }

            if let Some(cached) = self
                .read_disk_cache(issuer)
                .await
                .filter(|c| c.is_fresh(self.ttl, now) && c.metadata.issuer == issuer)
            {
                debug!(issuer, "issuer metadata served from disk cache");
                let metadata = cached.metadata.clone();
                cache.insert(issuer.to_string(), cached);
                return Ok(metadata);
            }

            let metadata = self.discover(issuer).await?;
            info!(
                issuer,
                token_endpoint = %metadata.token_endpoint,
                "discovered issuer metadata"
            );

            let cached = CachedMetadata {
                fetched_at: now,
                metadata: metadata.clone(),
            };
            self.write_disk_cache(issuer, &cached).await;
            cache.insert(issuer.to_string(), cached);
            Ok(metadata)
        })
    }

    fn refresh<'a>(
        &'a self,
        issuer: &'a IssuerHandle,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenPair>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&issuer.token_endpoint)
                .basic_auth(PAT_CLIENT_ID, Some(PAT_CLIENT_SECRET))
                .form(&[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ])
                .send()
                .await
                .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| String::from("<no body>"));

                // invalid_grant comes back as 400; 401/403 mean the grant or
                // client was refused outright
                if matches!(status.as_u16(), 400 | 401 | 403) {
                    return Err(Error::RefreshRejected(format!("{status}: {body}")));
                }

                return Err(Error::Http(format!(
                    "token refresh returned {status}: {body}"
                )));
            }

            let token = response
                .json::<TokenResponse>()
                .await
                .map_err(|e| Error::Http(format!("invalid refresh response: {e}")))?;

            Ok(TokenPair::new(
                token.access_token,
                token
                    .refresh_token
                    .unwrap_or_else(|| refresh_token.to_string()),
            ))
        })
    }
}

/// Directory name for an issuer's cache entries: the URL without scheme or slashes.
fn cache_namespace(issuer: &str) -> String {
    issuer
        .replace("https://", "")
        .replace("http://", "")
        .replace('/', "")
}
