//! Access token lifecycle
//!
//! Every API call asks the manager for an access token. The manager decides
//! whether the stored one is still usable and, if not, trades the refresh token
//! for a new pair, persists it, and hands back the new access token.
//!
//! Token states:
//! - Valid → Stale (lazily, when `now >= exp - fuzz` on access)
//! - Stale → Refreshing (refresh token present and not expired)
//! - Stale → RefreshFailed (no refresh token / refresh token expired)
//! - Refreshing → Valid (new pair persisted)
//! - Refreshing → RefreshFailed (server rejected the refresh token)
//! - RefreshFailed → Valid (only via `install_tokens`)
//!
//! A single mutex covers the check-then-refresh section, so concurrent callers
//! that all see a stale token produce exactly one refresh. The rest wait and
//! then either find the fresh pair in the store or get the same error the
//! attempt they queued behind ended with.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::claims::{self, unix_now};
use crate::constants::ACCESS_TOKEN_EXPIRATION_FUZZ;
use crate::error::{Error, Result};
use crate::issuer::{IssuerHandle, IssuerProvider};
use crate::metrics::{RefreshOutcome, record_refresh};
use crate::state::{StateStore, TokenPair};

/// Why the current pair cannot produce an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    NoRefreshToken,
    RefreshTokenExpired,
    RefreshRejected,
}

impl FailureReason {
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::NoRefreshToken => "no refresh token",
            FailureReason::RefreshTokenExpired => "refresh token expired",
            FailureReason::RefreshRejected => "refresh rejected",
        }
    }
}

/// Snapshot of the token lifecycle, computed without network I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    /// Usable until `expires_at - fuzz` (unix seconds).
    Valid { expires_at: i64 },
    /// The next access will refresh.
    Stale,
    /// A refresh is in flight.
    Refreshing,
    RefreshFailed(FailureReason),
}

impl TokenStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TokenStatus::Valid { .. } => "valid",
            TokenStatus::Stale => "stale",
            TokenStatus::Refreshing => "refreshing",
            TokenStatus::RefreshFailed(_) => "refresh_failed",
        }
    }
}

/// Whether an access token must be refreshed before use.
///
/// Absent tokens and tokens without a readable `exp` are stale.
pub fn is_stale(access_token: &str, now: i64, fuzz: Duration) -> bool {
    match access_expiry(access_token) {
        Some(exp) => now >= exp.saturating_sub(fuzz.as_secs() as i64),
        None => true,
    }
}

fn access_expiry(access_token: &str) -> Option<i64> {
    if access_token.is_empty() {
        return None;
    }
    match claims::expiry(access_token) {
        Ok(exp) => Some(exp),
        Err(e) => {
            warn!(error = %e, "access token expiry unreadable, treating as stale");
            None
        }
    }
}

/// A refresh token the authorization server has already refused.
struct Rejection {
    refresh_token: Secret<String>,
    reason: String,
}

/// State guarded by the refresh mutex.
#[derive(Default)]
struct RefreshState {
    issuer: Option<IssuerHandle>,
    rejected: Option<Rejection>,
    /// How the most recent attempt ended, if it failed.
    last_failure: Option<Error>,
}

impl RefreshState {
    /// Checks that need no network: presence, own expiry, known rejection.
    fn check_refresh_token(&self, refresh_token: &str, now: i64) -> Result<()> {
        if refresh_token.is_empty() {
            return Err(Error::NoRefreshToken);
        }

        match claims::expiry(refresh_token) {
            Ok(exp) if exp < now => return Err(Error::RefreshTokenExpired { expired_at: exp }),
            Ok(_) => {}
            // Opaque refresh tokens carry no claims; let the server decide.
            Err(e) => debug!(error = %e, "refresh token expiry unreadable, skipping pre-check"),
        }

        if let Some(rejection) = &self.rejected {
            if rejection.refresh_token.expose() == refresh_token {
                return Err(Error::RefreshRejected(rejection.reason.clone()));
            }
        }

        Ok(())
    }

    fn classify(&self, pair: &TokenPair, now: i64, fuzz: Duration) -> TokenStatus {
        if let Some(exp) = access_expiry(pair.access_token.expose()) {
            if now < exp.saturating_sub(fuzz.as_secs() as i64) {
                return TokenStatus::Valid { expires_at: exp };
            }
        }
        match self.check_refresh_token(pair.refresh_token.expose(), now) {
            Ok(()) => TokenStatus::Stale,
            Err(Error::NoRefreshToken) => TokenStatus::RefreshFailed(FailureReason::NoRefreshToken),
            Err(Error::RefreshTokenExpired { .. }) => {
                TokenStatus::RefreshFailed(FailureReason::RefreshTokenExpired)
            }
            Err(_) => TokenStatus::RefreshFailed(FailureReason::RefreshRejected),
        }
    }
}

fn record_result(result: &Result<TokenPair>) {
    let outcome = match result {
        Ok(_) => RefreshOutcome::Success,
        Err(Error::NoRefreshToken) => RefreshOutcome::NoRefreshToken,
        Err(Error::RefreshTokenExpired { .. }) => RefreshOutcome::RefreshTokenExpired,
        Err(Error::RefreshRejected(_)) => RefreshOutcome::Rejected,
        Err(Error::Io(_)) => RefreshOutcome::PersistFailed,
        Err(_) => RefreshOutcome::Failed,
    };
    record_refresh(outcome);
}

/// Owner of the staleness decision and the refresh transition.
///
/// Construction does no I/O. The issuer is resolved on the first refresh and
/// the handle is kept for the life of the manager.
pub struct TokenManager {
    store: Arc<StateStore>,
    issuer: Arc<dyn IssuerProvider>,
    fuzz: Duration,
    refresh: Mutex<RefreshState>,
    refreshing: AtomicBool,
    /// Completed refresh attempts. Only written while `refresh` is held.
    attempts: AtomicU64,
}

impl TokenManager {
    pub fn new(store: Arc<StateStore>, issuer: Arc<dyn IssuerProvider>) -> Self {
        Self {
            store,
            issuer,
            fuzz: ACCESS_TOKEN_EXPIRATION_FUZZ,
            refresh: Mutex::new(RefreshState::default()),
            refreshing: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
        }
    }

    /// Override the expiry safety margin.
    pub fn with_fuzz(mut self, fuzz: Duration) -> Self {
        self.fuzz = fuzz;
        self
    }

    /// Return an access token valid for at least the fuzz window.
    ///
    /// Refreshes first when the stored token is stale. Any failure in the
    /// refresh chain is returned as-is; nothing is retried here.
    pub async fn access_token(&self) -> Result<String> {
        let seen = self.attempts.load(Ordering::Acquire);
        let mut state = self.refresh.lock().await;
        let pair = self.store.token().await;

        if !is_stale(pair.access_token.expose(), unix_now(), self.fuzz) {
            return Ok(pair.access_token.expose().clone());
        }

        // An attempt finished while this caller waited for the lock and the
        // token is still stale, so that attempt failed. Share its outcome.
        if self.attempts.load(Ordering::Acquire) != seen
            && let Some(err) = &state.last_failure
        {
            debug!(error = %err, "refresh failed while waiting, not retrying");
            return Err(err.clone());
        }

        debug!("access token stale, refreshing");
        let result = self.attempt(&mut state, &pair).await;
        result.map(|pair| pair.access_token.expose().clone())
    }

    /// Force a refresh regardless of the access token's expiry.
    pub async fn refresh(&self) -> Result<TokenPair> {
        let mut state = self.refresh.lock().await;
        let pair = self.store.token().await;
        self.attempt(&mut state, &pair).await
    }

    /// One pass through the refresh transition, with its outcome recorded.
    async fn attempt(&self, state: &mut RefreshState, pair: &TokenPair) -> Result<TokenPair> {
        let result = self.refresh_locked(state, pair).await;
        record_result(&result);
        state.last_failure = result.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::Release);
        result
    }

    async fn refresh_locked(&self, state: &mut RefreshState, pair: &TokenPair) -> Result<TokenPair> {
        let refresh_token = pair.refresh_token.expose();
        state.check_refresh_token(refresh_token, unix_now())?;

        let issuer = self.issuer_handle(state).await?;

        self.refreshing.store(true, Ordering::Release);
        let result = self.issuer.refresh(&issuer, refresh_token).await;
        self.refreshing.store(false, Ordering::Release);

        let new_pair = match result {
            Ok(new_pair) => new_pair,
            Err(Error::RefreshRejected(reason)) => {
                warn!(reason = %reason, "refresh token rejected, re-authorization required");
                state.rejected = Some(Rejection {
                    refresh_token: pair.refresh_token.clone(),
                    reason: reason.clone(),
                });
                return Err(Error::RefreshRejected(reason));
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                return Err(e);
            }
        };

        // The old refresh token may already be spent; if this write fails the
        // caller sees the error and the next call starts over from disk.
        if let Err(e) = self.store.update_token(new_pair.clone()).await {
            warn!(error = %e, "failed to persist refreshed token");
            return Err(e);
        }

        state.rejected = None;
        info!(
            expires_at = access_expiry(new_pair.access_token.expose()),
            "access token refreshed"
        );
        Ok(new_pair)
    }

    async fn issuer_handle(&self, state: &mut RefreshState) -> Result<IssuerHandle> {
        if let Some(handle) = &state.issuer {
            return Ok(handle.clone());
        }
        let issuer_url = self.store.issuer_url().await;
        let handle = self.issuer.resolve(&issuer_url).await?;
        state.issuer = Some(handle.clone());
        Ok(handle)
    }

    /// Replace the stored pair with one obtained out-of-band.
    ///
    /// This is the only way out of `RefreshFailed`.
    pub async fn install_tokens(&self, pair: TokenPair) -> Result<()> {
        let mut state = self.refresh.lock().await;
        self.store.update_token(pair).await?;
        state.rejected = None;
        state.last_failure = None;
        info!("installed new token pair");
        Ok(())
    }

    /// Current lifecycle state, without touching the network.
    pub async fn status(&self) -> TokenStatus {
        let state = match self.refresh.try_lock() {
            Ok(guard) => guard,
            Err(_) if self.refreshing.load(Ordering::Acquire) => return TokenStatus::Refreshing,
            Err(_) => self.refresh.lock().await,
        };
        let pair = self.store.token().await;
        state.classify(&pair, unix_now(), self.fuzz)
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }
}
