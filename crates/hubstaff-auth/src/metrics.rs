//! Token refresh metrics
//!
//! - `hubstaff_token_refresh_total` (counter): label `outcome`
//!
//! Emitted through the `metrics` facade; without an installed recorder the
//! calls are no-ops.

/// Outcome label for a refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Success,
    NoRefreshToken,
    RefreshTokenExpired,
    Rejected,
    Failed,
    PersistFailed,
}

impl RefreshOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Success => "success",
            RefreshOutcome::NoRefreshToken => "no_refresh_token",
            RefreshOutcome::RefreshTokenExpired => "refresh_token_expired",
            RefreshOutcome::Rejected => "rejected",
            RefreshOutcome::Failed => "failed",
            RefreshOutcome::PersistFailed => "persist_failed",
        }
    }
}

/// Record the outcome of one pass through the refresh transition.
pub fn record_refresh(outcome: RefreshOutcome) {
    metrics::counter!("hubstaff_token_refresh_total", "outcome" => outcome.label()).increment(1);
}
