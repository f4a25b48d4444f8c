//! Expiry extraction from compact-serialized tokens
//!
//! Tokens are `header.payload.signature`, each segment base64url without
//! padding. Only the payload's `exp` claim is read; the signature is not
//! verified because the token is checked by the same authorization server that
//! issued it.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<serde_json::Number>,
}

/// Decode the `exp` claim (unix seconds) from a compact token.
pub fn expiry(token: &str) -> Result<i64> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(Error::MalformedToken(
            "expected three dot-separated segments".into(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {e}")))?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes)
        .map_err(|e| Error::MalformedToken(format!("payload is not a JSON object: {e}")))?;

    let exp = claim
        .exp
        .ok_or_else(|| Error::MalformedToken("payload has no exp claim".into()))?;
    exp.as_i64()
        .or_else(|| exp.as_f64().map(|f| f as i64))
        .ok_or_else(|| Error::MalformedToken(format!("exp claim out of range: {exp}")))
}

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Build an unsigned compact token with the given `exp`, for tests.
#[cfg(test)]
pub(crate) fn test_token(exp: i64, subject: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "sub": subject, "exp": exp })
            .to_string()
            .as_bytes(),
    );
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_exp_from_payload() {
        let token = test_token(1_735_500_000, "user-1");
        assert_eq!(expiry(&token).unwrap(), 1_735_500_000);
    }

    #[test]
    fn accepts_fractional_exp() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp":1735500000.75}"#);
        let token = format!("e30.{payload}.sig");
        assert_eq!(expiry(&token).unwrap(), 1_735_500_000);
    }

    #[test]
    fn tolerates_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(br#"{"exp":42}"#);
        let token = format!("e30.{payload}.sig");
        assert_eq!(expiry(&token).unwrap(), 42);
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(matches!(expiry("only.two"), Err(Error::MalformedToken(_))));
        assert!(matches!(expiry("a.b.c.d"), Err(Error::MalformedToken(_))));
        assert!(matches!(expiry(""), Err(Error::MalformedToken(_))));
    }

    #[test]
    fn rejects_missing_exp() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"user-1"}"#);
        let token = format!("e30.{payload}.sig");
        let err = expiry(&token).unwrap_err();
        assert!(err.to_string().contains("no exp claim"), "got: {err}");
    }

    #[test]
    fn rejects_non_json_payload() {
        let payload = URL_SAFE_NO_PAD.encode(b"not json");
        let token = format!("e30.{payload}.sig");
        assert!(matches!(expiry(&token), Err(Error::MalformedToken(_))));
    }
}
