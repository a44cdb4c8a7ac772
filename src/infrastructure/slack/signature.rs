//! # Request Signing
//!
//! Verifies Slack's `X-Slack-Signature` header:
//! `v0=` + hex(HMAC-SHA256(secret, "v0:{timestamp}:{body}")).

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Requests older (or newer) than this are treated as replays.
const MAX_CLOCK_SKEW_SECS: i64 = 60 * 5;

#[derive(Debug, Error, PartialEq)]
pub enum SignatureError {
    #[error("missing header '{0}'")]
    MissingHeader(&'static str),
    #[error("invalid request timestamp")]
    InvalidTimestamp,
    #[error("request timestamp outside the allowed window")]
    Expired,
    #[error("malformed signature")]
    Malformed,
    #[error("signature mismatch")]
    Mismatch,
}

/// Verify a request using its headers and raw body.
pub fn verify_request(
    secret: &str,
    headers: &HeaderMap,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let timestamp = header(headers, TIMESTAMP_HEADER)?;
    let signature = header(headers, SIGNATURE_HEADER)?;
    verify(secret, timestamp, body, signature, now)
}

pub fn verify(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let ts: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    if (now - ts).abs() > MAX_CLOCK_SKEW_SECS {
        return Err(SignatureError::Expired);
    }

    let expected = signature
        .strip_prefix("v0=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or(SignatureError::Malformed)?;

    // constant-time comparison
    mac_for(secret, timestamp, body)?
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Produce the header value Slack would send. Used by tests and local tooling.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mac = mac_for(secret, timestamp, body)?;
    Ok(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(b"v0:");
    mac.update(timestamp.trim().as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(mac)
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignatureError::MissingHeader(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const NOW: i64 = 1_531_420_618;

    #[test]
    fn test_known_slack_example() {
        // Example request from Slack's signing documentation
        let body = b"token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadrunner&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmibIGlgcZRskXaIFfN&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";
        let signature = "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503";
        assert_eq!(verify(SECRET, "1531420618", body, signature, NOW), Ok(()));
        assert_eq!(sign(SECRET, "1531420618", body).unwrap(), signature);
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = sign(SECRET, "1531420618", b"payload=a").unwrap();
        assert_eq!(
            verify(SECRET, "1531420618", b"payload=b", &signature, NOW),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify("other", "1531420618", b"payload=a", &signature, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_stale_and_malformed() {
        let signature = sign(SECRET, "1531420618", b"x").unwrap();
        assert_eq!(
            verify(SECRET, "1531420618", b"x", &signature, NOW + 301),
            Err(SignatureError::Expired)
        );
        assert_eq!(
            verify(SECRET, "soon", b"x", &signature, NOW),
            Err(SignatureError::InvalidTimestamp)
        );
        assert_eq!(
            verify(SECRET, "1531420618", b"x", "abc", NOW),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_verify_request_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            verify_request(SECRET, &headers, b"x", NOW),
            Err(SignatureError::MissingHeader(TIMESTAMP_HEADER))
        );
        let signature = sign(SECRET, "1531420618", b"x").unwrap();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_static("1531420618"));
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature).unwrap());
        assert_eq!(verify_request(SECRET, &headers, b"x", NOW), Ok(()));
    }
}
