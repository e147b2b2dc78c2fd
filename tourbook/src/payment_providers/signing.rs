//! HMAC-SHA256 webhook signatures in the Stripe scheme.
//!
//! - Signature is computed over: `{timestamp}.{payload}`
//! - The signature is hex-encoded HMAC-SHA256 keyed with the endpoint secret
//! - Header format: `Stripe-Signature: t=1614265330,v1=5257a869...,v1=...`

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Name of the header carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,

    #[error("Timestamp outside the tolerance zone")]
    TimestampOutOfTolerance,

    #[error("No signatures found matching the expected signature for payload")]
    NoMatchingSignature,
}

/// Compute the hex `v1` signature of a payload.
pub fn compute_signature(timestamp: i64, payload: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Build a complete signature header value, as the provider sends it.
pub fn sign_payload(timestamp: i64, payload: &[u8], secret: &str) -> Option<String> {
    Some(format!("t={},v1={}", timestamp, compute_signature(timestamp, payload, secret)?))
}

/// Verify a signature header against the raw payload.
///
/// Any one of the `v1` signatures may match. `now` and `tolerance_secs` bound the accepted age.
pub fn verify_signature(header: &str, payload: &[u8], secret: &str, now: i64, tolerance_secs: i64) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }

    let expected = compute_signature(timestamp, payload, secret).ok_or(SignatureError::NoMatchingSignature)?;
    if !signatures.iter().any(|sig| constant_time_eq(sig.as_bytes(), expected.as_bytes())) {
        return Err(SignatureError::NoMatchingSignature);
    }

    if (now - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::TimestampOutOfTolerance);
    }
    Ok(())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
