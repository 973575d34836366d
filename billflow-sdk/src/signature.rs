//! Signature algorithm and verification for inbound payment webhooks.
//!
//! A payment provider signs the raw request body with the shared webhook
//! secret. The wire format for the headers is:
//!
//! ```text
//! X-Signature: {base64(HMAC-SHA256(raw_body, secret))}
//! X-Event-Id:  {provider event id}
//! ```
//!
//! The base64 alphabet is the standard RFC 4648 one, with padding.
//!
//! The body is verified exactly as it was received. Parsing and
//! re-serializing the JSON before verification changes the bytes and
//! therefore the signature.

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Header name for the provider's unique event identifier.
pub const EVENT_ID_HEADER: &str = "X-Event-Id";

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature")]
    Missing,
    #[error("invalid base64 in signature")]
    InvalidBase64,
    #[error("invalid signature")]
    SignatureMismatch,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

fn hmac_key(secret: &[u8]) -> ring::hmac::Key {
    ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret)
}

/// Sign a raw body: `base64(HMAC-SHA256(body, secret))`.
///
/// Returns the value to put in the `X-Signature` header.
pub fn sign_body(body: &[u8], secret: &[u8]) -> String {
    let tag = ring::hmac::sign(&hmac_key(secret), body);
    fast32::base64::RFC4648.encode(tag.as_ref())
}

/// Verify an `X-Signature` header value against the raw body.
///
/// The header is decoded and checked with `ring::hmac::verify`, which
/// compares in constant time.
pub fn verify_body(body: &[u8], signature: &str, secret: &[u8]) -> Result<(), SignatureError> {
    let signature = signature.trim();
    if signature.is_empty() {
        return Err(SignatureError::Missing);
    }

    let tag = fast32::base64::RFC4648
        .decode_str(signature)
        .map_err(|_| SignatureError::InvalidBase64)?;
    ring::hmac::verify(&hmac_key(secret), body, &tag)?;
    Ok(())
}
