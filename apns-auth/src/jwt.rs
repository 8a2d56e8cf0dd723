#![forbid(unsafe_code)]

//! ES256 JWT encoding and verification.
//!
//! Output is `base64url(header).base64url(claims).base64url(signature)`
//! with no padding. The signature is ECDSA-P256-SHA256 over the first two
//! segments, serialized as JOSE raw `r || s` (64 bytes).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::Signature;
use serde::{Deserialize, Serialize};

use apns_core::{Error, Result};

use crate::key::{SigningKey, VerificationKey};

/// JOSE header of a provider token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Always `ES256`.
    pub alg: String,
    /// Always `JWT`.
    pub typ: String,
    /// Key id the token was signed with.
    pub kid: String,
}

/// Claims of a provider token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer: the team id.
    pub iss: String,
    /// Issue time, unix seconds.
    pub iat: u64,
}

/// A decoded provider token.
#[derive(Debug, Clone)]
pub struct Jwt {
    /// Parsed header.
    pub header: Header,
    /// Parsed claims.
    pub claims: Claims,
    /// Raw 64-byte JOSE signature.
    pub signature: Vec<u8>,
}

/// Sign a provider token for `issued_at` (unix seconds).
pub fn mint(key: &SigningKey, issued_at: u64) -> Result<String> {
    let header = Header {
        alg: "ES256".to_owned(),
        typ: "JWT".to_owned(),
        kid: key.key_id().to_owned(),
    };
    let claims = Claims {
        iss: key.team_id().to_owned(),
        iat: issued_at,
    };

    let header_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&header).map_err(|e| Error::auth(format!("header encode: {e}")))?,
    );
    let claims_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&claims).map_err(|e| Error::auth(format!("claims encode: {e}")))?,
    );

    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature: Signature = key.ecdsa_key().sign(signing_input.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Split and decode a token without verifying the signature.
pub fn decode(token: &str) -> Result<Jwt> {
    let mut parts = token.split('.');
    let (header_b64, claims_b64, sig_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(s), None) => (h, c, s),
        _ => return Err(Error::auth("token must have exactly three segments")),
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|e| Error::auth(format!("header segment: {e}")))?;
    let claims_bytes = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|e| Error::auth(format!("claims segment: {e}")))?;
    let signature = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|e| Error::auth(format!("signature segment: {e}")))?;

    let header: Header = serde_json::from_slice(&header_bytes)
        .map_err(|e| Error::auth(format!("header parse: {e}")))?;
    let claims: Claims = serde_json::from_slice(&claims_bytes)
        .map_err(|e| Error::auth(format!("claims parse: {e}")))?;

    if header.alg != "ES256" {
        return Err(Error::auth(format!("unsupported algorithm {}", header.alg)));
    }
    if signature.len() != 64 {
        return Err(Error::auth(format!(
            "signature must be 64 bytes, got {}",
            signature.len()
        )));
    }

    Ok(Jwt {
        header,
        claims,
        signature,
    })
}

/// Verify a token's signature against the public half of the signing key.
pub fn verify(token: &str, key: &VerificationKey) -> Result<Jwt> {
    let decoded = decode(token)?;
    let signing_len = token
        .rfind('.')
        .ok_or_else(|| Error::auth("token must contain a signature segment"))?;
    let signing_input = &token[..signing_len];

    let signature = Signature::from_slice(&decoded.signature)
        .map_err(|e| Error::auth(format!("signature bytes: {e}")))?;
    key.ecdsa_key()
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| Error::auth("signature verification failed"))?;
    Ok(decoded)
}
