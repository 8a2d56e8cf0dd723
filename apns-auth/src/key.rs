#![forbid(unsafe_code)]

//! EC P-256 key material.
//!
//! Keys are constructed from already-parsed scalars or points (PEM/PKCS#8
//! parsing happens upstream) and shared read-only across all connections
//! for the client's lifetime.

use apns_core::{Error, Result};
use p256::ecdsa;

/// Private signing key identified by an APNs key id and team id.
#[derive(Debug, Clone)]
pub struct SigningKey {
    key_id: String,
    team_id: String,
    key: ecdsa::SigningKey,
}

impl SigningKey {
    /// Wrap an already-parsed P-256 private key.
    pub fn new(key_id: impl Into<String>, team_id: impl Into<String>, key: ecdsa::SigningKey) -> Self {
        Self {
            key_id: key_id.into(),
            team_id: team_id.into(),
            key,
        }
    }

    /// Construct from a raw 32-byte scalar.
    pub fn from_scalar_bytes(
        key_id: impl Into<String>,
        team_id: impl Into<String>,
        bytes: &[u8],
    ) -> Result<Self> {
        let key = ecdsa::SigningKey::from_slice(bytes)
            .map_err(|e| Error::auth(format!("invalid P-256 private key: {e}")))?;
        Ok(Self::new(key_id, team_id, key))
    }

    /// Ten-character key id from the developer portal.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Ten-character team id; becomes the JWT issuer.
    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    /// The underlying ECDSA key.
    pub fn ecdsa_key(&self) -> &ecdsa::SigningKey {
        &self.key
    }

    /// Matching public half, for verification in tests and tooling.
    pub fn verification_key(&self) -> VerificationKey {
        VerificationKey {
            key_id: self.key_id.clone(),
            team_id: self.team_id.clone(),
            key: self.key.verifying_key().to_owned(),
        }
    }
}

/// Public verification key, mirroring [`SigningKey`].
#[derive(Debug, Clone)]
pub struct VerificationKey {
    key_id: String,
    team_id: String,
    key: ecdsa::VerifyingKey,
}

impl VerificationKey {
    /// Wrap an already-parsed P-256 public key.
    pub fn new(
        key_id: impl Into<String>,
        team_id: impl Into<String>,
        key: ecdsa::VerifyingKey,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            team_id: team_id.into(),
            key,
        }
    }

    /// Key id this public key belongs to.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Team id this public key belongs to.
    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    /// The underlying ECDSA verifying key.
    pub fn ecdsa_key(&self) -> &ecdsa::VerifyingKey {
        &self.key
    }
}
