#![forbid(unsafe_code)]

//! TLS client configuration for APNs connections.
//!
//! ALPN advertises exactly `h2`; a handshake that negotiates anything else
//! is fatal for the connection. Trust anchors default to the bundled
//! webpki roots; mutual TLS adds a client certificate chain and key.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;

use apns_core::{Error, Result};

/// Client certificate chain plus private key for mutual TLS.
pub struct ClientIdentity {
    /// Leaf-first certificate chain.
    pub chain: Vec<CertificateDer<'static>>,
    /// Private key matching the leaf certificate.
    pub key: PrivateKeyDer<'static>,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("chain_len", &self.chain.len())
            .finish()
    }
}

/// Build the rustls client config used by every pooled connection.
///
/// `roots` replaces the default trust anchors when supplied; `identity`
/// switches the connection to mutual TLS.
pub fn client_config(
    roots: Option<RootCertStore>,
    identity: Option<ClientIdentity>,
) -> Result<rustls::ClientConfig> {
    let roots = roots.unwrap_or_else(default_roots);

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::tls(format!("protocol versions: {e}")))?
        .with_root_certificates(roots);

    let mut config = match identity {
        Some(identity) => builder
            .with_client_auth_cert(identity.chain, identity.key)
            .map_err(|e| Error::tls(format!("client certificate: {e}")))?,
        None => builder.with_no_client_auth(),
    };

    config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(config)
}

/// Bundled webpki trust anchors, used when the caller supplies none.
pub fn default_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpn_is_exactly_h2() {
        let config = client_config(None, None).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec()]);
    }

    #[test]
    fn default_roots_are_nonempty() {
        assert!(!default_roots().is_empty());
    }
}
