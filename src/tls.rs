//! TLS configuration with a fixed cryptographic policy.
//!
//! Every [`TlsConfig`] carries:
//!
//! - TLS 1.2 as the minimum protocol version (1.2 and 1.3 enabled),
//! - the [`SUPPORTED_CIPHER_SUITES`] allowlist, in that order,
//! - one trust-anchor pool used both to verify servers (client side) and to
//!   verify client certificates (server side, which requires them).
//!
//! Two constructors exist. [`TlsConfig::from_files`] loads the certificate,
//! key and CA bundle from PEM files; [`TlsConfig::with_trust_pool`] takes a
//! caller-supplied [`RootCertStore`] and refuses to build without one, so a
//! server can never end up accepting unauthenticated clients.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::{CryptoProvider, aws_lc_rs};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{VerifierBuilderError, WebPkiClientVerifier};
use rustls::{
    CipherSuite, ClientConfig, ProtocolVersion, RootCertStore, ServerConfig,
    SupportedProtocolVersion,
};
use thiserror::Error;
use tracing::debug;

/// Cipher suites offered and accepted, in preference order.
///
/// TLS 1.3 suites first, then ECDHE with AES-GCM for TLS 1.2. Nothing
/// without forward secrecy or AEAD.
pub const SUPPORTED_CIPHER_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_AES_256_GCM_SHA384,
    CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
];

/// Lowest protocol version either side will negotiate.
pub const MIN_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion::TLSv1_2;

static PROTOCOL_VERSIONS: &[&SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

/// ALPN identifiers advertised by the server, most preferred first.
const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Errors raised while building a [`TlsConfig`].
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {kind} from {}: {source}", .path.display())]
    Load {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {kind} from {}: {source}", .path.display())]
    Parse {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {}", .path.display())]
    NoCertificates { path: PathBuf },

    #[error("no private key found in {}", .path.display())]
    NoPrivateKey { path: PathBuf },

    #[error("a non-empty trust pool is required for mutual TLS")]
    MissingTrustPool,

    #[error("invalid CA certificate in {}: {source}", .path.display())]
    InvalidCa {
        path: PathBuf,
        #[source]
        source: rustls::Error,
    },

    #[error("failed to build client certificate verifier: {0}")]
    Verifier(#[from] VerifierBuilderError),

    #[error("TLS config error (cert/key mismatch?): {0}")]
    Rustls(#[from] rustls::Error),
}

/// Built TLS configuration for both ends of a mutually authenticated connection.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    cert_chain: Vec<CertificateDer<'static>>,
    trust_pool: Arc<RootCertStore>,
    server: Arc<ServerConfig>,
    client: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Load certificate chain, private key and CA bundle from PEM files.
    ///
    /// The CA bundle becomes both the root CAs and the client CAs.
    ///
    /// # Errors
    ///
    /// Fails if any file cannot be read or parsed, holds no usable entry,
    /// or the certificate does not match the key.
    pub fn from_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        ca_path: impl AsRef<Path>,
    ) -> Result<Self, TlsError> {
        let ca_path = ca_path.as_ref();
        let mut pool = RootCertStore::empty();
        for ca in load_certs(ca_path)? {
            pool.add(ca).map_err(|source| TlsError::InvalidCa {
                path: ca_path.to_path_buf(),
                source,
            })?;
        }

        debug!(
            cert = %cert_path.as_ref().display(),
            ca = %ca_path.display(),
            anchors = pool.len(),
            "Loaded TLS trust pool"
        );

        Self::with_trust_pool(cert_path, key_path, Some(Arc::new(pool)))
    }

    /// Load certificate chain and key from PEM files and trust `pool`.
    ///
    /// # Errors
    ///
    /// [`TlsError::MissingTrustPool`] when `pool` is `None` or empty, plus
    /// the load and build failures of [`TlsConfig::from_files`].
    pub fn with_trust_pool(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        pool: Option<Arc<RootCertStore>>,
    ) -> Result<Self, TlsError> {
        let trust_pool = pool
            .filter(|pool| !pool.is_empty())
            .ok_or(TlsError::MissingTrustPool)?;

        let cert_chain = load_certs(cert_path.as_ref())?;
        let key = load_private_key(key_path.as_ref())?;
        let provider = Arc::new(restricted_provider());

        let verifier =
            WebPkiClientVerifier::builder_with_provider(trust_pool.clone(), provider.clone())
                .build()?;

        let mut server = ServerConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(PROTOCOL_VERSIONS)?
            .with_client_cert_verifier(verifier)
            .with_single_cert(cert_chain.clone(), key.clone_key())?;
        server.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

        let client = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(PROTOCOL_VERSIONS)?
            .with_root_certificates(trust_pool.clone())
            .with_client_auth_cert(cert_chain.clone(), key)?;

        Ok(Self {
            cert_chain,
            trust_pool,
            server: Arc::new(server),
            client: Arc::new(client),
        })
    }

    /// Lowest protocol version either built config negotiates.
    pub fn min_protocol_version(&self) -> ProtocolVersion {
        MIN_PROTOCOL_VERSION
    }

    /// Enabled protocol versions, newest first.
    pub fn protocol_versions(&self) -> Vec<ProtocolVersion> {
        PROTOCOL_VERSIONS.iter().map(|v| v.version).collect()
    }

    /// Cipher suites of the provider both configs were built with.
    pub fn cipher_suites(&self) -> Vec<CipherSuite> {
        self.server
            .crypto_provider()
            .cipher_suites
            .iter()
            .map(|suite| suite.suite())
            .collect()
    }

    /// Anchors used to verify servers.
    pub fn root_cas(&self) -> &Arc<RootCertStore> {
        &self.trust_pool
    }

    /// Anchors used to verify client certificates; the same pool as [`Self::root_cas`].
    pub fn client_cas(&self) -> &Arc<RootCertStore> {
        &self.trust_pool
    }

    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        self.server.clone()
    }

    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client.clone()
    }
}

/// The aws-lc-rs provider with its suites cut down to the allowlist.
pub fn restricted_provider() -> CryptoProvider {
    let mut provider = aws_lc_rs::default_provider();
    let available = std::mem::take(&mut provider.cipher_suites);
    provider.cipher_suites = SUPPORTED_CIPHER_SUITES
        .iter()
        .filter_map(|wanted| available.iter().find(|s| s.suite() == *wanted).copied())
        .collect();
    provider
}

fn read_pem(kind: &'static str, path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Load {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

/// Load all certificates from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let pem = read_pem("certificates", path)?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Parse {
            kind: "certificates",
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let pem = read_pem("private key", path)?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|source| TlsError::Parse {
            kind: "private key",
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey {
            path: path.to_path_buf(),
        })
}
