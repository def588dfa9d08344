use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pkg_constants::paths;
use pkg_types::mtls::MtlsConfigFile;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use crate::verifier::{CertResolver, SpiffeVerifier};
use crate::{IdentityError, MtlsError, identity};

const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Parsed contents of an `mtls.json` bundle.
#[derive(Debug)]
pub struct MtlsMaterial {
    pub allow_list: Vec<String>,
    pub certified_key: Arc<CertifiedKey>,
    pub roots: RootCertStore,
}

impl MtlsMaterial {
    pub fn from_config(
        config: &MtlsConfigFile,
        provider: &CryptoProvider,
    ) -> Result<Self, MtlsError> {
        let ca_pem = decode("ca", &config.ca_certificate)?;
        let cert_pem = decode("certificate", &config.certificate)?;
        let key_pem = decode("key", &config.key)?;

        let mut roots = RootCertStore::empty();
        for ca in parse_certificates("ca", &ca_pem)? {
            roots.add(ca).map_err(MtlsError::TrustAnchor)?;
        }

        let chain = parse_certificates("certificate", &cert_pem)?;
        let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
            .map_err(|source| MtlsError::Pem { field: "key", source })?
            .ok_or(MtlsError::NoPrivateKey)?;
        let signing_key = provider
            .key_provider
            .load_private_key(key)
            .map_err(MtlsError::Tls)?;

        Ok(Self {
            allow_list: config.allow_list.clone(),
            certified_key: Arc::new(CertifiedKey::new(chain, signing_key)),
            roots,
        })
    }
}

fn decode(field: &'static str, value: &str) -> Result<Vec<u8>, MtlsError> {
    STANDARD
        .decode(value.trim())
        .map_err(|source| MtlsError::Base64 { field, source })
}

fn parse_certificates(
    field: &'static str,
    pem: &[u8],
) -> Result<Vec<CertificateDer<'static>>, MtlsError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| MtlsError::Pem { field, source })?;
    if certs.is_empty() {
        return Err(MtlsError::NoCertificates(field));
    }
    Ok(certs)
}

/// Loads the mTLS bundle once and serves it to every handshake.
#[derive(Debug)]
pub struct MtlsConfigManager {
    path: PathBuf,
    provider: Arc<CryptoProvider>,
    loaded: Mutex<Option<Arc<MtlsMaterial>>>,
}

impl Default for MtlsConfigManager {
    /// Manager for `mtls.json` in the working directory.
    fn default() -> Self {
        Self::new(paths::DEFAULT_MTLS_CONFIG)
    }
}

impl MtlsConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            provider: Arc::new(rustls::crypto::aws_lc_rs::default_provider()),
            loaded: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }

    /// Read and parse the bundle on first call; later calls return the
    /// cached material. A failed load leaves nothing cached.
    pub fn load_config(&self) -> Result<Arc<MtlsMaterial>, MtlsError> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(material) = loaded.as_ref() {
            return Ok(material.clone());
        }

        let raw = std::fs::read(&self.path).map_err(|source| MtlsError::Io {
            path: self.path.clone(),
            source,
        })?;
        let config: MtlsConfigFile = serde_json::from_slice(&raw)?;
        let material = Arc::new(MtlsMaterial::from_config(&config, &self.provider)?);

        info!(
            "Loaded mTLS configuration from {} ({} allowed identities)",
            self.path.display(),
            material.allow_list.len()
        );
        *loaded = Some(material.clone());
        Ok(material)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Local certificate and key, loading the bundle if needed.
    pub fn certificate(&self) -> Result<Arc<CertifiedKey>, MtlsError> {
        Ok(self.load_config()?.certified_key.clone())
    }

    /// Check a peer chain (leaf first) against the loaded trust roots and
    /// allow list. Returns the accepted identity.
    pub fn verify_peer(
        &self,
        chain: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<String, IdentityError> {
        let material = self.load_config()?;
        identity::verify_peer_certificate(
            chain,
            &material.roots,
            &material.allow_list,
            self.provider.signature_verification_algorithms.all,
            now,
        )
    }

    /// Client-side rustls configuration presenting the local certificate
    /// and verifying the server's identity.
    pub fn client_config(self: &Arc<Self>) -> Result<ClientConfig, MtlsError> {
        let mut config = ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(MtlsError::Tls)?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SpiffeVerifier::new(self.clone())))
            .with_client_cert_resolver(Arc::new(CertResolver::new(self.clone())));
        config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();
        Ok(config)
    }

    /// Server-side rustls configuration requiring a client certificate.
    pub fn server_config(self: &Arc<Self>) -> Result<ServerConfig, MtlsError> {
        let mut config = ServerConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(MtlsError::Tls)?
            .with_client_cert_verifier(Arc::new(SpiffeVerifier::new(self.clone())))
            .with_cert_resolver(Arc::new(CertResolver::new(self.clone())));
        config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();
        Ok(config)
    }
}
