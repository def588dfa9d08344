use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pkg_types::mtls::MtlsConfigFile;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use std::path::Path;
use tracing::info;

/// Certificate Authority for workload identities.
/// Generates a self-signed root and issues leaf certificates whose URI SANs
/// carry SPIFFE ids.
pub struct WorkloadCA {
    trust_domain: String,
    ca_cert_pem: String,
    ca_key_pair: KeyPair,
    ca_cert: rcgen::Certificate,
}

impl WorkloadCA {
    /// Create a new CA with a freshly-generated self-signed root certificate.
    pub fn new(trust_domain: &str) -> anyhow::Result<Self> {
        info!("Generating workload CA for trust domain {}", trust_domain);

        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, format!("{} Workload CA", trust_domain));
        params
            .distinguished_name
            .push(DnType::OrganizationName, trust_domain);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

        let key_pair = KeyPair::generate()?;
        let ca_cert = params.self_signed(&key_pair)?;
        let ca_cert_pem = ca_cert.pem();

        Ok(Self {
            trust_domain: trust_domain.to_string(),
            ca_cert_pem,
            ca_key_pair: key_pair,
            ca_cert,
        })
    }

    /// `spiffe://{trust_domain}/ns/{namespace}/sa/{service_account}`
    pub fn spiffe_id(&self, namespace: &str, service_account: &str) -> String {
        format!(
            "spiffe://{}/ns/{}/sa/{}",
            self.trust_domain, namespace, service_account
        )
    }

    /// Issue a leaf certificate usable for both client and server auth.
    /// Every entry of `spiffe_ids` becomes a URI SAN.
    /// Returns `(cert_pem, private_key_pem)`.
    pub fn issue_workload_cert(
        &self,
        common_name: &str,
        spiffe_ids: &[&str],
    ) -> anyhow::Result<(String, String)> {
        self.issue_cert_with_usages(
            common_name,
            spiffe_ids,
            &[
                ExtendedKeyUsagePurpose::ServerAuth,
                ExtendedKeyUsagePurpose::ClientAuth,
            ],
        )
    }

    /// Issue a leaf with the given extended key usages. An empty list omits
    /// the extension entirely.
    pub fn issue_cert_with_usages(
        &self,
        common_name: &str,
        spiffe_ids: &[&str],
        usages: &[ExtendedKeyUsagePurpose],
    ) -> anyhow::Result<(String, String)> {
        info!("Issuing workload certificate for {}", common_name);

        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params
            .distinguished_name
            .push(DnType::OrganizationName, self.trust_domain.as_str());
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = usages.to_vec();
        for id in spiffe_ids {
            params
                .subject_alt_names
                .push(SanType::URI((*id).try_into()?));
        }

        let key = KeyPair::generate()?;
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key_pair)?;

        Ok((cert.pem(), key.serialize_pem()))
    }

    /// Return the CA certificate PEM so peers can verify workload identity.
    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// Build an `mtls.json` bundle for the given leaf.
    pub fn bundle(&self, cert_pem: &str, key_pem: &str, allow_list: &[String]) -> MtlsConfigFile {
        MtlsConfigFile {
            allow_list: allow_list.to_vec(),
            ca_certificate: STANDARD.encode(&self.ca_cert_pem),
            certificate: STANDARD.encode(cert_pem),
            key: STANDARD.encode(key_pem),
        }
    }

    pub fn write_bundle(
        &self,
        path: &Path,
        cert_pem: &str,
        key_pem: &str,
        allow_list: &[String],
    ) -> anyhow::Result<()> {
        let bundle = self.bundle(cert_pem, key_pem, allow_list);
        std::fs::write(path, serde_json::to_vec_pretty(&bundle)?)?;
        info!("Wrote mTLS bundle to {}", path.display());
        Ok(())
    }
}
