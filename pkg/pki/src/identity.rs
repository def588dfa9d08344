use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, SignatureVerificationAlgorithm, UnixTime};
use webpki::{EndEntityCert, KeyUsage};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{X509Certificate, parse_x509_certificate};

use crate::IdentityError;

/// Extended key usages a peer leaf may carry: the PKIX purposes (server
/// and client auth, code signing, email protection, time stamping, OCSP
/// signing) and anyExtendedKeyUsage. A leaf without the extension matches
/// every entry.
const ACCEPTED_EKUS: [&[u8]; 7] = [
    &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x01],
    &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x02],
    &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x03],
    &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x04],
    &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x08],
    &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x09],
    &[0x55, 0x1d, 0x25, 0x00],
];

fn uri_sans(cert: &X509Certificate<'_>, index: usize) -> Result<Vec<String>, IdentityError> {
    let san = cert
        .subject_alternative_name()
        .map_err(|_| IdentityError::ParseCertificate { index })?;

    Ok(san
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::URI(uri) => Some(uri.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default())
}

fn single_identity(mut uris: Vec<String>) -> Result<String, IdentityError> {
    match uris.len() {
        0 | 1 => uris.pop().ok_or(IdentityError::MissingIdentity),
        n => Err(IdentityError::MultipleIdentities(n)),
    }
}

/// The single URI SAN of `der`, e.g. `spiffe://example.org/ns/default/sa/ping`.
pub fn spiffe_id_from_certificate(der: &CertificateDer<'_>) -> Result<String, IdentityError> {
    let (_, cert) =
        parse_x509_certificate(der).map_err(|_| IdentityError::ParseCertificate { index: 0 })?;
    single_identity(uri_sans(&cert, 0)?)
}

/// Verify a peer chain (leaf first) and return the peer's identity.
///
/// Fails closed: the chain must parse, be non-empty, carry exactly one URI
/// SAN on the leaf, chain to `roots` at `now` for one of `ACCEPTED_EKUS`,
/// and the identity must appear verbatim in `allow_list`.
pub fn verify_peer_certificate(
    chain: &[CertificateDer<'_>],
    roots: &RootCertStore,
    allow_list: &[String],
    algorithms: &[&dyn SignatureVerificationAlgorithm],
    now: UnixTime,
) -> Result<String, IdentityError> {
    let parsed = chain
        .iter()
        .enumerate()
        .map(|(index, der)| {
            parse_x509_certificate(der)
                .map(|(_, cert)| cert)
                .map_err(|_| IdentityError::ParseCertificate { index })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (leaf_der, leaf) = match (chain.first(), parsed.first()) {
        (Some(der), Some(cert)) => (der, cert),
        _ => return Err(IdentityError::EmptyChain),
    };

    let identity = single_identity(uri_sans(leaf, 0)?)?;

    let end_entity = EndEntityCert::try_from(leaf_der).map_err(IdentityError::Verification)?;
    let intermediates = &chain[1..];
    let mut failure = None;
    for oid in ACCEPTED_EKUS {
        match end_entity.verify_for_usage(
            algorithms,
            &roots.roots,
            intermediates,
            now,
            KeyUsage::required_if_present(oid),
            None,
            None,
        ) {
            Ok(_) => {
                failure = None;
                break;
            }
            Err(e) => failure = Some(e),
        }
    }
    if let Some(e) = failure {
        return Err(IdentityError::Verification(e));
    }

    if !allow_list.iter().any(|allowed| allowed == &identity) {
        return Err(IdentityError::Rejected(identity));
    }

    Ok(identity)
}
