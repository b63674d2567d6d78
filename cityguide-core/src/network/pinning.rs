use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::error::{NetworkError, NetworkResult};

const FINGERPRINT_OCTETS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePin {
    pub host: String,
    pub fingerprint: String,
}

/// SHA-256 of the DER bytes, uppercase hex octets joined by `:`.
pub fn certificate_fingerprint(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    let encoded = hex::encode_upper(digest);
    encoded
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

fn normalize_fingerprint(raw: &str) -> NetworkResult<String> {
    let normalized = raw.trim().to_uppercase();
    let octets: Vec<&str> = normalized.split(':').collect();
    let well_formed = octets.len() == FINGERPRINT_OCTETS
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()));
    if !well_formed {
        return Err(NetworkError::Configuration(format!(
            "invalid certificate pin fingerprint: {raw}"
        )));
    }
    Ok(normalized)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinDecision {
    Accept,
    Reject {
        expected: String,
        presented: Option<String>,
    },
    /// Host is not pinned; standard chain validation decides.
    Delegate,
}

#[derive(Debug, Clone, Default)]
pub struct PinTable {
    pins: HashMap<String, String>,
}

impl PinTable {
    pub fn new<I>(pins: I) -> NetworkResult<Self>
    where
        I: IntoIterator<Item = CertificatePin>,
    {
        let mut table = HashMap::new();
        for pin in pins {
            let host = pin.host.trim().to_lowercase();
            if host.is_empty() {
                return Err(NetworkError::Configuration(
                    "certificate pin with empty host".to_string(),
                ));
            }
            table.insert(host, normalize_fingerprint(&pin.fingerprint)?);
        }
        Ok(Self { pins: table })
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn expected_for(&self, host: &str) -> Option<&str> {
        self.pins.get(&host.to_lowercase()).map(String::as_str)
    }

    pub fn entries(&self) -> Vec<CertificatePin> {
        let mut entries: Vec<CertificatePin> = self
            .pins
            .iter()
            .map(|(host, fingerprint)| CertificatePin {
                host: host.clone(),
                fingerprint: fingerprint.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.host.cmp(&b.host));
        entries
    }

    /// Decision for one handshake. A missing leaf certificate on a pinned
    /// host is a rejection.
    pub fn evaluate(&self, host: &str, leaf_der: Option<&[u8]>) -> PinDecision {
        let Some(expected) = self.expected_for(host) else {
            return PinDecision::Delegate;
        };
        let presented = leaf_der.map(certificate_fingerprint);
        match presented {
            Some(ref fingerprint) if fingerprint == expected => PinDecision::Accept,
            _ => PinDecision::Reject {
                expected: expected.to_string(),
                presented,
            },
        }
    }
}

/// rustls verifier enforcing the pin table and falling back to WebPKI for
/// unpinned hosts.
#[derive(Debug)]
pub struct PinnedCertVerifier {
    pins: Arc<PinTable>,
    fallback: Arc<WebPkiServerVerifier>,
    rejections: AtomicU64,
}

impl PinnedCertVerifier {
    pub fn new(pins: Arc<PinTable>, provider: Arc<CryptoProvider>) -> NetworkResult<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let fallback = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|err| NetworkError::Configuration(format!("tls verifier: {err}")))?;
        Ok(Self {
            pins,
            fallback,
            rejections: AtomicU64::new(0),
        })
    }

    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }
}

fn host_of(server_name: &ServerName<'_>) -> String {
    match server_name {
        ServerName::DnsName(name) => name.as_ref().to_lowercase(),
        ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).to_string(),
        other => format!("{other:?}"),
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let host = host_of(server_name);
        let leaf = Some(end_entity.as_ref()).filter(|der| !der.is_empty());
        match self.pins.evaluate(&host, leaf) {
            PinDecision::Accept => {
                debug!(host = %host, "certificate pin matched");
                Ok(ServerCertVerified::assertion())
            }
            PinDecision::Reject {
                expected,
                presented,
            } => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                warn!(
                    host = %host,
                    expected = %expected,
                    presented = presented.as_deref().unwrap_or("<none>"),
                    "certificate pin mismatch, connection rejected"
                );
                Err(rustls::Error::InvalidCertificate(
                    CertificateError::ApplicationVerificationFailure,
                ))
            }
            PinDecision::Delegate => self.fallback.verify_server_cert(
                end_entity,
                intermediates,
                server_name,
                ocsp_response,
                now,
            ),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.fallback.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.fallback.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.fallback.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin_for(host: &str, der: &[u8]) -> CertificatePin {
        CertificatePin {
            host: host.to_string(),
            fingerprint: certificate_fingerprint(der),
        }
    }

    #[test]
    fn fingerprint_is_uppercase_colon_separated_sha256() {
        let fingerprint = certificate_fingerprint(b"abc");
        assert_eq!(fingerprint.len(), 32 * 3 - 1);
        assert!(fingerprint.starts_with("BA:78:16:BF"));
        assert!(fingerprint.ends_with("F2:00:15:AD"));
    }

    #[test]
    fn pinned_host_accepts_only_matching_leaf() {
        let table = PinTable::new(vec![pin_for("api.example.org", b"leaf-cert")]).unwrap();
        assert_eq!(
            table.evaluate("api.example.org", Some(b"leaf-cert")),
            PinDecision::Accept
        );
        assert!(matches!(
            table.evaluate("API.example.org", Some(b"other-cert")),
            PinDecision::Reject { .. }
        ));
        assert!(matches!(
            table.evaluate("api.example.org", None),
            PinDecision::Reject { presented: None, .. }
        ));
        assert_eq!(
            table.evaluate("unpinned.example.org", Some(b"anything")),
            PinDecision::Delegate
        );
    }

    #[test]
    fn lowercase_pins_are_normalized() {
        let mut pin = pin_for("api.example.org", b"leaf-cert");
        pin.fingerprint = pin.fingerprint.to_lowercase();
        let table = PinTable::new(vec![pin]).unwrap();
        assert_eq!(
            table.evaluate("api.example.org", Some(b"leaf-cert")),
            PinDecision::Accept
        );
    }

    #[test]
    fn malformed_pins_are_rejected_at_load() {
        let result = PinTable::new(vec![CertificatePin {
            host: "api.example.org".into(),
            fingerprint: "AA:BB".into(),
        }]);
        assert!(matches!(result, Err(NetworkError::Configuration(_))));
    }
}
