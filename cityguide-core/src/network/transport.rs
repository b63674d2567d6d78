use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use tracing::info;

use super::error::{NetworkError, NetworkResult};
use super::pinning::{PinTable, PinnedCertVerifier};
use crate::config::TransportSection;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("cityguide/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&TransportSection> for TransportConfig {
    fn from(section: &TransportSection) -> Self {
        Self {
            user_agent: section.user_agent.clone(),
            timeout: Duration::from_secs(section.timeout_seconds),
            connect_timeout: Duration::from_secs(section.connect_timeout_seconds),
        }
    }
}

/// HTTPS client whose every handshake goes through [`PinnedCertVerifier`].
#[derive(Clone)]
pub struct SecureTransport {
    client: reqwest::Client,
    verifier: Arc<PinnedCertVerifier>,
    pins: Arc<PinTable>,
}

impl SecureTransport {
    pub fn new(pins: PinTable, config: &TransportConfig) -> NetworkResult<Self> {
        let pins = Arc::new(pins);
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = Arc::new(PinnedCertVerifier::new(
            Arc::clone(&pins),
            Arc::clone(&provider),
        )?);

        let tls = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|err| NetworkError::Configuration(format!("tls protocol versions: {err}")))?
            .dangerous()
            .with_custom_certificate_verifier(verifier.clone())
            .with_no_client_auth();

        let client = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .https_only(true)
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| NetworkError::Configuration(format!("http client: {err}")))?;

        info!(pinned_hosts = pins.len(), "secure transport initialised");
        Ok(Self {
            client,
            verifier,
            pins,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn pins(&self) -> &PinTable {
        &self.pins
    }

    pub fn pin_rejections(&self) -> u64 {
        self.verifier.rejections()
    }

    /// Maps a reqwest failure onto the error taxonomy. Certificate failures
    /// are recognised anywhere in the source chain.
    pub fn classify(&self, url: &str, err: &reqwest::Error) -> NetworkError {
        if is_certificate_failure(err) {
            let host = err
                .url()
                .and_then(|url| url.host_str().map(str::to_string))
                .unwrap_or_else(|| url.to_string());
            return NetworkError::CertificateValidation { host };
        }
        if err.is_timeout() {
            return NetworkError::Timeout(url.to_string());
        }
        if err.is_decode() {
            return NetworkError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            };
        }
        NetworkError::Transport(format!("{url}: {err}"))
    }
}

impl std::fmt::Debug for SecureTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureTransport")
            .field("pinned_hosts", &self.pins.len())
            .field("pin_rejections", &self.pin_rejections())
            .finish()
    }
}

fn is_certificate_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(error) = current {
        if let Some(tls) = error.downcast_ref::<rustls::Error>() {
            if matches!(tls, rustls::Error::InvalidCertificate(_)) {
                return true;
            }
        }
        // io::Error::source skips the wrapped error, so look inside explicitly.
        if let Some(io) = error.downcast_ref::<std::io::Error>() {
            if let Some(inner) = io.get_ref() {
                if let Some(tls) = inner.downcast_ref::<rustls::Error>() {
                    if matches!(tls, rustls::Error::InvalidCertificate(_)) {
                        return true;
                    }
                }
            }
        }
        current = error.source();
    }
    false
}
