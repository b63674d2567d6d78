use thiserror::Error;

use crate::network::NetworkError;

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("could not resolve location '{city}'")]
    LocatorResolution { city: String },
    #[error("invalid search area: {0}")]
    InvalidLocator(String),
    #[error("secure connection to {host} rejected")]
    CertificateValidation { host: String },
    #[error("poi provider unreachable: {0}")]
    Network(NetworkError),
}

impl From<NetworkError> for DiscoveryError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::CertificateValidation { host } => {
                DiscoveryError::CertificateValidation { host }
            }
            other => DiscoveryError::Network(other),
        }
    }
}
