use thiserror::Error;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("upstream {url} answered with status {status}")]
    Status { status: u16, url: String },
    #[error("upstream {url} is throttling requests")]
    Throttled { url: String },
    #[error("certificate validation failed for {host}")]
    CertificateValidation { host: String },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl NetworkError {
    pub fn is_certificate_failure(&self) -> bool {
        matches!(self, NetworkError::CertificateValidation { .. })
    }
}
