mod client;
mod error;
mod metrics;
mod pinning;
mod rate_limiter;
mod transport;

pub use client::UpstreamClient;
pub use error::{NetworkError, NetworkResult};
pub use metrics::UpstreamMetrics;
pub use pinning::{certificate_fingerprint, CertificatePin, PinDecision, PinTable, PinnedCertVerifier};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, MULTIPLIER_CEILING};
pub use transport::{SecureTransport, TransportConfig};
