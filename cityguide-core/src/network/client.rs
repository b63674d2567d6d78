use std::sync::{Arc, Mutex, PoisonError};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};
use url::Url;

use super::error::{NetworkError, NetworkResult};
use super::metrics::UpstreamMetrics;
use super::rate_limiter::RateLimiter;
use super::transport::SecureTransport;

/// Single path for provider HTTP traffic: limiter tick, then a pinned
/// request.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    transport: SecureTransport,
    limiter: RateLimiter,
    metrics: Arc<Mutex<UpstreamMetrics>>,
}

impl UpstreamClient {
    pub fn new(transport: SecureTransport, limiter: RateLimiter) -> Self {
        Self {
            transport,
            limiter,
            metrics: Arc::new(Mutex::new(UpstreamMetrics::default())),
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn transport(&self) -> &SecureTransport {
        &self.transport
    }

    pub fn metrics(&self) -> UpstreamMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with_metrics(&self, update: impl FnOnce(&mut UpstreamMetrics)) {
        let mut guard = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut guard);
    }

    /// GET and decode JSON. `Ok(None)` means the upstream answered 404.
    pub async fn get_json<T>(&self, url: Url) -> NetworkResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let waited = self.limiter.tick().await;
        self.with_metrics(|m| m.record_request(waited.as_millis() as u64));
        trace!(url = %url, waited_ms = waited.as_millis() as u64, "upstream request");

        let target = redact(&url);
        let response = match self.transport.client().get(url).send().await {
            Ok(response) => response,
            Err(err) => {
                let error = self.transport.classify(&target, &err);
                if error.is_certificate_failure() {
                    self.with_metrics(UpstreamMetrics::record_certificate_rejection);
                } else {
                    self.with_metrics(UpstreamMetrics::record_failure);
                }
                warn!(url = %target, error = %error, "upstream request failed");
                return Err(error);
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            self.with_metrics(UpstreamMetrics::record_not_found);
            debug!(url = %target, "upstream returned not found");
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let multiplier = self.limiter.escalate();
            self.with_metrics(UpstreamMetrics::record_throttled);
            warn!(url = %target, multiplier, "upstream throttling detected");
            return Err(NetworkError::Throttled { url: target });
        }
        if !status.is_success() {
            self.with_metrics(UpstreamMetrics::record_failure);
            return Err(NetworkError::Status {
                status: status.as_u16(),
                url: target,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport.classify(&target, &err))?;
        let value = serde_json::from_slice::<T>(&body).map_err(|err| NetworkError::Decode {
            url: target.clone(),
            message: err.to_string(),
        })?;
        self.limiter.relax();
        self.with_metrics(UpstreamMetrics::record_success);
        Ok(Some(value))
    }
}

/// Scheme, host and path only; query strings can be long Overpass scripts.
fn redact(url: &Url) -> String {
    format!(
        "{}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.path()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_drops_query() {
        let url = Url::parse("https://overpass-api.de/api/interpreter?data=%5Bout%3Ajson%5D").unwrap();
        assert_eq!(redact(&url), "https://overpass-api.de/api/interpreter");
    }
}
