use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamMetrics {
    pub requests: u64,
    pub successes: u64,
    pub not_found: u64,
    pub failures: u64,
    pub throttled: u64,
    pub certificate_rejections: u64,
    pub total_wait_ms: u64,
}

impl UpstreamMetrics {
    pub fn record_request(&mut self, waited_ms: u64) {
        self.requests = self.requests.saturating_add(1);
        self.total_wait_ms = self.total_wait_ms.saturating_add(waited_ms);
    }

    pub fn record_success(&mut self) {
        self.successes = self.successes.saturating_add(1);
    }

    pub fn record_not_found(&mut self) {
        self.not_found = self.not_found.saturating_add(1);
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn record_throttled(&mut self) {
        self.throttled = self.throttled.saturating_add(1);
    }

    pub fn record_certificate_rejection(&mut self) {
        self.certificate_rejections = self.certificate_rejections.saturating_add(1);
    }

    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            (self.successes as f64 / self.requests as f64) * 100.0
        }
    }
}
