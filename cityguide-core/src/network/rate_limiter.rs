use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::RateLimitSection;

/// Upper bound for `max_multiplier`, whatever the configuration says.
pub const MULTIPLIER_CEILING: f64 = 64.0;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub base_delay: Duration,
    pub safe_mode_delay: Duration,
    pub background_delay: Duration,
    pub safe_mode: bool,
    pub multiplier: f64,
    pub max_multiplier: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            safe_mode_delay: Duration::from_millis(1000),
            background_delay: Duration::from_millis(50),
            safe_mode: false,
            multiplier: 1.0,
            max_multiplier: 8.0,
        }
    }
}

impl From<&RateLimitSection> for RateLimiterConfig {
    fn from(section: &RateLimitSection) -> Self {
        Self {
            base_delay: Duration::from_millis(section.base_delay_ms),
            safe_mode_delay: Duration::from_millis(section.safe_mode_delay_ms),
            background_delay: Duration::from_millis(section.background_delay_ms),
            safe_mode: section.safe_mode,
            multiplier: section.multiplier,
            max_multiplier: section.max_multiplier,
        }
    }
}

/// Fixed-delay throttle shared by every clone.
///
/// Each [`RateLimiter::tick`] sleeps for the current delay while holding a
/// gate, so successive network calls are spaced by at least that delay no
/// matter which caller issues them. It bounds rate, not burst.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    base_delay: Duration,
    safe_mode_delay: Duration,
    background_delay: Duration,
    max_multiplier: f64,
    safe_mode: AtomicBool,
    multiplier_bits: AtomicU64,
    ticks: AtomicU64,
    gate: Mutex<()>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let max_multiplier = sanitize_multiplier(config.max_multiplier).clamp(1.0, MULTIPLIER_CEILING);
        let multiplier = sanitize_multiplier(config.multiplier).min(max_multiplier);
        Self {
            inner: Arc::new(Inner {
                base_delay: config.base_delay,
                safe_mode_delay: config.safe_mode_delay,
                background_delay: config.background_delay,
                max_multiplier,
                safe_mode: AtomicBool::new(config.safe_mode),
                multiplier_bits: AtomicU64::new(multiplier.to_bits()),
                ticks: AtomicU64::new(0),
                gate: Mutex::new(()),
            }),
        }
    }

    /// Limiter that never sleeps.
    pub fn unthrottled() -> Self {
        Self::new(RateLimiterConfig {
            base_delay: Duration::ZERO,
            safe_mode_delay: Duration::ZERO,
            background_delay: Duration::ZERO,
            ..RateLimiterConfig::default()
        })
    }

    pub async fn tick(&self) -> Duration {
        let _gate = self.inner.gate.lock().await;
        let delay = self.current_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.inner.ticks.fetch_add(1, Ordering::Relaxed);
        delay
    }

    /// Shorter pacing for non-network work; not serialized with [`tick`](Self::tick).
    pub async fn background_tick(&self) -> Duration {
        let delay = self.inner.background_delay;
        if !delay.is_zero() {
            sleep(delay).await;
        }
        delay
    }

    pub fn current_delay(&self) -> Duration {
        let base = if self.safe_mode() {
            self.inner.safe_mode_delay
        } else {
            self.inner.base_delay
        };
        Duration::try_from_secs_f64(base.as_secs_f64() * self.multiplier()).unwrap_or(Duration::MAX)
    }

    pub fn safe_mode(&self) -> bool {
        self.inner.safe_mode.load(Ordering::Relaxed)
    }

    pub fn set_safe_mode(&self, enabled: bool) {
        let previous = self.inner.safe_mode.swap(enabled, Ordering::Relaxed);
        if previous != enabled {
            info!(safe_mode = enabled, "rate limiter mode changed");
        }
    }

    pub fn multiplier(&self) -> f64 {
        f64::from_bits(self.inner.multiplier_bits.load(Ordering::Relaxed))
    }

    pub fn set_multiplier(&self, multiplier: f64) {
        let value = sanitize_multiplier(multiplier).min(self.inner.max_multiplier);
        self.inner
            .multiplier_bits
            .store(value.to_bits(), Ordering::Relaxed);
    }

    /// Doubles the multiplier up to the configured ceiling.
    pub fn escalate(&self) -> f64 {
        let next = (self.multiplier().max(1.0) * 2.0).min(self.inner.max_multiplier);
        self.set_multiplier(next);
        debug!(multiplier = next, "rate limiter backing off");
        next
    }

    /// Halves the multiplier back toward 1.0.
    pub fn relax(&self) -> f64 {
        let current = self.multiplier();
        if current <= 1.0 {
            return current;
        }
        let next = (current / 2.0).max(1.0);
        self.set_multiplier(next);
        next
    }

    pub fn ticks_issued(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }
}

fn sanitize_multiplier(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        1.0
    }
}
