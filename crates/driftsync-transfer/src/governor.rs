//! Bandwidth governor
//!
//! Byte-granular token buckets per transfer direction, plus the admission
//! policy that keeps every running transfer above a minimum useful rate.
//! Workers suspend on [`BandwidthGovernor::acquire`] before each chunk; the
//! governor owns the buckets exclusively.
//!
//! Effective limits are scaled down inside configured wall-clock throttle
//! windows and while the connection is metered. Unlimited directions
//! (limit 0) stay unlimited regardless of scaling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Timelike;
use tracing::{debug, warn};

use driftsync_core::config::BandwidthConfig;
use driftsync_core::domain::TransferDirection;

/// Mutable bucket state behind the lock
#[derive(Debug)]
struct BucketInner {
    /// Bytes currently available (fractional for smooth refill)
    available: f64,
    last_refill: Instant,
}

/// Token bucket counting bytes instead of requests
///
/// The refill rate is supplied on every call so the governor can scale it
/// with the current throttle factor without rebuilding buckets.
#[derive(Debug)]
struct ByteBucket {
    inner: Mutex<BucketInner>,
}

impl ByteBucket {
    fn new(initial: f64) -> Self {
        Self {
            inner: Mutex::new(BucketInner {
                available: initial,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(inner: &mut BucketInner, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(inner.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            inner.available = (inner.available + elapsed * rate).min(capacity);
            inner.last_refill = now;
        }
    }

    /// Attempts to take `bytes` from the bucket after refilling
    fn try_acquire(&self, bytes: u64, rate: f64, capacity: f64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        Self::refill(&mut inner, rate, capacity);
        if inner.available >= bytes as f64 {
            inner.available -= bytes as f64;
            true
        } else {
            false
        }
    }

    /// Seconds until `bytes` would be available at `rate`
    fn time_until_available(&self, bytes: u64, rate: f64, capacity: f64) -> f64 {
        let mut inner = self.inner.lock().unwrap();
        Self::refill(&mut inner, rate, capacity);
        let deficit = bytes as f64 - inner.available;
        if deficit <= 0.0 {
            0.0
        } else if rate > 0.0 {
            deficit / rate
        } else {
            f64::MAX
        }
    }
}

/// Outcome of asking whether a new transfer may start now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Start immediately
    Admitted,
    /// Starting now would push every transfer below the per-transfer floor;
    /// wait for a slot to free
    Queued,
    /// Transfers are fully paused (metered connection with pause configured)
    Paused,
}

/// Rate limiter and admission gate for transfer workers
pub struct BandwidthGovernor {
    config: BandwidthConfig,
    upload: ByteBucket,
    download: ByteBucket,
    metered: AtomicBool,
}

impl BandwidthGovernor {
    pub fn new(config: BandwidthConfig) -> Self {
        let upload_cap = Self::capacity_for(config.upload_limit_kbps, config.burst_seconds);
        let download_cap = Self::capacity_for(config.download_limit_kbps, config.burst_seconds);
        Self {
            config,
            upload: ByteBucket::new(upload_cap),
            download: ByteBucket::new(download_cap),
            metered: AtomicBool::new(false),
        }
    }

    fn capacity_for(limit_kbps: u64, burst_seconds: u64) -> f64 {
        (limit_kbps * 1024 * burst_seconds) as f64
    }

    /// Marks the connection metered or not
    pub fn set_metered(&self, metered: bool) {
        if self.metered.swap(metered, Ordering::Release) != metered {
            warn!(metered, "connection metered state changed");
        }
    }

    pub fn is_metered(&self) -> bool {
        self.metered.load(Ordering::Acquire)
    }

    /// Bound on a single port call during a transfer; zero disables it
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.config.transfer_timeout_secs)
    }

    /// Configured limit in bytes per second, before any throttling
    pub fn base_limit(&self, direction: TransferDirection) -> u64 {
        let kbps = match direction {
            TransferDirection::Upload => self.config.upload_limit_kbps,
            TransferDirection::Download => self.config.download_limit_kbps,
        };
        kbps * 1024
    }

    /// Current throttle factor in (0, 1], from metered state and the
    /// window active at local hour `hour`
    pub fn throttle_factor_at(&self, hour: u8) -> f64 {
        let mut factor = 1.0f64;
        if self.is_metered() && !self.config.pause_on_metered {
            factor = factor.min(self.config.metered_throttle_percent as f64 / 100.0);
        }
        for window in &self.config.throttle_windows {
            if window.contains_hour(hour) {
                factor = factor.min(window.throttle_percent as f64 / 100.0);
            }
        }
        factor
    }

    fn throttle_factor(&self) -> f64 {
        self.throttle_factor_at(chrono::Local::now().hour() as u8)
    }

    /// Limit in force right now, in bytes per second; 0 means unlimited
    pub fn effective_limit(&self, direction: TransferDirection) -> u64 {
        let base = self.base_limit(direction);
        if base == 0 {
            return 0;
        }
        ((base as f64 * self.throttle_factor()) as u64).max(1)
    }

    /// Whether a new transfer may start given `active` already running
    ///
    /// Dividing the effective limit over one more transfer must leave each
    /// at or above the per-transfer floor; otherwise the transfer queues
    /// rather than starving everyone equally.
    pub fn admit(&self, direction: TransferDirection, active: u32) -> Admission {
        if self.is_metered() && self.config.pause_on_metered {
            return Admission::Paused;
        }
        let limit = self.effective_limit(direction);
        if limit == 0 {
            return Admission::Admitted;
        }
        let floor = self.config.min_bandwidth_per_transfer_kbps * 1024;
        let share = limit / (active as u64 + 1);
        if share < floor {
            debug!(
                direction = ?direction,
                active,
                share,
                floor,
                "per-transfer share below floor, queuing"
            );
            Admission::Queued
        } else {
            Admission::Admitted
        }
    }

    fn bucket(&self, direction: TransferDirection) -> &ByteBucket {
        match direction {
            TransferDirection::Upload => &self.upload,
            TransferDirection::Download => &self.download,
        }
    }

    /// Waits until `bytes` of budget are available for `direction`
    ///
    /// Returns immediately for unlimited directions. This is the workers'
    /// suspension point; freed budget is handed out in wake-up order.
    pub async fn acquire(&self, direction: TransferDirection, bytes: u64) {
        loop {
            let limit = self.effective_limit(direction);
            if limit == 0 {
                return;
            }
            let rate = limit as f64;
            let capacity = (limit * self.config.burst_seconds.max(1)) as f64;
            // A chunk larger than the whole burst capacity must still pass.
            let want = bytes.min(capacity as u64);

            let bucket = self.bucket(direction);
            if bucket.try_acquire(want, rate, capacity) {
                return;
            }
            let wait = bucket.time_until_available(want, rate, capacity);
            tokio::time::sleep(Duration::from_secs_f64(wait.clamp(0.01, 5.0))).await;
        }
    }
}
