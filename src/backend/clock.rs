use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Host wall clock in seconds; deadlines are absolute values on this clock.
pub trait HostClock: Send + Sync {
    fn now_sec(&self) -> f64;
}

/// Seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl HostClock for SystemClock {
    fn now_sec(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_sec: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start_sec.to_bits())),
        }
    }

    pub fn set_sec(&self, sec: f64) {
        self.bits.store(sec.to_bits(), Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: f64) {
        let mut cur = self.bits.load(Ordering::SeqCst);
        loop {
            let next = (f64::from_bits(cur) + ms * 1e-3).to_bits();
            match self
                .bits
                .compare_exchange(cur, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }
}

impl HostClock for ManualClock {
    fn now_sec(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}
