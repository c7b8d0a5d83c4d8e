//! The clock contract consumed by the command executor: a seam so
//! tests can supply deterministic timestamps instead of the wall clock.
use std::sync::atomic::{AtomicI64, Ordering};

/// A source of `now()`, expressed as microseconds since the Unix epoch to
/// match [`boundary_core::Cursor`]'s `occurred_at`.
pub trait Clock: Send + Sync {
    fn now_micros(&self) -> i64;
}

/// The wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        chrono::Utc::now().timestamp_micros()
    }
}

/// A clock a test can advance deterministically.
#[derive(Debug)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(initial_micros: i64) -> Self {
        Self(AtomicI64::new(initial_micros))
    }

    pub fn set(&self, micros: i64) {
        self.0.store(micros, Ordering::SeqCst);
    }

    pub fn advance(&self, micros: i64) {
        self.0.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_micros(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
