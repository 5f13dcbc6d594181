//! Time source for stores.
//!
//! Stores read "now" from a [`Clock`] both when stamping new rows and when
//! evaluating the validity window, so tests can move time without sleeping.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
  now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self { now: Arc::new(Mutex::new(start)) }
  }

  pub fn advance(&self, by: TimeDelta) {
    let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
    *now += by;
  }

  pub fn set(&self, to: DateTime<Utc>) {
    *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
  }
}

impl Default for ManualClock {
  fn default() -> Self { Self::new(Utc::now()) }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
