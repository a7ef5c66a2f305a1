//! Wall-clock abstraction so expiry checks can be tested deterministically.

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;

  /// Current time as whole seconds since the Unix epoch.
  fn unix_seconds(&self) -> i64 {
    self.now().timestamp()
  }
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Clock that always returns the same instant.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
  at: DateTime<Utc>,
}

#[cfg(test)]
impl FixedClock {
  pub fn new(at: DateTime<Utc>) -> Self {
    Self { at }
  }

  /// Fixed clock at the given Unix timestamp (seconds).
  pub fn at_unix(seconds: i64) -> Self {
    Self {
      at: DateTime::from_timestamp(seconds, 0).unwrap_or_default(),
    }
  }
}

#[cfg(test)]
impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    self.at
  }
}
