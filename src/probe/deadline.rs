use std::time::Duration;

use crate::error::{Error, Result};

/// Upper bound on a session's lifetime, measured from the connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(Duration);

impl Deadline {
    pub const DEFAULT: Duration = Duration::from_secs(10);

    /// # Errors
    ///
    /// `Error::InvalidDeadline` for a zero duration.
    pub const fn new(duration: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(Error::InvalidDeadline);
        }
        Ok(Self(duration))
    }

    /// # Errors
    ///
    /// `Error::InvalidDeadline` when `millis` is zero.
    pub const fn from_millis(millis: u64) -> Result<Self> {
        Self::new(Duration::from_millis(millis))
    }

    pub const fn duration(&self) -> Duration {
        self.0
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<Duration> for Deadline {
    type Error = Error;

    fn try_from(duration: Duration) -> Result<Self> {
        Self::new(duration)
    }
}
