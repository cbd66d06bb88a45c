use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix time in whole seconds. Zero means "never observed".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs)
    }

    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    pub const fn zero() -> Self {
        Timestamp(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Seconds elapsed from `self` until `now`, or `None` if `self` lies in the future.
    pub fn age_at(&self, now: Timestamp) -> Option<u64> {
        now.0.checked_sub(self.0)
    }

    pub fn saturating_sub_secs(&self, secs: u64) -> Timestamp {
        Timestamp(self.0.saturating_sub(secs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
