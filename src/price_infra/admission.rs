use serde::{Deserialize, Serialize};
use std::fmt;
use crate::types::price::Price;

/// Status bits attached to every aggregate. Zero means admissible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateFlags(u8);

impl AggregateFlags {
    pub const OK: AggregateFlags = AggregateFlags(0);
    pub const LOW_QUORUM: AggregateFlags = AggregateFlags(1);
    pub const STALE: AggregateFlags = AggregateFlags(1 << 1);
    pub const DEVIANT_VS_TWAP: AggregateFlags = AggregateFlags(1 << 2);

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: AggregateFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: AggregateFlags) {
        self.0 |= other.0;
    }

    /// Reason code reported by `can_update`: the most severe bit set.
    pub fn primary_reason(&self) -> ReasonCode {
        if self.contains(Self::LOW_QUORUM) {
            ReasonCode::LowQuorum
        } else if self.contains(Self::DEVIANT_VS_TWAP) {
            ReasonCode::DeviantVsTwap
        } else if self.contains(Self::STALE) {
            ReasonCode::Stale
        } else {
            ReasonCode::Ok
        }
    }
}

impl std::ops::BitOr for AggregateFlags {
    type Output = AggregateFlags;
    fn bitor(self, other: AggregateFlags) -> AggregateFlags {
        AggregateFlags(self.0 | other.0)
    }
}

impl fmt::Display for AggregateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return f.write_str("OK");
        }
        let names: Vec<&str> = [
            (Self::LOW_QUORUM, "LOW_QUORUM"),
            (Self::STALE, "STALE"),
            (Self::DEVIANT_VS_TWAP, "DEVIANT_VS_TWAP"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        f.write_str(&names.join("|"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Ok,
    LowQuorum,
    Stale,
    DeviantVsTwap,
    ZeroPrice,
    /// Aggregate timestamp is older than the last committed point.
    OutOfOrder,
}

/// Whether a STALE-only aggregate may be committed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleCommitPolicy {
    /// Commit only when no flag is set.
    #[default]
    Reject,
    /// A non-zero aggregate whose only flag is STALE is committed with the bit kept.
    Allow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Commit,
    Reject(ReasonCode),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AdmissionPolicy {
    stale_policy: StaleCommitPolicy,
}

impl AdmissionPolicy {
    pub fn new(stale_policy: StaleCommitPolicy) -> Self {
        AdmissionPolicy { stale_policy }
    }

    /// Decision table for committing an aggregate.
    ///
    /// | flags             | price | Reject policy | Allow policy |
    /// |-------------------|-------|---------------|--------------|
    /// | OK                | > 0   | commit        | commit       |
    /// | OK / STALE        | 0     | reject        | reject       |
    /// | STALE             | > 0   | reject        | commit       |
    /// | LOW_QUORUM        | any   | reject        | reject       |
    /// | DEVIANT_VS_TWAP   | any   | reject        | reject       |
    pub fn decide(&self, flags: AggregateFlags, price: Price) -> Admission {
        if flags.contains(AggregateFlags::LOW_QUORUM) || flags.contains(AggregateFlags::DEVIANT_VS_TWAP) {
            return Admission::Reject(flags.primary_reason());
        }
        if flags.contains(AggregateFlags::STALE) && self.stale_policy == StaleCommitPolicy::Reject {
            return Admission::Reject(ReasonCode::Stale);
        }
        if price.is_zero() {
            return Admission::Reject(ReasonCode::ZeroPrice);
        }
        Admission::Commit
    }
}
