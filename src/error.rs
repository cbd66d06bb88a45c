use thiserror::Error;
use crate::price_infra::admission::AggregateFlags;
use crate::types::ids::{OperatorId, SourceId};
use crate::types::timestamp::Timestamp;

#[derive(Error, Debug)]
pub enum Error {
    // Source Errors
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Index breakdown unavailable: {0}")]
    IndexUnavailable(String),

    // Registry Errors
    #[error("Source already active: {0}")]
    SourceAlreadyActive(SourceId),

    #[error("Source not active: {0}")]
    SourceNotActive(SourceId),

    #[error("Source registry full: capacity={capacity}")]
    RegistryFull { capacity: usize },

    #[error("Removal would break quorum: active={active}, min_quorum={min_quorum}")]
    QuorumViolation {
        active: usize,
        min_quorum: u8,
    },

    // Parameter Errors
    #[error("Invalid {parameter}: {value} (allowed {min}..={max})")]
    InvalidParameter {
        parameter: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    // Bootstrap Errors
    #[error("Aggregator already bootstrapped")]
    AlreadyBootstrapped,

    #[error("Seed timestamp {timestamp} is ahead of now ({now})")]
    FutureTimestamp {
        timestamp: Timestamp,
        now: Timestamp,
    },

    #[error("Price must be greater than zero")]
    ZeroPrice,

    // Admission Errors
    #[error("Price update rejected: flags={flags}, sources_used={sources_used}")]
    UpdateRejected {
        flags: AggregateFlags,
        sources_used: usize,
    },

    #[error("Non-monotonic commit: timestamp={timestamp}, last_update={last_update}")]
    NonMonotonicTimestamp {
        timestamp: Timestamp,
        last_update: Timestamp,
    },

    // Authorization Errors
    #[error("Unauthorized operator: {0}")]
    Unauthorized(OperatorId),

    #[error("Cannot revoke the last authorized operator")]
    LastOperator,

    // Invariant Errors
    #[error("Invariant violation: {0}")]
    InvariantViolation(InvariantViolation),

    // System Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub details: String,
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.details)
    }
}
