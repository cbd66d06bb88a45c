pub mod types;
pub mod price_infra;
pub mod events;
pub mod invariants;
pub mod error;
pub mod config;
pub mod observability;
pub mod interfaces;
pub mod controls;

// Registry slots, active or not
pub const MAX_SOURCES: usize = 49;

// Ring buffer slots
pub const HISTORY_CAPACITY: usize = 1024;

// Window behind the deviation reference price
pub const TWAP_CENTER_WINDOW_SECS: u64 = 30 * 60;

pub const BPS_DENOMINATOR: u32 = 10_000;

// Event envelope version
pub const EVENT_VERSION: u32 = 1;
