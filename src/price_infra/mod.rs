pub mod admission;
pub mod aggregator;
pub mod connectors;
pub mod fallback;
pub mod history;
pub mod median;
pub mod registry;
pub mod twap;
