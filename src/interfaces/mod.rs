pub mod clock;
pub mod event_producer;
