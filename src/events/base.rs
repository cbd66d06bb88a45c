use serde::{Deserialize, Serialize};
use sha2::{Sha256, Digest};
use crate::events::price::{PriceUpdated, SourceFiltered};
use crate::types::ids::EventId;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OracleEvent {
    pub event_id: EventId,
    pub event_type: EventType,
    pub version: u32,
    pub timestamp: Timestamp,
    pub sequence: u64,
    pub payload: EventPayload,
    pub checksum: String,
}

impl OracleEvent {
    pub fn new(sequence: u64, timestamp: Timestamp, payload: EventPayload) -> Self {
        let mut event = OracleEvent {
            event_id: EventId::new(),
            event_type: payload.event_type(),
            version: crate::EVENT_VERSION,
            timestamp,
            sequence,
            payload,
            checksum: String::new(),
        };
        event.checksum = event.calculate_checksum();
        event
    }

    pub fn calculate_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.event_id.0.as_bytes());
        hasher.update(self.sequence.to_le_bytes());
        hasher.update(self.timestamp.as_secs().to_le_bytes());
        hasher.update(format!("{:?}", self.event_type).as_bytes());
        match &self.payload {
            EventPayload::PriceUpdated(e) => {
                hasher.update(e.price.raw_value().to_le_bytes());
                hasher.update(e.timestamp.as_secs().to_le_bytes());
                hasher.update((e.sources_used as u64).to_le_bytes());
                hasher.update([e.flags.bits()]);
            }
            EventPayload::SourceFiltered(e) => {
                hasher.update(e.source_id.as_str().as_bytes());
                hasher.update(e.observed_price.raw_value().to_le_bytes());
                hasher.update(e.observed_timestamp.as_secs().to_le_bytes());
                hasher.update(format!("{:?}", e.reason).as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.calculate_checksum()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EventPayload {
    PriceUpdated(PriceUpdated),
    SourceFiltered(SourceFiltered),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::PriceUpdated(_) => EventType::PriceUpdated,
            EventPayload::SourceFiltered(_) => EventType::SourceFiltered,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    PriceUpdated,
    SourceFiltered,
}
