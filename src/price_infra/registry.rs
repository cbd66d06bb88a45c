//! Registered sources and their filter parameters.
//!
//! Entries are never deleted: removal clears the active flag and a later
//! `add` with the same id reactivates the slot. `total_weight` and
//! `active_count` always describe the active subset.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::config::{check_range, DEVIATION_RANGE, MAX_AGE_RANGE, WEIGHT_RANGE};
use crate::error::{Error, Result};
use crate::price_infra::connectors::PriceSource;
use crate::types::ids::SourceId;
use crate::types::timestamp::Timestamp;
use crate::MAX_SOURCES;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: SourceId,
    pub weight_bps: u32,
    pub max_age_secs: u64,
    pub max_deviation_bps: u32,
    /// Observation time of the source's last contribution to a committed aggregate.
    pub last_update: Timestamp,
    pub active: bool,
}

pub struct SourceEntry {
    pub config: SourceConfig,
    pub source: Arc<dyn PriceSource>,
}

pub struct SourceRegistry {
    entries: Vec<SourceEntry>,
    total_weight: u64,
    active_count: usize,
}

impl SourceRegistry {
    pub fn new() -> Self {
        SourceRegistry {
            entries: Vec::new(),
            total_weight: 0,
            active_count: 0,
        }
    }

    pub fn add(
        &mut self,
        id: SourceId,
        source: Arc<dyn PriceSource>,
        weight_bps: u32,
        max_age_secs: u64,
        max_deviation_bps: u32,
    ) -> Result<()> {
        let existing = self.position(&id);
        if let Some(index) = existing {
            if self.entries[index].config.active {
                return Err(Error::SourceAlreadyActive(id));
            }
        }

        check_range("weight_bps", weight_bps as u64, WEIGHT_RANGE)?;
        check_range("max_age_secs", max_age_secs, MAX_AGE_RANGE)?;
        check_range("max_deviation_bps", max_deviation_bps as u64, DEVIATION_RANGE)?;

        match existing {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.source = source;
                entry.config.weight_bps = weight_bps;
                entry.config.max_age_secs = max_age_secs;
                entry.config.max_deviation_bps = max_deviation_bps;
                entry.config.active = true;
            }
            None => {
                if self.entries.len() >= MAX_SOURCES {
                    return Err(Error::RegistryFull { capacity: MAX_SOURCES });
                }
                self.entries.push(SourceEntry {
                    config: SourceConfig {
                        id,
                        weight_bps,
                        max_age_secs,
                        max_deviation_bps,
                        last_update: Timestamp::zero(),
                        active: true,
                    },
                    source,
                });
            }
        }

        self.total_weight += weight_bps as u64;
        self.active_count += 1;
        Ok(())
    }

    /// Deactivates `id` unless that would leave fewer than `min_quorum` active sources.
    pub fn remove(&mut self, id: &SourceId, min_quorum: u8) -> Result<()> {
        let index = self.active_position(id)?;
        if self.active_count - 1 < min_quorum as usize {
            return Err(Error::QuorumViolation {
                active: self.active_count,
                min_quorum,
            });
        }

        let entry = &mut self.entries[index];
        entry.config.active = false;
        self.total_weight -= entry.config.weight_bps as u64;
        self.active_count -= 1;
        Ok(())
    }

    pub fn update_weight(&mut self, id: &SourceId, weight_bps: u32) -> Result<()> {
        let index = self.active_position(id)?;
        check_range("weight_bps", weight_bps as u64, WEIGHT_RANGE)?;

        let entry = &mut self.entries[index];
        self.total_weight = self.total_weight - entry.config.weight_bps as u64 + weight_bps as u64;
        entry.config.weight_bps = weight_bps;
        Ok(())
    }

    pub fn update_params(&mut self, id: &SourceId, max_age_secs: u64, max_deviation_bps: u32) -> Result<()> {
        let index = self.active_position(id)?;
        check_range("max_age_secs", max_age_secs, MAX_AGE_RANGE)?;
        check_range("max_deviation_bps", max_deviation_bps as u64, DEVIATION_RANGE)?;

        let entry = &mut self.entries[index];
        entry.config.max_age_secs = max_age_secs;
        entry.config.max_deviation_bps = max_deviation_bps;
        Ok(())
    }

    pub(crate) fn mark_updated(&mut self, id: &SourceId, observed_at: Timestamp) {
        if let Some(index) = self.position(id) {
            self.entries[index].config.last_update = observed_at;
        }
    }

    pub fn get(&self, id: &SourceId) -> Option<&SourceConfig> {
        self.entries.iter()
            .find(|e| &e.config.id == id)
            .map(|e| &e.config)
    }

    /// Active entries in insertion order.
    pub fn active_entries(&self) -> impl Iterator<Item = &SourceEntry> {
        self.entries.iter().filter(|e| e.config.active)
    }

    pub fn active_ids(&self) -> Vec<SourceId> {
        self.active_entries().map(|e| e.config.id.clone()).collect()
    }

    /// Every slot, active or not.
    pub fn configs(&self) -> impl Iterator<Item = &SourceConfig> {
        self.entries.iter().map(|e| &e.config)
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &SourceId) -> Option<usize> {
        self.entries.iter().position(|e| &e.config.id == id)
    }

    fn active_position(&self, id: &SourceId) -> Result<usize> {
        self.position(id)
            .filter(|&index| self.entries[index].config.active)
            .ok_or_else(|| Error::SourceNotActive(id.clone()))
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
