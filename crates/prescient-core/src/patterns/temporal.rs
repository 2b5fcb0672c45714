//! Time-of-day and day-of-week activity buckets

use serde::{Deserialize, Serialize};

use super::frequency::Frequencies;

pub const HOURS_PER_DAY: usize = 24;
pub const DAYS_PER_WEEK: usize = 7;

/// 24 hourly and 7 daily buckets of action counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeModel {
    hourly: [Frequencies; HOURS_PER_DAY],
    daily: [Frequencies; DAYS_PER_WEEK],
}

impl TimeModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `action_key` in the given hour (0-23) and day (0-6, Sunday first)
    pub fn observe(&mut self, hour: u32, day: u32, action_key: &str) {
        if let Some(bucket) = self.hourly.get_mut(hour as usize) {
            bucket.observe(action_key, 1);
        }
        if let Some(bucket) = self.daily.get_mut(day as usize) {
            bucket.observe(action_key, 1);
        }
    }

    /// Distribution of actions seen in `hour`
    pub fn hourly(&self, hour: u32) -> Vec<(String, f64)> {
        self.hourly
            .get(hour as usize)
            .map(Frequencies::distribution)
            .unwrap_or_default()
    }

    /// Distribution of actions seen on `day`
    pub fn daily(&self, day: u32) -> Vec<(String, f64)> {
        self.daily
            .get(day as usize)
            .map(Frequencies::distribution)
            .unwrap_or_default()
    }

    /// Busiest hour of the day, if anything has been observed
    pub fn peak_hour(&self) -> Option<u32> {
        self.hourly
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_empty())
            .max_by_key(|(_, f)| f.total())
            .map(|(h, _)| h as u32)
    }

    pub fn total_observations(&self) -> u64 {
        self.hourly.iter().map(Frequencies::total).sum()
    }
}
