use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

use super::error::IntervalError;
use super::interval::Interval;
use super::tid::TID;

/// A single set of calibration constants.
///
/// CalibrationData is identified by its calibration ID and the range of events [first_id, last_id]
/// it is valid for. `data` holds one value per channel, `fit_parameters` optionally holds the
/// parameters of the fit which produced the value. Channels which are not present fall back
/// to the default of the consumer. The timestamp (seconds since the unix epoch) orders records
/// inserted for overlapping ranges: the most recent one wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    pub calibration_id: String,
    pub first_id: TID,
    pub last_id: TID,
    pub author: String,
    pub comment: String,
    pub timestamp: i64,
    pub data: BTreeMap<u32, f64>,
    pub fit_parameters: BTreeMap<u32, Vec<f64>>,
}

impl Default for CalibrationData {
    fn default() -> Self {
        Self {
            calibration_id: String::new(),
            first_id: TID::default(),
            last_id: TID::default(),
            author: String::new(),
            comment: String::new(),
            timestamp: 0,
            data: BTreeMap::new(),
            fit_parameters: BTreeMap::new(),
        }
    }
}

impl CalibrationData {
    /// Create an empty record for the given ID and range, stamped with the current time
    pub fn new(calibration_id: &str, first_id: TID, last_id: TID) -> Self {
        Self {
            calibration_id: calibration_id.to_string(),
            first_id,
            last_id,
            timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: &str) -> Self {
        self.author = author.to_string();
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = comment.to_string();
        self
    }

    /// Records are Monte-Carlo data if either bound is flagged
    pub fn is_mc(&self) -> bool {
        self.first_id.is_mc() || self.last_id.is_mc()
    }

    /// The validity interval. Fails for insane ranges.
    pub fn range(&self) -> Result<Interval<TID>, IntervalError> {
        Interval::new(self.first_id, self.last_id)
    }

    /// Get the value of a channel, or the given default if the channel is not present
    pub fn value_or(&self, channel: u32, default: f64) -> f64 {
        self.data.get(&channel).copied().unwrap_or(default)
    }
}

impl Display for CalibrationData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CalibrationData '{}' [{} -> {}] by '{}' at {}: {} values, {} fit parameter sets",
            self.calibration_id,
            self.first_id,
            self.last_id,
            self.author,
            self.timestamp,
            self.data.len(),
            self.fit_parameters.len()
        )
    }
}
