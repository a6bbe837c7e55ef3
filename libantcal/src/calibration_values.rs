use fxhash::FxHashMap;

use super::data_manager::{DataManager, Validity};
use super::error::DataManagerError;
use super::tid::TID;

/// A per-channel table of calibration values as used while reconstructing events.
///
/// Channels without a stored value, or all channels if no data applies to the current event,
/// use the default value. The table is refreshed from the [`DataManager`] only when an event
/// leaves the validity window of the last update.
#[derive(Debug, Clone)]
pub struct CalibrationValues {
    calibration_id: String,
    default_value: f64,
    values: FxHashMap<u32, f64>,
    validity: Option<Validity>,
}

impl CalibrationValues {
    pub fn new(calibration_id: &str, default_value: f64) -> Self {
        Self {
            calibration_id: calibration_id.to_string(),
            default_value,
            values: FxHashMap::default(),
            validity: None,
        }
    }

    pub fn calibration_id(&self) -> &str {
        &self.calibration_id
    }

    pub fn default_value(&self) -> f64 {
        self.default_value
    }

    /// True if no data was found at the last update, so every channel uses the default
    pub fn is_default_only(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the value of a channel, falling back to the default
    pub fn value(&self, channel: u32) -> f64 {
        self.values
            .get(&channel)
            .copied()
            .unwrap_or(self.default_value)
    }

    /// True if the event lies outside the window of the last update
    pub fn needs_update(&self, tid: &TID) -> bool {
        self.validity.map_or(true, |validity| !validity.contains(tid))
    }

    /// Refresh the values for the event tid if required. Returns true if the table was reloaded.
    pub fn update(&mut self, manager: &mut DataManager, tid: &TID) -> Result<bool, DataManagerError> {
        if !self.needs_update(tid) {
            return Ok(false);
        }

        let (data, validity) = manager.get_data_with_validity(&self.calibration_id, tid)?;
        self.values.clear();
        match data {
            Some(cdata) => self.values.extend(cdata.data.iter().map(|(ch, v)| (*ch, *v))),
            None => spdlog::warn!(
                "Could not find calibration data for {} at {tid}, using default {}",
                self.calibration_id,
                self.default_value
            ),
        }
        self.validity = Some(validity);
        Ok(true)
    }
}
