use fxhash::FxHashMap;
use std::collections::BTreeSet;
use std::path::Path;

use super::calibration_data::CalibrationData;
use super::config::Config;
use super::database::{AddMode, DataBase};
use super::error::DataManagerError;
use super::interval::Interval;
use super::tid::TID;

/// The window of events for which an answer of [`DataManager::get_data_with_validity`] holds.
///
/// The window starts at the query and ends before the next change point, or at the end of the
/// active range, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validity {
    pub query: TID,
    pub active_range: Option<Interval<TID>>,
    pub next_change_point: Option<TID>,
}

impl Validity {
    pub fn contains(&self, point: &TID) -> bool {
        if self.query.is_mc() != point.is_mc() || *point < self.query {
            return false;
        }
        let in_range = self
            .active_range
            .map_or(true, |range| range.contains(point));
        let before_change = self.next_change_point.map_or(true, |next| *point < next);
        in_range && before_change
    }
}

/// The last answer given for a calibration ID
#[derive(Debug, Clone)]
struct Memo {
    data: Option<CalibrationData>,
    validity: Validity,
}

/// DataManager is the entry point for consumers of calibration data.
///
/// It wraps the [`DataBase`] and remembers the last answer per calibration ID, so that sweeping
/// over the events of a run only touches the disk when a validity boundary is crossed. Every
/// answer records its change points (start of the active range and the next range start), which
/// consumers use to know when their calibration values must be refreshed.
///
/// With override_to_default set, only the default (or MC) slot is ever returned.
#[derive(Debug)]
pub struct DataManager {
    database: DataBase,
    override_to_default: bool,
    memos: FxHashMap<String, Memo>,
    change_points: FxHashMap<String, BTreeSet<TID>>,
}

impl DataManager {
    pub fn new(calibration_data_folder: &Path, enable_caching: bool) -> Self {
        Self {
            database: DataBase::new(calibration_data_folder, enable_caching),
            override_to_default: false,
            memos: FxHashMap::default(),
            change_points: FxHashMap::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut manager = Self::new(&config.calibration_data_folder, config.enable_caching);
        manager.set_override_to_default(config.override_to_default);
        manager
    }

    pub fn set_override_to_default(&mut self, override_to_default: bool) {
        if self.override_to_default != override_to_default {
            self.memos.clear();
        }
        self.override_to_default = override_to_default;
    }

    pub fn is_override_to_default(&self) -> bool {
        self.override_to_default
    }

    /// Get the calibration data valid for the event tid.
    ///
    /// Returns Ok(None) if there is no applicable data.
    pub fn get_data(&mut self, calibration_id: &str, tid: &TID) -> Result<Option<CalibrationData>, DataManagerError> {
        Ok(self.get_data_with_validity(calibration_id, tid)?.0)
    }

    /// Get the calibration data valid for the event tid, together with the window of events
    /// for which this answer holds.
    pub fn get_data_with_validity(
        &mut self,
        calibration_id: &str,
        tid: &TID,
    ) -> Result<(Option<CalibrationData>, Validity), DataManagerError> {
        if self.override_to_default {
            let data = match self.database.get_default(calibration_id, tid.is_mc())? {
                Some(data) => Some(data),
                None if tid.is_mc() => self.database.get_default(calibration_id, false)?,
                None => None,
            };
            let validity = Validity {
                query: *tid,
                active_range: None,
                next_change_point: None,
            };
            return Ok((data, validity));
        }

        if let Some(memo) = self.memos.get(calibration_id) {
            if memo.validity.contains(tid) {
                spdlog::debug!("Using remembered data of {calibration_id} for {tid}");
                return Ok((memo.data.clone(), memo.validity));
            }
        }

        let memo = match self.database.get_item(calibration_id, tid)? {
            Some(item) => {
                let points = self
                    .change_points
                    .entry(calibration_id.to_string())
                    .or_default();
                if let Some(range) = item.active_range {
                    points.insert(range.start());
                }
                if let Some(next) = item.next_change_point {
                    points.insert(next);
                }
                Memo {
                    data: Some(item.data),
                    validity: Validity {
                        query: *tid,
                        active_range: item.active_range,
                        next_change_point: item.next_change_point,
                    },
                }
            }
            None => {
                // nothing applies until the next stored range starts
                let next_change_point = if tid.is_mc() {
                    None
                } else {
                    self.database
                        .get_change_points(calibration_id)?
                        .into_iter()
                        .find(|start| start > tid)
                };
                Memo {
                    data: None,
                    validity: Validity {
                        query: *tid,
                        active_range: None,
                        next_change_point,
                    },
                }
            }
        };

        let answer = (memo.data.clone(), memo.validity);
        self.memos.insert(calibration_id.to_string(), memo);
        Ok(answer)
    }

    /// The change points seen so far for a calibration ID, sorted
    pub fn get_change_points(&self, calibration_id: &str) -> Vec<TID> {
        self.change_points
            .get(calibration_id)
            .map(|points| points.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Store a record. Any remembered answer for its calibration ID is dropped.
    pub fn add(&mut self, cdata: &CalibrationData, mode: AddMode) -> Result<(), DataManagerError> {
        self.memos.remove(&cdata.calibration_id);
        self.database.add_item(cdata, mode)?;
        Ok(())
    }

    pub fn get_calibration_ids(&self) -> Result<Vec<String>, DataManagerError> {
        Ok(self.database.get_calibration_ids()?)
    }

    pub fn get_number_of_calibration_ids(&self) -> Result<usize, DataManagerError> {
        Ok(self.database.get_calibration_ids()?.len())
    }

    pub fn get_number_of_calibration_data(&self, calibration_id: &str) -> Result<usize, DataManagerError> {
        Ok(self.database.get_number_of_calibration_data(calibration_id)?)
    }

    pub fn get_calibration_data_folder(&self) -> &Path {
        self.database.layout().calibration_data_folder()
    }

    pub fn database(&self) -> &DataBase {
        &self.database
    }
}
