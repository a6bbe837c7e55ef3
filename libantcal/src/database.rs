use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use super::calibration_data::CalibrationData;
use super::error::DataBaseError;
use super::interval::Interval;
use super::on_disk_layout::{DataRange, OnDiskLayout, StorageType};
use super::tid::TID;

/// How a record is inserted into the DataBase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddMode {
    /// Replace the time independent default (or MC) record
    AsDefault,
    /// The record is valid from its first ID until superseded by a later insertion
    RightOpen,
    /// The record is valid exactly for [first ID, last ID]
    StrictRange,
}

impl FromStr for AddMode {
    type Err = DataBaseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::AsDefault),
            "rightopen" => Ok(Self::RightOpen),
            "strict" => Ok(Self::StrictRange),
            _ => Err(DataBaseError::BadAddMode(s.to_string())),
        }
    }
}

/// The answer to a point query
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub data: CalibrationData,
    /// The stored range the data was found in. None if the data came from the default or MC slot
    pub active_range: Option<Interval<TID>>,
    /// The smallest stored range start after the query point
    pub next_change_point: Option<TID>,
}

/// DataBase stores CalibrationData on disk using the [`OnDiskLayout`].
///
/// Ranged data may overlap. A query picks among all ranges containing the point the record
/// with the greatest timestamp. Equal timestamps prefer the narrower range, then the later start,
/// then the greater folder name, so the answer never depends on directory listing order.
///
/// Inserting a range claims its interval verbatim. Older records which only partially overlap the
/// new range are narrowed so that their stored range no longer intersects it; older records
/// enclosing or enclosed by the new range are kept and lose by timestamp. Open ranges are closed
/// by any newer insertion starting after them. Records are never removed, except when a record with
/// an identical range replaces them.
///
/// Every folder is written under a hidden staging name and renamed into place, so an interrupted
/// write never leaves a half written folder in the layout.
#[derive(Debug)]
pub struct DataBase {
    layout: OnDiskLayout,
}

impl DataBase {
    pub fn new(calibration_data_folder: &Path, enable_caching: bool) -> Self {
        Self {
            layout: OnDiskLayout::new(calibration_data_folder, enable_caching),
        }
    }

    pub fn layout(&self) -> &OnDiskLayout {
        &self.layout
    }

    /// Get the data valid at the given point.
    ///
    /// Returns Ok(None) if neither a range nor the default (or MC, for MC points) has data.
    pub fn get_item(&self, calibration_id: &str, point: &TID) -> Result<Option<Item>, DataBaseError> {
        if point.is_mc() {
            // MC is time independent; fall back to the default if there is no MC data
            let data = match self.get_default(calibration_id, true)? {
                Some(data) => Some(data),
                None => self.get_default(calibration_id, false)?,
            };
            return Ok(data.map(|data| Item {
                data,
                active_range: None,
                next_change_point: None,
            }));
        }

        let ranges = self.layout.get_data_ranges(calibration_id)?;
        let next_change_point = ranges
            .iter()
            .map(|r| r.range.start())
            .filter(|start| start > point)
            .min();

        let mut best: Option<(CalibrationData, &DataRange)> = None;
        for range in ranges.iter().filter(|r| r.range.contains(point)) {
            let data = self.load_range(calibration_id, range)?;
            let is_better = match &best {
                Some((best_data, best_range)) => {
                    precedence(&data, range) > precedence(best_data, best_range)
                }
                None => true,
            };
            if is_better {
                best = Some((data, range));
            }
        }

        if let Some((data, range)) = best {
            return Ok(Some(Item {
                data,
                active_range: Some(range.range),
                next_change_point,
            }));
        }

        Ok(self
            .get_default(calibration_id, false)?
            .map(|data| Item {
                data,
                active_range: None,
                next_change_point,
            }))
    }

    /// Get the default (mc = false) or MC (mc = true) record
    pub fn get_default(&self, calibration_id: &str, mc: bool) -> Result<Option<CalibrationData>, DataBaseError> {
        self.load_file(calibration_id, &self.layout.get_default_file(calibration_id, mc))
    }

    /// Add a record using the given mode
    pub fn add_item(&self, cdata: &CalibrationData, mode: AddMode) -> Result<(), DataBaseError> {
        validate_calibration_id(&cdata.calibration_id)?;
        let range = cdata.range()?;
        if cdata.is_mc() && mode != AddMode::AsDefault {
            return Err(DataBaseError::RangedMC(cdata.calibration_id.clone()));
        }

        // never plan a write on top of a stale scan
        self.layout.invalidate(&cdata.calibration_id);

        let result = match mode {
            AddMode::AsDefault => self.write_default(cdata),
            AddMode::StrictRange => self.insert_range(cdata.clone(), range),
            AddMode::RightOpen => {
                let mut stored = cdata.clone();
                stored.last_id = TID::max_with_flags(range.start().flags);
                let open_range = stored.range()?;
                self.insert_range(stored, open_range)
            }
        };

        self.layout.invalidate(&cdata.calibration_id);
        result
    }

    /// All calibration IDs, sorted by name
    pub fn get_calibration_ids(&self) -> Result<Vec<String>, DataBaseError> {
        Ok(self.layout.get_calibration_ids()?)
    }

    /// Number of stored records of the calibration ID (ranges, default and MC)
    pub fn get_number_of_calibration_data(&self, calibration_id: &str) -> Result<usize, DataBaseError> {
        let mut count = self.layout.get_data_ranges(calibration_id)?.len();
        for mc in [false, true] {
            if self.layout.get_default_file(calibration_id, mc).exists() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// All stored ranges of the calibration ID, sorted by start
    pub fn get_data_ranges(&self, calibration_id: &str) -> Result<Vec<DataRange>, DataBaseError> {
        Ok(self.layout.get_data_ranges(calibration_id)?)
    }

    /// The sorted, de-duplicated starts of all stored ranges
    pub fn get_change_points(&self, calibration_id: &str) -> Result<Vec<TID>, DataBaseError> {
        let mut points: Vec<TID> = self
            .layout
            .get_data_ranges(calibration_id)?
            .iter()
            .map(|r| r.range.start())
            .collect();
        points.sort();
        points.dedup();
        Ok(points)
    }

    /// Insert a ranged record claiming new_range, narrowing older overlapping records
    fn insert_range(&self, stored: CalibrationData, new_range: Interval<TID>) -> Result<(), DataBaseError> {
        let calibration_id = stored.calibration_id.as_str();
        let existing = self.layout.get_data_ranges(calibration_id)?;

        let mut occupied: Vec<Interval<TID>> = existing.iter().map(|r| r.range).collect();
        occupied.push(new_range);

        let mut rewrites: Vec<(&DataRange, Interval<TID>, CalibrationData)> = Vec::new();
        for old in existing.iter() {
            if old.range == new_range || !old.range.overlaps(&new_range) {
                continue;
            }
            let old_data = self.load_range(calibration_id, old)?;
            if old_data.timestamp > stored.timestamp {
                spdlog::debug!(
                    "Keeping {} of {calibration_id} as it is newer than the inserted {}",
                    old.range,
                    new_range
                );
                continue;
            }
            let narrowed = match narrow(&old.range, &new_range)? {
                Some(n) => n,
                None => continue,
            };
            if occupied.contains(&narrowed) {
                spdlog::warn!(
                    "Cannot narrow {} of {calibration_id} to {} as it is already occupied, keeping it",
                    old.range,
                    narrowed
                );
                continue;
            }
            occupied.push(narrowed);
            rewrites.push((old, narrowed, old_data));
        }

        let target = self.layout.get_range_folder(calibration_id, &new_range);
        self.publish_folder(&target, &stored)?;
        spdlog::info!(
            "Added {} for {calibration_id} at {}",
            new_range,
            self.layout.remove_calibration_data_folder(&target).display()
        );

        for (old, narrowed, mut old_data) in rewrites {
            old_data.first_id = narrowed.start();
            old_data.last_id = narrowed.stop();
            self.publish_folder(&self.layout.get_range_folder(calibration_id, &narrowed), &old_data)?;
            self.retire_folder(&old.folder_path)?;
            spdlog::info!("Narrowed {} of {calibration_id} to {}", old.range, narrowed);
        }
        Ok(())
    }

    /// Replace the default or MC data file
    fn write_default(&self, cdata: &CalibrationData) -> Result<(), DataBaseError> {
        let target = self
            .layout
            .get_default_file(&cdata.calibration_id, cdata.is_mc());
        let folder = target
            .parent()
            .ok_or_else(|| DataBaseError::BadPath(target.clone()))?;
        std::fs::create_dir_all(folder)?;
        let staging = self.layout.make_hidden_path(folder, "staging");
        write_data_file(&staging, cdata)?;
        std::fs::rename(&staging, &target)?;
        spdlog::info!(
            "Set {} data of {}",
            if cdata.is_mc() { "MC" } else { "default" },
            cdata.calibration_id
        );
        Ok(())
    }

    /// Publish the data as the range folder target.
    ///
    /// A new folder is written under a staging name and renamed into place. An existing folder
    /// stays listed the whole time: only its data file is replaced by a rename.
    fn publish_folder(&self, target: &Path, cdata: &CalibrationData) -> Result<(), DataBaseError> {
        if target.is_dir() {
            let staging = self.layout.make_hidden_path(target, "staging");
            write_data_file(&staging, cdata)?;
            std::fs::rename(&staging, self.layout.data_file_in(target))?;
            return Ok(());
        }

        let parent = target
            .parent()
            .ok_or_else(|| DataBaseError::BadPath(target.to_path_buf()))?;
        std::fs::create_dir_all(parent)?;

        let staging = self.layout.make_hidden_path(parent, "staging");
        std::fs::create_dir(&staging)?;
        write_data_file(&self.layout.data_file_in(&staging), cdata)?;
        std::fs::rename(&staging, target)?;
        Ok(())
    }

    /// Take a folder out of the layout and delete it
    fn retire_folder(&self, folder: &Path) -> Result<(), DataBaseError> {
        let parent = folder
            .parent()
            .ok_or_else(|| DataBaseError::BadPath(folder.to_path_buf()))?;
        let retired = self.layout.make_hidden_path(parent, "retired");
        std::fs::rename(folder, &retired)?;
        std::fs::remove_dir_all(&retired)?;
        Ok(())
    }

    /// Load the data of a listed range. The file must exist.
    fn load_range(&self, calibration_id: &str, range: &DataRange) -> Result<CalibrationData, DataBaseError> {
        let path = self.layout.get_range_file(range);
        self.load_file(calibration_id, &path)?
            .ok_or(DataBaseError::MissingData(path))
    }

    /// Load a data file. Ok(None) if the file does not exist, Err if it cannot be parsed.
    fn load_file(&self, calibration_id: &str, path: &Path) -> Result<Option<CalibrationData>, DataBaseError> {
        if !path.exists() {
            return Ok(None);
        }
        let yaml_str = std::fs::read_to_string(path)?;
        let cdata: CalibrationData = serde_yaml::from_str(&yaml_str)
            .map_err(|e| DataBaseError::CorruptData(path.to_path_buf(), e))?;
        if cdata.calibration_id != calibration_id {
            return Err(DataBaseError::MismatchedID(
                cdata.calibration_id,
                calibration_id.to_string(),
            ));
        }
        Ok(Some(cdata))
    }
}

/// Ordering of candidate ranges containing a query point; the greatest wins
fn precedence<'a>(data: &CalibrationData, range: &'a DataRange) -> (i64, Reverse<u64>, TID, &'a Path) {
    let width = range.range.stop().ordinal() - range.range.start().ordinal();
    (data.timestamp, Reverse(width), range.range.start(), range.folder_path.as_path())
}

/// Compute the narrowed range of an existing range overlapped by a newly inserted one.
///
/// None means the old range encloses or is enclosed by the new one and is kept as is.
fn narrow(old: &Interval<TID>, new: &Interval<TID>) -> Result<Option<Interval<TID>>, DataBaseError> {
    if old.start() < new.start() && (old.stop().is_open_end() || old.stop() <= new.stop()) {
        // overlapped on the right side, or an open end closed by a later start
        Ok(Some(Interval::new(old.start(), new.start().prev())?))
    } else if old.start() >= new.start() && old.stop() > new.stop() {
        // overlapped on the left side
        Ok(Some(Interval::new(new.stop().next(), old.stop())?))
    } else {
        Ok(None)
    }
}

fn validate_calibration_id(calibration_id: &str) -> Result<(), DataBaseError> {
    if calibration_id.is_empty()
        || calibration_id.starts_with('.')
        || calibration_id.contains(['/', '\\'])
    {
        return Err(DataBaseError::InvalidCalibrationID(calibration_id.to_string()));
    }
    Ok(())
}

fn write_data_file(path: &Path, cdata: &CalibrationData) -> Result<(), DataBaseError> {
    let yaml_str = serde_yaml::to_string(cdata)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_data(id: &str, first: u32, last: u32, timestamp: i64) -> CalibrationData {
        let mut cdata = CalibrationData::new(id, TID::new(0, first), TID::new(0, last));
        cdata.timestamp = timestamp;
        cdata.data.insert(0, 1.0);
        cdata.data.insert(1, 2.0);
        cdata
    }

    fn query(db: &DataBase, id: &str, lower: u32) -> Option<i64> {
        db.get_item(id, &TID::new(0, lower))
            .unwrap()
            .map(|item| item.data.timestamp)
    }

    fn fill_fixture(db: &DataBase) {
        let ranges = [(0, 16), (4, 4), (2, 8), (3, 6), (5, 7), (13, 20), (22, 24), (14, 14)];
        for (ts, (first, last)) in ranges.into_iter().enumerate() {
            db.add_item(&make_data("1", first, last, ts as i64), AddMode::StrictRange)
                .unwrap();
        }
    }

    #[test]
    fn test_overlapping_fixture() {
        let tmp = tempfile::tempdir().unwrap();
        let db = DataBase::new(tmp.path(), false);
        fill_fixture(&db);

        assert_eq!(query(&db, "1", 0), Some(0));
        assert_eq!(query(&db, "1", 1), Some(0));
        assert_eq!(query(&db, "1", 3), Some(3));
        assert_eq!(query(&db, "1", 4), Some(3));
        assert_eq!(query(&db, "1", 5), Some(4));
        assert_eq!(query(&db, "1", 14), Some(7));
        assert_eq!(query(&db, "1", 21), None);
        assert_eq!(query(&db, "1", 23), Some(6));
        assert_eq!(query(&db, "1", 29), None);

        assert_eq!(db.get_number_of_calibration_data("1").unwrap(), 8);
        assert_eq!(db.get_calibration_ids().unwrap(), vec![String::from("1")]);

        // [3,6] was narrowed by [5,7], [0,16] by [13,20]
        let item = db.get_item("1", &TID::new(0, 4)).unwrap().unwrap();
        assert_eq!(
            item.active_range,
            Some(Interval::new(TID::new(0, 3), TID::new(0, 4)).unwrap())
        );
        assert_eq!(item.data.last_id, TID::new(0, 4));
        let item = db.get_item("1", &TID::new(0, 12)).unwrap().unwrap();
        assert_eq!(item.data.last_id, TID::new(0, 12));
    }

    #[test]
    fn test_reinsert_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let db = DataBase::new(tmp.path(), false);
        fill_fixture(&db);
        let before: Vec<Option<i64>> = (0..30).map(|i| query(&db, "1", i)).collect();

        db.add_item(&make_data("1", 3, 6, 3), AddMode::StrictRange).unwrap();
        db.add_item(&make_data("1", 22, 24, 6), AddMode::StrictRange).unwrap();

        let after: Vec<Option<i64>> = (0..30).map(|i| query(&db, "1", i)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_next_change_point() {
        let tmp = tempfile::tempdir().unwrap();
        let db = DataBase::new(tmp.path(), false);
        db.add_item(&make_data("Gains", 0, 9, 1), AddMode::StrictRange).unwrap();
        db.add_item(&make_data("Gains", 20, 29, 2), AddMode::StrictRange).unwrap();
        db.add_item(&make_data("Gains", 10, 15, 3), AddMode::StrictRange).unwrap();

        let item = db.get_item("Gains", &TID::new(0, 5)).unwrap().unwrap();
        assert_eq!(item.data.timestamp, 1);
        assert_eq!(item.next_change_point, Some(TID::new(0, 10)));

        let item = db.get_item("Gains", &TID::new(0, 12)).unwrap().unwrap();
        assert_eq!(item.data.timestamp, 3);
        assert_eq!(item.next_change_point, Some(TID::new(0, 20)));

        assert!(db.get_item("Gains", &TID::new(0, 17)).unwrap().is_none());

        let item = db.get_item("Gains", &TID::new(0, 25)).unwrap().unwrap();
        assert_eq!(item.next_change_point, None);

        assert_eq!(
            db.get_change_points("Gains").unwrap(),
            vec![TID::new(0, 0), TID::new(0, 10), TID::new(0, 20)]
        );
    }

    #[test]
    fn test_default_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let db = DataBase::new(tmp.path(), false);
        db.add_item(&make_data("Gains", 10, 20, 1), AddMode::StrictRange).unwrap();
        assert!(db.get_item("Gains", &TID::new(0, 5)).unwrap().is_none());

        db.add_item(&make_data("Gains", 0, 0, 2), AddMode::AsDefault).unwrap();
        let item = db.get_item("Gains", &TID::new(0, 5)).unwrap().unwrap();
        assert_eq!(item.data.timestamp, 2);
        assert_eq!(item.active_range, None);
        assert_eq!(item.next_change_point, Some(TID::new(0, 10)));

        // MC points use the MC slot, falling back to the default
        let item = db.get_item("Gains", &TID::new_mc(0, 15)).unwrap().unwrap();
        assert_eq!(item.data.timestamp, 2);

        let mut mc = CalibrationData::new("Gains", TID::new_mc(0, 0), TID::new_mc(0, 0));
        mc.timestamp = 3;
        db.add_item(&mc, AddMode::AsDefault).unwrap();
        let item = db.get_item("Gains", &TID::new_mc(0, 15)).unwrap().unwrap();
        assert_eq!(item.data.timestamp, 3);
        assert_eq!(db.get_number_of_calibration_data("Gains").unwrap(), 3);
    }

    #[test]
    fn test_right_open() {
        let tmp = tempfile::tempdir().unwrap();
        let db = DataBase::new(tmp.path(), false);
        db.add_item(&make_data("Time", 10, 10, 1), AddMode::RightOpen).unwrap();
        assert_eq!(query(&db, "Time", 5), None);
        assert_eq!(query(&db, "Time", 1000), Some(1));

        // a later open range closes the previous one
        db.add_item(&make_data("Time", 50, 50, 2), AddMode::RightOpen).unwrap();
        assert_eq!(query(&db, "Time", 30), Some(1));
        assert_eq!(query(&db, "Time", 60), Some(2));
        let item = db.get_item("Time", &TID::new(0, 30)).unwrap().unwrap();
        assert_eq!(item.data.last_id, TID::new(0, 49));
        assert_eq!(item.next_change_point, Some(TID::new(0, 50)));

        // so does a strict range starting after it
        db.add_item(&make_data("Time", 100, 120, 3), AddMode::StrictRange).unwrap();
        assert_eq!(query(&db, "Time", 99), Some(2));
        assert_eq!(query(&db, "Time", 110), Some(3));
        assert_eq!(query(&db, "Time", 130), None);

        // an open range starting before everything shadows the older ranges by timestamp
        db.add_item(&make_data("Time", 5, 5, 4), AddMode::RightOpen).unwrap();
        assert_eq!(query(&db, "Time", 30), Some(4));
        assert_eq!(query(&db, "Time", 110), Some(4));
        assert_eq!(db.get_number_of_calibration_data("Time").unwrap(), 4);
    }

    #[test]
    fn test_newer_data_is_not_narrowed() {
        let tmp = tempfile::tempdir().unwrap();
        let db = DataBase::new(tmp.path(), false);
        db.add_item(&make_data("Gains", 0, 10, 5), AddMode::StrictRange).unwrap();
        db.add_item(&make_data("Gains", 8, 20, 1), AddMode::StrictRange).unwrap();
        assert_eq!(query(&db, "Gains", 9), Some(5));
        assert_eq!(query(&db, "Gains", 15), Some(1));
    }

    #[test]
    fn test_insane_range_always_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let db = DataBase::new(tmp.path(), false);
        for mode in [AddMode::StrictRange, AddMode::RightOpen, AddMode::AsDefault] {
            for _ in 0..5 {
                let result = db.add_item(&make_data("Gains", 8, 2, 0), mode);
                assert!(matches!(result, Err(DataBaseError::InsaneRange(_))));
            }
        }
        assert_eq!(db.get_number_of_calibration_data("Gains").unwrap(), 0);
    }

    #[test]
    fn test_ranged_mc_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let db = DataBase::new(tmp.path(), false);
        let mut cdata = CalibrationData::new("Gains", TID::new_mc(0, 0), TID::new_mc(0, 100));
        cdata.data.insert(0, 3.0);
        for mode in [AddMode::StrictRange, AddMode::RightOpen] {
            assert!(matches!(db.add_item(&cdata, mode), Err(DataBaseError::RangedMC(_))));
        }
        assert_eq!(db.get_number_of_calibration_data("Gains").unwrap(), 0);

        // the MC slot is the place for it
        db.add_item(&cdata, AddMode::AsDefault).unwrap();
        let item = db.get_item("Gains", &TID::new_mc(0, 50)).unwrap().unwrap();
        assert_eq!(item.data.value_or(0, 0.0), 3.0);
    }

    #[test]
    fn test_replace_range_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let db = DataBase::new(tmp.path(), false);
        db.add_item(&make_data("Gains", 0, 10, 1), AddMode::StrictRange).unwrap();
        let mut newer = make_data("Gains", 0, 10, 2);
        newer.data.insert(0, 5.0);
        db.add_item(&newer, AddMode::StrictRange).unwrap();

        let item = db.get_item("Gains", &TID::new(0, 5)).unwrap().unwrap();
        assert_eq!(item.data.timestamp, 2);
        assert_eq!(item.data.value_or(0, 0.0), 5.0);
        assert_eq!(db.get_number_of_calibration_data("Gains").unwrap(), 1);

        // no staging or retired leftovers, next to or inside the range folder
        let ranges = db.layout().get_folder("Gains", StorageType::DataRanges);
        let names = |dir: &Path| -> Vec<String> {
            std::fs::read_dir(dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect()
        };
        let folders = names(&ranges);
        assert_eq!(folders.len(), 1);
        assert_eq!(names(&ranges.join(&folders[0])), vec!["data.yml".to_string()]);
    }

    #[test]
    fn test_invalid_id() {
        let tmp = tempfile::tempdir().unwrap();
        let db = DataBase::new(tmp.path(), false);
        for id in ["", ".hidden", "a/b"] {
            let result = db.add_item(&make_data(id, 0, 1, 0), AddMode::StrictRange);
            assert!(matches!(result, Err(DataBaseError::InvalidCalibrationID(_))));
        }
    }

    #[test]
    fn test_corrupt_data() {
        let tmp = tempfile::tempdir().unwrap();
        let db = DataBase::new(tmp.path(), false);
        db.add_item(&make_data("Gains", 0, 10, 1), AddMode::StrictRange).unwrap();
        let range = db.get_data_ranges("Gains").unwrap().remove(0);
        std::fs::write(db.layout().get_range_file(&range), "data: [not, a, map").unwrap();

        let result = db.get_item("Gains", &TID::new(0, 5));
        assert!(matches!(result, Err(DataBaseError::CorruptData(_, _))));
        // absence is not an error
        assert!(db.get_item("Other", &TID::new(0, 5)).unwrap().is_none());
    }

    #[test]
    fn test_add_mode_from_str() {
        assert_eq!("strict".parse::<AddMode>().unwrap(), AddMode::StrictRange);
        assert_eq!("rightopen".parse::<AddMode>().unwrap(), AddMode::RightOpen);
        assert_eq!("default".parse::<AddMode>().unwrap(), AddMode::AsDefault);
        assert!("sometimes".parse::<AddMode>().is_err());
    }
}
