use fxhash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use super::error::LayoutError;
use super::interval::Interval;
use super::tid::TID;

const DEFAULT_FOLDER_NAME: &str = "default";
const MC_FOLDER_NAME: &str = "mc";
const RANGES_FOLDER_NAME: &str = "ranges";
const DATA_FILE_NAME: &str = "data.yml";
const RANGE_SEPARATOR: char = '_';

/// The three classes of calibration data stored per calibration ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    DataDefault,
    DataRanges,
    MC,
}

/// A stored range together with the folder holding its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRange {
    pub range: Interval<TID>,
    pub folder_path: PathBuf,
}

/// OnDiskLayout maps calibration IDs and validity ranges onto the folder structure
///
/// ```text
/// <calibration_data_folder>
/// |---- <calibration ID>
/// |    |---- default/data.yml
/// |    |---- mc/data.yml
/// |    |---- ranges
/// |    |    |---- <start>_<stop>/data.yml
/// ```
///
/// Folder entries starting with a dot are staging or retired folders of an unfinished write
/// and are never part of the layout.
///
/// If caching is enabled, the folder scan of [`OnDiskLayout::get_data_ranges`] is done once per
/// calibration ID. This is only correct if nobody else writes to the folder while this layout
/// is alive: the cache is not synchronized and never sees changes made by other instances or
/// processes. Writes through this layout drop the affected entry.
#[derive(Debug)]
pub struct OnDiskLayout {
    calibration_data_folder: PathBuf,
    enable_caching: bool,
    cached_ranges: RefCell<FxHashMap<String, Vec<DataRange>>>,
    staging_counter: Cell<u64>,
}

impl OnDiskLayout {
    pub fn new(calibration_data_folder: &Path, enable_caching: bool) -> Self {
        Self {
            calibration_data_folder: calibration_data_folder.to_path_buf(),
            enable_caching,
            cached_ranges: RefCell::new(FxHashMap::default()),
            staging_counter: Cell::new(0),
        }
    }

    pub fn calibration_data_folder(&self) -> &Path {
        &self.calibration_data_folder
    }

    pub fn is_caching_enabled(&self) -> bool {
        self.enable_caching
    }

    /// Get the folder of one of the storage classes of a calibration ID
    pub fn get_folder(&self, calibration_id: &str, storage: StorageType) -> PathBuf {
        let id_folder = self.calibration_data_folder.join(calibration_id);
        match storage {
            StorageType::DataDefault => id_folder.join(DEFAULT_FOLDER_NAME),
            StorageType::MC => id_folder.join(MC_FOLDER_NAME),
            StorageType::DataRanges => id_folder.join(RANGES_FOLDER_NAME),
        }
    }

    /// Get the data file of the default or MC slot
    pub fn get_default_file(&self, calibration_id: &str, mc: bool) -> PathBuf {
        let storage = if mc {
            StorageType::MC
        } else {
            StorageType::DataDefault
        };
        self.get_folder(calibration_id, storage).join(DATA_FILE_NAME)
    }

    /// Get the folder which holds the data valid for the given range
    pub fn get_range_folder(&self, calibration_id: &str, range: &Interval<TID>) -> PathBuf {
        self.get_folder(calibration_id, StorageType::DataRanges)
            .join(make_range_folder_name(range))
    }

    /// Get the data file of a stored range
    pub fn get_range_file(&self, range: &DataRange) -> PathBuf {
        range.folder_path.join(DATA_FILE_NAME)
    }

    /// Get the name of the data file within a folder
    pub fn data_file_in(&self, folder: &Path) -> PathBuf {
        folder.join(DATA_FILE_NAME)
    }

    /// Strip the calibration data folder from a path, used for readable log messages
    pub fn remove_calibration_data_folder<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.calibration_data_folder)
            .unwrap_or(path)
    }

    /// Generate a unique hidden path next to the given parent folder
    pub fn make_hidden_path(&self, parent: &Path, kind: &str) -> PathBuf {
        let count = self.staging_counter.get();
        self.staging_counter.set(count + 1);
        let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
        parent.join(format!(".{kind}-{}-{nanos}-{count}", std::process::id()))
    }

    /// Get all stored ranges of a calibration ID, sorted by start (then stop).
    ///
    /// A calibration ID without any ranges gives an empty list.
    pub fn get_data_ranges(&self, calibration_id: &str) -> Result<Vec<DataRange>, LayoutError> {
        if self.enable_caching {
            if let Some(ranges) = self.cached_ranges.borrow().get(calibration_id) {
                spdlog::debug!("Using cached ranges for {calibration_id}");
                return Ok(ranges.clone());
            }
        }

        let ranges = self.scan_data_ranges(calibration_id)?;

        if self.enable_caching {
            self.cached_ranges
                .borrow_mut()
                .insert(calibration_id.to_string(), ranges.clone());
        }
        Ok(ranges)
    }

    /// Drop the cached ranges of a calibration ID, for example after writing to it
    pub fn invalidate(&self, calibration_id: &str) {
        self.cached_ranges.borrow_mut().remove(calibration_id);
    }

    /// Get all calibration IDs present in the calibration data folder, sorted by name
    pub fn get_calibration_ids(&self) -> Result<Vec<String>, LayoutError> {
        let mut ids: Vec<String> = Vec::new();
        if !self.calibration_data_folder.exists() {
            return Ok(ids);
        }
        for item in self.calibration_data_folder.read_dir()? {
            let item = item?;
            if !item.file_type()?.is_dir() {
                continue;
            }
            let name = item.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            ids.push(name);
        }
        ids.sort();
        Ok(ids)
    }

    fn scan_data_ranges(&self, calibration_id: &str) -> Result<Vec<DataRange>, LayoutError> {
        let ranges_folder = self.get_folder(calibration_id, StorageType::DataRanges);
        let mut ranges: Vec<DataRange> = Vec::new();
        if !ranges_folder.exists() {
            return Ok(ranges);
        }

        for item in ranges_folder.read_dir()? {
            let item = item?;
            if !item.file_type()?.is_dir() {
                continue;
            }
            let name = item.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            ranges.push(DataRange {
                range: parse_range_folder_name(&name)?,
                folder_path: item.path(),
            });
        }

        ranges.sort_by(|a, b| {
            (a.range.start(), a.range.stop()).cmp(&(b.range.start(), b.range.stop()))
        });
        Ok(ranges)
    }
}

/// Encode a range as folder name
pub fn make_range_folder_name(range: &Interval<TID>) -> String {
    format!(
        "{}{RANGE_SEPARATOR}{}",
        range.start().to_folder_string(),
        range.stop().to_folder_string()
    )
}

/// Decode a folder name made by [`make_range_folder_name`]
pub fn parse_range_folder_name(name: &str) -> Result<Interval<TID>, LayoutError> {
    let (start, stop) = name
        .split_once(RANGE_SEPARATOR)
        .ok_or_else(|| LayoutError::BadRangeFolder(name.to_string()))?;
    Ok(Interval::new(start.parse()?, stop.parse()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u32, stop: u32) -> Interval<TID> {
        Interval::new(TID::new(0, start), TID::new(0, stop)).unwrap()
    }

    #[test]
    fn test_range_folder_name() {
        let r = Interval::new(TID::new(1, 2), TID::max_with_flags(0)).unwrap();
        let name = make_range_folder_name(&r);
        assert_eq!(name, "00000001-00000002-00_ffffffff-ffffffff-00");
        assert_eq!(parse_range_folder_name(&name).unwrap(), r);
        assert!(parse_range_folder_name("garbage").is_err());
        // stop before start
        assert!(parse_range_folder_name("00000001-00000002-00_00000000-00000002-00").is_err());
    }

    #[test]
    fn test_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OnDiskLayout::new(tmp.path(), false);
        assert!(layout.get_data_ranges("Gains").unwrap().is_empty());

        for r in [range(5, 7), range(0, 16), range(2, 8)] {
            std::fs::create_dir_all(layout.get_range_folder("Gains", &r)).unwrap();
        }
        // unfinished writes are invisible
        let ranges_folder = layout.get_folder("Gains", StorageType::DataRanges);
        std::fs::create_dir_all(layout.make_hidden_path(&ranges_folder, "staging")).unwrap();

        let ranges = layout.get_data_ranges("Gains").unwrap();
        let starts: Vec<u32> = ranges.iter().map(|r| r.range.start().lower).collect();
        assert_eq!(starts, vec![0, 2, 5]);
        assert_eq!(layout.get_calibration_ids().unwrap(), vec![String::from("Gains")]);
        assert_eq!(
            layout.remove_calibration_data_folder(&ranges[0].folder_path),
            Path::new("Gains/ranges/00000000-00000000-00_00000000-00000010-00")
        );
    }

    #[test]
    fn test_caching_hides_new_ranges() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OnDiskLayout::new(tmp.path(), true);
        std::fs::create_dir_all(layout.get_range_folder("Gains", &range(0, 1))).unwrap();
        assert_eq!(layout.get_data_ranges("Gains").unwrap().len(), 1);

        std::fs::create_dir_all(layout.get_range_folder("Gains", &range(2, 3))).unwrap();
        assert_eq!(layout.get_data_ranges("Gains").unwrap().len(), 1);

        layout.invalidate("Gains");
        assert_eq!(layout.get_data_ranges("Gains").unwrap().len(), 2);
    }
}
