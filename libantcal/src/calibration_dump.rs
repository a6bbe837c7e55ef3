use std::collections::BTreeMap;
use std::io::Write;

use super::calibration_data::CalibrationData;
use super::database::DataBase;
use super::error::DumpError;
use super::interval::{any_contains, Interval};

/// Which records of a calibration ID are dumped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    DataRanges,
    DataDefault,
    MC,
}

/// Selection of what is dumped. Empty channel or parameter lists select everything.
///
/// Parameter index 0 is the channel value, indices 1.. are the fit parameters.
#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub kind: DumpKind,
    pub channels: Vec<Interval<u32>>,
    pub params: Vec<Interval<u32>>,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            kind: DumpKind::DataRanges,
            channels: Vec::new(),
            params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TimePoint {
    timestamp: u32,
    values: Vec<f64>,
}

/// Dump the calibration values of a calibration ID as plain text suitable for plotting.
///
/// For ranges, every channel gets a block headed by `# channel=<ch>` with one line per stored range:
/// the range start timestamp followed by the selected value and fit parameters. Blocks are
/// separated by two empty lines. The default and MC slots have no time axis, so they are dumped
/// with one line per channel: the channel followed by the selected values.
pub fn dump_calibration<W: Write>(
    database: &DataBase,
    calibration_id: &str,
    options: &DumpOptions,
    out: &mut W,
) -> Result<(), DumpError> {
    if !database
        .get_calibration_ids()?
        .iter()
        .any(|id| id == calibration_id)
    {
        return Err(DumpError::UnknownCalibrationID(calibration_id.to_string()));
    }

    let mut timeseries: BTreeMap<u32, Vec<TimePoint>> = BTreeMap::new();
    match options.kind {
        DumpKind::DataRanges => {
            let ranges = database.get_data_ranges(calibration_id)?;
            if ranges.is_empty() {
                return Err(DumpError::NoData(calibration_id.to_string()));
            }
            for range in ranges.iter() {
                let start = range.range.start();
                let item = database
                    .get_item(calibration_id, &start)?
                    .ok_or_else(|| DumpError::NoData(calibration_id.to_string()))?;
                collect(&mut timeseries, start.timestamp, &item.data, options);
            }
        }
        DumpKind::DataDefault | DumpKind::MC => {
            let cdata = database
                .get_default(calibration_id, options.kind == DumpKind::MC)?
                .ok_or_else(|| DumpError::NoData(calibration_id.to_string()))?;
            collect(&mut timeseries, 0, &cdata, options);
        }
    }

    spdlog::debug!(
        "Dumping {} channels of {calibration_id}",
        timeseries.len()
    );

    for (channel, series) in timeseries.iter() {
        match options.kind {
            DumpKind::DataRanges => {
                writeln!(out, "# channel={channel}")?;
                for point in series.iter() {
                    write!(out, "{}", point.timestamp)?;
                    write_values(out, &point.values)?;
                }
                write!(out, "\n\n")?;
            }
            _ => {
                if let Some(point) = series.first() {
                    write!(out, "{channel}")?;
                    write_values(out, &point.values)?;
                }
            }
        }
    }
    Ok(())
}

/// Add the selected values of one record to the per-channel time series
fn collect(timeseries: &mut BTreeMap<u32, Vec<TimePoint>>, timestamp: u32, cdata: &CalibrationData, options: &DumpOptions) {
    // data first
    if any_contains(&options.params, &0) {
        for (channel, value) in cdata.data.iter() {
            if !any_contains(&options.channels, channel) {
                continue;
            }
            timeseries.entry(*channel).or_default().push(TimePoint {
                timestamp,
                values: vec![*value],
            });
        }
    }

    // then fit parameters, extending the point the data already made
    for (channel, params) in cdata.fit_parameters.iter() {
        if !any_contains(&options.channels, channel) {
            continue;
        }
        let series = timeseries.entry(*channel).or_default();
        if series.last().map_or(true, |p| p.timestamp != timestamp) {
            series.push(TimePoint {
                timestamp,
                values: Vec::new(),
            });
        }
        if let Some(point) = series.last_mut() {
            for (index, param) in params.iter().enumerate() {
                if any_contains(&options.params, &(index as u32 + 1)) {
                    point.values.push(*param);
                }
            }
        }
    }
}

fn write_values<W: Write>(out: &mut W, values: &[f64]) -> Result<(), DumpError> {
    for value in values.iter() {
        write!(out, " {value}")?;
    }
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::AddMode;
    use crate::tid::TID;

    fn make_db(tmp: &tempfile::TempDir) -> DataBase {
        let db = DataBase::new(tmp.path(), false);
        let mut first = CalibrationData::new("TAPS_Energy_Gains", TID::new(100, 0), TID::new(100, 999));
        first.data.insert(1, 0.3);
        first.data.insert(2, 0.4);
        first.fit_parameters.insert(2, vec![135.0, 8.5]);
        db.add_item(&first, AddMode::StrictRange).unwrap();

        let mut second = CalibrationData::new("TAPS_Energy_Gains", TID::new(200, 0), TID::new(200, 999));
        second.data.insert(1, 0.35);
        second.data.insert(2, 0.45);
        db.add_item(&second, AddMode::StrictRange).unwrap();

        let mut default = CalibrationData::new("TAPS_Energy_Gains", TID::new(0, 0), TID::new(0, 0));
        default.data.insert(1, 0.25);
        default.fit_parameters.insert(1, vec![1.5]);
        db.add_item(&default, AddMode::AsDefault).unwrap();
        db
    }

    fn dump_to_string(db: &DataBase, id: &str, options: &DumpOptions) -> Result<String, DumpError> {
        let mut out: Vec<u8> = Vec::new();
        dump_calibration(db, id, options, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_dump_ranges() {
        let tmp = tempfile::tempdir().unwrap();
        let db = make_db(&tmp);

        let text = dump_to_string(&db, "TAPS_Energy_Gains", &DumpOptions::default()).unwrap();
        assert_eq!(
            text,
            "# channel=1\n100 0.3\n200 0.35\n\n\n# channel=2\n100 0.4 135 8.5\n200 0.45\n\n\n"
        );

        let options = DumpOptions {
            channels: vec![Interval::new(2, 2).unwrap()],
            params: vec![Interval::new(1, 1).unwrap()],
            ..Default::default()
        };
        let text = dump_to_string(&db, "TAPS_Energy_Gains", &options).unwrap();
        assert_eq!(text, "# channel=2\n100 135\n\n\n");
    }

    #[test]
    fn test_dump_default() {
        let tmp = tempfile::tempdir().unwrap();
        let db = make_db(&tmp);
        let options = DumpOptions {
            kind: DumpKind::DataDefault,
            ..Default::default()
        };
        let text = dump_to_string(&db, "TAPS_Energy_Gains", &options).unwrap();
        assert_eq!(text, "1 0.25 1.5\n");

        let options = DumpOptions {
            kind: DumpKind::MC,
            ..Default::default()
        };
        assert!(matches!(
            dump_to_string(&db, "TAPS_Energy_Gains", &options),
            Err(DumpError::NoData(_))
        ));
        assert!(matches!(
            dump_to_string(&db, "CB_Energy_Gains", &DumpOptions::default()),
            Err(DumpError::UnknownCalibrationID(_))
        ));
    }
}
