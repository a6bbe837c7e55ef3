use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TIDError {
    #[error("Could not parse TID from {0}; expected format tttttttt-llllllll-ff")]
    BadFormat(String),
    #[error("TID failed to parse an integer: {0}")]
    ParsingError(#[from] std::num::ParseIntError),
}

#[derive(Debug, Error)]
pub enum IntervalError {
    #[error("Insane interval with start {0} after stop {1}")]
    Insane(String, String),
    #[error("Interval failed to parse an integer: {0}")]
    ParsingError(#[from] std::num::ParseIntError),
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("OnDiskLayout failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("OnDiskLayout found a range folder with a bad name: {0}")]
    BadRangeFolder(String),
    #[error("OnDiskLayout failed to parse a TID: {0}")]
    BadTID(#[from] TIDError),
    #[error("OnDiskLayout found a bad range: {0}")]
    BadRange(#[from] IntervalError),
}

#[derive(Debug, Error)]
pub enum DataBaseError {
    #[error("DataBase failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("DataBase failed due to OnDiskLayout error: {0}")]
    LayoutError(#[from] LayoutError),
    #[error("DataBase was given an insane range: {0}")]
    InsaneRange(#[from] IntervalError),
    #[error("DataBase was given an invalid calibration ID '{0}'")]
    InvalidCalibrationID(String),
    #[error("DataBase found corrupt data in file {0:?}: {1}")]
    CorruptData(PathBuf, serde_yaml::Error),
    #[error("DataBase found data of calibration ID '{0}' where '{1}' was expected")]
    MismatchedID(String, String),
    #[error("DataBase could not find the data file {0:?} of a listed range")]
    MissingData(PathBuf),
    #[error("DataBase cannot write to path {0:?} as it has no parent folder")]
    BadPath(PathBuf),
    #[error("DataBase failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Invalid add mode '{0}'; expected one of strict, rightopen, default")]
    BadAddMode(String),
    #[error("DataBase cannot store MC data of '{0}' as a range, MC data is time independent and must be added as default")]
    RangedMC(String),
}

#[derive(Debug, Error)]
pub enum DataManagerError {
    #[error("DataManager failed due to DataBase error: {0}")]
    DataBaseError(#[from] DataBaseError),
}

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("Dump failed due to DataBase error: {0}")]
    DataBaseError(#[from] DataBaseError),
    #[error("Dump failed because calibration ID '{0}' does not exist")]
    UnknownCalibrationID(String),
    #[error("Dump failed because calibration ID '{0}' has no data of the requested kind")]
    NoData(String),
    #[error("Dump failed to write output: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum FitterError {
    #[error("Fitter has no constraints")]
    NoConstraints,
    #[error("Fitter variable '{0}' was added twice")]
    DuplicateVariable(String),
    #[error("Fitter constraint '{0}' was added twice")]
    DuplicateConstraint(String),
    #[error("Fitter constraint '{0}' uses unknown variable '{1}'")]
    UnknownVariable(String, String),
    #[error("Fitter variable '{0}' was given {1} values but has {2} components")]
    SizeMismatch(String, usize, usize),
    #[error("Fitter constraint '{0}' evaluated to {1} values, expected {2}")]
    ConstraintSizeMismatch(String, usize, usize),
    #[error("Fitter has {0} unmeasured components but only {1} constraint equations")]
    Underdetermined(usize, usize),
    #[error("Fitter was given {0} photons, expected {1}")]
    PhotonCountMismatch(usize, usize),
    #[error("Fitter was given a {0} where a {1} was expected")]
    WrongParticleType(String, String),
    #[error("Fitter was asked to fit before any event was prepared")]
    NotPrepared,
}

#[derive(Debug, Error)]
pub enum TreeFitterError {
    #[error("TreeFitter failed due to fitter error: {0}")]
    FitterError(#[from] FitterError),
    #[error("TreeFitter decay tree has a {0} leaf; only photons and at most one proton are allowed")]
    BadLeaf(String),
    #[error("TreeFitter decay tree has more than one proton leaf")]
    TooManyProtons,
    #[error("TreeFitter decay tree has a photon with daughters")]
    PhotonWithDaughters,
    #[error("TreeFitter decay tree has no photon leaves")]
    NoPhotons,
}
