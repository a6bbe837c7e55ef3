//! # antcal
//!
//! antcal is a calibration database and kinematic fitting library for a tagged photon beam
//! experiment, written in Rust. It stores time dependent per-channel calibration constants on
//! disk, keyed by the range of events they are valid for, and provides the constrained
//! kinematic fitters used to reconstruct reactions like gamma p -> p pi0 pi0.
//!
//! ## Installation
//!
//! Currently the only method of install is from source, which is laid out below.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./antcal_cli` from the top level
//! repository. The binary will be installed to your cargo install location (typically
//! something like `~/.cargo/bin/`). To use the CLI see the `antcal_cli` README.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! calibration_data_folder: /path/to/calibration
//! enable_caching: false
//! override_to_default: false
//! fit:
//!   max_iterations: 30
//!   constraint_accuracy: 1.0e-6
//!   chi2_accuracy: 0.01
//! ```
//!
//! - `calibration_data_folder`: The folder containing one subfolder per calibration ID
//! - `enable_caching`: Remember the list of stored ranges per calibration ID instead of
//! scanning the folder at every lookup. Only use this if no other process writes to the
//! folder at the same time.
//! - `override_to_default`: Ignore all ranges and always use the default data
//! - `fit`: Convergence controls of the kinematic fitters. Can be omitted.
//!
//! ## Calibration Data
//!
//! Every event has an ID ([tid::TID]) made of a timestamp, a lower counter and flags. A
//! calibration record ([calibration_data::CalibrationData]) holds the values of one calibration
//! ID for all events in a closed interval `[first_id, last_id]`. Records are YAML files laid
//! out on disk as:
//!
//! ```text
//! calibration_data_folder
//! |---- <calibration ID>
//! |    |---- default/data.yml
//! |    |---- mc/data.yml
//! |    |---- ranges
//! |    |    |---- <first ID>_<last ID>/data.yml
//! ```
//!
//! IDs are written as `<timestamp>-<lower>-<flags>` in hex. Entries starting with a dot are
//! ignored; they are used while records are being moved into place.
//!
//! When a range is added which overlaps stored ranges, the new record wins where it is newer
//! and the older ranges are narrowed to the part not covered anymore. Lookups always return
//! the most recent record covering an event; the [data_manager::DataManager] remembers each
//! answer until the next change point is reached, so looking up every event is cheap.
//!
//! ## Kinematic Fitting
//!
//! [constraint_fitter::ConstraintFitter] minimizes the chi-square of measured values under
//! arbitrary nonlinear constraints using Lagrange multipliers.
//! [kin_fitter::KinFitter] requires 4-momentum conservation for gamma p -> p + n photons and
//! [tree_fitter::TreeFitter] additionally constrains invariant masses given by a decay tree,
//! trying all distinct assignments of the photons to the tree.
pub mod calibration_data;
pub mod calibration_dump;
pub mod calibration_values;
pub mod config;
pub mod constants;
pub mod constraint_fitter;
pub mod data_manager;
pub mod database;
pub mod error;
pub mod interval;
pub mod kin_fitter;
pub mod lorentz_vec;
pub mod on_disk_layout;
pub mod particle;
pub mod particle_tree;
pub mod tid;
pub mod tree_fitter;
pub mod uncertainty_model;
