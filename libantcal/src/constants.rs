// Particle masses in MeV
pub const MASS_PROTON: f64 = 938.272;
pub const MASS_PI0: f64 = 134.977;
pub const MASS_ETA: f64 = 547.862;
pub const MASS_ETA_PRIME: f64 = 957.78;
pub const MASS_OMEGA: f64 = 782.65;

// Detector geometry in cm
pub const CB_RADIUS: f64 = 25.4;
pub const TAPS_DISTANCE: f64 = 145.7;
/// Polar angle separating the Crystal Ball (above) from TAPS (below)
pub const CB_THETA_MIN: f64 = 20.0 * std::f64::consts::PI / 180.0;
pub const CB_THETA_MAX: f64 = 160.0 * std::f64::consts::PI / 180.0;

/// Phi uncertainty used where scaling by 1/sin(theta) is not sensible
pub const PHI_SIGMA_FALLBACK: f64 = 1.0 * std::f64::consts::PI / 180.0;

// Fit settings
pub const DEFAULT_MAX_ITERATIONS: usize = 30;
pub const DEFAULT_CONSTRAINT_ACCURACY: f64 = 1.0e-6;
pub const DEFAULT_CHI2_ACCURACY: f64 = 1.0e-2;
