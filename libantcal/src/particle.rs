use std::fmt::Display;

use super::constants::*;
use super::lorentz_vec::LorentzVec;

/// The particle types known to the fitters.
///
/// BeamTarget is the pseudo particle of beam photon plus target proton, used as the root of
/// decay trees. The declaration order is the canonical order of decay trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParticleType {
    BeamTarget,
    Proton,
    Photon,
    Pi0,
    Eta,
    Omega,
    EtaPrime,
}

impl ParticleType {
    /// Mass in MeV. The BeamTarget has no fixed mass and gives 0.
    pub fn mass(&self) -> f64 {
        match self {
            Self::BeamTarget => 0.0,
            Self::Proton => MASS_PROTON,
            Self::Photon => 0.0,
            Self::Pi0 => MASS_PI0,
            Self::Eta => MASS_ETA,
            Self::Omega => MASS_OMEGA,
            Self::EtaPrime => MASS_ETA_PRIME,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BeamTarget => "BeamTarget",
            Self::Proton => "Proton",
            Self::Photon => "Photon",
            Self::Pi0 => "Pi0",
            Self::Eta => "Eta",
            Self::Omega => "Omega",
            Self::EtaPrime => "EtaPrime",
        }
    }
}

impl Display for ParticleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The calorimeter which detected a particle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Detector {
    /// Crystal Ball, a sphere around the target
    CB,
    /// TAPS, a forward wall
    TAPS,
    /// No position information, for example a particle with unmeasured direction
    #[default]
    None,
}

impl Detector {
    /// The detector covering the polar angle theta, assuming a vertex at the target center
    pub fn from_theta(theta: f64) -> Self {
        if theta >= CB_THETA_MIN {
            Self::CB
        } else {
            Self::TAPS
        }
    }
}

/// A reconstructed particle candidate with kinetic energy and direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub ptype: ParticleType,
    pub ek: f64,
    pub theta: f64,
    pub phi: f64,
    pub detector: Detector,
}

impl Particle {
    pub fn new(ptype: ParticleType, ek: f64, theta: f64, phi: f64) -> Self {
        Self {
            ptype,
            ek,
            theta,
            phi,
            detector: Detector::from_theta(theta),
        }
    }

    pub fn with_detector(mut self, detector: Detector) -> Self {
        self.detector = detector;
        self
    }

    /// Build the particle from a 4-vector, used to construct events
    pub fn from_lorentz_vec(ptype: ParticleType, v: &LorentzVec) -> Self {
        Self::new(ptype, v.e - ptype.mass(), v.theta(), v.phi())
    }

    pub fn lorentz_vec(&self) -> LorentzVec {
        LorentzVec::from_ek_theta_phi(self.ek, self.theta, self.phi, self.ptype.mass())
    }
}
