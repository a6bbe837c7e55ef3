use std::cell::RefCell;
use std::rc::Rc;

use super::config::FitSettings;
use super::constants::*;
use super::constraint_fitter::{ConstraintFitter, FitResult, Limit, Sigma};
use super::error::FitterError;
use super::lorentz_vec::LorentzVec;
use super::particle::{Detector, Particle, ParticleType};
use super::uncertainty_model::{Uncertainties, UncertaintyModel};

pub const BEAM_NAME: &str = "Beam";
pub const PROTON_NAME: &str = "Proton";
pub const Z_VERTEX_NAME: &str = "ZVertex";
pub const ENERGY_MOMENTUM_NAME: &str = "EnergyMomentum";

pub fn photon_name(index: usize) -> String {
    format!("Photon{index}")
}

/// Polar angle of a detector hit as seen from a vertex shifted along the beam axis by z_vertex.
///
/// The measured theta assumes the vertex at the target center. Crystal Ball hits lie on a sphere,
/// TAPS hits on a plane perpendicular to the beam.
pub fn vertex_corrected_theta(theta: f64, detector: Detector, z_vertex: f64) -> f64 {
    if z_vertex == 0.0 {
        return theta;
    }
    match detector {
        Detector::CB => (CB_RADIUS * theta.sin()).atan2(CB_RADIUS * theta.cos() - z_vertex),
        Detector::TAPS => (TAPS_DISTANCE * theta.tan()).atan2(TAPS_DISTANCE - z_vertex),
        Detector::None => theta,
    }
}

/// The 4-vector of a fit particle with values [Ek, theta, phi]
pub fn fit_lorentz_vec(values: &[f64], mass: f64, detector: Detector, z_vertex: f64) -> LorentzVec {
    let theta = vertex_corrected_theta(values[1], detector, z_vertex);
    LorentzVec::from_ek_theta_phi(values[0], theta, values[2], mass)
}

/// Phi resolution degrades with 1/sin(theta) towards the beam axis; too close to the axis a
/// fixed fallback is used instead
fn phi_sigma(sigma_phi: f64, theta: f64) -> f64 {
    if (CB_THETA_MIN..=CB_THETA_MAX).contains(&theta) {
        sigma_phi / theta.sin()
    } else {
        PHI_SIGMA_FALLBACK
    }
}

/// Kinetic energy must not become negative, theta must stay within [0, pi]
const PARTICLE_LIMITS: [Limit; 3] = [
    Some((0.0, f64::INFINITY)),
    Some((0.0, std::f64::consts::PI)),
    None,
];

fn particle_sigmas(uncertainties: &Uncertainties, theta: f64, unmeasured_ek: bool) -> Vec<Sigma> {
    let ek = if unmeasured_ek {
        Sigma::Unmeasured
    } else {
        Sigma::Measured(uncertainties.sigma_ek)
    };
    vec![
        ek,
        Sigma::Measured(uncertainties.sigma_theta),
        Sigma::Measured(phi_sigma(uncertainties.sigma_phi, theta)),
    ]
}

/// The measured event given to the last prepare_fit
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedEvent {
    pub beam_energy: f64,
    pub proton: Particle,
    pub photons: Vec<Particle>,
}

/// KinFitter fits an event gamma p -> p + n photons, requiring 4-momentum conservation.
///
/// The beam energy, the proton and the photons are fit variables; the proton kinetic energy is
/// left unmeasured if the uncertainty model gives it no sigma. Optionally the z position of the
/// vertex is fitted too, shifting the directions of all particles according to where they hit
/// the calorimeters.
///
/// Fitters are reusable: call [`KinFitter::prepare_fit`] and [`KinFitter::do_fit`] per event.
#[derive(Debug)]
pub struct KinFitter {
    name: String,
    n_photons: usize,
    model: Box<dyn UncertaintyModel>,
    fit_z_vertex: bool,
    z_vertex_sigma: f64,
    fitter: ConstraintFitter,
    detectors: Rc<RefCell<Vec<Detector>>>,
    prepared: Option<PreparedEvent>,
    last_result: Option<FitResult>,
}

impl KinFitter {
    pub fn new(
        name: &str,
        n_photons: usize,
        model: Box<dyn UncertaintyModel>,
        fit_z_vertex: bool,
        settings: FitSettings,
    ) -> Result<Self, FitterError> {
        let mut fitter = ConstraintFitter::new(name, settings);
        let unset = vec![Sigma::Fixed; 3];
        fitter.add_variable(BEAM_NAME, vec![0.0], vec![Sigma::Fixed])?;
        fitter.set_limits(BEAM_NAME, &[Some((0.0, f64::INFINITY))])?;
        fitter.add_variable(PROTON_NAME, vec![0.0; 3], unset.clone())?;
        fitter.set_limits(PROTON_NAME, &PARTICLE_LIMITS)?;
        for i in 0..n_photons {
            fitter.add_variable(&photon_name(i), vec![0.0; 3], unset.clone())?;
            fitter.set_limits(&photon_name(i), &PARTICLE_LIMITS)?;
        }
        if fit_z_vertex {
            fitter.add_variable(Z_VERTEX_NAME, vec![0.0], vec![Sigma::Fixed])?;
        }

        let detectors = Rc::new(RefCell::new(vec![Detector::None; n_photons + 1]));
        let shared = detectors.clone();
        let mut variable_names: Vec<String> = vec![BEAM_NAME.to_string(), PROTON_NAME.to_string()];
        variable_names.extend((0..n_photons).map(photon_name));
        if fit_z_vertex {
            variable_names.push(Z_VERTEX_NAME.to_string());
        }
        let names: Vec<&str> = variable_names.iter().map(|n| n.as_str()).collect();

        fitter.add_constraint(ENERGY_MOMENTUM_NAME, &names, move |v: &[&[f64]]| {
            let detectors = shared.borrow();
            let z_vertex = if fit_z_vertex { v[n_photons + 2][0] } else { 0.0 };
            let beam = v[0][0];
            let mut diff = LorentzVec::new(0.0, 0.0, beam, beam) + LorentzVec::new(0.0, 0.0, 0.0, MASS_PROTON);
            diff -= fit_lorentz_vec(v[1], MASS_PROTON, detectors[0], z_vertex);
            for i in 0..n_photons {
                diff -= fit_lorentz_vec(v[i + 2], 0.0, detectors[i + 1], z_vertex);
            }
            vec![diff.p.x, diff.p.y, diff.p.z, diff.e]
        })?;

        spdlog::info!(
            "Initialized KinFitter '{name}' with {n_photons} photons, z vertex fit {}",
            if fit_z_vertex { "enabled" } else { "disabled" }
        );

        Ok(Self {
            name: name.to_string(),
            n_photons,
            model,
            fit_z_vertex,
            z_vertex_sigma: 0.0,
            fitter,
            detectors,
            prepared: None,
            last_result: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_photons(&self) -> usize {
        self.n_photons
    }

    pub fn is_z_vertex_fitted(&self) -> bool {
        self.fit_z_vertex
    }

    /// Prior sigma of the z vertex in cm. 0 keeps the vertex fixed at the target center.
    pub fn set_z_vertex_sigma(&mut self, sigma: f64) {
        self.z_vertex_sigma = sigma;
    }

    pub fn z_vertex_sigma(&self) -> f64 {
        self.z_vertex_sigma
    }

    /// Load an event into the fitter
    pub fn prepare_fit(&mut self, beam_energy: f64, proton: &Particle, photons: &[Particle]) -> Result<(), FitterError> {
        if photons.len() != self.n_photons {
            return Err(FitterError::PhotonCountMismatch(photons.len(), self.n_photons));
        }
        if proton.ptype != ParticleType::Proton {
            return Err(FitterError::WrongParticleType(
                proton.ptype.to_string(),
                ParticleType::Proton.to_string(),
            ));
        }
        if let Some(bad) = photons.iter().find(|p| p.ptype != ParticleType::Photon) {
            return Err(FitterError::WrongParticleType(
                bad.ptype.to_string(),
                ParticleType::Photon.to_string(),
            ));
        }

        self.fitter.set_variable(
            BEAM_NAME,
            &[beam_energy],
            &[Sigma::Measured(self.model.beam(beam_energy))],
        )?;

        let proton_uncertainties = self.model.particle(proton);
        let unmeasured_ek = proton_uncertainties.sigma_ek == 0.0;
        let proton_ek = if unmeasured_ek {
            // start from the missing energy
            beam_energy - photons.iter().map(|p| p.ek).sum::<f64>()
        } else {
            proton.ek
        };
        self.fitter.set_variable(
            PROTON_NAME,
            &[proton_ek, proton.theta, proton.phi],
            &particle_sigmas(&proton_uncertainties, proton.theta, unmeasured_ek),
        )?;

        for (i, photon) in photons.iter().enumerate() {
            let uncertainties = self.model.particle(photon);
            self.fitter.set_variable(
                &photon_name(i),
                &[photon.ek, photon.theta, photon.phi],
                &particle_sigmas(&uncertainties, photon.theta, false),
            )?;
        }

        if self.fit_z_vertex {
            let sigma = if self.z_vertex_sigma > 0.0 {
                Sigma::Measured(self.z_vertex_sigma)
            } else {
                Sigma::Fixed
            };
            self.fitter.set_variable(Z_VERTEX_NAME, &[0.0], &[sigma])?;
        }

        {
            let mut detectors = self.detectors.borrow_mut();
            detectors[0] = proton.detector;
            for (i, photon) in photons.iter().enumerate() {
                detectors[i + 1] = photon.detector;
            }
        }

        self.prepared = Some(PreparedEvent {
            beam_energy,
            proton: *proton,
            photons: photons.to_vec(),
        });
        self.last_result = None;
        Ok(())
    }

    /// Fit the prepared event
    pub fn do_fit(&mut self) -> Result<FitResult, FitterError> {
        if self.prepared.is_none() {
            return Err(FitterError::NotPrepared);
        }
        let result = self.fitter.fit()?;
        self.last_result = Some(result.clone());
        Ok(result)
    }

    /// The measured event as given to the last prepare_fit
    pub fn prepared_event(&self) -> Option<&PreparedEvent> {
        self.prepared.as_ref()
    }

    pub fn last_result(&self) -> Option<&FitResult> {
        self.last_result.as_ref()
    }

    pub fn fitted_beam_energy(&self) -> Option<f64> {
        self.fitted_values(BEAM_NAME).map(|v| v[0])
    }

    pub fn fitted_z_vertex(&self) -> Option<f64> {
        if !self.fit_z_vertex {
            return None;
        }
        self.fitted_values(Z_VERTEX_NAME).map(|v| v[0])
    }

    /// The fitted proton, with its direction as seen from the fitted vertex
    pub fn fitted_proton(&self) -> Option<Particle> {
        let detector = self.detectors.borrow()[0];
        self.fitted_particle(PROTON_NAME, ParticleType::Proton, detector)
    }

    /// The fitted photons in the order given to prepare_fit
    pub fn fitted_photons(&self) -> Vec<Particle> {
        let detectors = self.detectors.borrow().clone();
        (0..self.n_photons)
            .filter_map(|i| self.fitted_particle(&photon_name(i), ParticleType::Photon, detectors[i + 1]))
            .collect()
    }

    fn fitted_values(&self, name: &str) -> Option<&[f64]> {
        self.last_result
            .as_ref()
            .and_then(|r| r.variables.get(name))
            .map(|v| v.after.as_slice())
    }

    fn fitted_particle(&self, name: &str, ptype: ParticleType, detector: Detector) -> Option<Particle> {
        let z_vertex = self.fitted_z_vertex().unwrap_or(0.0);
        self.fitted_values(name).map(|v| {
            Particle::new(
                ptype,
                v[0],
                vertex_corrected_theta(v[1], detector, z_vertex),
                v[2],
            )
            .with_detector(detector)
        })
    }

    pub(crate) fn fitter_mut(&mut self) -> &mut ConstraintFitter {
        &mut self.fitter
    }

    pub(crate) fn shared_detectors(&self) -> Rc<RefCell<Vec<Detector>>> {
        self.detectors.clone()
    }

    /// The 4-vectors of proton and photons at the values currently loaded into the fitter
    pub(crate) fn prepared_lorentz_vecs(&self) -> Option<(LorentzVec, Vec<LorentzVec>)> {
        let detectors = self.detectors.borrow();
        let proton = self.fitter.get_values(PROTON_NAME)?;
        let proton = fit_lorentz_vec(proton, MASS_PROTON, detectors[0], 0.0);
        let mut photons = Vec::with_capacity(self.n_photons);
        for i in 0..self.n_photons {
            let values = self.fitter.get_values(&photon_name(i))?;
            photons.push(fit_lorentz_vec(values, 0.0, detectors[i + 1], 0.0));
        }
        Some((proton, photons))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::constraint_fitter::FitStatus;
    use crate::uncertainty_model::SimpleModel;
    use approx::assert_relative_eq;

    /// Build an exactly conserving event gamma p -> p + photons for the given photons.
    ///
    /// The proton balances the transverse momentum; its longitudinal momentum and the beam
    /// energy follow from E - pz conservation.
    pub(crate) fn make_event(photons: &[LorentzVec]) -> (f64, LorentzVec) {
        let k = MASS_PROTON - photons.iter().map(|p| p.e - p.p.z).sum::<f64>();
        let px = -photons.iter().map(|p| p.p.x).sum::<f64>();
        let py = -photons.iter().map(|p| p.p.y).sum::<f64>();
        let mt2 = MASS_PROTON * MASS_PROTON + px * px + py * py;
        let pz = (mt2 - k * k) / (2.0 * k);
        let proton = LorentzVec::new(px, py, pz, (mt2 + pz * pz).sqrt());
        let beam = photons.iter().map(|p| p.p.z).sum::<f64>() + pz;
        (beam, proton)
    }

    fn two_photon_event() -> (f64, Particle, Vec<Particle>) {
        let photons = vec![
            LorentzVec::from_ek_theta_phi(400.0, 0.8, 0.3, 0.0),
            LorentzVec::from_ek_theta_phi(300.0, 1.2, 2.5, 0.0),
        ];
        let (beam, proton) = make_event(&photons);
        (
            beam,
            Particle::from_lorentz_vec(ParticleType::Proton, &proton),
            photons
                .iter()
                .map(|p| Particle::from_lorentz_vec(ParticleType::Photon, p))
                .collect(),
        )
    }

    #[test]
    fn test_noiseless_event() {
        let (beam, proton, photons) = two_photon_event();
        let mut fitter = KinFitter::new("kinfit", 2, Box::new(SimpleModel::default()), false, FitSettings::default()).unwrap();
        fitter.prepare_fit(beam, &proton, &photons).unwrap();
        let result = fitter.do_fit().unwrap();

        assert_eq!(result.status, FitStatus::Success);
        assert_eq!(result.n_iterations, 1);
        assert_eq!(result.ndof, 3);
        assert_relative_eq!(result.chi_square, 0.0, epsilon = 1e-9);
        assert_relative_eq!(result.probability, 1.0, epsilon = 1e-9);

        assert_relative_eq!(fitter.fitted_beam_energy().unwrap(), beam, epsilon = 1e-6);
        let fitted_proton = fitter.fitted_proton().unwrap();
        assert_relative_eq!(fitted_proton.ek, proton.ek, epsilon = 1e-6);
        assert_relative_eq!(fitted_proton.theta, proton.theta, epsilon = 1e-9);
        for (fitted, measured) in fitter.fitted_photons().iter().zip(photons.iter()) {
            assert_relative_eq!(fitted.ek, measured.ek, epsilon = 1e-6);
            assert_relative_eq!(fitted.phi, measured.phi, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_smeared_event() {
        let (beam, proton, mut photons) = two_photon_event();
        photons[0].ek += 2.0;
        photons[1].theta -= 0.01;
        let mut fitter = KinFitter::new("kinfit", 2, Box::new(SimpleModel::default()), false, FitSettings::default()).unwrap();
        fitter.prepare_fit(beam, &proton, &photons).unwrap();
        let result = fitter.do_fit().unwrap();

        assert_eq!(result.status, FitStatus::Success);
        assert!(result.chi_square > 0.0);
        assert!(result.n_iterations > 1);
        assert!(result.probability > 0.0 && result.probability < 1.0);
        let photon = &result.variables[&photon_name(0)];
        assert!(photon.pulls.iter().all(|p| p.is_finite()));
        assert!(photon.sigmas_after[0] < photon.sigmas_before[0]);
    }

    #[test]
    fn test_z_vertex() {
        let (beam, proton, photons) = two_photon_event();
        let mut fitter = KinFitter::new("kinfit_z", 2, Box::new(SimpleModel::default()), true, FitSettings::default()).unwrap();
        fitter.set_z_vertex_sigma(3.0);
        fitter.prepare_fit(beam, &proton, &photons).unwrap();
        let result = fitter.do_fit().unwrap();
        assert_eq!(result.status, FitStatus::Success);
        assert_relative_eq!(fitter.fitted_z_vertex().unwrap(), 0.0, epsilon = 1e-6);

        assert_relative_eq!(vertex_corrected_theta(0.5, Detector::CB, 0.0), 0.5);
        // a vertex downstream sees the same CB hit under a larger angle
        assert!(vertex_corrected_theta(0.5, Detector::CB, 2.0) > 0.5);
        assert!(vertex_corrected_theta(0.2, Detector::TAPS, 2.0) > 0.2);
    }

    /// Photons below 10 MeV are barely measured in energy, everything else precisely
    #[derive(Debug)]
    struct SoftPhotonModel;

    impl UncertaintyModel for SoftPhotonModel {
        fn particle(&self, particle: &Particle) -> Uncertainties {
            let sigma_ek = match particle.ptype {
                ParticleType::Proton => 0.0,
                _ if particle.ek < 10.0 => 300.0,
                _ => 0.5,
            };
            Uncertainties {
                sigma_ek,
                sigma_theta: 0.001,
                sigma_phi: 0.001,
            }
        }

        fn beam(&self, _beam_energy: f64) -> f64 {
            0.5
        }
    }

    #[test]
    fn test_negative_energy_is_unphysical() {
        // photon 1 flies along photon 0, so an excess in photon 1 is cheapest to balance by
        // taking it away from the soft photon 0, driving its energy below zero
        let lvs = vec![
            LorentzVec::from_ek_theta_phi(3.0, 1.0, 0.5, 0.0),
            LorentzVec::from_ek_theta_phi(150.0, 1.0, 0.5, 0.0),
            LorentzVec::from_ek_theta_phi(200.0, 1.8, -2.0, 0.0),
        ];
        let (beam, proton) = make_event(&lvs);
        let proton = Particle::from_lorentz_vec(ParticleType::Proton, &proton);
        let mut photons: Vec<Particle> = lvs
            .iter()
            .map(|p| Particle::from_lorentz_vec(ParticleType::Photon, p))
            .collect();
        let mut fitter = KinFitter::new("kinfit", 3, Box::new(SoftPhotonModel), false, FitSettings::default()).unwrap();

        fitter.prepare_fit(beam, &proton, &photons).unwrap();
        assert_eq!(fitter.do_fit().unwrap().status, FitStatus::Success);

        photons[1].ek += 20.0;
        fitter.prepare_fit(beam, &proton, &photons).unwrap();
        let result = fitter.do_fit().unwrap();
        assert_eq!(result.status, FitStatus::UnphysicalValues);
        assert!(!result.is_success());
        assert_eq!(result.probability, 0.0);
    }

    #[test]
    fn test_bad_input() {
        let (beam, proton, photons) = two_photon_event();
        let mut fitter = KinFitter::new("kinfit", 3, Box::new(SimpleModel::default()), false, FitSettings::default()).unwrap();
        assert!(matches!(fitter.do_fit(), Err(FitterError::NotPrepared)));
        assert!(matches!(
            fitter.prepare_fit(beam, &proton, &photons),
            Err(FitterError::PhotonCountMismatch(2, 3))
        ));
        let three = vec![photons[0], photons[1], proton];
        assert!(matches!(
            fitter.prepare_fit(beam, &proton, &three),
            Err(FitterError::WrongParticleType(_, _))
        ));
        assert!(matches!(
            fitter.prepare_fit(beam, &photons[0], &[photons[0], photons[1], photons[0]]),
            Err(FitterError::WrongParticleType(_, _))
        ));
    }
}
