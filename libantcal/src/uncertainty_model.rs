use std::fmt::Debug;

use super::particle::{Particle, ParticleType};

/// Uncertainties of a measured particle. A sigma of 0 for the kinetic energy means unmeasured.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Uncertainties {
    pub sigma_ek: f64,
    pub sigma_theta: f64,
    pub sigma_phi: f64,
}

/// Provides the measurement uncertainties of particles and of the beam energy
pub trait UncertaintyModel: Debug {
    fn particle(&self, particle: &Particle) -> Uncertainties;
    fn beam(&self, beam_energy: f64) -> f64;
}

/// The same uncertainties for every photon and every proton
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantModel {
    pub photon: Uncertainties,
    pub proton: Uncertainties,
    pub beam_sigma: f64,
}

impl UncertaintyModel for ConstantModel {
    fn particle(&self, particle: &Particle) -> Uncertainties {
        match particle.ptype {
            ParticleType::Proton => self.proton,
            _ => self.photon,
        }
    }

    fn beam(&self, _beam_energy: f64) -> f64 {
        self.beam_sigma
    }
}

/// Energy resolution scaling like a calorimeter, sigma(E) = scale * E^exponent, with constant
/// angular resolution. The proton kinetic energy is left unmeasured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleModel {
    pub energy_scale: f64,
    pub energy_exponent: f64,
    pub sigma_theta: f64,
    pub sigma_phi: f64,
    pub beam_scale: f64,
}

impl Default for SimpleModel {
    fn default() -> Self {
        let degree = std::f64::consts::PI / 180.0;
        Self {
            energy_scale: 0.02,
            energy_exponent: 0.64,
            sigma_theta: 2.5 * degree,
            sigma_phi: 2.5 * degree,
            beam_scale: 0.02,
        }
    }
}

impl UncertaintyModel for SimpleModel {
    fn particle(&self, particle: &Particle) -> Uncertainties {
        let sigma_ek = match particle.ptype {
            ParticleType::Proton => 0.0,
            _ => self.energy_scale * particle.ek.max(0.0).powf(self.energy_exponent),
        };
        Uncertainties {
            sigma_ek,
            sigma_theta: self.sigma_theta,
            sigma_phi: self.sigma_phi,
        }
    }

    fn beam(&self, beam_energy: f64) -> f64 {
        self.beam_scale * beam_energy.max(0.0).powf(self.energy_exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_simple_model() {
        let model = SimpleModel::default();
        let photon = Particle::new(ParticleType::Photon, 100.0, 1.0, 0.0);
        let sigmas = model.particle(&photon);
        assert_relative_eq!(sigmas.sigma_ek, 0.02 * 100.0_f64.powf(0.64));
        assert_relative_eq!(sigmas.sigma_theta, 2.5_f64.to_radians());

        let proton = Particle::new(ParticleType::Proton, 100.0, 1.0, 0.0);
        assert_eq!(model.particle(&proton).sigma_ek, 0.0);
    }
}
