use nalgebra::Vector3;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// Vector with polar angle theta (from the z axis) and azimuth phi
pub fn vec_r_theta_phi(r: f64, theta: f64, phi: f64) -> Vector3<f64> {
    Vector3::new(
        r * theta.sin() * phi.cos(),
        r * theta.sin() * phi.sin(),
        r * theta.cos(),
    )
}

pub fn theta_of(v: &Vector3<f64>) -> f64 {
    v.x.hypot(v.y).atan2(v.z)
}

pub fn phi_of(v: &Vector3<f64>) -> f64 {
    v.y.atan2(v.x)
}

/// A Lorentz vector (px, py, pz, E) with metric diag(-1,-1,-1,1). All quantities in MeV.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LorentzVec {
    pub p: Vector3<f64>,
    pub e: f64,
}

impl LorentzVec {
    pub fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self {
            p: Vector3::new(px, py, pz),
            e,
        }
    }

    pub fn from_e_p_theta_phi(e: f64, p: f64, theta: f64, phi: f64) -> Self {
        Self {
            p: vec_r_theta_phi(p, theta, phi),
            e,
        }
    }

    /// Build the 4-vector of a particle with kinetic energy ek and the given mass
    pub fn from_ek_theta_phi(ek: f64, theta: f64, phi: f64, mass: f64) -> Self {
        let e = ek + mass;
        let p = (e * e - mass * mass).max(0.0).sqrt();
        Self::from_e_p_theta_phi(e, p, theta, phi)
    }

    pub fn m2(&self) -> f64 {
        self.e * self.e - self.p.norm_squared()
    }

    /// Invariant mass. Negative for space-like vectors.
    pub fn m(&self) -> f64 {
        let mm = self.m2();
        if mm < 0.0 {
            -(-mm).sqrt()
        } else {
            mm.sqrt()
        }
    }

    pub fn p_mag(&self) -> f64 {
        self.p.norm()
    }

    pub fn theta(&self) -> f64 {
        theta_of(&self.p)
    }

    pub fn phi(&self) -> f64 {
        phi_of(&self.p)
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.e * other.e - self.p.dot(&other.p)
    }

    pub fn boost_vector(&self) -> Vector3<f64> {
        self.p / self.e
    }

    /// Lorentz boost by the velocity beta
    pub fn boost(&self, beta: &Vector3<f64>) -> Self {
        let b2 = beta.norm_squared();
        let gamma = 1.0 / (1.0 - b2).sqrt();
        let bp = beta.dot(&self.p);
        let gamma2 = if b2 > 0.0 { (gamma - 1.0) / b2 } else { 0.0 };
        Self {
            p: self.p + beta * (gamma2 * bp + gamma * self.e),
            e: gamma * (self.e + bp),
        }
    }
}

impl Add for LorentzVec {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            p: self.p + rhs.p,
            e: self.e + rhs.e,
        }
    }
}

impl Sub for LorentzVec {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            p: self.p - rhs.p,
            e: self.e - rhs.e,
        }
    }
}

impl AddAssign for LorentzVec {
    fn add_assign(&mut self, rhs: Self) {
        self.p += rhs.p;
        self.e += rhs.e;
    }
}

impl SubAssign for LorentzVec {
    fn sub_assign(&mut self, rhs: Self) {
        self.p -= rhs.p;
        self.e -= rhs.e;
    }
}

impl Mul<f64> for LorentzVec {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            p: self.p * rhs,
            e: self.e * rhs,
        }
    }
}

impl Sum for LorentzVec {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, v| acc + v)
    }
}
