use fxhash::FxHashMap;
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::collections::BTreeMap;

use super::config::FitSettings;
use super::error::FitterError;

/// Uncertainty of a single component of a fit variable
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sigma {
    /// Measured with the given standard deviation
    Measured(f64),
    /// Constant, never changed by the fit
    Fixed,
    /// Free parameter without prior, determined by the constraints alone
    Unmeasured,
}

impl Sigma {
    /// Measured components with a non-positive sigma are treated as fixed
    fn normalized(self) -> Self {
        match self {
            Self::Measured(sigma) if sigma <= 0.0 || !sigma.is_finite() => Self::Fixed,
            other => other,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Self::Measured(sigma) => *sigma,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    Success,
    NotConverged,
    UnphysicalValues,
    SingularMatrix,
}

/// Fit outcome of a single variable
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableResult {
    pub before: Vec<f64>,
    pub after: Vec<f64>,
    pub sigmas_before: Vec<f64>,
    pub sigmas_after: Vec<f64>,
    pub pulls: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub status: FitStatus,
    pub chi_square: f64,
    pub ndof: usize,
    pub probability: f64,
    pub n_iterations: usize,
    pub n_function_calls: usize,
    pub variables: BTreeMap<String, VariableResult>,
}

impl FitResult {
    pub fn is_success(&self) -> bool {
        self.status == FitStatus::Success
    }
}

pub type ConstraintFn = Box<dyn Fn(&[&[f64]]) -> Vec<f64>>;

/// Physical range [min, max] of a component. A fit leaving it ends with UnphysicalValues.
pub type Limit = Option<(f64, f64)>;

#[derive(Debug, Clone)]
struct Variable {
    name: String,
    before: Vec<f64>,
    sigmas: Vec<Sigma>,
    limits: Vec<Limit>,
}

struct Constraint {
    name: String,
    variables: Vec<usize>,
    func: ConstraintFn,
}

impl std::fmt::Debug for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constraint")
            .field("name", &self.name)
            .field("variables", &self.variables)
            .finish()
    }
}

/// Where the components of the variables live in the flat parameter vector
#[derive(Debug)]
struct Layout {
    offsets: Vec<usize>,
    measured: Vec<usize>,
    unmeasured: Vec<usize>,
    sigmas: Vec<f64>,
    n_equations: Vec<usize>,
}

/// ConstraintFitter adjusts measured values within their uncertainties such that a set of
/// constraint functions vanish, minimizing the chi square of the adjustment.
///
/// Variables are vectors of components, each measured with a sigma, fixed or unmeasured.
/// Constraints read a list of variables and return a vector which must be zero at the solution.
/// The problem is solved by iterating the linearized problem with Lagrange multipliers:
///
/// ```text
/// d  = f + D (x0 - x)
/// S  = D V D^T
/// du = -(E^T S^-1 E)^-1 E^T S^-1 d
/// l  = S^-1 (d + E du)
/// x  = x0 - V D^T l
/// ```
///
/// where D and E are the Jacobians with respect to the measured and unmeasured components and
/// V is the diagonal prior covariance. The fit converges when all constraints are below the
/// constraint accuracy and the chi square changed less than the chi square accuracy.
#[derive(Debug)]
pub struct ConstraintFitter {
    name: String,
    settings: FitSettings,
    variables: Vec<Variable>,
    index: FxHashMap<String, usize>,
    constraints: Vec<Constraint>,
}

impl ConstraintFitter {
    pub fn new(name: &str, settings: FitSettings) -> Self {
        Self {
            name: name.to_string(),
            settings,
            variables: Vec::new(),
            index: FxHashMap::default(),
            constraints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &FitSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: FitSettings) {
        self.settings = settings;
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn add_variable(&mut self, name: &str, values: Vec<f64>, sigmas: Vec<Sigma>) -> Result<(), FitterError> {
        if self.index.contains_key(name) {
            return Err(FitterError::DuplicateVariable(name.to_string()));
        }
        if values.len() != sigmas.len() {
            return Err(FitterError::SizeMismatch(name.to_string(), sigmas.len(), values.len()));
        }
        self.index.insert(name.to_string(), self.variables.len());
        self.variables.push(Variable {
            name: name.to_string(),
            limits: vec![None; values.len()],
            before: values,
            sigmas,
        });
        Ok(())
    }

    /// Restrict the components of a variable to their physical ranges
    pub fn set_limits(&mut self, name: &str, limits: &[Limit]) -> Result<(), FitterError> {
        let index = *self
            .index
            .get(name)
            .ok_or_else(|| FitterError::UnknownVariable(String::from("-"), name.to_string()))?;
        let variable = &mut self.variables[index];
        if limits.len() != variable.limits.len() {
            return Err(FitterError::SizeMismatch(name.to_string(), limits.len(), variable.limits.len()));
        }
        variable.limits.copy_from_slice(limits);
        Ok(())
    }

    /// Set the values and sigmas of an existing variable, for example for the next event
    pub fn set_variable(&mut self, name: &str, values: &[f64], sigmas: &[Sigma]) -> Result<(), FitterError> {
        let index = *self
            .index
            .get(name)
            .ok_or_else(|| FitterError::UnknownVariable(String::from("-"), name.to_string()))?;
        let variable = &mut self.variables[index];
        if values.len() != variable.before.len() {
            return Err(FitterError::SizeMismatch(name.to_string(), values.len(), variable.before.len()));
        }
        if sigmas.len() != variable.sigmas.len() {
            return Err(FitterError::SizeMismatch(name.to_string(), sigmas.len(), variable.sigmas.len()));
        }
        variable.before.copy_from_slice(values);
        variable.sigmas.copy_from_slice(sigmas);
        Ok(())
    }

    pub fn get_values(&self, name: &str) -> Option<&[f64]> {
        self.index
            .get(name)
            .map(|i| self.variables[*i].before.as_slice())
    }

    pub fn add_constraint<F>(&mut self, name: &str, variable_names: &[&str], func: F) -> Result<(), FitterError>
    where
        F: Fn(&[&[f64]]) -> Vec<f64> + 'static,
    {
        if self.constraints.iter().any(|c| c.name == name) {
            return Err(FitterError::DuplicateConstraint(name.to_string()));
        }
        let mut variables = Vec::with_capacity(variable_names.len());
        for variable in variable_names.iter() {
            let index = self
                .index
                .get(*variable)
                .ok_or_else(|| FitterError::UnknownVariable(name.to_string(), variable.to_string()))?;
            variables.push(*index);
        }
        self.constraints.push(Constraint {
            name: name.to_string(),
            variables,
            func: Box::new(func),
        });
        Ok(())
    }

    /// Run the fit on the current values. Numerical failures are reported in the status of the
    /// result, structural problems of the setup are errors.
    pub fn fit(&self) -> Result<FitResult, FitterError> {
        if self.constraints.is_empty() {
            return Err(FitterError::NoConstraints);
        }

        let x0: Vec<f64> = self
            .variables
            .iter()
            .flat_map(|v| v.before.iter().copied())
            .collect();
        let mut n_function_calls = 0;

        // the size of each constraint is known after the first evaluation
        let mut n_equations = Vec::with_capacity(self.constraints.len());
        for constraint in self.constraints.iter() {
            n_equations.push(self.evaluate_one(constraint, &self.offsets(), &x0).len());
        }
        n_function_calls += 1;

        let layout = self.make_layout(n_equations);
        let n_constraints: usize = layout.n_equations.iter().sum();
        if layout.unmeasured.len() > n_constraints {
            return Err(FitterError::Underdetermined(layout.unmeasured.len(), n_constraints));
        }
        let ndof = n_constraints - layout.unmeasured.len();

        let v = DVector::from_iterator(
            layout.measured.len(),
            layout.measured.iter().map(|i| layout.sigmas[*i].powi(2)),
        );
        let x0_m = DVector::from_iterator(layout.measured.len(), layout.measured.iter().map(|i| x0[*i]));

        let limits: Vec<Limit> = self
            .variables
            .iter()
            .flat_map(|v| v.limits.iter().copied())
            .collect();

        let mut x = x0.clone();
        let mut chi2_prev = 0.0;
        let mut chi_square = 0.0;
        let mut status = FitStatus::NotConverged;
        let mut n_iterations = 0;

        for iteration in 1..=self.settings.max_iterations {
            n_iterations = iteration;
            if !within_limits(&limits, &x) {
                status = FitStatus::UnphysicalValues;
                break;
            }
            let f = self.evaluate(&layout, &x)?;
            n_function_calls += 1;
            if f.iter().any(|value| !value.is_finite()) {
                status = FitStatus::UnphysicalValues;
                break;
            }

            chi_square = compute_chi_square(&layout, &x0, &x);
            let max_f = f.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()));
            if max_f < self.settings.constraint_accuracy
                && (chi_square - chi2_prev).abs() < self.settings.chi2_accuracy
            {
                status = FitStatus::Success;
                break;
            }
            chi2_prev = chi_square;

            let (d_m, e_u) = self.jacobians(&layout, &x, &mut n_function_calls)?;
            let x_m = DVector::from_iterator(layout.measured.len(), layout.measured.iter().map(|i| x[*i]));
            let d = &f + &d_m * (&x0_m - &x_m);
            let vd_t = DMatrix::from_diagonal(&v) * d_m.transpose();
            let s = &d_m * &vd_t;
            let s_inv = match s.try_inverse() {
                Some(inv) => inv,
                None => {
                    status = FitStatus::SingularMatrix;
                    break;
                }
            };

            let mut rhs = d.clone();
            if !layout.unmeasured.is_empty() {
                let es = e_u.transpose() * &s_inv;
                let a_inv = match (&es * &e_u).try_inverse() {
                    Some(inv) => inv,
                    None => {
                        status = FitStatus::SingularMatrix;
                        break;
                    }
                };
                let du = -(a_inv * (&es * &d));
                for (k, i) in layout.unmeasured.iter().enumerate() {
                    x[*i] += du[k];
                }
                rhs += &e_u * du;
            }
            let lambda = &s_inv * rhs;
            let x_new = &x0_m - &vd_t * lambda;
            for (k, i) in layout.measured.iter().enumerate() {
                x[*i] = x_new[k];
            }
        }

        let sigmas_after = if status == FitStatus::Success {
            match self.covariance_after(&layout, &x, &v, &mut n_function_calls)? {
                Some(sigmas) => sigmas,
                None => {
                    status = FitStatus::SingularMatrix;
                    vec![0.0; x.len()]
                }
            }
        } else {
            vec![0.0; x.len()]
        };

        let probability = if status != FitStatus::Success {
            0.0
        } else if ndof == 0 {
            1.0
        } else {
            ChiSquared::new(ndof as f64)
                .map(|dist| dist.sf(chi_square))
                .unwrap_or(0.0)
        };

        spdlog::debug!(
            "Fit {} finished with {:?} after {} iterations, chi2={} ndof={}",
            self.name,
            status,
            n_iterations,
            chi_square,
            ndof
        );

        Ok(FitResult {
            status,
            chi_square,
            ndof,
            probability,
            n_iterations,
            n_function_calls,
            variables: self.collect_results(&layout, &x, &sigmas_after),
        })
    }

    fn offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.variables.len());
        let mut offset = 0;
        for variable in self.variables.iter() {
            offsets.push(offset);
            offset += variable.before.len();
        }
        offsets
    }

    fn make_layout(&self, n_equations: Vec<usize>) -> Layout {
        let mut measured = Vec::new();
        let mut unmeasured = Vec::new();
        let mut sigmas = Vec::new();
        for sigma in self.variables.iter().flat_map(|v| v.sigmas.iter()) {
            let i = sigmas.len();
            match sigma.normalized() {
                Sigma::Measured(s) => {
                    measured.push(i);
                    sigmas.push(s);
                }
                Sigma::Unmeasured => {
                    unmeasured.push(i);
                    sigmas.push(0.0);
                }
                Sigma::Fixed => sigmas.push(0.0),
            }
        }
        Layout {
            offsets: self.offsets(),
            measured,
            unmeasured,
            sigmas,
            n_equations,
        }
    }

    fn evaluate_one(&self, constraint: &Constraint, offsets: &[usize], x: &[f64]) -> Vec<f64> {
        let args: Vec<&[f64]> = constraint
            .variables
            .iter()
            .map(|v| {
                let start = offsets[*v];
                &x[start..start + self.variables[*v].before.len()]
            })
            .collect();
        (constraint.func)(&args)
    }

    /// Evaluate all constraints into one vector
    fn evaluate(&self, layout: &Layout, x: &[f64]) -> Result<DVector<f64>, FitterError> {
        let mut values = Vec::with_capacity(layout.n_equations.iter().sum());
        for (constraint, expected) in self.constraints.iter().zip(layout.n_equations.iter()) {
            let result = self.evaluate_one(constraint, &layout.offsets, x);
            if result.len() != *expected {
                return Err(FitterError::ConstraintSizeMismatch(
                    constraint.name.clone(),
                    result.len(),
                    *expected,
                ));
            }
            values.extend(result);
        }
        Ok(DVector::from_vec(values))
    }

    /// Jacobians with respect to the measured and the unmeasured components, by central differences
    fn jacobians(
        &self,
        layout: &Layout,
        x: &[f64],
        n_function_calls: &mut usize,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>), FitterError> {
        let n_rows: usize = layout.n_equations.iter().sum();
        let mut d_m = DMatrix::zeros(n_rows, layout.measured.len());
        let mut e_u = DMatrix::zeros(n_rows, layout.unmeasured.len());
        let mut shifted = x.to_vec();

        for (columns, indices, is_measured) in [
            (&mut d_m, &layout.measured, true),
            (&mut e_u, &layout.unmeasured, false),
        ] {
            for (k, i) in indices.iter().enumerate() {
                let h = if is_measured {
                    1e-3 * layout.sigmas[*i]
                } else {
                    1e-6 * x[*i].abs().max(1.0)
                };
                shifted[*i] = x[*i] + h;
                let up = self.evaluate(layout, &shifted)?;
                shifted[*i] = x[*i] - h;
                let down = self.evaluate(layout, &shifted)?;
                shifted[*i] = x[*i];
                *n_function_calls += 2;
                columns.set_column(k, &((up - down) / (2.0 * h)));
            }
        }
        Ok((d_m, e_u))
    }

    /// Sigmas of all components after the fit, from the fitted covariance
    ///
    /// ```text
    /// V' = V - V D^T S^-1 D V + V D^T S^-1 E A^-1 E^T S^-1 D V,   A = E^T S^-1 E
    /// ```
    fn covariance_after(
        &self,
        layout: &Layout,
        x: &[f64],
        v: &DVector<f64>,
        n_function_calls: &mut usize,
    ) -> Result<Option<Vec<f64>>, FitterError> {
        let mut sigmas = vec![0.0; x.len()];
        let (d_m, e_u) = self.jacobians(layout, x, n_function_calls)?;
        let v_mat = DMatrix::from_diagonal(v);
        let vd_t = &v_mat * d_m.transpose();
        let s_inv = match (&d_m * &vd_t).try_inverse() {
            Some(inv) => inv,
            None => return Ok(None),
        };
        let mut v_after = &v_mat - &vd_t * &s_inv * vd_t.transpose();

        if !layout.unmeasured.is_empty() {
            let es = e_u.transpose() * &s_inv;
            let a_inv = match (&es * &e_u).try_inverse() {
                Some(inv) => inv,
                None => return Ok(None),
            };
            let b = &vd_t * es.transpose();
            v_after += &b * &a_inv * b.transpose();
            for (k, i) in layout.unmeasured.iter().enumerate() {
                sigmas[*i] = a_inv[(k, k)].max(0.0).sqrt();
            }
        }
        for (k, i) in layout.measured.iter().enumerate() {
            sigmas[*i] = v_after[(k, k)].max(0.0).sqrt();
        }
        Ok(Some(sigmas))
    }

    fn collect_results(&self, layout: &Layout, x: &[f64], sigmas_after: &[f64]) -> BTreeMap<String, VariableResult> {
        let mut results = BTreeMap::new();
        for (variable, offset) in self.variables.iter().zip(layout.offsets.iter()) {
            let n = variable.before.len();
            let after = x[*offset..*offset + n].to_vec();
            let sigmas_before: Vec<f64> = (0..n).map(|k| layout.sigmas[offset + k]).collect();
            let sigmas_after = sigmas_after[*offset..*offset + n].to_vec();
            let pulls = (0..n)
                .map(|k| {
                    let denominator = sigmas_before[k].powi(2) - sigmas_after[k].powi(2);
                    if denominator > 0.0 && layout.measured.contains(&(offset + k)) {
                        (variable.before[k] - after[k]) / denominator.sqrt()
                    } else {
                        0.0
                    }
                })
                .collect();
            results.insert(
                variable.name.clone(),
                VariableResult {
                    before: variable.before.clone(),
                    after,
                    sigmas_before,
                    sigmas_after,
                    pulls,
                },
            );
        }
        results
    }
}

fn within_limits(limits: &[Limit], x: &[f64]) -> bool {
    limits
        .iter()
        .zip(x.iter())
        .all(|(limit, value)| limit.map_or(true, |(min, max)| (min..=max).contains(value)))
}

fn compute_chi_square(layout: &Layout, x0: &[f64], x: &[f64]) -> f64 {
    layout
        .measured
        .iter()
        .map(|i| ((x0[*i] - x[*i]) / layout.sigmas[*i]).powi(2))
        .sum()
}
