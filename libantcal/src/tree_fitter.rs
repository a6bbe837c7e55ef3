use std::collections::VecDeque;

use super::config::FitSettings;
use super::constants::MASS_PROTON;
use super::constraint_fitter::FitResult;
use super::error::{FitterError, TreeFitterError};
use super::kin_fitter::{fit_lorentz_vec, photon_name, KinFitter, PROTON_NAME, Z_VERTEX_NAME};
use super::lorentz_vec::LorentzVec;
use super::particle::{Particle, ParticleType};
use super::particle_tree::ParticleTypeTree;
use super::uncertainty_model::UncertaintyModel;

pub const IM_CONSTRAINT_NAME: &str = "IM_at_nodes";

/// Settings of the invariant mass constraint at a node of the decay tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSetup {
    /// Sigma of the invariant mass in MeV
    pub im_sigma: f64,
    /// Do not constrain the invariant mass of this node
    pub excluded: bool,
}

impl Default for NodeSetup {
    fn default() -> Self {
        Self {
            im_sigma: 1.0,
            excluded: false,
        }
    }
}

/// The summed 4-vectors at every node of the decay tree for one assignment of particles
#[derive(Debug, Clone)]
pub struct NodeSums<'a> {
    tree: &'a ParticleTypeTree,
    sums: Vec<LorentzVec>,
}

impl NodeSums<'_> {
    pub fn tree(&self) -> &ParticleTypeTree {
        self.tree
    }

    pub fn get(&self, node: usize) -> LorentzVec {
        self.sums[node]
    }

    /// The sums of all nodes of the given type, in tree order
    pub fn of_type(&self, ptype: ParticleType) -> Vec<LorentzVec> {
        self.tree
            .post_order()
            .into_iter()
            .filter(|n| self.tree.get(*n) == ptype)
            .map(|n| self.sums[n])
            .collect()
    }
}

/// Rates an iteration before fitting. Lower is better, exactly 0 drops the iteration.
pub type IterationFilter = Box<dyn Fn(&NodeSums) -> f64>;

#[derive(Debug, Clone, PartialEq)]
struct Iteration {
    permutation: Vec<usize>,
    cost: f64,
}

/// Sum up the leaves bottom-up through the given internal nodes (daughters before parents)
fn compute_sums(tree: &ParticleTypeTree, sum_nodes: &[usize], leaves: &[(usize, LorentzVec)]) -> Vec<LorentzVec> {
    let mut sums = vec![LorentzVec::default(); tree.len()];
    for (node, v) in leaves.iter() {
        sums[*node] = *v;
    }
    for node in sum_nodes.iter() {
        let sum: LorentzVec = tree.daughters(*node).iter().map(|d| sums[*d]).sum();
        sums[*node] = sum;
    }
    sums
}

/// TreeFitter extends the [`KinFitter`] with invariant mass constraints given by a decay tree.
///
/// The photons of an event can be assigned to the photon leaves of the tree in many ways. Only
/// assignments giving different trees are tried: swapping the two photons of a Pi0, or two
/// identical subtrees, does not change the fit. Each call of [`TreeFitter::next_fit`] fits the
/// next assignment; picking the best result is up to the caller.
///
/// A proton directly below the BeamTarget root carries no invariant mass information and is
/// only handled by the energy-momentum constraint of the KinFitter.
pub struct TreeFitter {
    kin_fitter: KinFitter,
    tree: ParticleTypeTree,
    sum_nodes: Vec<usize>,
    proton_leaf: Option<usize>,
    photon_leaves: Vec<usize>,
    permutations: Vec<Vec<usize>>,
    iterations: VecDeque<Iteration>,
    current: Option<Iteration>,
    event: Option<(f64, Particle, Vec<Particle>)>,
    iteration_filter: Option<IterationFilter>,
    max_iterations: usize,
}

impl std::fmt::Debug for TreeFitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeFitter")
            .field("kin_fitter", &self.kin_fitter)
            .field("tree", &self.tree.decay_string())
            .field("permutations", &self.permutations.len())
            .field("queued", &self.iterations.len())
            .finish()
    }
}

impl TreeFitter {
    pub fn new<F>(
        name: &str,
        tree: &ParticleTypeTree,
        model: Box<dyn UncertaintyModel>,
        fit_z_vertex: bool,
        node_setup: F,
        settings: FitSettings,
    ) -> Result<Self, TreeFitterError>
    where
        F: Fn(ParticleType) -> NodeSetup,
    {
        let mut tree = tree.clone();
        tree.sort();

        let mut proton_leaves: Vec<usize> = Vec::new();
        let mut photon_leaves: Vec<usize> = Vec::new();
        for node in tree.leaves() {
            match tree.get(node) {
                ParticleType::Photon => photon_leaves.push(node),
                ParticleType::Proton => proton_leaves.push(node),
                other => return Err(TreeFitterError::BadLeaf(other.to_string())),
            }
        }
        if (0..tree.len()).any(|n| tree.get(n) == ParticleType::Photon && !tree.is_leaf(n)) {
            return Err(TreeFitterError::PhotonWithDaughters);
        }
        if proton_leaves.len() > 1 {
            return Err(TreeFitterError::TooManyProtons);
        }
        if photon_leaves.is_empty() {
            return Err(TreeFitterError::NoPhotons);
        }

        // a proton below the beam target is left to the KinFitter
        let proton_leaf = proton_leaves.first().copied().filter(|p| {
            tree.parent(*p)
                .map_or(true, |parent| tree.get(parent) != ParticleType::BeamTarget)
        });

        let mut kin_fitter = KinFitter::new(name, photon_leaves.len(), model, fit_z_vertex, settings)?;
        let permutations = tree.unique_permutations(&photon_leaves);

        let sum_nodes: Vec<usize> = tree
            .post_order()
            .into_iter()
            .filter(|n| !tree.is_leaf(*n) && tree.get(*n) != ParticleType::BeamTarget)
            .collect();
        let mut constrained: Vec<(usize, f64, f64)> = Vec::new();
        for node in sum_nodes.iter() {
            let ptype = tree.get(*node);
            let setup = node_setup(ptype);
            if setup.excluded {
                continue;
            }
            spdlog::info!("IM constraint for {ptype} with sigma={}", setup.im_sigma);
            constrained.push((*node, ptype.mass(), setup.im_sigma));
        }

        spdlog::info!(
            "Initialized TreeFitter '{name}' for {} with {} permutations, including KinFit",
            tree.decay_string(),
            permutations.len()
        );
        spdlog::info!(
            "Have {} constraints at {} nodes",
            constrained.len(),
            sum_nodes.len()
        );

        if !constrained.is_empty() {
            // leaves in the order of the constraint variables: (node, mass, detector index)
            let mut leaf_bindings: Vec<(usize, f64, usize)> = Vec::new();
            let mut variable_names: Vec<String> = Vec::new();
            if let Some(proton) = proton_leaf {
                leaf_bindings.push((proton, MASS_PROTON, 0));
                variable_names.push(PROTON_NAME.to_string());
            }
            for (i, photon) in photon_leaves.iter().enumerate() {
                leaf_bindings.push((*photon, 0.0, i + 1));
                variable_names.push(photon_name(i));
            }
            if fit_z_vertex {
                variable_names.push(Z_VERTEX_NAME.to_string());
            }
            let names: Vec<&str> = variable_names.iter().map(|n| n.as_str()).collect();

            let detectors = kin_fitter.shared_detectors();
            let constraint_tree = tree.clone();
            let constraint_sum_nodes = sum_nodes.clone();
            kin_fitter
                .fitter_mut()
                .add_constraint(IM_CONSTRAINT_NAME, &names, move |v: &[&[f64]]| {
                    let detectors = detectors.borrow();
                    let z_vertex = if fit_z_vertex { v[leaf_bindings.len()][0] } else { 0.0 };
                    let leaves: Vec<(usize, LorentzVec)> = leaf_bindings
                        .iter()
                        .enumerate()
                        .map(|(k, (node, mass, detector))| {
                            (*node, fit_lorentz_vec(v[k], *mass, detectors[*detector], z_vertex))
                        })
                        .collect();
                    let sums = compute_sums(&constraint_tree, &constraint_sum_nodes, &leaves);
                    constrained
                        .iter()
                        .map(|(node, mass, sigma)| (mass - sums[*node].m()) / sigma)
                        .collect()
                })?;
        }

        Ok(Self {
            kin_fitter,
            tree,
            sum_nodes,
            proton_leaf,
            photon_leaves,
            permutations,
            iterations: VecDeque::new(),
            current: None,
            event: None,
            iteration_filter: None,
            max_iterations: 0,
        })
    }

    /// Rate iterations before fitting. With max > 0 only the best max iterations are fitted.
    pub fn set_iteration_filter(&mut self, filter: IterationFilter, max: usize) {
        self.iteration_filter = Some(filter);
        self.max_iterations = max;
    }

    /// Load an event and queue all unique assignments of its photons
    pub fn prepare_fits(&mut self, beam_energy: f64, proton: &Particle, photons: &[Particle]) -> Result<(), TreeFitterError> {
        self.kin_fitter.prepare_fit(beam_energy, proton, photons)?;
        self.event = Some((beam_energy, *proton, photons.to_vec()));
        self.current = None;
        self.iterations = self
            .permutations
            .iter()
            .map(|p| Iteration {
                permutation: p.clone(),
                cost: 0.0,
            })
            .collect();

        if self.iteration_filter.is_none() {
            return Ok(());
        }

        let mut rated: Vec<Iteration> = Vec::with_capacity(self.iterations.len());
        while let Some(mut iteration) = self.iterations.pop_front() {
            let permuted = permute(photons, &iteration.permutation);
            self.kin_fitter.prepare_fit(beam_energy, proton, &permuted)?;
            let (proton_lv, photon_lvs) = self
                .kin_fitter
                .prepared_lorentz_vecs()
                .ok_or(TreeFitterError::FitterError(FitterError::NotPrepared))?;
            let sums = self.sums_for(proton_lv, &photon_lvs);
            if let Some(filter) = &self.iteration_filter {
                iteration.cost = filter(&NodeSums {
                    tree: &self.tree,
                    sums,
                });
            }
            if iteration.cost != 0.0 {
                rated.push(iteration);
            }
        }

        rated.sort_by(|a, b| a.cost.total_cmp(&b.cost));
        if self.max_iterations > 0 && self.max_iterations <= rated.len() {
            rated.truncate(self.max_iterations);
        }
        self.iterations = rated.into();
        Ok(())
    }

    /// Fit the next queued iteration. Returns None once all iterations are done.
    pub fn next_fit(&mut self) -> Result<Option<FitResult>, TreeFitterError> {
        let (beam_energy, proton, photons) = self
            .event
            .clone()
            .ok_or(TreeFitterError::FitterError(FitterError::NotPrepared))?;
        let iteration = match self.iterations.pop_front() {
            Some(iteration) => iteration,
            None => return Ok(None),
        };
        let permuted = permute(&photons, &iteration.permutation);
        self.kin_fitter.prepare_fit(beam_energy, &proton, &permuted)?;
        let result = self.kin_fitter.do_fit()?;
        self.current = Some(iteration);
        Ok(Some(result))
    }

    /// The assignment of the last fit: photon permutation[i] sits at photon leaf i
    pub fn current_permutation(&self) -> Option<&[usize]> {
        self.current.as_ref().map(|it| it.permutation.as_slice())
    }

    /// The node sums of the last fit, built from the fitted particles
    pub fn fitted_node_sums(&self) -> Option<NodeSums<'_>> {
        self.current.as_ref()?;
        let photons: Vec<LorentzVec> = self
            .kin_fitter
            .fitted_photons()
            .iter()
            .map(|p| p.lorentz_vec())
            .collect();
        if photons.len() != self.photon_leaves.len() {
            return None;
        }
        let proton = self.kin_fitter.fitted_proton()?.lorentz_vec();
        Some(NodeSums {
            tree: &self.tree,
            sums: self.sums_for(proton, &photons),
        })
    }

    pub fn permutation_count(&self) -> usize {
        self.permutations.len()
    }

    pub fn queued_iterations(&self) -> usize {
        self.iterations.len()
    }

    /// The decay tree in canonical order
    pub fn tree(&self) -> &ParticleTypeTree {
        &self.tree
    }

    pub fn kin_fitter(&self) -> &KinFitter {
        &self.kin_fitter
    }

    pub fn kin_fitter_mut(&mut self) -> &mut KinFitter {
        &mut self.kin_fitter
    }

    fn sums_for(&self, proton: LorentzVec, photons: &[LorentzVec]) -> Vec<LorentzVec> {
        let mut leaves: Vec<(usize, LorentzVec)> = self
            .photon_leaves
            .iter()
            .copied()
            .zip(photons.iter().copied())
            .collect();
        if let Some(node) = self.proton_leaf {
            leaves.push((node, proton));
        }
        compute_sums(&self.tree, &self.sum_nodes, &leaves)
    }
}

fn permute(photons: &[Particle], permutation: &[usize]) -> Vec<Particle> {
    permutation.iter().map(|i| photons[*i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MASS_PI0;
    use crate::constraint_fitter::FitStatus;
    use crate::kin_fitter::tests::make_event;
    use crate::lorentz_vec::vec_r_theta_phi;
    use crate::uncertainty_model::SimpleModel;
    use approx::assert_relative_eq;
    use ParticleType::*;

    fn two_pi0_tree() -> ParticleTypeTree {
        let mut tree = ParticleTypeTree::new(BeamTarget);
        tree.add_daughter(0, Proton);
        tree.add_decay(0, Pi0, &[Photon, Photon]);
        tree.add_decay(0, Pi0, &[Photon, Photon]);
        tree
    }

    /// The two photons of a Pi0 with momentum p in direction (theta, phi), decaying along the
    /// rest frame axis (decay_theta, decay_phi)
    fn pi0_decay(p: f64, theta: f64, phi: f64, decay_theta: f64, decay_phi: f64) -> [LorentzVec; 2] {
        let pi0 = LorentzVec::from_e_p_theta_phi((p * p + MASS_PI0 * MASS_PI0).sqrt(), p, theta, phi);
        let axis = vec_r_theta_phi(MASS_PI0 / 2.0, decay_theta, decay_phi);
        let beta = pi0.boost_vector();
        [
            LorentzVec { p: axis, e: MASS_PI0 / 2.0 }.boost(&beta),
            LorentzVec { p: -axis, e: MASS_PI0 / 2.0 }.boost(&beta),
        ]
    }

    fn two_pi0_event() -> (f64, Particle, Vec<Particle>) {
        let [g1, g2] = pi0_decay(300.0, 0.9, 0.4, 1.3, 2.0);
        let [g3, g4] = pi0_decay(250.0, 1.6, -2.0, 0.7, -0.5);
        let photons = vec![g1, g2, g3, g4];
        let (beam, proton) = make_event(&photons);
        (
            beam,
            Particle::from_lorentz_vec(Proton, &proton),
            photons.iter().map(|p| Particle::from_lorentz_vec(Photon, p)).collect(),
        )
    }

    fn make_fitter() -> TreeFitter {
        TreeFitter::new(
            "2pi0",
            &two_pi0_tree(),
            Box::new(SimpleModel::default()),
            false,
            |_| NodeSetup::default(),
            FitSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_permutations_exhaust() {
        let mut fitter = make_fitter();
        // half of the 6 orderings left after the photon swaps inside each Pi0
        assert_eq!(fitter.permutation_count(), 3);
        assert!(matches!(
            fitter.next_fit(),
            Err(TreeFitterError::FitterError(FitterError::NotPrepared))
        ));

        let (beam, proton, photons) = two_pi0_event();
        fitter.prepare_fits(beam, &proton, &photons).unwrap();
        assert_eq!(fitter.queued_iterations(), 3);

        let first = fitter.next_fit().unwrap().unwrap();
        assert_eq!(fitter.current_permutation(), Some(&[0, 1, 2, 3][..]));
        assert_eq!(first.status, FitStatus::Success);
        assert_relative_eq!(first.chi_square, 0.0, epsilon = 1e-6);
        // 4 energy-momentum + 2 invariant mass constraints, unmeasured proton energy
        assert_eq!(first.ndof, 5);

        let sums = fitter.fitted_node_sums().unwrap();
        for pi0 in sums.of_type(Pi0) {
            assert_relative_eq!(pi0.m(), MASS_PI0, epsilon = 1e-4);
        }

        assert!(fitter.next_fit().unwrap().is_some());
        assert!(fitter.next_fit().unwrap().is_some());
        assert!(fitter.next_fit().unwrap().is_none());
        assert_eq!(fitter.queued_iterations(), 0);
    }

    #[test]
    fn test_iteration_filter() {
        let mut fitter = make_fitter();
        fitter.set_iteration_filter(
            Box::new(|sums: &NodeSums| {
                sums.of_type(Pi0)
                    .iter()
                    .map(|pi0| (pi0.m() - MASS_PI0).abs())
                    .sum::<f64>()
                    + 1.0
            }),
            1,
        );
        let (beam, proton, photons) = two_pi0_event();
        fitter.prepare_fits(beam, &proton, &photons).unwrap();
        assert_eq!(fitter.queued_iterations(), 1);
        let result = fitter.next_fit().unwrap().unwrap();
        assert_eq!(result.status, FitStatus::Success);
        assert_eq!(fitter.current_permutation(), Some(&[0, 1, 2, 3][..]));

        // a filter rating everything 0 drops all iterations
        fitter.set_iteration_filter(Box::new(|_: &NodeSums| 0.0), 0);
        fitter.prepare_fits(beam, &proton, &photons).unwrap();
        assert_eq!(fitter.queued_iterations(), 0);
        assert!(fitter.next_fit().unwrap().is_none());
    }

    #[test]
    fn test_excluded_nodes() {
        let mut fitter = TreeFitter::new(
            "2pi0_free",
            &two_pi0_tree(),
            Box::new(SimpleModel::default()),
            false,
            |_| NodeSetup {
                excluded: true,
                ..Default::default()
            },
            FitSettings::default(),
        )
        .unwrap();
        let (beam, proton, photons) = two_pi0_event();
        fitter.prepare_fits(beam, &proton, &photons).unwrap();
        let result = fitter.next_fit().unwrap().unwrap();
        assert_eq!(result.ndof, 3);
    }

    #[test]
    fn test_bad_trees() {
        let build = |tree: &ParticleTypeTree| {
            TreeFitter::new(
                "bad",
                tree,
                Box::new(SimpleModel::default()),
                false,
                |_| NodeSetup::default(),
                FitSettings::default(),
            )
        };

        let mut leaf_pi0 = ParticleTypeTree::new(BeamTarget);
        leaf_pi0.add_daughter(0, Pi0);
        leaf_pi0.add_daughter(0, Photon);
        assert!(matches!(build(&leaf_pi0), Err(TreeFitterError::BadLeaf(_))));

        let mut photon_parent = ParticleTypeTree::new(BeamTarget);
        photon_parent.add_decay(0, Photon, &[Photon, Photon]);
        assert!(matches!(build(&photon_parent), Err(TreeFitterError::PhotonWithDaughters)));

        let mut two_protons = ParticleTypeTree::new(BeamTarget);
        two_protons.add_daughter(0, Proton);
        two_protons.add_daughter(0, Proton);
        two_protons.add_decay(0, Pi0, &[Photon, Photon]);
        assert!(matches!(build(&two_protons), Err(TreeFitterError::TooManyProtons)));

        let mut no_photons = ParticleTypeTree::new(BeamTarget);
        no_photons.add_daughter(0, Proton);
        assert!(matches!(build(&no_photons), Err(TreeFitterError::NoPhotons)));
    }
}
