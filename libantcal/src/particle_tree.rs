use fxhash::FxHashSet;

use super::particle::ParticleType;

/// Canonical form of a (sub)tree. Equal signatures mean the subtrees can be exchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Signature {
    Leaf(ParticleType, Option<usize>),
    Node(ParticleType, Vec<Signature>),
}

#[derive(Debug, Clone, PartialEq)]
struct TreeNode {
    ptype: ParticleType,
    parent: Option<usize>,
    daughters: Vec<usize>,
}

/// A decay topology, for example BeamTarget -> Proton + Pi0 (-> 2 Photon) + Pi0 (-> 2 Photon).
///
/// Nodes live in an arena and are addressed by index; the root is always index 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleTypeTree {
    nodes: Vec<TreeNode>,
}

impl ParticleTypeTree {
    pub fn new(root: ParticleType) -> Self {
        Self {
            nodes: vec![TreeNode {
                ptype: root,
                parent: None,
                daughters: Vec::new(),
            }],
        }
    }

    /// Add a daughter to the given node and return its index
    pub fn add_daughter(&mut self, parent: usize, ptype: ParticleType) -> usize {
        let index = self.nodes.len();
        self.nodes.push(TreeNode {
            ptype,
            parent: Some(parent),
            daughters: Vec::new(),
        });
        self.nodes[parent].daughters.push(index);
        index
    }

    /// Add a daughter decaying into the given leaves, returning the daughter index
    pub fn add_decay(&mut self, parent: usize, ptype: ParticleType, products: &[ParticleType]) -> usize {
        let index = self.add_daughter(parent, ptype);
        for product in products.iter() {
            self.add_daughter(index, *product);
        }
        index
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, node: usize) -> ParticleType {
        self.nodes[node].ptype
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        self.nodes[node].parent
    }

    pub fn daughters(&self, node: usize) -> &[usize] {
        &self.nodes[node].daughters
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.nodes[node].daughters.is_empty()
    }

    /// Number of nodes of the given type
    pub fn count(&self, ptype: ParticleType) -> usize {
        self.nodes.iter().filter(|n| n.ptype == ptype).count()
    }

    /// Bring the daughters of every node into canonical order, so that equal trees look equal
    pub fn sort(&mut self) {
        for node in self.post_order() {
            let mut daughters = self.nodes[node].daughters.clone();
            daughters.sort_by_cached_key(|d| self.signature(*d, &[]));
            self.nodes[node].daughters = daughters;
        }
    }

    /// All nodes, daughters before their parent
    pub fn post_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        self.visit_post_order(self.root(), &mut order);
        order
    }

    fn visit_post_order(&self, node: usize, order: &mut Vec<usize>) {
        for d in self.nodes[node].daughters.iter() {
            self.visit_post_order(*d, order);
        }
        order.push(node);
    }

    /// All leaves in depth first order
    pub fn leaves(&self) -> Vec<usize> {
        self.post_order()
            .into_iter()
            .filter(|n| self.is_leaf(*n))
            .collect()
    }

    /// Signature of a subtree. Leaves listed in labels are marked with their position in labels.
    fn signature(&self, node: usize, labels: &[(usize, usize)]) -> Signature {
        let current = &self.nodes[node];
        if current.daughters.is_empty() {
            let label = labels
                .iter()
                .find(|(leaf, _)| *leaf == node)
                .map(|(_, label)| *label);
            return Signature::Leaf(current.ptype, label);
        }
        let mut daughters: Vec<Signature> = current
            .daughters
            .iter()
            .map(|d| self.signature(*d, labels))
            .collect();
        daughters.sort();
        Signature::Node(current.ptype, daughters)
    }

    /// Find all assignments of particles to the given leaves which lead to different trees.
    ///
    /// A permutation `perm` assigns particle `perm[i]` to `slots[i]`. Permutations which only
    /// exchange particles between equivalent positions (the two photons of a Pi0, two Pi0s of the
    /// same decay) are dropped; the first one in lexicographic order represents them.
    pub fn unique_permutations(&self, slots: &[usize]) -> Vec<Vec<usize>> {
        let mut perm: Vec<usize> = (0..slots.len()).collect();
        let mut seen: FxHashSet<Signature> = FxHashSet::default();
        let mut unique: Vec<Vec<usize>> = Vec::new();
        loop {
            let labels: Vec<(usize, usize)> = slots
                .iter()
                .zip(perm.iter())
                .map(|(slot, particle)| (*slot, *particle))
                .collect();
            if seen.insert(self.signature(self.root(), &labels)) {
                unique.push(perm.clone());
            }
            if !next_permutation(&mut perm) {
                break;
            }
        }
        unique
    }

    /// Readable form like BeamTarget[Proton Pi0[Photon Photon]]
    pub fn decay_string(&self) -> String {
        self.node_string(self.root())
    }

    fn node_string(&self, node: usize) -> String {
        let current = &self.nodes[node];
        if current.daughters.is_empty() {
            return current.ptype.to_string();
        }
        let daughters: Vec<String> = current
            .daughters
            .iter()
            .map(|d| self.node_string(*d))
            .collect();
        format!("{}[{}]", current.ptype, daughters.join(" "))
    }
}

/// Advance to the next lexicographic permutation. Returns false after the last one.
fn next_permutation(perm: &mut [usize]) -> bool {
    if perm.len() < 2 {
        return false;
    }
    let mut i = perm.len() - 1;
    while i > 0 && perm[i - 1] >= perm[i] {
        i -= 1;
    }
    if i == 0 {
        return false;
    }
    let mut j = perm.len() - 1;
    while perm[j] <= perm[i - 1] {
        j -= 1;
    }
    perm.swap(i - 1, j);
    perm[i..].reverse();
    true
}
