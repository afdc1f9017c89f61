//! merkle tree and inclusion proofs
//!
//! trees are built over the exact leaf ordering supplied by the caller.
//! ordering is a protocol invariant: the same ordering the on-chain or ASP
//! tree was built with, otherwise the recomputed root will not match the
//! root the contract expects. a missing target leaf is an explicit error,
//! never a defaulted index.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VeilError};
use crate::DOMAIN_MERKLE_NODE;

/// hash two child nodes
fn node_hash(left: U256, right: U256) -> U256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN_MERKLE_NODE);
    hasher.update(&left.to_be_bytes::<32>());
    hasher.update(&right.to_be_bytes::<32>());
    crate::commitment::digest_to_uint(hasher.finalize())
}

/// zero-subtree hashes per level: zeros[0] pads leaves, zeros[i] pads
/// level-i nodes
fn zero_hashes(depth: usize) -> Vec<U256> {
    let mut zeros = Vec::with_capacity(depth);
    zeros.push(U256::ZERO);
    for level in 1..depth {
        let child = zeros[level - 1];
        zeros.push(node_hash(child, child));
    }
    zeros
}

/// inclusion proof for one leaf
///
/// `siblings` is padded to the full tree depth with zero-subtree hashes so
/// the witness shape is fixed regardless of how full the tree is
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub root: U256,
    pub leaf: U256,
    pub index: u64,
    pub siblings: Vec<U256>,
}

impl MerkleProof {
    /// recombine the leaf with its sibling path and check the result
    /// against `root`
    pub fn verify(&self) -> bool {
        let mut current = self.leaf;
        let mut index = self.index;
        for sibling in &self.siblings {
            current = if index & 1 == 1 {
                node_hash(*sibling, current)
            } else {
                node_hash(current, *sibling)
            };
            index >>= 1;
        }
        index == 0 && current == self.root
    }
}

/// fixed-depth binary merkle tree over an ordered leaf list
pub struct MerkleTree {
    layers: Vec<Vec<U256>>,
    zeros: Vec<U256>,
    depth: usize,
}

impl MerkleTree {
    /// build a tree of `depth` levels over `leaves`, in the order given
    pub fn from_leaves(leaves: &[U256], depth: usize) -> Result<Self> {
        if leaves.is_empty() {
            return Err(VeilError::MissingLeaves("merkle tree needs at least one leaf"));
        }
        if depth < 64 && leaves.len() > 1usize << depth {
            return Err(VeilError::TreeOverflow {
                count: leaves.len(),
                depth,
            });
        }

        let zeros = zero_hashes(depth);
        let mut layers = Vec::with_capacity(depth + 1);
        layers.push(leaves.to_vec());
        for level in 0..depth {
            let prev = &layers[level];
            let mut next = Vec::with_capacity((prev.len() + 1) / 2);
            for pair in prev.chunks(2) {
                let left = pair[0];
                let right = if pair.len() == 2 { pair[1] } else { zeros[level] };
                next.push(node_hash(left, right));
            }
            layers.push(next);
        }

        Ok(Self { layers, zeros, depth })
    }

    pub fn root(&self) -> U256 {
        self.layers[self.depth][0]
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// inclusion proof for the first occurrence of `leaf`
    pub fn prove(&self, leaf: U256) -> Result<MerkleProof> {
        let index = self.layers[0]
            .iter()
            .position(|l| *l == leaf)
            .ok_or(VeilError::LeafNotFound(leaf))?;

        let mut siblings = Vec::with_capacity(self.depth);
        let mut pos = index;
        for level in 0..self.depth {
            let layer = &self.layers[level];
            let sibling_pos = pos ^ 1;
            siblings.push(if sibling_pos < layer.len() {
                layer[sibling_pos]
            } else {
                self.zeros[level]
            });
            pos >>= 1;
        }

        Ok(MerkleProof {
            root: self.root(),
            leaf,
            index: index as u64,
            siblings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaves(n: u64) -> Vec<U256> {
        (1..=n).map(U256::from).collect()
    }

    #[test]
    fn empty_leaf_set_rejected() {
        assert!(matches!(
            MerkleTree::from_leaves(&[], 8),
            Err(VeilError::MissingLeaves(_))
        ));
    }

    #[test]
    fn missing_leaf_is_an_error_not_index_zero() {
        let tree = MerkleTree::from_leaves(&leaves(5), 8).unwrap();
        match tree.prove(U256::from(99u64)) {
            Err(VeilError::LeafNotFound(leaf)) => assert_eq!(leaf, U256::from(99u64)),
            other => panic!("expected LeafNotFound, got {other:?}"),
        }
    }

    #[test]
    fn overflow_rejected() {
        assert!(matches!(
            MerkleTree::from_leaves(&leaves(5), 2),
            Err(VeilError::TreeOverflow { .. })
        ));
    }

    #[test]
    fn proof_round_trips_for_every_leaf() {
        let set = leaves(7);
        let tree = MerkleTree::from_leaves(&set, 8).unwrap();
        for leaf in &set {
            let proof = tree.prove(*leaf).unwrap();
            assert_eq!(proof.siblings.len(), 8);
            assert_eq!(proof.root, tree.root());
            assert!(proof.verify());
        }
    }

    #[test]
    fn tampered_proof_fails() {
        let tree = MerkleTree::from_leaves(&leaves(4), 8).unwrap();
        let mut proof = tree.prove(U256::from(2u64)).unwrap();
        proof.index = 0;
        assert!(!proof.verify());
    }

    #[test]
    fn ordering_changes_the_root() {
        let a = MerkleTree::from_leaves(&leaves(4), 8).unwrap();
        let mut reordered = leaves(4);
        reordered.swap(0, 3);
        let b = MerkleTree::from_leaves(&reordered, 8).unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn full_depth_tree_round_trips() {
        let set = leaves(3);
        let tree = MerkleTree::from_leaves(&set, crate::STATE_TREE_DEPTH).unwrap();
        let proof = tree.prove(U256::from(3u64)).unwrap();
        assert_eq!(proof.siblings.len(), crate::STATE_TREE_DEPTH);
        assert!(proof.verify());
    }

    #[test]
    fn shuffled_large_tree_round_trips() {
        use rand::prelude::*;
        let mut rng = StdRng::seed_from_u64(7);
        let mut set: Vec<U256> = (1u64..=200).map(U256::from).collect();
        set.shuffle(&mut rng);
        let tree = MerkleTree::from_leaves(&set, 10).unwrap();
        let target = set[rng.gen_range(0..set.len())];
        let proof = tree.prove(target).unwrap();
        assert!(proof.verify());
    }

    proptest! {
        #[test]
        fn random_leaf_sets_round_trip(n in 1u64..64, pick in 0u64..64) {
            let set = leaves(n);
            let tree = MerkleTree::from_leaves(&set, 10).unwrap();
            let target = set[(pick % n) as usize];
            let proof = tree.prove(target).unwrap();
            prop_assert!(proof.verify());
        }
    }
}
