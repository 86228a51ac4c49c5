//! Binary SHA-256 Merkle accumulator over balance records.
//!
//! Levels are paired left to right. When a level has an odd number of nodes
//! the last node is paired with itself, so a single record commits to
//! `H(leaf ‖ leaf)`. The empty tree commits to `SHA-256("")`.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{
    error::{TreeError, TreeResult},
    types::BalanceRecord,
};

/// A 32-byte SHA-256 output.
pub type NodeHash = [u8; 32];

/// Hash a balance record into its leaf.
pub fn hash_leaf(record: &BalanceRecord) -> NodeHash {
    Sha256::digest(record.encode()).into()
}

/// Hash two children into their parent.
pub fn hash_pair(left: &NodeHash, right: &NodeHash) -> NodeHash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn empty_root() -> NodeHash {
    Sha256::digest(b"").into()
}

/// Node in a built tree.
///
/// Leaves have no children. So does the padding node that stands in for the
/// missing right sibling on an odd level: it carries only the hash of the
/// node it duplicates, whose subtree is already reachable on the left.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleNode {
    pub hash: NodeHash,
    pub left: Option<Box<MerkleNode>>,
    pub right: Option<Box<MerkleNode>>,
}

impl MerkleNode {
    fn leaf(hash: NodeHash) -> Self {
        Self {
            hash,
            left: None,
            right: None,
        }
    }

    fn padding(of: &MerkleNode) -> Self {
        Self::leaf(of.hash)
    }

    fn parent(left: MerkleNode, right: MerkleNode) -> Self {
        Self {
            hash: hash_pair(&left.hash, &right.hash),
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Operand position the sibling took when its parent was hashed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// Parent = `H(sibling ‖ current)`.
    Left = 0,
    /// Parent = `H(current ‖ sibling)`.
    Right = 1,
}

impl Direction {
    pub fn as_index(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Direction {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Left),
            1 => Ok(Direction::Right),
            other => Err(other),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireProof {
    merkle_path: Vec<Vec<u8>>,
    path_indices: Vec<u8>,
}

/// Inclusion proof: siblings ordered from the leaf level up.
///
/// Siblings and directions always have equal length; the only constructors
/// check it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireProof", into = "WireProof")]
pub struct MerkleProof {
    siblings: Vec<NodeHash>,
    directions: Vec<Direction>,
}

impl MerkleProof {
    pub fn new(siblings: Vec<NodeHash>, directions: Vec<Direction>) -> TreeResult<Self> {
        if siblings.len() != directions.len() {
            return Err(TreeError::ProofLengthMismatch {
                siblings: siblings.len(),
                directions: directions.len(),
            });
        }
        Ok(Self {
            siblings,
            directions,
        })
    }

    /// Decode the `merkle_path` / `path_indices` wire pair.
    pub fn from_wire(merkle_path: &[Vec<u8>], path_indices: &[u8]) -> TreeResult<Self> {
        if merkle_path.len() != path_indices.len() {
            return Err(TreeError::ProofLengthMismatch {
                siblings: merkle_path.len(),
                directions: path_indices.len(),
            });
        }

        let siblings = merkle_path
            .iter()
            .enumerate()
            .map(|(index, bytes)| {
                NodeHash::try_from(bytes.as_slice()).map_err(|_| TreeError::InvalidDigest {
                    index,
                    len: bytes.len(),
                })
            })
            .collect::<TreeResult<Vec<_>>>()?;

        let directions = path_indices
            .iter()
            .enumerate()
            .map(|(index, value)| {
                Direction::try_from(*value)
                    .map_err(|value| TreeError::InvalidDirection { index, value })
            })
            .collect::<TreeResult<Vec<_>>>()?;

        Self::new(siblings, directions)
    }

    pub fn siblings(&self) -> &[NodeHash] {
        &self.siblings
    }

    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    /// Sibling digests as owned byte vectors (`merkle_path`).
    pub fn merkle_path(&self) -> Vec<Vec<u8>> {
        self.siblings.iter().map(|s| s.to_vec()).collect()
    }

    /// Directions as `0 = Left`, `1 = Right` (`path_indices`).
    pub fn path_indices(&self) -> Vec<u8> {
        self.directions.iter().map(|d| d.as_index()).collect()
    }

    pub fn len(&self) -> usize {
        self.siblings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }
}

impl TryFrom<WireProof> for MerkleProof {
    type Error = TreeError;

    fn try_from(wire: WireProof) -> Result<Self, Self::Error> {
        Self::from_wire(&wire.merkle_path, &wire.path_indices)
    }
}

impl From<MerkleProof> for WireProof {
    fn from(proof: MerkleProof) -> Self {
        WireProof {
            merkle_path: proof.merkle_path(),
            path_indices: proof.path_indices(),
        }
    }
}

/// Fold `proof` upward from `leaf` and compare against `expected_root`.
pub fn verify_inclusion(proof: &MerkleProof, leaf: &NodeHash, expected_root: &NodeHash) -> bool {
    let computed = proof
        .siblings
        .iter()
        .zip(&proof.directions)
        .fold(*leaf, |current, (sibling, direction)| match direction {
            Direction::Left => hash_pair(sibling, &current),
            Direction::Right => hash_pair(&current, sibling),
        });
    computed == *expected_root
}

/// Merkle tree committed over one aggregation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceTree {
    root: MerkleNode,
    leaves: Vec<NodeHash>,
    /// Levels above the leaves; every proof has this many siblings.
    height: usize,
}

impl BalanceTree {
    pub fn build(records: &[BalanceRecord]) -> Self {
        let leaves: Vec<NodeHash> = records.iter().map(hash_leaf).collect();

        if leaves.is_empty() {
            return Self {
                root: MerkleNode::leaf(empty_root()),
                leaves,
                height: 0,
            };
        }

        let mut level: Vec<MerkleNode> = leaves.iter().copied().map(MerkleNode::leaf).collect();
        let mut height = 0;
        loop {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut nodes = level.into_iter();
            while let Some(left) = nodes.next() {
                let right = match nodes.next() {
                    Some(right) => right,
                    None => MerkleNode::padding(&left),
                };
                next.push(MerkleNode::parent(left, right));
            }
            level = next;
            height += 1;
            if level.len() == 1 {
                break;
            }
        }

        // The loop exits with exactly one node.
        let root = level.pop().unwrap_or_else(|| MerkleNode::leaf(empty_root()));
        Self {
            root,
            leaves,
            height,
        }
    }

    pub fn root(&self) -> NodeHash {
        self.root.hash
    }

    pub fn root_hex(&self) -> String {
        hex::encode(self.root.hash)
    }

    pub fn root_node(&self) -> &MerkleNode {
        &self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Leaf hashes in record order.
    pub fn leaves(&self) -> &[NodeHash] {
        &self.leaves
    }

    /// Proof for the first leaf (left-first search) equal to `leaf`.
    pub fn prove_inclusion(&self, leaf: &NodeHash) -> Option<MerkleProof> {
        if self.leaves.is_empty() {
            return None;
        }

        let mut siblings = Vec::new();
        let mut directions = Vec::new();
        if !collect_path(&self.root, self.height, leaf, &mut siblings, &mut directions) {
            return None;
        }
        Some(MerkleProof {
            siblings,
            directions,
        })
    }

    pub fn prove_record(&self, record: &BalanceRecord) -> Option<MerkleProof> {
        self.prove_inclusion(&hash_leaf(record))
    }
}

fn collect_path(
    node: &MerkleNode,
    height: usize,
    target: &NodeHash,
    siblings: &mut Vec<NodeHash>,
    directions: &mut Vec<Direction>,
) -> bool {
    if height == 0 {
        return node.hash == *target;
    }
    match (&node.left, &node.right) {
        (Some(left), Some(right)) => {
            if collect_path(left, height - 1, target, siblings, directions) {
                siblings.push(right.hash);
                directions.push(Direction::Right);
                true
            } else if collect_path(right, height - 1, target, siblings, directions) {
                siblings.push(left.hash);
                directions.push(Direction::Left);
                true
            } else {
                false
            }
        }
        // Padding: the duplicated subtree was already searched on the left.
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(token_id: u64, balance: u128) -> BalanceRecord {
        BalanceRecord::new(token_id, balance, [7u8; 32], b"{}".to_vec())
    }

    #[test]
    fn test_empty_tree_root() {
        let tree = BalanceTree::build(&[]);
        assert_eq!(
            tree.root_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(tree.leaf_count(), 0);
        assert!(tree.prove_inclusion(&tree.root()).is_none());
    }

    #[test]
    fn test_single_record_pairs_with_itself() {
        let r = record(1, 100);
        let tree = BalanceTree::build(std::slice::from_ref(&r));
        let leaf = hash_leaf(&r);
        assert_eq!(tree.root(), hash_pair(&leaf, &leaf));

        let proof = tree.prove_record(&r).expect("single leaf should be provable");
        assert_eq!(proof.siblings(), &[leaf]);
        assert_eq!(proof.directions(), &[Direction::Right]);
        assert!(verify_inclusion(&proof, &leaf, &tree.root()));
    }

    #[test]
    fn test_three_records_duplicate_last_leaf() {
        let records = [record(1, 1), record(2, 2), record(3, 3)];
        let tree = BalanceTree::build(&records);
        let [a, b, c] = [
            hash_leaf(&records[0]),
            hash_leaf(&records[1]),
            hash_leaf(&records[2]),
        ];
        let expected = hash_pair(&hash_pair(&a, &b), &hash_pair(&c, &c));
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn test_proof_directions_match_operand_position() {
        let records = [record(1, 1), record(2, 2), record(3, 3), record(4, 4)];
        let tree = BalanceTree::build(&records);
        let leaves: Vec<_> = records.iter().map(hash_leaf).collect();

        // Second leaf: sibling a on the left, then the right-hand pair.
        let proof = tree.prove_inclusion(&leaves[1]).unwrap();
        assert_eq!(proof.directions(), &[Direction::Left, Direction::Right]);
        assert_eq!(
            proof.siblings(),
            &[leaves[0], hash_pair(&leaves[2], &leaves[3])]
        );
        assert_eq!(proof.path_indices(), vec![0, 1]);
    }

    #[test]
    fn test_every_leaf_verifies() {
        let records: Vec<_> = (0..7u64).map(|i| record(i, u128::from(i) * 10)).collect();
        let tree = BalanceTree::build(&records);
        for leaf in tree.leaves() {
            let proof = tree.prove_inclusion(leaf).unwrap();
            assert!(verify_inclusion(&proof, leaf, &tree.root()));
        }
    }

    #[test]
    fn test_odd_levels_pad_with_hash_only_nodes() {
        let records: Vec<_> = (1..=5u64).map(|i| record(i, u128::from(i))).collect();
        let tree = BalanceTree::build(&records);
        let l: Vec<_> = records.iter().map(hash_leaf).collect();

        let ee = hash_pair(&l[4], &l[4]);
        let expected = hash_pair(
            &hash_pair(&hash_pair(&l[0], &l[1]), &hash_pair(&l[2], &l[3])),
            &hash_pair(&ee, &ee),
        );
        assert_eq!(tree.root(), expected);

        let upper = tree.root_node().right.as_deref().unwrap();
        let padding = upper.right.as_deref().unwrap();
        assert_eq!(padding.hash, ee);
        assert!(padding.left.is_none() && padding.right.is_none());

        let proof = tree.prove_inclusion(&l[4]).unwrap();
        assert_eq!(
            proof.directions(),
            &[Direction::Right, Direction::Right, Direction::Left]
        );
        assert!(verify_inclusion(&proof, &l[4], &tree.root()));
    }

    #[test]
    fn test_balance_change_breaks_proof() {
        let tree = BalanceTree::build(&[record(1, 100), record(2, 0)]);
        let other = BalanceTree::build(&[record(1, 101), record(2, 0)]);
        assert_ne!(tree.root(), other.root());

        let leaf = hash_leaf(&record(1, 100));
        let proof = tree.prove_inclusion(&leaf).unwrap();
        assert!(verify_inclusion(&proof, &leaf, &tree.root()));
        assert!(!verify_inclusion(&proof, &leaf, &other.root()));
    }

    #[test]
    fn test_proof_for_one_leaf_rejects_another() {
        let records = [record(1, 1), record(2, 2), record(3, 3)];
        let tree = BalanceTree::build(&records);
        let a = hash_leaf(&records[0]);
        let b = hash_leaf(&records[1]);
        let proof = tree.prove_inclusion(&a).unwrap();
        assert!(!verify_inclusion(&proof, &b, &tree.root()));
    }

    #[test]
    fn test_absent_leaf_has_no_proof() {
        let tree = BalanceTree::build(&[record(1, 1), record(2, 2)]);
        assert!(tree.prove_record(&record(9, 9)).is_none());
    }

    #[test]
    fn test_proof_new_rejects_length_mismatch() {
        let err = MerkleProof::new(vec![[0u8; 32]], vec![]).unwrap_err();
        assert_eq!(
            err,
            TreeError::ProofLengthMismatch {
                siblings: 1,
                directions: 0
            }
        );
    }

    #[test]
    fn test_from_wire_validation() {
        assert!(matches!(
            MerkleProof::from_wire(&[vec![0u8; 31]], &[0]),
            Err(TreeError::InvalidDigest { index: 0, len: 31 })
        ));
        assert!(matches!(
            MerkleProof::from_wire(&[vec![0u8; 32]], &[2]),
            Err(TreeError::InvalidDirection { index: 0, value: 2 })
        ));
        assert!(matches!(
            MerkleProof::from_wire(&[vec![0u8; 32]], &[]),
            Err(TreeError::ProofLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_proof_serde_uses_wire_fields() {
        let tree = BalanceTree::build(&[record(1, 1), record(2, 2)]);
        let proof = tree.prove_record(&record(2, 2)).unwrap();

        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["path_indices"], serde_json::json!([0]));
        assert_eq!(json["merkle_path"][0].as_array().unwrap().len(), 32);

        let back: MerkleProof = serde_json::from_value(json).unwrap();
        assert_eq!(back, proof);
    }

    #[test]
    fn test_verify_never_panics_on_empty_proof() {
        let proof = MerkleProof::new(vec![], vec![]).unwrap();
        let leaf = [1u8; 32];
        assert!(verify_inclusion(&proof, &leaf, &leaf));
        assert!(!verify_inclusion(&proof, &leaf, &[2u8; 32]));
    }
}
