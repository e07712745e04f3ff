use crate::error::VaultError;
use crate::fragment::Fragment;
use crate::hash::{ContentId, DIGEST_LEN};
use hex::ToHex;
use rs_merkle::algorithms::Sha256;
use rs_merkle::{MerkleProof, MerkleTree};

type Leaf = [u8; DIGEST_LEN];

/// Commitment over the plaintext hashes of a content's fragments, in
/// fragment_id order.
#[derive(Clone, Debug)]
pub struct FragmentTree {
    leaves: Vec<Leaf>,
    root: Option<Leaf>,
}

impl FragmentTree {
    /// Build a tree from pre-hashed leaves.
    pub fn from_leaves(leaves: Vec<Leaf>) -> Self {
        let tree = MerkleTree::<Sha256>::from_leaves(&leaves);
        Self {
            root: tree.root(),
            leaves,
        }
    }

    /// Build from fragment records, ordering by fragment_id first.
    pub fn from_fragments<'f, I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = &'f Fragment>,
    {
        let mut ordered: Vec<&Fragment> = fragments.into_iter().collect();
        ordered.sort_by_key(|fragment| fragment.fragment_id);
        Self::from_leaves(
            ordered
                .iter()
                .map(|fragment| *fragment.plaintext_hash.as_bytes())
                .collect(),
        )
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Return the Merkle root (if any leaves were provided).
    pub fn root(&self) -> Option<Leaf> {
        self.root
    }

    /// Render the root as a hex encoded string.
    pub fn root_hex(&self) -> Option<String> {
        self.root.map(|root| root.encode_hex::<String>())
    }

    /// Create an inclusion proof for the specified leaf indices.
    pub fn proof(&self, indices: &[usize]) -> Result<FragmentProof, VaultError> {
        if indices.iter().any(|&idx| idx >= self.leaves.len()) {
            return Err(VaultError::Merkle("leaf index out of range".into()));
        }
        let tree = MerkleTree::<Sha256>::from_leaves(&self.leaves);
        let mut leaf_indices = indices.to_vec();
        leaf_indices.sort_unstable();
        leaf_indices.dedup();
        Ok(FragmentProof {
            proof_hashes: tree.proof(&leaf_indices).proof_hashes().to_vec(),
            leaf_hashes: leaf_indices.iter().map(|&idx| self.leaves[idx]).collect(),
            leaf_indices,
        })
    }

    /// Verify the provided proof against this tree's root.
    pub fn verify(&self, proof: &FragmentProof) -> bool {
        match self.root {
            Some(root) => proof.verify(root, self.leaves.len()),
            None => false,
        }
    }
}

/// Inclusion proof for a subset of fragment hashes.
#[derive(Clone, Debug)]
pub struct FragmentProof {
    proof_hashes: Vec<Leaf>,
    leaf_indices: Vec<usize>,
    leaf_hashes: Vec<Leaf>,
}

impl FragmentProof {
    pub fn leaf_indices(&self) -> &[usize] {
        &self.leaf_indices
    }

    /// Check the proven leaves against an externally held root.
    pub fn verify(&self, root: Leaf, total_leaves: usize) -> bool {
        MerkleProof::<Sha256>::new(self.proof_hashes.clone()).verify(
            root,
            &self.leaf_indices,
            &self.leaf_hashes,
            total_leaves,
        )
    }

    /// Same proof with one leaf hash replaced, for checking a claimed fragment
    /// hash against the commitment.
    pub fn with_leaf(&self, position: usize, hash: &ContentId) -> Self {
        let mut out = self.clone();
        if let Some(slot) = out.leaf_hashes.get_mut(position) {
            *slot = *hash.as_bytes();
        }
        out
    }
}
