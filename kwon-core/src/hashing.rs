//! Hash & Merkle primitives (C1).
//!
//! A `MerkleTree`/`MerkleProof` pair with odd-leaf duplication and
//! sibling-position proof folding, paired with the fixed-field-subset
//! leaf-hashing rule used for `AuditEvent.details_hash`.

use kwon_spec::{canonical_json_of_fields, ProofNode, ProofPosition};
use sha2::{Digest, Sha256};

/// Normalize a hex string: strip an optional `0x`/`0X` prefix, lowercase,
/// left-pad odd length with `0`. Returns an empty string for invalid input
/// so the caller can skip the event,
pub fn normalize_hex(value: &str) -> String {
 let mut s = value.trim();
 if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
 s = rest;
 }
 let mut lower = s.to_lowercase();
 if !lower.chars().all(|c| c.is_ascii_hexdigit()) {
 return String::new();
 }
 if lower.len() % 2 == 1 {
 lower.insert(0, '0');
 }
 lower
}

fn sha256_hex(data: &[u8]) -> String {
 hex::encode(Sha256::digest(data))
}

/// The fixed field subset hashed for `AuditEvent.details_hash`.
pub struct LeafFields<'a> {
 pub hash: &'a str,
 pub block_number: &'a str,
 pub time_stamp: &'a str,
 pub from: &'a str,
 pub to: &'a str,
 pub contract_address: &'a str,
 pub value: &'a str,
 pub token_decimal: &'a str,
}

/// `details_hash = SHA256(canonical_json(subset))`. All address/contract
/// fields are lowercased; all numeric fields are passed through as strings
/// by the caller already (mirrors `details_hash_from_tx`).
pub fn details_hash(fields: LeafFields<'_>) -> String {
 let picked: Vec<(&str, String)> = vec![
 ("hash", fields.hash.to_string()),
 ("blockNumber", fields.block_number.to_string()),
 ("timeStamp", fields.time_stamp.to_string()),
 ("from", fields.from.to_lowercase()),
 ("to", fields.to.to_lowercase()),
 ("contractAddress", fields.contract_address.to_lowercase()),
 ("value", fields.value.to_string()),
 ("tokenDecimal", fields.token_decimal.to_string()),
 ];
 let cj = canonical_json_of_fields(&picked);
 sha256_hex(cj.as_bytes())
}

fn merkle_parent(left: &[u8], right: &[u8]) -> [u8; 32] {
 let mut hasher = Sha256::new();
 hasher.update(left);
 hasher.update(right);
 let out = hasher.finalize();
 let mut arr = [0u8; 32];
 arr.copy_from_slice(&out);
 arr
}

/// A binary Merkle tree over SHA-256 leaves with the odd-leaf duplication
/// rule: if a layer has odd cardinality, the last node is
/// duplicated as its own sibling when forming the parent.
pub struct MerkleTree {
 layers: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
 /// Build a tree from raw 32-byte leaves (already decoded from hex).
 pub fn from_leaves(leaves: Vec<[u8; 32]>) -> Self {
 let mut layers = vec![leaves];
 while layers.last().unwrap().len() > 1 {
 let curr = layers.last().unwrap();
 let mut next = Vec::with_capacity((curr.len() + 1) / 2);
 let mut i = 0;
 while i < curr.len() {
 let left = curr[i];
 let right = if i + 1 < curr.len() { curr[i + 1] } else { curr[i] };
 next.push(merkle_parent(&left, &right));
 i += 2;
 }
 layers.push(next);
 }
 Self { layers }
 }

 /// Build a tree from hex-encoded leaves (already normalized).
 pub fn from_hex_leaves(leaves_hex: &[String]) -> Option<Self> {
 let leaves: Option<Vec<[u8; 32]>> = leaves_hex
.iter()
.map(|h| {
 let bytes = hex::decode(h).ok()?;
 let mut arr = [0u8; 32];
 if bytes.len() != 32 {
 return None;
 }
 arr.copy_from_slice(&bytes);
 Some(arr)
 })
.collect();
 Some(Self::from_leaves(leaves?))
 }

 pub fn leaf_count(&self) -> usize {
 self.layers[0].len()
 }

 /// Root hash, lowercase hex. For a single leaf this equals the leaf hash.
 pub fn root(&self) -> String {
 hex::encode(self.layers.last().unwrap()[0])
 }

 /// Inclusion proof for leaf `index`: sibling + position, leaf to root.
 pub fn proof(&self, index: usize) -> Option<Vec<ProofNode>> {
 if index >= self.leaf_count() {
 return None;
 }
 let mut path = Vec::new();
 let mut idx = index;
 for layer in &self.layers[..self.layers.len() - 1] {
 let sibling_idx = if idx % 2 == 0 {
 // node is the left child; sibling is to the right (or itself if odd tail)
 if idx + 1 < layer.len() { idx + 1 } else { idx }
 } else {
 idx - 1
 };
 let pos = if idx % 2 == 0 { ProofPosition::R } else { ProofPosition::L };
 path.push(ProofNode { pos, hash: hex::encode(layer[sibling_idx]) });
 idx /= 2;
 }
 Some(path)
 }
}

/// Fold a leaf hash through a proof path; the result must equal the batch
/// root for the proof to verify.
pub fn verify_proof(leaf_hash_hex: &str, path: &[ProofNode], expected_root_hex: &str) -> bool {
 let Ok(leaf_bytes) = hex::decode(leaf_hash_hex) else { return false };
 let mut node = leaf_bytes;
 for sibling in path {
 let Ok(sib) = hex::decode(&sibling.hash) else { return false };
 node = match sibling.pos {
 ProofPosition::L => merkle_parent(&sib, &node).to_vec(),
 ProofPosition::R => merkle_parent(&node, &sib).to_vec(),
 };
 }
 hex::encode(&node) == expected_root_hex
}

#[cfg(test)]
mod tests {
 use super::*;

 fn leaf(byte: u8) -> [u8; 32] {
 [byte; 32]
 }

 #[test]
 fn single_leaf_root_equals_leaf() {
 let tree = MerkleTree::from_leaves(vec![leaf(0xAB)]);
 assert_eq!(tree.root(), hex::encode(leaf(0xAB)));
 assert!(tree.proof(0).unwrap().is_empty());
 }

 #[test]
 fn odd_layer_duplicates_last_node_with_position_r() {
 let tree = MerkleTree::from_leaves(vec![leaf(1), leaf(2), leaf(3)]);
 // leaf 2 (index 2) is alone in its pair; its sibling is itself.
 let proof = tree.proof(2).unwrap();
 assert_eq!(proof[0].pos, ProofPosition::R);
 assert_eq!(proof[0].hash, hex::encode(leaf(3)));
 }

 #[test]
 fn every_leaf_proof_folds_to_root() {
 let leaves: Vec<[u8; 32]> = (0u8..5).map(leaf).collect();
 let tree = MerkleTree::from_leaves(leaves.clone());
 let root = tree.root();
 for (i, l) in leaves.iter().enumerate() {
 let proof = tree.proof(i).unwrap();
 assert!(verify_proof(&hex::encode(l), &proof, &root), "leaf {i} failed to verify");
 }
 }

 #[test]
 fn normalize_hex_strips_prefix_and_pads() {
 assert_eq!(normalize_hex("0xABC"), "0abc");
 assert_eq!(normalize_hex("deadBEEF"), "deadbeef");
 assert_eq!(normalize_hex("not-hex!"), "");
 }

 #[test]
 fn details_hash_is_stable_and_lowercases_addresses() {
 let a = details_hash(LeafFields {
 hash: "0xAA",
 block_number: "100",
 time_stamp: "1000",
 from: "0xFROM",
 to: "0xTO",
 contract_address: "0xCONTRACT",
 value: "1000000000000000000",
 token_decimal: "18",
 });
 let b = details_hash(LeafFields {
 hash: "0xAA",
 block_number: "100",
 time_stamp: "1000",
 from: "0xfrom",
 to: "0xto",
 contract_address: "0xcontract",
 value: "1000000000000000000",
 token_decimal: "18",
 });
 assert_eq!(a, b);
 assert_eq!(a.len(), 64);
 }
}
