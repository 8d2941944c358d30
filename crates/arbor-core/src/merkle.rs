//! BLAKE3 Merkle root over transaction ids.
//!
//! Domain-separated hashing:
//! - Leaf hash: `BLAKE3(0x00 || data)`
//! - Internal node: `BLAKE3(0x01 || left || right)`
//!
//! Odd-length layers are padded by duplicating the last element.
//! Empty input produces [`Hash256::ZERO`].

use crate::types::Hash256;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Compute a domain-separated leaf hash: `BLAKE3(0x00 || data)`.
pub fn leaf_hash(data: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(data.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Compute a domain-separated internal node hash: `BLAKE3(0x01 || left || right)`.
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Compute the Merkle root of `leaves`.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    let mut current: Vec<Hash256> = leaves.iter().map(leaf_hash).collect();
    if current.is_empty() {
        return Hash256::ZERO;
    }

    while current.len() > 1 {
        current = current
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => node_hash(left, right),
                [single] => node_hash(single, single),
                _ => unreachable!("chunks(2) yields one or two elements"),
            })
            .collect();
    }

    current[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> Hash256 {
        Hash256([byte; 32])
    }

    #[test]
    fn leaf_hash_differs_from_node_hash() {
        assert_ne!(leaf_hash(&h(1)), node_hash(&h(1), &h(1)));
    }

    #[test]
    fn merkle_root_empty() {
        assert_eq!(merkle_root(&[]), Hash256::ZERO);
    }

    #[test]
    fn merkle_root_single() {
        assert_eq!(merkle_root(&[h(1)]), leaf_hash(&h(1)));
    }

    #[test]
    fn merkle_root_three_odd() {
        let l = [leaf_hash(&h(1)), leaf_hash(&h(2)), leaf_hash(&h(3))];
        let expected = node_hash(&node_hash(&l[0], &l[1]), &node_hash(&l[2], &l[2]));
        assert_eq!(merkle_root(&[h(1), h(2), h(3)]), expected);
    }

    #[test]
    fn merkle_root_order_matters() {
        assert_ne!(merkle_root(&[h(1), h(2)]), merkle_root(&[h(2), h(1)]));
    }
}
