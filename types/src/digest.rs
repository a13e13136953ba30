//! Internal Blake2b-256 helper for content-hash computation.
//!
//! `push-crypto` exposes the public hashing API; this private copy exists so
//! the types crate can compute transaction/block identities without a
//! dependency cycle.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

pub(crate) fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}
