//! Blake2b hashing used for key derivation.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_deterministic() {
        let parts = [b"hello strata".as_slice()];
        assert_eq!(blake2b_256_multi(&parts), blake2b_256_multi(&parts));
    }

    #[test]
    fn blake2b_different_inputs() {
        assert_ne!(
            blake2b_256_multi(&[b"hello".as_slice()]),
            blake2b_256_multi(&[b"world".as_slice()])
        );
    }

    #[test]
    fn blake2b_split_point_is_irrelevant() {
        let single = blake2b_256_multi(&[b"helloworld".as_slice()]);
        let multi = blake2b_256_multi(&[b"hello".as_slice(), b"world".as_slice()]);
        assert_eq!(single, multi);
    }
}
