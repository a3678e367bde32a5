use crate::NONCE_SIZE;

pub type ChunkNonce = [u8; NONCE_SIZE];

/// Derive the nonce for chunk `index` from a file's base nonce.
///
/// The trailing four bytes are read as a little-endian u32, XORed with the
/// index and written back; the leading eight bytes are copied unchanged.
/// XOR with a fixed value is a bijection on u32, so every index in one file
/// gets a distinct nonce. The derivation is part of the stored format and
/// must not change.
pub fn derive_chunk_nonce(base: &[u8; NONCE_SIZE], index: u32) -> ChunkNonce {
    let mut nonce = *base;
    let tail = u32::from_le_bytes([base[8], base[9], base[10], base[11]]);
    nonce[8..].copy_from_slice(&(tail ^ index).to_le_bytes());
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_chunk_zero_uses_base_nonce() {
        let base = [7u8; NONCE_SIZE];
        assert_eq!(derive_chunk_nonce(&base, 0), base);
    }

    #[test]
    fn test_little_endian_layout() {
        let base = [0u8; NONCE_SIZE];
        let nonce = derive_chunk_nonce(&base, 0x0102_0304);
        assert_eq!(&nonce[8..], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&nonce[..8], &[0u8; 8]);

        let base = [0xFFu8; NONCE_SIZE];
        let nonce = derive_chunk_nonce(&base, 1);
        assert_eq!(&nonce[8..], &[0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_unique_for_first_million_indices() {
        let base = [0x3Cu8; NONCE_SIZE];
        let seen: HashSet<ChunkNonce> = (0..1u32 << 20).map(|i| derive_chunk_nonce(&base, i)).collect();
        assert_eq!(seen.len(), 1 << 20);
    }

    proptest! {
        #[test]
        fn prop_distinct_indices_give_distinct_nonces(
            base in any::<[u8; NONCE_SIZE]>(),
            indices in proptest::collection::hash_set(any::<u32>(), 1..512),
        ) {
            let nonces: HashSet<ChunkNonce> =
                indices.iter().map(|&i| derive_chunk_nonce(&base, i)).collect();
            prop_assert_eq!(nonces.len(), indices.len());
        }

        #[test]
        fn prop_prefix_untouched(base in any::<[u8; NONCE_SIZE]>(), index in any::<u32>()) {
            let nonce = derive_chunk_nonce(&base, index);
            prop_assert_eq!(&nonce[..8], &base[..8]);
            // applying the same index twice restores the base
            prop_assert_eq!(derive_chunk_nonce(&nonce, index), base);
        }
    }
}
