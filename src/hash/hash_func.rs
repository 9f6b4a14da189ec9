//! Key hash functions.
//!
//! `fnv_hash` is the default. The others are kept for files created with a
//! different function; the function in use is identified on reopen by the
//! hash of a fixed probe key stored in the header.

/// Probe key whose hash is recorded in the header
pub const CHARKEY: &[u8] = b"%$sniglet^&";

/// FNV-style multiply-then-xor hash, seeded with zero.
pub fn fnv_hash(key: &[u8]) -> u32 {
    key.iter()
        .fold(0u32, |h, &b| h.wrapping_mul(16_777_619) ^ b as u32)
}

/// Phong Vo's linear congruential hash.
pub fn phong_vo_hash(key: &[u8]) -> u32 {
    key.iter().fold(0u32, |h, &b| {
        0x63c6_3cd9u32
            .wrapping_mul(h)
            .wrapping_add(0x9c39_c33d)
            .wrapping_add(b as u32)
    })
}

/// The sdbm hash (`n = c + 65599 * n`).
pub fn sdbm_hash(key: &[u8]) -> u32 {
    key.iter()
        .fold(0u32, |n, &b| (b as u32).wrapping_add(65_599u32.wrapping_mul(n)))
}

/// Chris Torek's hash (`h = 33 * h + c`).
pub fn torek_hash(key: &[u8]) -> u32 {
    key.iter()
        .fold(0u32, |h, &b| (h << 5).wrapping_add(h).wrapping_add(b as u32))
}

/// Smallest `i` with `2^i >= n`.
pub fn log2_ceil(n: u32) -> u32 {
    if n <= 1 {
        0
    } else {
        32 - (n - 1).leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log2_ceil() {
        assert_eq!(log2_ceil(0), 0);
        assert_eq!(log2_ceil(1), 0);
        assert_eq!(log2_ceil(2), 1);
        assert_eq!(log2_ceil(3), 2);
        assert_eq!(log2_ceil(4), 2);
        assert_eq!(log2_ceil(5), 3);
        assert_eq!(log2_ceil(1 << 20), 20);
    }

    #[test]
    fn test_fnv_known_values() {
        assert_eq!(fnv_hash(b""), 0);
        assert_eq!(fnv_hash(b"a"), 0x61);
        // 0x61 * 16777619 ^ 0x62
        assert_eq!(
            fnv_hash(b"ab"),
            0x61u32.wrapping_mul(16_777_619) ^ 0x62
        );
    }

    #[test]
    fn test_functions_disagree_on_probe_key() {
        let hashes = [
            fnv_hash(CHARKEY),
            phong_vo_hash(CHARKEY),
            sdbm_hash(CHARKEY),
            torek_hash(CHARKEY),
        ];
        for i in 0..hashes.len() {
            for j in i + 1..hashes.len() {
                assert_ne!(hashes[i], hashes[j]);
            }
        }
    }

    #[test]
    fn test_simple_recurrences() {
        assert_eq!(sdbm_hash(b"ab"), 0x62 + 65_599 * 0x61);
        assert_eq!(torek_hash(b"ab"), 33 * 0x61 + 0x62);
    }
}
