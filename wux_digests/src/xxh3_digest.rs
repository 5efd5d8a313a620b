use wux_core::digest::FINGERPRINT_SIZE;
use wux_core::{Fingerprint, SectorDigest};
use xxhash_rust::xxh3::{xxh3_128, xxh3_128_with_seed};

const SECOND_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// XXH3 sector digest: two 128-bit XXH3 hashes with different seeds.
///
/// Several times faster than BLAKE3 on large sectors but not
/// collision-resistant. Pair it with the encoder's byte-compare.
pub struct Xxh3Digest;

impl SectorDigest for Xxh3Digest {
    fn name(&self) -> &'static str {
        "xxh3"
    }

    fn digest(&self, sector: &[u8]) -> Fingerprint {
        let mut out = [0u8; FINGERPRINT_SIZE];
        out[..16].copy_from_slice(&xxh3_128(sector).to_le_bytes());
        out[16..].copy_from_slice(&xxh3_128_with_seed(sector, SECOND_SEED).to_le_bytes());
        Fingerprint::new(out)
    }
}
