use wux_core::{Fingerprint, SectorDigest};

/// BLAKE3 sector digest.
///
/// Collision-resistant, so matches are safe to trust even with the encoder's
/// byte-compare disabled. The default.
pub struct Blake3Digest;

impl SectorDigest for Blake3Digest {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn digest(&self, sector: &[u8]) -> Fingerprint {
        Fingerprint::new(blake3::hash(sector).into())
    }
}
