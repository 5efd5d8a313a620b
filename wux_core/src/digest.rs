use std::fmt;

/// Size of a sector fingerprint in bytes.
pub const FINGERPRINT_SIZE: usize = 32;

/// Fixed-size fingerprint of one sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    pub const fn new(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }
}

impl From<[u8; FINGERPRINT_SIZE]> for Fingerprint {
    fn from(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Sector fingerprinting abstraction used by the encoder for deduplication.
///
/// Each `SectorDigest` implementation:
/// - Must be deterministic: the same bytes always give the same fingerprint.
/// - Is only compared against itself within one encoding run. The algorithm
///   is not recorded in the container; the sector pool is authoritative.
/// - Need not be collision-resistant when the encoder byte-compares matches
///   (see `EncoderOptions::verify_matches`).
pub trait SectorDigest: Send + Sync {
    /// Human-readable algorithm name for CLI display.
    fn name(&self) -> &'static str;

    /// Fingerprint a full sector.
    fn digest(&self, sector: &[u8]) -> Fingerprint;
}
