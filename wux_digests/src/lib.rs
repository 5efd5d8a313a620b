mod blake3_digest;
mod xxh3_digest;

pub use blake3_digest::Blake3Digest;
pub use xxh3_digest::Xxh3Digest;

use wux_core::SectorDigest;

/// Names accepted by [`digest_by_name`], for CLI help text.
pub const DIGEST_NAMES: &[&str] = &["blake3", "xxh3"];

/// Resolve a sector digest from its CLI name.
pub fn digest_by_name(name: &str) -> anyhow::Result<Box<dyn SectorDigest>> {
    match name {
        "blake3" | "b3" => Ok(Box::new(Blake3Digest)),
        "xxh3" | "xxh" => Ok(Box::new(Xxh3Digest)),
        other => anyhow::bail!(
            "unknown digest '{}'. Valid options: {}",
            other,
            DIGEST_NAMES.join(", ")
        ),
    }
}
