use std::io::{Read, Seek};
use std::path::Path;

use log::{info, warn};

use crate::error::Result;
use crate::media::Media;
use crate::progress::{NoProgress, Progress};

/// Lock-step comparison chunk: 1 MiB plus an odd tail, so chunks never line
/// up with sector boundaries and every cross-sector read path gets exercised.
pub const VERIFY_CHUNK_SIZE: usize = 1024 * 1024 + 19;

/// Result of comparing two media byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Identical,
    SizeMismatch { left: u64, right: u64 },
    /// One side returned fewer bytes than requested for the chunk at `offset`.
    ShortRead { offset: u64 },
    /// First differing logical byte.
    DataMismatch { offset: u64 },
}

impl Verdict {
    pub fn is_identical(&self) -> bool {
        matches!(self, Verdict::Identical)
    }
}

/// Compare the logical contents of two media.
pub fn compare<RA, RB>(
    left: &mut Media<RA>,
    right: &mut Media<RB>,
    progress: &mut dyn Progress,
) -> Result<Verdict>
where
    RA: Read + Seek,
    RB: Read + Seek,
{
    let total = left.size();
    if total != right.size() {
        return Ok(Verdict::SizeMismatch {
            left: total,
            right: right.size(),
        });
    }

    let mut buf_left = vec![0u8; VERIFY_CHUNK_SIZE];
    let mut buf_right = vec![0u8; VERIFY_CHUNK_SIZE];
    let mut offset = 0u64;
    while offset < total {
        let want = (VERIFY_CHUNK_SIZE as u64).min(total - offset) as usize;
        let got_left = left.read_at(&mut buf_left[..want], offset)?;
        let got_right = right.read_at(&mut buf_right[..want], offset)?;
        if got_left != want || got_right != want {
            return Ok(Verdict::ShortRead { offset });
        }
        if buf_left[..want] != buf_right[..want] {
            let pos = buf_left[..want]
                .iter()
                .zip(&buf_right[..want])
                .position(|(a, b)| a != b)
                .unwrap_or(0);
            return Ok(Verdict::DataMismatch {
                offset: offset + pos as u64,
            });
        }
        offset += want as u64;
        progress.update(offset, total);
    }
    progress.finish();
    Ok(Verdict::Identical)
}

/// True only if both paths open and hold identical logical contents.
///
/// Fails closed: open errors, I/O errors, and any difference all yield
/// `false`, with the reason logged. Nothing is deleted.
pub fn validate(path_a: impl AsRef<Path>, path_b: impl AsRef<Path>) -> bool {
    validate_with_progress(path_a, path_b, &mut NoProgress)
}

pub fn validate_with_progress(
    path_a: impl AsRef<Path>,
    path_b: impl AsRef<Path>,
    progress: &mut dyn Progress,
) -> bool {
    let (path_a, path_b) = (path_a.as_ref(), path_b.as_ref());
    let verdict = Media::open(path_a).and_then(|mut a| {
        let mut b = Media::open(path_b)?;
        compare(&mut a, &mut b, progress)
    });
    match verdict {
        Ok(Verdict::Identical) => {
            info!("{} and {} match", path_a.display(), path_b.display());
            true
        }
        Ok(Verdict::SizeMismatch { left, right }) => {
            warn!("data size mismatch: {left} vs {right} bytes");
            false
        }
        Ok(Verdict::ShortRead { offset }) => {
            warn!("data read size mismatch at offset {offset}");
            false
        }
        Ok(Verdict::DataMismatch { offset }) => {
            warn!("data mismatch at offset {offset}");
            false
        }
        Err(e) => {
            warn!("validation failed: {e}");
            false
        }
    }
}
