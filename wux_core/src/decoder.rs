use std::io::{Read, Seek, Write};

use log::info;

use crate::error::Result;
use crate::format::DEFAULT_SECTOR_SIZE;
use crate::media::Media;
use crate::progress::Progress;

/// Expand `source` into a flat image written sequentially to `dest`.
///
/// Works for any media kind; a raw source is simply copied. Copies in
/// strides of the container's sector size (or `DEFAULT_SECTOR_SIZE` for raw
/// input) and returns the number of bytes written, which always equals
/// `source.size()`. Any short read or write is fatal.
pub fn decode<R, W>(source: &mut Media<R>, dest: &mut W, progress: &mut dyn Progress) -> Result<u64>
where
    R: Read + Seek,
    W: Write,
{
    let total = source.size();
    let stride = source.sector_size().unwrap_or(DEFAULT_SECTOR_SIZE) as u64;
    info!("decompressing {total} bytes");

    let mut buffer = vec![0u8; stride as usize];
    let mut offset = 0u64;
    while offset < total {
        let len = stride.min(total - offset) as usize;
        source.read_exact_at(&mut buffer[..len], offset)?;
        dest.write_all(&buffer[..len])?;
        offset += len as u64;
        progress.update(offset, total);
    }
    dest.flush()?;
    progress.finish();

    info!("wrote {offset} bytes");
    Ok(offset)
}
