use std::collections::HashMap;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};

use log::{debug, info, warn};

use crate::digest::{Fingerprint, SectorDigest};
use crate::error::{Result, WuxError};
use crate::format::{Header, IndexTable, DEFAULT_SECTOR_SIZE, HEADER_SIZE};
use crate::media::Media;
use crate::progress::Progress;

/// Tunables for [`Encoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Bytes per logical sector written into the header.
    pub sector_size: u32,
    /// Byte-compare sectors whose fingerprints match before sharing a slot.
    /// Disabling this trusts the digest alone.
    pub verify_matches: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            sector_size: DEFAULT_SECTOR_SIZE,
            verify_matches: true,
        }
    }
}

impl EncoderOptions {
    pub fn sector_size(mut self, sector_size: u32) -> Self {
        self.sector_size = sector_size;
        self
    }

    pub fn verify_matches(mut self, verify: bool) -> Self {
        self.verify_matches = verify;
        self
    }
}

/// Outcome of a successful [`Encoder::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSummary {
    pub sector_size: u32,
    pub uncompressed_size: u64,
    /// Logical sectors (index table entries).
    pub entry_count: u64,
    /// Sectors stored in the pool.
    pub unique_sectors: u64,
    /// Sectors that reused an earlier slot.
    pub duplicate_sectors: u64,
    /// Fingerprint matches rejected by the byte-compare.
    pub rejected_matches: u64,
    /// Bytes written to the destination.
    pub container_size: u64,
}

impl EncodeSummary {
    /// Compression ratio (uncompressed / container).
    pub fn ratio(&self) -> f64 {
        if self.container_size == 0 {
            return 1.0;
        }
        self.uncompressed_size as f64 / self.container_size as f64
    }
}

/// Sector-deduplicating WUX writer.
///
/// # Format layout written
/// ```text
/// [HEADER: 24 bytes]                        ← written up front
/// [INDEX TABLE: 4 bytes × entry_count]      ← zero placeholder, filled last
/// [PADDING up to sector_size alignment]
/// [SLOT 0] [SLOT 1] ... [SLOT U-1]          ← unique sectors, first-occurrence order
/// ← seek back, write index table, rewrite header
/// ```
///
/// Encoding runs in two order-dependent phases. The pool phase streams every
/// logical sector, appending only unseen ones and recording a slot for each
/// in the in-memory index table. The finalize phase writes that table and
/// the header once the pool is complete.
pub struct Encoder {
    digest: Box<dyn SectorDigest>,
    options: EncoderOptions,
}

impl Encoder {
    /// Create an encoder. Fails with `InvalidFormat` if the sector size would
    /// produce a container that cannot be opened again.
    pub fn new(digest: Box<dyn SectorDigest>, options: EncoderOptions) -> Result<Self> {
        Header::new(options.sector_size, 0).validate()?;
        Ok(Self { digest, options })
    }

    pub fn digest_name(&self) -> &'static str {
        self.digest.name()
    }

    /// Encode the logical contents of `source` into `dest`.
    ///
    /// `dest` must be empty, seekable, writable storage; a destination that
    /// already holds data is rejected before anything is written. On error
    /// the partially written destination is left as is.
    pub fn encode<R, W>(
        &self,
        source: &mut Media<R>,
        dest: &mut W,
        progress: &mut dyn Progress,
    ) -> Result<EncodeSummary>
    where
        R: Read + Seek,
        W: Write + Seek,
    {
        let header = Header::new(self.options.sector_size, source.size());
        let entry_count = header.entry_count();
        if entry_count > u32::MAX as u64 {
            return Err(WuxError::InvalidFormat(format!(
                "image of {} bytes needs {entry_count} sectors, more than a u32 index can address",
                header.uncompressed_size
            )));
        }
        info!(
            "compressing {} sectors of {} bytes (digest: {})",
            entry_count,
            header.sector_size,
            self.digest.name()
        );

        let existing = dest.seek(SeekFrom::End(0))?;
        if existing != 0 {
            return Err(WuxError::Io(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("destination already holds {existing} bytes"),
            )));
        }

        // ── Reserve header, index table, and padding ───────────────────────
        let pool_start = header.pool_start();
        dest.seek(SeekFrom::Start(0))?;
        dest.write_all(&header.to_bytes())?;
        io::copy(&mut io::repeat(0).take(pool_start - HEADER_SIZE), dest)?;

        // ── Pool phase ─────────────────────────────────────────────────────
        let mut pool = PoolBuilder::new(self.digest.as_ref(), &self.options, entry_count);
        pool.run(source, dest, progress)?;
        let container_size = dest.stream_position()?;

        // ── Finalize phase ─────────────────────────────────────────────────
        let summary = EncodeSummary {
            sector_size: header.sector_size,
            uncompressed_size: header.uncompressed_size,
            entry_count,
            unique_sectors: pool.unique_sectors(),
            duplicate_sectors: entry_count - pool.unique_sectors(),
            rejected_matches: pool.rejected_matches,
            container_size,
        };
        finalize(dest, &header, &pool.table)?;
        progress.finish();

        info!(
            "stored {} unique of {} sectors, ratio {:.2}x",
            summary.unique_sectors,
            summary.entry_count,
            summary.ratio()
        );
        Ok(summary)
    }
}

/// Write the completed index table and the final header.
fn finalize<W: Write + Seek>(dest: &mut W, header: &Header, table: &IndexTable) -> Result<()> {
    dest.seek(SeekFrom::Start(HEADER_SIZE))?;
    dest.write_all(&table.to_bytes())?;
    dest.seek(SeekFrom::Start(0))?;
    dest.write_all(&header.to_bytes())?;
    dest.seek(SeekFrom::End(0))?;
    dest.flush()?;
    Ok(())
}

/// State owned by the pool phase.
struct PoolBuilder<'a> {
    digest: &'a dyn SectorDigest,
    verify_matches: bool,
    sector_size: usize,
    entry_count: u64,
    table: IndexTable,
    /// Slots per fingerprint, in first-occurrence order.
    slots_by_fingerprint: HashMap<Fingerprint, Vec<u32>>,
    /// Logical sector that first filled each slot.
    first_occurrence: Vec<u64>,
    rejected_matches: u64,
}

impl<'a> PoolBuilder<'a> {
    fn new(digest: &'a dyn SectorDigest, options: &EncoderOptions, entry_count: u64) -> Self {
        Self {
            digest,
            verify_matches: options.verify_matches,
            sector_size: options.sector_size as usize,
            entry_count,
            table: IndexTable::with_capacity(entry_count as usize),
            slots_by_fingerprint: HashMap::new(),
            first_occurrence: Vec::new(),
            rejected_matches: 0,
        }
    }

    fn unique_sectors(&self) -> u64 {
        self.first_occurrence.len() as u64
    }

    fn run<R, W>(
        &mut self,
        source: &mut Media<R>,
        dest: &mut W,
        progress: &mut dyn Progress,
    ) -> Result<()>
    where
        R: Read + Seek,
        W: Write,
    {
        let total = source.size();
        let mut sector = vec![0u8; self.sector_size];
        let mut scratch = vec![0u8; self.sector_size];

        for i in 0..self.entry_count {
            read_sector(source, &mut sector, i)?;
            let fingerprint = self.digest.digest(&sector);

            if let Some(slot) = self.find_match(i, &fingerprint, &sector, source, &mut scratch)? {
                self.table.push(slot);
            } else {
                let slot = self.first_occurrence.len() as u32;
                dest.write_all(&sector)?;
                self.slots_by_fingerprint
                    .entry(fingerprint)
                    .or_default()
                    .push(slot);
                self.first_occurrence.push(i);
                self.table.push(slot);
            }

            let done = ((i + 1) * self.sector_size as u64).min(total);
            progress.update(done, total);
        }
        Ok(())
    }

    /// Earlier slot holding the same bytes as `sector`, if any.
    fn find_match<R: Read + Seek>(
        &mut self,
        index: u64,
        fingerprint: &Fingerprint,
        sector: &[u8],
        source: &mut Media<R>,
        scratch: &mut [u8],
    ) -> Result<Option<u32>> {
        let Some(candidates) = self.slots_by_fingerprint.get(fingerprint) else {
            return Ok(None);
        };
        if !self.verify_matches {
            return Ok(candidates.first().copied());
        }
        for &slot in candidates {
            let original = self.first_occurrence[slot as usize];
            read_sector(source, scratch, original)?;
            if scratch == sector {
                return Ok(Some(slot));
            }
            warn!(
                "digest collision: sector {} and sector {} share fingerprint {} but differ",
                index, original, fingerprint
            );
            self.rejected_matches += 1;
        }
        debug!("sector {index} stored separately after collision");
        Ok(None)
    }
}

/// Read logical sector `index` into `buf`, zero-filling past the image end.
fn read_sector<R: Read + Seek>(source: &mut Media<R>, buf: &mut [u8], index: u64) -> Result<()> {
    let offset = index * buf.len() as u64;
    let expected = (buf.len() as u64).min(source.size().saturating_sub(offset)) as usize;
    let n = source.read_at(buf, offset)?;
    if n < expected {
        return Err(WuxError::Io(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("source sector {index}: read {n} of {expected} bytes"),
        )));
    }
    buf[n..].fill(0);
    Ok(())
}
