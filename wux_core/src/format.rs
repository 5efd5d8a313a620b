use crate::error::{Result, WuxError};

/// First format marker. Stored little-endian this is the ASCII string "WUX0".
pub const MAGIC_A: u32 = 0x3058_5557;

/// Second format marker, doubling as the format version.
pub const MAGIC_B: u32 = 0x1099_d02e;

/// Fixed size of the WUX header in bytes.
///   magic_a:u32 + magic_b:u32 + sector_size:u32
///   + uncompressed_size:u64 + flags:u32
///   = 4 + 4 + 4 + 8 + 4 = 24
pub const HEADER_SIZE: u64 = 24;

/// Size of each index table entry (a u32 pool slot), in bytes.
pub const INDEX_ENTRY_SIZE: u64 = 4;

/// Default sector size: 32 KB.
pub const DEFAULT_SECTOR_SIZE: u32 = 0x8000;

/// Smallest sector size accepted on open.
pub const MIN_SECTOR_SIZE: u32 = 0x100;

/// Sector sizes must be strictly below this bound.
pub const MAX_SECTOR_SIZE: u32 = 0x1000_0000;

// ── Layout arithmetic ──────────────────────────────────────────────────────

/// Number of index table entries needed to cover `uncompressed_size` bytes.
#[inline]
pub fn index_entry_count(uncompressed_size: u64, sector_size: u32) -> u64 {
    uncompressed_size.div_ceil(sector_size as u64)
}

/// First `sector_size`-aligned offset at or after the end of the index table.
#[inline]
pub fn pool_start_offset(index_table_offset: u64, entry_count: u64, sector_size: u32) -> u64 {
    let table_end = index_table_offset + entry_count * INDEX_ENTRY_SIZE;
    table_end.next_multiple_of(sector_size as u64)
}

/// Translate a logical byte offset to its physical offset in the container.
pub fn logical_to_physical(
    offset: u64,
    sector_size: u32,
    table: &IndexTable,
    pool_start: u64,
) -> Result<u64> {
    let sector_size = sector_size as u64;
    let slot = table.slot(offset / sector_size)?;
    Ok(pool_start + slot as u64 * sector_size + offset % sector_size)
}

fn check_sector_size(sector_size: u32) -> Result<()> {
    if !(MIN_SECTOR_SIZE..MAX_SECTOR_SIZE).contains(&sector_size) {
        return Err(WuxError::InvalidFormat(format!(
            "sector size {sector_size:#x} outside [{MIN_SECTOR_SIZE:#x}, {MAX_SECTOR_SIZE:#x})"
        )));
    }
    Ok(())
}

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 24-byte WUX header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Bytes per logical sector.
    pub sector_size: u32,
    /// Logical size of the original image.
    pub uncompressed_size: u64,
    /// Reserved. Written as zero and ignored on read.
    pub flags: u32,
}

impl Header {
    pub fn new(sector_size: u32, uncompressed_size: u64) -> Self {
        Self {
            sector_size,
            uncompressed_size,
            flags: 0,
        }
    }

    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&MAGIC_A.to_le_bytes());
        buf[4..8].copy_from_slice(&MAGIC_B.to_le_bytes());
        buf[8..12].copy_from_slice(&self.sector_size.to_le_bytes());
        buf[12..20].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf[20..24].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    /// Deserialize from `HEADER_SIZE` bytes, checking both magic values and
    /// the sector size bound.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> Result<Self> {
        if !Self::is_container_magic(buf) {
            return Err(WuxError::InvalidFormat("bad magic, not a WUX container".into()));
        }
        let header = Self {
            sector_size: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            uncompressed_size: u64::from_le_bytes([
                buf[12], buf[13], buf[14], buf[15], buf[16], buf[17], buf[18], buf[19],
            ]),
            flags: u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]),
        };
        header.validate()?;
        Ok(header)
    }

    /// True if `buf` starts with both WUX magic values.
    pub fn is_container_magic(buf: &[u8]) -> bool {
        buf.len() >= 8
            && buf[0..4] == MAGIC_A.to_le_bytes()
            && buf[4..8] == MAGIC_B.to_le_bytes()
    }

    pub fn validate(&self) -> Result<()> {
        check_sector_size(self.sector_size)
    }

    #[inline]
    pub fn entry_count(&self) -> u64 {
        index_entry_count(self.uncompressed_size, self.sector_size)
    }

    /// File offset of the first pool sector.
    #[inline]
    pub fn pool_start(&self) -> u64 {
        pool_start_offset(HEADER_SIZE, self.entry_count(), self.sector_size)
    }
}

// ── Index table ────────────────────────────────────────────────────────────

/// Maps each logical sector to the pool slot that backs it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexTable {
    slots: Vec<u32>,
}

impl IndexTable {
    pub fn new(slots: Vec<u32>) -> Self {
        Self { slots }
    }

    pub fn with_capacity(entries: usize) -> Self {
        Self {
            slots: Vec::with_capacity(entries),
        }
    }

    pub fn push(&mut self, slot: u32) {
        self.slots.push(slot);
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.slots.len() as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.slots
    }

    /// Pool slot backing logical sector `sector`.
    pub fn slot(&self, sector: u64) -> Result<u32> {
        usize::try_from(sector)
            .ok()
            .and_then(|i| self.slots.get(i).copied())
            .ok_or(WuxError::OutOfRangeIndex {
                sector,
                entries: self.len(),
            })
    }

    /// Number of distinct slots the table needs (highest slot + 1).
    pub fn referenced_slots(&self) -> u64 {
        self.slots.iter().max().map_or(0, |&m| m as u64 + 1)
    }

    /// Serialize as `len() * INDEX_ENTRY_SIZE` little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.slots.len() * INDEX_ENTRY_SIZE as usize);
        for slot in &self.slots {
            buf.extend_from_slice(&slot.to_le_bytes());
        }
        buf
    }

    /// Deserialize from raw little-endian bytes. The length must be a whole
    /// number of entries.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() % INDEX_ENTRY_SIZE as usize != 0 {
            return Err(WuxError::InvalidFormat(format!(
                "index table length {} is not a multiple of {INDEX_ENTRY_SIZE}",
                buf.len()
            )));
        }
        let slots = buf
            .chunks_exact(INDEX_ENTRY_SIZE as usize)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { slots })
    }
}

// ── Read planning ──────────────────────────────────────────────────────────

/// One positioned physical read servicing part of a logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalRead {
    /// Logical offset this piece starts at.
    pub logical_offset: u64,
    /// Offset in the container file to read from.
    pub physical_offset: u64,
    /// Pool slot being read.
    pub slot: u32,
    /// Bytes to read, never crossing a logical sector boundary.
    pub len: usize,
}

/// Splits a logical byte range into per-sector [`PhysicalRead`]s.
///
/// The plan does no clipping against the image size; callers clip first.
/// A sector beyond the index table yields one `OutOfRangeIndex` error and
/// then ends the iteration.
#[derive(Debug, Clone)]
pub struct ReadPlan<'a> {
    table: &'a IndexTable,
    sector_size: u64,
    pool_start: u64,
    offset: u64,
    remaining: u64,
}

impl<'a> ReadPlan<'a> {
    pub fn new(
        table: &'a IndexTable,
        sector_size: u32,
        pool_start: u64,
        offset: u64,
        len: u64,
    ) -> Self {
        Self {
            table,
            sector_size: sector_size as u64,
            pool_start,
            offset,
            remaining: len,
        }
    }
}

impl Iterator for ReadPlan<'_> {
    type Item = Result<PhysicalRead>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let within = self.offset % self.sector_size;
        let slot = match self.table.slot(self.offset / self.sector_size) {
            Ok(slot) => slot,
            Err(e) => {
                self.remaining = 0;
                return Some(Err(e));
            }
        };
        let len = (self.sector_size - within).min(self.remaining);
        let piece = PhysicalRead {
            logical_offset: self.offset,
            physical_offset: self.pool_start + slot as u64 * self.sector_size + within,
            slot,
            len: len as usize,
        };
        self.offset += len;
        self.remaining -= len;
        Some(Ok(piece))
    }
}
