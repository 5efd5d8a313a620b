use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, warn};

use crate::error::{Result, WuxError};
use crate::format::{
    logical_to_physical, Header, IndexTable, ReadPlan, HEADER_SIZE, INDEX_ENTRY_SIZE,
};

/// Everything needed to resolve logical reads inside a container.
///
/// Loaded once when the media is opened and never modified afterwards.
#[derive(Debug, Clone)]
pub struct ContainerLayout {
    header: Header,
    table: IndexTable,
    pool_start: u64,
    pool_slots: u64,
}

impl ContainerLayout {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn index_table(&self) -> &IndexTable {
        &self.table
    }

    #[inline]
    pub fn sector_size(&self) -> u32 {
        self.header.sector_size
    }

    /// File offset of the first pool sector.
    #[inline]
    pub fn pool_start(&self) -> u64 {
        self.pool_start
    }

    /// Pool slots physically present in the file (a trailing partial slot
    /// counts as present).
    #[inline]
    pub fn pool_slots(&self) -> u64 {
        self.pool_slots
    }

    /// Unique sectors referenced by the index table.
    pub fn unique_sectors(&self) -> u64 {
        self.table.referenced_slots()
    }

    /// Physical file offset backing logical byte `offset`.
    pub fn physical_offset(&self, offset: u64) -> Result<u64> {
        logical_to_physical(offset, self.header.sector_size, &self.table, self.pool_start)
    }

    /// Per-sector physical reads covering `len` bytes at logical `offset`.
    pub fn plan(&self, offset: u64, len: u64) -> ReadPlan<'_> {
        ReadPlan::new(&self.table, self.header.sector_size, self.pool_start, offset, len)
    }
}

/// How a [`Media`] is backed on disk.
#[derive(Debug, Clone)]
enum MediaKind {
    /// Flat, uncompressed image: logical offset == file offset.
    Raw,
    /// Sector-deduplicated WUX container.
    Container(ContainerLayout),
}

/// Uniform random-access view over raw images and WUX containers.
///
/// # Open sequence
/// 1. Measure the backing length and read the first `HEADER_SIZE` bytes.
/// 2. A file shorter than a header is neither kind and is rejected.
///    Without both magic values the media is raw and its logical size is the
///    file length.
/// 3. Otherwise validate the header and load the full index table into RAM.
///    The table is 4 bytes per sector: a 25 GB image at 32 KB sectors needs
///    about 3 MB.
///
/// # Access pattern
/// [`read_at`](Self::read_at) looks identical for both kinds. Container reads
/// are split at logical sector boundaries and each piece is one positioned
/// read from the pool.
#[derive(Debug)]
pub struct Media<R = File> {
    inner: R,
    size: u64,
    kind: MediaKind,
}

impl Media<File> {
    /// Open a raw image or WUX container from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| WuxError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let media = Self::from_reader(file)?;
        debug!(
            "opened {} as {} media, logical size {}",
            path.display(),
            if media.is_container() { "container" } else { "raw" },
            media.size
        );
        Ok(media)
    }
}

impl<R: Read + Seek> Media<R> {
    /// Classify and open any seekable byte source.
    pub fn from_reader(mut inner: R) -> Result<Self> {
        let file_len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;

        // ── Sniff header ────────────────────────────────────────────────────
        let mut header_buf = [0u8; HEADER_SIZE as usize];
        let got = read_full(&mut inner, &mut header_buf)?;
        if got < header_buf.len() {
            return Err(WuxError::InvalidFormat(format!(
                "file of {file_len} bytes is too short to be a raw image or a container"
            )));
        }
        if !Header::is_container_magic(&header_buf) {
            return Ok(Self {
                inner,
                size: file_len,
                kind: MediaKind::Raw,
            });
        }
        let header = Header::from_bytes(&header_buf)?;

        // ── Load index table ────────────────────────────────────────────────
        let entry_count = header.entry_count();
        let table_len = entry_count * INDEX_ENTRY_SIZE;
        if HEADER_SIZE + table_len > file_len {
            return Err(WuxError::InvalidFormat(format!(
                "truncated index table: {entry_count} entries need {} bytes but file is {file_len} bytes",
                HEADER_SIZE + table_len
            )));
        }
        let mut table_buf = vec![0u8; table_len as usize];
        inner.read_exact(&mut table_buf)?;
        let table = IndexTable::from_bytes(&table_buf)?;

        let pool_start = header.pool_start();
        let pool_slots = file_len
            .saturating_sub(pool_start)
            .div_ceil(header.sector_size as u64);

        Ok(Self {
            inner,
            size: header.uncompressed_size,
            kind: MediaKind::Container(ContainerLayout {
                header,
                table,
                pool_start,
                pool_slots,
            }),
        })
    }

    /// Logical size in bytes (uncompressed size for containers).
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn is_container(&self) -> bool {
        matches!(self.kind, MediaKind::Container(_))
    }

    /// Container layout, or `None` for raw media.
    pub fn layout(&self) -> Option<&ContainerLayout> {
        match &self.kind {
            MediaKind::Container(layout) => Some(layout),
            MediaKind::Raw => None,
        }
    }

    /// Sector size of a container, `None` for raw media.
    pub fn sector_size(&self) -> Option<u32> {
        self.layout().map(ContainerLayout::sector_size)
    }

    /// Read up to `buf.len()` logical bytes starting at `offset`.
    ///
    /// The request is clipped to the logical size; a request starting at or
    /// past the end returns `Ok(0)`. If the backing file is shorter than the
    /// layout promises, reading stops at the first short physical read and
    /// the returned count covers only the contiguous bytes placed so far.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let available = self.size.saturating_sub(offset);
        let len = (buf.len() as u64).min(available) as usize;
        if len == 0 {
            return Ok(0);
        }
        let buf = &mut buf[..len];

        match &self.kind {
            MediaKind::Raw => {
                self.inner.seek(SeekFrom::Start(offset))?;
                read_full(&mut self.inner, buf)
            }
            MediaKind::Container(layout) => {
                let mut placed = 0usize;
                for piece in layout.plan(offset, len as u64) {
                    let piece = piece?;
                    if piece.slot as u64 >= layout.pool_slots {
                        return Err(WuxError::SlotOutOfRange {
                            slot: piece.slot,
                            pool_slots: layout.pool_slots,
                        });
                    }
                    self.inner.seek(SeekFrom::Start(piece.physical_offset))?;
                    let n = read_full(&mut self.inner, &mut buf[placed..placed + piece.len])?;
                    placed += n;
                    if n < piece.len {
                        warn!(
                            "short pool read at physical offset {}: got {} of {} bytes",
                            piece.physical_offset, n, piece.len
                        );
                        break;
                    }
                }
                Ok(placed)
            }
        }
    }

    /// Like [`read_at`](Self::read_at) but fails unless `buf` is filled.
    pub fn read_exact_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        let n = self.read_at(buf, offset)?;
        if n != buf.len() {
            return Err(WuxError::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "read {} of {} bytes at logical offset {}",
                    n,
                    buf.len(),
                    offset
                ),
            )));
        }
        Ok(())
    }
}

/// Read until `buf` is full or the source hits EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
