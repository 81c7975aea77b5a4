//! The File Processing Struct (FPS): the single I/O primitive every MED
//! file (metadata, indices, records, compressed time-series data) is
//! read through (spec §4.2).
//!
//! An [`Fps`] owns a byte buffer (grown by full-file read, by
//! memory-mapped/bitmap-tracked partial reads, or by a plain header-only
//! read that leaves the file open for later partial reads), an optional
//! open [`File`], an in-process [`FileLock`], and — once enough of the
//! buffer is resident — a parsed [`UniversalHeader`]. Per Design Notes
//! §9, there are no raw pointer overlays into the buffer: callers index
//! into `fps.buffer()` directly or through typed views built on demand,
//! so a [`reallocate`](Fps::reallocate) can never leave a dangling
//! pointer, only a larger `Vec`.

pub mod bitmap;
pub mod lock;

use crate::coding::Decode;
use crate::error::{Error, Result};
use crate::file_type::FileType;
use crate::options::CrcMode;
use crate::universal_header::{UniversalHeader, HEADER_SIZE};
use bitmap::Bitmap;
use lock::{FileLock, LockMode};
use std::fs::{self, File, OpenOptions as StdOpenOptions};
use std::path::{Path, PathBuf};

/// How many bytes to allocate/read for a file, per spec §4.2 `allocate`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RawBytes {
    /// A known, exact byte count.
    Exact(u64),
    /// Sentinel: read the whole file.
    FullFile,
    /// Sentinel: read only the 1024-byte Universal Header.
    UniversalHeaderOnly,
}

/// File open mode (spec §4.2 `open`): `{R, R+, W, W+, A, A+}`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpenMode {
    /// Read-only; file must already exist.
    Read,
    /// Read-write; file must already exist.
    ReadWrite,
    /// Write-only; truncates or creates.
    Write,
    /// Read-write; truncates or creates.
    WriteRead,
    /// Append-only; creates if missing.
    Append,
    /// Read-append; creates if missing.
    AppendRead,
}

impl OpenMode {
    const fn is_create(self) -> bool {
        !matches!(self, Self::Read | Self::ReadWrite)
    }

    const fn lock_mode(self) -> LockMode {
        match self {
            Self::Read | Self::ReadWrite => LockMode::Shared,
            Self::Write | Self::WriteRead | Self::Append | Self::AppendRead => LockMode::Exclusive,
        }
    }

    fn to_std(self) -> StdOpenOptions {
        let mut opts = StdOpenOptions::new();
        match self {
            Self::Read => {
                opts.read(true);
            }
            Self::ReadWrite => {
                opts.read(true).write(true);
            }
            Self::Write => {
                opts.write(true).create(true).truncate(true);
            }
            Self::WriteRead => {
                opts.read(true).write(true).create(true).truncate(true);
            }
            Self::Append => {
                opts.write(true).append(true).create(true);
            }
            Self::AppendRead => {
                opts.read(true).append(true).create(true);
            }
        }
        opts
    }
}

/// How the caller wants a partial read served (spec §4.2's "decides
/// between full-file, header-only, and memory-mapped based on caller
/// flags").
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadMode {
    /// Read `bytes_to_read` directly into the buffer at `offset`.
    Direct,
    /// Serve through the residency [`Bitmap`], coalescing unread runs
    /// into block-aligned `pread` calls.
    MemoryMapped,
}

/// Gives an [`Fps`] enough type information to compute the byte size of
/// `n` consecutive variable-size items starting at a given offset into
/// its buffer (spec §4.2 `bytes_for_items`): fixed-size entries (index,
/// metadata) are a multiplication; variable-size entries (CMP blocks,
/// record entries) must read each item's own header to learn its total
/// size before advancing to the next.
pub trait ItemSizer {
    /// Returns the total byte size of the item starting at
    /// `relative_offset` within `buffer`, or `None` if there isn't
    /// enough of the buffer resident yet to tell.
    fn item_bytes(&self, buffer: &[u8], relative_offset: usize) -> Option<u64>;
}

/// An [`ItemSizer`] for fixed-size entries (index entries, `Sgmt`
/// records, metadata sections): every item is the same, constructor-given
/// byte size.
#[derive(Copy, Clone, Debug)]
pub struct FixedItemSizer(pub u64);

impl ItemSizer for FixedItemSizer {
    fn item_bytes(&self, _buffer: &[u8], _relative_offset: usize) -> Option<u64> {
        Some(self.0)
    }
}

#[cfg(unix)]
fn pread_exact(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(not(unix))]
fn pread_exact(file: &mut File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::io::{Read, Seek, SeekFrom};
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

/// The unified per-file I/O object (spec §4.2).
pub struct Fps {
    path: PathBuf,
    file_type: FileType,
    requested: RawBytes,
    buffer: Vec<u8>,
    file: Option<File>,
    lock: Option<FileLock>,
    bitmap: Option<Bitmap>,
    universal_header: Option<UniversalHeader>,
}

impl Fps {
    /// Allocates a new FPS for `path`/`file_type` (spec §4.2 `allocate`).
    /// `proto` optionally supplies a prefix to copy into the new buffer
    /// (used when deriving a file from another; the new file's
    /// `provenance_uid` is expected to be set by the caller afterward to
    /// carry the lineage forward).
    #[must_use]
    pub fn allocate(
        path: impl Into<PathBuf>,
        file_type: FileType,
        raw_bytes: RawBytes,
        proto: Option<(&Self, usize)>,
    ) -> Self {
        let mut buffer = match raw_bytes {
            RawBytes::Exact(n) => vec![0u8; n as usize],
            RawBytes::FullFile | RawBytes::UniversalHeaderOnly => Vec::new(),
        };

        if let Some((proto_fps, bytes_to_copy)) = proto {
            let take = bytes_to_copy.min(proto_fps.buffer.len());
            if buffer.len() < take {
                buffer.resize(take, 0);
            }
            #[allow(clippy::indexing_slicing)]
            {
                buffer[..take].copy_from_slice(&proto_fps.buffer[..take]);
            }
        }

        Self {
            path: path.into(),
            file_type,
            requested: raw_bytes,
            buffer,
            file: None,
            lock: None,
            bitmap: None,
            universal_header: None,
        }
    }

    /// The path this FPS was allocated for.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The resident buffer.
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// The parsed [`UniversalHeader`], if enough of the buffer has been
    /// read to cover it.
    #[must_use]
    pub fn universal_header(&self) -> Option<&UniversalHeader> {
        self.universal_header.as_ref()
    }

    /// Opens the underlying file (spec §4.2 `open`). On a create mode,
    /// a missing parent directory is created and the open retried once
    /// (spec: "`ENOENT` during create → create tree → retry once").
    pub fn open(&mut self, mode: OpenMode) -> Result<()> {
        let file = match mode.to_std().open(&self.path) {
            Ok(f) => f,
            Err(e) if mode.is_create() && e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                mode.to_std().open(&self.path)?
            }
            Err(e) => return Err(e.into()),
        };

        self.lock = Some(FileLock::acquire(mode.lock_mode()));
        self.file = Some(file);
        Ok(())
    }

    /// Closes the underlying file handle, keeping the buffer resident.
    pub fn close(&mut self) {
        self.file = None;
        self.lock = None;
    }

    fn file_len(&self) -> Result<u64> {
        Ok(self
            .file
            .as_ref()
            .ok_or(Error::NoFile)?
            .metadata()?
            .len())
    }

    fn ensure_buffer_len(&mut self, len: usize) {
        if self.buffer.len() < len {
            self.buffer.resize(len, 0);
        }
    }

    fn maybe_parse_header(&mut self, crc_mode: CrcMode) -> Result<()> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(());
        }
        #[allow(clippy::indexing_slicing)]
        let raw: &[u8; HEADER_SIZE] = self.buffer[..HEADER_SIZE].try_into().expect("checked len");

        if crc_mode != CrcMode::Off && !UniversalHeader::validate_header_crc(raw) {
            log::warn!("{}: universal header CRC mismatch", self.path.display());
            if crc_mode == CrcMode::Validate {
                return Err(Error::InvalidHeader("header_crc"));
            }
        }

        let mut cursor = std::io::Cursor::new(raw.as_slice());
        let header = UniversalHeader::decode_from(&mut cursor)?;
        header.validate_invariants(self.file_type)?;
        self.universal_header = Some(header);
        Ok(())
    }

    /// Performs the read implied by the [`RawBytes`] this FPS was
    /// [`allocate`](Self::allocate)d with (spec §4.2 `read`):
    ///
    /// - [`RawBytes::FullFile`]: a single read sized from the file's
    ///   length; the file is closed afterward.
    /// - [`RawBytes::UniversalHeaderOnly`]: exactly 1024 bytes; the file
    ///   stays open so [`Self::read_range`] can serve later partial
    ///   reads against it.
    /// - [`RawBytes::Exact`]: a direct read of the requested byte count
    ///   starting at offset `0`.
    pub fn read(&mut self, crc_mode: CrcMode) -> Result<()> {
        match self.requested {
            RawBytes::FullFile => self.read_full(crc_mode),
            RawBytes::UniversalHeaderOnly => self.read_header_only(crc_mode),
            RawBytes::Exact(n) => self.read_partial(0, n, crc_mode),
        }
    }

    /// An explicit follow-up read of `bytes_to_read` bytes starting at
    /// `offset`, independent of how this FPS was allocated — the
    /// mechanism by which a header-only-opened file later pulls in an
    /// index table, record block, or (bitmap-tracked) segment data
    /// range on demand.
    pub fn read_range(&mut self, offset: u64, bytes_to_read: u64, mode: ReadMode, crc_mode: CrcMode) -> Result<()> {
        match mode {
            ReadMode::Direct => self.read_partial(offset, bytes_to_read, crc_mode),
            ReadMode::MemoryMapped => self.read_memory_mapped(offset, bytes_to_read, crc_mode),
        }
    }

    fn read_full(&mut self, crc_mode: CrcMode) -> Result<()> {
        let len = self.file_len()? as usize;
        self.ensure_buffer_len(len);
        let file = self.file.as_ref().ok_or(Error::NoFile)?;
        #[allow(clippy::indexing_slicing)]
        pread_exact(file, &mut self.buffer[..len], 0)?;
        self.buffer.truncate(len);
        self.maybe_parse_header(crc_mode)?;
        self.close();
        Ok(())
    }

    fn read_header_only(&mut self, crc_mode: CrcMode) -> Result<()> {
        self.ensure_buffer_len(HEADER_SIZE);
        let file = self.file.as_ref().ok_or(Error::NoFile)?;
        #[allow(clippy::indexing_slicing)]
        pread_exact(file, &mut self.buffer[..HEADER_SIZE], 0)?;
        self.maybe_parse_header(crc_mode)
    }

    fn read_partial(&mut self, offset: u64, bytes_to_read: u64, crc_mode: CrcMode) -> Result<()> {
        let end = offset as usize + bytes_to_read as usize;
        self.ensure_buffer_len(end);
        let file = self.file.as_ref().ok_or(Error::NoFile)?;
        #[allow(clippy::indexing_slicing)]
        pread_exact(file, &mut self.buffer[offset as usize..end], offset)?;
        if offset == 0 {
            self.maybe_parse_header(crc_mode)?;
        }
        Ok(())
    }

    fn read_memory_mapped(&mut self, offset: u64, bytes_to_read: u64, crc_mode: CrcMode) -> Result<()> {
        let file_len = self.file_len()?;
        {
            let bitmap = self
                .bitmap
                .get_or_insert_with(|| Bitmap::new(file_len, bitmap::DEFAULT_BLOCK_SIZE));
            bitmap.grow_to(file_len);
        }

        let runs = self
            .bitmap
            .as_ref()
            .expect("just inserted")
            .unread_runs(offset, bytes_to_read);

        let needed = (offset + bytes_to_read).max(runs.iter().map(|(o, l)| o + l).max().unwrap_or(0));
        self.ensure_buffer_len(needed as usize);

        {
            let file = self.file.as_ref().ok_or(Error::NoFile)?;
            for (run_offset, run_len) in &runs {
                let run_end = (run_offset + run_len) as usize;
                #[allow(clippy::indexing_slicing)]
                pread_exact(file, &mut self.buffer[*run_offset as usize..run_end], *run_offset)?;
            }
        }

        let bitmap = self.bitmap.as_mut().expect("just inserted");
        for (run_offset, run_len) in runs {
            bitmap.mark_resident(run_offset, run_len);
        }

        if offset == 0 {
            self.maybe_parse_header(crc_mode)?;
        }
        Ok(())
    }

    /// Grows the buffer to `new_len` bytes, zero-filling the new tail.
    /// Shrinking is a no-op (spec §4.2 `reallocate`: "Grow only").
    /// Because callers never hold raw pointers into the buffer (Design
    /// Notes §9), there is nothing further to fix up: any view taken
    /// before this call is simply re-derived against the new slice.
    pub fn reallocate(&mut self, new_len: u64) {
        let new_len = new_len as usize;
        if new_len > self.buffer.len() {
            self.buffer.resize(new_len, 0);
        }
    }

    /// Sums the byte size of `n_items` consecutive variable- or
    /// fixed-size items starting at `relative_offset` into the buffer,
    /// per spec §4.2 `bytes_for_items`.
    #[must_use]
    pub fn bytes_for_items(&self, sizer: &dyn ItemSizer, relative_offset: u64, n_items: u64) -> Option<u64> {
        let mut total = 0u64;
        let mut off = relative_offset as usize;
        for _ in 0..n_items {
            let sz = sizer.item_bytes(&self.buffer, off)?;
            total += sz;
            off += sz as usize;
        }
        Some(total)
    }

    /// The symmetric inverse of [`Self::bytes_for_items`]: how many
    /// whole items fit in `n_bytes` starting at `relative_offset`.
    #[must_use]
    pub fn items_for_bytes(&self, sizer: &dyn ItemSizer, relative_offset: u64, n_bytes: u64) -> u64 {
        let mut count = 0u64;
        let mut consumed = 0u64;
        let mut off = relative_offset as usize;
        while consumed < n_bytes {
            let Some(sz) = sizer.item_bytes(&self.buffer, off) else {
                break;
            };
            if sz == 0 {
                break;
            }
            consumed += sz;
            off += sz as usize;
            count += 1;
        }
        count
    }
}
