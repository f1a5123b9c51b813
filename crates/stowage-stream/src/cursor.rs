//! Seekable byte cursor over one stream.
//!
//! At most one block is resident at a time. A single read or write never
//! crosses a block boundary, so callers loop (the `Read`/`Write` helpers
//! such as `read_to_end` and `write_all` already do).

use std::io::{self, Read, Seek, SeekFrom, Write};

use chrono::Utc;
use stowage_crypto::StreamDigest;
use tracing::{debug, warn};

use crate::error::{StreamError, StreamResult};
use crate::mode::OpenMode;
use crate::store::StreamStore;
use crate::types::{BlockEntry, StreamId, StreamInfo};

/// Whole-stream digest carried through a sequential write session.
///
/// `complete` covers blocks `0..next_block`, all full. The block at
/// `next_block` may be flushed any number of times while writes only move
/// forward; flushing any other block, or writing below `written_to`, ends
/// the session's checksum.
struct RunningChecksum {
    complete: StreamDigest,
    next_block: u64,
    /// End of the furthest write so far.
    written_to: u64,
}

impl RunningChecksum {
    fn new(digest: StreamDigest) -> Self {
        Self {
            complete: digest,
            next_block: 0,
            written_to: 0,
        }
    }

    /// Record a write of `len` bytes at `pos`. Returns `false` if it
    /// overwrites bytes already written this session.
    fn advance(&mut self, pos: u64, len: usize) -> bool {
        if pos < self.written_to {
            return false;
        }
        self.written_to = pos + len as u64;
        true
    }

    /// Checksum of the stream after flushing `data` as block `bnum`, or
    /// `None` if the write was out of order.
    fn extend(&mut self, bnum: u64, data: &[u8], block_size: usize) -> Option<String> {
        if bnum != self.next_block {
            return None;
        }
        let mut digest = self.complete.clone();
        digest.update(data);
        let hex = digest.current_hex();
        if data.len() == block_size {
            self.complete = digest;
            self.next_block += 1;
        }
        Some(hex)
    }
}

/// A read/write/append session over one stream.
///
/// Obtained from [`StreamStore::open_stream`]. Implements
/// [`Read`], [`Write`] and [`Seek`]. Writing past the end extends the
/// stream with zeros. Dropping an open cursor flushes it; call
/// [`close`](Self::close) to observe flush errors.
pub struct BlockCursor<'a> {
    store: &'a StreamStore,
    info: StreamInfo,
    mode: OpenMode,
    block_size: u64,
    /// Block list snapshot, indexed by sequence number.
    blocks: Vec<BlockEntry>,
    pos: u64,
    size: u64,
    resident: Option<u64>,
    buffer: Vec<u8>,
    dirty: bool,
    checksum: Option<RunningChecksum>,
    closed: bool,
}

impl<'a> BlockCursor<'a> {
    pub(crate) fn open(store: &'a StreamStore, id: &StreamId, mode: OpenMode) -> StreamResult<Self> {
        let mut info = store.get_stream(id)?;
        let mut checksum = None;
        if mode.truncates() {
            store.delete_blocks(id, 0)?;
            let algorithm = store.hash_algorithm();
            info.size = 0;
            info.checksum = Some(StreamDigest::empty_hex(algorithm));
            info.modified = Utc::now();
            store.update_stream(&info)?;
            checksum = Some(RunningChecksum::new(StreamDigest::new(algorithm)));
        }
        let blocks = store.list_blocks(id)?;
        let size = info.size;
        debug!(stream = %id, %mode, size, "cursor opened");
        Ok(Self {
            store,
            info,
            mode,
            block_size: store.block_size() as u64,
            blocks,
            pos: if mode.appends() { size } else { 0 },
            size,
            resident: None,
            buffer: Vec::new(),
            dirty: false,
            checksum,
            closed: false,
        })
    }

    /// Stream metadata as last persisted by this cursor.
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Current position.
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Current stream length, including unflushed writes.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn readable(&self) -> bool {
        self.mode.readable()
    }

    pub fn writable(&self) -> bool {
        self.mode.writable()
    }

    pub fn seekable(&self) -> bool {
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Flush and end the session. Closing twice is a no-op.
    pub fn close(&mut self) -> StreamResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush_block()?;
        self.closed = true;
        self.resident = None;
        self.buffer = Vec::new();
        debug!(stream = %self.info.id, size = self.size, "cursor closed");
        Ok(())
    }

    /// Read from the current block into `buf`; returns 0 at end of stream.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> StreamResult<usize> {
        self.ensure_open()?;
        if !self.mode.readable() {
            return Err(StreamError::NotReadable);
        }
        if buf.is_empty() || self.pos >= self.size {
            return Ok(0);
        }
        let bnum = self.pos / self.block_size;
        let offset = (self.pos % self.block_size) as usize;
        self.load(bnum)?;
        let n = buf.len().min(self.block_top(bnum) - offset);
        buf[..n].copy_from_slice(&self.buffer[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }

    /// Write into the current block from `buf`; returns the bytes taken.
    pub fn write_chunk(&mut self, buf: &[u8]) -> StreamResult<usize> {
        self.ensure_open()?;
        if !self.mode.writable() {
            return Err(StreamError::NotWritable);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let bnum = self.pos / self.block_size;
        let offset = (self.pos % self.block_size) as usize;
        if self.resident != Some(bnum) {
            self.flush_block()?;
            self.resident = None;
            self.fill_gap(bnum)?;
            self.load(bnum)?;
        }
        let n = buf.len().min(self.block_size as usize - offset);
        if let Some(running) = self.checksum.as_mut() {
            if !running.advance(self.pos, n) {
                self.checksum = None;
            }
        }
        self.buffer[offset..offset + n].copy_from_slice(&buf[..n]);
        self.dirty = true;
        self.pos += n as u64;
        self.size = self.size.max(self.pos);
        Ok(n)
    }

    /// Move to a new position. Positions past the end are allowed.
    pub fn seek_to(&mut self, target: SeekFrom) -> StreamResult<u64> {
        self.ensure_open()?;
        let pos = match target {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.size) + i128::from(delta),
        };
        let pos = u64::try_from(pos).map_err(|_| StreamError::InvalidSeek(pos))?;
        if self.resident.is_some_and(|bnum| bnum != pos / self.block_size) {
            self.flush_block()?;
            self.resident = None;
            self.buffer.clear();
        }
        self.pos = pos;
        Ok(pos)
    }

    fn ensure_open(&self) -> StreamResult<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        Ok(())
    }

    /// Bytes of block `bnum` that lie inside the stream.
    fn block_top(&self, bnum: u64) -> usize {
        let start = bnum * self.block_size;
        if self.size <= start {
            0
        } else {
            (self.size - start).min(self.block_size) as usize
        }
    }

    /// Make `bnum` the resident block.
    ///
    /// Writable sessions always hold a full, zero-padded block so writes
    /// can extend it; read-only sessions pad to the stream length.
    fn load(&mut self, bnum: u64) -> StreamResult<()> {
        if self.resident == Some(bnum) {
            return Ok(());
        }
        self.flush_block()?;
        let mut buffer = match self.blocks.get(bnum as usize) {
            Some(entry) => self.store.retrieve_block(entry)?,
            None => Vec::new(),
        };
        let want = if self.mode.writable() {
            self.block_size as usize
        } else {
            self.block_top(bnum)
        };
        if buffer.len() < want {
            buffer.resize(want, 0);
        }
        self.buffer = buffer;
        self.resident = Some(bnum);
        self.dirty = false;
        Ok(())
    }

    /// Store zero blocks for every missing sequence number below `bnum`.
    fn fill_gap(&mut self, bnum: u64) -> StreamResult<()> {
        if (self.blocks.len() as u64) >= bnum {
            return Ok(());
        }
        let zeros = vec![0u8; self.block_size as usize];
        while (self.blocks.len() as u64) < bnum {
            let seq = self.blocks.len() as u64;
            let entry = self.store.store_block(&self.info.id, seq, &zeros)?;
            self.blocks.push(entry);
            self.size = self.size.max((seq + 1) * self.block_size);
            self.checksum = None;
            self.info.checksum = None;
            self.save_metadata()?;
        }
        debug!(stream = %self.info.id, upto = bnum, "extended stream with zero blocks");
        Ok(())
    }

    /// Persist the resident block if dirty, then the stream metadata.
    fn flush_block(&mut self) -> StreamResult<()> {
        let Some(bnum) = self.resident else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let top = self.block_top(bnum);
        let data = &self.buffer[..top];
        match self.blocks.get_mut(bnum as usize) {
            Some(entry) => self.store.update_block(entry, data)?,
            None => {
                let entry = self.store.store_block(&self.info.id, bnum, data)?;
                self.blocks.push(entry);
            }
        }
        let block_size = self.block_size as usize;
        let checksum = self
            .checksum
            .as_mut()
            .and_then(|running| running.extend(bnum, data, block_size));
        if checksum.is_none() {
            self.checksum = None;
        }
        self.info.checksum = checksum;
        self.dirty = false;
        self.save_metadata()
    }

    fn save_metadata(&mut self) -> StreamResult<()> {
        self.info.size = self.size;
        self.info.modified = Utc::now();
        self.store.update_stream(&self.info)
    }
}

impl Read for BlockCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_chunk(buf)?)
    }
}

impl Write for BlockCursor<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_chunk(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ensure_open()?;
        Ok(self.flush_block()?)
    }
}

impl Seek for BlockCursor<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.seek_to(pos)?)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}

impl Drop for BlockCursor<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush_block() {
            warn!(stream = %self.info.id, error = %e, "failed to flush cursor on drop");
        }
    }
}

impl std::fmt::Debug for BlockCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCursor")
            .field("stream", &self.info.id)
            .field("mode", &self.mode)
            .field("pos", &self.pos)
            .field("size", &self.size)
            .field("resident", &self.resident)
            .field("dirty", &self.dirty)
            .finish()
    }
}
