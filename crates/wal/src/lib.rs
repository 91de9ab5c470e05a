//! # WAL - Write-Ahead Log
//!
//! Per-column-family durability log for the SieveKV store.
//!
//! A mutation lands here before it touches the memtable, and the log is
//! truncated once a flush has made the data durable in an SSTable. On open,
//! the store replays the log to rebuild the memtable, so a crash between
//! append and flush loses no acknowledged write.
//!
//! ## Frame format
//!
//! Each record occupies one frame:
//!
//! ```text
//! [body_len: u32 LE][crc32(body): u32 LE][body]
//! ```
//!
//! with the body laid out op-first:
//!
//! ```text
//! Put: [op=0: u8][seq: u64][key_len: u32][key][val_len: u32][value]
//! Del: [op=1: u8][seq: u64][key_len: u32][key]
//! ```
//!
//! A frame torn at the end of the file — the typical crash-mid-append
//! artifact — reads as a clean end of log. Anything else that fails to
//! decode (bad CRC, impossible length, unknown op, stray trailing bytes)
//! is corruption and aborts the replay.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{LogWriter, LogReader, LogRecord};
//!
//! let mut w = LogWriter::create("wal.log", true).unwrap();
//! w.append(&LogRecord::Put {
//!     seq: 1,
//!     key: b"key".to_vec(),
//!     value: b"phone_value1".to_vec(),
//! }).unwrap();
//! drop(w);
//!
//! let mut r = LogReader::open("wal.log").unwrap();
//! while let Some(rec) = r.next_record().unwrap() {
//!     println!("{:?}", rec);
//! }
//! ```

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Bytes of frame header preceding every body: body_len + crc32.
const HEADER_BYTES: usize = 8;

/// Upper bound on a single record body. Derived from the store's key and
/// value caps with headroom; anything larger in a header is corruption,
/// not a big record.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

const OP_PUT: u8 = 0;
const OP_DEL: u8 = 1;

/// One logged mutation of a column family.
///
/// `seq` is the CF's monotonic sequence number; replay feeds it back into
/// the memtable so newer entries keep winning after a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// A key-value insertion.
    Put {
        seq: u64,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    /// A key deletion (tombstone).
    Del { seq: u64, key: Vec<u8> },
}

impl LogRecord {
    /// Serializes the record body into `body` (cleared first).
    fn encode(&self, body: &mut Vec<u8>) {
        body.clear();
        match self {
            LogRecord::Put { seq, key, value } => {
                body.push(OP_PUT);
                body.extend_from_slice(&seq.to_le_bytes());
                body.extend_from_slice(&(key.len() as u32).to_le_bytes());
                body.extend_from_slice(key);
                body.extend_from_slice(&(value.len() as u32).to_le_bytes());
                body.extend_from_slice(value);
            }
            LogRecord::Del { seq, key } => {
                body.push(OP_DEL);
                body.extend_from_slice(&seq.to_le_bytes());
                body.extend_from_slice(&(key.len() as u32).to_le_bytes());
                body.extend_from_slice(key);
            }
        }
    }

    /// Parses a CRC-verified body. The whole body must be consumed; bytes
    /// left over after the record mean the frame is corrupt, CRC or not.
    fn decode(mut body: &[u8]) -> Result<Self, WalError> {
        let op = body.read_u8().map_err(|_| WalError::Corrupt)?;
        let seq = body
            .read_u64::<LittleEndian>()
            .map_err(|_| WalError::Corrupt)?;
        let key = read_chunk(&mut body)?;

        let record = match op {
            OP_PUT => {
                let value = read_chunk(&mut body)?;
                LogRecord::Put { seq, key, value }
            }
            OP_DEL => LogRecord::Del { seq, key },
            _ => return Err(WalError::Corrupt),
        };

        if !body.is_empty() {
            return Err(WalError::Corrupt);
        }
        Ok(record)
    }
}

/// Reads a `[len: u32][bytes]` chunk out of `body`, advancing it.
fn read_chunk(body: &mut &[u8]) -> Result<Vec<u8>, WalError> {
    let len = body
        .read_u32::<LittleEndian>()
        .map_err(|_| WalError::Corrupt)? as usize;
    if len > body.len() {
        return Err(WalError::Corrupt);
    }
    let (chunk, rest) = body.split_at(len);
    let out = chunk.to_vec();
    *body = rest;
    Ok(out)
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A frame that is neither valid nor a torn tail.
    #[error("corrupt record")]
    Corrupt,
}

/// Append-only log writer for one column family.
///
/// Each append encodes the record into a reused scratch buffer, frames it
/// with length and CRC, and hands both to the OS. With `sync` set, the
/// append also fsyncs, so the record is durable before the caller gets its
/// `Ok`; bulk loads leave `sync` off and fsync per batch via
/// [`sync_to_disk`](LogWriter::sync_to_disk).
pub struct LogWriter {
    file: File,
    sync: bool,
    /// Scratch buffer for record bodies, reused across appends.
    body: Vec<u8>,
}

impl LogWriter {
    /// Opens (or creates) a log file in append mode.
    ///
    /// # Arguments
    ///
    /// * `path` - file system path for the log (created if missing).
    /// * `sync` - if true, every `append` call is followed by `fsync`.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        Ok(Self {
            file,
            sync,
            body: Vec::with_capacity(256),
        })
    }

    /// Frames and appends one record.
    pub fn append(&mut self, record: &LogRecord) -> Result<(), WalError> {
        record.encode(&mut self.body);
        if self.body.len() > MAX_BODY_BYTES {
            return Err(WalError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("WAL record body of {} bytes exceeds cap", self.body.len()),
            )));
        }

        let mut hasher = Crc32::new();
        hasher.update(&self.body);

        let mut header = [0u8; HEADER_BYTES];
        LittleEndian::write_u32(&mut header[..4], self.body.len() as u32);
        LittleEndian::write_u32(&mut header[4..], hasher.finalize());

        self.file.write_all(&header)?;
        self.file.write_all(&self.body)?;

        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Fsyncs everything appended so far. The batched-mode durability
    /// point; a no-op in spirit when `sync` is already on.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Sequential log reader.
///
/// Generic over any `Read` implementor so tests can replay from in-memory
/// buffers. Frames are CRC-checked before their bodies are parsed.
pub struct LogReader<R: Read> {
    rdr: BufReader<R>,
    /// Scratch buffer for frame bodies, reused across records.
    body: Vec<u8>,
}

impl LogReader<File> {
    /// Opens an existing log file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<LogReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(Self::from_reader(f))
    }
}

impl<R: Read> LogReader<R> {
    /// Wraps any `Read` implementor (e.g. a `Cursor` in tests).
    pub fn from_reader(reader: R) -> Self {
        LogReader {
            rdr: BufReader::new(reader),
            body: Vec::with_capacity(256),
        }
    }

    /// Returns the next record, or `Ok(None)` at the end of the log.
    ///
    /// The log "ends" both at a clean EOF and at a torn tail — a frame
    /// whose header or body stops short because a crash interrupted the
    /// append. Every record before the tear is still returned. A frame
    /// that is present in full but does not check out (absurd length, CRC
    /// mismatch, unknown op, trailing bytes) is [`WalError::Corrupt`].
    pub fn next_record(&mut self) -> Result<Option<LogRecord>, WalError> {
        let mut header = [0u8; HEADER_BYTES];
        if !fill_or_eof(&mut self.rdr, &mut header)? {
            return Ok(None);
        }
        let body_len = LittleEndian::read_u32(&header[..4]) as usize;
        let expected_crc = LittleEndian::read_u32(&header[4..]);

        // The smallest legal body is a Del with an empty key: op + seq +
        // key_len. Anything shorter, or above the cap, cannot have been
        // written by us.
        if body_len < 13 || body_len > MAX_BODY_BYTES {
            return Err(WalError::Corrupt);
        }

        self.body.resize(body_len, 0);
        if !fill_or_eof(&mut self.rdr, &mut self.body)? {
            return Ok(None); // torn body
        }

        let mut hasher = Crc32::new();
        hasher.update(&self.body);
        if hasher.finalize() != expected_crc {
            return Err(WalError::Corrupt);
        }

        LogRecord::decode(&self.body).map(Some)
    }

    /// Drains the log, calling `apply` on every record.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(LogRecord),
    {
        while let Some(record) = self.next_record()? {
            apply(record);
        }
        Ok(())
    }
}

/// Fills `buf` completely from `r`. `Ok(false)` when the source runs out
/// first — the single place clean EOF and torn tails collapse into "log
/// over".
fn fill_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<bool, WalError> {
    match r.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(WalError::Io(e)),
    }
}

#[cfg(test)]
mod tests;
