// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Data objects: the uniform byte-stream abstraction fed to and
//! captured from the engines.
//!
//! A [`Data`] is a cheap handle (clone = same object) over one of four
//! backings:
//!
//! - *empty* - a fresh object; promoted to memory by the first write
//! - *memory* - an owned, growable buffer with a read cursor
//! - *file region* - an offset/length window into an open file
//! - *callbacks* - a caller-supplied pull source
//!
//! The declared [`DataEncoding`] is advisory metadata handed to the
//! engine at invocation (`--armor`, `--base64`, ...); it never
//! transforms the bytes in the object itself.

use std::fs::File;
use std::io::{Read as _, Seek as _, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, ErrorKind, Result};
use crate::protocol::escape;

/// Growth quantum for memory-backed objects.
const ALLOC_CHUNK: usize = 1024;

/// Declared content encoding of a data object.
///
/// Advisory only; conveyed to the engine, never applied in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataEncoding {
    /// Not specified.
    #[default]
    None,
    /// Raw binary.
    Binary,
    /// Base64 without headers.
    Base64,
    /// PEM or OpenPGP armor.
    Armor,
}

/// Read callback of a pull source. Returns 0 at end of data.
pub type ReadCb = Box<dyn FnMut(&mut [u8]) -> Result<usize> + Send>;
/// Optional seek callback of a pull source.
pub type SeekCb = Box<dyn FnMut(SeekFrom) -> Result<u64> + Send>;
/// Optional release hook of a pull source, run exactly once on drop.
pub type ReleaseCb = Box<dyn FnOnce() + Send>;

/// Caller-supplied pull source.
pub struct DataCallbacks {
    /// Pull bytes; 0 means end of data.
    pub read: ReadCb,
    /// Reposition; absent sources cannot seek.
    pub seek: Option<SeekCb>,
    /// Cleanup hook.
    pub release: Option<ReleaseCb>,
}

enum Backing {
    /// Zero-type object; becomes `Memory` on first write.
    Empty,
    Memory {
        buf: Vec<u8>,
        /// Read cursor; writes always append.
        pos: usize,
        /// Borrowed seed bytes are read-only.
        writable: bool,
    },
    FileRegion {
        file: File,
        offset: u64,
        length: u64,
        /// Position relative to `offset`.
        pos: u64,
    },
    Callbacks {
        cbs: DataCallbacks,
        /// Latched after the read callback first reports 0.
        at_end: bool,
    },
}

struct Core {
    backing: Backing,
    encoding: DataEncoding,
    file_name: Option<String>,
}

/// Handle to one data object. Clones share the object.
#[derive(Clone)]
pub struct Data {
    core: Arc<Mutex<Core>>,
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.lock();
        let kind = match core.backing {
            Backing::Empty => "empty",
            Backing::Memory { .. } => "memory",
            Backing::FileRegion { .. } => "file-region",
            Backing::Callbacks { .. } => "callbacks",
        };
        f.debug_struct("Data")
            .field("backing", &kind)
            .field("encoding", &core.encoding)
            .finish()
    }
}

impl Data {
    fn from_backing(backing: Backing) -> Self {
        Self {
            core: Arc::new(Mutex::new(Core {
                backing,
                encoding: DataEncoding::None,
                file_name: None,
            })),
        }
    }

    /// Fresh zero-type object; reads are at end, the first write
    /// promotes it to a memory object.
    #[must_use]
    pub fn new() -> Self {
        Self::from_backing(Backing::Empty)
    }

    /// Owned memory object seeded with `bytes`.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::from_backing(Backing::Memory {
            buf: bytes.into(),
            pos: 0,
            writable: true,
        })
    }

    /// Read-only memory object borrowing static bytes (copied into the
    /// handle once, never grown).
    #[must_use]
    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self::from_backing(Backing::Memory {
            buf: bytes.to_vec(),
            pos: 0,
            writable: false,
        })
    }

    /// Memory object holding the full contents of the named file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(Error::from)?;
        Ok(Self::from_bytes(bytes))
    }

    /// Read-only window of `length` bytes starting at `offset`.
    pub fn from_file_region(file: File, offset: u64, length: u64) -> Result<Self> {
        Ok(Self::from_backing(Backing::FileRegion {
            file,
            offset,
            length,
            pos: 0,
        }))
    }

    /// Pull-source object delegating to caller callbacks.
    #[must_use]
    pub fn from_callbacks(cbs: DataCallbacks) -> Self {
        Self::from_backing(Backing::Callbacks { cbs, at_end: false })
    }

    /// Read up to `buf.len()` bytes; `Ok(0)` is end of data.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut core = self.core.lock();
        match &mut core.backing {
            Backing::Empty => Ok(0),
            Backing::Memory { buf: mem, pos, .. } => {
                let avail = mem.len().saturating_sub(*pos);
                let n = avail.min(buf.len());
                buf[..n].copy_from_slice(&mem[*pos..*pos + n]);
                *pos += n;
                Ok(n)
            }
            Backing::FileRegion {
                file,
                offset,
                length,
                pos,
            } => {
                let remaining = length.saturating_sub(*pos);
                if remaining == 0 {
                    return Ok(0);
                }
                let want = (buf.len() as u64).min(remaining) as usize;
                file.seek(SeekFrom::Start(*offset + *pos))
                    .map_err(Error::from)?;
                let n = file.read(&mut buf[..want]).map_err(Error::from)?;
                *pos += n as u64;
                Ok(n)
            }
            Backing::Callbacks { cbs, at_end } => {
                if *at_end {
                    return Ok(0);
                }
                let n = (cbs.read)(buf)?;
                if n == 0 {
                    *at_end = true;
                }
                Ok(n)
            }
        }
    }

    /// Append bytes. Promotes a zero-type object to memory; fails with
    /// `InvalidValue` on read-only backings.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut core = self.core.lock();
        if let Backing::Empty = core.backing {
            core.backing = Backing::Memory {
                buf: Vec::new(),
                pos: 0,
                writable: true,
            };
        }
        match &mut core.backing {
            Backing::Memory {
                buf,
                writable: true,
                ..
            } => {
                if buf.capacity() - buf.len() < bytes.len() {
                    let grow = bytes.len().max(ALLOC_CHUNK);
                    buf.reserve(grow);
                }
                buf.extend_from_slice(bytes);
                Ok(bytes.len())
            }
            _ => Err(Error::core(ErrorKind::InvalidValue)
                .with_detail("data object is not writable")),
        }
    }

    /// Reposition the read cursor.
    ///
    /// Defined for memory and file-region objects always, for pull
    /// sources only when a seek callback was supplied.
    pub fn seek(&mut self, from: SeekFrom) -> Result<u64> {
        fn resolve(len: u64, pos: u64, from: SeekFrom) -> Result<u64> {
            let target = match from {
                SeekFrom::Start(n) => n as i64,
                SeekFrom::Current(d) => pos as i64 + d,
                SeekFrom::End(d) => len as i64 + d,
            };
            if target < 0 {
                return Err(Error::core(ErrorKind::InvalidValue).with_detail("seek before start"));
            }
            Ok(target as u64)
        }

        let mut core = self.core.lock();
        match &mut core.backing {
            Backing::Empty => Ok(0),
            Backing::Memory { buf, pos, .. } => {
                let target = resolve(buf.len() as u64, *pos as u64, from)?;
                *pos = target.min(buf.len() as u64) as usize;
                Ok(*pos as u64)
            }
            Backing::FileRegion { length, pos, .. } => {
                let target = resolve(*length, *pos, from)?;
                *pos = target.min(*length);
                Ok(*pos)
            }
            Backing::Callbacks { cbs, at_end } => match cbs.seek.as_mut() {
                Some(seek) => {
                    let new_pos = seek(from)?;
                    *at_end = false;
                    Ok(new_pos)
                }
                None => Err(Error::core(ErrorKind::InvalidValue)
                    .with_detail("pull source cannot seek")),
            },
        }
    }

    /// Rewind to the start of the stream.
    pub fn rewind(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Declared content encoding.
    #[must_use]
    pub fn encoding(&self) -> DataEncoding {
        self.core.lock().encoding
    }

    /// Declare the content encoding (advisory).
    pub fn set_encoding(&mut self, encoding: DataEncoding) {
        self.core.lock().encoding = encoding;
    }

    /// Associated file-name hint, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<String> {
        self.core.lock().file_name.clone()
    }

    /// Set the file-name hint conveyed to the engine.
    pub fn set_file_name(&mut self, name: impl Into<String>) {
        self.core.lock().file_name = Some(name.into());
    }

    /// Total length, where the backing knows it.
    #[must_use]
    pub fn len_hint(&self) -> Option<u64> {
        let core = self.core.lock();
        match &core.backing {
            Backing::Empty => Some(0),
            Backing::Memory { buf, .. } => Some(buf.len() as u64),
            Backing::FileRegion { length, .. } => Some(*length),
            Backing::Callbacks { .. } => None,
        }
    }

    /// Take the accumulated bytes out of a memory-backed object,
    /// leaving it empty. Fails on other backings.
    pub fn take_bytes(&mut self) -> Result<Vec<u8>> {
        let mut core = self.core.lock();
        match &mut core.backing {
            Backing::Empty => Ok(Vec::new()),
            Backing::Memory { buf, pos, .. } => {
                *pos = 0;
                Ok(std::mem::take(buf))
            }
            _ => Err(Error::core(ErrorKind::InvalidValue)
                .with_detail("not a memory data object")),
        }
    }

    /// Append `raw` with XML entity escaping applied.
    ///
    /// Used by the operation state machines when formatting
    /// informational output.
    pub fn append_xml_escaped(&mut self, raw: &[u8]) -> Result<()> {
        let escaped = escape::xml_escape(raw);
        self.write(&escaped).map(|_| ())
    }

    /// Drain this object into an `io::Write` sink (test helper and
    /// convenience for callers capturing engine output).
    pub fn copy_to(&mut self, sink: &mut dyn std::io::Write) -> Result<u64> {
        let mut total = 0u64;
        let mut buf = [0u8; 4096];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            sink.write_all(&buf[..n]).map_err(Error::from)?;
            total += n as u64;
        }
    }
}

impl Default for Data {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        if let Backing::Callbacks { cbs, .. } = &mut self.backing {
            if let Some(release) = cbs.release.take() {
                release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_memory_read_write_rewind() {
        let mut data = Data::from_bytes(&b"Hallo Leute!\n"[..]);
        let mut first = Vec::new();
        data.copy_to(&mut first).unwrap();
        assert_eq!(first, b"Hallo Leute!\n");

        // Rewinding and rereading yields identical bytes.
        data.rewind().unwrap();
        let mut second = Vec::new();
        data.copy_to(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_promotes_on_write() {
        let mut data = Data::new();
        let mut probe = [0u8; 8];
        assert_eq!(data.read(&mut probe).unwrap(), 0, "fresh object reads EOF");

        data.write(b"captured").unwrap();
        data.rewind().unwrap();
        let n = data.read(&mut probe).unwrap();
        assert_eq!(&probe[..n], b"captured");
    }

    #[test]
    fn test_write_appends_regardless_of_cursor() {
        let mut data = Data::from_bytes(&b"head"[..]);
        let mut buf = [0u8; 2];
        data.read(&mut buf).unwrap();
        data.write(b"-tail").unwrap();
        data.rewind().unwrap();
        let mut all = Vec::new();
        data.copy_to(&mut all).unwrap();
        assert_eq!(all, b"head-tail");
    }

    #[test]
    fn test_static_is_read_only() {
        let mut data = Data::from_static(b"frozen");
        let err = data.write(b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn test_file_region_window() {
        let mut tmp = tempfile::tempfile().unwrap();
        tmp.write_all(b"aaaa-window-zzzz").unwrap();
        let mut data = Data::from_file_region(tmp, 5, 6).unwrap();

        let mut out = Vec::new();
        data.copy_to(&mut out).unwrap();
        assert_eq!(out, b"window");

        data.rewind().unwrap();
        let mut again = Vec::new();
        data.copy_to(&mut again).unwrap();
        assert_eq!(again, b"window");
    }

    #[test]
    fn test_callback_source_eof_latch() {
        let chunks = std::sync::Arc::new(Mutex::new(vec![
            b"second".to_vec(),
            b"first ".to_vec(),
        ]));
        let src = chunks.clone();
        let calls = std::sync::Arc::new(Mutex::new(0usize));
        let counted = calls.clone();
        let mut data = Data::from_callbacks(DataCallbacks {
            read: Box::new(move |buf| {
                *counted.lock() += 1;
                match src.lock().pop() {
                    Some(chunk) => {
                        buf[..chunk.len()].copy_from_slice(&chunk);
                        Ok(chunk.len())
                    }
                    None => Ok(0),
                }
            }),
            seek: None,
            release: None,
        });

        let mut out = Vec::new();
        data.copy_to(&mut out).unwrap();
        assert_eq!(out, b"first second");
        let calls_at_eof = *calls.lock();

        // After the latch, the callback is not consulted again.
        let mut probe = [0u8; 4];
        assert_eq!(data.read(&mut probe).unwrap(), 0);
        assert_eq!(*calls.lock(), calls_at_eof);
    }

    #[test]
    fn test_callback_source_cannot_seek_without_cb() {
        let mut data = Data::from_callbacks(DataCallbacks {
            read: Box::new(|_| Ok(0)),
            seek: None,
            release: None,
        });
        let err = data.rewind().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn test_release_hook_runs_once_on_drop() {
        let released = std::sync::Arc::new(Mutex::new(0usize));
        let hook = released.clone();
        let data = Data::from_callbacks(DataCallbacks {
            read: Box::new(|_| Ok(0)),
            seek: None,
            release: Some(Box::new(move || *hook.lock() += 1)),
        });
        let clone = data.clone();
        drop(data);
        assert_eq!(*released.lock(), 0, "live clone keeps the source open");
        drop(clone);
        assert_eq!(*released.lock(), 1);
    }

    #[test]
    fn test_xml_escaped_append() {
        let mut data = Data::new();
        data.append_xml_escaped(b"<&>").unwrap();
        assert_eq!(data.take_bytes().unwrap(), b"&lt;&amp;&gt;");
    }

    #[test]
    fn test_encoding_is_advisory() {
        let mut data = Data::from_bytes(&b"raw"[..]);
        data.set_encoding(DataEncoding::Armor);
        assert_eq!(data.encoding(), DataEncoding::Armor);
        let mut out = Vec::new();
        data.copy_to(&mut out).unwrap();
        assert_eq!(out, b"raw", "encoding must not transform bytes");
    }
}
