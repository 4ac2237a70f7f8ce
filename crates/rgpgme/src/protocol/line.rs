// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Newline framing for the status and response channels.
//!
//! Both engine dialects speak newline-terminated lines bounded by a
//! fixed protocol line length. Reads from a non-blocking descriptor
//! arrive in arbitrary fragments; the [`LineBuffer`] keeps the tail of
//! the last fragment (the attic) and hands out exactly the lines that
//! have a terminator, independent of how the bytes were chunked.
//!
//! The Assuan dialect additionally splits over-long payloads into
//! continuation lines marked by a trailing backslash; the buffer
//! reassembles those when constructed with
//! [`LineBuffer::with_continuations`], and [`split_for_write`] produces
//! them on the sending side.

use crate::error::{Error, ErrorKind, ErrorSource, Result};

/// Maximum length of one physical protocol line, terminator included.
pub const LINELENGTH: usize = 1002;

/// Incremental line framer with attic carryover.
///
/// Embedded NUL bytes are payload; lines are length-tracked, never
/// NUL-terminated.
#[derive(Debug)]
pub struct LineBuffer {
    /// Partial line carried over from the previous fragment.
    attic: Vec<u8>,
    /// Completed lines awaiting [`LineBuffer::next_line`].
    ready: std::collections::VecDeque<Vec<u8>>,
    /// Stash of continuation segments (trailing-backslash lines).
    joined: Vec<u8>,
    /// Whether trailing-backslash reassembly is enabled.
    continuations: bool,
    /// Which subsystem to blame in errors.
    source: ErrorSource,
}

impl LineBuffer {
    /// Plain framer; a trailing backslash has no special meaning.
    #[must_use]
    pub fn new(source: ErrorSource) -> Self {
        Self {
            attic: Vec::new(),
            ready: std::collections::VecDeque::new(),
            joined: Vec::new(),
            continuations: false,
            source,
        }
    }

    /// Framer that reassembles trailing-backslash continuation lines.
    #[must_use]
    pub fn with_continuations(source: ErrorSource) -> Self {
        let mut this = Self::new(source);
        this.continuations = true;
        this
    }

    /// Feed one read fragment.
    ///
    /// Completed lines become available through
    /// [`LineBuffer::next_line`]. A physical line that would exceed
    /// [`LINELENGTH`] fails with `LineTooLong` and poisons nothing:
    /// the caller is expected to abort the operation.
    pub fn feed(&mut self, fragment: &[u8]) -> Result<()> {
        let mut rest = fragment;
        while let Some(nl) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(nl);
            rest = &tail[1..];
            if self.attic.len() + head.len() + 1 > LINELENGTH {
                return Err(Error::new(self.source, ErrorKind::LineTooLong));
            }
            let mut line = std::mem::take(&mut self.attic);
            line.extend_from_slice(head);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.complete(line);
        }
        if self.attic.len() + rest.len() + 1 > LINELENGTH {
            return Err(Error::new(self.source, ErrorKind::LineTooLong));
        }
        self.attic.extend_from_slice(rest);
        Ok(())
    }

    fn complete(&mut self, line: Vec<u8>) {
        if self.continuations {
            if line.last() == Some(&b'\\') {
                self.joined.extend_from_slice(&line[..line.len() - 1]);
                return;
            }
            if !self.joined.is_empty() {
                let mut whole = std::mem::take(&mut self.joined);
                whole.extend_from_slice(&line);
                self.ready.push_back(whole);
                return;
            }
        }
        self.ready.push_back(line);
    }

    /// Pop the next complete line, terminator stripped.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        self.ready.pop_front()
    }

    /// Signal end-of-stream.
    ///
    /// Fails with `LineNotTerminated` if bytes remain without a
    /// terminator, including an unfinished continuation run.
    pub fn finish(&self) -> Result<()> {
        if self.attic.is_empty() && self.joined.is_empty() {
            Ok(())
        } else {
            Err(Error::new(self.source, ErrorKind::LineNotTerminated))
        }
    }

    /// True if no partial data is buffered.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.attic.is_empty() && self.joined.is_empty() && self.ready.is_empty()
    }
}

/// Split `payload` into wire lines, inserting continuation markers.
///
/// Every produced line is terminated and at most [`LINELENGTH`] bytes;
/// all but the last carry a trailing backslash before the newline. The
/// receiving side's [`LineBuffer::with_continuations`] restores the
/// original payload.
#[must_use]
pub fn split_for_write(payload: &[u8]) -> Vec<Vec<u8>> {
    // Room for the continuation backslash plus the newline.
    const CHUNK: usize = LINELENGTH - 2;
    if payload.is_empty() {
        return vec![b"\n".to_vec()];
    }
    let mut out = Vec::new();
    let mut chunks = payload.chunks(CHUNK).peekable();
    while let Some(chunk) = chunks.next() {
        let mut line = Vec::with_capacity(chunk.len() + 2);
        line.extend_from_slice(chunk);
        if chunks.peek().is_some() {
            line.push(b'\\');
        }
        line.push(b'\n');
        out.push(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_lines(buf: &mut LineBuffer) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(line) = buf.next_line() {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_single_line() {
        let mut buf = LineBuffer::new(ErrorSource::Gpg);
        buf.feed(b"[GNUPG:] GOODSIG 1234 test\n").unwrap();
        assert_eq!(collect_lines(&mut buf), vec![b"[GNUPG:] GOODSIG 1234 test".to_vec()]);
        buf.finish().unwrap();
    }

    #[test]
    fn test_multiple_lines_one_fragment() {
        let mut buf = LineBuffer::new(ErrorSource::Gpg);
        buf.feed(b"one\ntwo\nthree\n").unwrap();
        assert_eq!(
            collect_lines(&mut buf),
            vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
    }

    #[test]
    fn test_attic_carryover() {
        let mut buf = LineBuffer::new(ErrorSource::Gpg);
        buf.feed(b"first part").unwrap();
        buf.feed(b" continues\nsecond").unwrap();
        assert_eq!(collect_lines(&mut buf), vec![b"first part continues".to_vec()]);
        buf.feed(b"\n").unwrap();
        assert_eq!(collect_lines(&mut buf), vec![b"second".to_vec()]);
        buf.finish().unwrap();
    }

    #[test]
    fn test_crlf_stripped() {
        let mut buf = LineBuffer::new(ErrorSource::Assuan);
        buf.feed(b"OK ready\r\n").unwrap();
        assert_eq!(collect_lines(&mut buf), vec![b"OK ready".to_vec()]);
    }

    #[test]
    fn test_embedded_nul_preserved() {
        let mut buf = LineBuffer::new(ErrorSource::Gpg);
        buf.feed(b"a\x00b\n").unwrap();
        assert_eq!(collect_lines(&mut buf), vec![b"a\x00b".to_vec()]);
    }

    #[test]
    fn test_line_too_long() {
        let mut buf = LineBuffer::new(ErrorSource::Gpg);
        let long = vec![b'x'; LINELENGTH];
        let err = buf.feed(&long).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LineTooLong);
    }

    #[test]
    fn test_line_at_limit_accepted() {
        let mut buf = LineBuffer::new(ErrorSource::Gpg);
        let mut line = vec![b'x'; LINELENGTH - 1];
        line.push(b'\n');
        buf.feed(&line).unwrap();
        assert_eq!(collect_lines(&mut buf).len(), 1);
    }

    #[test]
    fn test_unterminated_tail() {
        let mut buf = LineBuffer::new(ErrorSource::Gpg);
        buf.feed(b"complete\nincomplete").unwrap();
        let err = buf.finish().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LineNotTerminated);
    }

    #[test]
    fn test_continuation_reassembly() {
        let mut buf = LineBuffer::with_continuations(ErrorSource::Assuan);
        buf.feed(b"first half \\\nsecond half\n").unwrap();
        assert_eq!(collect_lines(&mut buf), vec![b"first half second half".to_vec()]);
    }

    #[test]
    fn test_plain_mode_keeps_backslash() {
        let mut buf = LineBuffer::new(ErrorSource::Gpg);
        buf.feed(b"literal \\\n").unwrap();
        assert_eq!(collect_lines(&mut buf), vec![b"literal \\".to_vec()]);
    }

    #[test]
    fn test_split_for_write_round_trip() {
        for len in [0usize, 1, 999, 1000, 1001, 2500, 5000] {
            let payload: Vec<u8> = (0..len).map(|i| b'a' + (i % 23) as u8).collect();
            let mut buf = LineBuffer::with_continuations(ErrorSource::Assuan);
            for line in split_for_write(&payload) {
                assert!(line.len() <= LINELENGTH, "wire line too long at len {len}");
                buf.feed(&line).unwrap();
            }
            let lines = {
                let mut out = Vec::new();
                let mut b = buf;
                while let Some(line) = b.next_line() {
                    out.push(line);
                }
                b.finish().unwrap();
                out
            };
            assert_eq!(lines.len(), 1, "payload of len {len} must reassemble whole");
            assert_eq!(lines[0], payload);
        }
    }

    // Fragmentation commutativity: any chunking of the same byte stream
    // yields the same delivered lines.
    #[test]
    fn test_chunking_invariance() {
        let mut stream = Vec::new();
        for i in 0..50 {
            stream.extend_from_slice(format!("line number {i} with some payload").as_bytes());
            stream.push(b'\n');
        }

        let mut reference = LineBuffer::new(ErrorSource::Gpg);
        reference.feed(&stream).unwrap();
        let expected = collect_lines(&mut reference);

        for _ in 0..100 {
            let mut buf = LineBuffer::new(ErrorSource::Gpg);
            let mut rest: &[u8] = &stream;
            while !rest.is_empty() {
                let take = 1 + fastrand::usize(0..rest.len());
                let (chunk, tail) = rest.split_at(take);
                buf.feed(chunk).unwrap();
                rest = tail;
            }
            assert_eq!(collect_lines(&mut buf), expected, "chunking changed the framing");
            buf.finish().unwrap();
        }
    }
}
