// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Assuan client: the request/response line dialogue spoken by the
//! CMS engine family.
//!
//! The client sends `COMMAND args\n`; the server answers with any
//! number of `S`/`D`/`INQUIRE` lines and terminates the exchange with
//! exactly one `OK` or `ERR <code>`. Connections run over a pipe pair
//! (spawned server) or a Unix-domain stream socket; only the socket
//! form can pass descriptors as ancillary data, the pipe form uses the
//! inline `FD=N` registration exclusively.

use std::os::fd::RawFd;
use std::path::Path;

use socket2::{Domain, SockAddr, Socket, Type};

use crate::error::{Error, ErrorKind, ErrorSource, Result};
use crate::io::{self, fdpass, posix};
use crate::protocol::line::{split_for_write, LineBuffer};

/// One server line, classified.
#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    /// Success terminator with optional text.
    Ok(String),
    /// Failure terminator.
    Err {
        /// Numeric error code as sent by the server.
        code: u32,
        /// Trailing human-readable text.
        text: String,
    },
    /// Status notification payload (`S <keyword> <args>` without `S `).
    Status(Vec<u8>),
    /// Raw data fragment, percent escapes still applied.
    Data(Vec<u8>),
    /// Server-initiated inquiry for `keyword`.
    Inquire(String),
    /// Comment line, ignored by protocol rules.
    Comment,
}

/// Classify one complete, continuation-joined line.
pub fn parse_response(line: &[u8]) -> Result<Response> {
    if line.is_empty() || line[0] == b'#' {
        return Ok(Response::Comment);
    }
    if line == b"OK" || line.starts_with(b"OK ") {
        let text = String::from_utf8_lossy(line.get(3..).unwrap_or(b"")).into_owned();
        return Ok(Response::Ok(text));
    }
    if line.starts_with(b"ERR ") {
        let rest = String::from_utf8_lossy(&line[4..]).into_owned();
        let mut fields = rest.splitn(2, ' ');
        let code = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                Error::new(ErrorSource::Assuan, ErrorKind::InvalidResponse)
                    .with_detail("unparsable ERR code")
            })?;
        return Ok(Response::Err {
            code,
            text: fields.next().unwrap_or("").to_string(),
        });
    }
    if line.starts_with(b"S ") {
        return Ok(Response::Status(line[2..].to_vec()));
    }
    if line.starts_with(b"D ") {
        return Ok(Response::Data(line[2..].to_vec()));
    }
    if line.starts_with(b"INQUIRE ") {
        return Ok(Response::Inquire(
            String::from_utf8_lossy(&line[8..]).into_owned(),
        ));
    }
    Err(Error::new(ErrorSource::Assuan, ErrorKind::InvalidResponse)
        .with_detail(format!("unrecognized line: {}", String::from_utf8_lossy(line))))
}

/// Map a numeric `ERR` code into the unified taxonomy.
///
/// Servers emit either the legacy Assuan numbering or the newer packed
/// form with a source in the upper bits; both are handled, unknown
/// codes collapse to a generic Assuan failure.
#[must_use]
pub fn map_assuan_error(code: u32) -> Error {
    let err = |kind| Error::new(ErrorSource::Assuan, kind);
    if code >= 1 << 24 {
        // Packed form: the low 16 bits carry the error proper.
        return match code & 0xffff {
            9 => err(ErrorKind::NoPublicKey),
            11 => err(ErrorKind::BadPassphrase),
            17 => err(ErrorKind::UnusableSecretKey),
            94 => err(ErrorKind::CertRevoked),
            96 => err(ErrorKind::NoCrl),
            97 => err(ErrorKind::CrlTooOld),
            99 => err(ErrorKind::Canceled),
            125 => err(ErrorKind::WrongKeyUsage),
            _ => err(ErrorKind::General),
        };
    }
    match code {
        1 => err(ErrorKind::General),
        2 => err(ErrorKind::OutOfCore),
        3 => err(ErrorKind::InvalidValue),
        4 => err(ErrorKind::Timeout),
        5 => err(ErrorKind::ReadError),
        6 => err(ErrorKind::WriteError),
        11 => err(ErrorKind::InvalidResponse),
        14 => err(ErrorKind::ConnectFailed),
        15 => err(ErrorKind::AcceptFailed),
        100 => err(ErrorKind::NotImplemented),
        107 => err(ErrorKind::LineTooLong),
        108 => err(ErrorKind::LineNotTerminated),
        111 => err(ErrorKind::Canceled),
        207 => err(ErrorKind::NoPublicKey),
        208 => err(ErrorKind::UnusableSecretKey),
        _ => err(ErrorKind::General),
    }
}

/// A connected Assuan channel.
pub struct Client {
    /// Server-to-client direction.
    read_fd: RawFd,
    /// Client-to-server direction (same fd for sockets).
    write_fd: RawFd,
    /// Framing for the blocking helpers.
    lines: LineBuffer,
    /// Whether ancillary fd passing is available.
    socket: bool,
    /// The spawned server, for pipe connections.
    child: Option<posix::SpawnedEngine>,
}

impl Client {
    /// Spawn `path` with `argv` and talk Assuan over its stdin/stdout.
    ///
    /// `inherit_fds` are left open in the child at their current
    /// numbers (pre-registered INPUT/OUTPUT/MESSAGE descriptors).
    pub fn pipe_connect(
        path: &Path,
        argv: &[std::ffi::OsString],
        inherit_fds: &[RawFd],
    ) -> Result<Self> {
        // Our write end feeds the server's stdin and vice versa.
        let (their_stdin_r, our_w) = posix::pipe()?;
        let (our_r, their_stdout_w) = posix::pipe()?;

        let mut table = vec![
            posix::FdAssignment {
                child_end: their_stdin_r.raw(),
                dup_to: Some(0),
            },
            posix::FdAssignment {
                child_end: their_stdout_w.raw(),
                dup_to: Some(1),
            },
        ];
        for &fd in inherit_fds {
            table.push(posix::FdAssignment {
                child_end: fd,
                dup_to: None,
            });
        }

        let child = posix::spawn(path, argv, &table)?;
        drop(their_stdin_r);
        drop(their_stdout_w);

        let read_fd = our_r.into_raw();
        let write_fd = our_w.into_raw();
        posix::set_cloexec(read_fd)?;
        posix::set_cloexec(write_fd)?;

        let mut client = Self {
            read_fd,
            write_fd,
            lines: LineBuffer::with_continuations(ErrorSource::Assuan),
            socket: false,
            child: Some(child),
        };
        client.read_greeting()?;
        Ok(client)
    }

    /// Connect to a server listening on a Unix-domain socket.
    pub fn socket_connect(socket_path: &Path) -> Result<Self> {
        let socket = Socket::new(Domain::UNIX, Type::STREAM, None).map_err(|err| {
            Error::new(ErrorSource::Assuan, ErrorKind::ConnectFailed)
                .with_detail(err.to_string())
        })?;
        let addr = SockAddr::unix(socket_path).map_err(|err| {
            Error::new(ErrorSource::Assuan, ErrorKind::ConnectFailed)
                .with_detail(err.to_string())
        })?;
        socket.connect(&addr).map_err(|err| {
            Error::new(ErrorSource::Assuan, ErrorKind::ConnectFailed)
                .with_detail(format!("{}: {err}", socket_path.display()))
        })?;

        use std::os::fd::IntoRawFd as _;
        let fd = socket.into_raw_fd();
        let mut client = Self {
            read_fd: fd,
            write_fd: fd,
            lines: LineBuffer::with_continuations(ErrorSource::Assuan),
            socket: true,
            child: None,
        };
        client.read_greeting()?;
        Ok(client)
    }

    fn read_greeting(&mut self) -> Result<()> {
        match parse_response(&self.read_line_blocking()?)? {
            Response::Ok(_) => Ok(()),
            other => Err(Error::new(ErrorSource::Assuan, ErrorKind::InvalidResponse)
                .with_detail(format!("expected greeting, got {other:?}"))),
        }
    }

    /// The descriptor carrying server responses, for wait-core
    /// registration during an operation.
    #[must_use]
    pub fn response_fd(&self) -> RawFd {
        self.read_fd
    }

    /// Whether ancillary descriptor passing is available.
    #[must_use]
    pub fn can_pass_fds(&self) -> bool {
        self.socket
    }

    /// Ship a descriptor as ancillary data (socket connections only).
    pub fn send_descriptor(&self, fd: RawFd) -> Result<()> {
        if !self.socket {
            return Err(Error::new(ErrorSource::Assuan, ErrorKind::NotImplemented)
                .with_detail("fd passing needs a socket connection"));
        }
        fdpass::send_fd(self.write_fd, fd)
    }

    /// Send one command line, splitting over-long payloads.
    pub fn write_line(&self, payload: &[u8]) -> Result<()> {
        for wire in split_for_write(payload) {
            posix::write_all_blocking(self.write_fd, &wire)?;
        }
        Ok(())
    }

    /// Blocking read of the next complete (joined) line.
    pub fn read_line_blocking(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(line) = self.lines.next_line() {
                return Ok(line);
            }
            let mut pfd = libc::pollfd {
                fd: self.read_fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let rc = unsafe { libc::poll(&mut pfd, 1, -1) };
            if rc == -1 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(Error::new(ErrorSource::Assuan, ErrorKind::ReadError)
                    .with_detail(err.to_string()));
            }
            let mut buf = [0u8; 1024];
            match posix::read_nonblock(self.read_fd, &mut buf)? {
                Some(0) => {
                    self.lines.finish()?;
                    return Err(Error::new(ErrorSource::Assuan, ErrorKind::ReadError)
                        .with_detail("server closed the channel"));
                }
                Some(n) => self.lines.feed(&buf[..n])?,
                None => {}
            }
        }
    }

    /// Feed externally-read bytes into the response framer and drain
    /// complete lines (non-blocking operation phase).
    pub fn feed(&mut self, fragment: &[u8]) -> Result<()> {
        self.lines.feed(fragment)
    }

    /// Next already-framed response line, if any.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        self.lines.next_line()
    }

    /// Check stream-end framing.
    pub fn finish_stream(&self) -> Result<()> {
        self.lines.finish()
    }

    /// Issue a simple command and consume everything up to `OK`/`ERR`.
    ///
    /// Status and data lines are handed to `sink` when supplied; an
    /// `INQUIRE` is answered with `END` (this client never volunteers
    /// inquiry data on the control channel).
    pub fn transact(
        &mut self,
        command: &str,
        mut sink: Option<&mut dyn FnMut(&Response) -> Result<()>>,
    ) -> Result<()> {
        log::trace!("[assuan::Client::transact] -> {command}");
        self.write_line(command.as_bytes())?;
        loop {
            let line = self.read_line_blocking()?;
            match parse_response(&line)? {
                Response::Ok(_) => return Ok(()),
                Response::Err { code, text } => {
                    let err = map_assuan_error(code);
                    log::debug!(
                        "[assuan::Client::transact] {command} failed: {code} {text}"
                    );
                    return Err(err);
                }
                Response::Inquire(_) => self.write_line(b"END")?,
                Response::Comment => {}
                other => {
                    if let Some(sink) = sink.as_mut() {
                        sink(&other)?;
                    }
                }
            }
        }
    }

    /// Close the channel and reap a spawned server.
    pub fn shutdown(&mut self) {
        if self.read_fd >= 0 {
            io::close_fd(self.read_fd);
        }
        if self.write_fd >= 0 && self.write_fd != self.read_fd {
            io::close_fd(self.write_fd);
        }
        self.read_fd = -1;
        self.write_fd = -1;
        if let Some(mut child) = self.child.take() {
            child.kill();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}
