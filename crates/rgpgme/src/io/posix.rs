// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pipes, non-blocking descriptor I/O, and engine spawning.
//!
//! Every descriptor handed to the wait core is switched to
//! non-blocking mode; short reads and writes are the normal case and
//! `Ok(None)` reports a would-block condition. Engine children are
//! spawned with `std::process::Command` plus a pre-exec action that
//! installs the dup2 table and closes everything else, so the child
//! sees exactly the descriptors named on its command line.

use std::ffi::OsString;
use std::os::fd::RawFd;
use std::os::unix::process::CommandExt as _;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::error::{Error, ErrorKind, Result};
use crate::io::notify;

/// Owner of one raw descriptor.
///
/// Dropping (or [`Fd::close`]) routes through the close-notify
/// registry before the kernel close, so registered cleanup runs
/// exactly once.
#[derive(Debug)]
pub struct Fd {
    raw: RawFd,
}

impl Fd {
    /// Wrap an already-open descriptor.
    #[must_use]
    pub fn from_raw(raw: RawFd) -> Self {
        Self { raw }
    }

    /// The descriptor number.
    #[must_use]
    pub fn raw(&self) -> RawFd {
        self.raw
    }

    /// Give up ownership without closing.
    #[must_use]
    pub fn into_raw(mut self) -> RawFd {
        let raw = self.raw;
        self.raw = -1;
        raw
    }

    /// Close now, firing any close-notify handler.
    pub fn close(mut self) {
        let raw = self.raw;
        self.raw = -1;
        if raw >= 0 {
            close_fd(raw);
        }
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        if self.raw >= 0 {
            close_fd(self.raw);
        }
    }
}

/// Fire the close-notify handler for `fd`, then close it.
pub fn close_fd(fd: RawFd) {
    notify::fire(fd);
    // EBADF here would mean a double close; nothing useful to report.
    unsafe {
        libc::close(fd);
    }
}

/// Create a pipe. Returns `(read_end, write_end)`.
///
/// Neither end carries CLOEXEC; the spawn path closes everything the
/// child must not inherit, and [`set_cloexec`] protects parent ends
/// from unrelated spawns.
pub fn pipe() -> Result<(Fd, Fd)> {
    let mut fds = [0 as RawFd; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(Error::transport(ErrorKind::PipeError)
            .with_detail(std::io::Error::last_os_error().to_string()));
    }
    Ok((Fd::from_raw(fds[0]), Fd::from_raw(fds[1])))
}

/// Mark `fd` close-on-exec (parent-retained pipe ends).
pub fn set_cloexec(fd: RawFd) -> Result<()> {
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
    if rc == -1 {
        return Err(Error::transport(ErrorKind::General)
            .with_detail(std::io::Error::last_os_error().to_string()));
    }
    Ok(())
}

/// Switch `fd` to non-blocking mode.
pub fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(Error::transport(ErrorKind::General)
            .with_detail(std::io::Error::last_os_error().to_string()));
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc == -1 {
        return Err(Error::transport(ErrorKind::General)
            .with_detail(std::io::Error::last_os_error().to_string()));
    }
    Ok(())
}

/// Non-blocking read. `Ok(None)` = would block, `Ok(Some(0))` = EOF.
pub fn read_nonblock(fd: RawFd, buf: &mut [u8]) -> Result<Option<usize>> {
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n >= 0 {
            return Ok(Some(n as usize));
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EAGAIN) => return Ok(None),
            _ => {
                return Err(Error::transport(ErrorKind::ReadError).with_detail(err.to_string()));
            }
        }
    }
}

/// Non-blocking write. `Ok(None)` = would block.
pub fn write_nonblock(fd: RawFd, buf: &[u8]) -> Result<Option<usize>> {
    loop {
        let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        if n >= 0 {
            return Ok(Some(n as usize));
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EAGAIN) => return Ok(None),
            _ => {
                return Err(Error::transport(ErrorKind::WriteError).with_detail(err.to_string()));
            }
        }
    }
}

/// Blocking write of the whole buffer (command-channel flushes).
pub fn write_all_blocking(fd: RawFd, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        match write_nonblock(fd, buf)? {
            Some(0) => {
                return Err(Error::transport(ErrorKind::WriteError)
                    .with_detail("descriptor closed mid-write"));
            }
            Some(n) => buf = &buf[n..],
            None => {
                // The peer has not drained yet; wait for writability.
                let mut pfd = libc::pollfd {
                    fd,
                    events: libc::POLLOUT,
                    revents: 0,
                };
                let rc = unsafe { libc::poll(&mut pfd, 1, -1) };
                if rc == -1 {
                    let err = std::io::Error::last_os_error();
                    if err.raw_os_error() == Some(libc::EINTR) {
                        continue;
                    }
                    return Err(
                        Error::transport(ErrorKind::WriteError).with_detail(err.to_string())
                    );
                }
            }
        }
    }
    Ok(())
}

/// One descriptor the child inherits.
#[derive(Debug)]
pub struct FdAssignment {
    /// The child's end of the pipe.
    pub child_end: RawFd,
    /// Where the child must see it; `None` keeps the number as-is
    /// (referenced on the command line).
    pub dup_to: Option<RawFd>,
}

/// A spawned engine child plus its reaping state.
#[derive(Debug)]
pub struct SpawnedEngine {
    child: Child,
    reaped: bool,
}

impl SpawnedEngine {
    /// Process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Reap the child. With `hang`, blocks until it exits; otherwise
    /// returns `Ok(false)` while it is still running.
    pub fn wait(&mut self, hang: bool) -> Result<bool> {
        if self.reaped {
            return Ok(true);
        }
        if hang {
            self.child.wait().map_err(Error::from)?;
            self.reaped = true;
            Ok(true)
        } else {
            match self.child.try_wait().map_err(Error::from)? {
                Some(_) => {
                    self.reaped = true;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    /// Kill then reap; used by cancellation and teardown.
    pub fn kill(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            if self.child.wait().is_ok() {
                self.reaped = true;
            }
        }
    }
}

impl Drop for SpawnedEngine {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Spawn an engine executable with an explicit descriptor table.
///
/// The pre-exec action runs the dup2 table, then closes every
/// descriptor above stderr that the table does not name. Stdin and
/// stdout entries (dup_to 0/1) are wired through the table as well;
/// unassigned stdin/stdout default to the null device and stderr is
/// inherited.
pub fn spawn(path: &Path, argv: &[OsString], table: &[FdAssignment]) -> Result<SpawnedEngine> {
    let mut cmd = Command::new(path);
    cmd.args(argv);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::inherit());

    let plan: Vec<(RawFd, RawFd)> = table
        .iter()
        .map(|a| (a.child_end, a.dup_to.unwrap_or(a.child_end)))
        .collect();

    unsafe {
        cmd.pre_exec(move || {
            // Runs in the forked child: only async-signal-safe calls.
            let mut keep = [false; 4096];
            keep[0] = true;
            keep[1] = true;
            keep[2] = true;
            for &(src, target) in &plan {
                if src == target {
                    // Inherit at the same number; drop CLOEXEC if set.
                    libc::fcntl(src, libc::F_SETFD, 0);
                } else {
                    if libc::dup2(src, target) == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                }
                if (target as usize) < keep.len() {
                    keep[target as usize] = true;
                }
            }
            let max = {
                let n = libc::sysconf(libc::_SC_OPEN_MAX);
                if n <= 0 {
                    1024
                } else {
                    (n as usize).min(keep.len())
                }
            };
            for fd in 3..max {
                if !keep[fd] {
                    libc::close(fd as RawFd);
                }
            }
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(|err| {
        Error::transport(ErrorKind::ExecError)
            .with_detail(format!("{}: {err}", path.display()))
    })?;
    log::debug!(
        "[posix::spawn] started {} pid={} fds={}",
        path.display(),
        child.id(),
        table.len()
    );
    Ok(SpawnedEngine {
        child,
        reaped: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_round_trip() {
        let (r, w) = pipe().unwrap();
        set_nonblocking(r.raw()).unwrap();
        set_nonblocking(w.raw()).unwrap();

        assert_eq!(write_nonblock(w.raw(), b"ping").unwrap(), Some(4));
        let mut buf = [0u8; 16];
        assert_eq!(read_nonblock(r.raw(), &mut buf).unwrap(), Some(4));
        assert_eq!(&buf[..4], b"ping");
    }

    #[test]
    fn test_empty_pipe_would_block() {
        let (r, _w) = pipe().unwrap();
        set_nonblocking(r.raw()).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(read_nonblock(r.raw(), &mut buf).unwrap(), None);
    }

    #[test]
    fn test_closed_writer_reads_eof() {
        let (r, w) = pipe().unwrap();
        set_nonblocking(r.raw()).unwrap();
        w.close();
        let mut buf = [0u8; 4];
        assert_eq!(read_nonblock(r.raw(), &mut buf).unwrap(), Some(0));
    }

    #[test]
    fn test_close_fires_notify() {
        let fired = std::sync::Arc::new(parking_lot::Mutex::new(false));
        let flag = fired.clone();
        let (r, _w) = pipe().unwrap();
        crate::io::set_close_notify(r.raw(), Box::new(move |_| *flag.lock() = true));
        r.close();
        assert!(*fired.lock(), "close must fire the notify handler");
    }

    #[test]
    fn test_into_raw_detaches_ownership() {
        let (r, _w) = pipe().unwrap();
        let raw = r.into_raw();
        // Still open; close manually.
        let mut buf = [0u8; 1];
        set_nonblocking(raw).unwrap();
        assert_eq!(read_nonblock(raw, &mut buf).unwrap(), None);
        close_fd(raw);
    }
}
