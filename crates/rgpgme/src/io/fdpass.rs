// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Descriptor passing over Unix-domain sockets.
//!
//! The Assuan driver pre-registers INPUT/OUTPUT/MESSAGE descriptors by
//! shipping the fd itself as `SCM_RIGHTS` ancillary data, one fd per
//! message, with a single marker byte as payload. Platforms without
//! ancillary data never reach this module; the driver falls back to
//! the inline `FD=N` form there.

use std::mem;
use std::os::fd::RawFd;

use crate::error::{Error, ErrorKind, ErrorSource, Result};

/// Marker payload byte accompanying a passed descriptor.
const FD_MARKER: u8 = 0;

/// Send `fd` over the connected Unix-domain socket `sock`.
pub fn send_fd(sock: RawFd, fd: RawFd) -> Result<()> {
    // One cmsg carrying exactly one descriptor.
    let mut payload = [FD_MARKER];
    let mut iov = libc::iovec {
        iov_base: payload.as_mut_ptr().cast(),
        iov_len: payload.len(),
    };

    let space = unsafe { libc::CMSG_SPACE(mem::size_of::<RawFd>() as u32) } as usize;
    let mut cmsg_buf = vec![0u8; space];

    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.as_mut_ptr().cast();
    msg.msg_controllen = space as _;

    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(mem::size_of::<RawFd>() as u32) as _;
        std::ptr::write_unaligned(libc::CMSG_DATA(cmsg).cast::<RawFd>(), fd);
    }

    loop {
        let n = unsafe { libc::sendmsg(sock, &msg, 0) };
        if n >= 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(Error::new(ErrorSource::Assuan, ErrorKind::WriteError)
            .with_detail(format!("sendmsg: {err}")));
    }
}

/// Receive one descriptor from the connected socket `sock`.
pub fn receive_fd(sock: RawFd) -> Result<RawFd> {
    let mut payload = [0u8; 1];
    let mut iov = libc::iovec {
        iov_base: payload.as_mut_ptr().cast(),
        iov_len: payload.len(),
    };

    let space = unsafe { libc::CMSG_SPACE(mem::size_of::<RawFd>() as u32) } as usize;
    let mut cmsg_buf = vec![0u8; space];

    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.as_mut_ptr().cast();
    msg.msg_controllen = space as _;

    loop {
        let n = unsafe { libc::recvmsg(sock, &mut msg, 0) };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(Error::new(ErrorSource::Assuan, ErrorKind::ReadError)
                .with_detail(format!("recvmsg: {err}")));
        }
        break;
    }

    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        if cmsg.is_null()
            || (*cmsg).cmsg_level != libc::SOL_SOCKET
            || (*cmsg).cmsg_type != libc::SCM_RIGHTS
        {
            return Err(Error::new(ErrorSource::Assuan, ErrorKind::InvalidResponse)
                .with_detail("no descriptor in ancillary data"));
        }
        Ok(std::ptr::read_unaligned(
            libc::CMSG_DATA(cmsg).cast::<RawFd>(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::posix;

    fn socketpair() -> (RawFd, RawFd) {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe {
            libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr())
        };
        assert_eq!(rc, 0, "socketpair failed");
        (fds[0], fds[1])
    }

    #[test]
    fn test_fd_round_trip() {
        let (left, right) = socketpair();
        let (pipe_r, pipe_w) = posix::pipe().unwrap();

        send_fd(left, pipe_w.raw()).unwrap();
        let received = receive_fd(right).unwrap();
        assert!(received >= 0);

        // The received descriptor must alias the pipe's write end.
        assert_eq!(
            posix::write_nonblock(received, b"via passed fd").unwrap(),
            Some(13)
        );
        let mut buf = [0u8; 32];
        posix::set_nonblocking(pipe_r.raw()).unwrap();
        assert_eq!(
            posix::read_nonblock(pipe_r.raw(), &mut buf).unwrap(),
            Some(13)
        );
        assert_eq!(&buf[..13], b"via passed fd");

        posix::close_fd(received);
        posix::close_fd(left);
        posix::close_fd(right);
    }
}
