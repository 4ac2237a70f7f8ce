// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Readiness reactor backing the private and global event loops.
//!
//! A thin table of `(fd, direction, handler)` registrations over
//! `mio::Poll` with raw-descriptor sources. Handlers run inline on the
//! pumping thread; a handler returning [`HandlerFlow::Remove`] or
//! failing is deregistered before `poll_once` returns. The reactor is
//! a cheap cloneable handle so close-notify hooks can detach
//! registrations whose descriptor disappeared.

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};
use crate::wait::{Direction, HandlerFlow, IoHandler};

/// Registration tag, unique per reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegTag(usize);

/// Maximum events drained per poll round.
const MAX_EVENTS: usize = 64;

struct Entry {
    fd: RawFd,
    dir: Direction,
    handler: Option<IoHandler>,
}

struct Inner {
    poll: Poll,
    entries: HashMap<usize, Entry>,
    next_token: usize,
}

/// Cloneable handle to one readiness table.
#[derive(Clone)]
pub struct Reactor {
    inner: Arc<Mutex<Inner>>,
}

impl Reactor {
    /// Fresh empty reactor.
    pub fn new() -> Result<Self> {
        let poll = Poll::new().map_err(|err| {
            Error::transport(ErrorKind::General).with_detail(format!("poll: {err}"))
        })?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                poll,
                entries: HashMap::new(),
                next_token: 0,
            })),
        })
    }

    /// Register `handler` for readiness of `fd` in `dir`.
    ///
    /// The descriptor must already be non-blocking.
    pub fn register(&self, fd: RawFd, dir: Direction, handler: IoHandler) -> Result<RegTag> {
        let mut inner = self.inner.lock();
        let token = inner.next_token;
        inner.next_token += 1;

        let interest = match dir {
            Direction::In => Interest::READABLE,
            Direction::Out => Interest::WRITABLE,
        };
        inner
            .poll
            .registry()
            .register(&mut SourceFd(&fd), Token(token), interest)
            .map_err(|err| {
                Error::transport(ErrorKind::General)
                    .with_detail(format!("register fd {fd}: {err}"))
            })?;
        inner.entries.insert(
            token,
            Entry {
                fd,
                dir,
                handler: Some(handler),
            },
        );
        log::trace!("[Reactor::register] fd={fd} dir={dir:?} tag={token}");
        Ok(RegTag(token))
    }

    /// Drop one registration.
    pub fn deregister(&self, tag: RegTag) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.remove(&tag.0) {
            let _ = inner.poll.registry().deregister(&mut SourceFd(&entry.fd));
            log::trace!("[Reactor::deregister] fd={} tag={}", entry.fd, tag.0);
        }
    }

    /// Drop every registration for `fd` (close-notify path).
    pub fn deregister_fd(&self, fd: RawFd) {
        let mut inner = self.inner.lock();
        let tokens: Vec<usize> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.fd == fd)
            .map(|(t, _)| *t)
            .collect();
        if tokens.is_empty() {
            return;
        }
        let _ = inner.poll.registry().deregister(&mut SourceFd(&fd));
        for token in tokens {
            inner.entries.remove(&token);
        }
        log::trace!("[Reactor::deregister_fd] fd={fd}");
    }

    /// True when no registrations remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Wait for readiness once and dispatch the ready handlers.
    ///
    /// Returns the number of handlers that ran. The first handler
    /// error aborts the round and is returned after its registration
    /// was removed; the caller turns it into the operation error.
    pub fn poll_once(&self, timeout: Option<Duration>) -> Result<usize> {
        let mut events = Events::with_capacity(MAX_EVENTS);
        {
            let mut inner = self.inner.lock();
            if inner.entries.is_empty() {
                return Ok(0);
            }
            match inner.poll.poll(&mut events, timeout) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => return Ok(0),
                Err(err) => {
                    return Err(Error::transport(ErrorKind::General)
                        .with_detail(format!("poll: {err}")));
                }
            }
        }

        let mut ran = 0;
        for event in events.iter() {
            let token = event.token().0;
            // Take the handler out so it may touch the reactor itself.
            let (fd, mut handler) = {
                let mut inner = self.inner.lock();
                match inner.entries.get_mut(&token) {
                    Some(entry) => match entry.handler.take() {
                        Some(handler) => (entry.fd, handler),
                        None => continue,
                    },
                    None => continue,
                }
            };

            ran += 1;
            let outcome = handler(fd);

            let mut inner = self.inner.lock();
            match outcome {
                Ok(HandlerFlow::Continue) => {
                    // Entry may have vanished if the handler closed its fd.
                    if let Some(entry) = inner.entries.get_mut(&token) {
                        entry.handler = Some(handler);
                    }
                }
                Ok(HandlerFlow::Remove) => {
                    if let Some(entry) = inner.entries.remove(&token) {
                        let _ = inner.poll.registry().deregister(&mut SourceFd(&entry.fd));
                    }
                }
                Err(err) => {
                    if let Some(entry) = inner.entries.remove(&token) {
                        let _ = inner.poll.registry().deregister(&mut SourceFd(&entry.fd));
                    }
                    log::debug!("[Reactor::poll_once] handler for fd {fd} failed: {err}");
                    return Err(err);
                }
            }
        }
        Ok(ran)
    }

    /// Remove everything; used by context teardown.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let fds: Vec<RawFd> = inner.entries.values().map(|e| e.fd).collect();
        for fd in fds {
            let _ = inner.poll.registry().deregister(&mut SourceFd(&fd));
        }
        inner.entries.clear();
    }

    /// Directions registered for `fd` (test and diagnostics helper).
    #[must_use]
    pub fn directions_for(&self, fd: RawFd) -> Vec<Direction> {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.fd == fd)
            .map(|e| e.dir)
            .collect()
    }
}
