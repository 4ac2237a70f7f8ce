// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The wait core: readiness multiplexing for every descriptor the
//! engine drivers register.
//!
//! Three event-loop modes exist, selectable per context:
//!
//! 1. *Private loop* - the context owns a [`Reactor`] and pumps it to
//!    completion inside the synchronous entry points.
//! 2. *Global loop* - [`global::wait_any`] pumps a caller-supplied set
//!    of contexts and reports the next one whose operation finished,
//!    buffered through an idempotent done-queue.
//! 3. *External loop* - the caller implements [`EventLoop`] and drives
//!    readiness itself; the runtime only hands out [`IoHandle`]s.
//!
//! Handlers run on whichever thread pumps the loop; a context is
//! pumped by at most one thread at a time.

/// Registration front used by the engine drivers.
pub(crate) mod dispatch;
/// Process-wide done-queue for `wait_any`.
pub mod global;
/// Readiness reactor over `mio::Poll`.
pub mod reactor;

use std::os::fd::RawFd;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::keys::{KeyRef, TrustItemRef};

/// Transfer direction of a registered descriptor, seen from this
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Readable: engine output flows in.
    In,
    /// Writable: caller data flows out.
    Out,
}

/// What a handler wants done with its registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerFlow {
    /// Keep the registration.
    Continue,
    /// Deregister; the descriptor is finished.
    Remove,
}

/// An I/O readiness handler. Runs whenever its descriptor signals.
pub type IoHandler = Box<dyn FnMut(RawFd) -> Result<HandlerFlow> + Send>;

/// Events the drivers emit through the wait core.
#[derive(Debug)]
pub enum WaitEvent {
    /// First status byte has been exchanged with the engine.
    Start,
    /// The operation terminated, possibly with an error.
    Done(Option<Error>),
    /// A streaming key listing produced the next key.
    NextKey(KeyRef),
    /// A streaming trust listing produced the next item.
    NextTrustItem(TrustItemRef),
}

/// Tag the caller's event loop returned from `add`; stored verbatim
/// and handed back on `remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalTag(pub u64);

/// A runnable handle on one registered descriptor, for external loops.
///
/// The caller invokes [`IoHandle::run`] when its own readiness
/// mechanism reports the descriptor; `Ok(HandlerFlow::Remove)` means
/// the registration is finished and `remove` will follow.
#[derive(Clone)]
pub struct IoHandle {
    fd: RawFd,
    handler: Arc<Mutex<IoHandler>>,
}

impl IoHandle {
    pub(crate) fn new(fd: RawFd, handler: IoHandler) -> Self {
        Self {
            fd,
            handler: Arc::new(Mutex::new(handler)),
        }
    }

    /// The descriptor this handle serves.
    #[must_use]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Run the handler once.
    pub fn run(&self) -> Result<HandlerFlow> {
        (self.handler.lock())(self.fd)
    }
}

impl std::fmt::Debug for IoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoHandle").field("fd", &self.fd).finish()
    }
}

/// Caller-supplied event loop (external mode).
pub trait EventLoop: Send {
    /// Register interest in `fd`/`dir`; the returned tag is stored
    /// verbatim and handed back on [`EventLoop::remove`].
    fn add(&mut self, fd: RawFd, dir: Direction, handle: IoHandle) -> Result<ExternalTag>;
    /// Drop the registration behind `tag`.
    fn remove(&mut self, tag: ExternalTag);
    /// Receive an operation event.
    fn event(&mut self, event: WaitEvent);
}

pub use reactor::{Reactor, RegTag};
