// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registration front for the engine drivers.
//!
//! A driver never talks to a reactor or an external loop directly; it
//! hands `(fd, direction, handler)` triples to the context's
//! [`Dispatcher`], which routes them to the private reactor or to the
//! caller's [`EventLoop`] and wires the close-notify hook that detaches
//! the registration when the descriptor goes away.

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::io;
use crate::wait::{global, Direction, EventLoop, IoHandle, IoHandler, Reactor, WaitEvent};

/// Where a context's registrations go.
#[derive(Clone)]
pub(crate) enum LoopMode {
    /// The context's own reactor (private and global wait modes).
    Private(Reactor),
    /// A caller-supplied event loop.
    External(Arc<Mutex<Box<dyn EventLoop>>>),
}

/// Cloneable registration front handed to the engine drivers.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    mode: LoopMode,
    ctx_id: u64,
    external_tags: Arc<Mutex<HashMap<RawFd, super::ExternalTag>>>,
}

impl Dispatcher {
    pub fn new(mode: LoopMode, ctx_id: u64) -> Self {
        Self {
            mode,
            ctx_id,
            external_tags: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The private reactor, when one is in use.
    pub fn reactor(&self) -> Option<&Reactor> {
        match &self.mode {
            LoopMode::Private(reactor) => Some(reactor),
            LoopMode::External(_) => None,
        }
    }

    /// Register a handler and arrange for close-time detachment.
    ///
    /// The descriptor is switched to non-blocking mode first.
    pub fn register(&self, fd: RawFd, dir: Direction, handler: IoHandler) -> Result<()> {
        io::posix::set_nonblocking(fd)?;
        match &self.mode {
            LoopMode::Private(reactor) => {
                reactor.register(fd, dir, handler)?;
                let detach = reactor.clone();
                io::set_close_notify(fd, Box::new(move |fd| detach.deregister_fd(fd)));
            }
            LoopMode::External(event_loop) => {
                let handle = IoHandle::new(fd, handler);
                let tag = event_loop.lock().add(fd, dir, handle)?;
                self.external_tags.lock().insert(fd, tag);
                let tags = self.external_tags.clone();
                let detach = event_loop.clone();
                io::set_close_notify(
                    fd,
                    Box::new(move |fd| {
                        if let Some(tag) = tags.lock().remove(&fd) {
                            detach.lock().remove(tag);
                        }
                    }),
                );
            }
        }
        Ok(())
    }

    /// Forward a driver event to an external loop (no-op otherwise;
    /// private-loop callers read the queues directly).
    pub fn emit(&self, event: WaitEvent) {
        if let LoopMode::External(event_loop) = &self.mode {
            event_loop.lock().event(event);
        }
    }

    /// Record operation completion: done-queue entry plus `Done` event.
    pub fn finish(&self, err: Option<Error>) {
        global::push_done(self.ctx_id);
        self.emit(WaitEvent::Done(err));
    }
}
