// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Close-notify registry.
//!
//! Subsystems owning a registration keyed by descriptor (the wait core,
//! the engines' coupled-pipe bookkeeping) register a handler here; when
//! the descriptor is closed through [`crate::io::close_fd`], the
//! handler runs exactly once and the entry is released. Re-registering
//! a descriptor replaces the previous handler without running it.

use std::os::fd::RawFd;
use std::sync::Mutex;

use dashmap::DashMap;
use std::sync::OnceLock;

/// Handler fired when the descriptor closes.
pub type CloseHandler = Box<dyn FnOnce(RawFd) + Send>;

fn registry() -> &'static DashMap<RawFd, Mutex<CloseHandler>> {
    static REGISTRY: OnceLock<DashMap<RawFd, Mutex<CloseHandler>>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

/// Install (or replace) the close handler for `fd`.
pub fn set_close_notify(fd: RawFd, handler: CloseHandler) {
    registry().insert(fd, Mutex::new(handler));
}

/// Detach and return the handler for `fd` without running it.
pub fn take_close_notify(fd: RawFd) -> Option<CloseHandler> {
    registry().remove(&fd).map(|(_, handler)| handler.into_inner().unwrap())
}

/// Run and release the handler for `fd`, if any.
///
/// Called by [`crate::io::close_fd`] before the kernel close so the
/// handler still sees a valid descriptor number.
pub(crate) fn fire(fd: RawFd) {
    if let Some((_, handler)) = registry().remove(&fd) {
        (handler.into_inner().unwrap())(fd);
    }
}
