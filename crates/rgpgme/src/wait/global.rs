// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Done-queue backing `wait_any`.
//!
//! Every context carries a process-unique id. When an operation
//! terminates, the engine dispatch pushes the id here; `wait_any`
//! (in `context.rs`) pumps its contexts round-robin and pops
//! completions from this queue, so a completion observed once is never
//! lost even when several contexts finish in the same poll round.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

static DONE_QUEUE: Mutex<VecDeque<u64>> = Mutex::new(VecDeque::new());
static NEXT_CTX_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique context id.
pub(crate) fn next_ctx_id() -> u64 {
    NEXT_CTX_ID.fetch_add(1, Ordering::Relaxed)
}

/// Record that the context with `id` completed an operation.
pub(crate) fn push_done(id: u64) {
    let mut queue = DONE_QUEUE.lock();
    // A context finishes one operation at a time; duplicates would
    // only arise from a restart, which drains its own entry first.
    if !queue.contains(&id) {
        queue.push_back(id);
    }
}

/// Pop the oldest completion that matches one of `ids`.
///
/// Completions for contexts not in `ids` are left queued for whoever
/// waits on them.
pub(crate) fn pop_done_among(ids: &[u64]) -> Option<u64> {
    let mut queue = DONE_QUEUE.lock();
    let pos = queue.iter().position(|id| ids.contains(id))?;
    queue.remove(pos)
}

/// Drop any queued completion for `id` (context reset or release).
pub(crate) fn forget(id: u64) {
    let mut queue = DONE_QUEUE.lock();
    queue.retain(|&queued| queued != id);
}
