// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide fingerprint-to-key cache.
//!
//! Key listings are expensive engine round trips; the cache lets a
//! fingerprint lookup reuse the last listed key. Bounded LRU: an
//! insert past capacity evicts the stalest entry, which only drops the
//! cache's own strong reference. Callers keep theirs.

use std::num::NonZeroUsize;
use std::sync::OnceLock;

use lru::LruCache;
use parking_lot::Mutex;

use crate::keys::KeyRef;

/// Bound on cached fingerprints (primary and subkeys each count).
const KEY_CACHE_CAPACITY: usize = 1024;

fn cache() -> &'static Mutex<LruCache<String, KeyRef>> {
    static CACHE: OnceLock<Mutex<LruCache<String, KeyRef>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        let capacity = NonZeroUsize::new(KEY_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Mutex::new(LruCache::new(capacity))
    })
}

/// Insert `key` under every subkey fingerprint it carries.
pub fn add(key: &KeyRef) {
    let mut cache = cache().lock();
    for subkey in &key.subkeys {
        if let Some(fpr) = &subkey.fingerprint {
            cache.put(fpr.clone(), key.clone());
        }
    }
}

/// Look up a key by any of its fingerprints.
#[must_use]
pub fn get(fingerprint: &str) -> Option<KeyRef> {
    cache().lock().get(fingerprint).cloned()
}

/// Forget everything (used by tests and homedir switches).
pub fn clear() {
    cache().lock().clear();
}
