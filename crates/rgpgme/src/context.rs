// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The context: configuration, operation lifecycle and wait entry
//! points.
//!
//! A context owns at most one running operation. Synchronous entry
//! points (`op_encrypt`, `op_verify`, ...) start the operation and
//! pump the private event loop to completion; the `_start` variants
//! return immediately and completion is collected through
//! [`Context::wait`], [`wait_any`] or a caller-supplied external loop.
//!
//! A context may be moved between threads, but must only be pumped by
//! one thread at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config;
use crate::data::Data;
use crate::engine::{self, keylist_mode, Engine, EngineHandles, OpOptions};
use crate::error::{Error, ErrorKind, Result};
use crate::keys::{cache, Key, KeyRef, TrustItemRef};
use crate::ops::results::SigMode;
use crate::ops::{
    DecryptResult, EncryptResult, EditCb, GenkeyResult, ImportResult, KeylistResult, OpHost,
    OpKind, PassphraseCb, ProgressCb, SharedCallbacks, SignResult, VerifyResult,
};
use crate::wait::dispatch::{Dispatcher, LoopMode};
use crate::wait::{global, EventLoop, Reactor};
use crate::Protocol;

/// Poll slice used when pumping with a deadline or in `wait_any`.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// One engine conversation: configuration plus operation state.
pub struct Context {
    id: u64,
    protocol: Protocol,
    armor: bool,
    textmode: bool,
    include_certs: i32,
    keylist_mode: u32,
    signers: Vec<KeyRef>,
    cbs: SharedCallbacks,
    reactor: Reactor,
    external: Option<Arc<Mutex<Box<dyn EventLoop>>>>,
    engine: Option<Box<dyn Engine>>,
    host: Option<Arc<Mutex<OpHost>>>,
    pending: bool,
    cancel_flag: Arc<AtomicBool>,
    last_error: Option<Error>,
    last_op_info: Option<String>,
}

impl Context {
    /// Fresh context with the documented defaults.
    pub fn new() -> Result<Self> {
        Ok(Self {
            id: global::next_ctx_id(),
            protocol: Protocol::OpenPgp,
            armor: false,
            textmode: false,
            include_certs: 1,
            keylist_mode: keylist_mode::LOCAL,
            signers: Vec::new(),
            cbs: SharedCallbacks::default(),
            reactor: Reactor::new()?,
            external: None,
            engine: None,
            host: None,
            pending: false,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            last_error: None,
            last_op_info: None,
        })
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Select the engine family used by subsequent operations.
    pub fn set_protocol(&mut self, protocol: Protocol) -> Result<()> {
        if self.pending {
            return Err(Error::core(ErrorKind::InvalidValue)
                .with_detail("operation pending"));
        }
        self.protocol = protocol;
        Ok(())
    }

    /// Currently selected protocol.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Request armored output.
    pub fn set_armor(&mut self, yes: bool) {
        self.armor = yes;
    }

    /// Whether armored output is requested.
    #[must_use]
    pub fn armor(&self) -> bool {
        self.armor
    }

    /// Request canonical text mode.
    pub fn set_textmode(&mut self, yes: bool) {
        self.textmode = yes;
    }

    /// Whether canonical text mode is requested.
    #[must_use]
    pub fn textmode(&self) -> bool {
        self.textmode
    }

    /// Number of certificates to include in CMS messages.
    pub fn set_include_certs(&mut self, count: i32) {
        self.include_certs = count;
    }

    /// Current include-certs count.
    #[must_use]
    pub fn include_certs(&self) -> i32 {
        self.include_certs
    }

    /// Set the keylist mode bits (see [`engine::keylist_mode`]).
    pub fn set_keylist_mode(&mut self, mode: u32) -> Result<()> {
        if mode == 0 {
            return Err(Error::core(ErrorKind::InvalidValue));
        }
        self.keylist_mode = mode;
        Ok(())
    }

    /// Current keylist mode bits.
    #[must_use]
    pub fn keylist_mode(&self) -> u32 {
        self.keylist_mode
    }

    /// Append a signer key for subsequent sign operations.
    pub fn signers_add(&mut self, key: KeyRef) {
        self.signers.push(key);
    }

    /// Signer at position `seq`.
    #[must_use]
    pub fn signers_enum(&self, seq: usize) -> Option<KeyRef> {
        self.signers.get(seq).cloned()
    }

    /// Drop every signer.
    pub fn signers_clear(&mut self) {
        self.signers.clear();
    }

    /// Install (or clear) the passphrase callback.
    pub fn set_passphrase_cb(&mut self, cb: Option<PassphraseCb>) {
        *self.cbs.passphrase.lock() = cb;
    }

    /// Install (or clear) the progress callback.
    pub fn set_progress_cb(&mut self, cb: Option<ProgressCb>) {
        *self.cbs.progress.lock() = cb;
    }

    /// Install (or clear) the edit callback.
    pub fn set_edit_cb(&mut self, cb: Option<EditCb>) {
        *self.cbs.edit.lock() = cb;
    }

    /// Route wait-core registrations through a caller-owned loop.
    pub fn set_event_loop(&mut self, event_loop: Box<dyn EventLoop>) {
        self.external = Some(Arc::new(Mutex::new(event_loop)));
    }

    /// Handle for flagging cancellation from another thread.
    #[must_use]
    pub fn canceller(&self) -> Canceller {
        Canceller {
            flag: self.cancel_flag.clone(),
        }
    }

    /// Flag the running operation for cancellation; it is torn down at
    /// the next wait-core iteration.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Release);
    }

    /// Informational XML of the last finished operation.
    #[must_use]
    pub fn op_info(&self) -> Option<&str> {
        self.last_op_info.as_deref()
    }

    /// Error of the last finished operation.
    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    // ========================================================================
    // Operation lifecycle
    // ========================================================================

    fn opts(&self) -> OpOptions {
        OpOptions {
            armor: self.armor,
            textmode: self.textmode,
            include_certs: self.include_certs,
            keylist_mode: self.keylist_mode,
        }
    }

    /// Reset and start one operation.
    fn start_op<F>(&mut self, kind: OpKind, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Engine, &OpOptions) -> Result<()>,
    {
        if self.pending {
            return Err(Error::core(ErrorKind::InvalidValue)
                .with_detail("operation already pending"));
        }

        // Reset leftovers of the previous operation.
        if let Some(mut engine) = self.engine.take() {
            engine.cancel();
        }
        self.reactor.clear();
        global::forget(self.id);
        self.cancel_flag.store(false, Ordering::Release);
        self.last_error = None;
        self.last_op_info = None;

        let host = Arc::new(Mutex::new(OpHost::new(self.protocol, kind)));
        let mode = match &self.external {
            Some(external) => LoopMode::External(external.clone()),
            None => LoopMode::Private(self.reactor.clone()),
        };
        let handles = EngineHandles {
            host: host.clone(),
            cbs: self.cbs.clone(),
            dispatcher: Dispatcher::new(mode, self.id),
            info: config::engine_info(self.protocol),
        };
        let mut engine = engine::new_engine(self.protocol, handles)?;

        let opts = self.opts();
        match f(engine.as_mut(), &opts) {
            Ok(()) => {
                self.engine = Some(engine);
                self.host = Some(host);
                self.pending = true;
                Ok(())
            }
            Err(err) => {
                engine.cancel();
                Err(err)
            }
        }
    }

    fn host(&self) -> Option<&Arc<Mutex<OpHost>>> {
        self.host.as_ref()
    }

    /// Outcome recorded by the drivers, once set.
    fn recorded_outcome(&self) -> Option<Option<Error>> {
        self.host().and_then(|host| host.lock().done.clone())
    }

    /// Tear the operation down with `err` as its outcome.
    fn abort_with(&mut self, err: Error) -> Error {
        if let Some(mut engine) = self.engine.take() {
            engine.cancel();
        }
        self.reactor.clear();
        global::forget(self.id);
        if let Some(host) = &self.host {
            let mut host = host.lock();
            host.done = Some(Some(err.clone()));
        }
        self.pending = false;
        self.last_error = Some(err.clone());
        err
    }

    /// Close out a finished operation and surface its outcome.
    fn conclude(&mut self) -> Result<()> {
        self.pending = false;
        global::forget(self.id);
        let outcome = match self.recorded_outcome() {
            Some(outcome) => outcome,
            // All descriptors vanished without a verdict.
            None => Some(Error::core(ErrorKind::General)
                .with_detail("engine terminated without status")),
        };
        if let Some(host) = &self.host {
            let host = host.lock();
            if !host.op_info.is_empty() {
                self.last_op_info =
                    Some(String::from_utf8_lossy(&host.op_info).into_owned());
            }
        }
        self.engine = None;
        match outcome {
            None => Ok(()),
            Some(err) => {
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// One pump iteration; honours the cancellation flag.
    fn poll_step(&mut self, timeout: Option<Duration>) -> Result<()> {
        if self.cancel_flag.swap(false, Ordering::AcqRel) {
            return Err(self.abort_with(Error::core(ErrorKind::Canceled)));
        }
        match self.reactor.poll_once(timeout) {
            Ok(_) => Ok(()),
            Err(err) => Err(self.abort_with(err)),
        }
    }

    /// Wait for the running operation.
    ///
    /// With `hang`, pumps until completion and returns the operation's
    /// outcome. Without, performs one pump round and returns
    /// `Ok(false)` while the operation is still running.
    pub fn wait(&mut self, hang: bool) -> Result<bool> {
        if !self.pending {
            return Ok(true);
        }
        if self.external.is_some() {
            // The caller's loop drives readiness; only completion is
            // collected here.
            if self.recorded_outcome().is_some() {
                self.conclude()?;
                return Ok(true);
            }
            return Ok(false);
        }
        loop {
            if self.reactor.is_empty() {
                self.conclude()?;
                return Ok(true);
            }
            self.poll_step(Some(POLL_SLICE))?;
            if !hang {
                if self.reactor.is_empty() {
                    self.conclude()?;
                    return Ok(true);
                }
                return Ok(false);
            }
        }
    }

    /// Whether an operation is currently pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    fn run_sync(&mut self) -> Result<()> {
        self.wait(true).map(|_| ())
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Start a decrypt operation.
    pub fn op_decrypt_start(&mut self, cipher: &Data, plain: &Data) -> Result<()> {
        let (cipher, plain) = (cipher.clone(), plain.clone());
        self.start_op(OpKind::Decrypt, move |engine, _| {
            engine.start_decrypt(cipher, plain)
        })
    }

    /// Decrypt `cipher` into `plain`.
    pub fn op_decrypt(&mut self, cipher: &Data, plain: &Data) -> Result<()> {
        self.op_decrypt_start(cipher, plain)?;
        self.run_sync()
    }

    /// Start an encrypt operation. An empty recipient set selects
    /// symmetric encryption (OpenPGP only).
    pub fn op_encrypt_start(
        &mut self,
        recipients: &[KeyRef],
        plain: &Data,
        cipher: &Data,
        always_trust: bool,
    ) -> Result<()> {
        let recipients = recipients.to_vec();
        let (plain, cipher) = (plain.clone(), cipher.clone());
        self.start_op(OpKind::Encrypt, move |engine, opts| {
            engine.start_encrypt(&recipients, plain, cipher, always_trust, opts)
        })
    }

    /// Encrypt `plain` to `recipients`.
    pub fn op_encrypt(
        &mut self,
        recipients: &[KeyRef],
        plain: &Data,
        cipher: &Data,
        always_trust: bool,
    ) -> Result<()> {
        self.op_encrypt_start(recipients, plain, cipher, always_trust)?;
        self.run_sync()
    }

    /// Start a combined sign-and-encrypt operation.
    pub fn op_encrypt_sign_start(
        &mut self,
        recipients: &[KeyRef],
        plain: &Data,
        cipher: &Data,
        always_trust: bool,
    ) -> Result<()> {
        let recipients = recipients.to_vec();
        let signers = self.signers.clone();
        let (plain, cipher) = (plain.clone(), cipher.clone());
        self.start_op(OpKind::EncryptSign, move |engine, opts| {
            engine.start_encrypt_sign(&recipients, &signers, plain, cipher, always_trust, opts)
        })
    }

    /// Sign and encrypt `plain` in one pass.
    pub fn op_encrypt_sign(
        &mut self,
        recipients: &[KeyRef],
        plain: &Data,
        cipher: &Data,
        always_trust: bool,
    ) -> Result<()> {
        self.op_encrypt_sign_start(recipients, plain, cipher, always_trust)?;
        self.run_sync()
    }

    /// Start a sign operation using the configured signers.
    pub fn op_sign_start(&mut self, input: &Data, output: &Data, mode: SigMode) -> Result<()> {
        let signers = self.signers.clone();
        let (input, output) = (input.clone(), output.clone());
        self.start_op(OpKind::Sign, move |engine, opts| {
            engine.start_sign(input, output, mode, &signers, opts)
        })
    }

    /// Sign `input` into `output`.
    pub fn op_sign(&mut self, input: &Data, output: &Data, mode: SigMode) -> Result<()> {
        self.op_sign_start(input, output, mode)?;
        self.run_sync()
    }

    /// Start a verify operation. Detached signatures supply
    /// `signed_text`; inline signatures supply `plaintext` to capture
    /// the recovered text.
    pub fn op_verify_start(
        &mut self,
        sig: &Data,
        signed_text: Option<&Data>,
        plaintext: Option<&Data>,
    ) -> Result<()> {
        if signed_text.is_none() && plaintext.is_none() {
            return Err(Error::core(ErrorKind::InvalidValue)
                .with_detail("verify needs signed text or a plaintext sink"));
        }
        let sig = sig.clone();
        let signed_text = signed_text.cloned();
        let plaintext = plaintext.cloned();
        self.start_op(OpKind::Verify, move |engine, _| {
            engine.start_verify(sig, signed_text, plaintext)
        })
    }

    /// Verify a signature.
    pub fn op_verify(
        &mut self,
        sig: &Data,
        signed_text: Option<&Data>,
        plaintext: Option<&Data>,
    ) -> Result<()> {
        self.op_verify_start(sig, signed_text, plaintext)?;
        self.run_sync()
    }

    /// Start a key listing.
    pub fn op_keylist_start(&mut self, pattern: Option<&str>, secret_only: bool) -> Result<()> {
        let patterns: Vec<String> = pattern.map(str::to_string).into_iter().collect();
        self.op_keylist_ext_start(&patterns, secret_only)
    }

    /// Start a key listing with several patterns.
    pub fn op_keylist_ext_start(
        &mut self,
        patterns: &[String],
        secret_only: bool,
    ) -> Result<()> {
        let patterns = patterns.to_vec();
        self.start_op(OpKind::Keylist, move |engine, opts| {
            engine.start_keylist(&patterns, secret_only, opts)
        })
    }

    /// Next key of the running listing; `Eof` when exhausted.
    pub fn op_keylist_next(&mut self) -> Result<KeyRef> {
        loop {
            if let Some(host) = self.host() {
                if let Some(key) = host.lock().keys.pop_front() {
                    return Ok(key);
                }
            }
            if !self.pending || self.reactor.is_empty() {
                if self.pending {
                    self.conclude()?;
                }
                return Err(Error::core(ErrorKind::Eof));
            }
            self.poll_step(Some(POLL_SLICE))?;
        }
    }

    /// Finish a key listing early (or collect its result).
    pub fn op_keylist_end(&mut self) -> Result<()> {
        if self.pending {
            // Drain whatever the engine still has to say.
            while !self.reactor.is_empty() {
                self.poll_step(Some(POLL_SLICE))?;
            }
            self.conclude()?;
        }
        Ok(())
    }

    /// Collect every key matching `pattern` in one call.
    pub fn keylist_all(&mut self, pattern: Option<&str>, secret_only: bool) -> Result<Vec<KeyRef>> {
        self.op_keylist_start(pattern, secret_only)?;
        let mut keys = Vec::new();
        loop {
            match self.op_keylist_next() {
                Ok(key) => keys.push(key),
                Err(err) if err.is_eof() => break,
                Err(err) => return Err(err),
            }
        }
        Ok(keys)
    }

    /// Look a single key up by fingerprint, consulting the cache
    /// first.
    pub fn get_key(&mut self, fingerprint: &str, secret: bool) -> Result<KeyRef> {
        if !secret {
            if let Some(key) = cache::get(fingerprint) {
                return Ok(key);
            }
        }
        let keys = self.keylist_all(Some(fingerprint), secret)?;
        keys.into_iter()
            .next()
            .ok_or_else(|| Error::core(ErrorKind::InvalidKey).with_detail(fingerprint))
    }

    /// Start an import of `keydata`.
    pub fn op_import_start(&mut self, keydata: &Data) -> Result<()> {
        let keydata = keydata.clone();
        self.start_op(OpKind::Import, move |engine, _| engine.start_import(keydata))
    }

    /// Import keys from `keydata`.
    pub fn op_import(&mut self, keydata: &Data) -> Result<()> {
        self.op_import_start(keydata)?;
        self.run_sync()
    }

    /// Start an export of the keys matching `patterns`.
    pub fn op_export_start(&mut self, patterns: &[String], keydata: &Data) -> Result<()> {
        let patterns = patterns.to_vec();
        let keydata = keydata.clone();
        self.start_op(OpKind::Export, move |engine, opts| {
            engine.start_export(&patterns, keydata, opts)
        })
    }

    /// Export keys into `keydata`.
    pub fn op_export(&mut self, patterns: &[String], keydata: &Data) -> Result<()> {
        self.op_export_start(patterns, keydata)?;
        self.run_sync()
    }

    /// Start key generation from an engine-specific parameter block.
    pub fn op_genkey_start(&mut self, params: &Data, pubkey: Option<&Data>) -> Result<()> {
        let params = params.clone();
        let pubkey = pubkey.cloned();
        self.start_op(OpKind::Genkey, move |engine, opts| {
            engine.start_genkey(params, pubkey, opts)
        })
    }

    /// Generate a key pair.
    pub fn op_genkey(&mut self, params: &Data, pubkey: Option<&Data>) -> Result<()> {
        self.op_genkey_start(params, pubkey)?;
        self.run_sync()
    }

    /// Start deleting `key` from the engine's keyring.
    pub fn op_delete_start(&mut self, key: &Key, allow_secret: bool) -> Result<()> {
        let key = key.clone();
        self.start_op(OpKind::Delete, move |engine, _| {
            engine.start_delete(&key, allow_secret)
        })
    }

    /// Delete `key` from the engine's keyring.
    pub fn op_delete(&mut self, key: &Key, allow_secret: bool) -> Result<()> {
        self.op_delete_start(key, allow_secret)?;
        self.run_sync()
    }

    /// Start an interactive edit session on `key`; the edit callback
    /// steers the dialogue and `out` captures the listing output.
    pub fn op_edit_start(&mut self, key: &Key, out: &Data) -> Result<()> {
        let key = key.clone();
        let out = out.clone();
        let signers = self.signers.clone();
        self.start_op(OpKind::Edit, move |engine, _| {
            engine.start_edit(&key, out, &signers)
        })
    }

    /// Run an interactive edit session to completion.
    pub fn op_edit(&mut self, key: &Key, out: &Data) -> Result<()> {
        self.op_edit_start(key, out)?;
        self.run_sync()
    }

    /// Start a trust-path listing for `pattern`.
    pub fn op_trustlist_start(&mut self, pattern: &str) -> Result<()> {
        if pattern.is_empty() {
            return Err(Error::core(ErrorKind::InvalidValue));
        }
        let pattern = pattern.to_string();
        self.start_op(OpKind::Trustlist, move |engine, _| {
            engine.start_trustlist(&pattern)
        })
    }

    /// Next trust item of the running listing; `Eof` when exhausted.
    pub fn op_trustlist_next(&mut self) -> Result<TrustItemRef> {
        loop {
            if let Some(host) = self.host() {
                if let Some(item) = host.lock().trust_items.pop_front() {
                    return Ok(item);
                }
            }
            if !self.pending || self.reactor.is_empty() {
                if self.pending {
                    self.conclude()?;
                }
                return Err(Error::core(ErrorKind::Eof));
            }
            self.poll_step(Some(POLL_SLICE))?;
        }
    }

    /// Finish a trust-item listing.
    pub fn op_trustlist_end(&mut self) -> Result<()> {
        self.op_keylist_end()
    }

    // ========================================================================
    // Results
    // ========================================================================

    /// Result of the last verify operation.
    #[must_use]
    pub fn op_verify_result(&self) -> Option<VerifyResult> {
        self.host().and_then(|host| host.lock().slots.verify.clone())
    }

    /// Result of the last decrypt operation.
    #[must_use]
    pub fn op_decrypt_result(&self) -> Option<DecryptResult> {
        self.host().and_then(|host| host.lock().slots.decrypt.clone())
    }

    /// Result of the last sign operation.
    #[must_use]
    pub fn op_sign_result(&self) -> Option<SignResult> {
        self.host().and_then(|host| host.lock().slots.sign.clone())
    }

    /// Result of the last encrypt operation.
    #[must_use]
    pub fn op_encrypt_result(&self) -> Option<EncryptResult> {
        self.host().and_then(|host| host.lock().slots.encrypt.clone())
    }

    /// Result of the last import operation.
    #[must_use]
    pub fn op_import_result(&self) -> Option<ImportResult> {
        self.host().and_then(|host| host.lock().slots.import.clone())
    }

    /// Result of the last key generation.
    #[must_use]
    pub fn op_genkey_result(&self) -> Option<GenkeyResult> {
        self.host().and_then(|host| host.lock().slots.genkey.clone())
    }

    /// Result of the last key listing.
    #[must_use]
    pub fn op_keylist_result(&self) -> Option<KeylistResult> {
        self.host().and_then(|host| host.lock().slots.keylist.clone())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.cancel();
        }
        self.reactor.clear();
        global::forget(self.id);
    }
}

/// Cancellation handle usable from any thread.
#[derive(Clone)]
pub struct Canceller {
    flag: Arc<AtomicBool>,
}

impl Canceller {
    /// Flag the owning context's operation for cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

/// Wait until one of `contexts` finishes its operation.
///
/// Returns the index of the finished context and its outcome. With
/// `hang` unset, returns `Ok(None)` when nothing completed in one
/// sweep. Completions are buffered in a done-queue, so a completion
/// observed by an earlier sweep is never lost.
pub fn wait_any(
    contexts: &mut [&mut Context],
    hang: bool,
) -> Result<Option<(usize, Result<()>)>> {
    if contexts.is_empty() {
        return Ok(None);
    }
    let ids: Vec<u64> = contexts.iter().map(|ctx| ctx.id).collect();
    loop {
        // Pump each pending context one slice.
        for ctx in contexts.iter_mut() {
            if !ctx.pending {
                continue;
            }
            if ctx.cancel_flag.swap(false, Ordering::AcqRel) {
                ctx.abort_with(Error::core(ErrorKind::Canceled));
                global::push_done(ctx.id);
                continue;
            }
            let slice = Duration::from_millis(5);
            if let Err(err) = ctx.reactor.poll_once(Some(slice)) {
                ctx.abort_with(err);
                global::push_done(ctx.id);
            }
        }

        if let Some(done_id) = global::pop_done_among(&ids) {
            let idx = ids.iter().position(|&id| id == done_id).unwrap_or(0);
            let ctx = &mut contexts[idx];
            // Drain remaining data before reporting completion.
            while ctx.pending && !ctx.reactor.is_empty() {
                ctx.poll_step(Some(POLL_SLICE))?;
            }
            let outcome = if ctx.pending {
                ctx.conclude()
            } else {
                match &ctx.last_error {
                    Some(err) => Err(err.clone()),
                    None => Ok(()),
                }
            };
            return Ok(Some((idx, outcome)));
        }

        if !hang {
            return Ok(None);
        }
    }
}
