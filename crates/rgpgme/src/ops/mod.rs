// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Operation state machines.
//!
//! Each operation owns one state machine that consumes the engine's
//! status stream (and, for listings, the colon stream) and accumulates
//! exactly one result record in the context's operation-data slots.
//! The engine drivers are protocol plumbing only; everything that
//! interprets a status token lives here.
//!
//! Cross-cutting subprotocols (passphrase, progress) run before the
//! per-operation machine sees the line, the same order for every
//! operation.

/// Decrypt machine.
pub mod decrypt;
/// Delete machine.
pub mod delete;
/// Edit (interactive) machine.
pub mod edit;
/// Encrypt machine.
pub mod encrypt;
/// Genkey machine.
pub mod genkey;
/// Import machine.
pub mod import;
/// Keylist machine (colon records).
pub mod keylist;
/// Result record types.
pub mod results;
/// Sign machine.
pub mod sign;
/// Trustlist machine (colon records).
pub mod trustlist;
/// Verify machine.
pub mod verify;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, ErrorKind, Result};
use crate::keys::{KeyRef, TrustItemRef};
use crate::protocol::status::Status;
use crate::wait::WaitEvent;
use crate::Protocol;

pub use results::{
    DecryptResult, EncryptResult, GenkeyResult, ImportResult, ImportStatus, InvalidKey,
    KeylistResult, NewSignature, PkaTrust, Recipient, SigMode, SigNotation, SigSummary,
    Signature, SignResult, VerifyResult,
};

/// The kinds of operations a context can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Encrypt,
    Decrypt,
    Sign,
    EncryptSign,
    Verify,
    Keylist,
    Import,
    Export,
    Genkey,
    Edit,
    Trustlist,
    Delete,
}

/// Typed operation-data slots, at most one record per kind.
#[derive(Debug, Default)]
pub struct OpSlots {
    pub encrypt: Option<EncryptResult>,
    pub sign: Option<SignResult>,
    pub verify: Option<VerifyResult>,
    pub decrypt: Option<DecryptResult>,
    pub import: Option<ImportResult>,
    pub genkey: Option<GenkeyResult>,
    pub keylist: Option<KeylistResult>,
}

/// A passphrase request handed to the caller's callback.
#[derive(Debug, Clone)]
pub struct PassphraseRequest {
    /// Descriptor string: key id, main key id, algorithm, key length
    /// and the user-id hint, space separated.
    pub description: String,
    /// The previous attempt was rejected.
    pub prev_attempt_failed: bool,
}

/// Passphrase callback. `Ok(None)` cancels the operation.
pub type PassphraseCb = Box<dyn FnMut(&PassphraseRequest) -> Result<Option<String>> + Send>;
/// Progress callback: `(what, type_char, current, total)`.
pub type ProgressCb = Box<dyn FnMut(&str, char, i64, i64) + Send>;
/// Edit callback. `Ok(None)` lets the driver answer with a bare newline.
pub type EditCb = Box<dyn FnMut(Status, &str) -> Result<Option<String>> + Send>;

/// Callback set shared between the context and the engine handlers.
#[derive(Clone, Default)]
pub(crate) struct SharedCallbacks {
    pub passphrase: Arc<Mutex<Option<PassphraseCb>>>,
    pub progress: Arc<Mutex<Option<ProgressCb>>>,
    pub edit: Arc<Mutex<Option<EditCb>>>,
}

/// Passphrase subprotocol scratch state.
#[derive(Debug, Default)]
pub(crate) struct PassphraseState {
    /// Last `USERID_HINT` payload.
    pub userid_hint: String,
    /// Descriptor built from the last `NEED_PASSPHRASE*`.
    pub description: String,
    /// The last attempt came back `BAD_PASSPHRASE`.
    pub last_was_bad: bool,
}

/// Shared per-operation state between the context and the engine.
///
/// Engine handlers lock it for the duration of one status line; the
/// context locks it between poll rounds. User callbacks are never
/// invoked while this lock is held.
pub(crate) struct OpHost {
    pub protocol: Protocol,
    /// Kept for diagnostics; the slots are typed, not tag-dispatched.
    #[allow(dead_code)]
    pub kind: OpKind,
    pub slots: OpSlots,
    /// Deferred operation failure collected from recoverable statuses.
    pub failure: Option<Error>,
    /// Set when the machine consumed EOF and the outcome is final.
    pub done: Option<Option<Error>>,
    pub passphrase: PassphraseState,
    /// Streaming listing queues.
    pub keys: VecDeque<KeyRef>,
    pub trust_items: VecDeque<TrustItemRef>,
    /// Events to forward to an external event loop.
    pub events: Vec<WaitEvent>,
    /// Accumulated operation-info XML.
    pub op_info: Vec<u8>,
}

impl OpHost {
    pub fn new(protocol: Protocol, kind: OpKind) -> Self {
        Self {
            protocol,
            kind,
            slots: OpSlots::default(),
            failure: None,
            done: None,
            passphrase: PassphraseState::default(),
            keys: VecDeque::new(),
            trust_items: VecDeque::new(),
            events: Vec::new(),
            op_info: Vec::new(),
        }
    }

    /// Record a deferred failure; the first one wins.
    pub fn defer_failure(&mut self, err: Error) {
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }

    /// Open (or continue) the operation-info XML container.
    pub fn op_info_open(&mut self) {
        if self.op_info.is_empty() {
            self.op_info.extend_from_slice(b"<GnupgOperationInfo>\n");
        }
    }

    /// Close the XML container if anything was written.
    pub fn op_info_close(&mut self) {
        if !self.op_info.is_empty() {
            self.op_info.extend_from_slice(b"</GnupgOperationInfo>\n");
        }
    }
}

/// One operation's state machine.
pub(crate) enum OpMachine {
    Decrypt(decrypt::DecryptOp),
    Delete(delete::DeleteOp),
    Edit(edit::EditOp),
    Encrypt(encrypt::EncryptOp),
    /// Combined sign-and-encrypt: both machines see every status line.
    EncryptSign(sign::SignOp, encrypt::EncryptOp),
    Export,
    Genkey(genkey::GenkeyOp),
    Import(import::ImportOp),
    Keylist(keylist::KeylistOp),
    Sign(sign::SignOp),
    Trustlist(trustlist::TrustlistOp),
    Verify(verify::VerifyOp),
}

impl OpMachine {
    /// Feed one status notification.
    pub fn on_status(&mut self, host: &mut OpHost, code: Status, args: &str) -> Result<()> {
        match self {
            OpMachine::Decrypt(op) => op.on_status(host, code, args),
            OpMachine::Delete(op) => op.on_status(host, code, args),
            OpMachine::Edit(op) => op.on_status(host, code, args),
            OpMachine::Encrypt(op) => op.on_status(host, code, args),
            OpMachine::EncryptSign(sign, encrypt) => {
                sign.on_status(host, code, args)?;
                encrypt.on_status(host, code, args)
            }
            OpMachine::Export => Ok(()),
            OpMachine::Genkey(op) => op.on_status(host, code, args),
            OpMachine::Import(op) => op.on_status(host, code, args),
            OpMachine::Keylist(op) => op.on_status(host, code, args),
            OpMachine::Sign(op) => op.on_status(host, code, args),
            OpMachine::Trustlist(op) => op.on_status(host, code, args),
            OpMachine::Verify(op) => op.on_status(host, code, args),
        }
    }

    /// Feed one colon-channel record.
    pub fn on_colon(&mut self, host: &mut OpHost, line: &[u8]) -> Result<()> {
        match self {
            OpMachine::Keylist(op) => op.on_colon(host, line),
            OpMachine::Trustlist(op) => op.on_colon(host, line),
            // Other operations have no colon channel; ignore strays.
            _ => Ok(()),
        }
    }

    /// The status channel closed; finalize and compute the outcome.
    pub fn on_eof(&mut self, host: &mut OpHost) -> Result<()> {
        match self {
            OpMachine::Decrypt(op) => op.on_eof(host),
            OpMachine::Delete(op) => op.on_eof(host),
            OpMachine::Edit(op) => op.on_eof(host),
            OpMachine::Encrypt(op) => op.on_eof(host),
            OpMachine::EncryptSign(sign, encrypt) => {
                sign.on_eof(host)?;
                encrypt.on_eof(host)
            }
            OpMachine::Export => Ok(()),
            OpMachine::Genkey(op) => op.on_eof(host),
            OpMachine::Import(op) => op.on_eof(host),
            OpMachine::Keylist(op) => op.on_eof(host),
            OpMachine::Sign(op) => op.on_eof(host),
            OpMachine::Trustlist(op) => op.on_eof(host),
            OpMachine::Verify(op) => op.on_eof(host),
        }
    }
}

/// Handle the passphrase subprotocol state.
///
/// Runs before the per-operation machine for every status line.
/// Recoverable conditions are deferred into the host instead of
/// failing the stream. No user callback is invoked here; the host
/// lock may be held.
pub(crate) fn passphrase_status(host: &mut OpHost, code: Status, args: &str) {
    match code {
        Status::UseridHint => {
            host.passphrase.userid_hint = args.to_string();
        }
        Status::NeedPassphrase | Status::NeedPassphraseSym => {
            host.passphrase.description =
                format!("{} {}", args, host.passphrase.userid_hint);
        }
        Status::BadPassphrase => {
            host.passphrase.last_was_bad = true;
        }
        Status::GoodPassphrase => {
            host.passphrase.last_was_bad = false;
        }
        Status::MissingPassphrase => {
            host.defer_failure(Error::core(ErrorKind::BadPassphrase));
        }
        _ => {}
    }
}

/// Handle the progress subprotocol. Never called with the host lock
/// held, since it runs a user callback.
pub(crate) fn progress_status(cbs: &SharedCallbacks, code: Status, args: &str) {
    if code != Status::Progress {
        return;
    }
    let mut progress = cbs.progress.lock();
    if let Some(cb) = progress.as_mut() {
        let mut fields = args.split(' ');
        let what = fields.next().unwrap_or("");
        let type_char = fields
            .next()
            .and_then(|s| s.chars().next())
            .unwrap_or('?');
        let current = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let total = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        cb(what, type_char, current, total);
    }
}

/// Map an engine-reported error argument to the closed taxonomy.
///
/// Accepts the numeric `gpg-error` form (source bits masked off) and
/// the symbolic token form older engines emit; unknown values become
/// `General`.
#[must_use]
pub(crate) fn map_engine_error(arg: &str) -> ErrorKind {
    if let Ok(num) = arg.parse::<u32>() {
        return match num & 0xffff {
            0 => ErrorKind::General,
            8 => ErrorKind::BadSignature,
            9 => ErrorKind::NoPublicKey,
            11 => ErrorKind::BadPassphrase,
            17 => ErrorKind::UnusableSecretKey,
            94 => ErrorKind::CertRevoked,
            96 => ErrorKind::NoCrl,
            97 => ErrorKind::CrlTooOld,
            125 => ErrorKind::WrongKeyUsage,
            _ => ErrorKind::General,
        };
    }
    let mut token = arg.to_ascii_lowercase();
    token = token.replace('-', "_");
    match token.as_str() {
        "no_pubkey" | "no_public_key" => ErrorKind::NoPublicKey,
        "no_seckey" | "no_secret_key" => ErrorKind::UnusableSecretKey,
        "bad_signature" | "badsig" => ErrorKind::BadSignature,
        "bad_passphrase" => ErrorKind::BadPassphrase,
        "cert_revoked" => ErrorKind::CertRevoked,
        "no_crl_known" => ErrorKind::NoCrl,
        "crl_too_old" => ErrorKind::CrlTooOld,
        "wrong_key_usage" => ErrorKind::WrongKeyUsage,
        "unsupported_algorithm" => ErrorKind::UnsupportedAlgorithm,
        "sig_expired" => ErrorKind::SigExpired,
        "key_expired" => ErrorKind::KeyExpired,
        "no_data" => ErrorKind::NoData,
        _ => ErrorKind::General,
    }
}

/// Parse a decimal epoch timestamp; `-1` invalid, `0` unavailable.
#[must_use]
pub(crate) fn parse_timestamp(field: &str) -> i64 {
    if field.is_empty() {
        return 0;
    }
    field.parse().unwrap_or(-1)
}
