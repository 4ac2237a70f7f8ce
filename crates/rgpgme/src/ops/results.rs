// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Result records, one per operation kind.
//!
//! Every operation produces exactly one record of its kind, allocated
//! lazily by the first status line that references it and immutable
//! once the operation ends. An error and a (possibly partial) result
//! coexist; callers may inspect both.

use crate::error::ErrorKind;
use crate::keys::Validity;

/// A recipient or signer the engine rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidKey {
    /// Fingerprint or user id as echoed by the engine.
    pub fingerprint: String,
    /// Numeric reason code from the status line.
    pub reason: u32,
}

/// Outcome of an encrypt operation.
#[derive(Debug, Clone, Default)]
pub struct EncryptResult {
    /// Recipients the engine refused.
    pub invalid_recipients: Vec<InvalidKey>,
}

/// How a signature was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigMode {
    /// Inline signature.
    #[default]
    Normal,
    /// Detached signature.
    Detach,
    /// Cleartext signature.
    Clear,
}

/// One signature created by a sign operation.
#[derive(Debug, Clone)]
pub struct NewSignature {
    /// Inline, detached or cleartext.
    pub mode: SigMode,
    /// Public-key algorithm number.
    pub pubkey_algo: u32,
    /// Hash algorithm number.
    pub hash_algo: u32,
    /// Signature class.
    pub class: u32,
    /// Creation time, seconds since the epoch.
    pub timestamp: i64,
    /// Fingerprint of the signing key.
    pub fingerprint: String,
}

/// Outcome of a sign operation.
#[derive(Debug, Clone, Default)]
pub struct SignResult {
    /// Signatures actually created.
    pub signatures: Vec<NewSignature>,
    /// Signers the engine refused.
    pub invalid_signers: Vec<InvalidKey>,
}

/// Summary bitset of one verified signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SigSummary(pub u32);

impl SigSummary {
    /// The signature is unquestionably valid.
    pub const VALID: u32 = 0x0001;
    /// The signature is good.
    pub const GREEN: u32 = 0x0002;
    /// The signature is bad.
    pub const RED: u32 = 0x0004;
    /// One key has been revoked.
    pub const KEY_REVOKED: u32 = 0x0010;
    /// One key has expired.
    pub const KEY_EXPIRED: u32 = 0x0020;
    /// The signature itself has expired.
    pub const SIG_EXPIRED: u32 = 0x0040;
    /// Can't verify: key missing.
    pub const KEY_MISSING: u32 = 0x0080;
    /// No CRL available.
    pub const CRL_MISSING: u32 = 0x0100;
    /// The available CRL is too old.
    pub const CRL_TOO_OLD: u32 = 0x0200;
    /// A policy requirement was not met.
    pub const BAD_POLICY: u32 = 0x0400;
    /// A system error occurred.
    pub const SYS_ERROR: u32 = 0x0800;

    /// True when every bit in `mask` is set.
    #[must_use]
    pub fn has(self, mask: u32) -> bool {
        self.0 & mask == mask
    }
}

/// A name/value attribute attached to a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigNotation {
    /// Notation name; `None` for a policy URL.
    pub name: Option<Vec<u8>>,
    /// Percent-decoded value.
    pub value: Vec<u8>,
}

/// PKA trust state of a verified signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PkaTrust {
    /// No PKA information seen.
    #[default]
    None,
    /// PKA lookup contradicted the signature.
    Bad,
    /// PKA lookup confirmed the signature.
    Good,
}

/// One verified signature.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    /// Fingerprint (or key id, for error cases) of the signer.
    pub fingerprint: String,
    /// `None` means the signature checked out.
    pub status: Option<ErrorKind>,
    /// Derived summary bitset.
    pub summary: SigSummary,
    /// Creation time.
    pub timestamp: i64,
    /// Expiry of the signature; 0 when it does not expire.
    pub exp_timestamp: i64,
    /// Public-key algorithm number.
    pub pubkey_algo: u32,
    /// Hash algorithm number.
    pub hash_algo: u32,
    /// Validity of the binding.
    pub validity: Validity,
    /// Reason for the validity, when the engine gave one.
    pub validity_reason: Option<ErrorKind>,
    /// The key was used against its usage flags.
    pub wrong_key_usage: bool,
    /// PKA lookup outcome.
    pub pka_trust: PkaTrust,
    /// Address the PKA lookup was done for.
    pub pka_address: Option<String>,
    /// Notations and policy URLs, in arrival order.
    pub notations: Vec<SigNotation>,
}

/// Outcome of a verify operation.
#[derive(Debug, Clone, Default)]
pub struct VerifyResult {
    /// File name announced by a `PLAINTEXT` status.
    pub file_name: Option<String>,
    /// All signatures, in arrival order.
    pub signatures: Vec<Signature>,
}

/// One recipient of a decrypted message.
#[derive(Debug, Clone)]
pub struct Recipient {
    /// 16-hex key id.
    pub keyid: String,
    /// Public-key algorithm number.
    pub pubkey_algo: u32,
    /// `None` when a usable secret key was available.
    pub status: Option<ErrorKind>,
}

/// Outcome of a decrypt operation.
#[derive(Debug, Clone, Default)]
pub struct DecryptResult {
    /// Name of an algorithm the engine could not handle.
    pub unsupported_algorithm: Option<String>,
    /// A key was used against its usage flags.
    pub wrong_key_usage: bool,
    /// Original file name, when the plaintext carried one.
    pub file_name: Option<String>,
    /// Recipients of the message.
    pub recipients: Vec<Recipient>,
}

/// Per-key entry of an import.
#[derive(Debug, Clone)]
pub struct ImportStatus {
    /// Fingerprint of the key the entry refers to.
    pub fingerprint: String,
    /// `None` when the key was processed successfully.
    pub error: Option<ErrorKind>,
    /// Bitset of [`ImportStatus`] flags.
    pub status: u32,
}

impl ImportStatus {
    /// The key was new.
    pub const NEW: u32 = 1;
    /// New user ids were merged in.
    pub const UID: u32 = 2;
    /// New signatures were merged in.
    pub const SIG: u32 = 4;
    /// New subkeys were merged in.
    pub const SUBKEY: u32 = 8;
    /// A secret key was involved.
    pub const SECRET: u32 = 16;
}

/// Counters and per-key entries of an import operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportResult {
    pub considered: i32,
    pub no_user_id: i32,
    pub imported: i32,
    pub imported_rsa: i32,
    pub unchanged: i32,
    pub new_user_ids: i32,
    pub new_sub_keys: i32,
    pub new_signatures: i32,
    pub new_revocations: i32,
    pub secret_read: i32,
    pub secret_imported: i32,
    pub secret_unchanged: i32,
    pub not_imported: i32,
    pub skipped_v3_keys: i32,
    /// Per-key reports, in arrival order.
    pub imports: Vec<ImportStatus>,
}

impl PartialEq for ImportStatus {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.error == other.error
            && self.status == other.status
    }
}

impl ImportResult {
    /// Merge `other` into `self`, correcting the double counting that
    /// arises when both runs saw the same key.
    ///
    /// The merge is associative with the empty result as identity: a
    /// fingerprint reported by both runs is considered once, and it
    /// counts as unchanged only when neither run changed it.
    pub fn merge(&mut self, other: &ImportResult) {
        self.considered += other.considered;
        self.no_user_id += other.no_user_id;
        self.imported += other.imported;
        self.imported_rsa += other.imported_rsa;
        self.unchanged += other.unchanged;
        self.new_user_ids += other.new_user_ids;
        self.new_sub_keys += other.new_sub_keys;
        self.new_signatures += other.new_signatures;
        self.new_revocations += other.new_revocations;
        self.secret_read += other.secret_read;
        self.secret_imported += other.secret_imported;
        self.secret_unchanged += other.secret_unchanged;
        self.not_imported += other.not_imported;
        self.skipped_v3_keys += other.skipped_v3_keys;

        for import in &other.imports {
            let seen_before = self
                .imports
                .iter()
                .any(|mine| mine.fingerprint == import.fingerprint);
            if seen_before {
                // The key was already counted by an earlier run.
                self.considered -= 1;
                if import.status == 0 && import.error.is_none() {
                    // The second run did not change it either; it must
                    // not count as unchanged twice.
                    self.unchanged -= 1;
                }
                if import.status & ImportStatus::SECRET != 0 {
                    self.secret_read -= 1;
                    if import.status & !ImportStatus::SECRET == 0 && import.error.is_none() {
                        self.secret_unchanged -= 1;
                    }
                }
            }
            self.imports.push(import.clone());
        }
    }
}

/// Outcome of a key-generation operation.
#[derive(Debug, Clone, Default)]
pub struct GenkeyResult {
    /// A primary key was created.
    pub primary: bool,
    /// A subkey was created.
    pub sub: bool,
    /// Fingerprint of the created key, when reported.
    pub fingerprint: Option<String>,
}

/// Outcome of a key listing.
#[derive(Debug, Clone, Default)]
pub struct KeylistResult {
    /// The engine truncated the listing.
    pub truncated: bool,
}
