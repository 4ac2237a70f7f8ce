// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # rgpgme - pure Rust client runtime for the GnuPG engines
//!
//! A client runtime that drives the external OpenPGP (`gpg`) and
//! CMS/S-MIME (`gpgsm`) engines as child processes over textual pipe
//! and Assuan protocols, exposing one protocol-agnostic operation API:
//! key listing and lookup, encryption, decryption, signing,
//! verification, combined sign-and-encrypt, import/export, deletion,
//! key generation, interactive key editing and trust-item enumeration.
//!
//! No cryptography happens in this process; the engines do all of it.
//! The crate's job is the plumbing: spawning, descriptor wiring,
//! readiness multiplexing, status-stream parsing and typed result
//! assembly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rgpgme::{Context, Data, Protocol, Result};
//!
//! fn main() -> Result<()> {
//!     let mut ctx = Context::new()?;
//!     ctx.set_protocol(Protocol::OpenPgp)?;
//!     ctx.set_armor(true);
//!
//!     let key = ctx.get_key("A0FF4590BB6122EDEF6E3C542D727CC768697734", false)?;
//!     let plain = Data::from_bytes(&b"Hallo Leute!\n"[..]);
//!     let cipher = Data::new();
//!     ctx.op_encrypt(&[key], &plain, &cipher, true)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |                        Context API                            |
//! |   configuration | operation lifecycle | results | wait_any    |
//! +---------------------------------------------------------------+
//! |        Operation state machines (ops)                         |
//! |   verify | decrypt | sign | encrypt | keylist | import | ...  |
//! +---------------------------------------------------------------+
//! |        Engine drivers (engine)                                |
//! |   gpg: argv + status/colon/command fds | gpgsm: Assuan        |
//! +---------------------------------------------------------------+
//! |   protocol: line framing, status tokens, escapes              |
//! |   wait: reactors, done-queue, external loops                  |
//! |   io: pipes, spawn, close-notify, fd passing                  |
//! +---------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Context`] | Engine conversation: configuration and operations |
//! | [`Data`] | Uniform byte stream fed to / captured from an engine |
//! | [`keys::Key`] | Immutable key with subkeys and user ids |
//! | [`Error`] | `(source, kind)` pair with a stable wire code |

/// Engine discovery and runtime configuration.
pub mod config;
/// Context and wait entry points.
pub mod context;
/// Data objects (memory, file region, pull callbacks).
pub mod data;
/// Engine drivers (pipe and Assuan protocols).
pub mod engine;
/// The unified error taxonomy.
pub mod error;
/// Descriptor-level transport.
pub mod io;
/// Key, user-id and trust-item model plus the key cache.
pub mod keys;
/// Operation state machines and result records.
pub mod ops;
/// Wire-level protocol building blocks.
pub mod protocol;
/// The wait core.
pub mod wait;

/// The protocol family an engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// OpenPGP, served by the pipe-protocol engine.
    #[default]
    OpenPgp,
    /// CMS / S-MIME, served by the Assuan-protocol engine.
    Cms,
}

impl Protocol {
    /// Human-readable protocol name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Protocol::OpenPgp => "OpenPGP",
            Protocol::Cms => "CMS",
        }
    }
}

pub use context::{wait_any, Canceller, Context};
pub use data::{Data, DataCallbacks, DataEncoding};
pub use engine::{engine_check_version, keylist_mode};
pub use error::{Error, ErrorKind, ErrorSource, Result};
pub use keys::{Key, KeyRef, TrustItem, TrustItemRef, Validity};
pub use ops::results::{
    DecryptResult, EncryptResult, GenkeyResult, ImportResult, InvalidKey, KeylistResult,
    NewSignature, Recipient, SigMode, SigNotation, SigSummary, Signature, SignResult,
    VerifyResult,
};
pub use ops::{EditCb, PassphraseCb, PassphraseRequest, ProgressCb};
pub use protocol::status::Status;
pub use wait::{Direction, EventLoop, ExternalTag, IoHandle, WaitEvent};
