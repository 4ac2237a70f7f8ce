// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Unified error taxonomy for the runtime.
//!
//! Every failure is the pair `(source, kind)`: the source names the
//! subsystem that raised it (core, pipe engine, Assuan engine, transport)
//! and the kind is a closed, stable set shared by all subsystems. The
//! pair packs into a single `u32` for wire compatibility; see
//! [`Error::code`] and [`Error::from_code`].

use std::fmt;

/// Subsystem that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSource {
    /// Context, operation state machines, data objects.
    Core,
    /// The pipe-protocol engine driver (gpg).
    Gpg,
    /// The Assuan-protocol engine driver (gpgsm) or the Assuan client.
    Assuan,
    /// Pipes, child processes, descriptor plumbing.
    Transport,
}

/// Closed error kinds, shared by all subsystems.
///
/// The numeric values returned by [`ErrorKind::code`] are stable wire
/// identifiers and must never be reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // ========================================================================
    // Input validation
    // ========================================================================
    /// A caller-supplied argument is out of range or inconsistent.
    InvalidValue,
    /// No usable engine for the selected protocol.
    InvalidEngine,
    /// The input contained no processable data.
    NoData,
    /// An encrypt operation was started with an empty recipient set.
    NoRecipients,
    /// Every supplied recipient was rejected by the engine.
    InvalidRecipients,
    /// No supplied signer key could be used.
    UnusableSecretKey,
    /// A key reference is malformed or names an unusable key.
    InvalidKey,

    // ========================================================================
    // Protocol
    // ========================================================================
    /// The engine answered outside its documented grammar.
    InvalidResponse,
    /// A status or response line exceeded the fixed line length.
    LineTooLong,
    /// The stream ended inside an unterminated line.
    LineNotTerminated,
    /// The engine issued a command the driver cannot honour here.
    UnexpectedCommand,
    /// A status line carried fields that do not parse.
    InvalidStatus,
    /// The engine reported structurally bad input data.
    BadData,

    // ========================================================================
    // Transport
    // ========================================================================
    /// Pipe creation failed.
    PipeError,
    /// Reading from a child descriptor failed.
    ReadError,
    /// Writing to a child descriptor failed.
    WriteError,
    /// Spawning the engine executable failed.
    ExecError,
    /// Connecting to the engine socket failed.
    ConnectFailed,
    /// Accepting on a local control socket failed.
    AcceptFailed,

    // ========================================================================
    // Operation
    // ========================================================================
    /// The ciphertext could not be decrypted.
    DecryptionFailed,
    /// A signature failed verification.
    BadSignature,
    /// The passphrase was missing or repeatedly wrong.
    BadPassphrase,
    /// The signature itself has expired.
    SigExpired,
    /// The signing or certifying key has expired.
    KeyExpired,
    /// The public key needed for verification is not available.
    NoPublicKey,
    /// The key was used against its declared usage flags.
    WrongKeyUsage,
    /// The engine does not support a required algorithm.
    UnsupportedAlgorithm,
    /// The certificate has been revoked.
    CertRevoked,
    /// No CRL is known for the certificate.
    NoCrl,
    /// The available CRL is too old to be usable.
    CrlTooOld,

    // ========================================================================
    // System
    // ========================================================================
    /// Memory allocation failed inside an engine.
    OutOfCore,
    /// The operation was cancelled through the context flag.
    Canceled,
    /// Unclassified failure.
    General,
    /// The facility is not implemented on this platform.
    NotImplemented,
    /// A wait deadline elapsed.
    Timeout,
    /// A file operation failed (errno-style).
    FileError,

    // ========================================================================
    // Sentinel
    // ========================================================================
    /// End of a streaming listing. Not a failure.
    Eof,
}

impl ErrorKind {
    /// Stable numeric identifier for the wire form.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::General => 0x0001,
            ErrorKind::OutOfCore => 0x0002,
            ErrorKind::InvalidValue => 0x0003,
            ErrorKind::ExecError => 0x0004,
            ErrorKind::PipeError => 0x0006,
            ErrorKind::NoData => 0x0007,
            ErrorKind::NotImplemented => 0x0009,
            ErrorKind::ReadError => 0x000a,
            ErrorKind::WriteError => 0x000b,
            ErrorKind::FileError => 0x000c,
            ErrorKind::DecryptionFailed => 0x000d,
            ErrorKind::BadPassphrase => 0x000e,
            ErrorKind::Canceled => 0x000f,
            ErrorKind::InvalidKey => 0x0010,
            ErrorKind::InvalidEngine => 0x0011,
            ErrorKind::NoRecipients => 0x0012,
            ErrorKind::InvalidRecipients => 0x0013,
            ErrorKind::UnusableSecretKey => 0x0109,
            ErrorKind::WrongKeyUsage => 0x0103,
            ErrorKind::CertRevoked => 0x0104,
            ErrorKind::KeyExpired => 0x0105,
            ErrorKind::NoCrl => 0x0106,
            ErrorKind::CrlTooOld => 0x0107,
            ErrorKind::UnsupportedAlgorithm => 0x0300,
            ErrorKind::SigExpired => 0x0301,
            ErrorKind::BadSignature => 0x0302,
            ErrorKind::NoPublicKey => 0x0303,
            ErrorKind::InvalidResponse => 0x0401,
            ErrorKind::LineTooLong => 0x0402,
            ErrorKind::LineNotTerminated => 0x0403,
            ErrorKind::UnexpectedCommand => 0x0404,
            ErrorKind::InvalidStatus => 0x0405,
            ErrorKind::BadData => 0x0406,
            ErrorKind::ConnectFailed => 0x0407,
            ErrorKind::AcceptFailed => 0x0408,
            ErrorKind::Timeout => 0x0409,
            ErrorKind::Eof => 0xffff,
        }
    }

    /// Inverse of [`ErrorKind::code`]. Unknown codes collapse to `General`.
    #[must_use]
    pub fn from_code(code: u32) -> Self {
        match code {
            0x0001 => ErrorKind::General,
            0x0002 => ErrorKind::OutOfCore,
            0x0003 => ErrorKind::InvalidValue,
            0x0004 => ErrorKind::ExecError,
            0x0006 => ErrorKind::PipeError,
            0x0007 => ErrorKind::NoData,
            0x0009 => ErrorKind::NotImplemented,
            0x000a => ErrorKind::ReadError,
            0x000b => ErrorKind::WriteError,
            0x000c => ErrorKind::FileError,
            0x000d => ErrorKind::DecryptionFailed,
            0x000e => ErrorKind::BadPassphrase,
            0x000f => ErrorKind::Canceled,
            0x0010 => ErrorKind::InvalidKey,
            0x0011 => ErrorKind::InvalidEngine,
            0x0012 => ErrorKind::NoRecipients,
            0x0013 => ErrorKind::InvalidRecipients,
            0x0109 => ErrorKind::UnusableSecretKey,
            0x0103 => ErrorKind::WrongKeyUsage,
            0x0104 => ErrorKind::CertRevoked,
            0x0105 => ErrorKind::KeyExpired,
            0x0106 => ErrorKind::NoCrl,
            0x0107 => ErrorKind::CrlTooOld,
            0x0300 => ErrorKind::UnsupportedAlgorithm,
            0x0301 => ErrorKind::SigExpired,
            0x0302 => ErrorKind::BadSignature,
            0x0303 => ErrorKind::NoPublicKey,
            0x0401 => ErrorKind::InvalidResponse,
            0x0402 => ErrorKind::LineTooLong,
            0x0403 => ErrorKind::LineNotTerminated,
            0x0404 => ErrorKind::UnexpectedCommand,
            0x0405 => ErrorKind::InvalidStatus,
            0x0406 => ErrorKind::BadData,
            0x0407 => ErrorKind::ConnectFailed,
            0x0408 => ErrorKind::AcceptFailed,
            0x0409 => ErrorKind::Timeout,
            0xffff => ErrorKind::Eof,
            _ => ErrorKind::General,
        }
    }
}

/// An error raised anywhere inside the runtime.
#[derive(Debug)]
pub struct Error {
    source: ErrorSource,
    kind: ErrorKind,
    detail: Option<Box<str>>,
}

impl Error {
    /// Build an error from a source/kind pair.
    #[must_use]
    pub fn new(source: ErrorSource, kind: ErrorKind) -> Self {
        Self {
            source,
            kind,
            detail: None,
        }
    }

    /// Shorthand for a core-sourced error.
    #[must_use]
    pub fn core(kind: ErrorKind) -> Self {
        Self::new(ErrorSource::Core, kind)
    }

    /// Shorthand for a transport-sourced error.
    #[must_use]
    pub fn transport(kind: ErrorKind) -> Self {
        Self::new(ErrorSource::Transport, kind)
    }

    /// Attach human-readable context (never part of the wire form).
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into().into_boxed_str());
        self
    }

    /// Subsystem that raised the error.
    #[must_use]
    pub fn source_id(&self) -> ErrorSource {
        self.source
    }

    /// Closed error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// True for the streaming-iterator end sentinel.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.kind == ErrorKind::Eof
    }

    /// Packed wire form: source in the top byte, kind code below.
    #[must_use]
    pub fn code(&self) -> u32 {
        let source = match self.source {
            ErrorSource::Core => 0u32,
            ErrorSource::Gpg => 1,
            ErrorSource::Assuan => 2,
            ErrorSource::Transport => 3,
        };
        (source << 24) | self.kind.code()
    }

    /// Rebuild an error from its packed wire form.
    #[must_use]
    pub fn from_code(code: u32) -> Self {
        let source = match code >> 24 {
            1 => ErrorSource::Gpg,
            2 => ErrorSource::Assuan,
            3 => ErrorSource::Transport,
            _ => ErrorSource::Core,
        };
        Self::new(source, ErrorKind::from_code(code & 0x00ff_ffff))
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            kind: self.kind,
            detail: self.detail.clone(),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.kind == other.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            ErrorSource::Core => "core",
            ErrorSource::Gpg => "gpg",
            ErrorSource::Assuan => "assuan",
            ErrorSource::Transport => "transport",
        };
        let what = match self.kind {
            ErrorKind::InvalidValue => "invalid value",
            ErrorKind::InvalidEngine => "invalid engine",
            ErrorKind::NoData => "no data",
            ErrorKind::NoRecipients => "no recipients",
            ErrorKind::InvalidRecipients => "invalid recipients",
            ErrorKind::UnusableSecretKey => "unusable secret key",
            ErrorKind::InvalidKey => "invalid key",
            ErrorKind::InvalidResponse => "invalid engine response",
            ErrorKind::LineTooLong => "line too long",
            ErrorKind::LineNotTerminated => "line not terminated",
            ErrorKind::UnexpectedCommand => "unexpected command",
            ErrorKind::InvalidStatus => "invalid status line",
            ErrorKind::BadData => "bad data",
            ErrorKind::PipeError => "pipe creation failed",
            ErrorKind::ReadError => "read failed",
            ErrorKind::WriteError => "write failed",
            ErrorKind::ExecError => "exec failed",
            ErrorKind::ConnectFailed => "connect failed",
            ErrorKind::AcceptFailed => "accept failed",
            ErrorKind::DecryptionFailed => "decryption failed",
            ErrorKind::BadSignature => "bad signature",
            ErrorKind::BadPassphrase => "bad passphrase",
            ErrorKind::SigExpired => "signature expired",
            ErrorKind::KeyExpired => "key expired",
            ErrorKind::NoPublicKey => "public key not found",
            ErrorKind::WrongKeyUsage => "wrong key usage",
            ErrorKind::UnsupportedAlgorithm => "unsupported algorithm",
            ErrorKind::CertRevoked => "certificate revoked",
            ErrorKind::NoCrl => "no CRL known",
            ErrorKind::CrlTooOld => "CRL too old",
            ErrorKind::OutOfCore => "out of core",
            ErrorKind::Canceled => "canceled",
            ErrorKind::General => "general error",
            ErrorKind::NotImplemented => "not implemented",
            ErrorKind::Timeout => "timeout",
            ErrorKind::FileError => "file error",
            ErrorKind::Eof => "end of stream",
        };
        match &self.detail {
            Some(detail) => write!(f, "{source}: {what}: {detail}"),
            None => write!(f, "{source}: {what}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorKind::FileError
            }
            std::io::ErrorKind::BrokenPipe => ErrorKind::WriteError,
            std::io::ErrorKind::UnexpectedEof => ErrorKind::ReadError,
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::FileError,
        };
        Error::transport(kind).with_detail(err.to_string())
    }
}

/// Convenient alias for API results using the public [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
