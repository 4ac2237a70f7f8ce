// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The closed status-token set and the status-line tokenizer.
//!
//! Status notifications arrive on a side channel, one per line, as
//! `[GNUPG:] TOKEN rest` for the pipe engine or as the payload of an
//! Assuan `S TOKEN rest` line. TOKEN is resolved against a pre-sorted
//! static table by binary search; unknown tokens are surfaced to the
//! caller (and logged) but never fail an operation.

/// One status notification kind.
///
/// `Eof` never appears on the wire; the drivers synthesize it to tell a
/// state machine that the status channel closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)] // names mirror the engine's own status words
pub enum Status {
    Abort,
    AlreadySigned,
    BadArmor,
    BadMdc,
    BadSig,
    BadPassphrase,
    BeginDecryption,
    BeginEncryption,
    BeginStream,
    DecryptionFailed,
    DecryptionInfo,
    DecryptionOkay,
    DeleteProblem,
    EncTo,
    EndDecryption,
    EndEncryption,
    EndStream,
    Enter,
    ErrMdc,
    Error,
    ErrSig,
    ExpKeySig,
    ExpSig,
    FileDone,
    FileError,
    FileStart,
    GetBool,
    GetHidden,
    GetLine,
    GoodMdc,
    GoodSig,
    GoodPassphrase,
    GotIt,
    Imported,
    ImportOk,
    ImportProblem,
    ImportRes,
    InvRecp,
    InvSgnr,
    KeyExpired,
    KeyRevoked,
    KeyCreated,
    KeyNotCreated,
    Leave,
    MissingPassphrase,
    NeedPassphrase,
    NeedPassphraseSym,
    NewSig,
    NoData,
    NotationData,
    NotationName,
    NoPubkey,
    NoRecp,
    NoSeckey,
    NoSgnr,
    PkaTrustBad,
    PkaTrustGood,
    Plaintext,
    PolicyUrl,
    Progress,
    RevKeySig,
    RsaOrIdea,
    SessionKey,
    ShmGet,
    ShmGetBool,
    ShmGetHidden,
    ShmInfo,
    SigExpired,
    SigCreated,
    SigId,
    Truncated,
    TrustFully,
    TrustMarginal,
    TrustNever,
    TrustUltimate,
    TrustUndefined,
    Unexpected,
    UseridHint,
    ValidSig,
    /// Synthetic end-of-channel marker, never on the wire.
    Eof,
}

/// Token table, sorted by token byte order for binary search.
static STATUS_TABLE: &[(&str, Status)] = &[
    ("ABORT", Status::Abort),
    ("ALREADY_SIGNED", Status::AlreadySigned),
    ("BADARMOR", Status::BadArmor),
    ("BADMDC", Status::BadMdc),
    ("BADSIG", Status::BadSig),
    ("BAD_PASSPHRASE", Status::BadPassphrase),
    ("BEGIN_DECRYPTION", Status::BeginDecryption),
    ("BEGIN_ENCRYPTION", Status::BeginEncryption),
    ("BEGIN_STREAM", Status::BeginStream),
    ("DECRYPTION_FAILED", Status::DecryptionFailed),
    ("DECRYPTION_INFO", Status::DecryptionInfo),
    ("DECRYPTION_OKAY", Status::DecryptionOkay),
    ("DELETE_PROBLEM", Status::DeleteProblem),
    ("ENC_TO", Status::EncTo),
    ("END_DECRYPTION", Status::EndDecryption),
    ("END_ENCRYPTION", Status::EndEncryption),
    ("END_STREAM", Status::EndStream),
    ("ENTER", Status::Enter),
    ("ERRMDC", Status::ErrMdc),
    ("ERROR", Status::Error),
    ("ERRSIG", Status::ErrSig),
    ("EXPKEYSIG", Status::ExpKeySig),
    ("EXPSIG", Status::ExpSig),
    ("FILE_DONE", Status::FileDone),
    ("FILE_ERROR", Status::FileError),
    ("FILE_START", Status::FileStart),
    ("GET_BOOL", Status::GetBool),
    ("GET_HIDDEN", Status::GetHidden),
    ("GET_LINE", Status::GetLine),
    ("GOODMDC", Status::GoodMdc),
    ("GOODSIG", Status::GoodSig),
    ("GOOD_PASSPHRASE", Status::GoodPassphrase),
    ("GOT_IT", Status::GotIt),
    ("IMPORTED", Status::Imported),
    ("IMPORT_OK", Status::ImportOk),
    ("IMPORT_PROBLEM", Status::ImportProblem),
    ("IMPORT_RES", Status::ImportRes),
    ("INV_RECP", Status::InvRecp),
    ("INV_SGNR", Status::InvSgnr),
    ("KEYEXPIRED", Status::KeyExpired),
    ("KEYREVOKED", Status::KeyRevoked),
    ("KEY_CREATED", Status::KeyCreated),
    ("KEY_NOT_CREATED", Status::KeyNotCreated),
    ("LEAVE", Status::Leave),
    ("MISSING_PASSPHRASE", Status::MissingPassphrase),
    ("NEED_PASSPHRASE", Status::NeedPassphrase),
    ("NEED_PASSPHRASE_SYM", Status::NeedPassphraseSym),
    ("NEWSIG", Status::NewSig),
    ("NODATA", Status::NoData),
    ("NOTATION_DATA", Status::NotationData),
    ("NOTATION_NAME", Status::NotationName),
    ("NO_PUBKEY", Status::NoPubkey),
    ("NO_RECP", Status::NoRecp),
    ("NO_SECKEY", Status::NoSeckey),
    ("NO_SGNR", Status::NoSgnr),
    ("PKA_TRUST_BAD", Status::PkaTrustBad),
    ("PKA_TRUST_GOOD", Status::PkaTrustGood),
    ("PLAINTEXT", Status::Plaintext),
    ("POLICY_URL", Status::PolicyUrl),
    ("PROGRESS", Status::Progress),
    ("REVKEYSIG", Status::RevKeySig),
    ("RSA_OR_IDEA", Status::RsaOrIdea),
    ("SESSION_KEY", Status::SessionKey),
    ("SHM_GET", Status::ShmGet),
    ("SHM_GET_BOOL", Status::ShmGetBool),
    ("SHM_GET_HIDDEN", Status::ShmGetHidden),
    ("SHM_INFO", Status::ShmInfo),
    ("SIGEXPIRED", Status::SigExpired),
    ("SIG_CREATED", Status::SigCreated),
    ("SIG_ID", Status::SigId),
    ("TRUNCATED", Status::Truncated),
    ("TRUST_FULLY", Status::TrustFully),
    ("TRUST_MARGINAL", Status::TrustMarginal),
    ("TRUST_NEVER", Status::TrustNever),
    ("TRUST_ULTIMATE", Status::TrustUltimate),
    ("TRUST_UNDEFINED", Status::TrustUndefined),
    ("UNEXPECTED", Status::Unexpected),
    ("USERID_HINT", Status::UseridHint),
    ("VALIDSIG", Status::ValidSig),
];

impl Status {
    /// Resolve a bare token against the closed set.
    #[must_use]
    pub fn lookup(token: &str) -> Option<Status> {
        STATUS_TABLE
            .binary_search_by(|(name, _)| (*name).cmp(token))
            .ok()
            .map(|idx| STATUS_TABLE[idx].1)
    }

    /// Wire spelling of the token; `Eof` has none.
    #[must_use]
    pub fn token(self) -> &'static str {
        if self == Status::Eof {
            return "";
        }
        STATUS_TABLE
            .iter()
            .find(|(_, code)| *code == self)
            .map_or("", |(name, _)| name)
    }
}

/// A status line resolved to its token and the argument tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine<'a> {
    /// Resolved token.
    pub status: Status,
    /// Everything after the token, leading space stripped.
    pub args: &'a str,
}

/// Outcome of feeding one status-channel line to the tokenizer.
#[derive(Debug, PartialEq, Eq)]
pub enum StatusParse<'a> {
    /// A well-formed notification.
    Line(StatusLine<'a>),
    /// The token is not in the closed set; carried for logging.
    Unknown(&'a str),
    /// Not a status line at all (missing prefix, empty).
    Skip,
}

/// The prefix every pipe-engine status line carries.
pub const GNUPG_PREFIX: &str = "[GNUPG:]";

/// Tokenize one status line.
///
/// With `require_prefix`, lines lacking `[GNUPG:] ` are skipped (the
/// pipe engine's status fd also carries unrelated diagnostics); without
/// it, the bare `TOKEN rest` form of an Assuan `S` payload is parsed.
#[must_use]
pub fn parse_status_line(line: &str, require_prefix: bool) -> StatusParse<'_> {
    let rest = if require_prefix {
        match line.strip_prefix(GNUPG_PREFIX) {
            Some(rest) => rest.trim_start_matches(' '),
            None => return StatusParse::Skip,
        }
    } else {
        line
    };
    if rest.is_empty() {
        return StatusParse::Skip;
    }
    let (token, args) = match rest.find(' ') {
        Some(pos) => (&rest[..pos], rest[pos + 1..].trim_start_matches(' ')),
        None => (rest, ""),
    };
    match Status::lookup(token) {
        Some(status) => StatusParse::Line(StatusLine { status, args }),
        None => StatusParse::Unknown(token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted_and_unique() {
        for pair in STATUS_TABLE.windows(2) {
            assert!(
                pair[0].0 < pair[1].0,
                "table out of order: {} >= {}",
                pair[0].0,
                pair[1].0
            );
        }
    }

    #[test]
    fn test_every_token_resolves() {
        for (name, code) in STATUS_TABLE {
            assert_eq!(Status::lookup(name), Some(*code), "lookup failed for {name}");
            assert_eq!(code.token(), *name);
        }
    }

    #[test]
    fn test_parse_with_prefix() {
        let parsed = parse_status_line("[GNUPG:] GOODSIG 1234ABCD Joe Tester", true);
        assert_eq!(
            parsed,
            StatusParse::Line(StatusLine {
                status: Status::GoodSig,
                args: "1234ABCD Joe Tester",
            })
        );
    }

    #[test]
    fn test_parse_without_args() {
        let parsed = parse_status_line("[GNUPG:] NEWSIG", true);
        assert_eq!(
            parsed,
            StatusParse::Line(StatusLine {
                status: Status::NewSig,
                args: "",
            })
        );
    }

    #[test]
    fn test_non_status_line_skipped() {
        assert_eq!(parse_status_line("gpg: some diagnostic", true), StatusParse::Skip);
        assert_eq!(parse_status_line("", true), StatusParse::Skip);
    }

    #[test]
    fn test_unknown_token_surfaced() {
        assert_eq!(
            parse_status_line("[GNUPG:] FRILL 1 2 3", true),
            StatusParse::Unknown("FRILL")
        );
    }

    #[test]
    fn test_bare_form_for_assuan() {
        let parsed = parse_status_line("IMPORT_RES 1 0 1", false);
        assert_eq!(
            parsed,
            StatusParse::Line(StatusLine {
                status: Status::ImportRes,
                args: "1 0 1",
            })
        );
    }

    #[test]
    fn test_eof_has_no_wire_spelling() {
        assert_eq!(Status::Eof.token(), "");
        assert_eq!(Status::lookup(""), None);
    }
}
