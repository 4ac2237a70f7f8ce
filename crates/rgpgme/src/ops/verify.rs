// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Verify state machine.
//!
//! Consumes the signature-verification status stream and accumulates
//! one [`VerifyResult`]. The stream is a run of signature blocks, each
//! opened by `NEWSIG` (newer engines) or directly by one of the
//! `GOODSIG`/`BADSIG`/... lines, followed by detail lines
//! (`VALIDSIG`, `TRUST_*`, notations) for that signature.

use crate::error::{Error, ErrorKind, Result};
use crate::keys::Validity;
use crate::ops::results::{PkaTrust, SigNotation, SigSummary, Signature, VerifyResult};
use crate::ops::{map_engine_error, parse_timestamp, OpHost};
use crate::protocol::escape::percent_decode;
use crate::protocol::status::Status;

/// Verify operation state.
#[derive(Debug, Default)]
pub struct VerifyOp {
    /// Signature currently being populated.
    current: Option<Signature>,
    /// The current signature came from `NEWSIG` and has no detail yet.
    fresh: bool,
    /// A `PLAINTEXT` line was already seen.
    saw_plaintext: bool,
    /// PKA information was already applied to the current signature.
    pka_seen: bool,
}

/// Derive the summary bitset from status, validity and usage flags.
fn calc_summary(sig: &mut Signature) {
    let mut sum = 0u32;

    let checks_out = matches!(
        sig.status,
        None | Some(ErrorKind::SigExpired) | Some(ErrorKind::KeyExpired)
    );
    match sig.validity {
        Validity::Full | Validity::Ultimate => {
            if checks_out {
                sum |= SigSummary::GREEN;
            }
        }
        Validity::Never => {
            if checks_out {
                sum |= SigSummary::RED;
            }
        }
        _ => {
            if sig.status == Some(ErrorKind::BadSignature) {
                sum |= SigSummary::RED;
            }
        }
    }

    match sig.status {
        Some(ErrorKind::SigExpired) => sum |= SigSummary::SIG_EXPIRED,
        Some(ErrorKind::KeyExpired) => sum |= SigSummary::KEY_EXPIRED,
        Some(ErrorKind::NoPublicKey) => sum |= SigSummary::KEY_MISSING,
        Some(ErrorKind::BadSignature) | None => {}
        Some(_) => sum |= SigSummary::SYS_ERROR,
    }

    if sig.validity_reason == Some(ErrorKind::CrlTooOld) && sig.validity == Validity::Unknown {
        sum |= SigSummary::CRL_TOO_OLD;
    }
    if sig.validity_reason == Some(ErrorKind::CertRevoked) {
        sum |= SigSummary::KEY_REVOKED;
    }
    if sig.wrong_key_usage {
        sum |= SigSummary::BAD_POLICY;
    }

    if sum & SigSummary::GREEN != 0 && sum & !SigSummary::GREEN == 0 {
        sum |= SigSummary::VALID;
    }

    sig.summary = SigSummary(sum);
}

fn first_token(args: &str) -> (&str, &str) {
    match args.find(' ') {
        Some(pos) => (&args[..pos], args[pos + 1..].trim_start_matches(' ')),
        None => (args, ""),
    }
}

impl VerifyOp {
    fn result<'a>(host: &'a mut OpHost) -> &'a mut VerifyResult {
        host.slots.verify.get_or_insert_with(VerifyResult::default)
    }

    /// Push the in-flight signature, summary computed.
    fn finish_current(&mut self, host: &mut OpHost) {
        if let Some(mut sig) = self.current.take() {
            calc_summary(&mut sig);
            Self::result(host).signatures.push(sig);
        }
        self.pka_seen = false;
        self.fresh = false;
    }

    /// Begin populating a signature for one of the `*SIG` statuses.
    fn enter_signature(&mut self, host: &mut OpHost) -> &mut Signature {
        if !self.fresh || self.current.is_none() {
            self.finish_current(host);
            self.current = Some(Signature::default());
        }
        self.fresh = false;
        self.current.get_or_insert_with(Signature::default)
    }

    fn current_sig(&mut self) -> Result<&mut Signature> {
        self.fresh = false;
        self.current
            .as_mut()
            .ok_or_else(|| Error::core(ErrorKind::General).with_detail("no signature in flight"))
    }

    pub fn on_status(&mut self, host: &mut OpHost, code: Status, args: &str) -> Result<()> {
        Self::result(host);
        match code {
            Status::NewSig => {
                self.finish_current(host);
                self.current = Some(Signature::default());
                self.fresh = true;
            }

            Status::GoodSig
            | Status::ExpSig
            | Status::ExpKeySig
            | Status::BadSig
            | Status::RevKeySig
            | Status::ErrSig => {
                let (fpr, rest) = first_token(args);
                let sig = self.enter_signature(host);
                sig.fingerprint = fpr.to_string();
                sig.status = match code {
                    Status::GoodSig => None,
                    Status::ExpSig => Some(ErrorKind::SigExpired),
                    Status::ExpKeySig => Some(ErrorKind::KeyExpired),
                    Status::BadSig => Some(ErrorKind::BadSignature),
                    Status::RevKeySig => Some(ErrorKind::CertRevoked),
                    _ => Some(ErrorKind::General),
                };
                if code == Status::ErrSig {
                    // <keyid> <pubkey-algo> <hash-algo> <sig-class>
                    // <timestamp> <rc>
                    let mut fields = rest.split(' ');
                    sig.pubkey_algo = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                    sig.hash_algo = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                    let _sig_class = fields.next();
                    sig.timestamp = fields.next().map(parse_timestamp).unwrap_or(0);
                    sig.status = match fields.next() {
                        Some("4") => Some(ErrorKind::UnsupportedAlgorithm),
                        Some("9") => Some(ErrorKind::NoPublicKey),
                        _ => Some(ErrorKind::General),
                    };
                }
            }

            Status::ValidSig => {
                let sig = self.current_sig()?;
                // <fpr> <sig-date> <timestamp> <expire> <version>
                // <reserved> <pubkey-algo> <hash-algo>
                let mut fields = args.split(' ');
                let fpr = fields.next().unwrap_or("");
                if fpr.is_empty() {
                    return Err(Error::core(ErrorKind::General)
                        .with_detail("VALIDSIG without fingerprint"));
                }
                sig.fingerprint = fpr.to_string();
                let _sig_date = fields.next();
                sig.timestamp = fields.next().map(parse_timestamp).unwrap_or(0);
                sig.exp_timestamp = fields.next().map(parse_timestamp).unwrap_or(0);
                let _version = fields.next();
                let _reserved = fields.next();
                if let Some(algo) = fields.next().and_then(|s| s.parse().ok()) {
                    sig.pubkey_algo = algo;
                }
                if let Some(algo) = fields.next().and_then(|s| s.parse().ok()) {
                    sig.hash_algo = algo;
                }
            }

            Status::NoData | Status::Unexpected => {
                if code == Status::NoData && self.current.is_none() {
                    return Err(Error::core(ErrorKind::NoData));
                }
                self.current_sig()?.status = Some(ErrorKind::NoData);
            }

            Status::NotationName | Status::PolicyUrl => {
                let (payload, _) = first_token(args);
                let decoded = percent_decode(payload.as_bytes());
                let sig = self.current_sig()?;
                match code {
                    Status::NotationName => sig.notations.push(SigNotation {
                        name: Some(decoded),
                        value: Vec::new(),
                    }),
                    _ => sig.notations.push(SigNotation {
                        name: None,
                        value: decoded,
                    }),
                }
            }

            Status::NotationData => {
                let (payload, _) = first_token(args);
                let decoded = percent_decode(payload.as_bytes());
                let sig = self.current_sig()?;
                match sig.notations.last_mut() {
                    Some(notation) if notation.name.is_some() => {
                        notation.value.extend_from_slice(&decoded);
                    }
                    _ => {
                        return Err(Error::core(ErrorKind::General)
                            .with_detail("notation data without a name"));
                    }
                }
            }

            Status::TrustUndefined
            | Status::TrustNever
            | Status::TrustMarginal
            | Status::TrustFully
            | Status::TrustUltimate => {
                let (reason, _) = first_token(args);
                let sig = self.current_sig()?;
                sig.validity = match code {
                    Status::TrustNever => Validity::Never,
                    Status::TrustMarginal => Validity::Marginal,
                    Status::TrustFully | Status::TrustUltimate => Validity::Full,
                    _ => Validity::Unknown,
                };
                if !reason.is_empty() {
                    sig.validity_reason = Some(map_engine_error(reason));
                }
            }

            Status::PkaTrustGood | Status::PkaTrustBad => {
                if self.pka_seen {
                    return Err(Error::core(ErrorKind::InvalidStatus)
                        .with_detail("duplicate PKA status"));
                }
                self.pka_seen = true;
                let (address, _) = first_token(args);
                let sig = self.current_sig()?;
                sig.pka_trust = if code == Status::PkaTrustGood {
                    PkaTrust::Good
                } else {
                    PkaTrust::Bad
                };
                if !address.is_empty() {
                    sig.pka_address = Some(address.to_string());
                }
            }

            Status::Error => {
                // ERROR <where> <code> [...]
                let (where_, rest) = first_token(args);
                let (code_arg, _) = first_token(rest);
                match where_ {
                    "proc_pkt.plaintext" => {
                        return Err(Error::core(ErrorKind::BadData)
                            .with_detail("plaintext processing failed"));
                    }
                    "verify.findkey" => {
                        self.current_sig()?.status = Some(map_engine_error(code_arg));
                    }
                    "verify.keyusage" => {
                        if map_engine_error(code_arg) == ErrorKind::WrongKeyUsage {
                            self.current_sig()?.wrong_key_usage = true;
                        }
                    }
                    other => {
                        log::debug!("[VerifyOp::on_status] informational ERROR at {other}");
                    }
                }
            }

            Status::Plaintext => {
                if self.saw_plaintext {
                    return Err(Error::core(ErrorKind::BadData)
                        .with_detail("second PLAINTEXT in one verification"));
                }
                self.saw_plaintext = true;
                // <format> <timestamp> <filename>
                let mut fields = args.splitn(3, ' ');
                let _format = fields.next();
                let _timestamp = fields.next();
                if let Some(name) = fields.next() {
                    if !name.is_empty() {
                        let decoded = percent_decode(name.as_bytes());
                        Self::result(host).file_name =
                            Some(String::from_utf8_lossy(&decoded).into_owned());
                    }
                }
            }

            _ => {}
        }
        Ok(())
    }

    pub fn on_eof(&mut self, host: &mut OpHost) -> Result<()> {
        if self.fresh
            && self
                .current
                .as_ref()
                .is_some_and(|sig| sig.fingerprint.is_empty() && sig.status.is_none())
        {
            // A trailing NEWSIG with no detail is not a signature.
            self.current = None;
            self.fresh = false;
        }
        self.finish_current(host);
        Ok(())
    }
}
