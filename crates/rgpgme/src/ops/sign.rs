// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sign state machine.

use crate::error::{Error, ErrorKind, Result};
use crate::ops::results::{InvalidKey, NewSignature, SigMode, SignResult};
use crate::ops::{parse_timestamp, OpHost};
use crate::protocol::escape::percent_decode;
use crate::protocol::status::Status;

/// Sign operation state.
#[derive(Debug, Default)]
pub struct SignOp;

/// Parse one `SIG_CREATED` argument list.
///
/// `<mode-char> <pubkey-algo> <hash-algo> <class> <timestamp> <fpr>`
fn parse_sig_created(args: &str) -> Result<NewSignature> {
    let bad = || Error::core(ErrorKind::InvalidEngine).with_detail("malformed SIG_CREATED");
    let mut fields = args.split(' ');

    let mode = match fields.next() {
        Some("S") => SigMode::Normal,
        Some("D") => SigMode::Detach,
        Some("C") => SigMode::Clear,
        _ => return Err(bad()),
    };
    let pubkey_algo = fields.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
    let hash_algo = fields.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
    let class = fields
        .next()
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or_else(bad)?;
    let timestamp = fields.next().map(parse_timestamp).ok_or_else(bad)?;
    let fingerprint = fields.next().ok_or_else(bad)?.to_string();

    Ok(NewSignature {
        mode,
        pubkey_algo,
        hash_algo,
        class,
        timestamp,
        fingerprint,
    })
}

/// Parse an `INV_RECP` / `INV_SGNR` argument list: `<reason> <name>`.
pub(crate) fn parse_invalid_key(args: &str) -> InvalidKey {
    let mut fields = args.splitn(2, ' ');
    let reason = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let name = fields.next().unwrap_or("");
    InvalidKey {
        fingerprint: String::from_utf8_lossy(&percent_decode(name.as_bytes())).into_owned(),
        reason,
    }
}

impl SignOp {
    fn result<'a>(host: &'a mut OpHost) -> &'a mut SignResult {
        host.slots.sign.get_or_insert_with(SignResult::default)
    }

    pub fn on_status(&mut self, host: &mut OpHost, code: Status, args: &str) -> Result<()> {
        let result = Self::result(host);
        match code {
            Status::SigCreated => {
                result.signatures.push(parse_sig_created(args)?);
            }
            Status::InvRecp | Status::InvSgnr => {
                result.invalid_signers.push(parse_invalid_key(args));
            }
            _ => {}
        }
        Ok(())
    }

    pub fn on_eof(&mut self, host: &mut OpHost) -> Result<()> {
        let result = Self::result(host);
        if !result.invalid_signers.is_empty() {
            host.defer_failure(Error::core(ErrorKind::UnusableSecretKey));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpKind;
    use crate::Protocol;

    const FPR: &str = "3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E";

    fn run(lines: &[(Status, &str)]) -> OpHost {
        let mut host = OpHost::new(Protocol::Cms, OpKind::Sign);
        let mut op = SignOp;
        for (code, args) in lines {
            op.on_status(&mut host, *code, args).unwrap();
        }
        op.on_eof(&mut host).unwrap();
        host
    }

    #[test]
    fn test_normal_signature_created() {
        let args = format!("S 1 2 00 1069689600 {FPR}");
        let host = run(&[(Status::SigCreated, &args)]);
        assert!(host.failure.is_none());

        let result = host.slots.sign.unwrap();
        assert_eq!(result.signatures.len(), 1);
        let sig = &result.signatures[0];
        assert_eq!(sig.mode, SigMode::Normal);
        assert_eq!(sig.pubkey_algo, 1, "RSA");
        assert_eq!(sig.hash_algo, 2, "SHA1");
        assert_eq!(sig.class, 0);
        assert_eq!(sig.fingerprint, FPR);
    }

    #[test]
    fn test_detached_and_clear_modes() {
        for (mode_char, mode) in [("D", SigMode::Detach), ("C", SigMode::Clear)] {
            let args = format!("{mode_char} 17 8 01 1069689600 {FPR}");
            let host = run(&[(Status::SigCreated, &args)]);
            assert_eq!(host.slots.sign.unwrap().signatures[0].mode, mode);
        }
    }

    #[test]
    fn test_malformed_sig_created_is_engine_error() {
        let mut host = OpHost::new(Protocol::OpenPgp, OpKind::Sign);
        let mut op = SignOp;
        let err = op
            .on_status(&mut host, Status::SigCreated, "X 1 2 00 0 FPR")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEngine);
    }

    #[test]
    fn test_invalid_signer_fails_operation() {
        let host = run(&[(Status::InvSgnr, "9 joe@example.net")]);
        assert_eq!(
            host.failure.map(|e| e.kind()),
            Some(ErrorKind::UnusableSecretKey)
        );
        let result = host.slots.sign.unwrap();
        assert_eq!(result.invalid_signers.len(), 1);
        assert_eq!(result.invalid_signers[0].reason, 9);
        assert_eq!(result.invalid_signers[0].fingerprint, "joe@example.net");
    }

    #[test]
    fn test_signature_class_is_hex() {
        let args = format!("S 1 2 1F 1069689600 {FPR}");
        let host = run(&[(Status::SigCreated, &args)]);
        assert_eq!(host.slots.sign.unwrap().signatures[0].class, 0x1f);
    }
}
