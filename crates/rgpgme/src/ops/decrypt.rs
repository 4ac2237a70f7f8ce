// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decrypt state machine.

use crate::error::{Error, ErrorKind, Result};
use crate::ops::results::{DecryptResult, Recipient};
use crate::ops::{map_engine_error, OpHost};
use crate::protocol::escape::percent_decode;
use crate::protocol::status::Status;

/// Decrypt operation state.
#[derive(Debug, Default)]
pub struct DecryptOp {
    okay: bool,
    failed: bool,
}

impl DecryptOp {
    fn result<'a>(host: &'a mut OpHost) -> &'a mut DecryptResult {
        host.slots.decrypt.get_or_insert_with(DecryptResult::default)
    }

    pub fn on_status(&mut self, host: &mut OpHost, code: Status, args: &str) -> Result<()> {
        let result = Self::result(host);
        match code {
            Status::DecryptionOkay => self.okay = true,
            Status::DecryptionFailed => self.failed = true,

            Status::EncTo => {
                // <keyid> <pubkey-algo> <keylen>
                let mut fields = args.split(' ');
                let keyid = fields.next().unwrap_or("");
                if keyid.is_empty() {
                    return Err(Error::core(ErrorKind::InvalidStatus)
                        .with_detail("ENC_TO without key id"));
                }
                let pubkey_algo = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                result.recipients.push(Recipient {
                    keyid: keyid.to_string(),
                    pubkey_algo,
                    status: None,
                });
            }

            Status::NoSeckey => {
                let keyid = args.split(' ').next().unwrap_or("");
                for recipient in &mut result.recipients {
                    if recipient.keyid == keyid {
                        recipient.status = Some(ErrorKind::UnusableSecretKey);
                    }
                }
            }

            Status::Error => {
                // ERROR <where> <code> [<what>]
                let mut fields = args.splitn(3, ' ');
                let where_ = fields.next().unwrap_or("");
                let code_arg = fields.next().unwrap_or("");
                match where_ {
                    "decrypt.algorithm" => {
                        if map_engine_error(code_arg) == ErrorKind::UnsupportedAlgorithm {
                            if let Some(algo) = fields.next() {
                                result.unsupported_algorithm = Some(algo.to_string());
                            }
                        }
                    }
                    "decrypt.keyusage" => {
                        if map_engine_error(code_arg) == ErrorKind::WrongKeyUsage {
                            result.wrong_key_usage = true;
                        }
                    }
                    other => {
                        log::debug!("[DecryptOp::on_status] informational ERROR at {other}");
                    }
                }
            }

            Status::Plaintext => {
                let mut fields = args.splitn(3, ' ');
                let _format = fields.next();
                let _timestamp = fields.next();
                if let Some(name) = fields.next() {
                    if !name.is_empty() {
                        let decoded = percent_decode(name.as_bytes());
                        result.file_name =
                            Some(String::from_utf8_lossy(&decoded).into_owned());
                    }
                }
            }

            _ => {}
        }
        Ok(())
    }

    pub fn on_eof(&mut self, host: &mut OpHost) -> Result<()> {
        Self::result(host);
        if self.failed {
            host.defer_failure(Error::core(ErrorKind::DecryptionFailed));
        } else if !self.okay {
            host.defer_failure(Error::core(ErrorKind::NoData));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpKind;
    use crate::Protocol;

    fn run(lines: &[(Status, &str)]) -> (OpHost, DecryptOp) {
        let mut host = OpHost::new(Protocol::OpenPgp, OpKind::Decrypt);
        let mut op = DecryptOp::default();
        for (code, args) in lines {
            op.on_status(&mut host, *code, args).unwrap();
        }
        op.on_eof(&mut host).unwrap();
        (host, op)
    }

    #[test]
    fn test_successful_decrypt_with_recipient() {
        let (host, _) = run(&[
            (Status::EncTo, "AABBCCDD11223344 1 0"),
            (Status::BeginDecryption, ""),
            (Status::DecryptionOkay, ""),
            (Status::GoodMdc, ""),
            (Status::EndDecryption, ""),
        ]);
        assert!(host.failure.is_none(), "successful decrypt must not fail");
        let result = host.slots.decrypt.unwrap();
        assert_eq!(result.recipients.len(), 1);
        assert_eq!(result.recipients[0].keyid, "AABBCCDD11223344");
        assert_eq!(result.recipients[0].pubkey_algo, 1);
        assert!(result.recipients[0].status.is_none(), "recipient is usable");
    }

    #[test]
    fn test_decryption_failed() {
        let (host, _) = run(&[
            (Status::EncTo, "AABBCCDD11223344 16 0"),
            (Status::DecryptionFailed, ""),
        ]);
        assert_eq!(
            host.failure.map(|e| e.kind()),
            Some(ErrorKind::DecryptionFailed)
        );
    }

    #[test]
    fn test_no_decryption_status_is_no_data() {
        let (host, _) = run(&[(Status::EncTo, "AABBCCDD11223344 16 0")]);
        assert_eq!(host.failure.map(|e| e.kind()), Some(ErrorKind::NoData));
    }

    #[test]
    fn test_no_seckey_marks_recipient() {
        let (host, _) = run(&[
            (Status::EncTo, "AABBCCDD11223344 16 0"),
            (Status::EncTo, "5566778899AABBCC 1 0"),
            (Status::NoSeckey, "AABBCCDD11223344"),
            (Status::DecryptionOkay, ""),
        ]);
        let result = host.slots.decrypt.unwrap();
        assert_eq!(
            result.recipients[0].status,
            Some(ErrorKind::UnusableSecretKey)
        );
        assert!(result.recipients[1].status.is_none());
    }

    #[test]
    fn test_unsupported_algorithm_recorded() {
        let (host, _) = run(&[
            (Status::Error, "decrypt.algorithm unsupported_algorithm TWOFISH"),
            (Status::DecryptionFailed, ""),
        ]);
        let result = host.slots.decrypt.unwrap();
        assert_eq!(result.unsupported_algorithm.as_deref(), Some("TWOFISH"));
    }

    #[test]
    fn test_plaintext_file_name() {
        let (host, _) = run(&[
            (Status::Plaintext, "62 1069689600 secret%20plan.txt"),
            (Status::DecryptionOkay, ""),
        ]);
        let result = host.slots.decrypt.unwrap();
        assert_eq!(result.file_name.as_deref(), Some("secret plan.txt"));
    }
}
