// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Encrypt state machine.

use crate::error::{Error, ErrorKind, Result};
use crate::ops::results::EncryptResult;
use crate::ops::sign::parse_invalid_key;
use crate::ops::OpHost;
use crate::protocol::escape::{percent_decode, xml_escape_into};
use crate::protocol::status::Status;

/// Encrypt operation state.
#[derive(Debug, Default)]
pub struct EncryptOp {
    no_valid_recipients: bool,
    /// `INV_RECP` notifications seen on the status stream. Rejections
    /// collected during Assuan recipient assertion live only in the
    /// result record and do not fail the operation.
    invalid_seen: usize,
}

impl EncryptOp {
    fn result<'a>(host: &'a mut OpHost) -> &'a mut EncryptResult {
        host.slots.encrypt.get_or_insert_with(EncryptResult::default)
    }

    /// Append one invalid-recipient report to the operation info.
    fn append_xml(host: &mut OpHost, args: &str) {
        host.op_info_open();
        let mut fields = args.splitn(2, ' ');
        let reason: u32 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let name = fields.next().unwrap_or("");

        host.op_info.extend_from_slice(
            b"  <encryption>\n    <error>\n      <invalidRecipient/>\n",
        );
        host.op_info
            .extend_from_slice(format!("      <reason>{reason}</reason>\n").as_bytes());
        host.op_info.extend_from_slice(b"      <name>");
        let decoded = percent_decode(name.as_bytes());
        let mut escaped = Vec::new();
        xml_escape_into(&mut escaped, &decoded);
        host.op_info.extend_from_slice(&escaped);
        host.op_info
            .extend_from_slice(b"</name>\n    </error>\n  </encryption>\n");
    }

    pub fn on_status(&mut self, host: &mut OpHost, code: Status, args: &str) -> Result<()> {
        Self::result(host);
        match code {
            Status::InvRecp => {
                self.invalid_seen += 1;
                Self::result(host)
                    .invalid_recipients
                    .push(parse_invalid_key(args));
                Self::append_xml(host, args);
            }
            Status::NoRecp => self.no_valid_recipients = true,
            _ => {}
        }
        Ok(())
    }

    pub fn on_eof(&mut self, host: &mut OpHost) -> Result<()> {
        Self::result(host);
        host.op_info_close();
        if self.no_valid_recipients {
            host.defer_failure(Error::core(ErrorKind::NoRecipients));
        } else if self.invalid_seen > 0 {
            host.defer_failure(Error::core(ErrorKind::InvalidRecipients));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpKind;
    use crate::Protocol;

    fn run(lines: &[(Status, &str)]) -> OpHost {
        let mut host = OpHost::new(Protocol::OpenPgp, OpKind::Encrypt);
        let mut op = EncryptOp::default();
        for (code, args) in lines {
            op.on_status(&mut host, *code, args).unwrap();
        }
        op.on_eof(&mut host).unwrap();
        host
    }

    #[test]
    fn test_clean_encrypt() {
        let host = run(&[
            (Status::BeginEncryption, ""),
            (Status::EndEncryption, ""),
        ]);
        assert!(host.failure.is_none());
        assert!(host.op_info.is_empty(), "no info without problems");
    }

    #[test]
    fn test_invalid_recipient_collected() {
        let host = run(&[(Status::InvRecp, "1 nosuch@example.net")]);
        assert_eq!(
            host.failure.as_ref().map(crate::error::Error::kind),
            Some(ErrorKind::InvalidRecipients)
        );
        let result = host.slots.encrypt.as_ref().unwrap();
        assert_eq!(result.invalid_recipients.len(), 1);
        assert_eq!(result.invalid_recipients[0].reason, 1);
        assert_eq!(result.invalid_recipients[0].fingerprint, "nosuch@example.net");

        let info = String::from_utf8(host.op_info.clone()).unwrap();
        assert!(info.starts_with("<GnupgOperationInfo>"), "info was: {info}");
        assert!(info.contains("<reason>1</reason>"), "info was: {info}");
        assert!(info.contains("<name>nosuch@example.net</name>"), "info was: {info}");
        assert!(info.ends_with("</GnupgOperationInfo>\n"), "info was: {info}");
    }

    #[test]
    fn test_no_recipients_beats_invalid() {
        let host = run(&[
            (Status::InvRecp, "0 one@example.net"),
            (Status::NoRecp, "0"),
        ]);
        assert_eq!(
            host.failure.map(|e| e.kind()),
            Some(ErrorKind::NoRecipients)
        );
    }

    #[test]
    fn test_xml_escapes_recipient_name() {
        let host = run(&[(Status::InvRecp, "3 a<b>&c")]);
        let info = String::from_utf8(host.op_info).unwrap();
        assert!(info.contains("<name>a&lt;b&gt;&amp;c</name>"), "info was: {info}");
    }
}
