// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Genkey state machine.

use crate::error::{Error, ErrorKind, Result};
use crate::ops::results::GenkeyResult;
use crate::ops::OpHost;
use crate::protocol::status::Status;

/// Genkey operation state.
#[derive(Debug, Default)]
pub struct GenkeyOp {
    created: bool,
}

impl GenkeyOp {
    fn result<'a>(host: &'a mut OpHost) -> &'a mut GenkeyResult {
        host.slots.genkey.get_or_insert_with(GenkeyResult::default)
    }

    pub fn on_status(&mut self, host: &mut OpHost, code: Status, args: &str) -> Result<()> {
        match code {
            Status::KeyCreated => {
                // <which> [<fpr>]
                let mut fields = args.split(' ');
                let which = fields.next().unwrap_or("");
                let result = Self::result(host);
                match which {
                    "B" => {
                        result.primary = true;
                        result.sub = true;
                    }
                    "P" => result.primary = true,
                    "S" => result.sub = true,
                    _ => {
                        return Err(Error::core(ErrorKind::InvalidStatus)
                            .with_detail("unknown KEY_CREATED kind"));
                    }
                }
                if let Some(fpr) = fields.next() {
                    if !fpr.is_empty() {
                        result.fingerprint = Some(fpr.to_string());
                    }
                }
                self.created = true;
            }
            Status::KeyNotCreated => {
                self.created = false;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn on_eof(&mut self, host: &mut OpHost) -> Result<()> {
        Self::result(host);
        if !self.created {
            host.defer_failure(Error::core(ErrorKind::General).with_detail("no key created"));
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
        let mut host = OpHost::new(Protocol::OpenPgp, OpKind::Genkey);
        let mut op = GenkeyOp::default();
        for (code, args) in lines {
            op.on_status(&mut host, *code, args).unwrap();
        }
        op.on_eof(&mut host).unwrap();
        host
    }

    #[test]
    fn test_both_keys_created() {
        let host = run(&[(
            Status::KeyCreated,
            "B A0FF4590BB6122EDEF6E3C542D727CC768697734",
        )]);
        assert!(host.failure.is_none());
        let result = host.slots.genkey.unwrap();
        assert!(result.primary && result.sub);
        assert_eq!(
            result.fingerprint.as_deref(),
            Some("A0FF4590BB6122EDEF6E3C542D727CC768697734")
        );
    }

    #[test]
    fn test_primary_only() {
        let host = run(&[(Status::KeyCreated, "P")]);
        let result = host.slots.genkey.unwrap();
        assert!(result.primary);
        assert!(!result.sub);
        assert!(result.fingerprint.is_none());
    }

    #[test]
    fn test_no_key_created_fails() {
        let host = run(&[]);
        assert_eq!(
            host.failure.map(|e| e.kind()),
            Some(ErrorKind::General),
            "EOF without KEY_CREATED is a failure"
        );
    }
}
