// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delete state machine.

use crate::error::{Error, ErrorKind, Result};
use crate::ops::OpHost;
use crate::protocol::status::Status;

/// Delete operation state.
#[derive(Debug, Default)]
pub struct DeleteOp;

impl DeleteOp {
    pub fn on_status(&mut self, host: &mut OpHost, code: Status, args: &str) -> Result<()> {
        if code == Status::DeleteProblem {
            // 1: no such key, 2: secret key must go first, 3: ambiguous.
            let kind = match args.split(' ').next() {
                Some("1") => ErrorKind::NoPublicKey,
                _ => ErrorKind::InvalidKey,
            };
            host.defer_failure(Error::core(kind));
        }
        Ok(())
    }

    pub fn on_eof(&mut self, _host: &mut OpHost) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpKind;
    use crate::Protocol;

    #[test]
    fn test_no_such_key() {
        let mut host = OpHost::new(Protocol::OpenPgp, OpKind::Delete);
        let mut op = DeleteOp;
        op.on_status(&mut host, Status::DeleteProblem, "1").unwrap();
        op.on_eof(&mut host).unwrap();
        assert_eq!(host.failure.map(|e| e.kind()), Some(ErrorKind::NoPublicKey));
    }

    #[test]
    fn test_secret_first_is_invalid_key() {
        let mut host = OpHost::new(Protocol::OpenPgp, OpKind::Delete);
        let mut op = DeleteOp;
        op.on_status(&mut host, Status::DeleteProblem, "2").unwrap();
        assert_eq!(host.failure.map(|e| e.kind()), Some(ErrorKind::InvalidKey));
    }

    #[test]
    fn test_clean_delete() {
        let mut host = OpHost::new(Protocol::OpenPgp, OpKind::Delete);
        let mut op = DeleteOp;
        op.on_eof(&mut host).unwrap();
        assert!(host.failure.is_none());
    }
}
