// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Edit (interactive key editing) state machine.
//!
//! The engine's prompts (`GET_BOOL`/`GET_LINE`/`GET_HIDDEN`) are
//! answered by the driver's command channel; everything else on the
//! status stream is forwarded to the caller's edit callback so it can
//! follow the dialogue. The callback also receives the synthetic
//! end-of-stream marker.

use crate::error::Result;
use crate::ops::{OpHost, SharedCallbacks};
use crate::protocol::status::Status;

/// Edit operation state.
pub struct EditOp {
    cbs: SharedCallbacks,
}

impl EditOp {
    pub(crate) fn new(cbs: SharedCallbacks) -> Self {
        Self { cbs }
    }

    pub fn on_status(&mut self, _host: &mut OpHost, code: Status, args: &str) -> Result<()> {
        let mut edit = self.cbs.edit.lock();
        if let Some(cb) = edit.as_mut() {
            // Informational forward; replies only matter for GET_*
            // prompts, which arrive through the command channel.
            let _ = cb(code, args)?;
        }
        Ok(())
    }

    pub fn on_eof(&mut self, host: &mut OpHost) -> Result<()> {
        self.on_status(host, Status::Eof, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpKind;
    use crate::Protocol;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_statuses_forwarded_to_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cbs = SharedCallbacks::default();
        *cbs.edit.lock() = Some(Box::new(move |code, args| {
            sink.lock().push((code, args.to_string()));
            Ok(None)
        }));

        let mut host = OpHost::new(Protocol::OpenPgp, OpKind::Edit);
        let mut op = EditOp::new(cbs);
        op.on_status(&mut host, Status::GotIt, "").unwrap();
        op.on_status(&mut host, Status::GoodSig, "FPR").unwrap();
        op.on_eof(&mut host).unwrap();

        let log = seen.lock();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].0, Status::GotIt);
        assert_eq!(log[2].0, Status::Eof, "EOF marker must reach the callback");
    }

    #[test]
    fn test_callback_error_aborts() {
        let cbs = SharedCallbacks::default();
        *cbs.edit.lock() = Some(Box::new(|_, _| {
            Err(crate::error::Error::core(crate::error::ErrorKind::Canceled))
        }));
        let mut host = OpHost::new(Protocol::OpenPgp, OpKind::Edit);
        let mut op = EditOp::new(cbs);
        assert!(op.on_status(&mut host, Status::GotIt, "").is_err());
    }
}
