// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Trustlist state machine: parser over trust-path colon records.

use std::sync::Arc;

use crate::error::Result;
use crate::keys::{TrustItem, TrustKind};
use crate::ops::OpHost;
use crate::protocol::status::Status;
use crate::wait::WaitEvent;

/// Trustlist operation state.
#[derive(Debug, Default)]
pub struct TrustlistOp;

impl TrustlistOp {
    pub fn on_status(&mut self, _host: &mut OpHost, _code: Status, _args: &str) -> Result<()> {
        Ok(())
    }

    pub fn on_colon(&mut self, host: &mut OpHost, line: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(line);
        let fields: Vec<&str> = line.split(':').collect();

        // level:keyid:kind::owner-trust:validity:::name
        let level = match fields.first().and_then(|s| s.parse().ok()) {
            Some(level) => level,
            None => {
                log::debug!("[TrustlistOp::on_colon] skipping record without level");
                return Ok(());
            }
        };
        let keyid = fields.get(1).copied().unwrap_or("").to_string();
        let kind = match fields.get(2).copied() {
            Some("K") => TrustKind::Key,
            Some("U") => TrustKind::UserId,
            other => {
                log::debug!("[TrustlistOp::on_colon] unknown item kind {other:?}");
                return Ok(());
            }
        };
        let owner_trust = fields
            .get(4)
            .and_then(|s| s.chars().next())
            .unwrap_or(' ');
        let validity = fields
            .get(5)
            .and_then(|s| s.chars().next())
            .unwrap_or(' ');
        let name = fields.get(8).and_then(|s| {
            if s.is_empty() {
                None
            } else {
                Some((*s).to_string())
            }
        });

        let item = Arc::new(TrustItem {
            level,
            keyid,
            kind,
            owner_trust,
            validity,
            name,
        });
        host.trust_items.push_back(item.clone());
        host.events.push(WaitEvent::NextTrustItem(item));
        Ok(())
    }

    pub fn on_eof(&mut self, _host: &mut OpHost) -> Result<()> {
        Ok(())
    }
}
