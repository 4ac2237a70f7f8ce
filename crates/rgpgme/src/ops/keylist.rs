// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Keylist state machine: parser over the colon-record channel.
//!
//! Record types: `pub|sec|crt|crs` open a new key block, `sub|ssb` add
//! a subkey, `uid` adds a user id, `fpr` carries the fingerprint (and
//! for certificates the chain id) of the last started (sub)key. A new
//! primary record flushes the finished key to the context's key queue
//! and the process-wide cache.

use std::sync::Arc;

use crate::error::Result;
use crate::keys::{self, cache, Key, KeyFlags, Subkey, Validity};
use crate::ops::results::KeylistResult;
use crate::ops::OpHost;
use crate::protocol::escape::decode_c_string;
use crate::protocol::status::Status;
use crate::wait::WaitEvent;
use crate::Protocol;

/// Keylist operation state.
#[derive(Debug, Default)]
pub struct KeylistOp {
    /// Key currently being assembled.
    tmp_key: Option<Key>,
}

fn set_status_letters(flags: &mut KeyFlags, field: &str) {
    for c in field.chars() {
        if c.is_ascii_digit() {
            break;
        }
        match c {
            'e' => flags.expired = true,
            'r' => flags.revoked = true,
            'd' => flags.disabled = true,
            'i' => flags.invalid = true,
            _ => {}
        }
    }
}

fn set_capability_letters(key: &mut Key, subkey_idx: usize, field: &str) {
    for c in field.chars() {
        match c {
            'e' => key.subkeys[subkey_idx].flags.can_encrypt = true,
            's' => key.subkeys[subkey_idx].flags.can_sign = true,
            'c' => key.subkeys[subkey_idx].flags.can_certify = true,
            'a' => key.subkeys[subkey_idx].flags.can_authenticate = true,
            'E' => key.flags.can_encrypt = true,
            'S' => key.flags.can_sign = true,
            'C' => key.flags.can_certify = true,
            'A' => key.flags.can_authenticate = true,
            _ => {}
        }
    }
}

fn decode_field(field: &str) -> String {
    String::from_utf8_lossy(&decode_c_string(field.as_bytes())).into_owned()
}

impl KeylistOp {
    fn result<'a>(host: &'a mut OpHost) -> &'a mut KeylistResult {
        host.slots.keylist.get_or_insert_with(KeylistResult::default)
    }

    /// Flush the assembled key to the queue, the cache and the event
    /// stream.
    fn finish_key(&mut self, host: &mut OpHost) {
        if let Some(key) = self.tmp_key.take() {
            let key = Arc::new(key);
            cache::add(&key);
            host.keys.push_back(key.clone());
            host.events.push(WaitEvent::NextKey(key));
        }
    }

    pub fn on_status(&mut self, host: &mut OpHost, code: Status, _args: &str) -> Result<()> {
        if code == Status::Truncated {
            Self::result(host).truncated = true;
        }
        Ok(())
    }

    pub fn on_colon(&mut self, host: &mut OpHost, line: &[u8]) -> Result<()> {
        Self::result(host);
        let line = String::from_utf8_lossy(line);
        let fields: Vec<&str> = line.split(':').collect();
        let rectype = fields.first().copied().unwrap_or("");

        match rectype {
            "pub" | "sec" | "crt" | "crs" => {
                self.finish_key(host);
                let secret = rectype == "sec" || rectype == "crs";
                let mut key = Key {
                    protocol: if rectype.starts_with("cr") {
                        Protocol::Cms
                    } else {
                        host.protocol
                    },
                    secret,
                    ..Key::default()
                };
                let mut primary = Subkey {
                    secret,
                    ..Subkey::default()
                };
                if let Some(trust) = fields.get(1) {
                    set_status_letters(&mut primary.flags, trust);
                }
                if let Some(len) = fields.get(2).and_then(|s| s.parse().ok()) {
                    if len > 1 {
                        primary.length = len;
                    }
                }
                if let Some(algo) = fields.get(3).and_then(|s| s.parse().ok()) {
                    if (1..128).contains(&algo) {
                        primary.algo = algo;
                    }
                }
                if let Some(keyid) = fields.get(4) {
                    if keyid.len() == 16 {
                        primary.keyid = (*keyid).to_string();
                    }
                }
                if let Some(ts) = fields.get(5) {
                    primary.timestamp = crate::ops::parse_timestamp(ts);
                }
                if let Some(exp) = fields.get(6) {
                    primary.expires = crate::ops::parse_timestamp(exp);
                }
                if let Some(serial) = fields.get(7) {
                    if !serial.is_empty() {
                        key.issuer_serial = Some((*serial).to_string());
                    }
                }
                if let Some(otrust) = fields.get(8).and_then(|s| s.chars().next()) {
                    key.owner_trust = Validity::from_letter(otrust);
                }
                if let Some(issuer) = fields.get(9) {
                    if !issuer.is_empty() {
                        key.issuer_name = Some(decode_field(issuer));
                    }
                }
                key.subkeys.push(primary);
                if let Some(caps) = fields.get(11) {
                    set_capability_letters(&mut key, 0, caps);
                }
                key.flags.revoked |= key.subkeys[0].flags.revoked;
                key.flags.expired |= key.subkeys[0].flags.expired;
                key.flags.disabled |= key.subkeys[0].flags.disabled;
                key.flags.invalid |= key.subkeys[0].flags.invalid;
                self.tmp_key = Some(key);
            }

            "sub" | "ssb" => {
                if let Some(key) = self.tmp_key.as_mut() {
                    let mut sub = Subkey {
                        secret: rectype == "ssb",
                        ..Subkey::default()
                    };
                    if let Some(trust) = fields.get(1) {
                        set_status_letters(&mut sub.flags, trust);
                    }
                    if let Some(len) = fields.get(2).and_then(|s| s.parse().ok()) {
                        if len > 1 {
                            sub.length = len;
                        }
                    }
                    if let Some(algo) = fields.get(3).and_then(|s| s.parse().ok()) {
                        if (1..128).contains(&algo) {
                            sub.algo = algo;
                        }
                    }
                    if let Some(keyid) = fields.get(4) {
                        if keyid.len() == 16 {
                            sub.keyid = (*keyid).to_string();
                        }
                    }
                    if let Some(ts) = fields.get(5) {
                        sub.timestamp = crate::ops::parse_timestamp(ts);
                    }
                    if let Some(exp) = fields.get(6) {
                        sub.expires = crate::ops::parse_timestamp(exp);
                    }
                    key.subkeys.push(sub);
                    let idx = key.subkeys.len() - 1;
                    if let Some(caps) = fields.get(11) {
                        set_capability_letters(key, idx, caps);
                    }
                }
            }

            "uid" => {
                if let Some(key) = self.tmp_key.as_mut() {
                    if let Some(raw) = fields.get(9) {
                        let mut uid =
                            keys::make_user_id(key.protocol, decode_field(raw));
                        if let Some(trust) = fields.get(1) {
                            for c in trust.chars() {
                                if c.is_ascii_digit() {
                                    break;
                                }
                                match c {
                                    'r' => uid.revoked = true,
                                    'i' => uid.invalid = true,
                                    'n' | 'm' | 'f' | 'u' => {
                                        uid.validity = Validity::from_letter(c);
                                    }
                                    _ => {}
                                }
                            }
                        }
                        key.user_ids.push(uid);
                    }
                }
            }

            "fpr" => {
                if let Some(key) = self.tmp_key.as_mut() {
                    if let Some(fpr) = fields.get(9) {
                        if !fpr.is_empty() {
                            if let Some(sub) =
                                key.subkeys.iter_mut().rev().find(|s| s.fingerprint.is_none())
                            {
                                sub.fingerprint = Some((*fpr).to_string());
                            }
                        }
                    }
                    if let Some(chain) = fields.get(12) {
                        if !chain.is_empty() {
                            key.chain_id = Some((*chain).to_string());
                        }
                    }
                }
            }

            "sig" => {
                // Signature listings are not modelled on keys.
                log::trace!("[KeylistOp::on_colon] skipping sig record");
            }

            other => {
                log::trace!("[KeylistOp::on_colon] skipping record type {other}");
            }
        }
        Ok(())
    }

    /// The colon channel (or the whole operation) finished.
    pub fn on_eof(&mut self, host: &mut OpHost) -> Result<()> {
        Self::result(host);
        self.finish_key(host);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpKind;

    fn run(protocol: Protocol, records: &[&str]) -> OpHost {
        let mut host = OpHost::new(protocol, OpKind::Keylist);
        let mut op = KeylistOp::default();
        for record in records {
            op.on_colon(&mut host, record.as_bytes()).unwrap();
        }
        op.on_eof(&mut host).unwrap();
        host
    }

    #[test]
    fn test_single_pgp_key() {
        let mut host = run(
            Protocol::OpenPgp,
            &[
                "pub:u:1024:17:6C7EE1B8621CC013:1069689600:::u:::scESC:",
                "fpr:::::::::A0FF4590BB6122EDEF6E3C542D727CC768697734:",
                "uid:u::::1069689600::B21DEAB4F875FB3DA42F1D1D139563682A020D0A::Joe Tester (demo) <joe@example.net>:",
                "sub:u:1024:16:61EE841A2A27EB983B3B3C26413F4AF31AFDAB6C:1069689600::::::e:",
                "fpr:::::::::34090D3E6A82DA2BD38886FE61EE841A2A27EB98:",
            ],
        );

        assert_eq!(host.keys.len(), 1);
        let key = host.keys.pop_front().unwrap();
        assert_eq!(
            key.fingerprint(),
            Some("A0FF4590BB6122EDEF6E3C542D727CC768697734")
        );
        assert_eq!(key.subkeys.len(), 2);
        assert_eq!(key.subkeys[0].keyid, "6C7EE1B8621CC013");
        assert_eq!(key.subkeys[0].algo, 17);
        assert_eq!(key.subkeys[0].length, 1024);
        assert!(key.flags.can_sign && key.flags.can_encrypt && key.flags.can_certify);
        assert!(key.subkeys[0].flags.can_sign, "lowercase s applies to primary");
        assert!(key.subkeys[1].flags.can_encrypt, "subkey capability");
        assert_eq!(
            key.subkeys[1].fingerprint.as_deref(),
            Some("34090D3E6A82DA2BD38886FE61EE841A2A27EB98")
        );
        assert_eq!(key.owner_trust, Validity::Ultimate);
        assert_eq!(key.user_ids.len(), 1);
        assert_eq!(key.user_ids[0].name, "Joe Tester");
        assert_eq!(key.user_ids[0].comment, "demo");
        assert_eq!(key.user_ids[0].email, "joe@example.net");
        assert_eq!(key.user_ids[0].validity, Validity::Ultimate);
    }

    #[test]
    fn test_secret_listing_marks_secret() {
        let mut host = run(
            Protocol::OpenPgp,
            &[
                "sec:u:1024:17:6C7EE1B8621CC013:1069689600:::u:::scESC:",
                "fpr:::::::::A0FF4590BB6122EDEF6E3C542D727CC768697734:",
            ],
        );
        let key = host.keys.pop_front().unwrap();
        assert!(key.secret);
        assert!(key.subkeys[0].secret);
    }

    #[test]
    fn test_cms_certificates_with_chain() {
        let issuer_fpr = "DFA56FB5FC41E3A8921F77AD1622EEFD9F1B5AD8";
        let chain_fpr = format!("fpr:::::::::2C8F3C356AB761CB3674835B792CDA652E33C285:::{issuer_fpr}:");
        let issuer_rec = format!("fpr:::::::::{issuer_fpr}:");
        let mut host = run(
            Protocol::Cms,
            &[
                "crs:u:1024:1:::::::::scESC:",
                "fpr:::::::::3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E:",
                "uid:u::::::::CN=test cert 1,OU=Aegypten Project,O=g10 Code GmbH,C=DE::",
                "crt:u:2048:1:::::::::c:",
                &issuer_rec,
                "uid:u::::::::<certify@pca.dfn.de>::",
                "crt:u:2048:1:::::::::e:",
                &chain_fpr,
                "uid:u::::::::CN=DFN Server,O=DFN,C=DE::",
            ],
        );

        assert_eq!(host.keys.len(), 3);
        let first = host.keys.pop_front().unwrap();
        assert_eq!(first.protocol, Protocol::Cms);
        assert!(first.secret, "crs records carry the secret part");
        assert!(first.user_ids[0].name.contains("test cert 1"));

        let second = host.keys.pop_front().unwrap();
        assert_eq!(second.user_ids[0].email, "<certify@pca.dfn.de>");
        assert_eq!(second.fingerprint(), Some(issuer_fpr));

        let third = host.keys.pop_front().unwrap();
        assert_eq!(
            third.chain_id.as_deref(),
            Some(issuer_fpr),
            "chain id points at the issuing certificate"
        );
    }

    #[test]
    fn test_uid_escape_decoding() {
        let mut host = run(
            Protocol::OpenPgp,
            &[
                "pub:u:1024:17:6C7EE1B8621CC013:1069689600:::u:::scESC:",
                "uid:u::::::::A colon \\x3a here <x@example.net>:",
            ],
        );
        let key = host.keys.pop_front().unwrap();
        assert_eq!(key.user_ids[0].name, "A colon : here");
    }

    #[test]
    fn test_uid_flags() {
        let mut host = run(
            Protocol::OpenPgp,
            &[
                "pub:u:1024:17:6C7EE1B8621CC013:1069689600:::u:::scESC:",
                "uid:r::::::::Revoked <r@example.net>:",
                "uid:f::::::::Valid <f@example.net>:",
            ],
        );
        let key = host.keys.pop_front().unwrap();
        assert!(key.user_ids[0].revoked);
        assert_eq!(key.user_ids[1].validity, Validity::Full);
        assert!(!key.user_ids[1].revoked);
    }

    #[test]
    fn test_truncated_status() {
        let mut host = OpHost::new(Protocol::OpenPgp, OpKind::Keylist);
        let mut op = KeylistOp::default();
        op.on_status(&mut host, Status::Truncated, "1").unwrap();
        op.on_eof(&mut host).unwrap();
        assert!(host.slots.keylist.unwrap().truncated);
    }

    #[test]
    fn test_keys_are_cached_by_fingerprint() {
        let fpr = "A0FF4590BB6122EDEF6E3C542D727CC768697734";
        let mut host = run(
            Protocol::OpenPgp,
            &[
                "pub:u:1024:17:6C7EE1B8621CC013:1069689600:::u:::scESC:",
                &format!("fpr:::::::::{fpr}:"),
            ],
        );
        let listed = host.keys.pop_front().unwrap();
        let cached = cache::get(fpr).expect("listed key must be cached");
        assert!(Arc::ptr_eq(&listed, &cached));
    }
}
