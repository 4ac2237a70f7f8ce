// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Key, user-id and trust-item model.
//!
//! Keys are immutable once the listing machine finished populating
//! them and are shared by reference ([`KeyRef`] = `Arc<Key>`): the
//! process-wide cache holds strong references, callers hold their own,
//! and eviction never invalidates anything a caller still owns.

/// Process-wide fingerprint-to-key cache.
pub mod cache;

use std::sync::Arc;

use crate::Protocol;

/// Validity of a key, user-id or trust relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validity {
    /// Nothing is known.
    #[default]
    Unknown,
    /// Validity is undefined in the trust database.
    Undefined,
    /// Explicitly never valid.
    Never,
    /// Marginally valid.
    Marginal,
    /// Fully valid.
    Full,
    /// Ultimately valid (own key).
    Ultimate,
}

impl Validity {
    /// Parse the single-letter form used by colon records.
    #[must_use]
    pub fn from_letter(letter: char) -> Self {
        match letter {
            'q' => Validity::Undefined,
            'n' => Validity::Never,
            'm' => Validity::Marginal,
            'f' => Validity::Full,
            'u' => Validity::Ultimate,
            _ => Validity::Unknown,
        }
    }
}

/// Status and capability flags shared by subkeys and whole keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyFlags {
    pub revoked: bool,
    pub expired: bool,
    pub disabled: bool,
    pub invalid: bool,
    pub can_encrypt: bool,
    pub can_sign: bool,
    pub can_certify: bool,
    pub can_authenticate: bool,
}

/// One primary key or subkey.
#[derive(Debug, Clone, Default)]
pub struct Subkey {
    /// Hex fingerprint; may be absent on exotic listings.
    pub fingerprint: Option<String>,
    /// 16-hex long key id.
    pub keyid: String,
    /// Public-key algorithm number as reported by the engine.
    pub algo: u32,
    /// Key length in bits.
    pub length: u32,
    /// Creation time, seconds since the epoch; -1 invalid, 0 unavailable.
    pub timestamp: i64,
    /// Expiry time; 0 means it does not expire.
    pub expires: i64,
    /// Status and capability flags.
    pub flags: KeyFlags,
    /// Whether the secret part is available.
    pub secret: bool,
}

/// One user id with its parsed parts.
#[derive(Debug, Clone, Default)]
pub struct UserId {
    /// The raw string as listed by the engine.
    pub raw: String,
    /// Parsed name part; empty when absent.
    pub name: String,
    /// Parsed email part; empty when absent. CMS user-ids keep the
    /// angle brackets, OpenPGP ones do not.
    pub email: String,
    /// Parsed comment part; empty when absent.
    pub comment: String,
    /// Validity of this user id.
    pub validity: Validity,
    pub revoked: bool,
    pub invalid: bool,
}

/// A primary key with subkeys and user ids.
#[derive(Debug, Clone, Default)]
pub struct Key {
    /// Protocol family the key belongs to.
    pub protocol: Protocol,
    /// Whether a secret part is available for the primary.
    pub secret: bool,
    /// Owner trust (OpenPGP only).
    pub owner_trust: Validity,
    /// Aggregated flags: capability letters in upper case and the
    /// primary's status.
    pub flags: KeyFlags,
    /// X.509 issuer serial (CMS only).
    pub issuer_serial: Option<String>,
    /// X.509 issuer DN (CMS only).
    pub issuer_name: Option<String>,
    /// Certificate chain id (CMS only).
    pub chain_id: Option<String>,
    /// Primary first, then subkeys in listing order.
    pub subkeys: Vec<Subkey>,
    /// User ids in listing order.
    pub user_ids: Vec<UserId>,
}

/// Shared reference to an immutable key.
pub type KeyRef = Arc<Key>;

impl Key {
    /// The primary subkey, if the listing produced one.
    #[must_use]
    pub fn primary(&self) -> Option<&Subkey> {
        self.subkeys.first()
    }

    /// Fingerprint of the primary subkey.
    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.primary().and_then(|sk| sk.fingerprint.as_deref())
    }

    /// Identifier used when naming the key on an engine command line:
    /// the primary fingerprint, falling back to the long key id.
    #[must_use]
    pub fn spec(&self) -> Option<&str> {
        match self.fingerprint() {
            Some(fpr) => Some(fpr),
            None => self.primary().map(|sk| sk.keyid.as_str()),
        }
    }
}

/// Kind of a trust-database item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustKind {
    /// The item describes a key.
    Key,
    /// The item describes a user id.
    UserId,
}

/// One record of the trust-path listing.
#[derive(Debug, Clone)]
pub struct TrustItem {
    /// Distance from the target key.
    pub level: i32,
    /// 16-hex key id.
    pub keyid: String,
    /// Whether the record names a key or a user id.
    pub kind: TrustKind,
    /// Owner-trust letter.
    pub owner_trust: char,
    /// Validity letter.
    pub validity: char,
    /// Display name for user-id items.
    pub name: Option<String>,
}

/// Shared reference to an immutable trust item.
pub type TrustItemRef = Arc<TrustItem>;

/// Split an OpenPGP user id into name, email and comment.
///
/// Scans for the first `<email>` and `(comment)` groups, treating
/// everything else as the name; nested brackets collapse the way the
/// engine's own listing code treats them.
#[must_use]
pub fn parse_user_id(raw: &str) -> (String, String, String) {
    let mut name = None::<String>;
    let mut email = None::<String>;
    let mut comment = None::<String>;

    let bytes: Vec<char> = raw.chars().collect();
    let mut in_email = 0usize;
    let mut in_comment = 0usize;
    let mut in_name = false;
    let mut start = 0usize;

    for (i, &c) in bytes.iter().enumerate() {
        if in_email > 0 {
            if c == '<' {
                in_email += 1;
            } else if c == '>' {
                in_email -= 1;
                if in_email == 0 && email.is_none() {
                    email = Some(bytes[start..i].iter().collect());
                }
            }
        } else if in_comment > 0 {
            if c == '(' {
                in_comment += 1;
            } else if c == ')' {
                in_comment -= 1;
                if in_comment == 0 && comment.is_none() {
                    comment = Some(bytes[start..i].iter().collect());
                }
            }
        } else if c == '<' {
            if in_name && name.is_none() {
                name = Some(bytes[start..i].iter().collect());
            }
            in_name = false;
            in_email = 1;
            start = i + 1;
        } else if c == '(' {
            if in_name && name.is_none() {
                name = Some(bytes[start..i].iter().collect());
            }
            in_name = false;
            in_comment = 1;
            start = i + 1;
        } else if !in_name && c != ' ' && c != '\t' {
            in_name = true;
            start = i;
        }
    }
    if in_name && name.is_none() {
        name = Some(bytes[start..].iter().collect());
    }

    (
        name.map(|s| s.trim_end().to_string()).unwrap_or_default(),
        email.unwrap_or_default(),
        comment.unwrap_or_default(),
    )
}

/// Split a CMS user id.
///
/// A DN stays whole in the name; only a pure `<addr>` form is an
/// email, kept with its brackets the way the engine lists it.
#[must_use]
pub fn parse_x509_user_id(raw: &str) -> (String, String, String) {
    if raw.starts_with('<') && raw.ends_with('>') && raw.len() >= 2 {
        (String::new(), raw.to_string(), String::new())
    } else {
        (raw.to_string(), String::new(), String::new())
    }
}

/// Build a [`UserId`] for the given protocol, parsing the raw string.
#[must_use]
pub fn make_user_id(protocol: Protocol, raw: String) -> UserId {
    let (name, email, comment) = match protocol {
        Protocol::OpenPgp => parse_user_id(&raw),
        Protocol::Cms => parse_x509_user_id(&raw),
    };
    UserId {
        raw,
        name,
        email,
        comment,
        validity: Validity::Unknown,
        revoked: false,
        invalid: false,
    }
}

/// Name of a public-key algorithm number, engine numbering.
#[must_use]
pub fn pubkey_algo_name(algo: u32) -> Option<&'static str> {
    match algo {
        1 => Some("RSA"),
        2 => Some("RSA-E"),
        3 => Some("RSA-S"),
        16 => Some("ELG-E"),
        17 => Some("DSA"),
        20 => Some("ELG"),
        _ => None,
    }
}

/// Name of a hash algorithm number, engine numbering.
#[must_use]
pub fn hash_algo_name(algo: u32) -> Option<&'static str> {
    match algo {
        1 => Some("MD5"),
        2 => Some("SHA1"),
        3 => Some("RIPEMD160"),
        5 => Some("MD2"),
        6 => Some("TIGER192"),
        7 => Some("HAVAL"),
        8 => Some("SHA256"),
        9 => Some("SHA384"),
        10 => Some("SHA512"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_user_id() {
        let (name, email, comment) = parse_user_id("Joe Tester (dummy) <joe@example.net>");
        assert_eq!(name, "Joe Tester");
        assert_eq!(comment, "dummy");
        assert_eq!(email, "joe@example.net");
    }

    #[test]
    fn test_parse_name_only() {
        let (name, email, comment) = parse_user_id("Just A Name");
        assert_eq!(name, "Just A Name");
        assert_eq!(email, "");
        assert_eq!(comment, "");
    }

    #[test]
    fn test_parse_email_only() {
        let (name, email, comment) = parse_user_id("<solo@example.net>");
        assert_eq!(name, "");
        assert_eq!(email, "solo@example.net");
        assert_eq!(comment, "");
    }

    #[test]
    fn test_first_group_wins() {
        let (name, email, _) = parse_user_id("A <one@x> <two@x>");
        assert_eq!(name, "A");
        assert_eq!(email, "one@x", "only the first email group is taken");
    }

    #[test]
    fn test_x509_email_keeps_brackets() {
        let (name, email, _) = parse_x509_user_id("<certify@pca.dfn.de>");
        assert_eq!(name, "");
        assert_eq!(email, "<certify@pca.dfn.de>");
    }

    #[test]
    fn test_x509_dn_stays_name() {
        let dn = "CN=DFN Top Level CA,OU=DFN-PCA,O=DFN-Verein,C=DE";
        let (name, email, _) = parse_x509_user_id(dn);
        assert_eq!(name, dn);
        assert_eq!(email, "");
    }

    #[test]
    fn test_validity_letters() {
        assert_eq!(Validity::from_letter('f'), Validity::Full);
        assert_eq!(Validity::from_letter('u'), Validity::Ultimate);
        assert_eq!(Validity::from_letter('n'), Validity::Never);
        assert_eq!(Validity::from_letter('m'), Validity::Marginal);
        assert_eq!(Validity::from_letter('q'), Validity::Undefined);
        assert_eq!(Validity::from_letter('?'), Validity::Unknown);
    }

    #[test]
    fn test_key_spec_prefers_fingerprint() {
        let mut key = Key::default();
        key.subkeys.push(Subkey {
            fingerprint: Some("ABCD".into()),
            keyid: "0123456789ABCDEF".into(),
            ..Subkey::default()
        });
        assert_eq!(key.spec(), Some("ABCD"));

        key.subkeys[0].fingerprint = None;
        assert_eq!(key.spec(), Some("0123456789ABCDEF"));
    }
}
