// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime configuration - single source of truth.
//!
//! Compile-time constants live here, and so does the runtime-swappable
//! table of engine executables. Resolution order for each engine path:
//!
//! 1. an explicit [`set_engine_info`] call,
//! 2. the environment (`RGPGME_GPG`, `RGPGME_GPGSM`),
//! 3. the bare executable name, found through `PATH`.
//!
//! `GNUPGHOME` is forwarded untouched; the runtime never invents a
//! home directory.

use std::sync::Arc;

use arc_swap::ArcSwap;
use std::sync::OnceLock;

use crate::Protocol;

/// Minimum engine version the pipe driver is tested against.
pub const NEED_GPG_VERSION: &str = "1.2.2";
/// Minimum engine version the Assuan driver is tested against.
pub const NEED_GPGSM_VERSION: &str = "0.9.0";

/// Environment override for the OpenPGP engine executable.
pub const ENV_GPG: &str = "RGPGME_GPG";
/// Environment override for the CMS engine executable.
pub const ENV_GPGSM: &str = "RGPGME_GPGSM";

/// Resolved description of one engine.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    /// Protocol family the engine serves.
    pub protocol: Protocol,
    /// Executable path or name (resolved through `PATH`).
    pub file_name: String,
    /// Version reported by the engine; filled in lazily at first use.
    pub version: Option<String>,
    /// Minimum version this runtime requires.
    pub req_version: &'static str,
    /// Home directory override, forwarded as `--homedir`.
    pub home_dir: Option<String>,
}

#[derive(Debug, Clone)]
struct EngineDefaults {
    gpg: EngineInfo,
    gpgsm: EngineInfo,
}

fn defaults() -> &'static ArcSwap<EngineDefaults> {
    static DEFAULTS: OnceLock<ArcSwap<EngineDefaults>> = OnceLock::new();
    DEFAULTS.get_or_init(|| {
        ArcSwap::from_pointee(EngineDefaults {
            gpg: EngineInfo {
                protocol: Protocol::OpenPgp,
                file_name: std::env::var(ENV_GPG).unwrap_or_else(|_| "gpg".to_string()),
                version: None,
                req_version: NEED_GPG_VERSION,
                home_dir: None,
            },
            gpgsm: EngineInfo {
                protocol: Protocol::Cms,
                file_name: std::env::var(ENV_GPGSM).unwrap_or_else(|_| "gpgsm".to_string()),
                version: None,
                req_version: NEED_GPGSM_VERSION,
                home_dir: None,
            },
        })
    })
}

/// Current engine description for `protocol`.
#[must_use]
pub fn engine_info(protocol: Protocol) -> EngineInfo {
    let current = defaults().load();
    match protocol {
        Protocol::OpenPgp => current.gpg.clone(),
        Protocol::Cms => current.gpgsm.clone(),
    }
}

/// Both engine descriptions, OpenPGP first.
#[must_use]
pub fn engine_info_all() -> Vec<EngineInfo> {
    let current = defaults().load();
    vec![current.gpg.clone(), current.gpgsm.clone()]
}

/// Replace the executable (and optional home directory) used for
/// `protocol` from now on. Running contexts keep their engine.
pub fn set_engine_info(protocol: Protocol, file_name: impl Into<String>, home_dir: Option<String>) {
    let file_name = file_name.into();
    let current = defaults().load_full();
    let mut next = (*current).clone();
    let slot = match protocol {
        Protocol::OpenPgp => &mut next.gpg,
        Protocol::Cms => &mut next.gpgsm,
    };
    slot.file_name = file_name;
    slot.home_dir = home_dir;
    slot.version = None;
    defaults().store(Arc::new(next));
}

/// Record the version string an engine reported (lazy discovery).
pub(crate) fn note_engine_version(protocol: Protocol, version: String) {
    let current = defaults().load_full();
    let mut next = (*current).clone();
    let slot = match protocol {
        Protocol::OpenPgp => &mut next.gpg,
        Protocol::Cms => &mut next.gpgsm,
    };
    slot.version = Some(version);
    defaults().store(Arc::new(next));
}

/// Parse a dotted version triple; trailing garbage after the micro
/// number is tolerated the way the engines' own banners need it.
#[must_use]
pub fn parse_version(s: &str) -> Option<(u32, u32, u32)> {
    let mut parts = s.splitn(3, '.');
    let major: u32 = parts.next()?.trim().parse().ok()?;
    let minor: u32 = parts.next()?.trim().parse().ok()?;
    let micro_raw = parts.next()?;
    let micro_digits: String = micro_raw.chars().take_while(char::is_ascii_digit).collect();
    let micro: u32 = micro_digits.parse().ok()?;
    Some((major, minor, micro))
}

/// True when `version` satisfies `required` by the dotted-triple rule.
#[must_use]
pub fn check_version(version: &str, required: &str) -> bool {
    match (parse_version(version), parse_version(required)) {
        (Some(have), Some(want)) => have >= want,
        _ => false,
    }
}
