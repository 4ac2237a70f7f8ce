// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine drivers.
//!
//! An engine is an external cryptographic executable driven as a child
//! process. Two dialects exist: the pipe protocol spoken by `gpg`
//! (command line + status/colon/command descriptors) and the Assuan
//! request/response protocol spoken by `gpgsm --server`. Both drivers
//! present the same [`Engine`] starting surface; everything downstream
//! of a status line is the job of the operation state machines.

/// Assuan client (line dialogue, fd passing).
pub mod assuan;
/// Pipe-protocol driver (gpg).
pub mod gpg;
/// Assuan-protocol driver (gpgsm).
pub mod gpgsm;

use std::process::Command;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{self, EngineInfo};
use crate::data::Data;
use crate::error::{Error, ErrorKind, Result};
use crate::io::{self, posix};
use crate::keys::{Key, KeyRef};
use crate::ops::results::SigMode;
use crate::ops::{OpHost, SharedCallbacks};
use crate::wait::dispatch::Dispatcher;
use crate::wait::{HandlerFlow, IoHandler};
use crate::Protocol;

/// Keylist source selection bits.
pub mod keylist_mode {
    /// Query the local keyring.
    pub const LOCAL: u32 = 1;
    /// Query external sources.
    pub const EXTERN: u32 = 2;
    /// Include signature listings.
    pub const SIGS: u32 = 4;
}

/// Per-operation settings forwarded by the context.
#[derive(Debug, Clone, Default)]
pub(crate) struct OpOptions {
    pub armor: bool,
    pub textmode: bool,
    pub include_certs: i32,
    pub keylist_mode: u32,
}

/// Everything a driver needs besides its own protocol state.
#[derive(Clone)]
pub(crate) struct EngineHandles {
    pub host: Arc<Mutex<OpHost>>,
    pub cbs: SharedCallbacks,
    pub dispatcher: Dispatcher,
    pub info: EngineInfo,
}

/// The operation-starting surface of one engine driver.
///
/// Every method wires the supplied data objects, issues the protocol
/// preamble and returns once the operation is running; completion is
/// delivered through the wait core.
pub(crate) trait Engine: Send {
    fn start_decrypt(&mut self, ciph: Data, plain: Data) -> Result<()>;
    fn start_encrypt(
        &mut self,
        recipients: &[KeyRef],
        plain: Data,
        cipher: Data,
        always_trust: bool,
        opts: &OpOptions,
    ) -> Result<()>;
    fn start_encrypt_sign(
        &mut self,
        recipients: &[KeyRef],
        signers: &[KeyRef],
        plain: Data,
        cipher: Data,
        always_trust: bool,
        opts: &OpOptions,
    ) -> Result<()>;
    fn start_sign(
        &mut self,
        input: Data,
        output: Data,
        mode: SigMode,
        signers: &[KeyRef],
        opts: &OpOptions,
    ) -> Result<()>;
    fn start_verify(
        &mut self,
        sig: Data,
        signed_text: Option<Data>,
        plaintext: Option<Data>,
    ) -> Result<()>;
    fn start_keylist(&mut self, patterns: &[String], secret_only: bool, opts: &OpOptions)
        -> Result<()>;
    fn start_import(&mut self, keydata: Data) -> Result<()>;
    fn start_export(&mut self, patterns: &[String], keydata: Data, opts: &OpOptions)
        -> Result<()>;
    fn start_genkey(&mut self, params: Data, pubkey: Option<Data>, opts: &OpOptions)
        -> Result<()>;
    fn start_edit(&mut self, key: &Key, out: Data, signers: &[KeyRef]) -> Result<()>;
    fn start_trustlist(&mut self, pattern: &str) -> Result<()>;
    fn start_delete(&mut self, key: &Key, allow_secret: bool) -> Result<()>;

    /// Tear the engine down: close descriptors, reap the child.
    fn cancel(&mut self);
}

/// Build the driver for `protocol`.
pub(crate) fn new_engine(protocol: Protocol, handles: EngineHandles) -> Result<Box<dyn Engine>> {
    match protocol {
        Protocol::OpenPgp => Ok(Box::new(gpg::GpgEngine::new(handles))),
        Protocol::Cms => Ok(Box::new(gpgsm::GpgSmEngine::new(handles))),
    }
}

/// Handler pumping a data object into an engine descriptor.
///
/// Closes the descriptor once the source reports end of data, which is
/// how the engine learns the input is complete.
pub(crate) fn data_outbound_handler(mut data: Data) -> IoHandler {
    let mut pending: Vec<u8> = Vec::new();
    Box::new(move |fd| {
        if pending.is_empty() {
            let mut buf = [0u8; 4096];
            let n = data.read(&mut buf).map_err(|err| {
                log::debug!("[data_outbound_handler] source failed on fd {fd}: {err}");
                err
            })?;
            if n == 0 {
                io::close_fd(fd);
                return Ok(HandlerFlow::Remove);
            }
            pending.extend_from_slice(&buf[..n]);
        }
        match posix::write_nonblock(fd, &pending)? {
            Some(written) => {
                pending.drain(..written);
            }
            None => {}
        }
        Ok(HandlerFlow::Continue)
    })
}

/// Handler capturing an engine descriptor into a data object.
pub(crate) fn data_inbound_handler(mut data: Data) -> IoHandler {
    Box::new(move |fd| {
        let mut buf = [0u8; 4096];
        loop {
            match posix::read_nonblock(fd, &mut buf)? {
                Some(0) => {
                    io::close_fd(fd);
                    return Ok(HandlerFlow::Remove);
                }
                Some(n) => {
                    data.write(&buf[..n])?;
                }
                None => return Ok(HandlerFlow::Continue),
            }
        }
    })
}

/// Run `<engine> --version` and extract the version triple token.
///
/// The banner's first line ends in the version ("gpg (GnuPG) 1.4.23").
pub fn query_engine_version(protocol: Protocol) -> Result<String> {
    let info = config::engine_info(protocol);
    let output = Command::new(&info.file_name)
        .arg("--version")
        .output()
        .map_err(|err| {
            Error::core(ErrorKind::InvalidEngine)
                .with_detail(format!("{}: {err}", info.file_name))
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next().unwrap_or("");
    let version = first_line
        .rsplit(' ')
        .next()
        .filter(|v| config::parse_version(v).is_some())
        .ok_or_else(|| {
            Error::core(ErrorKind::InvalidEngine)
                .with_detail(format!("unparsable version banner: {first_line}"))
        })?;
    config::note_engine_version(protocol, version.to_string());
    Ok(version.to_string())
}

/// Check that the installed engine meets the required version.
pub fn engine_check_version(protocol: Protocol) -> Result<()> {
    let info = config::engine_info(protocol);
    let version = match info.version {
        Some(version) => version,
        None => query_engine_version(protocol)?,
    };
    if config::check_version(&version, info.req_version) {
        Ok(())
    } else {
        Err(Error::core(ErrorKind::InvalidEngine).with_detail(format!(
            "{} is {version}, need {}",
            info.file_name, info.req_version
        )))
    }
}
