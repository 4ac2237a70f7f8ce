// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pipe-protocol driver for the OpenPGP engine.
//!
//! The driver accumulates an argument list mixing literal arguments
//! and data references, then spawns the engine with one pipe per data
//! reference plus the status pipe, an optional colon pipe (machine
//! readable listings, dup'ed onto the child's stdout) and an optional
//! command pipe for interactive operations.
//!
//! ```text
//!               +--------------------------- gpg ----+
//!  argv ------> | --status-fd N --no-tty ...         |
//!               |                                    |
//!  status  <----| N       (parsed line by line)      |
//!  colon   <----| stdout  (keylist/trustlist only)   |
//!  command ---->| M       (--command-fd M)           |
//!  data in/out <|-> per-operation pipes              |
//!               +------------------------------------+
//! ```
//!
//! Every inbound byte is framed by a [`LineBuffer`]; parsed status
//! lines feed the passphrase/progress subprotocols and then the
//! operation's state machine.

use std::ffi::OsString;
use std::os::fd::RawFd;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::data::Data;
use crate::engine::{
    data_inbound_handler, data_outbound_handler, keylist_mode, Engine, EngineHandles, OpOptions,
};
use crate::error::{Error, ErrorKind, ErrorSource, Result};
use crate::io::{self, posix};
use crate::keys::{Key, KeyRef};
use crate::ops::results::SigMode;
use crate::ops::{passphrase_status, progress_status, OpMachine, PassphraseRequest};
use crate::protocol::escape::percent_decode;
use crate::protocol::line::LineBuffer;
use crate::protocol::status::{parse_status_line, Status, StatusParse};
use crate::wait::{Direction, HandlerFlow, WaitEvent};

/// One pending argument: literal text or a data reference.
enum Arg {
    Literal(OsString),
    Data(DataSpec),
}

struct DataSpec {
    data: Data,
    /// True when the engine writes and we read.
    inbound: bool,
    /// Descriptor number the child must see it at; `None` puts the
    /// child-side number on the command line.
    dup_to: Option<RawFd>,
    /// Use the plain number instead of the `-&N` special form.
    print_fd: bool,
    /// Couple this (inbound) stream with the command channel.
    linked: bool,
}

/// State shared with the I/O handlers after spawn.
struct Shared {
    handles: EngineHandles,
    machine: Option<OpMachine>,
    child: Option<posix::SpawnedEngine>,
    /// Parent-side descriptors still open.
    open_fds: Vec<RawFd>,
    /// Command channel (we write), -1 when unused.
    cmd_fd: RawFd,
    /// Inbound data stream coupled with the command channel.
    linked_fd: RawFd,
    linked_data: Option<Data>,
    status_eof: bool,
    colon_used: bool,
    colon_eof: bool,
    finished: bool,
}

impl Shared {
    fn forget_fd(&mut self, fd: RawFd) {
        self.open_fds.retain(|&open| open != fd);
        if self.cmd_fd == fd {
            self.cmd_fd = -1;
        }
        if self.linked_fd == fd {
            self.linked_fd = -1;
        }
    }

    /// Close every parent-side descriptor and reap the child.
    fn teardown(&mut self) {
        let fds = std::mem::take(&mut self.open_fds);
        for fd in fds {
            io::close_fd(fd);
        }
        self.cmd_fd = -1;
        self.linked_fd = -1;
        if let Some(mut child) = self.child.take() {
            child.kill();
        }
    }

    /// Flush queued listing events to an external loop.
    fn drain_events(&mut self) {
        let events: Vec<WaitEvent> = {
            let mut host = self.handles.host.lock();
            host.events.drain(..).collect()
        };
        for event in events {
            self.handles.dispatcher.emit(event);
        }
    }

    /// Mark the operation failed and tear everything down.
    fn fail(&mut self, err: &Error) {
        if self.finished {
            return;
        }
        self.finished = true;
        log::debug!("[GpgEngine] operation failed: {err}");
        {
            let mut host = self.handles.host.lock();
            host.done = Some(Some(err.clone()));
        }
        self.teardown();
        self.handles.dispatcher.finish(Some(err.clone()));
    }

    /// All protocol channels reached EOF: finalize the machine and
    /// report the outcome.
    fn maybe_finalize(&mut self) {
        if self.finished || !self.status_eof || (self.colon_used && !self.colon_eof) {
            return;
        }
        self.finished = true;
        let outcome = {
            let mut host = self.handles.host.lock();
            let mut machine = self.machine.take();
            let machine_result = match machine.as_mut() {
                Some(machine) => machine.on_eof(&mut host),
                None => Ok(()),
            };
            let outcome = match machine_result {
                Err(err) => Some(err),
                Ok(()) => host.failure.take(),
            };
            host.done = Some(outcome.clone());
            outcome
        };
        self.drain_events();
        if let Some(mut child) = self.child.take() {
            // The engine closed its side; one join reaps it.
            let _ = child.wait(true);
        }
        self.handles.dispatcher.finish(outcome);
    }

    /// Handle one complete status line.
    fn process_status_line(&mut self, line: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(line);
        let parsed = parse_status_line(&text, true);
        match parsed {
            StatusParse::Skip => Ok(()),
            StatusParse::Unknown(token) => {
                log::debug!("[GpgEngine::status] unknown status token {token}");
                Ok(())
            }
            StatusParse::Line(status_line) => {
                let code = status_line.status;
                let args = status_line.args;
                #[cfg(feature = "trace")]
                log::trace!("[GpgEngine::status] {code:?} {args}");
                if self.cmd_fd >= 0
                    && matches!(code, Status::GetBool | Status::GetLine | Status::GetHidden)
                {
                    return self.handle_command(code, args);
                }
                if code == Status::EndStream && self.cmd_fd >= 0 {
                    let fd = self.cmd_fd;
                    self.forget_fd(fd);
                    io::close_fd(fd);
                }

                progress_status(&self.handles.cbs, code, args);
                let result = {
                    let mut host = self.handles.host.lock();
                    passphrase_status(&mut host, code, args);
                    let mut machine = self.machine.take();
                    let result = match machine.as_mut() {
                        Some(machine) => machine.on_status(&mut host, code, args),
                        None => Ok(()),
                    };
                    self.machine = machine;
                    result
                };
                self.drain_events();
                result
            }
        }
    }

    /// Answer a `GET_BOOL`/`GET_LINE`/`GET_HIDDEN` prompt.
    fn handle_command(&mut self, code: Status, keyword: &str) -> Result<()> {
        // Drain the coupled inbound stream before blocking on the
        // reply write, otherwise the engine may deadlock on a full
        // pipe.
        if self.linked_fd >= 0 {
            if let Some(mut data) = self.linked_data.clone() {
                let mut buf = [0u8; 4096];
                while let Some(n) = posix::read_nonblock(self.linked_fd, &mut buf)? {
                    if n == 0 {
                        break;
                    }
                    data.write(&buf[..n])?;
                }
            }
        }

        let passphrase_prompt = keyword.starts_with("passphrase.");
        let mut reply: Option<Option<String>> = None;
        if passphrase_prompt {
            let request = {
                let host = self.handles.host.lock();
                PassphraseRequest {
                    description: host.passphrase.description.clone(),
                    prev_attempt_failed: host.passphrase.last_was_bad,
                }
            };
            let mut slot = self.handles.cbs.passphrase.lock();
            if let Some(cb) = slot.as_mut() {
                match cb(&request)? {
                    Some(value) => reply = Some(Some(value)),
                    None => {
                        return Err(Error::core(ErrorKind::Canceled)
                            .with_detail("passphrase callback declined"));
                    }
                }
            }
        }
        if reply.is_none() {
            let mut slot = self.handles.cbs.edit.lock();
            if let Some(cb) = slot.as_mut() {
                reply = Some(cb(code, keyword)?);
            }
        }
        let reply = match reply {
            Some(reply) => reply,
            None => {
                // Nobody can answer; closing the channel tells the engine.
                let fd = self.cmd_fd;
                self.forget_fd(fd);
                io::close_fd(fd);
                return Ok(());
            }
        };

        let mut wire = reply.unwrap_or_default();
        if !wire.ends_with('\n') {
            wire.push('\n');
        }
        posix::write_all_blocking(self.cmd_fd, wire.as_bytes())
    }
}

/// Pipe-protocol engine driver.
pub(crate) struct GpgEngine {
    handles: EngineHandles,
    args: Vec<Arg>,
    cmd_used: bool,
    colon_used: bool,
    shared: Option<Arc<Mutex<Shared>>>,
}

impl GpgEngine {
    pub fn new(handles: EngineHandles) -> Self {
        Self {
            handles,
            args: Vec::new(),
            cmd_used: false,
            colon_used: false,
            shared: None,
        }
    }

    fn add_arg(&mut self, arg: impl Into<OsString>) {
        self.args.push(Arg::Literal(arg.into()));
    }

    fn add_data(&mut self, data: Data, dup_to: Option<RawFd>, inbound: bool) {
        self.args.push(Arg::Data(DataSpec {
            data,
            inbound,
            dup_to,
            print_fd: false,
            linked: false,
        }));
    }

    fn add_linked_data(&mut self, data: Data, dup_to: Option<RawFd>) {
        self.args.push(Arg::Data(DataSpec {
            data,
            inbound: true,
            dup_to,
            print_fd: false,
            linked: true,
        }));
    }

    /// Interactive prompts need the command channel only when someone
    /// can answer them.
    fn want_command_channel(&self) -> bool {
        self.handles.cbs.passphrase.lock().is_some()
    }

    fn add_signer_args(&mut self, signers: &[KeyRef]) -> Result<()> {
        for key in signers {
            let spec = key
                .spec()
                .ok_or_else(|| Error::core(ErrorKind::InvalidKey))?;
            self.add_arg("-u");
            self.add_arg(spec);
        }
        Ok(())
    }

    /// Create the pipes, assemble argv, spawn and register handlers.
    fn start(&mut self, machine: OpMachine) -> Result<()> {
        let info = self.handles.info.clone();

        // Status channel is always present.
        let (status_r, status_w) = posix::pipe()?;
        let colon = if self.colon_used {
            Some(posix::pipe()?)
        } else {
            None
        };
        // Command channel: the child reads, we write.
        let cmd = if self.cmd_used {
            Some(posix::pipe()?)
        } else {
            None
        };

        let mut argv: Vec<OsString> = Vec::new();
        argv.push("--status-fd".into());
        argv.push(status_w.raw().to_string().into());
        argv.push("--no-tty".into());
        argv.push("--charset".into());
        argv.push("utf8".into());
        if let Some(home) = &info.home_dir {
            argv.push("--homedir".into());
            argv.push(home.into());
        }
        let agent_ok = std::env::var("GPG_AGENT_INFO")
            .map(|v| v.contains(':'))
            .unwrap_or(false);
        if agent_ok {
            argv.push("--use-agent".into());
        }
        let need_special = self.args.iter().any(|arg| {
            matches!(arg, Arg::Data(spec) if spec.dup_to.is_none() && !spec.print_fd)
        });
        if need_special {
            argv.push("--enable-special-filenames".into());
        }
        if let Some((cmd_r, _)) = &cmd {
            argv.push("--command-fd".into());
            argv.push(cmd_r.raw().to_string().into());
        } else {
            argv.push("--batch".into());
        }
        argv.push("--comment".into());
        argv.push("".into());

        // Per-data pipes; remember both ends.
        struct Planned {
            data: Data,
            inbound: bool,
            dup_to: Option<RawFd>,
            linked: bool,
            parent: posix::Fd,
            child: posix::Fd,
        }
        let mut planned: Vec<Planned> = Vec::new();
        for arg in self.args.drain(..) {
            match arg {
                Arg::Literal(lit) => argv.push(lit),
                Arg::Data(spec) => {
                    let (r, w) = posix::pipe()?;
                    let (parent, child) = if spec.inbound { (r, w) } else { (w, r) };
                    if spec.dup_to.is_none() {
                        let wire = if spec.print_fd {
                            child.raw().to_string()
                        } else {
                            format!("-&{}", child.raw())
                        };
                        argv.push(wire.into());
                    }
                    planned.push(Planned {
                        data: spec.data,
                        inbound: spec.inbound,
                        dup_to: spec.dup_to,
                        linked: spec.linked,
                        parent,
                        child,
                    });
                }
            }
        }

        // Descriptor table for the child.
        let mut table = vec![posix::FdAssignment {
            child_end: status_w.raw(),
            dup_to: None,
        }];
        if let Some((_, colon_w)) = &colon {
            table.push(posix::FdAssignment {
                child_end: colon_w.raw(),
                dup_to: Some(1),
            });
        }
        if let Some((cmd_r, _)) = &cmd {
            table.push(posix::FdAssignment {
                child_end: cmd_r.raw(),
                dup_to: None,
            });
        }
        for plan in &planned {
            table.push(posix::FdAssignment {
                child_end: plan.child.raw(),
                dup_to: plan.dup_to,
            });
        }

        let child = posix::spawn(Path::new(&info.file_name), &argv, &table)?;

        // Parent keeps its ends only; child ends close now.
        drop(status_w);
        let colon_r = colon.map(|(r, w)| {
            drop(w);
            r
        });
        let cmd_w = cmd.map(|(r, w)| {
            drop(r);
            w
        });

        let mut open_fds = Vec::new();
        let status_fd = status_r.into_raw();
        posix::set_cloexec(status_fd)?;
        open_fds.push(status_fd);

        let colon_fd = colon_r.map(posix::Fd::into_raw);
        if let Some(fd) = colon_fd {
            posix::set_cloexec(fd)?;
            open_fds.push(fd);
        }
        let cmd_fd = cmd_w.map(posix::Fd::into_raw).unwrap_or(-1);
        if cmd_fd >= 0 {
            posix::set_cloexec(cmd_fd)?;
            open_fds.push(cmd_fd);
        }

        let mut linked_fd = -1;
        let mut linked_data = None;
        let mut data_regs: Vec<(RawFd, bool, Data)> = Vec::new();
        for plan in planned {
            let fd = plan.parent.into_raw();
            posix::set_cloexec(fd)?;
            open_fds.push(fd);
            drop(plan.child);
            if plan.linked {
                linked_fd = fd;
                linked_data = Some(plan.data.clone());
            }
            data_regs.push((fd, plan.inbound, plan.data));
        }

        let shared = Arc::new(Mutex::new(Shared {
            handles: self.handles.clone(),
            machine: Some(machine),
            child: Some(child),
            open_fds,
            cmd_fd,
            linked_fd,
            linked_data,
            status_eof: false,
            colon_used: colon_fd.is_some(),
            colon_eof: false,
            finished: false,
        }));
        self.shared = Some(shared.clone());

        // Status handler.
        {
            let shared = shared.clone();
            let mut lines = LineBuffer::new(ErrorSource::Gpg);
            self.handles.dispatcher.register(
                status_fd,
                Direction::In,
                Box::new(move |fd| {
                    let mut buf = [0u8; 1024];
                    loop {
                        match posix::read_nonblock(fd, &mut buf) {
                            Ok(Some(0)) => {
                                let mut guard = shared.lock();
                                if let Err(err) = lines.finish() {
                                    guard.fail(&err);
                                    return Err(err);
                                }
                                guard.status_eof = true;
                                guard.forget_fd(fd);
                                io::close_fd(fd);
                                guard.maybe_finalize();
                                return Ok(HandlerFlow::Remove);
                            }
                            Ok(Some(n)) => {
                                let mut guard = shared.lock();
                                let step = (|| {
                                    lines.feed(&buf[..n])?;
                                    while let Some(line) = lines.next_line() {
                                        guard.process_status_line(&line)?;
                                    }
                                    Ok(())
                                })();
                                if let Err(err) = step {
                                    guard.fail(&err);
                                    return Err(err);
                                }
                            }
                            Ok(None) => return Ok(HandlerFlow::Continue),
                            Err(err) => {
                                shared.lock().fail(&err);
                                return Err(err);
                            }
                        }
                    }
                }),
            )?;
        }

        // Colon handler.
        if let Some(colon_fd) = colon_fd {
            let shared = shared.clone();
            let mut lines = LineBuffer::new(ErrorSource::Gpg);
            self.handles.dispatcher.register(
                colon_fd,
                Direction::In,
                Box::new(move |fd| {
                    let mut buf = [0u8; 1024];
                    loop {
                        match posix::read_nonblock(fd, &mut buf) {
                            Ok(Some(0)) => {
                                let mut guard = shared.lock();
                                if let Err(err) = lines.finish() {
                                    guard.fail(&err);
                                    return Err(err);
                                }
                                guard.colon_eof = true;
                                guard.forget_fd(fd);
                                io::close_fd(fd);
                                guard.maybe_finalize();
                                return Ok(HandlerFlow::Remove);
                            }
                            Ok(Some(n)) => {
                                let mut guard = shared.lock();
                                let step = (|| {
                                    lines.feed(&buf[..n])?;
                                    while let Some(line) = lines.next_line() {
                                        // Records may carry %XX escapes.
                                        let decoded = percent_decode(&line);
                                        if decoded.is_empty() || !decoded.contains(&b':') {
                                            continue;
                                        }
                                        let mut machine = guard.machine.take();
                                        let result = match machine.as_mut() {
                                            Some(machine) => {
                                                let mut host = guard.handles.host.lock();
                                                machine.on_colon(&mut host, &decoded)
                                            }
                                            None => Ok(()),
                                        };
                                        guard.machine = machine;
                                        result?;
                                        guard.drain_events();
                                    }
                                    Ok(())
                                })();
                                if let Err(err) = step {
                                    guard.fail(&err);
                                    return Err(err);
                                }
                            }
                            Ok(None) => return Ok(HandlerFlow::Continue),
                            Err(err) => {
                                shared.lock().fail(&err);
                                return Err(err);
                            }
                        }
                    }
                }),
            )?;
        }

        // Data pumps.
        for (fd, inbound, data) in data_regs {
            let mut handler = if inbound {
                data_inbound_handler(data)
            } else {
                data_outbound_handler(data)
            };
            let shared = shared.clone();
            self.handles.dispatcher.register(
                fd,
                if inbound { Direction::In } else { Direction::Out },
                Box::new(move |fd| {
                    let flow = handler(fd);
                    match flow {
                        Ok(HandlerFlow::Remove) => {
                            shared.lock().forget_fd(fd);
                            Ok(HandlerFlow::Remove)
                        }
                        Ok(flow) => Ok(flow),
                        Err(err) => {
                            shared.lock().fail(&err);
                            Err(err)
                        }
                    }
                }),
            )?;
        }

        self.handles.dispatcher.emit(WaitEvent::Start);
        log::debug!(
            "[GpgEngine::start] engine running, status fd {status_fd}, {} args",
            argv.len()
        );
        Ok(())
    }

    fn keylist_args(&mut self, secret_only: bool, mode: u32) {
        self.colon_used = true;
        self.add_arg("--with-colons");
        self.add_arg("--fixed-list-mode");
        self.add_arg("--with-fingerprint");
        self.add_arg("--with-fingerprint");
        if secret_only {
            self.add_arg("--list-secret-keys");
        } else if mode & keylist_mode::SIGS != 0 {
            self.add_arg("--check-sigs");
        } else {
            self.add_arg("--list-keys");
        }
    }
}

impl Engine for GpgEngine {
    fn start_decrypt(&mut self, ciph: Data, plain: Data) -> Result<()> {
        self.cmd_used = self.want_command_channel();
        self.add_arg("--decrypt");
        self.add_arg("--output");
        self.add_arg("-");
        self.add_data(plain, Some(1), true);
        self.add_arg("--");
        self.add_data(ciph, Some(0), false);
        self.start(OpMachine::Decrypt(Default::default()))
    }

    fn start_encrypt(
        &mut self,
        recipients: &[KeyRef],
        plain: Data,
        cipher: Data,
        always_trust: bool,
        opts: &OpOptions,
    ) -> Result<()> {
        if recipients.is_empty() {
            self.add_arg("--symmetric");
            self.cmd_used = self.want_command_channel();
        } else {
            self.add_arg("--encrypt");
        }
        if opts.armor {
            self.add_arg("--armor");
        }
        if !recipients.is_empty() {
            if always_trust {
                self.add_arg("--always-trust");
            }
            for key in recipients {
                let spec = key
                    .spec()
                    .ok_or_else(|| Error::core(ErrorKind::InvalidKey))?;
                self.add_arg("-r");
                self.add_arg(spec);
            }
        }
        self.add_arg("--output");
        self.add_arg("-");
        self.add_data(cipher, Some(1), true);
        self.add_arg("--");
        self.add_data(plain, Some(0), false);
        self.start(OpMachine::Encrypt(Default::default()))
    }

    fn start_encrypt_sign(
        &mut self,
        recipients: &[KeyRef],
        signers: &[KeyRef],
        plain: Data,
        cipher: Data,
        always_trust: bool,
        opts: &OpOptions,
    ) -> Result<()> {
        self.cmd_used = self.want_command_channel();
        self.add_arg("--encrypt");
        self.add_arg("--sign");
        if opts.armor {
            self.add_arg("--armor");
        }
        if always_trust {
            self.add_arg("--always-trust");
        }
        for key in recipients {
            let spec = key
                .spec()
                .ok_or_else(|| Error::core(ErrorKind::InvalidKey))?;
            self.add_arg("-r");
            self.add_arg(spec);
        }
        self.add_signer_args(signers)?;
        self.add_arg("--output");
        self.add_arg("-");
        self.add_data(cipher, Some(1), true);
        self.add_arg("--");
        self.add_data(plain, Some(0), false);
        self.start(OpMachine::EncryptSign(
            Default::default(),
            Default::default(),
        ))
    }

    fn start_sign(
        &mut self,
        input: Data,
        output: Data,
        mode: SigMode,
        signers: &[KeyRef],
        opts: &OpOptions,
    ) -> Result<()> {
        self.cmd_used = self.want_command_channel();
        if mode == SigMode::Clear {
            self.add_arg("--clearsign");
        } else {
            self.add_arg("--sign");
            if mode == SigMode::Detach {
                self.add_arg("--detach");
            }
            if opts.armor {
                self.add_arg("--armor");
            }
            if opts.textmode {
                self.add_arg("--textmode");
            }
        }
        self.add_signer_args(signers)?;
        self.add_data(input, Some(0), false);
        self.add_data(output, Some(1), true);
        self.start(OpMachine::Sign(Default::default()))
    }

    fn start_verify(
        &mut self,
        sig: Data,
        signed_text: Option<Data>,
        plaintext: Option<Data>,
    ) -> Result<()> {
        if let Some(plaintext) = plaintext {
            // Inline or cleartext signature: plaintext is recovered.
            self.add_arg("--output");
            self.add_arg("-");
            self.add_arg("--");
            self.add_data(sig, Some(0), false);
            self.add_data(plaintext, Some(1), true);
        } else {
            self.add_arg("--verify");
            self.add_arg("--");
            self.add_data(sig, None, false);
            if let Some(signed_text) = signed_text {
                self.add_arg("-");
                self.add_data(signed_text, Some(0), false);
            }
        }
        self.start(OpMachine::Verify(Default::default()))
    }

    fn start_keylist(
        &mut self,
        patterns: &[String],
        secret_only: bool,
        opts: &OpOptions,
    ) -> Result<()> {
        self.keylist_args(secret_only, opts.keylist_mode);
        self.add_arg("--");
        for pattern in patterns {
            if !pattern.is_empty() {
                self.add_arg(pattern);
            }
        }
        self.start(OpMachine::Keylist(Default::default()))
    }

    fn start_import(&mut self, keydata: Data) -> Result<()> {
        self.add_arg("--import");
        self.add_data(keydata, Some(0), false);
        self.start(OpMachine::Import(Default::default()))
    }

    fn start_export(&mut self, patterns: &[String], keydata: Data, opts: &OpOptions) -> Result<()> {
        self.add_arg("--export");
        if opts.armor {
            self.add_arg("--armor");
        }
        self.add_data(keydata, Some(1), true);
        self.add_arg("--");
        for pattern in patterns {
            if !pattern.is_empty() {
                self.add_arg(pattern);
            }
        }
        self.start(OpMachine::Export)
    }

    fn start_genkey(&mut self, params: Data, pubkey: Option<Data>, opts: &OpOptions) -> Result<()> {
        if pubkey.is_some() {
            // Ring selection needs the %pubring/%secring parameter
            // forms, which cannot name a pipe.
            return Err(Error::new(ErrorSource::Gpg, ErrorKind::NotImplemented));
        }
        self.add_arg("--gen-key");
        if opts.armor {
            self.add_arg("--armor");
        }
        self.add_data(params, Some(0), false);
        self.start(OpMachine::Genkey(Default::default()))
    }

    fn start_edit(&mut self, key: &Key, out: Data, signers: &[KeyRef]) -> Result<()> {
        self.cmd_used = true;
        self.add_arg("--with-colons");
        self.add_signer_args(signers)?;
        self.add_arg("--edit-key");
        self.add_linked_data(out, Some(1));
        self.add_arg("--");
        let spec = key
            .spec()
            .ok_or_else(|| Error::core(ErrorKind::InvalidKey))?;
        self.add_arg(spec);
        let machine = OpMachine::Edit(crate::ops::edit::EditOp::new(self.handles.cbs.clone()));
        self.start(machine)
    }

    fn start_trustlist(&mut self, pattern: &str) -> Result<()> {
        self.colon_used = true;
        self.add_arg("--with-colons");
        self.add_arg("--list-trust-path");
        self.add_arg("--");
        self.add_arg(pattern);
        self.start(OpMachine::Trustlist(Default::default()))
    }

    fn start_delete(&mut self, key: &Key, allow_secret: bool) -> Result<()> {
        self.add_arg(if allow_secret {
            "--delete-secret-and-public-key"
        } else {
            "--delete-key"
        });
        self.add_arg("--");
        let spec = key
            .spec()
            .ok_or_else(|| Error::core(ErrorKind::InvalidKey))?;
        self.add_arg(spec);
        self.start(OpMachine::Delete(Default::default()))
    }

    fn cancel(&mut self) {
        if let Some(shared) = self.shared.take() {
            let mut guard = shared.lock();
            guard.finished = true;
            guard.teardown();
        }
    }
}

impl Drop for GpgEngine {
    fn drop(&mut self) {
        self.cancel();
    }
}
