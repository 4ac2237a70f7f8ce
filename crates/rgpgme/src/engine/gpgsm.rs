// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Assuan-protocol driver for the CMS engine (`gpgsm --server`).
//!
//! The engine is spawned with three extra inherited pipes (INPUT,
//! OUTPUT, MESSAGE) that are registered up front with `FD=N` commands;
//! the dialogue itself runs on the child's stdin/stdout. During an
//! operation the response channel is pumped by the wait core: `S`
//! lines feed the state machine, `D` lines carry colon records for the
//! listing operations, and the terminating `OK`/`ERR` finalizes the
//! operation.

use std::ffi::OsString;
use std::os::fd::RawFd;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::data::{Data, DataEncoding};
use crate::engine::assuan::{self, Client, Response};
use crate::engine::{
    data_inbound_handler, data_outbound_handler, keylist_mode, Engine, EngineHandles, OpOptions,
};
use crate::error::{Error, ErrorKind, ErrorSource, Result};
use crate::io::{self, posix};
use crate::keys::{Key, KeyRef};
use crate::ops::results::SigMode;
use crate::ops::{passphrase_status, progress_status, InvalidKey, OpMachine};
use crate::protocol::escape::{percent_decode, percent_encode};
use crate::protocol::line::LineBuffer;
use crate::protocol::status::{parse_status_line, StatusParse};
use crate::wait::{Direction, HandlerFlow, WaitEvent};

/// Bytes that must be percent-armored in command arguments.
const CMD_SPECIALS: &[u8] = b" +";

struct Channel {
    /// Our end of the pipe.
    parent: RawFd,
    /// Descriptor number the server sees (its inherited end).
    server: RawFd,
    /// True when the server writes and we read.
    inbound: bool,
    /// Data object pumped through this channel, once attached.
    data: Option<Data>,
}

/// State shared with the I/O handlers after start.
struct Shared {
    handles: EngineHandles,
    machine: Option<OpMachine>,
    client: Option<Client>,
    /// Parent-side data descriptors still open, with the data object
    /// for inbound drains.
    open_fds: Vec<(RawFd, bool, Data)>,
    /// Reassembly for colon records arriving inside `D` lines.
    colon_attic: LineBuffer,
    finished: bool,
}

impl Shared {
    fn forget_fd(&mut self, fd: RawFd) {
        self.open_fds.retain(|&(open, _, _)| open != fd);
    }

    fn teardown(&mut self) {
        let fds = std::mem::take(&mut self.open_fds);
        for (fd, _, _) in fds {
            io::close_fd(fd);
        }
        if let Some(mut client) = self.client.take() {
            client.shutdown();
        }
    }

    /// Pull whatever the server already wrote out of the inbound data
    /// pipes. The server completes all data before its terminator, so
    /// this loses nothing.
    fn drain_inbound(&mut self) {
        let mut buf = [0u8; 4096];
        for (fd, inbound, data) in &mut self.open_fds {
            if !*inbound {
                continue;
            }
            while let Ok(Some(n)) = posix::read_nonblock(*fd, &mut buf) {
                if n == 0 {
                    break;
                }
                let _ = data.write(&buf[..n]);
            }
        }
    }

    fn drain_events(&mut self) {
        let events: Vec<WaitEvent> = {
            let mut host = self.handles.host.lock();
            host.events.drain(..).collect()
        };
        for event in events {
            self.handles.dispatcher.emit(event);
        }
    }

    fn fail(&mut self, err: &Error) {
        if self.finished {
            return;
        }
        self.finished = true;
        log::debug!("[GpgSmEngine] operation failed: {err}");
        {
            let mut host = self.handles.host.lock();
            host.done = Some(Some(err.clone()));
        }
        self.teardown();
        self.handles.dispatcher.finish(Some(err.clone()));
    }

    /// The server sent its terminator; finalize the operation.
    fn finalize(&mut self, server_err: Option<Error>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.drain_inbound();
        let outcome = {
            let mut host = self.handles.host.lock();
            let mut machine = self.machine.take();
            let machine_result = match machine.as_mut() {
                Some(machine) => machine.on_eof(&mut host),
                None => Ok(()),
            };
            let outcome = match machine_result {
                Err(err) => Some(err),
                Ok(()) => server_err.or_else(|| host.failure.take()),
            };
            host.done = Some(outcome.clone());
            outcome
        };
        self.drain_events();
        // The server survives the operation; release our side so the
        // wait core sees the conversation as over.
        self.teardown();
        self.handles.dispatcher.finish(outcome);
    }

    fn process_response(&mut self, line: &[u8]) -> Result<bool> {
        match assuan::parse_response(line)? {
            Response::Ok(_) => {
                self.finalize(None);
                Ok(true)
            }
            Response::Err { code, text } => {
                log::debug!("[GpgSmEngine] server error {code}: {text}");
                self.finalize(Some(assuan::map_assuan_error(code)));
                Ok(true)
            }
            Response::Status(payload) => {
                let text = String::from_utf8_lossy(&payload).into_owned();
                if let StatusParse::Line(status_line) = parse_status_line(&text, false) {
                    let code = status_line.status;
                    let args = status_line.args;
                    progress_status(&self.handles.cbs, code, args);
                    let mut host = self.handles.host.lock();
                    passphrase_status(&mut host, code, args);
                    let mut machine = self.machine.take();
                    let result = match machine.as_mut() {
                        Some(machine) => machine.on_status(&mut host, code, args),
                        None => Ok(()),
                    };
                    self.machine = machine;
                    drop(host);
                    self.drain_events();
                    result?;
                } else if let StatusParse::Unknown(token) = parse_status_line(&text, false) {
                    log::debug!("[GpgSmEngine] unknown status token {token}");
                }
                Ok(false)
            }
            Response::Data(payload) => {
                // Colon records, percent escaped, possibly split
                // across D lines.
                let decoded = percent_decode(&payload);
                self.colon_attic.feed(&decoded)?;
                while let Some(record) = self.colon_attic.next_line() {
                    if record.is_empty() || !record.contains(&b':') {
                        continue;
                    }
                    let mut machine = self.machine.take();
                    let result = match machine.as_mut() {
                        Some(machine) => {
                            let mut host = self.handles.host.lock();
                            machine.on_colon(&mut host, &record)
                        }
                        None => Ok(()),
                    };
                    self.machine = machine;
                    result?;
                    self.drain_events();
                }
                Ok(false)
            }
            Response::Inquire(keyword) => {
                // Nothing to volunteer on the control channel.
                log::debug!("[GpgSmEngine] answering INQUIRE {keyword} with END");
                if let Some(client) = self.client.as_ref() {
                    client.write_line(b"END")?;
                }
                Ok(false)
            }
            Response::Comment => Ok(false),
        }
    }
}

/// Assuan-protocol engine driver.
pub(crate) struct GpgSmEngine {
    handles: EngineHandles,
    client: Option<Client>,
    input: Option<Channel>,
    output: Option<Channel>,
    message: Option<Channel>,
    shared: Option<Arc<Mutex<Shared>>>,
}

impl GpgSmEngine {
    pub fn new(handles: EngineHandles) -> Self {
        Self {
            handles,
            client: None,
            input: None,
            output: None,
            message: None,
            shared: None,
        }
    }

    /// Spawn the server and negotiate session options.
    fn connect(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }
        let info = self.handles.info.clone();

        // INPUT and MESSAGE: server reads. OUTPUT: server writes.
        let (in_server, in_parent) = posix::pipe()?;
        let (out_parent, out_server) = posix::pipe()?;
        let (msg_server, msg_parent) = posix::pipe()?;

        let mut argv: Vec<OsString> = Vec::new();
        if let Some(home) = &info.home_dir {
            argv.push("--homedir".into());
            argv.push(home.into());
        }
        argv.push("--server".into());

        let inherit = [in_server.raw(), out_server.raw(), msg_server.raw()];
        let mut client = Client::pipe_connect(Path::new(&info.file_name), &argv, &inherit)?;

        let input = Channel {
            parent: in_parent.into_raw(),
            server: in_server.raw(),
            inbound: false,
            data: None,
        };
        let output = Channel {
            parent: out_parent.into_raw(),
            server: out_server.raw(),
            inbound: true,
            data: None,
        };
        let message = Channel {
            parent: msg_parent.into_raw(),
            server: msg_server.raw(),
            inbound: false,
            data: None,
        };
        // Our copies of the server ends close now; the child owns its.
        drop(in_server);
        drop(out_server);
        drop(msg_server);
        for channel in [&input, &output, &message] {
            posix::set_cloexec(channel.parent)?;
        }

        // Session options, each an independent simple command; absent
        // environment simply skips the option.
        let mut options: Vec<(String, Option<String>)> = vec![
            ("display".into(), std::env::var("DISPLAY").ok()),
            ("ttyname".into(), std::env::var("GPG_TTY").ok()),
            ("ttytype".into(), std::env::var("TERM").ok()),
            ("lc-ctype".into(), std::env::var("LC_CTYPE").ok()),
            ("lc-messages".into(), std::env::var("LC_MESSAGES").ok()),
        ];
        for (name, value) in options.drain(..) {
            if let Some(value) = value {
                if !value.is_empty() {
                    client.transact(&format!("OPTION {name}={value}"), None)?;
                }
            }
        }

        self.client = Some(client);
        self.input = Some(input);
        self.output = Some(output);
        self.message = Some(message);
        Ok(())
    }

    fn client_mut(&mut self) -> Result<&mut Client> {
        self.client
            .as_mut()
            .ok_or_else(|| Error::new(ErrorSource::Assuan, ErrorKind::InvalidEngine))
    }

    /// Register one of the pre-created channels with the server.
    fn set_fd(&mut self, which: &str, encoding: Option<DataEncoding>) -> Result<()> {
        let channel = match which {
            "INPUT" => self.input.as_ref(),
            "OUTPUT" => self.output.as_ref(),
            _ => self.message.as_ref(),
        }
        .ok_or_else(|| Error::new(ErrorSource::Assuan, ErrorKind::InvalidEngine))?;
        let server_fd = channel.server;

        let opt = match encoding {
            Some(DataEncoding::Binary) => " --binary",
            Some(DataEncoding::Base64) => " --base64",
            Some(DataEncoding::Armor) => " --armor",
            _ => "",
        };
        let client = self.client_mut()?;
        if client.can_pass_fds() {
            client.send_descriptor(server_fd)?;
            client.transact(&format!("{which} FD{opt}"), None)
        } else {
            client.transact(&format!("{which} FD={server_fd}{opt}"), None)
        }
    }

    /// Drop a channel this operation does not use.
    fn close_channel(channel: &mut Option<Channel>) {
        if let Some(channel) = channel.take() {
            io::close_fd(channel.parent);
        }
    }

    /// Register handlers and send the operation command.
    fn start(&mut self, command: &str, machine: OpMachine) -> Result<()> {
        let client = match self.client.take() {
            Some(client) => client,
            None => return Err(Error::new(ErrorSource::Assuan, ErrorKind::InvalidEngine)),
        };
        let response_fd = client.response_fd();

        let mut pumps: Vec<(RawFd, bool, Data)> = Vec::new();
        for channel in [&mut self.input, &mut self.output, &mut self.message] {
            if let Some(mut channel) = channel.take() {
                match channel.data.take() {
                    Some(data) => {
                        pumps.push((channel.parent, channel.inbound, data));
                    }
                    None => {
                        // Channel unused by this operation.
                        io::close_fd(channel.parent);
                    }
                }
            }
        }
        let open_fds = pumps.clone();

        let shared = Arc::new(Mutex::new(Shared {
            handles: self.handles.clone(),
            machine: Some(machine),
            client: Some(client),
            open_fds,
            colon_attic: LineBuffer::new(ErrorSource::Assuan),
            finished: false,
        }));
        self.shared = Some(shared.clone());

        // Response-channel handler.
        {
            let shared = shared.clone();
            self.handles.dispatcher.register(
                response_fd,
                Direction::In,
                Box::new(move |fd| {
                    let mut buf = [0u8; 1024];
                    loop {
                        match posix::read_nonblock(fd, &mut buf) {
                            Ok(Some(0)) => {
                                let mut guard = shared.lock();
                                if !guard.finished {
                                    let err = Error::new(
                                        ErrorSource::Assuan,
                                        ErrorKind::ReadError,
                                    )
                                    .with_detail("server closed mid-operation");
                                    guard.fail(&err);
                                    return Err(err);
                                }
                                return Ok(HandlerFlow::Remove);
                            }
                            Ok(Some(n)) => {
                                let mut guard = shared.lock();
                                let step = (|| {
                                    let mut lines = Vec::new();
                                    if let Some(client) = guard.client.as_mut() {
                                        client.feed(&buf[..n])?;
                                        while let Some(line) = client.next_line() {
                                            lines.push(line);
                                        }
                                    }
                                    for line in lines {
                                        if guard.process_response(&line)? {
                                            return Ok(true);
                                        }
                                    }
                                    Ok(false)
                                })();
                                match step {
                                    Ok(true) => return Ok(HandlerFlow::Remove),
                                    Ok(false) => {}
                                    Err(err) => {
                                        guard.fail(&err);
                                        return Err(err);
                                    }
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
        for (fd, inbound, data) in pumps {
            let mut handler = if inbound {
                data_inbound_handler(data)
            } else {
                data_outbound_handler(data)
            };
            let shared = shared.clone();
            self.handles.dispatcher.register(
                fd,
                if inbound { Direction::In } else { Direction::Out },
                Box::new(move |fd| match handler(fd) {
                    Ok(HandlerFlow::Remove) => {
                        shared.lock().forget_fd(fd);
                        Ok(HandlerFlow::Remove)
                    }
                    Ok(flow) => Ok(flow),
                    Err(err) => {
                        shared.lock().fail(&err);
                        Err(err)
                    }
                }),
            )?;
        }

        {
            let guard = shared.lock();
            if let Some(client) = guard.client.as_ref() {
                client.write_line(command.as_bytes())?;
            }
        }
        self.handles.dispatcher.emit(WaitEvent::Start);
        log::debug!("[GpgSmEngine::start] {command}");
        Ok(())
    }

    /// Assert recipients one per command, collecting rejections.
    ///
    /// The operation proceeds as long as at least one recipient was
    /// accepted; rejected ones land in the encrypt result.
    fn set_recipients(&mut self, recipients: &[KeyRef]) -> Result<()> {
        let mut accepted = 0usize;
        let mut rejected: Vec<InvalidKey> = Vec::new();
        for key in recipients {
            let fpr = key
                .fingerprint()
                .ok_or_else(|| Error::core(ErrorKind::InvalidKey))?
                .to_string();
            let client = self.client_mut()?;
            match client.transact(&format!("RECIPIENT {fpr}"), None) {
                Ok(()) => accepted += 1,
                Err(err) if err.kind() == ErrorKind::NoPublicKey => {
                    rejected.push(InvalidKey {
                        fingerprint: fpr,
                        reason: 0,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        if !rejected.is_empty() {
            let mut host = self.handles.host.lock();
            host.slots
                .encrypt
                .get_or_insert_with(Default::default)
                .invalid_recipients
                .extend(rejected);
        }
        if accepted == 0 && !recipients.is_empty() {
            return Err(Error::new(ErrorSource::Assuan, ErrorKind::InvalidRecipients));
        }
        Ok(())
    }

    fn set_signers(&mut self, signers: &[KeyRef]) -> Result<()> {
        self.client_mut()?.transact("RESET", None)?;
        for key in signers {
            let fpr = key
                .fingerprint()
                .ok_or_else(|| Error::core(ErrorKind::InvalidKey))?
                .to_string();
            self.client_mut()?.transact(&format!("SIGNER {fpr}"), None)?;
        }
        Ok(())
    }

    fn attach_input(&mut self, data: Data) {
        if let Some(channel) = self.input.as_mut() {
            channel.data = Some(data);
        }
    }

    fn attach_output(&mut self, data: Data) {
        if let Some(channel) = self.output.as_mut() {
            channel.data = Some(data);
        }
    }

    fn attach_message(&mut self, data: Data) {
        if let Some(channel) = self.message.as_mut() {
            channel.data = Some(data);
        }
    }
}

impl Engine for GpgSmEngine {
    fn start_decrypt(&mut self, ciph: Data, plain: Data) -> Result<()> {
        self.connect()?;
        let enc = ciph.encoding();
        self.set_fd("INPUT", Some(enc))?;
        self.set_fd("OUTPUT", None)?;
        self.attach_input(ciph);
        self.attach_output(plain);
        Self::close_channel(&mut self.message);
        self.start("DECRYPT", OpMachine::Decrypt(Default::default()))
    }

    fn start_encrypt(
        &mut self,
        recipients: &[KeyRef],
        plain: Data,
        cipher: Data,
        _always_trust: bool,
        opts: &OpOptions,
    ) -> Result<()> {
        if recipients.is_empty() {
            // No symmetric mode in the CMS engine.
            return Err(Error::new(ErrorSource::Assuan, ErrorKind::NotImplemented));
        }
        self.connect()?;
        let enc = plain.encoding();
        self.set_fd("INPUT", Some(enc))?;
        self.set_fd("OUTPUT", if opts.armor { Some(DataEncoding::Armor) } else { None })?;
        self.attach_input(plain);
        self.attach_output(cipher);
        Self::close_channel(&mut self.message);
        self.set_recipients(recipients)?;
        self.start("ENCRYPT", OpMachine::Encrypt(Default::default()))
    }

    fn start_encrypt_sign(
        &mut self,
        _recipients: &[KeyRef],
        _signers: &[KeyRef],
        _plain: Data,
        _cipher: Data,
        _always_trust: bool,
        _opts: &OpOptions,
    ) -> Result<()> {
        // The CMS server signs and encrypts in separate passes only.
        Err(Error::new(ErrorSource::Assuan, ErrorKind::NotImplemented))
    }

    fn start_sign(
        &mut self,
        input: Data,
        output: Data,
        mode: SigMode,
        signers: &[KeyRef],
        opts: &OpOptions,
    ) -> Result<()> {
        self.connect()?;
        self.client_mut()?
            .transact(&format!("OPTION include-certs {}", opts.include_certs), None)?;
        self.set_signers(signers)?;
        let enc = input.encoding();
        self.set_fd("INPUT", Some(enc))?;
        self.set_fd("OUTPUT", if opts.armor { Some(DataEncoding::Armor) } else { None })?;
        self.attach_input(input);
        self.attach_output(output);
        Self::close_channel(&mut self.message);
        self.start(
            if mode == SigMode::Detach {
                "SIGN --detached"
            } else {
                "SIGN"
            },
            OpMachine::Sign(Default::default()),
        )
    }

    fn start_verify(
        &mut self,
        sig: Data,
        signed_text: Option<Data>,
        plaintext: Option<Data>,
    ) -> Result<()> {
        self.connect()?;
        let enc = sig.encoding();
        self.set_fd("INPUT", Some(enc))?;
        self.attach_input(sig);
        if let Some(plaintext) = plaintext {
            self.set_fd("OUTPUT", None)?;
            self.attach_output(plaintext);
            Self::close_channel(&mut self.message);
        } else if let Some(signed_text) = signed_text {
            self.set_fd("MESSAGE", None)?;
            self.attach_message(signed_text);
            Self::close_channel(&mut self.output);
        } else {
            return Err(Error::core(ErrorKind::InvalidValue));
        }
        self.start("VERIFY", OpMachine::Verify(Default::default()))
    }

    fn start_keylist(
        &mut self,
        patterns: &[String],
        secret_only: bool,
        opts: &OpOptions,
    ) -> Result<()> {
        self.connect()?;
        let mut list_mode = 0u32;
        if opts.keylist_mode & keylist_mode::LOCAL != 0 {
            list_mode |= 1;
        }
        if opts.keylist_mode & keylist_mode::EXTERN != 0 {
            list_mode |= 2;
        }
        self.client_mut()?
            .transact(&format!("OPTION list-mode={list_mode}"), None)?;

        let mut command = String::from(if secret_only {
            "LISTSECRETKEYS "
        } else {
            "LISTKEYS "
        });
        let mut first = true;
        for pattern in patterns {
            if pattern.is_empty() {
                continue;
            }
            if !first {
                command.push(' ');
            }
            first = false;
            let escaped = percent_encode(pattern.as_bytes(), CMD_SPECIALS);
            command.push_str(&String::from_utf8_lossy(&escaped));
        }

        Self::close_channel(&mut self.input);
        Self::close_channel(&mut self.output);
        Self::close_channel(&mut self.message);
        self.start(command.trim_end(), OpMachine::Keylist(Default::default()))
    }

    fn start_import(&mut self, keydata: Data) -> Result<()> {
        self.connect()?;
        let enc = keydata.encoding();
        self.set_fd("INPUT", Some(enc))?;
        self.attach_input(keydata);
        Self::close_channel(&mut self.output);
        Self::close_channel(&mut self.message);
        self.start("IMPORT", OpMachine::Import(Default::default()))
    }

    fn start_export(&mut self, patterns: &[String], keydata: Data, opts: &OpOptions) -> Result<()> {
        self.connect()?;
        self.set_fd("OUTPUT", if opts.armor { Some(DataEncoding::Armor) } else { None })?;
        self.attach_output(keydata);
        Self::close_channel(&mut self.input);
        Self::close_channel(&mut self.message);

        let mut command = String::from("EXPORT");
        for pattern in patterns {
            if pattern.is_empty() {
                continue;
            }
            command.push(' ');
            let escaped = percent_encode(pattern.as_bytes(), CMD_SPECIALS);
            command.push_str(&String::from_utf8_lossy(&escaped));
        }
        self.start(&command, OpMachine::Export)
    }

    fn start_genkey(&mut self, params: Data, pubkey: Option<Data>, opts: &OpOptions) -> Result<()> {
        let pubkey = pubkey.ok_or_else(|| Error::core(ErrorKind::InvalidValue))?;
        self.connect()?;
        let enc = params.encoding();
        self.set_fd("INPUT", Some(enc))?;
        self.set_fd("OUTPUT", if opts.armor { Some(DataEncoding::Armor) } else { None })?;
        self.attach_input(params);
        self.attach_output(pubkey);
        Self::close_channel(&mut self.message);
        self.start("GENKEY", OpMachine::Genkey(Default::default()))
    }

    fn start_edit(&mut self, _key: &Key, _out: Data, _signers: &[KeyRef]) -> Result<()> {
        // The CMS engine has no interactive edit dialogue.
        Err(Error::new(ErrorSource::Assuan, ErrorKind::NotImplemented))
    }

    fn start_trustlist(&mut self, _pattern: &str) -> Result<()> {
        Err(Error::new(ErrorSource::Assuan, ErrorKind::NotImplemented))
    }

    fn start_delete(&mut self, key: &Key, _allow_secret: bool) -> Result<()> {
        self.connect()?;
        let fpr = key
            .fingerprint()
            .ok_or_else(|| Error::core(ErrorKind::InvalidKey))?;
        let escaped = percent_encode(fpr.as_bytes(), CMD_SPECIALS);
        let command = format!("DELKEYS {}", String::from_utf8_lossy(&escaped));
        Self::close_channel(&mut self.input);
        Self::close_channel(&mut self.output);
        Self::close_channel(&mut self.message);
        self.start(&command, OpMachine::Delete(Default::default()))
    }

    fn cancel(&mut self) {
        if let Some(shared) = self.shared.take() {
            let mut guard = shared.lock();
            guard.finished = true;
            guard.teardown();
        }
        if let Some(mut client) = self.client.take() {
            client.shutdown();
        }
        for channel in [&mut self.input, &mut self.output, &mut self.message] {
            Self::close_channel(channel);
        }
    }
}

impl Drop for GpgSmEngine {
    fn drop(&mut self) {
        self.cancel();
    }
}
