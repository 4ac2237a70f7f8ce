// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// End-to-end tests of the pipe driver against a scripted stand-in
// engine: a shell script that honours --status-fd / --command-fd and
// replays canned status streams. This exercises spawning, descriptor
// wiring, the wait core and the state machines without any real
// cryptography.

#![cfg(unix)]

use std::io::Write as _;
use std::os::unix::fs::PermissionsExt as _;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use rgpgme::protocol::status::Status;
use rgpgme::{
    config, Context, Data, ErrorKind, Protocol, SigMode, SigSummary, Validity,
};

/// Engine configuration is process global; serialize the tests.
static ENGINE_GUARD: Mutex<()> = Mutex::new(());

const SCRIPT_PRELUDE: &str = r#"#!/bin/sh
status_fd=2
cmd_fd=""
prev=""
for a in "$@"; do
  case "$prev" in
    --status-fd) status_fd="$a" ;;
    --command-fd) cmd_fd="$a" ;;
  esac
  prev="$a"
done
eval "exec 9>&$status_fd"
emit() { printf '%s\n' "$1" >&9; }
"#;

struct StubEngine {
    _dir: TempDir,
    guard: parking_lot::MutexGuard<'static, ()>,
    previous: config::EngineInfo,
}

impl StubEngine {
    /// Install a scripted engine as the OpenPGP engine.
    fn install(body: &str) -> Self {
        let guard = ENGINE_GUARD.lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stub-gpg");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SCRIPT_PRELUDE.as_bytes()).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let previous = config::engine_info(Protocol::OpenPgp);
        config::set_engine_info(Protocol::OpenPgp, path.display().to_string(), None);
        Self {
            _dir: dir,
            guard,
            previous,
        }
    }
}

impl Drop for StubEngine {
    fn drop(&mut self) {
        config::set_engine_info(
            Protocol::OpenPgp,
            self.previous.file_name.clone(),
            self.previous.home_dir.clone(),
        );
        let _ = &self.guard;
    }
}

const FPR: &str = "3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E";

#[test]
fn verify_tampered_body_reports_red() {
    let _stub = StubEngine::install(
        r#"
cat >/dev/null
emit "[GNUPG:] NEWSIG"
emit "[GNUPG:] BADSIG 3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E test cert 1"
exit 0
"#,
    );

    let mut ctx = Context::new().unwrap();
    let sig = Data::from_bytes(&b"MIAGCSqGSIb3DQEHAqCA..."[..]);
    let body = Data::from_bytes(&b"Hallo Leute?\n"[..]);
    ctx.op_verify(&sig, Some(&body), None).unwrap();

    let result = ctx.op_verify_result().expect("verify result");
    assert_eq!(result.signatures.len(), 1);
    let signature = &result.signatures[0];
    assert_eq!(signature.fingerprint, FPR);
    assert_eq!(signature.status, Some(ErrorKind::BadSignature));
    assert!(signature.summary.has(SigSummary::RED));
    assert_eq!(signature.validity, Validity::Unknown);
}

#[test]
fn verify_matching_body_reports_green_valid() {
    let _stub = StubEngine::install(
        r#"
cat >/dev/null
emit "[GNUPG:] NEWSIG"
emit "[GNUPG:] GOODSIG 3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E test cert 1"
emit "[GNUPG:] VALIDSIG 3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E 2003-11-24 1069689600 0 3 0 1 2"
emit "[GNUPG:] TRUST_FULLY"
exit 0
"#,
    );

    let mut ctx = Context::new().unwrap();
    let sig = Data::from_bytes(&b"MIAGCSqGSIb3DQEHAqCA..."[..]);
    let body = Data::from_bytes(&b"Hallo Leute!\n"[..]);
    ctx.op_verify(&sig, Some(&body), None).unwrap();

    let result = ctx.op_verify_result().expect("verify result");
    let signature = &result.signatures[0];
    assert!(signature.status.is_none());
    assert!(signature.summary.has(SigSummary::GREEN | SigSummary::VALID));
    assert_eq!(signature.validity, Validity::Full);
}

#[test]
fn decrypt_recovers_plaintext_and_recipient() {
    let _stub = StubEngine::install(
        r#"
cat >/dev/null
printf 'Hallo Leute!\n'
emit "[GNUPG:] ENC_TO 6C7EE1B8621CC013 1 0"
emit "[GNUPG:] BEGIN_DECRYPTION"
emit "[GNUPG:] DECRYPTION_OKAY"
emit "[GNUPG:] GOODMDC"
emit "[GNUPG:] END_DECRYPTION"
exit 0
"#,
    );

    let mut ctx = Context::new().unwrap();
    let cipher = Data::from_bytes(&b"\x85\x01\x0c..."[..]);
    let mut plain = Data::new();
    ctx.op_decrypt(&cipher, &plain).unwrap();

    assert_eq!(plain.take_bytes().unwrap(), b"Hallo Leute!\n");
    let result = ctx.op_decrypt_result().expect("decrypt result");
    assert_eq!(result.recipients.len(), 1);
    assert_eq!(result.recipients[0].keyid, "6C7EE1B8621CC013");
    assert!(result.recipients[0].status.is_none(), "recipient usable");
}

#[test]
fn sign_normal_mode_creates_one_signature() {
    let _stub = StubEngine::install(
        r#"
cat >/dev/null
printf 'dummy signature bytes'
emit "[GNUPG:] SIG_CREATED S 1 2 00 1069689600 3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E"
exit 0
"#,
    );

    let mut ctx = Context::new().unwrap();
    let signer = Arc::new(rgpgme::Key {
        subkeys: vec![rgpgme::keys::Subkey {
            fingerprint: Some(FPR.to_string()),
            keyid: "D1E4282E33BDB76E".into(),
            ..Default::default()
        }],
        ..Default::default()
    });
    ctx.signers_add(signer);

    let input = Data::from_bytes(&b"Hallo Leute!\n"[..]);
    let mut output = Data::new();
    ctx.op_sign(&input, &output, SigMode::Normal).unwrap();

    assert_eq!(output.take_bytes().unwrap(), b"dummy signature bytes");
    let result = ctx.op_sign_result().expect("sign result");
    assert_eq!(result.signatures.len(), 1);
    let created = &result.signatures[0];
    assert_eq!(created.mode, SigMode::Normal);
    assert_eq!(created.pubkey_algo, 1, "RSA");
    assert_eq!(created.hash_algo, 2, "SHA1");
    assert_eq!(created.class, 0);
    assert_eq!(created.fingerprint, FPR);
    assert!(result.invalid_signers.is_empty());
}

#[test]
fn keylist_streams_keys_in_order() {
    let _stub = StubEngine::install(
        r#"
printf '%s\n' 'pub:u:1024:17:6C7EE1B8621CC013:1069689600:::u:::scESC:'
printf '%s\n' 'fpr:::::::::A0FF4590BB6122EDEF6E3C542D727CC768697734:'
printf '%s\n' 'uid:u::::::::Joe Tester (demo) <joe@example.net>:'
printf '%s\n' 'pub:f:2048:1:1622EEFD9F1B5AD8:1069689600:::f:::e:'
printf '%s\n' 'fpr:::::::::DFA56FB5FC41E3A8921F77AD1622EEFD9F1B5AD8:'
printf '%s\n' 'uid:f::::::::<certify@pca.dfn.de>:'
emit "[GNUPG:] GOT_IT"
exit 0
"#,
    );

    let mut ctx = Context::new().unwrap();
    let keys = ctx.keylist_all(None, false).unwrap();

    assert_eq!(keys.len(), 2);
    assert_eq!(
        keys[0].fingerprint(),
        Some("A0FF4590BB6122EDEF6E3C542D727CC768697734")
    );
    assert_eq!(keys[0].user_ids[0].email, "joe@example.net");
    assert!(keys[0].flags.can_sign && keys[0].flags.can_certify);
    assert_eq!(
        keys[1].fingerprint(),
        Some("DFA56FB5FC41E3A8921F77AD1622EEFD9F1B5AD8")
    );

    // Listed keys are reachable through the cache afterwards.
    let cached = ctx
        .get_key("A0FF4590BB6122EDEF6E3C542D727CC768697734", false)
        .unwrap();
    assert!(Arc::ptr_eq(&cached, &keys[0]));
}

#[test]
fn import_counts_first_and_second_run() {
    let first = StubEngine::install(
        r#"
cat >/dev/null
emit "[GNUPG:] IMPORT_OK 1 3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E"
emit "[GNUPG:] IMPORT_RES 1 0 1 0 0 0 0 0 0 0 0 0 0 0"
exit 0
"#,
    );
    let mut ctx = Context::new().unwrap();
    let keydata = Data::from_bytes(&b"\x30\x82..."[..]);
    ctx.op_import(&keydata).unwrap();
    let run_one = ctx.op_import_result().expect("import result");
    assert_eq!(run_one.considered, 1);
    assert_eq!(run_one.imported, 1);
    assert_eq!(run_one.unchanged, 0);
    assert_eq!(run_one.imports.len(), 1);
    drop(first);

    let _second = StubEngine::install(
        r#"
cat >/dev/null
emit "[GNUPG:] IMPORT_OK 0 3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E"
emit "[GNUPG:] IMPORT_RES 1 0 0 0 1 0 0 0 0 0 0 0 0 0"
exit 0
"#,
    );
    let keydata = Data::from_bytes(&b"\x30\x82..."[..]);
    ctx.op_import(&keydata).unwrap();
    let run_two = ctx.op_import_result().expect("import result");
    assert_eq!(run_two.considered, 1);
    assert_eq!(run_two.unchanged, 1);

    // Cumulative view over both runs.
    let mut merged = run_one;
    merged.merge(&run_two);
    assert_eq!(merged.considered, 1, "same fingerprint counted once");
    assert_eq!(merged.imports.len(), 2, "both status reports kept");
}

#[test]
fn genkey_reports_created_fingerprint() {
    let _stub = StubEngine::install(
        r#"
cat >/dev/null
emit "[GNUPG:] PROGRESS primegen + 10 100"
emit "[GNUPG:] KEY_CREATED B A0FF4590BB6122EDEF6E3C542D727CC768697734"
exit 0
"#,
    );

    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    let mut ctx = Context::new().unwrap();
    ctx.set_progress_cb(Some(Box::new(move |what, ch, cur, total| {
        sink.lock().push((what.to_string(), ch, cur, total));
    })));

    let params = Data::from_bytes(
        &b"<GnupgKeyParms format=\"internal\">\nKey-Type: DSA\n</GnupgKeyParms>\n"[..],
    );
    ctx.op_genkey(&params, None).unwrap();

    let result = ctx.op_genkey_result().expect("genkey result");
    assert!(result.primary && result.sub);
    assert_eq!(
        result.fingerprint.as_deref(),
        Some("A0FF4590BB6122EDEF6E3C542D727CC768697734")
    );
    assert_eq!(
        progress.lock().as_slice(),
        &[("primegen".to_string(), '+', 10, 100)]
    );
}

#[test]
fn trustlist_streams_items() {
    let _stub = StubEngine::install(
        r#"
printf '%s\n' '2:6C7EE1B8621CC013:K::f:f::'
printf '%s\n' '1:6C7EE1B8621CC013:U::u:u:::Joe Tester <joe@example.net>'
exit 0
"#,
    );

    let mut ctx = Context::new().unwrap();
    ctx.op_trustlist_start("joe").unwrap();
    let first = ctx.op_trustlist_next().unwrap();
    let second = ctx.op_trustlist_next().unwrap();
    let end = ctx.op_trustlist_next().unwrap_err();
    ctx.op_trustlist_end().unwrap();

    assert_eq!(first.level, 2);
    assert_eq!(first.keyid, "6C7EE1B8621CC013");
    assert_eq!(second.name.as_deref(), Some("Joe Tester <joe@example.net>"));
    assert!(end.is_eof());
}

#[test]
fn edit_answers_engine_prompts_over_command_fd() {
    let _stub = StubEngine::install(
        r#"
eval "exec 8<&$cmd_fd"
emit "[GNUPG:] GET_LINE keyedit.prompt"
read -r reply <&8
printf '%s' "$reply"
emit "[GNUPG:] GOT_IT"
exit 0
"#,
    );

    let prompts = Arc::new(Mutex::new(Vec::new()));
    let seen = prompts.clone();
    let mut ctx = Context::new().unwrap();
    ctx.set_edit_cb(Some(Box::new(move |status, args| {
        seen.lock().push((status, args.to_string()));
        if status == Status::GetLine {
            Ok(Some("quit".to_string()))
        } else {
            Ok(None)
        }
    })));

    let key = rgpgme::Key {
        subkeys: vec![rgpgme::keys::Subkey {
            fingerprint: Some(FPR.to_string()),
            ..Default::default()
        }],
        ..Default::default()
    };
    let mut out = Data::new();
    ctx.op_edit(&key, &out).unwrap();

    assert_eq!(
        out.take_bytes().unwrap(),
        b"quit",
        "reply must reach the engine over the command channel"
    );
    let log = prompts.lock();
    assert!(
        log.iter().any(|(status, args)| *status == Status::GetLine
            && args == "keyedit.prompt"),
        "prompt must reach the edit callback, got {log:?}"
    );
    assert!(
        log.iter().any(|(status, _)| *status == Status::Eof),
        "EOF marker must reach the edit callback"
    );
}

#[test]
fn cancellation_before_status_leaves_context_reusable() {
    let stub = StubEngine::install("sleep 5\nexit 0\n");

    let mut ctx = Context::new().unwrap();
    let sig = Data::from_bytes(&b"sig"[..]);
    let body = Data::from_bytes(&b"body"[..]);
    ctx.op_verify_start(&sig, Some(&body), None).unwrap();
    ctx.cancel();
    let err = ctx.wait(true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Canceled);
    assert!(!ctx.is_pending(), "context must be recoverable");
    drop(stub);

    // The same context runs a fresh operation afterwards.
    let _stub = StubEngine::install(
        r#"
cat >/dev/null
emit "[GNUPG:] NEWSIG"
emit "[GNUPG:] GOODSIG 3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E x"
emit "[GNUPG:] TRUST_FULLY"
exit 0
"#,
    );
    let sig = Data::from_bytes(&b"sig"[..]);
    let body = Data::from_bytes(&b"body"[..]);
    ctx.op_verify(&sig, Some(&body), None).unwrap();
    assert_eq!(ctx.op_verify_result().unwrap().signatures.len(), 1);
}

#[test]
fn second_start_on_pending_context_is_rejected() {
    let _stub = StubEngine::install("sleep 5\nexit 0\n");

    let mut ctx = Context::new().unwrap();
    let sig = Data::from_bytes(&b"sig"[..]);
    let body = Data::from_bytes(&b"body"[..]);
    ctx.op_verify_start(&sig, Some(&body), None).unwrap();

    let err = ctx
        .op_verify_start(&sig, Some(&body), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    assert!(ctx.is_pending(), "rejection must not disturb the running op");

    ctx.cancel();
    let _ = ctx.wait(true);
}

#[test]
fn export_captures_key_material() {
    let _stub = StubEngine::install(
        r#"
printf 'exported key material'
emit "[GNUPG:] GOT_IT"
exit 0
"#,
    );

    let mut ctx = Context::new().unwrap();
    ctx.set_armor(true);
    let mut keydata = Data::new();
    ctx.op_export(&[FPR.to_string()], &keydata).unwrap();
    assert_eq!(keydata.take_bytes().unwrap(), b"exported key material");
}
