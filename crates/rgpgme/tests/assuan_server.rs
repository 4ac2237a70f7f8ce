// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// End-to-end tests of the Assuan driver against a scripted server: a
// shell script speaking the OK/ERR/S/D/INQUIRE dialogue on
// stdin/stdout, the way the CMS engine's --server mode does.

#![cfg(unix)]

use std::io::Write as _;
use std::os::unix::fs::PermissionsExt as _;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use rgpgme::{config, Context, Data, ErrorKind, Protocol, SigMode, SigSummary, Validity};

static ENGINE_GUARD: Mutex<()> = Mutex::new(());

/// Script prelude: greeting plus a dispatch loop; the per-test body
/// supplies `handle_command` handling everything beyond options.
const SERVER_PRELUDE: &str = r#"#!/bin/sh
printf 'OK rgpgme stub server ready\n'
while read -r line; do
  case "$line" in
    OPTION*|RESET) printf 'OK\n' ;;
    INPUT*|OUTPUT*|MESSAGE*) printf 'OK\n' ;;
    BYE) exit 0 ;;
    *) handle_command "$line" ;;
  esac
done
exit 0
"#;

struct StubServer {
    _dir: TempDir,
    guard: parking_lot::MutexGuard<'static, ()>,
    previous: config::EngineInfo,
}

impl StubServer {
    fn install(handler: &str) -> Self {
        let guard = ENGINE_GUARD.lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stub-gpgsm");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"#!/bin/sh\n").unwrap();
        file.write_all(handler.as_bytes()).unwrap();
        // The prelude follows the handler so the function is defined
        // before the loop runs.
        file.write_all(SERVER_PRELUDE.trim_start_matches("#!/bin/sh\n").as_bytes())
            .unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let previous = config::engine_info(Protocol::Cms);
        config::set_engine_info(Protocol::Cms, path.display().to_string(), None);
        Self {
            _dir: dir,
            guard,
            previous,
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        config::set_engine_info(
            Protocol::Cms,
            self.previous.file_name.clone(),
            self.previous.home_dir.clone(),
        );
        let _ = &self.guard;
    }
}

fn cms_context() -> Context {
    let mut ctx = Context::new().unwrap();
    ctx.set_protocol(Protocol::Cms).unwrap();
    ctx
}

const FPR: &str = "3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E";

#[test]
fn cms_verify_good_signature() {
    let _stub = StubServer::install(
        r#"handle_command() {
  case "$1" in
    VERIFY)
      printf 'S GOODSIG 3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E\n'
      printf 'S VALIDSIG 3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E 2003-11-24 1069689600 0 3 0 1 2\n'
      printf 'S TRUST_FULLY\n'
      printf 'OK\n'
      ;;
    *) printf 'OK\n' ;;
  esac
}
"#,
    );

    let mut ctx = cms_context();
    let sig = Data::from_bytes(&b"MIAGCSqGSIb3DQEHAqCA..."[..]);
    let body = Data::from_bytes(&b"Hallo Leute!\n"[..]);
    ctx.op_verify(&sig, Some(&body), None).unwrap();

    let result = ctx.op_verify_result().expect("verify result");
    assert_eq!(result.signatures.len(), 1);
    let signature = &result.signatures[0];
    assert_eq!(signature.fingerprint, FPR);
    assert!(signature.status.is_none());
    assert!(signature.summary.has(SigSummary::GREEN | SigSummary::VALID));
    assert_eq!(signature.validity, Validity::Full);
}

#[test]
fn cms_verify_bad_signature() {
    let _stub = StubServer::install(
        r#"handle_command() {
  case "$1" in
    VERIFY)
      printf 'S BADSIG 3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E\n'
      printf 'OK\n'
      ;;
    *) printf 'OK\n' ;;
  esac
}
"#,
    );

    let mut ctx = cms_context();
    let sig = Data::from_bytes(&b"MIAGCSqGSIb3DQEHAqCA..."[..]);
    let body = Data::from_bytes(&b"Hallo Leute?\n"[..]);
    ctx.op_verify(&sig, Some(&body), None).unwrap();

    let signature = &ctx.op_verify_result().unwrap().signatures[0];
    assert_eq!(signature.status, Some(ErrorKind::BadSignature));
    assert!(signature.summary.has(SigSummary::RED));
    assert_eq!(signature.validity, Validity::Unknown);
}

#[test]
fn cms_sign_normal_mode() {
    let _stub = StubServer::install(
        r#"handle_command() {
  case "$1" in
    SIGNER*) printf 'OK\n' ;;
    SIGN)
      printf 'S SIG_CREATED S 1 2 00 1069689600 3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E\n'
      printf 'OK\n'
      ;;
    *) printf 'OK\n' ;;
  esac
}
"#,
    );

    let mut ctx = cms_context();
    let signer = Arc::new(rgpgme::Key {
        subkeys: vec![rgpgme::keys::Subkey {
            fingerprint: Some(FPR.to_string()),
            ..Default::default()
        }],
        ..Default::default()
    });
    ctx.signers_add(signer);

    let input = Data::from_bytes(&b"Hallo Leute!\n"[..]);
    let output = Data::new();
    ctx.op_sign(&input, &output, SigMode::Normal).unwrap();

    let result = ctx.op_sign_result().expect("sign result");
    assert_eq!(result.signatures.len(), 1);
    let created = &result.signatures[0];
    assert_eq!(created.mode, SigMode::Normal);
    assert_eq!(created.pubkey_algo, 1, "RSA");
    assert_eq!(created.hash_algo, 2, "SHA1");
    assert_eq!(created.class, 0);
    assert_eq!(created.fingerprint, FPR);
}

#[test]
fn cms_keylist_three_certificates_with_chain() {
    let _stub = StubServer::install(
        r#"handle_command() {
  case "$1" in
    LISTKEYS*)
      printf 'D crs:u:1024:1:::::::::scESC:%%0A\n'
      printf 'D fpr:::::::::3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E:%%0A\n'
      printf 'D uid:u::::::::CN=test cert 1,OU=Aegypten Project,C=DE:%%0A\n'
      printf 'D crt:u:2048:1:::::::::c:%%0A\n'
      printf 'D fpr:::::::::DFA56FB5FC41E3A8921F77AD1622EEFD9F1B5AD8:%%0A\n'
      printf 'D uid:u::::::::<certify@pca.dfn.de>:%%0A\n'
      printf 'D crt:u:2048:1:::::::::e:%%0A\n'
      printf 'D fpr:::::::::2C8F3C356AB761CB3674835B792CDA652E33C285:::DFA56FB5FC41E3A8921F77AD1622EEFD9F1B5AD8:%%0A\n'
      printf 'D uid:u::::::::CN=DFN Server,O=DFN,C=DE:%%0A\n'
      printf 'OK\n'
      ;;
    *) printf 'OK\n' ;;
  esac
}
"#,
    );

    let mut ctx = cms_context();
    let keys = ctx.keylist_all(None, false).unwrap();

    assert_eq!(keys.len(), 3, "three certificates in listing order");
    assert_eq!(keys[0].fingerprint(), Some(FPR));
    assert!(keys[0].secret, "first certificate has the secret part");
    assert!(
        keys[0].flags.can_encrypt && keys[0].flags.can_sign && keys[0].flags.can_certify,
        "aggregated capabilities from ESC letters"
    );
    assert_eq!(keys[1].user_ids[0].email, "<certify@pca.dfn.de>");
    assert!(!keys[1].secret);
    assert_eq!(
        keys[2].chain_id.as_deref(),
        keys[1].fingerprint(),
        "third certificate chains to the second"
    );
}

#[test]
fn cms_import_certificate_twice() {
    let _stub = StubServer::install(
        r#"handle_command() {
  case "$1" in
    IMPORT)
      printf 'S IMPORT_OK 1 3CF405464F66ED4A7DF45BBDD1E4282E33BDB76E\n'
      printf 'S IMPORT_RES 1 0 1 0 0 0 0 0 0 0 0 0 0 0\n'
      printf 'OK\n'
      ;;
    *) printf 'OK\n' ;;
  esac
}
"#,
    );

    let mut ctx = cms_context();
    let der = Data::from_bytes(&b"\x30\x82\x04..."[..]);
    ctx.op_import(&der).unwrap();

    let result = ctx.op_import_result().expect("import result");
    assert_eq!(result.considered, 1);
    assert_eq!(result.imported, 1);
    assert_eq!(result.imports.len(), 1);
    assert_eq!(result.imports[0].fingerprint, FPR);

    let info = ctx.op_info().expect("operation info");
    assert!(info.contains("<importResult>"), "info was: {info}");
}

#[test]
fn cms_delete_missing_key_fails() {
    let _stub = StubServer::install(
        r#"handle_command() {
  case "$1" in
    DELKEYS*) printf 'ERR 207 No public key\n' ;;
    *) printf 'OK\n' ;;
  esac
}
"#,
    );

    let mut ctx = cms_context();
    let key = rgpgme::Key {
        subkeys: vec![rgpgme::keys::Subkey {
            fingerprint: Some(FPR.to_string()),
            ..Default::default()
        }],
        ..Default::default()
    };
    let err = ctx.op_delete(&key, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoPublicKey);
}

#[test]
fn cms_encrypt_collects_invalid_recipient_but_proceeds() {
    let _stub = StubServer::install(
        r#"handle_command() {
  case "$1" in
    "RECIPIENT BAD"*) printf 'ERR 207 No public key\n' ;;
    RECIPIENT*) printf 'OK\n' ;;
    ENCRYPT) printf 'OK\n' ;;
    *) printf 'OK\n' ;;
  esac
}
"#,
    );

    let good = Arc::new(rgpgme::Key {
        subkeys: vec![rgpgme::keys::Subkey {
            fingerprint: Some(FPR.to_string()),
            ..Default::default()
        }],
        ..Default::default()
    });
    let bad = Arc::new(rgpgme::Key {
        subkeys: vec![rgpgme::keys::Subkey {
            fingerprint: Some("BAD0000000000000000000000000000000000000".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    });

    let mut ctx = cms_context();
    let plain = Data::from_bytes(&b"Hallo Leute!\n"[..]);
    let cipher = Data::new();
    ctx.op_encrypt(&[good, bad], &plain, &cipher, false).unwrap();

    let result = ctx.op_encrypt_result().expect("encrypt result");
    assert_eq!(result.invalid_recipients.len(), 1);
    assert!(result.invalid_recipients[0]
        .fingerprint
        .starts_with("BAD"));
}

#[test]
fn cms_export_succeeds() {
    let _stub = StubServer::install(
        r#"handle_command() {
  printf 'OK\n'
}
"#,
    );

    let mut ctx = cms_context();
    let mut keydata = Data::new();
    ctx.op_export(&[FPR.to_string()], &keydata).unwrap();
    assert_eq!(keydata.take_bytes().unwrap(), b"");
}
