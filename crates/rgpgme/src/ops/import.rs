// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Import state machine.
//!
//! Counts `IMPORTED`/`IMPORT_OK`/`IMPORT_PROBLEM` reports, parses the
//! final `IMPORT_RES` counter line, and mirrors every record into the
//! operation-info XML the way callers inspect it.

use crate::error::Result;
use crate::ops::results::{ImportResult, ImportStatus};
use crate::ops::{map_engine_error, OpHost};
use crate::protocol::escape::xml_escape_into;
use crate::protocol::status::Status;
use crate::Protocol;

/// Import operation state.
#[derive(Debug, Default)]
pub struct ImportOp;

const IMPORTED_FIELDS: &[&str] = &["keyid", "username"];
const IMPORTED_FIELDS_X509: &[&str] = &["fpr"];
const IMPORT_RES_FIELDS: &[&str] = &[
    "count",
    "no_user_id",
    "imported",
    "imported_rsa",
    "unchanged",
    "n_uids",
    "n_subk",
    "n_sigs",
    "n_revoc",
    "sec_read",
    "sec_imported",
    "sec_dups",
    "skipped_new",
];

fn append_xml_record(host: &mut OpHost, tag: &str, names: &[&str], args: &str) {
    host.op_info_open();
    host.op_info
        .extend_from_slice(format!("  <{tag}>\n").as_bytes());
    let mut fields = args.splitn(names.len(), ' ');
    for name in names {
        let value = fields.next().unwrap_or("");
        host.op_info
            .extend_from_slice(format!("    <{name}>").as_bytes());
        xml_escape_into(&mut host.op_info, value.as_bytes());
        host.op_info
            .extend_from_slice(format!("</{name}>\n").as_bytes());
    }
    host.op_info
        .extend_from_slice(format!("  </{tag}>\n").as_bytes());
}

impl ImportOp {
    fn result<'a>(host: &'a mut OpHost) -> &'a mut ImportResult {
        host.slots.import.get_or_insert_with(ImportResult::default)
    }

    pub fn on_status(&mut self, host: &mut OpHost, code: Status, args: &str) -> Result<()> {
        match code {
            Status::Imported => {
                Self::result(host).imported += 1;
                // The CMS engine reports a fingerprint where the
                // OpenPGP engine reports key id and user id.
                let first = args.split(' ').next().unwrap_or("");
                let names = if host.protocol == Protocol::Cms || first.len() > 16 {
                    IMPORTED_FIELDS_X509
                } else {
                    IMPORTED_FIELDS
                };
                append_xml_record(host, "import", names, args);
            }

            Status::ImportOk => {
                // <flags> <fpr>
                let mut fields = args.split(' ');
                let status: u32 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                let fingerprint = fields.next().unwrap_or("").to_string();
                Self::result(host).imports.push(ImportStatus {
                    fingerprint,
                    error: None,
                    status,
                });
            }

            Status::ImportProblem => {
                // <reason> <fpr>
                let mut fields = args.split(' ');
                let reason = fields.next().unwrap_or("0");
                let fingerprint = fields.next().unwrap_or("").to_string();
                Self::result(host).imports.push(ImportStatus {
                    fingerprint,
                    error: Some(map_engine_error(reason)),
                    status: 0,
                });
            }

            Status::ImportRes => {
                let result = Self::result(host);
                let mut fields = args.split(' ');
                let mut next = || fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                result.considered = next();
                result.no_user_id = next();
                result.imported = next();
                result.imported_rsa = next();
                result.unchanged = next();
                result.new_user_ids = next();
                result.new_sub_keys = next();
                result.new_signatures = next();
                result.new_revocations = next();
                result.secret_read = next();
                result.secret_imported = next();
                result.secret_unchanged = next();
                result.skipped_v3_keys = next();
                result.not_imported = next();
                append_xml_record(host, "importResult", IMPORT_RES_FIELDS, args);
            }

            _ => {}
        }
        Ok(())
    }

    pub fn on_eof(&mut self, host: &mut OpHost) -> Result<()> {
        Self::result(host);
        host.op_info_close();
        Ok(())
    }
}
