use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use super::*;

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

fn scratch_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "sysupdate-core-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(&path).expect("must create scratch dir");
    path
}

#[test]
fn parse_php_manifest() {
    let content = r#"<?php

return [
    'current_version' => '1.2.0',
    'update_version' => '1.3.0',
];
"#;

    let manifest = VersionManifest::parse(content).expect("manifest should parse");
    assert_eq!(manifest.current_version, "1.2.0");
    assert_eq!(manifest.update_version, "1.3.0");
}

#[test]
fn parse_php_manifest_with_array_syntax_comments_and_double_quotes() {
    let content = r#"<?php
// generated by the release script
return array(
    "current_version" => "2.0.1", # previous release
    /* the release being shipped */
    "update_version"  => "2.1.0",
);
"#;

    let manifest = VersionManifest::parse(content).expect("manifest should parse");
    assert_eq!(manifest.current_version, "2.0.1");
    assert_eq!(manifest.update_version, "2.1.0");
}

#[test]
fn parse_php_manifest_ignores_unknown_keys() {
    let content = "<?php return ['name' => 'admin', 'current_version' => '1.0', 'update_version' => '1.1'];";
    let manifest = VersionManifest::parse(content).expect("manifest should parse");
    assert_eq!(manifest.update_version, "1.1");
}

#[test]
fn parse_php_manifest_rejects_non_literal_values() {
    let content = "<?php return ['current_version' => PHP_VERSION, 'update_version' => '1.1'];";
    let err = VersionManifest::parse(content).expect_err("constant values must be rejected");
    assert!(
        err.to_string().contains("must be a string literal"),
        "unexpected error: {err}"
    );
}

#[test]
fn parse_php_manifest_rejects_code() {
    let content = "<?php system('rm -rf /'); return ['current_version' => '1.0', 'update_version' => '1.1'];";
    let manifest = VersionManifest::parse(content);
    assert!(
        manifest.is_err(),
        "function calls must not be accepted as manifest data"
    );
}

#[test]
fn parse_php_manifest_requires_both_versions() {
    let content = "<?php return ['current_version' => '1.0'];";
    let err = VersionManifest::parse(content).expect_err("missing update_version must fail");
    assert!(
        err.to_string().contains("update_version"),
        "unexpected error: {err}"
    );
}

#[test]
fn parse_php_manifest_rejects_blank_version() {
    let content = "<?php return ['current_version' => '  ', 'update_version' => '1.1'];";
    let err = VersionManifest::parse(content).expect_err("blank version must fail");
    assert!(
        err.to_string().contains("current_version must not be empty"),
        "unexpected error: {err}"
    );
}

#[test]
fn parse_php_manifest_handles_escaped_quotes() {
    let content = r"<?php return ['current_version' => '1.0-it\'s', 'update_version' => '1.1'];";
    let manifest = VersionManifest::parse(content).expect("manifest should parse");
    assert_eq!(manifest.current_version, "1.0-it's");
}

#[test]
fn parse_toml_manifest() {
    let content = r#"
current_version = "1.2.0"
update_version = "1.3.0"
"#;
    let manifest = VersionManifest::parse(content).expect("manifest should parse");
    assert_eq!(
        manifest,
        VersionManifest {
            current_version: "1.2.0".to_string(),
            update_version: "1.3.0".to_string(),
        }
    );
}

#[test]
fn load_manifest_reports_path_on_failure() {
    let dir = scratch_dir();
    let path = dir.join(MANIFEST_FILE_NAME);
    fs::write(&path, "<?php return ['current_version' => '1.0'").expect("must write manifest");

    let err = VersionManifest::load(&path).expect_err("truncated manifest must fail");
    assert!(
        err.to_string().contains(MANIFEST_FILE_NAME),
        "unexpected error: {err}"
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn requester_role_check_is_exact() {
    assert!(Requester::super_admin().is_super_admin());
    assert!(Requester::new(["Admin", " Super Admin "]).is_super_admin());
    assert!(!Requester::new(["super admin"]).is_super_admin());
    assert!(!Requester::default().is_super_admin());
}

#[test]
fn upload_rules_report_first_failure() {
    let dir = scratch_dir();

    let missing = UploadedFile::new("update.zip", dir.join("missing.zip"));
    assert_eq!(missing.first_failed_rule(), Some(UploadRule::Required));
    assert_eq!(
        UploadRule::Required.message(),
        "The file field is required."
    );

    let directory = UploadedFile::new("update.zip", &dir);
    assert_eq!(directory.first_failed_rule(), Some(UploadRule::File));

    let text_path = dir.join("notes.txt");
    fs::write(&text_path, b"PK\x03\x04not really").expect("must write upload");
    let wrong_extension = UploadedFile::new("notes.txt", &text_path);
    assert_eq!(wrong_extension.first_failed_rule(), Some(UploadRule::Mimes));
    assert_eq!(
        UploadRule::Mimes.message(),
        "The file must be a file of type: zip."
    );

    let disguised_path = dir.join("disguised.zip");
    fs::write(&disguised_path, b"plain text").expect("must write upload");
    let disguised = UploadedFile::new("disguised.zip", &disguised_path);
    assert_eq!(disguised.first_failed_rule(), Some(UploadRule::Mimes));

    let zip_path = dir.join("update.ZIP");
    fs::write(&zip_path, b"PK\x05\x06\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0").expect("must write upload");
    let valid = UploadedFile::from_path(&zip_path);
    assert_eq!(valid.first_failed_rule(), None);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn uploaded_file_name_strips_client_directories() {
    let upload = UploadedFile::new("..\\..\\evil/update.zip", "/tmp/upload");
    assert_eq!(upload.file_name(), Some("update.zip"));

    let dots = UploadedFile::new("uploads/..", "/tmp/upload");
    assert_eq!(dots.file_name(), None);
}

#[test]
fn response_serializes_error_and_message() {
    let response = UpdateResponse::success("System Updated Successfully");
    assert_eq!(
        response.to_json().expect("must serialize"),
        r#"{"error":false,"message":"System Updated Successfully"}"#
    );
    assert!(UpdateResponse::failure("nope").error);
}

#[test]
fn sha256_hex_matches_known_digest() {
    assert_eq!(
        sha256_hex(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );

    let dir = scratch_dir();
    let path = dir.join("payload.bin");
    fs::write(&path, b"abc").expect("must write payload");
    assert_eq!(
        sha256_file_hex(&path).expect("must hash file"),
        sha256_hex(b"abc")
    );
    let _ = fs::remove_dir_all(dir);
}
