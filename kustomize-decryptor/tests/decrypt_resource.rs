//! The in-memory builder hook: envelope resources and Secrets with
//! encrypted data fields.

mod common;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::{age_metadata, decryptor_with_identity, sops_decryption, MemoryClient};
use kustomize_decryptor::decryptor::{Decryption, Decryptor, DecryptorOptions};
use kustomize_decryptor::sops::metadata::Metadata;
use kustomize_decryptor::{is_sops_encrypted_resource, Format};
use serde_json::json;

fn secret_resource(data: serde_json::Value) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": "secret", "namespace": "test"},
        "data": data,
    })
}

#[test]
fn decrypts_sops_encrypted_resource() {
    let tmp = tempfile::tempdir().unwrap();
    let (decryptor, recipient) = decryptor_with_identity(tmp.path());

    let secret = secret_resource(json!({"key": "value"}));
    assert!(!is_sops_encrypted_resource(&secret));

    let plain = serde_json::to_vec_pretty(&secret).unwrap();
    let metadata = Metadata {
        encrypted_regex: Some("^(data|stringData)$".into()),
        ..age_metadata(&recipient)
    };
    let encrypted_bytes = decryptor
        .sops_encrypt_with_format(metadata, &plain, Format::Json, Format::Json)
        .unwrap();
    let encrypted: serde_json::Value = serde_json::from_slice(&encrypted_bytes).unwrap();
    assert!(is_sops_encrypted_resource(&encrypted));

    let got = decryptor.decrypt_resource(&encrypted).unwrap().unwrap();
    assert_eq!(got, secret);
}

#[test]
fn decrypts_binary_secret_data_field_back_to_its_key_format() {
    let tmp = tempfile::tempdir().unwrap();
    let (decryptor, recipient) = decryptor_with_identity(tmp.path());

    let plain = b"[config]\napp = secret\n\n";
    let encrypted = decryptor
        .sops_encrypt_with_format(age_metadata(&recipient), plain, Format::Ini, Format::Yaml)
        .unwrap();

    let secret = secret_resource(json!({"file.ini": STANDARD.encode(&encrypted)}));
    assert!(!is_sops_encrypted_resource(&secret));

    let got = decryptor.decrypt_resource(&secret).unwrap().unwrap();
    assert_eq!(
        got["data"]["file.ini"],
        json!(STANDARD.encode(plain.as_slice()))
    );
}

#[test]
fn decrypts_yaml_secret_data_field() {
    let tmp = tempfile::tempdir().unwrap();
    let (decryptor, recipient) = decryptor_with_identity(tmp.path());

    let plain = b"structured:\n  data:\n    key: value\n";
    let encrypted = decryptor
        .sops_encrypt_with_format(age_metadata(&recipient), plain, Format::Yaml, Format::Yaml)
        .unwrap();

    let secret = secret_resource(json!({"key.yaml": STANDARD.encode(&encrypted)}));
    let got = decryptor.decrypt_resource(&secret).unwrap().unwrap();
    assert_eq!(
        got["data"]["key.yaml"],
        json!(STANDARD.encode(plain.as_slice()))
    );
}

#[test]
fn decrypts_string_data_field_without_base64() {
    let tmp = tempfile::tempdir().unwrap();
    let (decryptor, recipient) = decryptor_with_identity(tmp.path());

    let plain = b"var=value\n";
    let encrypted = decryptor
        .sops_encrypt_with_format(
            age_metadata(&recipient),
            plain,
            Format::Dotenv,
            Format::Dotenv,
        )
        .unwrap();

    let secret = json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": "secret", "namespace": "test"},
        "stringData": {"app.env": String::from_utf8(encrypted).unwrap()},
    });
    let got = decryptor.decrypt_resource(&secret).unwrap().unwrap();
    assert_eq!(got["stringData"]["app.env"], json!("var=value\n"));
}

#[test]
fn plaintext_data_fields_are_left_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let (decryptor, _) = decryptor_with_identity(tmp.path());

    let secret = secret_resource(json!({"year": STANDARD.encode("2021")}));
    let got = decryptor.decrypt_resource(&secret).unwrap().unwrap();
    assert_eq!(got, secret);

    // Idempotence: a second pass changes nothing either.
    let again = decryptor.decrypt_resource(&got).unwrap().unwrap();
    assert_eq!(again, got);
}

#[test]
fn non_secret_resources_pass_through() {
    let tmp = tempfile::tempdir().unwrap();
    let (decryptor, _) = decryptor_with_identity(tmp.path());

    let deployment = json!({"apiVersion": "apps/v1", "kind": "Deployment"});
    assert!(decryptor.decrypt_resource(&deployment).unwrap().is_none());
}

#[test]
fn no_decryption_spec_keeps_the_resource() {
    let decryptor = Decryptor::new(
        "/tmp",
        Box::new(MemoryClient::empty()),
        None,
        DecryptorOptions::default(),
    );
    let resource = json!({});
    assert!(decryptor.decrypt_resource(&resource).unwrap().is_none());
}

#[test]
fn unimplemented_provider_keeps_the_resource() {
    let decryptor = Decryptor::new(
        "/tmp",
        Box::new(MemoryClient::empty()),
        Some(Decryption {
            provider: "not-supported".into(),
            secret_ref: None,
        }),
        DecryptorOptions::default(),
    );
    let resource = json!({});
    assert!(decryptor.decrypt_resource(&resource).unwrap().is_none());
}

#[test]
fn invalid_base64_in_data_field_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let (decryptor, _) = decryptor_with_identity(tmp.path());

    let secret = secret_resource(json!({"bad": "%%% not base64 %%%"}));
    let err = decryptor.decrypt_resource(&secret).unwrap_err();
    assert!(err
        .to_string()
        .contains("failed to base64 decode Secret data field 'bad'"));
}

#[test]
fn missing_identity_surfaces_no_data_key_for_data_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let (encrypting, recipient) = decryptor_with_identity(tmp.path());
    let encrypted = encrypting
        .sops_encrypt_with_format(
            age_metadata(&recipient),
            b"key=value\n",
            Format::Dotenv,
            Format::Dotenv,
        )
        .unwrap();

    let keyless = Decryptor::new(
        tmp.path(),
        Box::new(MemoryClient::empty()),
        sops_decryption("missing"),
        DecryptorOptions::default(),
    );
    let secret = secret_resource(json!({"app.env": STANDARD.encode(&encrypted)}));
    let err = keyless.decrypt_resource(&secret).unwrap_err();
    assert_eq!(err.to_string(), "cannot get sops data key");
}
