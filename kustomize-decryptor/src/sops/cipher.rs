//! The per-value cipher of the envelope format.
//!
//! Each leaf is encrypted independently with AES-256-GCM under the shared
//! data key, a fresh 32-byte IV, a detached 16-byte tag, and the colon-joined
//! tree path as additional data. The serialized form is
//! `ENC[AES256_GCM,data:<b64>,iv:<b64>,tag:<b64>,type:<ty>]`.

use aes_gcm::aead::consts::U32;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;

use crate::error::{Error, Result};
use crate::sops::tree::{scalar_bytes, TreeValue};

const IV_LEN: usize = 32;
const TAG_LEN: usize = 16;

type SopsAesGcm = AesGcm<Aes256, U32>;

/// Encrypt a scalar leaf into its `ENC[...]` form.
pub fn encrypt_value(value: &TreeValue, data_key: &[u8], aad: &str) -> Result<String> {
    let plaintext = scalar_bytes(value)?;
    let value_type = match value {
        TreeValue::String(_) => "str",
        TreeValue::Int(_) => "int",
        TreeValue::Float(_) => "float",
        TreeValue::Bool(_) => "bool",
        _ => unreachable!("scalar_bytes rejects non-scalars"),
    };

    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);

    let cipher = SopsAesGcm::new_from_slice(data_key)
        .map_err(|_| Error::Cipher("data key must be 32 bytes".into()))?;
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &plaintext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| Error::Cipher("failed to encrypt value".into()))?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(format!(
        "ENC[AES256_GCM,data:{},iv:{},tag:{},type:{}]",
        STANDARD.encode(ciphertext),
        STANDARD.encode(iv),
        STANDARD.encode(tag),
        value_type,
    ))
}

/// Decrypt an `ENC[...]` string back into a typed scalar.
pub fn decrypt_value(encrypted: &str, data_key: &[u8], aad: &str) -> Result<TreeValue> {
    let inner = encrypted
        .strip_prefix("ENC[")
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| {
            Error::Cipher("input string does not match the sops encrypted value format".into())
        })?;

    let mut segments = inner.split(',');
    let algorithm = segments.next().unwrap_or_default();
    if algorithm != "AES256_GCM" {
        return Err(Error::Cipher(format!("unsupported cipher: {algorithm}")));
    }

    let mut data = None;
    let mut iv = None;
    let mut tag = None;
    let mut value_type = "str";
    for segment in segments {
        let (key, value) = segment
            .split_once(':')
            .ok_or_else(|| Error::Cipher(format!("malformed encrypted value segment: {segment}")))?;
        match key {
            "data" => data = Some(value),
            "iv" => iv = Some(value),
            "tag" => tag = Some(value),
            "type" => value_type = value,
            _ => {}
        }
    }

    let data = decode_field(data, "data")?;
    let iv = decode_field(iv, "iv")?;
    let tag = decode_field(tag, "tag")?;
    if iv.len() != IV_LEN {
        return Err(Error::Cipher(format!(
            "invalid iv length: {} (expected {IV_LEN})",
            iv.len()
        )));
    }
    if tag.len() != TAG_LEN {
        return Err(Error::Cipher(format!(
            "invalid tag length: {} (expected {TAG_LEN})",
            tag.len()
        )));
    }

    let cipher = SopsAesGcm::new_from_slice(data_key)
        .map_err(|_| Error::Cipher("data key must be 32 bytes".into()))?;
    let mut combined = data;
    combined.extend_from_slice(&tag);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &combined,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| Error::Cipher("could not decrypt value with AES256_GCM".into()))?;

    let text = String::from_utf8(plaintext)
        .map_err(|_| Error::Cipher("decrypted value is not valid UTF-8".into()))?;
    typed_value(&text, value_type)
}

fn decode_field(field: Option<&str>, name: &str) -> Result<Vec<u8>> {
    let field =
        field.ok_or_else(|| Error::Cipher(format!("missing '{name}' in encrypted value")))?;
    STANDARD
        .decode(field)
        .map_err(|err| Error::Cipher(format!("invalid base64 in '{name}': {err}")))
}

fn typed_value(text: &str, value_type: &str) -> Result<TreeValue> {
    match value_type {
        "str" | "bytes" => Ok(TreeValue::String(text.to_string())),
        "int" => text
            .parse::<i64>()
            .map(TreeValue::Int)
            .map_err(|_| Error::Cipher(format!("invalid integer value: {text}"))),
        "float" => text
            .parse::<f64>()
            .map(TreeValue::Float)
            .map_err(|_| Error::Cipher(format!("invalid float value: {text}"))),
        "bool" => Ok(TreeValue::Bool(text.eq_ignore_ascii_case("true"))),
        other => Err(Error::Cipher(format!("unknown value type: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [42u8; 32];

    #[test]
    fn round_trips_typed_scalars() {
        for value in [
            TreeValue::String("value".into()),
            TreeValue::Int(-7),
            TreeValue::Float(2.5),
            TreeValue::Bool(true),
        ] {
            let enc = encrypt_value(&value, &KEY, "key:").unwrap();
            assert!(enc.starts_with("ENC[AES256_GCM,data:"));
            assert_eq!(decrypt_value(&enc, &KEY, "key:").unwrap(), value);
        }
    }

    #[test]
    fn aad_mismatch_fails() {
        let enc = encrypt_value(&TreeValue::String("value".into()), &KEY, "key:").unwrap();
        let err = decrypt_value(&enc, &KEY, "other:").unwrap_err();
        assert!(err.to_string().contains("could not decrypt value"));
    }

    #[test]
    fn wrong_key_fails() {
        let enc = encrypt_value(&TreeValue::String("value".into()), &KEY, "key:").unwrap();
        let err = decrypt_value(&enc, &[1u8; 32], "key:").unwrap_err();
        assert!(err.to_string().contains("could not decrypt value"));
    }

    #[test]
    fn rejects_foreign_shapes() {
        assert!(decrypt_value("plaintext", &KEY, "key:").is_err());
        assert!(decrypt_value("ENC[incomplete", &KEY, "key:").is_err());
        assert!(decrypt_value("ENC[CHACHA20,data:x,iv:y,tag:z,type:str]", &KEY, "key:").is_err());
    }
}
