//! HashiCorp Vault transit unwrapping.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

use crate::error::{Error, Result};
use crate::keys::http_client;
use crate::sops::metadata::VaultTransitKey;

const BACKEND: &str = "vault";

/// Recover the data key wrapped by a Vault transit master key.
///
/// The ciphertext (`vault:v1:…`) is sent to the decrypt endpoint of the
/// engine path recorded in the envelope, authenticated with the token loaded
/// from the key bundle.
pub fn unwrap_data_key(key: &VaultTransitKey, token: &str) -> Result<Vec<u8>> {
    let client = http_client(BACKEND)?;
    let url = format!(
        "{}/v1/{}/decrypt/{}",
        key.vault_address.trim_end_matches('/'),
        key.engine_path.trim_matches('/'),
        key.key_name,
    );
    let response = client
        .post(url)
        .header("X-Vault-Token", token)
        .json(&json!({ "ciphertext": key.enc }))
        .send()
        .map_err(|err| service_error(format!("transit decrypt request failed: {err}")))?;

    let status = response.status();
    let body = response.text().unwrap_or_default();
    if !status.is_success() {
        return Err(service_error(format!(
            "transit decrypt failed: {status} {body}"
        )));
    }

    let value: serde_json::Value = serde_json::from_str(&body)
        .map_err(|err| service_error(format!("failed to parse transit response: {err}")))?;
    let plaintext = value
        .get("data")
        .and_then(|data| data.get("plaintext"))
        .and_then(|value| value.as_str())
        .ok_or_else(|| service_error("decrypt response missing plaintext".into()))?;
    STANDARD
        .decode(plaintext)
        .map_err(|err| service_error(format!("failed to decode plaintext: {err}")))
}

fn service_error(reason: String) -> Error {
    Error::KeyService {
        backend: BACKEND,
        reason,
    }
}
