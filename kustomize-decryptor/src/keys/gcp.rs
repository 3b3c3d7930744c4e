//! GCP Cloud KMS unwrapping.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

use crate::error::{Error, Result};
use crate::keys::http_client;
use crate::sops::metadata::GcpKmsKey;

const BACKEND: &str = "gcp-kms";
const KMS_ENDPOINT: &str = "https://cloudkms.googleapis.com/v1";
const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// The `sops.gcp-kms` bundle entry, stored verbatim.
///
/// A `token` field inside the blob wins; otherwise the ambient
/// `GOOGLE_OAUTH_ACCESS_TOKEN` is used, the same bearer-token contract the
/// rest of the GCP tooling follows.
#[derive(Debug, Clone)]
pub struct GcpCredentials(Vec<u8>);

impl GcpCredentials {
    pub fn new(data: &[u8]) -> Self {
        let mut slice = data;
        while let Some((&b'\n', rest)) = slice.split_last() {
            slice = rest;
        }
        Self(slice.to_vec())
    }

    fn bearer_token(&self) -> Result<String> {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&self.0) {
            if let Some(token) = value.get("token").and_then(|token| token.as_str()) {
                return Ok(token.to_string());
            }
        }
        std::env::var(ACCESS_TOKEN_ENV).map_err(|_| Error::KeyService {
            backend: BACKEND,
            reason: format!(
                "credentials carry no token and {ACCESS_TOKEN_ENV} is not set"
            ),
        })
    }
}

/// Recover the data key wrapped by a Cloud KMS master key.
pub fn unwrap_data_key(key: &GcpKmsKey, credentials: &GcpCredentials) -> Result<Vec<u8>> {
    let token = credentials.bearer_token()?;
    let client = http_client(BACKEND)?;
    let url = format!("{KMS_ENDPOINT}/{}:decrypt", key.resource_id);
    let response = client
        .post(url)
        .bearer_auth(token)
        .json(&json!({ "ciphertext": key.enc }))
        .send()
        .map_err(|err| service_error(format!("decrypt request failed: {err}")))?;

    let status = response.status();
    let body = response.text().unwrap_or_default();
    if !status.is_success() {
        return Err(service_error(format!("decrypt failed: {status} {body}")));
    }

    let value: serde_json::Value = serde_json::from_str(&body)
        .map_err(|err| service_error(format!("failed to parse decrypt response: {err}")))?;
    let plaintext = value
        .get("plaintext")
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_newlines_are_trimmed() {
        let credentials = GcpCredentials::new(b"{\"type\": \"service_account\"}\n\n");
        assert_eq!(credentials.0, b"{\"type\": \"service_account\"}");
    }

    #[test]
    fn token_field_wins() {
        let credentials = GcpCredentials::new(b"{\"token\": \"ya29.abc\"}");
        assert_eq!(credentials.bearer_token().unwrap(), "ya29.abc");
    }
}
