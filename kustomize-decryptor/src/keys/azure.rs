//! Azure Key Vault unwrapping.
//!
//! The bundle carries a service-principal config; a client-credentials token
//! is requested on demand and used against the vault's `unwrapkey` key
//! operation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::keys::http_client;
use crate::sops::metadata::AzureKvKey;

const BACKEND: &str = "azure-kv";
const TOKEN_ENDPOINT_TEMPLATE: &str =
    "https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token";
const DEFAULT_SCOPE: &str = "https://vault.azure.net/.default";
const API_VERSION: &str = "7.4";

/// Service-principal credentials loaded from the `sops.azure-kv` bundle
/// entry.
#[derive(Debug, Clone)]
pub struct KvCredentials {
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AadConfig {
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

/// Parse and validate the AAD config document.
pub fn load_aad_config(data: &[u8]) -> Result<KvCredentials> {
    let config: AadConfig = serde_yaml::from_slice(data).map_err(|err| {
        Error::UnsupportedConfig(format!("invalid Azure Key Vault auth document: {err}"))
    })?;
    match (config.tenant_id, config.client_id, config.client_secret) {
        (Some(tenant_id), Some(client_id), Some(client_secret)) => Ok(KvCredentials {
            tenant_id,
            client_id,
            client_secret,
        }),
        _ => Err(Error::UnsupportedConfig(
            "Azure Key Vault auth config requires tenantId, clientId and clientSecret".into(),
        )),
    }
}

/// Recover the data key wrapped by an Azure Key Vault master key.
pub fn unwrap_data_key(key: &AzureKvKey, credentials: &KvCredentials) -> Result<Vec<u8>> {
    let client = http_client(BACKEND)?;
    let token = request_access_token(&client, credentials)?;

    let url = format!(
        "{}/keys/{}/{}/unwrapkey?api-version={API_VERSION}",
        key.vault_url.trim_end_matches('/'),
        key.name,
        key.version,
    );
    let response = client
        .post(url)
        .bearer_auth(&token)
        .json(&json!({ "alg": "RSA-OAEP-256", "value": key.enc }))
        .send()
        .map_err(|err| service_error(format!("unwrapkey request failed: {err}")))?;

    let status = response.status();
    let body = response.text().unwrap_or_default();
    if !status.is_success() {
        return Err(service_error(format!("unwrapkey failed: {status} {body}")));
    }

    let value: serde_json::Value = serde_json::from_str(&body)
        .map_err(|err| service_error(format!("failed to parse unwrapkey response: {err}")))?;
    let unwrapped = value
        .get("value")
        .and_then(|value| value.as_str())
        .ok_or_else(|| service_error("unwrapkey response missing value".into()))?;
    URL_SAFE_NO_PAD
        .decode(unwrapped)
        .map_err(|err| service_error(format!("failed to decode unwrapped key: {err}")))
}

fn request_access_token(
    client: &reqwest::blocking::Client,
    credentials: &KvCredentials,
) -> Result<String> {
    let url = TOKEN_ENDPOINT_TEMPLATE.replace("{tenant}", &credentials.tenant_id);
    let params = [
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("scope", DEFAULT_SCOPE),
        ("grant_type", "client_credentials"),
    ];
    let response = client
        .post(url)
        .form(&params)
        .send()
        .map_err(|err| service_error(format!("token request failed: {err}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        return Err(service_error(format!(
            "token endpoint rejected the request: {status} {body}"
        )));
    }

    let payload: TokenResponse = response
        .json()
        .map_err(|err| service_error(format!("failed to parse token response: {err}")))?;
    Ok(payload.access_token)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn service_error(reason: String) -> Error {
    Error::KeyService {
        backend: BACKEND,
        reason,
    }
}
