//! AWS KMS unwrapping.
//!
//! The KMS `Decrypt` action is called over plain HTTPS with a SigV4
//! signature derived from the credentials loaded out of the key bundle. The
//! region comes from the master key's ARN.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::keys::http_client;
use crate::sops::metadata::AwsKmsKey;

const BACKEND: &str = "aws-kms";
const SERVICE: &str = "kms";
const TARGET: &str = "TrentService.Decrypt";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

type HmacSha256 = Hmac<Sha256>;

/// Credentials loaded from the `sops.aws-kms` bundle entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsCredentials {
    aws_access_key_id: String,
    aws_secret_access_key: String,
    #[serde(default)]
    aws_session_token: Option<String>,
}

/// Parse and validate the AWS credentials document.
pub fn load_aws_credentials(data: &[u8]) -> Result<AwsCredentials> {
    serde_yaml::from_slice(data).map_err(|err| {
        Error::UnsupportedConfig(format!(
            "AWS KMS credentials require aws_access_key_id and aws_secret_access_key: {err}"
        ))
    })
}

/// Recover the data key wrapped by an AWS KMS master key.
pub fn unwrap_data_key(key: &AwsKmsKey, credentials: &AwsCredentials) -> Result<Vec<u8>> {
    let region = region_from_arn(&key.arn)?;
    let host = format!("kms.{region}.amazonaws.com");
    let body = json!({ "CiphertextBlob": key.enc, "KeyId": key.arn }).to_string();

    let now = Utc::now();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));

    // Canonical request over the headers we send, in sorted order.
    let mut headers: Vec<(&str, String)> = vec![
        ("content-type", CONTENT_TYPE.to_string()),
        ("host", host.clone()),
        ("x-amz-date", amz_date.clone()),
        ("x-amz-target", TARGET.to_string()),
    ];
    if let Some(token) = &credentials.aws_session_token {
        headers.push(("x-amz-security-token", token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(b.0));

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");
    let canonical_request =
        format!("POST\n/\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");

    let scope = format!("{date_stamp}/{region}/{SERVICE}/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let signing_key = derive_signing_key(
        &credentials.aws_secret_access_key,
        &date_stamp,
        &region,
    )?;
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);
    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        credentials.aws_access_key_id,
    );

    let client = http_client(BACKEND)?;
    let mut request = client
        .post(format!("https://{host}/"))
        .header("Content-Type", CONTENT_TYPE)
        .header("X-Amz-Date", &amz_date)
        .header("X-Amz-Target", TARGET)
        .header("Authorization", authorization)
        .body(body);
    if let Some(token) = &credentials.aws_session_token {
        request = request.header("X-Amz-Security-Token", token);
    }
    let response = request
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
        .get("Plaintext")
        .and_then(|value| value.as_str())
        .ok_or_else(|| service_error("decrypt response missing Plaintext".into()))?;
    STANDARD
        .decode(plaintext)
        .map_err(|err| service_error(format!("failed to decode plaintext: {err}")))
}

/// `arn:aws:kms:<region>:<account>:key/<id>` carries the region in its
/// fourth segment.
fn region_from_arn(arn: &str) -> Result<String> {
    arn.split(':')
        .nth(3)
        .filter(|region| !region.is_empty())
        .map(str::to_string)
        .ok_or_else(|| service_error(format!("no region found in key ARN '{arn}'")))
}

fn derive_signing_key(secret: &str, date_stamp: &str, region: &str) -> Result<Vec<u8>> {
    let mut key = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes())?;
    key = hmac_sha256(&key, region.as_bytes())?;
    key = hmac_sha256(&key, SERVICE.as_bytes())?;
    hmac_sha256(&key, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| service_error(format!("failed to derive signature: {err}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn service_error(reason: String) -> Error {
    Error::KeyService {
        backend: BACKEND,
        reason,
    }
}
