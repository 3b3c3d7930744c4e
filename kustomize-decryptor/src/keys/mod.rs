//! Key material backends: local identities (age, OpenPGP) and the
//! key-server clients (Vault transit, Azure Key Vault, AWS KMS, GCP KMS)
//! used to recover envelope data keys.

pub mod age;
pub mod aws;
pub mod azure;
pub mod gcp;
pub mod pgp;
pub mod vault;

use std::time::Duration;

/// Timeout applied to every key-server HTTP request.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

pub(crate) fn http_client(
    backend: &'static str,
) -> crate::error::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|err| crate::error::Error::KeyService {
            backend,
            reason: format!("failed to build HTTP client: {err}"),
        })
}
