//! OpenPGP secret keys.
//!
//! The keyring is held in memory and scoped to one decryptor, so concurrent
//! reconciles never observe each other's imported keys.

use pgp::composed::{Deserializable, Message, SignedSecretKey};

use crate::error::{Error, Result};

/// Armored secret keys imported from `*.asc` bundle entries.
#[derive(Default)]
pub struct PgpKeyring(Vec<SignedSecretKey>);

impl PgpKeyring {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Import one armored private key.
    pub fn import(&mut self, armored: &str) -> Result<()> {
        let (key, _headers) = SignedSecretKey::from_string(armored)
            .map_err(|err| Error::Cipher(format!("failed to parse armored OpenPGP key: {err}")))?;
        key.verify()
            .map_err(|err| Error::Cipher(format!("invalid OpenPGP key: {err}")))?;
        self.0.push(key);
        Ok(())
    }

    /// Decrypt an armored OpenPGP message with any of the imported keys.
    pub fn decrypt(&self, armored_message: &str) -> Result<Vec<u8>> {
        if self.0.is_empty() {
            return Err(Error::Cipher("no OpenPGP keys imported".into()));
        }
        let (message, _headers) = Message::from_string(armored_message).map_err(|err| {
            Error::Cipher(format!("failed to parse armored OpenPGP message: {err}"))
        })?;
        let keys: Vec<&SignedSecretKey> = self.0.iter().collect();
        let (mut decrypter, _key_ids) = message
            .decrypt(String::default, &keys)
            .map_err(|err| Error::Cipher(format!("failed to decrypt OpenPGP message: {err}")))?;
        let decrypted = decrypter
            .next()
            .ok_or_else(|| Error::Cipher("OpenPGP message contains no literal data".into()))?
            .map_err(|err| Error::Cipher(format!("failed to decrypt OpenPGP message: {err}")))?;
        decrypted
            .get_content()
            .map_err(|err| Error::Cipher(format!("failed to read OpenPGP message: {err}")))?
            .ok_or_else(|| Error::Cipher("OpenPGP message contains no literal data".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_armor() {
        let mut keyring = PgpKeyring::default();
        assert!(keyring.import("not-a-valid-armored-key").is_err());
        assert!(keyring.is_empty());
    }

    #[test]
    fn empty_keyring_cannot_decrypt() {
        let keyring = PgpKeyring::default();
        assert!(keyring
            .decrypt("-----BEGIN PGP MESSAGE-----\n\n-----END PGP MESSAGE-----\n")
            .is_err());
    }
}
