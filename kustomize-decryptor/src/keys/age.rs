//! age X25519 identities.

use std::io::{Read, Write};
use std::iter;

use age::armor::{ArmoredReader, ArmoredWriter, Format};

use crate::error::{Error, Result};

/// The wrapped data key is 32 bytes; anything materially larger is a
/// decompression bomb, not a data key.
const MAX_DECRYPTED_DATA_KEY_SIZE: usize = 1024;

/// Imported age identities, tried together during data key recovery.
#[derive(Default)]
pub struct ParsedIdentities(Vec<age::x25519::Identity>);

impl ParsedIdentities {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Import every identity in `data`. Blank lines and `#` comments are
    /// accepted, one identity per remaining line; a malformed line fails the
    /// whole import and appends nothing.
    pub fn import(&mut self, data: &str) -> Result<()> {
        let identities = parse_identities(data)?;
        self.0.extend(identities);
        Ok(())
    }

    /// Decrypt an armored age ciphertext with any of the imported
    /// identities.
    pub fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>> {
        let decryptor = age::Decryptor::new_buffered(ArmoredReader::new(ciphertext.as_bytes()))
            .map_err(|err| Error::Cipher(format!("failed to parse age ciphertext: {err}")))?;
        if decryptor.is_scrypt() {
            return Err(Error::Cipher(
                "passphrase-encrypted data keys are not supported".into(),
            ));
        }
        let mut reader = decryptor
            .decrypt(self.0.iter().map(|identity| identity as &dyn age::Identity))
            .map_err(|err| Error::Cipher(format!("failed to decrypt data key with age: {err}")))?;

        // Bounded read: the plaintext is a data key, not a payload.
        let mut plaintext = Vec::new();
        let mut buffer = [0u8; 256];
        loop {
            let n = reader
                .read(&mut buffer)
                .map_err(|err| Error::Cipher(format!("failed to read decrypted data: {err}")))?;
            if n == 0 {
                break;
            }
            if plaintext.len() + n > MAX_DECRYPTED_DATA_KEY_SIZE {
                return Err(Error::Cipher(format!(
                    "decrypted data exceeds {MAX_DECRYPTED_DATA_KEY_SIZE} bytes"
                )));
            }
            plaintext.extend_from_slice(&buffer[..n]);
        }
        Ok(plaintext)
    }
}

/// Encrypt a data key to a single age recipient, ASCII-armored.
pub fn encrypt_data_key(recipient: &str, data_key: &[u8]) -> Result<String> {
    let recipient: age::x25519::Recipient = recipient
        .parse()
        .map_err(|err| Error::Cipher(format!("invalid age recipient: {err}")))?;
    let encryptor =
        age::Encryptor::with_recipients(iter::once(&recipient as &dyn age::Recipient))
            .map_err(|err| Error::Cipher(format!("failed to build age encryptor: {err}")))?;

    let mut armored = Vec::new();
    let writer = ArmoredWriter::wrap_output(&mut armored, Format::AsciiArmor)
        .map_err(|err| Error::Cipher(format!("failed to start age armor: {err}")))?;
    let mut stream = encryptor
        .wrap_output(writer)
        .map_err(|err| Error::Cipher(format!("failed to encrypt data key with age: {err}")))?;
    stream
        .write_all(data_key)
        .and_then(|_| stream.finish().and_then(|armor| armor.finish().map(|_| ())))
        .map_err(|err| Error::Cipher(format!("failed to write age ciphertext: {err}")))?;

    String::from_utf8(armored)
        .map_err(|_| Error::Cipher("age armor produced invalid UTF-8".into()))
}

fn parse_identities(data: &str) -> Result<Vec<age::x25519::Identity>> {
    let mut identities = Vec::new();
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let identity = line
            .parse::<age::x25519::Identity>()
            .map_err(|err| Error::Cipher(format!("failed to parse age identity: {err}")))?;
        identities.push(identity);
    }
    if identities.is_empty() {
        return Err(Error::Cipher("no age identities found in data".into()));
    }
    Ok(identities)
}
