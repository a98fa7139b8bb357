//! AES-256-GCM Primitiven fuer Frames und Payloads

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce as AesNonce,
};

use sealframe_core::error::{E2eeError, E2eeResult};

use crate::types::{IV_LENGTH, KEY_LENGTH};

pub(crate) fn encrypt_aes256gcm(
    plaintext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8; IV_LENGTH],
    aad: &[u8],
) -> E2eeResult<Vec<u8>> {
    let cipher = cipher(key_bytes)?;
    let nonce = AesNonce::from_slice(nonce_bytes);

    cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|e| E2eeError::intern(format!("Verschluesselung fehlgeschlagen: {e}")))
}

pub(crate) fn decrypt_aes256gcm(
    ciphertext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8; IV_LENGTH],
    aad: &[u8],
) -> E2eeResult<Vec<u8>> {
    let cipher = cipher(key_bytes)?;
    let nonce = AesNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| E2eeError::AuthenticationFailed)
}

fn cipher(key_bytes: &[u8]) -> E2eeResult<Aes256Gcm> {
    if key_bytes.len() != KEY_LENGTH {
        return Err(E2eeError::intern(format!(
            "Ungueltige Schluessel-Laenge: erwartet {KEY_LENGTH}, erhalten {}",
            key_bytes.len()
        )));
    }
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes)))
}
