//! Payload-Verschluesselung fuer Daten-Nachrichten
//!
//! Einmal-Verschluesselung beliebiger Bytes mit dem aktuellen Schluessel
//! eines Rings. Jede Verschluesselung zieht eine frische Zufalls-Nonce,
//! eine Nonce wird mit demselben Schluessel nie wiederverwendet.
//!
//! Zustandslos: alle Funktionen lesen nur aus dem uebergebenen Ring.

use rand::rngs::OsRng;
use rand::RngCore;

use sealframe_core::error::{E2eeError, E2eeResult};
use sealframe_core::types::KeyIndex;

use crate::cipher::{decrypt_aes256gcm, encrypt_aes256gcm};
use crate::keyring::KeyRing;
use crate::types::IV_LENGTH;

/// Ergebnis einer Payload-Verschluesselung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    /// Ciphertext inkl. 16 Bytes Auth-Tag
    pub payload: Vec<u8>,
    /// Zufaellige 12-Byte Nonce
    pub iv: [u8; IV_LENGTH],
    /// Slot unter dem verschluesselt wurde
    pub key_index: KeyIndex,
}

/// Zustandsloser Payload-Cryptor
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCryptor;

impl PayloadCryptor {
    /// Verschluesselt `payload` mit dem aktuellen Schluessel des Rings
    pub fn encrypt(payload: &[u8], ring: &KeyRing) -> E2eeResult<EncryptedData> {
        let key = ring.current()?;

        let mut iv = [0u8; IV_LENGTH];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = encrypt_aes256gcm(payload, key.cipher_key.as_bytes(), &iv, &[])?;
        Ok(EncryptedData {
            payload: ciphertext,
            iv,
            key_index: key.index,
        })
    }

    /// Entschluesselt mit dem Schluessel am angegebenen `key_index`
    ///
    /// Der Index muss nicht der aktuelle sein: Nachrichten unter einem
    /// aelteren, noch belegten Slot bleiben lesbar.
    pub fn decrypt(
        ciphertext: &[u8],
        iv: &[u8],
        ring: &KeyRing,
        key_index: KeyIndex,
    ) -> E2eeResult<Vec<u8>> {
        let iv: &[u8; IV_LENGTH] = iv.try_into().map_err(|_| {
            E2eeError::UngueltigeDaten(format!(
                "Ungueltige IV-Laenge: erwartet {IV_LENGTH}, erhalten {}",
                iv.len()
            ))
        })?;
        let key = ring.key_at(key_index)?;
        decrypt_aes256gcm(ciphertext, key.cipher_key.as_bytes(), iv, &[])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
