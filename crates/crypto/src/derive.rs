//! Schluessel-Ableitung via HKDF-SHA256
//!
//! Aus dem Material eines Slots werden zwei Dinge abgeleitet:
//! - der AES-256-GCM Schluessel fuer Frames und Payloads
//! - das Material der naechsten Ratchet-Generation (Einweg-Funktion)
//!
//! Beide Ableitungen sind reine Funktionen des vorherigen Materials und
//! des Ratchet-Salts. Zwei Seiten mit gleichem Ausgangsschluessel kommen
//! nach N Ratchet-Schritten auf dasselbe Material, ohne dass je Schluessel
//! uebertragen werden.

use hkdf::Hkdf;
use sha2::Sha256;

use sealframe_core::error::{E2eeError, E2eeResult};

use crate::types::{SecretBytes, KEY_LENGTH};

const FRAME_KEY_INFO: &[u8] = b"sealframe-frame-key-v1";
const RATCHET_INFO: &[u8] = b"sealframe-ratchet-v1";

/// HKDF-basierte Key Derivation (allgemein verwendbar)
pub fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> E2eeResult<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|e| E2eeError::intern(format!("HKDF fehlgeschlagen: {e}")))?;
    Ok(okm)
}

/// Leitet den AES-256-GCM Schluessel aus dem Slot-Material ab
pub fn derive_cipher_key(material: &[u8], ratchet_salt: &[u8]) -> E2eeResult<SecretBytes> {
    hkdf_derive(material, ratchet_salt, FRAME_KEY_INFO, KEY_LENGTH).map(SecretBytes::new)
}

/// Leitet das Material der naechsten Ratchet-Generation ab
pub fn ratchet_material(material: &[u8], ratchet_salt: &[u8]) -> E2eeResult<SecretBytes> {
    hkdf_derive(material, ratchet_salt, RATCHET_INFO, KEY_LENGTH).map(SecretBytes::new)
}
