//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use sealframe_core::types::KeyIndex;

/// Laenge eines AES-256-GCM Schluessels in Bytes
pub const KEY_LENGTH: usize = 32;

/// Laenge der AES-GCM Nonce (IV) in Bytes
pub const IV_LENGTH: usize = 12;

/// Laenge des AES-GCM Auth-Tags in Bytes
pub const TAG_LENGTH: usize = 16;

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone, Default)]
pub struct SecretBytes(pub Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Momentaufnahme eines belegten Schluessel-Slots
///
/// Wird aus dem `KeyRing` kopiert, damit Frame- und Payload-Pfad ohne
/// gehaltenen Lock ver- und entschluesseln koennen.
#[derive(Debug, Clone)]
pub struct SlotKey {
    /// Slot-Index im Ring
    pub index: KeyIndex,
    /// Ratchet-Generation des Slots
    pub generation: u32,
    /// Rohes Schluessel-Material (Basis fuer den naechsten Ratchet-Schritt)
    pub material: SecretBytes,
    /// Aus dem Material abgeleiteter AES-256-GCM Schluessel
    pub cipher_key: SecretBytes,
}
