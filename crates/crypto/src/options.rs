//! Key-Provider-Konfiguration
//!
//! Wird mit `init` geliefert und danach nur noch gelesen. Alle Felder haben
//! Standardwerte, sodass ein leeres `keyProviderOptions`-Objekt genuegt.

use serde::{Deserialize, Serialize};

/// Standard-Groesse eines Schluessel-Rings (Slots)
pub const STANDARD_RING_GROESSE: usize = 16;

/// Maximale Ring-Groesse (Key-Index ist ein Byte im Frame-Trailer)
pub const MAX_RING_GROESSE: usize = 256;

/// Verhalten fuer Frames eines Cryptors ohne gebundenen Teilnehmer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnboundFramePolicy {
    /// Frames verwerfen
    #[default]
    Drop,
    /// Frames unveraendert weiterleiten
    PassThrough,
}

/// Konfiguration des Key-Providers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeyProviderOptions {
    /// Ein gemeinsamer Schluessel-Ring fuer alle Teilnehmer
    pub shared_key: bool,
    /// Salt fuer Ratchet und Schluessel-Ableitung
    pub ratchet_salt: String,
    /// Anzahl Ratchet-Schritte, die beim Entschluesseln probiert werden
    pub ratchet_window_size: u32,
    /// Erlaubte aufeinanderfolgende Entschluesselungsfehler (-1 = unbegrenzt)
    pub failure_tolerance: i32,
    /// Anzahl Slots pro Schluessel-Ring
    pub keyring_size: usize,
    /// Verhalten fuer Frames ohne gebundenen Teilnehmer
    pub unbound_frames: UnboundFramePolicy,
}

impl Default for KeyProviderOptions {
    fn default() -> Self {
        Self {
            shared_key: false,
            ratchet_salt: "SealframeRatchetSalt".into(),
            ratchet_window_size: 8,
            failure_tolerance: -1,
            keyring_size: STANDARD_RING_GROESSE,
            unbound_frames: UnboundFramePolicy::Drop,
        }
    }
}

impl KeyProviderOptions {
    /// Ring-Groesse begrenzt auf 1..=256
    pub fn ring_groesse(&self) -> usize {
        self.keyring_size.clamp(1, MAX_RING_GROESSE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte() {
        let opts = KeyProviderOptions::default();
        assert!(!opts.shared_key);
        assert_eq!(opts.keyring_size, 16);
        assert_eq!(opts.failure_tolerance, -1);
        assert_eq!(opts.unbound_frames, UnboundFramePolicy::Drop);
    }

    #[test]
    fn teilweises_json_behaelt_standardwerte() {
        let opts: KeyProviderOptions =
            serde_json::from_str(r#"{"sharedKey": true, "ratchetWindowSize": 2}"#).unwrap();
        assert!(opts.shared_key);
        assert_eq!(opts.ratchet_window_size, 2);
        assert_eq!(opts.keyring_size, STANDARD_RING_GROESSE);
    }

    #[test]
    fn ring_groesse_wird_begrenzt() {
        let mut opts = KeyProviderOptions::default();
        opts.keyring_size = 0;
        assert_eq!(opts.ring_groesse(), 1);
        opts.keyring_size = 10_000;
        assert_eq!(opts.ring_groesse(), MAX_RING_GROESSE);
    }

    #[test]
    fn unbound_policy_wire_format() {
        let json = serde_json::to_string(&UnboundFramePolicy::PassThrough).unwrap();
        assert_eq!(json, "\"passThrough\"");
    }
}
