//! Fehlertypen fuer Sealframe
//!
//! Zentraler Fehler-Enum fuer Schluessel-Verwaltung, Frame- und
//! Payload-Verschluesselung. Keiner dieser Fehler beendet den Prozess:
//! schlimmstenfalls wird ein Frame verworfen oder eine Anfrage abgelehnt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{KeyIndex, TrackId};

/// Globaler Result-Alias fuer Sealframe
pub type E2eeResult<T> = std::result::Result<T, E2eeError>;

/// Alle moeglichen Fehler im E2E-Kern
#[derive(Debug, Error)]
pub enum E2eeError {
    // --- Schluessel ---
    #[error("Kein gueltiger Schluessel am aktuellen Index {index}")]
    KeyMissing { index: KeyIndex },

    #[error("Slot {index} wurde nie mit einem Schluessel belegt")]
    NoKeyAtIndex { index: KeyIndex },

    #[error("Authentifizierung fehlgeschlagen (Auth-Tag ungueltig)")]
    AuthenticationFailed,

    // --- Registry ---
    #[error("Fuer {track_id} existiert bereits ein FrameCryptor")]
    DuplicateCryptor { track_id: TrackId },

    // --- Transform-Schnittstelle ---
    #[error("Faehigkeit nicht verfuegbar: {0}")]
    UnsupportedCapability(String),

    // --- Session ---
    #[error("Session nicht initialisiert (init fehlt)")]
    MissingConfiguration,

    #[error("Keine Teilnehmer-Identitaet angegeben und Shared-Key-Modus deaktiviert")]
    MissingParticipant,

    // --- Daten ---
    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl E2eeError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Ordnet den Fehler dem maschinenlesbaren Grund fuer Error-Events zu
    pub fn reason(&self) -> ErrorReason {
        match self {
            Self::KeyMissing { .. } | Self::NoKeyAtIndex { .. } => ErrorReason::MissingKey,
            Self::AuthenticationFailed | Self::UngueltigeDaten(_) => ErrorReason::InvalidKey,
            _ => ErrorReason::InternalError,
        }
    }
}

/// Maschinenlesbarer Grund in ausgehenden Error-Events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorReason {
    /// Kein Schluessel fuer den benoetigten Index
    MissingKey,
    /// Schluessel passt nicht (Authentifizierung fehlgeschlagen)
    InvalidKey,
    /// Sonstiger interner Fehler
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = E2eeError::NoKeyAtIndex { index: 3 };
        assert_eq!(e.to_string(), "Slot 3 wurde nie mit einem Schluessel belegt");
    }

    #[test]
    fn grund_zuordnung() {
        assert_eq!(E2eeError::KeyMissing { index: 0 }.reason(), ErrorReason::MissingKey);
        assert_eq!(E2eeError::NoKeyAtIndex { index: 1 }.reason(), ErrorReason::MissingKey);
        assert_eq!(E2eeError::AuthenticationFailed.reason(), ErrorReason::InvalidKey);
        assert_eq!(
            E2eeError::intern("setup").reason(),
            ErrorReason::InternalError
        );
        assert_eq!(
            E2eeError::MissingConfiguration.reason(),
            ErrorReason::InternalError
        );
    }

    #[test]
    fn grund_serialisierung() {
        let json = serde_json::to_string(&ErrorReason::MissingKey).unwrap();
        assert_eq!(json, "\"MISSING_KEY\"");
    }
}
