//! Ausgehende Ereignisse und Event-Sink
//!
//! Alle Komponenten melden Ergebnisse und Fehler ueber eine einzige
//! `EventSink`. Der Kern kennt den Transport zum Host nicht: die Sink kann
//! ein tokio-Kanal, ein JSON-Writer oder ein Test-Sammler sein.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{E2eeError, ErrorReason};
use crate::types::{base64_bytes, KeyIndex, ParticipantIdentity, RatchetResult};

/// Fehler-Details eines Error-Events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Maschinenlesbarer Grund
    pub reason: ErrorReason,
    /// Menschenlesbare Beschreibung
    pub message: String,
}

impl From<&E2eeError> for ErrorInfo {
    fn from(e: &E2eeError) -> Self {
        Self {
            reason: e.reason(),
            message: e.to_string(),
        }
    }
}

/// Alle Ereignisse die der Kern an den Host meldet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum E2eeEvent {
    /// Bestaetigung von `init`
    InitAck { enabled: bool },
    /// Echo von `enable`
    Enable {
        participant_identity: ParticipantIdentity,
        enabled: bool,
    },
    /// Antwort auf `encryptDataRequest`
    EncryptDataResponse {
        #[serde(with = "base64_bytes")]
        payload: Vec<u8>,
        #[serde(with = "base64_bytes")]
        iv: Vec<u8>,
        key_index: KeyIndex,
        uuid: Uuid,
    },
    /// Antwort auf `decryptDataRequest`
    DecryptDataResponse {
        #[serde(with = "base64_bytes")]
        payload: Vec<u8>,
        uuid: Uuid,
    },
    /// Fehler; `uuid` nur bei korrelierten Payload-Anfragen
    Error {
        error: ErrorInfo,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        uuid: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        participant_identity: Option<ParticipantIdentity>,
    },
    /// Ein Schluessel-Slot wurde weitergeratchet
    RatchetKey {
        /// `None` im Shared-Key-Modus
        participant_identity: Option<ParticipantIdentity>,
        key_index: Option<KeyIndex>,
        ratchet_result: RatchetResult,
    },
}

impl E2eeEvent {
    /// Erstellt ein Error-Event aus einem Fehler
    pub fn fehler(
        e: &E2eeError,
        uuid: Option<Uuid>,
        participant_identity: Option<ParticipantIdentity>,
    ) -> Self {
        Self::Error {
            error: ErrorInfo::from(e),
            uuid,
            participant_identity,
        }
    }
}

/// Ziel fuer ausgehende Ereignisse
pub trait EventSink: Send + Sync + 'static {
    /// Meldet ein Ereignis an den Host
    fn senden(&self, event: E2eeEvent);
}

impl EventSink for mpsc::UnboundedSender<E2eeEvent> {
    fn senden(&self, event: E2eeEvent) {
        // Empfaenger geschlossen: Host ist weg, Ereignis wird verworfen
        let _ = self.send(event);
    }
}
