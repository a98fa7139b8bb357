//! Command-Typen fuer die E2E-Session
//!
//! Ein Command traegt alle Daten, die fuer seine Ausfuehrung noetig sind.
//! `encode`/`decode` enthalten die Frame-Kanaele des Hosts und sind daher
//! nicht serialisierbar; die Uebersetzung vom Wire-Format liegt beim Host.

use std::collections::HashMap;

use uuid::Uuid;

use sealframe_core::types::{Codec, Direction, KeyIndex, ParticipantIdentity, TrackId};
use sealframe_crypto::KeyProviderOptions;
use sealframe_media::TransformBinding;

/// Alle Befehle die die Session versteht
#[derive(Debug)]
pub enum Command {
    // --- Session ---
    /// Session initialisieren; ohne Optionen gelten die konfigurierten Standardwerte
    Init {
        key_provider_options: Option<KeyProviderOptions>,
    },
    /// Verschluesselung fuer einen Teilnehmer ein-/ausschalten
    Enable {
        participant_identity: ParticipantIdentity,
        enabled: bool,
    },

    // --- Schluessel ---
    /// Schluessel-Material installieren
    SetKey {
        participant_identity: Option<ParticipantIdentity>,
        key: Vec<u8>,
        key_index: Option<KeyIndex>,
    },
    /// Slot weiterratchen
    RatchetRequest {
        participant_identity: Option<ParticipantIdentity>,
        key_index: Option<KeyIndex>,
    },

    // --- Tracks ---
    /// Frame-Transform fuer einen Track einrichten (`encode` oder `decode`)
    SetupTransform {
        direction: Direction,
        participant_identity: ParticipantIdentity,
        track_id: TrackId,
        codec: Option<Codec>,
        is_reuse: bool,
        binding: TransformBinding,
    },
    /// Transform eines Tracks entfernen
    RemoveTransform {
        track_id: TrackId,
        participant_identity: ParticipantIdentity,
    },
    /// Codec eines Tracks aendern
    UpdateCodec {
        participant_identity: ParticipantIdentity,
        track_id: TrackId,
        codec: Codec,
    },
    /// RTP Payload-Type -> Codec fuer einen Teilnehmer
    SetRtpMap {
        participant_identity: ParticipantIdentity,
        map: HashMap<u8, Codec>,
    },
    /// SIF-Trailer fuer alle Tracks
    SetSifTrailer { trailer: Vec<u8> },

    // --- Daten-Nachrichten ---
    /// Payload verschluesseln
    EncryptDataRequest {
        participant_identity: Option<ParticipantIdentity>,
        payload: Vec<u8>,
        uuid: Uuid,
    },
    /// Payload entschluesseln
    DecryptDataRequest {
        participant_identity: Option<ParticipantIdentity>,
        payload: Vec<u8>,
        iv: Vec<u8>,
        key_index: KeyIndex,
        uuid: Uuid,
    },
}

impl Command {
    /// Name des Befehls wie im Wire-Protokoll (fuer Logs)
    pub fn art(&self) -> &'static str {
        match self {
            Command::Init { .. } => "init",
            Command::Enable { .. } => "enable",
            Command::SetKey { .. } => "setKey",
            Command::RatchetRequest { .. } => "ratchetRequest",
            Command::SetupTransform {
                direction: Direction::Encode,
                ..
            } => "encode",
            Command::SetupTransform {
                direction: Direction::Decode,
                ..
            } => "decode",
            Command::RemoveTransform { .. } => "removeTransform",
            Command::UpdateCodec { .. } => "updateCodec",
            Command::SetRtpMap { .. } => "setRTPMap",
            Command::SetSifTrailer { .. } => "setSifTrailer",
            Command::EncryptDataRequest { .. } => "encryptDataRequest",
            Command::DecryptDataRequest { .. } => "decryptDataRequest",
        }
    }

    /// Request-ID fuer korrelierte Antworten (nur Payload-Anfragen)
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Command::EncryptDataRequest { uuid, .. } | Command::DecryptDataRequest { uuid, .. } => {
                Some(*uuid)
            }
            _ => None,
        }
    }

    /// Betroffener Teilnehmer (falls der Befehl einen nennt)
    pub fn participant(&self) -> Option<&ParticipantIdentity> {
        match self {
            Command::Enable {
                participant_identity,
                ..
            }
            | Command::SetupTransform {
                participant_identity,
                ..
            }
            | Command::RemoveTransform {
                participant_identity,
                ..
            }
            | Command::UpdateCodec {
                participant_identity,
                ..
            }
            | Command::SetRtpMap {
                participant_identity,
                ..
            } => Some(participant_identity),
            Command::SetKey {
                participant_identity,
                ..
            }
            | Command::RatchetRequest {
                participant_identity,
                ..
            }
            | Command::EncryptDataRequest {
                participant_identity,
                ..
            }
            | Command::DecryptDataRequest {
                participant_identity,
                ..
            } => participant_identity.as_ref(),
            Command::Init { .. } | Command::SetSifTrailer { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_nur_fuer_payload_anfragen() {
        let uuid = Uuid::new_v4();
        let cmd = Command::EncryptDataRequest {
            participant_identity: None,
            payload: vec![1],
            uuid,
        };
        assert_eq!(cmd.request_id(), Some(uuid));
        assert_eq!(cmd.art(), "encryptDataRequest");

        let cmd = Command::Enable {
            participant_identity: ParticipantIdentity::from("alice"),
            enabled: true,
        };
        assert_eq!(cmd.request_id(), None);
        assert_eq!(cmd.participant().map(|p| p.as_str()), Some("alice"));
    }

    #[test]
    fn setup_transform_art_nach_richtung() {
        let (binding, _ein, _aus) = TransformBinding::kanaele(1);
        let cmd = Command::SetupTransform {
            direction: Direction::Decode,
            participant_identity: ParticipantIdentity::from("bob"),
            track_id: TrackId::from("t"),
            codec: None,
            is_reuse: false,
            binding,
        };
        assert_eq!(cmd.art(), "decode");
    }
}
