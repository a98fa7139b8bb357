//! JSON-Wire-Format der eingehenden Befehle
//!
//! Eine Zeile pro Befehl: `{"kind": "...", "data": {...}}`. Byte-Felder
//! sind Base64-kodiert. `encode`/`decode` brauchen Frame-Kanaele im selben
//! Prozess und gibt es daher nur ueber die Bibliotheks-API.

use std::collections::HashMap;

use serde::Deserialize;
use uuid::Uuid;

use sealframe_commander::Command;
use sealframe_core::types::{base64_bytes, Codec, KeyIndex, ParticipantIdentity, TrackId};
use sealframe_crypto::KeyProviderOptions;

/// Ein Befehl wie er vom Host kommt
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(
    tag = "kind",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum WireCommand {
    Init {
        #[serde(default)]
        key_provider_options: Option<KeyProviderOptions>,
    },
    Enable {
        participant_identity: ParticipantIdentity,
        enabled: bool,
    },
    SetKey {
        #[serde(default)]
        participant_identity: Option<ParticipantIdentity>,
        #[serde(with = "base64_bytes")]
        key: Vec<u8>,
        #[serde(default)]
        key_index: Option<KeyIndex>,
    },
    RatchetRequest {
        #[serde(default)]
        participant_identity: Option<ParticipantIdentity>,
        #[serde(default)]
        key_index: Option<KeyIndex>,
    },
    #[serde(rename = "setRTPMap")]
    SetRtpMap {
        participant_identity: ParticipantIdentity,
        map: HashMap<u8, Codec>,
    },
    SetSifTrailer {
        #[serde(with = "base64_bytes")]
        trailer: Vec<u8>,
    },
    UpdateCodec {
        participant_identity: ParticipantIdentity,
        track_id: TrackId,
        codec: Codec,
    },
    RemoveTransform {
        track_id: TrackId,
        participant_identity: ParticipantIdentity,
    },
    EncryptDataRequest {
        #[serde(default)]
        participant_identity: Option<ParticipantIdentity>,
        #[serde(with = "base64_bytes")]
        payload: Vec<u8>,
        uuid: Uuid,
    },
    DecryptDataRequest {
        #[serde(default)]
        participant_identity: Option<ParticipantIdentity>,
        #[serde(with = "base64_bytes")]
        payload: Vec<u8>,
        #[serde(with = "base64_bytes")]
        iv: Vec<u8>,
        key_index: KeyIndex,
        uuid: Uuid,
    },
}

impl From<WireCommand> for Command {
    fn from(cmd: WireCommand) -> Self {
        match cmd {
            WireCommand::Init {
                key_provider_options,
            } => Command::Init {
                key_provider_options,
            },
            WireCommand::Enable {
                participant_identity,
                enabled,
            } => Command::Enable {
                participant_identity,
                enabled,
            },
            WireCommand::SetKey {
                participant_identity,
                key,
                key_index,
            } => Command::SetKey {
                participant_identity,
                key,
                key_index,
            },
            WireCommand::RatchetRequest {
                participant_identity,
                key_index,
            } => Command::RatchetRequest {
                participant_identity,
                key_index,
            },
            WireCommand::SetRtpMap {
                participant_identity,
                map,
            } => Command::SetRtpMap {
                participant_identity,
                map,
            },
            WireCommand::SetSifTrailer { trailer } => Command::SetSifTrailer { trailer },
            WireCommand::UpdateCodec {
                participant_identity,
                track_id,
                codec,
            } => Command::UpdateCodec {
                participant_identity,
                track_id,
                codec,
            },
            WireCommand::RemoveTransform {
                track_id,
                participant_identity,
            } => Command::RemoveTransform {
                track_id,
                participant_identity,
            },
            WireCommand::EncryptDataRequest {
                participant_identity,
                payload,
                uuid,
            } => Command::EncryptDataRequest {
                participant_identity,
                payload,
                uuid,
            },
            WireCommand::DecryptDataRequest {
                participant_identity,
                payload,
                iv,
                key_index,
                uuid,
            } => Command::DecryptDataRequest {
                participant_identity,
                payload,
                iv,
                key_index,
                uuid,
            },
        }
    }
}
