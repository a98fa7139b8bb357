//! Gemeinsame Identifikations- und Frame-Typen fuer Sealframe
//!
//! Teilnehmer und Tracks verwenden das Newtype-Pattern um Verwechslungen
//! zwischen den beiden String-IDs zur Compilezeit auszuschliessen.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Slot-Index in einem Schluessel-Ring (zyklisch ueber die Ring-Groesse)
pub type KeyIndex = u8;

/// Identitaet eines Session-Teilnehmers (vom Host vergeben, opak)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantIdentity(pub String);

impl ParticipantIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ParticipantIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Eindeutige Track-ID (vom Host vergeben, opak)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "track:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Codec / Richtung
// ---------------------------------------------------------------------------

/// Medien-Codec eines Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Vp8,
    Vp9,
    Av1,
    H264,
    H265,
    Opus,
    Red,
}

impl Codec {
    /// Gibt true zurueck fuer Video-Codecs
    pub fn is_video(&self) -> bool {
        matches!(
            self,
            Codec::Vp8 | Codec::Vp9 | Codec::Av1 | Codec::H264 | Codec::H265
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Vp8 => "vp8",
            Codec::Vp9 => "vp9",
            Codec::Av1 => "av1",
            Codec::H264 => "h264",
            Codec::H265 => "h265",
            Codec::Opus => "opus",
            Codec::Red => "red",
        }
    }
}

impl FromStr for Codec {
    type Err = String;

    /// Akzeptiert sowohl `vp8` als auch MIME-Typen wie `video/VP8`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.rsplit('/').next().unwrap_or(s).to_ascii_lowercase();
        match name.as_str() {
            "vp8" => Ok(Codec::Vp8),
            "vp9" => Ok(Codec::Vp9),
            "av1" => Ok(Codec::Av1),
            "h264" => Ok(Codec::H264),
            "h265" | "hevc" => Ok(Codec::H265),
            "opus" => Ok(Codec::Opus),
            "red" => Ok(Codec::Red),
            _ => Err(format!("Unbekannter Codec: {s}")),
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Richtung eines Tracks: Encode = ausgehend (Sender), Decode = eingehend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Encode,
    Decode,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Encode => f.write_str("encode"),
            Direction::Decode => f.write_str("decode"),
        }
    }
}

// ---------------------------------------------------------------------------
// EncodedFrame
// ---------------------------------------------------------------------------

/// Art eines kodierten Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// Video-Keyframe
    Key,
    /// Video-Delta-Frame
    Delta,
    /// Audio-Frame
    Audio,
}

/// Ein kodierter Medien-Frame wie ihn die externe Transform-Schnittstelle liefert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Frame-Inhalt (Klartext oder verschluesselt, je nach Richtung)
    pub data: Bytes,
    /// Frame-Art
    pub kind: FrameKind,
    /// RTP-Timestamp
    pub timestamp: u32,
    /// Synchronization Source des Senders
    pub ssrc: u32,
    /// RTP Payload-Type (falls vom Transport bekannt)
    pub payload_type: Option<u8>,
}

impl EncodedFrame {
    /// Erstellt einen Frame ohne Payload-Type
    pub fn neu(data: impl Into<Bytes>, kind: FrameKind, timestamp: u32, ssrc: u32) -> Self {
        Self {
            data: data.into(),
            kind,
            timestamp,
            ssrc,
            payload_type: None,
        }
    }

    /// Ersetzt den Frame-Inhalt und behaelt die Metadaten
    pub fn mit_daten(&self, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Ratchet-Ergebnis
// ---------------------------------------------------------------------------

/// Ergebnis eines Ratchet-Schritts: neues Schluessel-Material + Generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatchetResult {
    /// Abgeleitetes Schluessel-Material der neuen Generation
    #[serde(with = "base64_bytes")]
    pub material: Vec<u8>,
    /// Ratchet-Generation des Slots nach dem Schritt
    pub generation: u32,
}

/// Serde-Helfer: Byte-Felder als Standard-Base64 im JSON
pub mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(text)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_aus_mime_typ() {
        assert_eq!("video/VP8".parse::<Codec>().unwrap(), Codec::Vp8);
        assert_eq!("h264".parse::<Codec>().unwrap(), Codec::H264);
        assert_eq!("audio/opus".parse::<Codec>().unwrap(), Codec::Opus);
        assert!("video/unbekannt".parse::<Codec>().is_err());
    }

    #[test]
    fn video_codecs_erkennen() {
        assert!(Codec::Vp8.is_video());
        assert!(Codec::Av1.is_video());
        assert!(!Codec::Opus.is_video());
        assert!(!Codec::Red.is_video());
    }

    #[test]
    fn identitaet_ist_transparent_serialisiert() {
        let id = ParticipantIdentity::from("alice");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"alice\"");
    }

    #[test]
    fn ratchet_result_base64_roundtrip() {
        let result = RatchetResult {
            material: vec![1, 2, 3, 255],
            generation: 4,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"AQID/w==\""));
        let zurueck: RatchetResult = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, result);
    }

    #[test]
    fn frame_mit_neuen_daten_behaelt_metadaten() {
        let frame = EncodedFrame::neu(vec![1u8, 2, 3], FrameKind::Key, 90_000, 7);
        let neu = frame.mit_daten(vec![9u8]);
        assert_eq!(neu.data.as_ref(), &[9u8]);
        assert_eq!(neu.kind, FrameKind::Key);
        assert_eq!(neu.timestamp, 90_000);
        assert_eq!(neu.ssrc, 7);
    }
}
