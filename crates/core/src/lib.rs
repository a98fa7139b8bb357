//! # sealframe-core
//!
//! Gemeinsame Typen, Fehler und Ereignisse fuer die Sealframe
//! Ende-zu-Ende-Verschluesselung von Medien-Frames.
//!
//! ## Module
//! - `types` - Identitaeten, Track-IDs, Codecs, kodierte Frames
//! - `error` - Fehler-Taxonomie und Error-Gruende
//! - `event` - Ausgehende Ereignisse und die `EventSink`

pub mod error;
pub mod event;
pub mod types;

pub use error::{E2eeError, E2eeResult, ErrorReason};
pub use event::{E2eeEvent, ErrorInfo, EventSink};
pub use types::{
    Codec, Direction, EncodedFrame, FrameKind, KeyIndex, ParticipantIdentity, RatchetResult,
    TrackId,
};
