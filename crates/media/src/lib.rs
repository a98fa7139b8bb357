//! sealframe-media – Frame-Transform-Pipeline
//!
//! Verbindet die externe Transform-Schnittstelle mit der Verschluesselung.
//!
//! ## Module
//! - [`transform`] – Frame-Quelle/-Senke und Keyframe-Faehigkeiten des Hosts
//! - [`cryptor`] – FrameCryptor pro Track
//! - [`registry`] – TrackId -> FrameCryptor
//! - [`watchdog`] – Periodische Keyframe-Anforderung pro Video-Track

pub mod cryptor;
pub mod registry;
pub mod transform;
pub mod watchdog;

pub use cryptor::{CryptorSettings, FrameCryptor};
pub use registry::CryptorRegistry;
pub use transform::{FrameSink, FrameSource, KeyframeRequester, TransformBinding};
pub use watchdog::{KeyframeWatchdog, WatchdogConfig};
