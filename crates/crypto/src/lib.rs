//! # sealframe-crypto
//!
//! Schluessel-Verwaltung und Verschluesselung fuer Sealframe.
//!
//! ## Module
//! - `keyring` - Ring aus Schluessel-Slots mit Ratchet und Fehlertoleranz
//! - `directory` - Identitaet -> KeyRing, Shared- und Per-Teilnehmer-Modus
//! - `frame` - Codec-bewusste Frame-Verschluesselung (AES-256-GCM)
//! - `payload` - Einmal-Verschluesselung fuer Daten-Nachrichten
//! - `derive` - HKDF-SHA256 Ableitungen
//! - `options` - Key-Provider-Konfiguration
//! - `types` - SecretBytes, SlotKey, Konstanten

mod cipher;
pub mod derive;
pub mod directory;
pub mod frame;
pub mod keyring;
pub mod options;
pub mod payload;
pub mod types;

// Bequeme Re-Exports
pub use directory::{KeyDirectory, KeyMode, RatchetListener, RatchetNotification};
pub use frame::{is_server_injected, seal_frame, unencrypted_header_len, SealedFrame};
pub use keyring::KeyRing;
pub use options::{KeyProviderOptions, UnboundFramePolicy};
pub use payload::{EncryptedData, PayloadCryptor};
pub use types::{SecretBytes, SlotKey, IV_LENGTH, KEY_LENGTH, TAG_LENGTH};
