//! sealframe-worker – Host-Anbindung der E2E-Session
//!
//! ## Module
//! - `config` - TOML-Konfiguration des Workers
//! - `logging` - tracing-subscriber Setup (stderr)
//! - `wire` - JSON-Format der eingehenden Befehle
//! - `bridge` - JSON-Lines-Bruecke stdin -> Queue, Events -> stdout

pub mod bridge;
pub mod config;
pub mod logging;
pub mod wire;

pub use bridge::bruecke_ausfuehren;
pub use config::WorkerConfig;
