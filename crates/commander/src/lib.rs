//! sealframe-commander – Befehls-Verarbeitung fuer die E2E-Session
//!
//! Alle zustandsaendernden Befehle laufen ueber die [`CommandQueue`] und
//! werden nacheinander von der [`E2eeSession`] ausgefuehrt. Der Frame-Pfad
//! der Cryptors laeuft parallel dazu in eigenen Tasks.

pub mod commands;
pub mod queue;

pub use commands::executor::{E2eeSession, SessionKonfig};
pub use commands::types::Command;
pub use queue::CommandQueue;
