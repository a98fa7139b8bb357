//! Befehls-Queue
//!
//! Einziger Serialisierungspunkt der Session: Commands werden in
//! Eingangsreihenfolge von genau einem Consumer-Task ausgefuehrt, jeder
//! vollstaendig bevor der naechste beginnt. Die Session gehoert diesem
//! Task, andere Zugriffe auf Schluessel- und Track-Tabellen gibt es nicht.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sealframe_core::error::{E2eeError, E2eeResult};

use crate::commands::executor::E2eeSession;
use crate::commands::types::Command;

/// Ungebundene FIFO-Queue vor einer [`E2eeSession`]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<E2eeSession>,
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("geschlossen", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl CommandQueue {
    /// Startet den Consumer-Task; muss innerhalb einer Tokio-Runtime laufen
    pub fn starten(mut session: E2eeSession) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();

        let task = tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                // Fehler sind bereits als Event oder im Log gemeldet
                let _ = session.ausfuehren(cmd).await;
            }
            tracing::debug!("Befehls-Queue beendet");
            session
        });

        Self { tx, task }
    }

    /// Reiht einen Befehl ein
    pub fn submit(&self, cmd: Command) -> E2eeResult<()> {
        self.tx
            .send(cmd)
            .map_err(|e| E2eeError::intern(format!("Befehls-Queue geschlossen ({})", e.0.art())))
    }

    /// Schliesst die Queue, arbeitet alle eingereihten Befehle ab und gibt die Session zurueck
    pub async fn shutdown(self) -> E2eeResult<E2eeSession> {
        drop(self.tx);
        self.task
            .await
            .map_err(|e| E2eeError::intern(format!("Befehls-Queue abgebrochen: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::executor::SessionKonfig;
    use sealframe_core::event::E2eeEvent;
    use sealframe_core::types::ParticipantIdentity;
    use std::sync::Arc;

    #[tokio::test]
    async fn befehle_laufen_in_eingangsreihenfolge() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = CommandQueue::starten(E2eeSession::neu(SessionKonfig::default(), Arc::new(tx)));

        queue
            .submit(Command::Init {
                key_provider_options: None,
            })
            .unwrap();
        for (i, enabled) in [true, false, true].into_iter().enumerate() {
            queue
                .submit(Command::Enable {
                    participant_identity: ParticipantIdentity::new(format!("p{i}")),
                    enabled,
                })
                .unwrap();
        }

        let session = queue.shutdown().await.unwrap();
        assert!(session.ist_initialisiert());

        assert_eq!(rx.recv().await.unwrap(), E2eeEvent::InitAck { enabled: false });
        for i in 0..3 {
            match rx.recv().await.unwrap() {
                E2eeEvent::Enable {
                    participant_identity,
                    ..
                } => assert_eq!(participant_identity.as_str(), format!("p{i}")),
                andere => panic!("Unerwartetes Event: {andere:?}"),
            }
        }
    }
}
