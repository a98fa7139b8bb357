//! JSON-Lines-Bruecke zwischen Host-Prozess und Befehls-Queue
//!
//! Liest Befehle zeilenweise, reiht sie in die Queue ein und schreibt jedes
//! Event als eine JSON-Zeile. Ungueltige Zeilen werden geloggt und
//! uebersprungen. Am Ende der Eingabe werden alle offenen Befehle
//! abgearbeitet und die restlichen Events geschrieben.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use sealframe_commander::{Command, CommandQueue, E2eeSession, SessionKonfig};
use sealframe_core::event::E2eeEvent;

use crate::wire::WireCommand;

/// Betreibt die Bruecke bis die Eingabe endet
pub async fn bruecke_ausfuehren<R, W>(
    eingabe: R,
    mut ausgabe: W,
    konfig: SessionKonfig,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<E2eeEvent>();
    let queue = CommandQueue::starten(E2eeSession::neu(konfig, Arc::new(event_tx)));

    let leser = async move {
        let mut zeilen = eingabe.lines();
        let mut zeilen_nr: u64 = 0;
        while let Some(zeile) = zeilen.next_line().await? {
            zeilen_nr += 1;
            if zeile.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WireCommand>(&zeile) {
                Ok(cmd) => queue
                    .submit(Command::from(cmd))
                    .map_err(|e| anyhow::anyhow!("{e}"))?,
                Err(e) => {
                    tracing::warn!(zeile = zeilen_nr, fehler = %e, "Ungueltiger Befehl verworfen");
                }
            }
        }

        tracing::info!(befehle = zeilen_nr, "Eingabe beendet, arbeite offene Befehle ab");
        let session = queue
            .shutdown()
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        // Mit der Session faellt der letzte Event-Sender weg
        drop(session);
        anyhow::Ok(())
    };

    let schreiber = async {
        while let Some(event) = event_rx.recv().await {
            let mut zeile = serde_json::to_string(&event)?;
            zeile.push('\n');
            ausgabe.write_all(zeile.as_bytes()).await?;
            ausgabe.flush().await?;
        }
        anyhow::Ok(())
    };

    let (gelesen, geschrieben) = tokio::join!(leser, schreiber);
    gelesen?;
    geschrieben?;
    Ok(())
}
