//! Sealframe Worker – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und verbindet stdin
//! und stdout mit der E2E-Session.

use anyhow::Result;
use sealframe_worker::{bruecke_ausfuehren, logging::logging_initialisieren, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("SEALFRAME_CONFIG").unwrap_or_else(|_| "sealframe.toml".into());
    let datei_vorhanden = std::path::Path::new(&config_pfad).exists();

    let config = WorkerConfig::laden(&config_pfad)?;
    logging_initialisieren(&config.logging.level, &config.logging.format)?;

    if !datei_vorhanden {
        tracing::warn!(
            pfad = %config_pfad,
            "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
        );
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Sealframe Worker wird gestartet"
    );

    let eingabe = tokio::io::BufReader::new(tokio::io::stdin());
    bruecke_ausfuehren(eingabe, tokio::io::stdout(), config.session_konfig()).await?;

    tracing::info!("Sealframe Worker beendet");
    Ok(())
}
