//! Structured Logging Setup via tracing-subscriber
//!
//! Umgebungsvariablen haben Vorrang vor der Konfigurationsdatei:
//! - `SEALFRAME_LOG_LEVEL`: Level oder EnvFilter-Direktive
//! - `SEALFRAME_LOG_FORMAT`: Format (text/json)
//!
//! Ausgabe geht nach stderr; stdout gehoert dem Event-Strom.

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "SEALFRAME_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "SEALFRAME_LOG_FORMAT";

/// Initialisiert das Logging-System
pub fn logging_initialisieren(level: &str, format: &str) -> anyhow::Result<()> {
    let level = wert_waehlen(std::env::var(ENV_LOG_LEVEL).ok(), level);
    let format = wert_waehlen(std::env::var(ENV_LOG_FORMAT).ok(), format);

    let (filter, level_gueltig) = match filter_bauen(&level) {
        Some(filter) => (filter, true),
        None => (EnvFilter::new("info"), false),
    };

    let ergebnis = match format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init(),
    };
    ergebnis.map_err(|e| anyhow::anyhow!("Logging konnte nicht initialisiert werden: {e}"))?;

    if !level_gueltig {
        tracing::warn!(level = %level, "Ungueltiger Log-Level, verwende info");
    }
    if !log_format_gueltig(&format) {
        tracing::warn!(format = %format, "Unbekanntes Log-Format, verwende text");
    }
    Ok(())
}

/// Umgebungswert vor Konfigurationswert; leere Umgebungswerte zaehlen nicht
fn wert_waehlen(env: Option<String>, config: &str) -> String {
    env.filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.to_string())
}

/// Baut den Filter aus Level oder EnvFilter-Direktive; `None` wenn ungueltig
fn filter_bauen(level: &str) -> Option<EnvFilter> {
    EnvFilter::try_new(level).ok()
}

/// Validiert ob ein Log-Format-String gueltig ist
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
