//! Worker-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, der Worker laeuft auch ohne Konfigurationsdatei.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "json"
//!
//! [watchdog]
//! interval_ms = 5000
//! max_failures = 12
//!
//! # Standardwerte fuer `init` ohne keyProviderOptions (Schluessel wie im Wire-Format)
//! [key_provider]
//! sharedKey = false
//! ratchetWindowSize = 8
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use sealframe_commander::SessionKonfig;
use sealframe_crypto::KeyProviderOptions;
use sealframe_media::WatchdogConfig;

/// Vollstaendige Worker-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub logging: LoggingEinstellungen,
    pub watchdog: WatchdogEinstellungen,
    pub key_provider: KeyProviderOptions,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder EnvFilter-Direktive ("info", "sealframe_media=debug", ...)
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Keyframe-Watchdog-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogEinstellungen {
    /// Intervall zwischen zwei Keyframe-Anforderungen in Millisekunden
    pub interval_ms: u64,
    /// Aufeinanderfolgende Fehler bis ein Track aufgibt
    pub max_failures: u32,
}

impl Default for WatchdogEinstellungen {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            max_failures: 12,
        }
    }
}

impl WorkerConfig {
    /// Laedt die Konfiguration; fehlt die Datei, gelten die Standardwerte
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Session-Konfiguration fuer die Befehls-Queue
    pub fn session_konfig(&self) -> SessionKonfig {
        SessionKonfig {
            key_provider: self.key_provider.clone(),
            watchdog: WatchdogConfig {
                // Ein Intervall von 0 wuerde den Timer in eine Endlosschleife schicken
                intervall: Duration::from_millis(self.watchdog.interval_ms.max(1)),
                max_fehlversuche: self.watchdog.max_failures,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
