//! Keyframe-Watchdog
//!
//! Fordert pro Video-Track periodisch einen Keyframe an (Sender: erzeugen,
//! Empfaenger: beim Gegenueber anfordern). Damit ist die Zeit begrenzt,
//! die ein Empfaenger nach einem Schluesselwechsel ohne decodierbaren
//! Frame verbringt.
//!
//! - Erster Versuch sofort, danach im festen Intervall
//! - Hoechstens eine offene Anfrage pro Track
//! - Nach `max_fehlversuche` aufeinanderfolgenden Fehlern gibt der Track auf

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use sealframe_core::error::{E2eeError, E2eeResult};
use sealframe_core::types::TrackId;

use crate::transform::KeyframeRequester;

/// Standard-Intervall zwischen zwei Anfragen
pub const STANDARD_INTERVALL: Duration = Duration::from_millis(5000);

/// Standard-Anzahl Fehler bis zum Aufgeben (~1 Minute beim Standard-Intervall)
pub const STANDARD_MAX_FEHLVERSUCHE: u32 = 12;

/// Fehler werden beim ersten und dann bei jedem n-ten Mal geloggt
const LOG_JEDER_NTE_FEHLER: u32 = 12;

/// Watchdog-Konfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub intervall: Duration,
    pub max_fehlversuche: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            intervall: STANDARD_INTERVALL,
            max_fehlversuche: STANDARD_MAX_FEHLVERSUCHE,
        }
    }
}

struct WatchdogEintrag {
    /// Unterscheidet einen Neustart vom alten Task desselben Tracks
    id: u64,
    task: JoinHandle<()>,
}

/// Verwaltet die Keyframe-Timer aller Tracks
pub struct KeyframeWatchdog {
    config: WatchdogConfig,
    tasks: Arc<DashMap<TrackId, WatchdogEintrag>>,
    naechste_id: AtomicU64,
}

impl std::fmt::Debug for KeyframeWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyframeWatchdog")
            .field("config", &self.config)
            .field("aktive_tracks", &self.tasks.len())
            .finish()
    }
}

impl KeyframeWatchdog {
    pub fn neu(config: WatchdogConfig) -> Self {
        Self {
            config,
            tasks: Arc::new(DashMap::new()),
            naechste_id: AtomicU64::new(0),
        }
    }

    /// Startet den Timer fuer `track_id`; ein laufender Timer wird ersetzt
    ///
    /// `anfrage = None` heisst: die Transform-Schnittstelle bietet die
    /// Faehigkeit nicht an. Das zaehlt als Fehlversuch.
    pub fn start(&self, track_id: TrackId, anfrage: Option<Arc<dyn KeyframeRequester>>) {
        let id = self.naechste_id.fetch_add(1, Ordering::Relaxed);
        let spawnen = || {
            tokio::spawn(watchdog_loop(
                self.config,
                track_id.clone(),
                id,
                anfrage,
                Arc::clone(&self.tasks),
            ))
        };

        // Eintrag bleibt gesperrt bis er steht: ein sofort aufgebender Task
        // raeumt erst danach auf
        match self.tasks.entry(track_id.clone()) {
            Entry::Occupied(mut eintrag) => {
                let alt = eintrag.insert(WatchdogEintrag { id, task: spawnen() });
                alt.task.abort();
            }
            Entry::Vacant(eintrag) => {
                eintrag.insert(WatchdogEintrag { id, task: spawnen() });
            }
        }
        tracing::debug!(track_id = %track_id, "Keyframe-Watchdog gestartet");
    }

    /// Stoppt den Timer fuer `track_id`; mehrfacher Aufruf ist harmlos
    pub fn stop(&self, track_id: &TrackId) {
        if let Some((_, eintrag)) = self.tasks.remove(track_id) {
            eintrag.task.abort();
            tracing::debug!(track_id = %track_id, "Keyframe-Watchdog gestoppt");
        }
    }

    /// Laeuft fuer `track_id` ein Timer?
    pub fn ist_aktiv(&self, track_id: &TrackId) -> bool {
        self.tasks.contains_key(track_id)
    }

    pub fn aktive_anzahl(&self) -> usize {
        self.tasks.len()
    }

    /// Stoppt alle Timer
    pub fn alle_stoppen(&self) {
        self.tasks.retain(|_, eintrag| {
            eintrag.task.abort();
            false
        });
    }
}

impl Drop for KeyframeWatchdog {
    fn drop(&mut self) {
        self.alle_stoppen();
    }
}

async fn anfordern(anfrage: Option<&Arc<dyn KeyframeRequester>>) -> E2eeResult<()> {
    match anfrage {
        Some(anfrage) => anfrage.anfordern().await,
        None => Err(E2eeError::UnsupportedCapability(
            "Keyframe-Anforderung nicht verfuegbar".into(),
        )),
    }
}

async fn watchdog_loop(
    config: WatchdogConfig,
    track_id: TrackId,
    id: u64,
    anfrage: Option<Arc<dyn KeyframeRequester>>,
    tasks: Arc<DashMap<TrackId, WatchdogEintrag>>,
) {
    let laufend = Arc::new(AtomicBool::new(false));
    let fehlversuche = Arc::new(AtomicU32::new(0));

    // Erster Tick kommt sofort
    let mut ticker = tokio::time::interval(config.intervall);

    loop {
        ticker.tick().await;

        if fehlversuche.load(Ordering::Acquire) >= config.max_fehlversuche {
            tracing::warn!(
                track_id = %track_id,
                fehlversuche = config.max_fehlversuche,
                "Keyframe-Watchdog gibt auf"
            );
            break;
        }

        if laufend.swap(true, Ordering::AcqRel) {
            tracing::trace!(track_id = %track_id, "Keyframe-Anfrage noch offen, Tick uebersprungen");
            continue;
        }

        let laufend = Arc::clone(&laufend);
        let fehlversuche = Arc::clone(&fehlversuche);
        let anfrage = anfrage.clone();
        let track_id = track_id.clone();
        tokio::spawn(async move {
            match anfordern(anfrage.as_ref()).await {
                Ok(()) => fehlversuche.store(0, Ordering::Release),
                Err(e) => {
                    let n = fehlversuche.fetch_add(1, Ordering::AcqRel) + 1;
                    if n == 1 || n % LOG_JEDER_NTE_FEHLER == 0 {
                        tracing::warn!(
                            track_id = %track_id,
                            fehlversuche = n,
                            fehler = %e,
                            "Keyframe-Anforderung fehlgeschlagen"
                        );
                    }
                }
            }
            laufend.store(false, Ordering::Release);
        });
    }

    // Nur den eigenen Eintrag entfernen, nicht einen inzwischen neu gestarteten
    tasks.remove_if(&track_id, |_, eintrag| eintrag.id == id);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Zaehlt Aufrufe; schlaegt fehl solange `fehler_bis` nicht erreicht ist
    struct Zaehler {
        aufrufe: AtomicU32,
        fehler_bis: u32,
    }

    impl Zaehler {
        fn neu(fehler_bis: u32) -> Arc<Self> {
            Arc::new(Self {
                aufrufe: AtomicU32::new(0),
                fehler_bis,
            })
        }

        fn aufrufe(&self) -> u32 {
            self.aufrufe.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeyframeRequester for Zaehler {
        async fn anfordern(&self) -> E2eeResult<()> {
            let n = self.aufrufe.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fehler_bis {
                Err(E2eeError::intern("Transform weg"))
            } else {
                Ok(())
            }
        }
    }

    /// Haengt bis `freigabe` signalisiert wird
    struct Haengend {
        aufrufe: AtomicU32,
        freigabe: Notify,
    }

    #[async_trait]
    impl KeyframeRequester for Haengend {
        async fn anfordern(&self) -> E2eeResult<()> {
            self.aufrufe.fetch_add(1, Ordering::SeqCst);
            self.freigabe.notified().await;
            Ok(())
        }
    }

    fn track() -> TrackId {
        TrackId::from("video-1")
    }

    async fn warten(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn erster_versuch_sofort_dann_periodisch() {
        let watchdog = KeyframeWatchdog::neu(WatchdogConfig::default());
        let zaehler = Zaehler::neu(0);
        watchdog.start(track(), Some(zaehler.clone()));

        warten(1).await;
        assert_eq!(zaehler.aufrufe(), 1);

        warten(5000).await;
        assert_eq!(zaehler.aufrufe(), 2);

        warten(10_000).await;
        assert_eq!(zaehler.aufrufe(), 4);
        assert!(watchdog.ist_aktiv(&track()));
    }

    #[tokio::test(start_paused = true)]
    async fn gibt_nach_zwoelf_fehlern_auf() {
        let watchdog = KeyframeWatchdog::neu(WatchdogConfig::default());
        let zaehler = Zaehler::neu(u32::MAX);
        watchdog.start(track(), Some(zaehler.clone()));

        warten(120_000).await;
        assert_eq!(zaehler.aufrufe(), 12);
        assert!(!watchdog.ist_aktiv(&track()));

        warten(60_000).await;
        assert_eq!(zaehler.aufrufe(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn fehlende_faehigkeit_zaehlt_als_fehler() {
        let watchdog = KeyframeWatchdog::neu(WatchdogConfig::default());
        watchdog.start(track(), None);
        assert!(watchdog.ist_aktiv(&track()));

        warten(120_000).await;
        assert!(!watchdog.ist_aktiv(&track()));
    }

    #[tokio::test(start_paused = true)]
    async fn erfolg_setzt_fehlerzaehler_zurueck() {
        let watchdog = KeyframeWatchdog::neu(WatchdogConfig::default());
        // 11 Fehler, danach Erfolg
        let zaehler = Zaehler::neu(11);
        watchdog.start(track(), Some(zaehler.clone()));

        warten(200_000).await;
        assert!(zaehler.aufrufe() > 12);
        assert!(watchdog.ist_aktiv(&track()));
    }

    #[tokio::test(start_paused = true)]
    async fn hoechstens_eine_offene_anfrage() {
        let watchdog = KeyframeWatchdog::neu(WatchdogConfig::default());
        let haengend = Arc::new(Haengend {
            aufrufe: AtomicU32::new(0),
            freigabe: Notify::new(),
        });
        watchdog.start(track(), Some(haengend.clone()));

        warten(30_000).await;
        assert_eq!(haengend.aufrufe.load(Ordering::SeqCst), 1);

        haengend.freigabe.notify_waiters();
        warten(5000).await;
        assert_eq!(haengend.aufrufe.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ist_idempotent_und_beendet_timer() {
        let watchdog = KeyframeWatchdog::neu(WatchdogConfig::default());
        let zaehler = Zaehler::neu(0);
        watchdog.start(track(), Some(zaehler.clone()));
        warten(1).await;

        watchdog.stop(&track());
        watchdog.stop(&track());
        assert!(!watchdog.ist_aktiv(&track()));

        warten(60_000).await;
        assert_eq!(zaehler.aufrufe(), 1);

        // Neustart nach Stop funktioniert
        watchdog.start(track(), Some(zaehler.clone()));
        warten(1).await;
        assert_eq!(zaehler.aufrufe(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn ohne_erlaubte_fehlversuche_bleibt_kein_eintrag_zurueck() {
        let watchdog = KeyframeWatchdog::neu(WatchdogConfig {
            intervall: Duration::from_millis(10),
            max_fehlversuche: 0,
        });
        let tracks: Vec<TrackId> = (0..50).map(|i| TrackId::from(format!("t{i}").as_str())).collect();
        for t in &tracks {
            watchdog.start(t.clone(), None);
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(watchdog.aktive_anzahl(), 0);
        assert!(tracks.iter().all(|t| !watchdog.ist_aktiv(t)));
    }

    #[tokio::test(start_paused = true)]
    async fn neustart_ersetzt_laufenden_timer() {
        let watchdog = KeyframeWatchdog::neu(WatchdogConfig::default());
        let zaehler = Zaehler::neu(0);
        watchdog.start(track(), Some(zaehler.clone()));
        watchdog.start(track(), Some(zaehler.clone()));
        assert_eq!(watchdog.aktive_anzahl(), 1);

        warten(1).await;
        assert_eq!(zaehler.aufrufe(), 1);
    }
}
