//! Cryptor-Registry (TrackId -> FrameCryptor)
//!
//! Haelt genau einen Cryptor pro TrackId. Wird eine TrackId fuer einen
//! anderen Teilnehmer wiederverwendet, wird der vorhandene Cryptor
//! umgebunden statt einen zweiten anzulegen.
//!
//! Zusaetzlich merkt sich die Registry Einstellungen, die auch fuer spaeter
//! erstellte Cryptors gelten: Enable-Status pro Teilnehmer, RTP-Maps pro
//! Teilnehmer und den SIF-Trailer. Pro eingerichtetem Track haelt sie die
//! Keyframe-Faehigkeit der Transform-Schnittstelle, damit der Watchdog auch
//! nach einem Codec-Wechsel gestartet werden kann.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use sealframe_core::error::{E2eeError, E2eeResult};
use sealframe_core::event::EventSink;
use sealframe_core::types::{Codec, ParticipantIdentity, TrackId};
use sealframe_crypto::KeyDirectory;

use crate::cryptor::FrameCryptor;
use crate::transform::KeyframeRequester;
use crate::watchdog::{KeyframeWatchdog, WatchdogConfig};

/// Alle FrameCryptors einer Session
pub struct CryptorRegistry {
    directory: Arc<KeyDirectory>,
    events: Arc<dyn EventSink>,
    cryptors: DashMap<TrackId, Arc<FrameCryptor>>,
    enabled: DashMap<ParticipantIdentity, bool>,
    rtp_maps: DashMap<ParticipantIdentity, HashMap<u8, Codec>>,
    sif_trailer: RwLock<Option<Bytes>>,
    keyframe: DashMap<TrackId, Option<Arc<dyn KeyframeRequester>>>,
    watchdog: KeyframeWatchdog,
}

impl std::fmt::Debug for CryptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptorRegistry")
            .field("cryptors", &self.cryptors.len())
            .field("watchdog", &self.watchdog)
            .finish_non_exhaustive()
    }
}

impl CryptorRegistry {
    pub fn neu(
        directory: Arc<KeyDirectory>,
        events: Arc<dyn EventSink>,
        watchdog_config: WatchdogConfig,
    ) -> Self {
        Self {
            directory,
            events,
            cryptors: DashMap::new(),
            enabled: DashMap::new(),
            rtp_maps: DashMap::new(),
            sif_trailer: RwLock::new(None),
            keyframe: DashMap::new(),
            watchdog: KeyframeWatchdog::neu(watchdog_config),
        }
    }

    pub fn watchdog(&self) -> &KeyframeWatchdog {
        &self.watchdog
    }

    /// Liefert den Cryptor fuer `track_id` und legt ihn bei Bedarf an
    ///
    /// Ist der vorhandene Cryptor an eine andere (oder keine) Identitaet
    /// gebunden, wird er auf `identity` umgebunden.
    pub fn get_or_create(
        &self,
        identity: &ParticipantIdentity,
        track_id: &TrackId,
    ) -> Arc<FrameCryptor> {
        match self.cryptors.entry(track_id.clone()) {
            Entry::Occupied(eintrag) => {
                let cryptor = Arc::clone(eintrag.get());
                if cryptor.identity().as_ref() != Some(identity) {
                    tracing::info!(
                        track_id = %track_id,
                        participant = %identity,
                        vorher = ?cryptor.identity(),
                        "TrackId wiederverwendet, Cryptor wird umgebunden"
                    );
                    cryptor.set_participant(identity.clone(), self.enabled_fuer(identity));
                    self.teilnehmer_einstellungen_anwenden(&cryptor, identity);
                }
                cryptor
            }
            Entry::Vacant(eintrag) => {
                let cryptor = Arc::new(FrameCryptor::neu(
                    track_id.clone(),
                    identity.clone(),
                    self.enabled_fuer(identity),
                    Arc::clone(&self.directory),
                    Arc::clone(&self.events),
                ));
                cryptor.set_sif_trailer(self.sif_trailer.read().clone());
                self.teilnehmer_einstellungen_anwenden(&cryptor, identity);
                tracing::debug!(track_id = %track_id, participant = %identity, "Cryptor erstellt");
                eintrag.insert(Arc::clone(&cryptor));
                cryptor
            }
        }
    }

    /// Registriert einen extern erstellten Cryptor
    ///
    /// Ein zweiter Cryptor fuer dieselbe TrackId wird abgelehnt; der
    /// vorhandene bleibt in Gebrauch.
    pub fn register(&self, cryptor: Arc<FrameCryptor>) -> E2eeResult<()> {
        match self.cryptors.entry(cryptor.track_id().clone()) {
            Entry::Occupied(_) => {
                let e = E2eeError::DuplicateCryptor {
                    track_id: cryptor.track_id().clone(),
                };
                tracing::error!(fehler = %e, "Doppelter Cryptor, behalte den vorhandenen");
                Err(e)
            }
            Entry::Vacant(eintrag) => {
                eintrag.insert(cryptor);
                Ok(())
            }
        }
    }

    pub fn get(&self, track_id: &TrackId) -> Option<Arc<FrameCryptor>> {
        self.cryptors.get(track_id).map(|c| Arc::clone(&c))
    }

    /// Loest die Bindung des Cryptors fuer `track_id`, falls er an `identity` gebunden ist
    ///
    /// Stoppt immer den Keyframe-Watchdog des Tracks. Der Cryptor bleibt
    /// registriert und kann spaeter wiederverwendet werden. Gibt `false`
    /// zurueck wenn kein passender Cryptor existiert.
    pub fn remove(&self, track_id: &TrackId, identity: &ParticipantIdentity) -> bool {
        self.watchdog.stop(track_id);

        match self.get(track_id) {
            Some(cryptor) if cryptor.identity().as_ref() == Some(identity) => {
                cryptor.unset_participant();
                self.keyframe.remove(track_id);
                tracing::info!(track_id = %track_id, participant = %identity, "Transform entfernt");
                true
            }
            _ => {
                tracing::warn!(
                    track_id = %track_id,
                    participant = %identity,
                    "Kein passender Cryptor zum Entfernen"
                );
                false
            }
        }
    }

    /// Setzt den Enable-Status eines Teilnehmers fuer alle seine Cryptors
    pub fn set_enabled(&self, identity: &ParticipantIdentity, enabled: bool) {
        self.enabled.insert(identity.clone(), enabled);
        for cryptor in self.cryptors_fuer(identity) {
            cryptor.set_enabled(enabled);
        }
    }

    /// Enable-Status eines Teilnehmers (Standard: deaktiviert)
    pub fn enabled_fuer(&self, identity: &ParticipantIdentity) -> bool {
        self.enabled.get(identity).map(|e| *e).unwrap_or(false)
    }

    /// Setzt den SIF-Trailer fuer alle vorhandenen und kuenftigen Cryptors
    pub fn set_sif_trailer(&self, trailer: Option<Bytes>) {
        *self.sif_trailer.write() = trailer.clone();
        for cryptor in self.cryptors.iter() {
            cryptor.set_sif_trailer(trailer.clone());
        }
    }

    /// Setzt die RTP-Map eines Teilnehmers
    pub fn set_rtp_map(&self, identity: &ParticipantIdentity, map: HashMap<u8, Codec>) {
        for cryptor in self.cryptors_fuer(identity) {
            cryptor.set_rtp_map(map.clone());
        }
        self.rtp_maps.insert(identity.clone(), map);
    }

    /// Aendert den Codec eines Tracks; `false` wenn kein passender Cryptor existiert
    ///
    /// Wechselt der Track zwischen Audio und Video, wird der Watchdog
    /// entsprechend gestartet oder gestoppt.
    pub fn update_codec(
        &self,
        identity: &ParticipantIdentity,
        track_id: &TrackId,
        codec: Codec,
    ) -> bool {
        match self.get(track_id) {
            Some(cryptor) if cryptor.identity().as_ref() == Some(identity) => {
                cryptor.set_video_codec(codec);
                self.watchdog_abgleichen(&cryptor);
                true
            }
            _ => false,
        }
    }

    /// Merkt sich die Keyframe-Faehigkeit eines neu eingerichteten Transforms
    ///
    /// Ein Watchdog der alten Einrichtung wird gestoppt.
    pub fn transform_eingerichtet(
        &self,
        cryptor: &FrameCryptor,
        faehigkeit: Option<Arc<dyn KeyframeRequester>>,
    ) {
        let track_id = cryptor.track_id();
        self.watchdog.stop(track_id);
        self.keyframe.insert(track_id.clone(), faehigkeit);
        self.watchdog_abgleichen(cryptor);
    }

    /// Watchdog laeuft genau fuer eingerichtete Tracks mit Video-Codec
    fn watchdog_abgleichen(&self, cryptor: &FrameCryptor) {
        let track_id = cryptor.track_id();
        let ist_video = cryptor.settings().codec.is_some_and(|c| c.is_video());
        if !ist_video {
            self.watchdog.stop(track_id);
            return;
        }
        if self.watchdog.ist_aktiv(track_id) {
            return;
        }
        let Some(faehigkeit) = self.keyframe.get(track_id).map(|f| f.value().clone()) else {
            return;
        };
        self.watchdog.start(track_id.clone(), faehigkeit);
    }

    /// Alle Cryptors die aktuell an `identity` gebunden sind
    pub fn cryptors_fuer(&self, identity: &ParticipantIdentity) -> Vec<Arc<FrameCryptor>> {
        self.cryptors
            .iter()
            .filter(|c| c.identity().as_ref() == Some(identity))
            .map(|c| Arc::clone(c.value()))
            .collect()
    }

    pub fn anzahl(&self) -> usize {
        self.cryptors.len()
    }

    fn teilnehmer_einstellungen_anwenden(
        &self,
        cryptor: &FrameCryptor,
        identity: &ParticipantIdentity,
    ) {
        if let Some(map) = self.rtp_maps.get(identity) {
            cryptor.set_rtp_map(map.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
