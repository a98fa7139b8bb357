//! FrameCryptor – Ver-/Entschluesselung der Frames eines Tracks
//!
//! Ein Cryptor gehoert zu genau einer TrackId. Er ist entweder
//! ungebunden (keine Identitaet) oder an einen Teilnehmer gebunden.
//! Unabhaengig davon schaltet `enabled` zwischen Verschluesselung und
//! unveraendertem Durchreichen um.
//!
//! Der Frame-Pfad laeuft in einem eigenen Task ausserhalb der Befehls-Queue.
//! Befehle tauschen die Einstellungen komplett aus (`Arc<CryptorSettings>`),
//! jeder Frame arbeitet mit genau einem Snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use sealframe_core::error::{E2eeError, E2eeResult};
use sealframe_core::event::{E2eeEvent, EventSink};
use sealframe_core::types::{Codec, Direction, EncodedFrame, ParticipantIdentity, TrackId};
use sealframe_crypto::{
    is_server_injected, seal_frame, KeyDirectory, KeyRing, RatchetNotification, SealedFrame,
    SlotKey, UnboundFramePolicy,
};

use crate::transform::{FrameSink, FrameSource};

/// Einstellungen eines Cryptors, als Ganzes ausgetauscht
#[derive(Debug, Clone, Default)]
pub struct CryptorSettings {
    pub enabled: bool,
    pub identity: Option<ParticipantIdentity>,
    pub codec: Option<Codec>,
    /// RTP Payload-Type -> Codec
    pub rtp_map: HashMap<u8, Codec>,
    pub sif_trailer: Option<Bytes>,
    pub direction: Option<Direction>,
}

/// Verschluesselt bzw. entschluesselt die Frames eines Tracks
pub struct FrameCryptor {
    track_id: TrackId,
    directory: Arc<KeyDirectory>,
    events: Arc<dyn EventSink>,
    settings: RwLock<Arc<CryptorSettings>>,
    frame_zaehler: AtomicU32,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for FrameCryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCryptor")
            .field("track_id", &self.track_id)
            .field("settings", &self.settings.read())
            .finish_non_exhaustive()
    }
}

impl FrameCryptor {
    /// Erstellt einen Cryptor fuer `track_id`, gebunden an `identity`
    pub fn neu(
        track_id: TrackId,
        identity: ParticipantIdentity,
        enabled: bool,
        directory: Arc<KeyDirectory>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            track_id,
            directory,
            events,
            settings: RwLock::new(Arc::new(CryptorSettings {
                enabled,
                identity: Some(identity),
                ..Default::default()
            })),
            frame_zaehler: AtomicU32::new(0),
            task: Mutex::new(None),
        }
    }

    pub fn track_id(&self) -> &TrackId {
        &self.track_id
    }

    /// Konsistenter Snapshot der aktuellen Einstellungen
    pub fn settings(&self) -> Arc<CryptorSettings> {
        self.settings.read().clone()
    }

    pub fn identity(&self) -> Option<ParticipantIdentity> {
        self.settings.read().identity.clone()
    }

    fn aendern(&self, f: impl FnOnce(&mut CryptorSettings)) {
        let mut guard = self.settings.write();
        let mut neu = CryptorSettings::clone(&guard);
        f(&mut neu);
        *guard = Arc::new(neu);
    }

    // -----------------------------------------------------------------------
    // Befehle
    // -----------------------------------------------------------------------

    /// Bindet den Cryptor an eine Frame-Quelle und -Senke
    ///
    /// Eine bereits laufende Pipeline wird ersetzt.
    pub fn setup_transform(
        self: &Arc<Self>,
        direction: Direction,
        source: FrameSource,
        sink: FrameSink,
        codec: Option<Codec>,
    ) -> E2eeResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| E2eeError::intern(format!("Keine Tokio-Runtime: {e}")))?;

        self.aendern(|s| {
            s.direction = Some(direction);
            if codec.is_some() {
                s.codec = codec;
            }
        });

        let cryptor = Arc::downgrade(self);
        let handle = runtime.spawn(frame_loop(cryptor, direction, source, sink));
        if let Some(alt) = self.task.lock().replace(handle) {
            alt.abort();
            tracing::debug!(track_id = %self.track_id, "Vorherige Pipeline ersetzt");
        }

        tracing::info!(
            track_id = %self.track_id,
            richtung = %direction,
            codec = ?codec,
            "Transform eingerichtet"
        );
        Ok(())
    }

    /// Bindet den Cryptor an einen (anderen) Teilnehmer
    pub fn set_participant(&self, identity: ParticipantIdentity, enabled: bool) {
        tracing::debug!(track_id = %self.track_id, participant = %identity, "Teilnehmer gebunden");
        self.aendern(|s| {
            s.identity = Some(identity);
            s.enabled = enabled;
        });
    }

    /// Loest die Bindung; Frames werden danach gemaess `unboundFrames` behandelt
    pub fn unset_participant(&self) {
        tracing::debug!(track_id = %self.track_id, "Teilnehmer-Bindung geloest");
        self.aendern(|s| s.identity = None);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.aendern(|s| s.enabled = enabled);
    }

    pub fn set_video_codec(&self, codec: Codec) {
        self.aendern(|s| s.codec = Some(codec));
    }

    pub fn set_rtp_map(&self, map: HashMap<u8, Codec>) {
        self.aendern(|s| s.rtp_map = map);
    }

    pub fn set_sif_trailer(&self, trailer: Option<Bytes>) {
        self.aendern(|s| s.sif_trailer = trailer.filter(|t| !t.is_empty()));
    }

    /// Beendet die laufende Pipeline (falls vorhanden)
    pub fn stop_transform(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    // -----------------------------------------------------------------------
    // Frame-Pfad
    // -----------------------------------------------------------------------

    /// Verarbeitet einen Frame; `None` bedeutet verworfen
    pub fn transform_frame(&self, direction: Direction, frame: EncodedFrame) -> Option<EncodedFrame> {
        let settings = self.settings();
        if !settings.enabled {
            return Some(frame);
        }

        if direction == Direction::Decode {
            if let Some(trailer) = &settings.sif_trailer {
                if is_server_injected(&frame.data, trailer) {
                    let ende = frame.data.len() - trailer.len();
                    tracing::trace!(track_id = %self.track_id, "Server-injizierter Frame");
                    return Some(frame.mit_daten(frame.data.slice(..ende)));
                }
            }
        }

        let Some(identity) = settings.identity.clone() else {
            return match self.directory.options().unbound_frames {
                UnboundFramePolicy::PassThrough => Some(frame),
                UnboundFramePolicy::Drop => None,
            };
        };

        let ring = match self.directory.resolve(Some(&identity)) {
            Ok(ring) => ring,
            Err(e) => {
                self.fehler_melden(&e, &identity);
                return None;
            }
        };

        let ergebnis = match direction {
            Direction::Encode => self.verschluesseln(&frame, &settings, &ring),
            Direction::Decode => self.entschluesseln(&frame, &settings, &ring, &identity),
        };

        match ergebnis {
            Ok(data) => Some(frame.mit_daten(data)),
            Err(e) => {
                tracing::debug!(
                    track_id = %self.track_id,
                    participant = %identity,
                    fehler = %e,
                    "Frame verworfen"
                );
                self.fehler_melden(&e, &identity);
                None
            }
        }
    }

    fn verschluesseln(
        &self,
        frame: &EncodedFrame,
        settings: &CryptorSettings,
        ring: &KeyRing,
    ) -> E2eeResult<Bytes> {
        let key = ring.current()?;
        let zaehler = self.frame_zaehler.fetch_add(1, Ordering::Relaxed);
        seal_frame(frame, &key, settings.codec, zaehler)
    }

    fn entschluesseln(
        &self,
        frame: &EncodedFrame,
        settings: &CryptorSettings,
        ring: &KeyRing,
        identity: &ParticipantIdentity,
    ) -> E2eeResult<Bytes> {
        if !ring.has_valid_key() {
            return Err(E2eeError::KeyMissing {
                index: ring.current_index(),
            });
        }

        let codec = frame
            .payload_type
            .and_then(|pt| settings.rtp_map.get(&pt).copied())
            .or(settings.codec);
        let sealed = SealedFrame::parse(&frame.data)?;
        let key = ring.key_at(sealed.key_index)?;

        match sealed.open(frame.kind, codec, &key) {
            Ok(data) => {
                ring.decryption_success();
                Ok(data)
            }
            Err(E2eeError::AuthenticationFailed) => {
                match self.ratchet_window(&sealed, frame, codec, ring, &key, identity)? {
                    Some(data) => {
                        ring.decryption_success();
                        Ok(data)
                    }
                    None => {
                        ring.decryption_failure();
                        Err(E2eeError::AuthenticationFailed)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Probiert die naechsten Ratchet-Generationen des Slots
    ///
    /// Passt eine davon, wird der Slot darauf vorgezogen und der Ratchet
    /// ueber das Verzeichnis gemeldet.
    fn ratchet_window(
        &self,
        sealed: &SealedFrame<'_>,
        frame: &EncodedFrame,
        codec: Option<Codec>,
        ring: &KeyRing,
        basis: &SlotKey,
        identity: &ParticipantIdentity,
    ) -> E2eeResult<Option<Bytes>> {
        let fenster = self.directory.options().ratchet_window_size;
        for schritte in 1..=fenster {
            let kandidat = ring.derive_ahead(basis, schritte)?;
            let Ok(data) = sealed.open(frame.kind, codec, &kandidat) else {
                continue;
            };

            if let Some(result) = ring.commit_ratchet(&kandidat, basis.generation) {
                ring.reset_status();
                tracing::info!(
                    track_id = %self.track_id,
                    participant = %identity,
                    key_index = kandidat.index,
                    generation = kandidat.generation,
                    "Schluessel per Ratchet-Window nachgezogen"
                );
                self.directory.notify(&RatchetNotification {
                    identity: self.directory.identity_fuer_event(Some(identity)),
                    key_index: kandidat.index,
                    result,
                });
            }
            return Ok(Some(data));
        }
        Ok(None)
    }

    /// Jeder verworfene Frame wird einzeln gemeldet
    fn fehler_melden(&self, e: &E2eeError, identity: &ParticipantIdentity) {
        self.events
            .senden(E2eeEvent::fehler(e, None, Some(identity.clone())));
    }
}

impl Drop for FrameCryptor {
    fn drop(&mut self) {
        self.stop_transform();
    }
}

/// Pipeline eines Tracks: liest Frames bis die Quelle schliesst
async fn frame_loop(
    cryptor: Weak<FrameCryptor>,
    direction: Direction,
    mut source: FrameSource,
    sink: FrameSink,
) {
    while let Some(frame) = source.recv().await {
        let Some(cryptor) = cryptor.upgrade() else {
            break;
        };
        let Some(ausgabe) = cryptor.transform_frame(direction, frame) else {
            continue;
        };
        drop(cryptor);
        if sink.send(ausgabe).await.is_err() {
            tracing::debug!(richtung = %direction, "Frame-Senke geschlossen");
            break;
        }
    }
    tracing::debug!(richtung = %direction, "Frame-Pipeline beendet");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
