//! E2E-Session – fuehrt Commands gegen Schluessel- und Track-Zustand aus
//!
//! Die Session besitzt KeyDirectory und CryptorRegistry. Sie wird
//! ausschliesslich vom Consumer-Task der [`crate::CommandQueue`] benutzt,
//! daher braucht sie `&mut self` und keine eigenen Locks.
//!
//! Fehler werden an der Befehlsgrenze behandelt: mit Request-ID als
//! korreliertes Error-Event, bei `encode`/`decode` als Error-Event mit
//! Teilnehmer, sonst nur im Log.

use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use sealframe_core::error::{E2eeError, E2eeResult};
use sealframe_core::event::{E2eeEvent, EventSink};
use sealframe_core::types::{Codec, Direction, KeyIndex, ParticipantIdentity, TrackId};
use sealframe_crypto::{KeyDirectory, KeyProviderOptions, PayloadCryptor};
use sealframe_media::{CryptorRegistry, TransformBinding, WatchdogConfig};

use crate::commands::types::Command;

/// Konfiguration einer Session (vom Host beim Start gesetzt)
#[derive(Debug, Clone, Default)]
pub struct SessionKonfig {
    /// Gilt wenn `init` ohne `keyProviderOptions` kommt
    pub key_provider: KeyProviderOptions,
    pub watchdog: WatchdogConfig,
}

/// Zustand nach `init`
struct Initialisiert {
    directory: Arc<KeyDirectory>,
    registry: CryptorRegistry,
}

/// Die E2E-Session eines Host-Prozesses
pub struct E2eeSession {
    konfig: SessionKonfig,
    events: Arc<dyn EventSink>,
    zustand: Option<Initialisiert>,
}

impl std::fmt::Debug for E2eeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("E2eeSession")
            .field("konfig", &self.konfig)
            .field("initialisiert", &self.zustand.is_some())
            .finish()
    }
}

impl E2eeSession {
    pub fn neu(konfig: SessionKonfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            konfig,
            events,
            zustand: None,
        }
    }

    pub fn ist_initialisiert(&self) -> bool {
        self.zustand.is_some()
    }

    /// Schluessel-Verzeichnis (erst nach `init`)
    pub fn directory(&self) -> Option<&Arc<KeyDirectory>> {
        self.zustand.as_ref().map(|z| &z.directory)
    }

    /// Cryptor-Registry (erst nach `init`)
    pub fn registry(&self) -> Option<&CryptorRegistry> {
        self.zustand.as_ref().map(|z| &z.registry)
    }

    /// Fuehrt einen Befehl vollstaendig aus
    ///
    /// Fehler sind beim Zurueckgeben bereits gemeldet (Event oder Log).
    pub async fn ausfuehren(&mut self, cmd: Command) -> E2eeResult<()> {
        let art = cmd.art();
        let uuid = cmd.request_id();
        let identity = cmd.participant().cloned();
        let ist_setup = matches!(cmd, Command::SetupTransform { .. });

        tracing::trace!(befehl = art, participant = ?identity, "Befehl wird ausgefuehrt");

        let ergebnis = match cmd {
            Command::Init {
                key_provider_options,
            } => {
                self.init(key_provider_options);
                Ok(())
            }
            Command::Enable {
                participant_identity,
                enabled,
            } => self.enable(participant_identity, enabled),
            Command::SetKey {
                participant_identity,
                key,
                key_index,
            } => self.set_key(participant_identity.as_ref(), &key, key_index),
            Command::RatchetRequest {
                participant_identity,
                key_index,
            } => self.ratchet(participant_identity.as_ref(), key_index),
            Command::SetupTransform {
                direction,
                participant_identity,
                track_id,
                codec,
                is_reuse,
                binding,
            } => self.setup_transform(
                direction,
                &participant_identity,
                &track_id,
                codec,
                is_reuse,
                binding,
            ),
            Command::RemoveTransform {
                track_id,
                participant_identity,
            } => self.remove_transform(&track_id, &participant_identity),
            Command::UpdateCodec {
                participant_identity,
                track_id,
                codec,
            } => self.update_codec(&participant_identity, &track_id, codec),
            Command::SetRtpMap {
                participant_identity,
                map,
            } => self
                .initialisiert()
                .map(|z| z.registry.set_rtp_map(&participant_identity, map)),
            Command::SetSifTrailer { trailer } => self.initialisiert().map(|z| {
                let trailer = (!trailer.is_empty()).then(|| Bytes::from(trailer));
                z.registry.set_sif_trailer(trailer)
            }),
            Command::EncryptDataRequest {
                participant_identity,
                payload,
                uuid,
            } => self.encrypt_data(participant_identity.as_ref(), &payload, uuid),
            Command::DecryptDataRequest {
                participant_identity,
                payload,
                iv,
                key_index,
                uuid,
            } => self.decrypt_data(participant_identity.as_ref(), &payload, &iv, key_index, uuid),
        };

        if let Err(e) = &ergebnis {
            tracing::warn!(befehl = art, participant = ?identity, fehler = %e, "Befehl fehlgeschlagen");
            if uuid.is_some() || ist_setup {
                self.events.senden(E2eeEvent::fehler(e, uuid, identity));
            }
        }
        ergebnis
    }

    fn initialisiert(&self) -> E2eeResult<&Initialisiert> {
        self.zustand.as_ref().ok_or(E2eeError::MissingConfiguration)
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    fn init(&mut self, optionen: Option<KeyProviderOptions>) {
        if self.zustand.is_some() {
            tracing::warn!("Session bereits initialisiert, init wird ignoriert");
        } else {
            let optionen = optionen.unwrap_or_else(|| self.konfig.key_provider.clone());
            tracing::info!(
                shared_key = optionen.shared_key,
                ring_groesse = optionen.ring_groesse(),
                ratchet_window = optionen.ratchet_window_size,
                "E2E-Session initialisiert"
            );

            let directory = Arc::new(KeyDirectory::new(optionen));
            let events = Arc::clone(&self.events);
            directory.on_ratchet(Box::new(move |n| {
                events.senden(E2eeEvent::RatchetKey {
                    participant_identity: n.identity.clone(),
                    key_index: Some(n.key_index),
                    ratchet_result: n.result.clone(),
                });
            }));

            let registry = CryptorRegistry::neu(
                Arc::clone(&directory),
                Arc::clone(&self.events),
                self.konfig.watchdog,
            );
            self.zustand = Some(Initialisiert {
                directory,
                registry,
            });
        }
        // Neue Teilnehmer starten deaktiviert
        self.events.senden(E2eeEvent::InitAck { enabled: false });
    }

    fn enable(&self, identity: ParticipantIdentity, enabled: bool) -> E2eeResult<()> {
        let z = self.initialisiert()?;
        z.registry.set_enabled(&identity, enabled);
        tracing::info!(participant = %identity, enabled, "Verschluesselung umgeschaltet");
        self.events.senden(E2eeEvent::Enable {
            participant_identity: identity,
            enabled,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Schluessel
    // -----------------------------------------------------------------------

    fn set_key(
        &self,
        identity: Option<&ParticipantIdentity>,
        key: &[u8],
        key_index: Option<KeyIndex>,
    ) -> E2eeResult<()> {
        let z = self.initialisiert()?;
        let ring = z.directory.resolve(identity)?;
        let index = ring.set_key(key, key_index)?;
        tracing::info!(participant = ?identity, key_index = index, "Schluessel installiert");
        Ok(())
    }

    fn ratchet(
        &self,
        identity: Option<&ParticipantIdentity>,
        key_index: Option<KeyIndex>,
    ) -> E2eeResult<()> {
        // RatchetKey-Event kommt ueber den Listener aus `init`
        self.initialisiert()?
            .directory
            .ratchet_for(identity, key_index)
            .map(|_| ())
    }

    // -----------------------------------------------------------------------
    // Tracks
    // -----------------------------------------------------------------------

    fn setup_transform(
        &self,
        direction: Direction,
        identity: &ParticipantIdentity,
        track_id: &TrackId,
        codec: Option<Codec>,
        is_reuse: bool,
        binding: TransformBinding,
    ) -> E2eeResult<()> {
        let z = self.initialisiert()?;
        let faehigkeit = binding.keyframe_faehigkeit(direction);
        let TransformBinding { source, sink, .. } = binding;

        let cryptor = z.registry.get_or_create(identity, track_id);
        // Auch bei Wiederverwendung kommen neue Kanaele; die alte Pipeline wird ersetzt
        if is_reuse {
            tracing::debug!(track_id = %track_id, "Transform wird wiederverwendet");
        }
        cryptor.setup_transform(direction, source, sink, codec)?;
        z.registry.transform_eingerichtet(&cryptor, faehigkeit);
        Ok(())
    }

    fn remove_transform(&self, track_id: &TrackId, identity: &ParticipantIdentity) -> E2eeResult<()> {
        let z = self.initialisiert()?;
        z.registry.remove(track_id, identity);
        Ok(())
    }

    fn update_codec(
        &self,
        identity: &ParticipantIdentity,
        track_id: &TrackId,
        codec: Codec,
    ) -> E2eeResult<()> {
        let z = self.initialisiert()?;
        if z.registry.update_codec(identity, track_id, codec) {
            tracing::debug!(track_id = %track_id, codec = %codec, "Codec aktualisiert");
        } else {
            tracing::warn!(
                track_id = %track_id,
                participant = %identity,
                "Kein Cryptor fuer Codec-Wechsel"
            );
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Daten-Nachrichten
    // -----------------------------------------------------------------------

    fn encrypt_data(
        &self,
        identity: Option<&ParticipantIdentity>,
        payload: &[u8],
        uuid: Uuid,
    ) -> E2eeResult<()> {
        let ring = self.initialisiert()?.directory.resolve(identity)?;
        let verschluesselt = PayloadCryptor::encrypt(payload, &ring)?;
        self.events.senden(E2eeEvent::EncryptDataResponse {
            payload: verschluesselt.payload,
            iv: verschluesselt.iv.to_vec(),
            key_index: verschluesselt.key_index,
            uuid,
        });
        Ok(())
    }

    fn decrypt_data(
        &self,
        identity: Option<&ParticipantIdentity>,
        payload: &[u8],
        iv: &[u8],
        key_index: KeyIndex,
        uuid: Uuid,
    ) -> E2eeResult<()> {
        let ring = self.initialisiert()?.directory.resolve(identity)?;
        let klartext = PayloadCryptor::decrypt(payload, iv, &ring, key_index)?;
        self.events.senden(E2eeEvent::DecryptDataResponse {
            payload: klartext,
            uuid,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
