//! Schluessel-Verzeichnis (Identitaet -> KeyRing)
//!
//! Verwaltet die Ringe aller Teilnehmer:
//! - Per-Teilnehmer-Modus: ein Ring pro Identitaet, lazy erstellt
//! - Shared-Key-Modus: genau ein Ring fuer die ganze Session
//! - Ratchet mit Benachrichtigung aller registrierten Listener
//!
//! Der Modus wird bei `init` festgelegt und aendert sich danach nicht.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

use sealframe_core::error::{E2eeError, E2eeResult};
use sealframe_core::types::{KeyIndex, ParticipantIdentity, RatchetResult};

use crate::keyring::KeyRing;
use crate::options::KeyProviderOptions;

/// Modus der Schluessel-Verwaltung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Ein Ring fuer alle Teilnehmer
    Shared,
    /// Ein Ring pro Teilnehmer
    PerParticipant,
}

/// Benachrichtigung nach einem Ratchet-Schritt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatchetNotification {
    /// `None` im Shared-Key-Modus
    pub identity: Option<ParticipantIdentity>,
    pub key_index: KeyIndex,
    pub result: RatchetResult,
}

/// Callback fuer Ratchet-Benachrichtigungen
pub type RatchetListener = Box<dyn Fn(&RatchetNotification) + Send + Sync>;

/// Verwaltet die Schluessel-Ringe aller Identitaeten
pub struct KeyDirectory {
    options: KeyProviderOptions,
    mode: KeyMode,
    shared: OnceLock<Arc<KeyRing>>,
    rings: DashMap<ParticipantIdentity, Arc<KeyRing>>,
    listeners: RwLock<Vec<RatchetListener>>,
}

impl std::fmt::Debug for KeyDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDirectory")
            .field("mode", &self.mode)
            .field("rings", &self.rings.len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl KeyDirectory {
    /// Erstellt ein leeres Verzeichnis; der Modus folgt `options.shared_key`
    pub fn new(options: KeyProviderOptions) -> Self {
        let mode = if options.shared_key {
            KeyMode::Shared
        } else {
            KeyMode::PerParticipant
        };
        Self {
            options,
            mode,
            shared: OnceLock::new(),
            rings: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    pub fn options(&self) -> &KeyProviderOptions {
        &self.options
    }

    /// Gibt den Ring fuer `identity` zurueck und erstellt ihn bei Bedarf
    ///
    /// Im Shared-Modus wird die Identitaet ignoriert und immer der
    /// gemeinsame Ring geliefert. Im Per-Teilnehmer-Modus ist eine
    /// Identitaet Pflicht.
    pub fn resolve(&self, identity: Option<&ParticipantIdentity>) -> E2eeResult<Arc<KeyRing>> {
        match self.mode {
            KeyMode::Shared => Ok(Arc::clone(
                self.shared
                    .get_or_init(|| Arc::new(KeyRing::new(&self.options))),
            )),
            KeyMode::PerParticipant => {
                let identity = identity.ok_or(E2eeError::MissingParticipant)?;
                let ring = self
                    .rings
                    .entry(identity.clone())
                    .or_insert_with(|| {
                        tracing::debug!(participant = %identity, "Neuer Schluessel-Ring");
                        Arc::new(KeyRing::new(&self.options))
                    })
                    .clone();
                Ok(ring)
            }
        }
    }

    /// Ratchet fuer einen Slot; `index = None` nutzt den aktuellen Index des Rings
    ///
    /// Setzt danach den Ratchet-Status zurueck und benachrichtigt alle Listener.
    pub fn ratchet_for(
        &self,
        identity: Option<&ParticipantIdentity>,
        index: Option<KeyIndex>,
    ) -> E2eeResult<RatchetNotification> {
        let ring = self.resolve(identity)?;
        let key_index = ring.normalize(index.unwrap_or_else(|| ring.current_index()));
        let result = ring.ratchet(key_index)?;
        ring.reset_status();

        let notification = RatchetNotification {
            identity: self.identity_fuer_event(identity),
            key_index,
            result,
        };
        self.notify(&notification);
        Ok(notification)
    }

    /// Registriert einen Listener fuer Ratchet-Benachrichtigungen
    pub fn on_ratchet(&self, listener: RatchetListener) {
        self.listeners.write().push(listener);
    }

    /// Meldet einen Ratchet-Schritt an alle Listener
    ///
    /// Wird auch vom Frame-Pfad genutzt, wenn das Ratchet-Window beim
    /// Entschluesseln einen neueren Schluessel gefunden hat.
    pub fn notify(&self, notification: &RatchetNotification) {
        tracing::debug!(
            participant = ?notification.identity,
            key_index = notification.key_index,
            generation = notification.result.generation,
            "Schluessel geratchet"
        );
        for listener in self.listeners.read().iter() {
            listener(notification);
        }
    }

    /// Im Shared-Modus traegt ein Event keine Identitaet
    pub fn identity_fuer_event(
        &self,
        identity: Option<&ParticipantIdentity>,
    ) -> Option<ParticipantIdentity> {
        match self.mode {
            KeyMode::Shared => None,
            KeyMode::PerParticipant => identity.cloned(),
        }
    }

    /// Anzahl existierender Ringe
    pub fn ring_anzahl(&self) -> usize {
        match self.mode {
            KeyMode::Shared => usize::from(self.shared.get().is_some()),
            KeyMode::PerParticipant => self.rings.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn alice() -> ParticipantIdentity {
        ParticipantIdentity::from("alice")
    }

    fn shared_options() -> KeyProviderOptions {
        KeyProviderOptions {
            shared_key: true,
            ..Default::default()
        }
    }

    #[test]
    fn per_teilnehmer_ring_wird_lazy_erstellt() {
        let dir = KeyDirectory::new(KeyProviderOptions::default());
        assert_eq!(dir.ring_anzahl(), 0);

        let a1 = dir.resolve(Some(&alice())).unwrap();
        let a2 = dir.resolve(Some(&alice())).unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));

        let bob = dir.resolve(Some(&ParticipantIdentity::from("bob"))).unwrap();
        assert!(!Arc::ptr_eq(&a1, &bob));
        assert_eq!(dir.ring_anzahl(), 2);
    }

    #[test]
    fn per_teilnehmer_ohne_identitaet_schlaegt_fehl() {
        let dir = KeyDirectory::new(KeyProviderOptions::default());
        assert!(matches!(dir.resolve(None), Err(E2eeError::MissingParticipant)));
    }

    #[test]
    fn shared_modus_liefert_immer_denselben_ring() {
        let dir = KeyDirectory::new(shared_options());
        assert_eq!(dir.mode(), KeyMode::Shared);

        let ohne = dir.resolve(None).unwrap();
        ohne.set_key(b"gemeinsam", Some(0)).unwrap();

        let anyone = dir.resolve(Some(&ParticipantIdentity::from("anyone"))).unwrap();
        assert!(Arc::ptr_eq(&ohne, &anyone));
        assert_eq!(anyone.current().unwrap().material.as_bytes(), b"gemeinsam");
        assert_eq!(dir.ring_anzahl(), 1);
    }

    #[test]
    fn ratchet_benachrichtigt_listener() {
        let dir = KeyDirectory::new(KeyProviderOptions::default());
        let empfangen = Arc::new(Mutex::new(Vec::new()));
        {
            let empfangen = Arc::clone(&empfangen);
            dir.on_ratchet(Box::new(move |n| empfangen.lock().push(n.clone())));
        }

        dir.resolve(Some(&alice()))
            .unwrap()
            .set_key(b"k", Some(2))
            .unwrap();
        let n = dir.ratchet_for(Some(&alice()), None).unwrap();

        assert_eq!(n.key_index, 2);
        assert_eq!(n.result.generation, 1);
        assert_eq!(n.identity, Some(alice()));
        assert_eq!(empfangen.lock().as_slice(), &[n]);
        assert!(!dir.resolve(Some(&alice())).unwrap().is_ratcheting());
    }

    #[test]
    fn ratchet_im_shared_modus_ohne_identitaet() {
        let dir = KeyDirectory::new(shared_options());
        dir.resolve(None).unwrap().set_key(b"k", Some(0)).unwrap();
        let n = dir.ratchet_for(Some(&alice()), Some(0)).unwrap();
        assert_eq!(n.identity, None);
    }

    #[test]
    fn ratchet_auf_leeren_slot_benachrichtigt_nicht() {
        let dir = KeyDirectory::new(KeyProviderOptions::default());
        let zaehler = Arc::new(Mutex::new(0));
        {
            let zaehler = Arc::clone(&zaehler);
            dir.on_ratchet(Box::new(move |_| *zaehler.lock() += 1));
        }
        let result = dir.ratchet_for(Some(&alice()), Some(5));
        assert!(matches!(result, Err(E2eeError::NoKeyAtIndex { index: 5 })));
        assert_eq!(*zaehler.lock(), 0);
    }
}
