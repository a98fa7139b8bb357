//! Schluessel-Ring einer Identitaet
//!
//! Ein Ring haelt eine feste Anzahl Slots (zyklischer Key-Index). Jeder Slot
//! speichert rohes Material, den daraus abgeleiteten AES-Schluessel und
//! eine Ratchet-Generation. Slots werden ueber Ratchets hinweg
//! wiederverwendet: der Index benennt den Slot, nicht den Schluessel.
//!
//! Mutationen kommen ausschliesslich aus der Befehls-Queue. Der Frame-Pfad
//! liest parallel dazu, deshalb liegt der Zustand hinter einem RwLock und
//! Leser bekommen eine Kopie (`SlotKey`).

use parking_lot::RwLock;
use tokio::sync::Notify;

use sealframe_core::error::{E2eeError, E2eeResult};
use sealframe_core::types::{KeyIndex, RatchetResult};

use crate::derive::{derive_cipher_key, ratchet_material};
use crate::options::KeyProviderOptions;
use crate::types::{SecretBytes, SlotKey};

/// Ein Slot im Ring
#[derive(Debug, Clone, Default)]
struct KeySlot {
    material: SecretBytes,
    cipher_key: SecretBytes,
    /// Startet bei 0, steigt mit jedem Ratchet
    generation: u32,
    valid: bool,
}

impl KeySlot {
    fn snapshot(&self, index: KeyIndex) -> SlotKey {
        SlotKey {
            index,
            generation: self.generation,
            material: self.material.clone(),
            cipher_key: self.cipher_key.clone(),
        }
    }
}

#[derive(Debug)]
struct RingState {
    slots: Vec<KeySlot>,
    current_index: KeyIndex,
    ratcheting: bool,
    decryption_failures: u32,
    has_valid_key: bool,
}

/// Schluessel-Ring einer Identitaet (oder der gemeinsame Ring im Shared-Modus)
#[derive(Debug)]
pub struct KeyRing {
    ratchet_salt: Vec<u8>,
    failure_tolerance: i32,
    state: RwLock<RingState>,
    key_available: Notify,
}

impl KeyRing {
    /// Erstellt einen leeren Ring mit der konfigurierten Groesse
    pub fn new(options: &KeyProviderOptions) -> Self {
        Self {
            ratchet_salt: options.ratchet_salt.as_bytes().to_vec(),
            failure_tolerance: options.failure_tolerance,
            state: RwLock::new(RingState {
                slots: vec![KeySlot::default(); options.ring_groesse()],
                current_index: 0,
                ratcheting: false,
                decryption_failures: 0,
                has_valid_key: false,
            }),
            key_available: Notify::new(),
        }
    }

    /// Anzahl der Slots
    pub fn size(&self) -> usize {
        self.state.read().slots.len()
    }

    /// Bildet einen beliebigen Index zyklisch auf den Ring ab
    pub fn normalize(&self, index: KeyIndex) -> KeyIndex {
        (index as usize % self.size()) as KeyIndex
    }

    /// Installiert Material an `index` (oder am aktuellen Index)
    ///
    /// Setzt die Generation auf 0, macht den Slot zum aktuellen und weckt
    /// alle Aufrufer von [`KeyRing::wait_for_key`].
    pub fn set_key(&self, material: &[u8], index: Option<KeyIndex>) -> E2eeResult<KeyIndex> {
        if material.is_empty() {
            return Err(E2eeError::UngueltigeDaten(
                "Leeres Schluessel-Material".to_string(),
            ));
        }
        let cipher_key = derive_cipher_key(material, &self.ratchet_salt)?;

        let index = {
            let mut state = self.state.write();
            let index = index
                .map(|i| (i as usize % state.slots.len()) as KeyIndex)
                .unwrap_or(state.current_index);
            state.slots[index as usize] = KeySlot {
                material: SecretBytes::new(material.to_vec()),
                cipher_key,
                generation: 0,
                valid: true,
            };
            state.current_index = index;
            state.decryption_failures = 0;
            state.has_valid_key = true;
            index
        };

        tracing::debug!(key_index = index, "Schluessel gesetzt");
        self.key_available.notify_waiters();
        Ok(index)
    }

    /// Ratchet: leitet die naechste Generation fuer `index` ab und ersetzt den Slot
    ///
    /// Setzt den Status "Ratchet laeuft", bis [`KeyRing::reset_status`]
    /// aufgerufen wird.
    pub fn ratchet(&self, index: KeyIndex) -> E2eeResult<RatchetResult> {
        let mut state = self.state.write();
        let index = (index as usize % state.slots.len()) as KeyIndex;
        let slot = &state.slots[index as usize];
        if !slot.valid {
            return Err(E2eeError::NoKeyAtIndex { index });
        }

        let material = ratchet_material(slot.material.as_bytes(), &self.ratchet_salt)?;
        let cipher_key = derive_cipher_key(material.as_bytes(), &self.ratchet_salt)?;
        let generation = slot.generation.wrapping_add(1);
        let result = RatchetResult {
            material: material.as_bytes().to_vec(),
            generation,
        };

        state.ratcheting = true;
        state.slots[index as usize] = KeySlot {
            material,
            cipher_key,
            generation,
            valid: true,
        };
        Ok(result)
    }

    /// Leitet einen Kandidaten `schritte` Generationen nach `basis` ab, ohne den Ring zu aendern
    pub fn derive_ahead(&self, basis: &SlotKey, schritte: u32) -> E2eeResult<SlotKey> {
        let mut material = basis.material.clone();
        for _ in 0..schritte {
            material = ratchet_material(material.as_bytes(), &self.ratchet_salt)?;
        }
        let cipher_key = derive_cipher_key(material.as_bytes(), &self.ratchet_salt)?;
        Ok(SlotKey {
            index: basis.index,
            generation: basis.generation.wrapping_add(schritte),
            material,
            cipher_key,
        })
    }

    /// Uebernimmt einen vorausgeleiteten Kandidaten, falls der Slot noch auf `basis_generation` steht
    ///
    /// Gibt `None` zurueck wenn der Slot inzwischen neu gesetzt oder bereits
    /// weitergeratchet wurde.
    pub fn commit_ratchet(
        &self,
        kandidat: &SlotKey,
        basis_generation: u32,
    ) -> Option<RatchetResult> {
        let mut state = self.state.write();
        let slot = state.slots.get_mut(kandidat.index as usize)?;
        if !slot.valid || slot.generation != basis_generation {
            return None;
        }
        *slot = KeySlot {
            material: kandidat.material.clone(),
            cipher_key: kandidat.cipher_key.clone(),
            generation: kandidat.generation,
            valid: true,
        };
        state.ratcheting = true;
        Some(RatchetResult {
            material: kandidat.material.as_bytes().to_vec(),
            generation: kandidat.generation,
        })
    }

    /// Setzt den Status "Ratchet laeuft" zurueck
    pub fn reset_status(&self) {
        self.state.write().ratcheting = false;
    }

    /// Gibt true zurueck solange ein Ratchet nicht abgeschlossen ist
    pub fn is_ratcheting(&self) -> bool {
        self.state.read().ratcheting
    }

    /// Schluessel am aktuellen Index
    pub fn current(&self) -> E2eeResult<SlotKey> {
        let state = self.state.read();
        let index = state.current_index;
        let slot = &state.slots[index as usize];
        if !slot.valid {
            return Err(E2eeError::KeyMissing { index });
        }
        Ok(slot.snapshot(index))
    }

    pub fn current_index(&self) -> KeyIndex {
        self.state.read().current_index
    }

    pub fn set_current_index(&self, index: KeyIndex) {
        let mut state = self.state.write();
        state.current_index = (index as usize % state.slots.len()) as KeyIndex;
    }

    /// Schluessel an einem bestimmten Index (nicht zwingend dem aktuellen)
    pub fn key_at(&self, index: KeyIndex) -> E2eeResult<SlotKey> {
        let state = self.state.read();
        let index = (index as usize % state.slots.len()) as KeyIndex;
        let slot = &state.slots[index as usize];
        if !slot.valid {
            return Err(E2eeError::NoKeyAtIndex { index });
        }
        Ok(slot.snapshot(index))
    }

    /// Wartet bis der Slot `index` einen gueltigen Schluessel haelt
    pub async fn wait_for_key(&self, index: KeyIndex) -> SlotKey {
        loop {
            let benachrichtigt = self.key_available.notified();
            if let Ok(key) = self.key_at(index) {
                return key;
            }
            benachrichtigt.await;
        }
    }

    /// Zaehlt einen Entschluesselungsfehler (Failure-Tolerance)
    pub fn decryption_failure(&self) {
        if self.failure_tolerance < 0 {
            return;
        }
        let mut state = self.state.write();
        state.decryption_failures = state.decryption_failures.saturating_add(1);
        if state.has_valid_key && state.decryption_failures > self.failure_tolerance as u32 {
            state.has_valid_key = false;
            tracing::warn!(
                fehler = state.decryption_failures,
                toleranz = self.failure_tolerance,
                "Fehlertoleranz ueberschritten, Schluessel gilt als ungueltig"
            );
        }
    }

    /// Setzt den Fehlerzaehler nach erfolgreicher Entschluesselung zurueck
    pub fn decryption_success(&self) {
        let mut state = self.state.write();
        state.decryption_failures = 0;
    }

    /// False nachdem die Fehlertoleranz ueberschritten wurde (bis zum naechsten `set_key`)
    pub fn has_valid_key(&self) -> bool {
        self.state.read().has_valid_key
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn ring() -> KeyRing {
        KeyRing::new(&KeyProviderOptions::default())
    }

    #[test]
    fn leerer_ring_hat_keinen_schluessel() {
        let ring = ring();
        assert!(matches!(ring.current(), Err(E2eeError::KeyMissing { index: 0 })));
        assert!(matches!(ring.key_at(4), Err(E2eeError::NoKeyAtIndex { index: 4 })));
        assert!(!ring.has_valid_key());
    }

    #[test]
    fn set_key_setzt_aktuellen_index() {
        let ring = ring();
        let index = ring.set_key(b"geheim", Some(3)).unwrap();
        assert_eq!(index, 3);
        assert_eq!(ring.current_index(), 3);
        let key = ring.current().unwrap();
        assert_eq!(key.index, 3);
        assert_eq!(key.generation, 0);
        assert_eq!(key.material.as_bytes(), b"geheim");
        assert_eq!(key.cipher_key.len(), 32);
    }

    #[test]
    fn set_key_ohne_index_nutzt_aktuellen() {
        let ring = ring();
        ring.set_current_index(5);
        assert_eq!(ring.set_key(b"k", None).unwrap(), 5);
    }

    #[test]
    fn index_ist_zyklisch() {
        let ring = ring();
        assert_eq!(ring.set_key(b"k", Some(17)).unwrap(), 1);
        assert!(ring.key_at(1).is_ok());
        assert!(ring.key_at(17).is_ok());
    }

    #[test]
    fn leeres_material_wird_abgelehnt() {
        assert!(ring().set_key(&[], Some(0)).is_err());
    }

    #[test]
    fn ratchet_ohne_schluessel_schlaegt_fehl() {
        let ring = ring();
        assert!(matches!(ring.ratchet(2), Err(E2eeError::NoKeyAtIndex { index: 2 })));
    }

    #[test]
    fn ratchet_erhoeht_generation_und_ersetzt_material() {
        let ring = ring();
        ring.set_key(b"start", Some(0)).unwrap();
        let vorher = ring.key_at(0).unwrap();

        let result = ring.ratchet(0).unwrap();
        assert_eq!(result.generation, 1);
        assert!(ring.is_ratcheting());
        ring.reset_status();
        assert!(!ring.is_ratcheting());

        let nachher = ring.key_at(0).unwrap();
        assert_eq!(nachher.generation, 1);
        assert_eq!(nachher.material.as_bytes(), result.material.as_slice());
        assert_ne!(nachher.cipher_key.as_bytes(), vorher.cipher_key.as_bytes());
    }

    #[test]
    fn ratchet_ist_deterministisch() {
        let a = ring();
        let b = ring();
        a.set_key(b"gemeinsam", Some(1)).unwrap();
        b.set_key(b"gemeinsam", Some(1)).unwrap();

        for _ in 0..10 {
            let ra = a.ratchet(1).unwrap();
            let rb = b.ratchet(1).unwrap();
            assert_eq!(ra, rb);
        }
        assert_eq!(a.key_at(1).unwrap().generation, 10);
    }

    #[test]
    fn set_key_setzt_generation_zurueck() {
        let ring = ring();
        ring.set_key(b"a", Some(0)).unwrap();
        ring.ratchet(0).unwrap();
        ring.ratchet(0).unwrap();
        ring.set_key(b"b", Some(0)).unwrap();
        assert_eq!(ring.key_at(0).unwrap().generation, 0);
    }

    #[test]
    fn derive_ahead_entspricht_ratchet() {
        let ring = ring();
        ring.set_key(b"basis", Some(0)).unwrap();
        let basis = ring.key_at(0).unwrap();
        let kandidat = ring.derive_ahead(&basis, 3).unwrap();

        for _ in 0..3 {
            ring.ratchet(0).unwrap();
        }
        let geratchet = ring.key_at(0).unwrap();
        assert_eq!(kandidat.generation, 3);
        assert_eq!(kandidat.cipher_key.as_bytes(), geratchet.cipher_key.as_bytes());
    }

    #[test]
    fn commit_ratchet_nur_bei_passender_generation() {
        let ring = ring();
        ring.set_key(b"basis", Some(0)).unwrap();
        let basis = ring.key_at(0).unwrap();
        let kandidat = ring.derive_ahead(&basis, 2).unwrap();

        // Slot wurde inzwischen weitergeratchet -> kein Commit
        ring.ratchet(0).unwrap();
        assert!(ring.commit_ratchet(&kandidat, 0).is_none());
        assert_eq!(ring.key_at(0).unwrap().generation, 1);

        ring.set_key(b"basis", Some(0)).unwrap();
        let result = ring.commit_ratchet(&kandidat, 0).unwrap();
        assert_eq!(result.generation, 2);
        assert_eq!(ring.key_at(0).unwrap().generation, 2);
    }

    #[test]
    fn fehlertoleranz_invalidiert_schluessel() {
        let mut opts = KeyProviderOptions::default();
        opts.failure_tolerance = 2;
        let ring = KeyRing::new(&opts);
        ring.set_key(b"k", Some(0)).unwrap();

        ring.decryption_failure();
        ring.decryption_failure();
        assert!(ring.has_valid_key());
        ring.decryption_failure();
        assert!(!ring.has_valid_key());

        // Neuer Schluessel stellt den Zustand wieder her
        ring.set_key(b"neu", Some(0)).unwrap();
        assert!(ring.has_valid_key());
    }

    #[test]
    fn erfolg_setzt_fehlerzaehler_zurueck() {
        let mut opts = KeyProviderOptions::default();
        opts.failure_tolerance = 1;
        let ring = KeyRing::new(&opts);
        ring.set_key(b"k", Some(0)).unwrap();

        ring.decryption_failure();
        ring.decryption_success();
        ring.decryption_failure();
        assert!(ring.has_valid_key());
    }

    #[test]
    fn unbegrenzte_toleranz() {
        let ring = ring();
        ring.set_key(b"k", Some(0)).unwrap();
        for _ in 0..1000 {
            ring.decryption_failure();
        }
        assert!(ring.has_valid_key());
    }

    #[tokio::test]
    async fn wait_for_key_wird_durch_set_key_geweckt() {
        let ring = Arc::new(ring());
        let warter = {
            let ring = Arc::clone(&ring);
            tokio::spawn(async move { ring.wait_for_key(2).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!warter.is_finished());

        ring.set_key(b"endlich", Some(2)).unwrap();
        let key = tokio::time::timeout(Duration::from_secs(1), warter)
            .await
            .expect("Warter haengt")
            .unwrap();
        assert_eq!(key.index, 2);
    }

    #[tokio::test]
    async fn wait_for_key_kehrt_sofort_zurueck_wenn_belegt() {
        let ring = ring();
        ring.set_key(b"da", Some(0)).unwrap();
        let key = ring.wait_for_key(0).await;
        assert_eq!(key.material.as_bytes(), b"da");
    }
}
