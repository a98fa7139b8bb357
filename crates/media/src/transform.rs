//! Grenze zur externen Frame-Transform-Schnittstelle
//!
//! Der Host liefert pro Track eine Frame-Quelle, eine Frame-Senke und
//! optional Keyframe-Faehigkeiten. Fehlende Faehigkeiten sind ein normaler
//! Zustand und werden als `None` uebergeben.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use sealframe_core::error::E2eeResult;
use sealframe_core::types::{Direction, EncodedFrame};

/// Lesende Seite: rohe Frames vom Encoder bzw. verschluesselte vom Netz
pub type FrameSource = mpsc::Receiver<EncodedFrame>;

/// Schreibende Seite: verarbeitete Frames
pub type FrameSink = mpsc::Sender<EncodedFrame>;

/// Eine Keyframe-Faehigkeit der Transform-Schnittstelle
///
/// `generateKeyFrame` auf der Sender-Seite, `sendKeyFrameRequest` auf der
/// Empfaenger-Seite.
#[async_trait]
pub trait KeyframeRequester: Send + Sync {
    async fn anfordern(&self) -> E2eeResult<()>;
}

/// Alles was der Host fuer einen Track uebergibt
pub struct TransformBinding {
    pub source: FrameSource,
    pub sink: FrameSink,
    pub generate_keyframe: Option<Arc<dyn KeyframeRequester>>,
    pub request_keyframe: Option<Arc<dyn KeyframeRequester>>,
}

impl std::fmt::Debug for TransformBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformBinding")
            .field("generate_keyframe", &self.generate_keyframe.is_some())
            .field("request_keyframe", &self.request_keyframe.is_some())
            .finish_non_exhaustive()
    }
}

impl TransformBinding {
    /// Binding ohne Keyframe-Faehigkeiten
    pub fn neu(source: FrameSource, sink: FrameSink) -> Self {
        Self {
            source,
            sink,
            generate_keyframe: None,
            request_keyframe: None,
        }
    }

    pub fn mit_generate_keyframe(mut self, faehigkeit: Arc<dyn KeyframeRequester>) -> Self {
        self.generate_keyframe = Some(faehigkeit);
        self
    }

    pub fn mit_request_keyframe(mut self, faehigkeit: Arc<dyn KeyframeRequester>) -> Self {
        self.request_keyframe = Some(faehigkeit);
        self
    }

    /// Die fuer die Richtung passende Keyframe-Faehigkeit
    pub fn keyframe_faehigkeit(&self, direction: Direction) -> Option<Arc<dyn KeyframeRequester>> {
        match direction {
            Direction::Encode => self.generate_keyframe.clone(),
            Direction::Decode => self.request_keyframe.clone(),
        }
    }

    /// Erstellt ein Binding samt Gegenstuecken fuer den Host
    ///
    /// Gibt `(binding, eingang, ausgang)` zurueck: Frames in `eingang`
    /// schreiben, verarbeitete Frames aus `ausgang` lesen.
    pub fn kanaele(
        puffer: usize,
    ) -> (Self, mpsc::Sender<EncodedFrame>, mpsc::Receiver<EncodedFrame>) {
        let (eingang, source) = mpsc::channel(puffer);
        let (sink, ausgang) = mpsc::channel(puffer);
        (Self::neu(source, sink), eingang, ausgang)
    }
}
