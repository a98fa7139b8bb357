//! Frame-Verschluesselung (codec-bewusst)
//!
//! ## Format
//! ```text
//! [header (unverschluesselt)] [ciphertext + auth_tag(16)] [iv(12)] [iv_len(1)] [key_index(1)]
//! ```
//!
//! Der Header bleibt lesbar, damit SFU und Depacketizer den Frame weiter
//! routen koennen. Er geht als AAD in die Authentifizierung ein.
//!
//! ## IV-Aufbau
//! ```text
//! [ssrc(4)] [rtp_timestamp(4)] [frame_counter(4)]
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use sealframe_core::error::{E2eeError, E2eeResult};
use sealframe_core::types::{Codec, EncodedFrame, FrameKind, KeyIndex};

use crate::cipher::{decrypt_aes256gcm, encrypt_aes256gcm};
use crate::types::{SlotKey, IV_LENGTH, TAG_LENGTH};

/// Laenge des Frame-Trailers hinter der IV: iv_len(1) + key_index(1)
pub const FRAME_TRAILER_LEN: usize = 2;

/// Unverschluesselte Bytes fuer VP8-Keyframes (Payload-Header + Keyframe-Header)
const VP8_KEYFRAME_HEADER: usize = 10;
/// Unverschluesselte Bytes fuer VP8-Delta-Frames
const VP8_DELTA_HEADER: usize = 3;
/// Unverschluesselte Bytes fuer Audio-Frames (TOC-Byte)
const AUDIO_HEADER: usize = 1;

const H264_SLICE_NON_IDR: u8 = 1;
const H264_SLICE_IDR: u8 = 5;

/// Bestimmt wie viele fuehrende Bytes unverschluesselt bleiben
pub fn unencrypted_header_len(data: &[u8], kind: FrameKind, codec: Option<Codec>) -> usize {
    let len = match (kind, codec) {
        (FrameKind::Audio, _) => AUDIO_HEADER,
        (_, Some(Codec::Vp9 | Codec::Av1)) => 0,
        (_, Some(Codec::H264)) => h264_header_len(data).unwrap_or_else(|| {
            tracing::trace!("Keine H.264 Slice-NALU gefunden, nutze VP8-Regel");
            vp8_header_len(kind)
        }),
        _ => vp8_header_len(kind),
    };
    len.min(data.len())
}

fn vp8_header_len(kind: FrameKind) -> usize {
    match kind {
        FrameKind::Key => VP8_KEYFRAME_HEADER,
        FrameKind::Delta => VP8_DELTA_HEADER,
        FrameKind::Audio => AUDIO_HEADER,
    }
}

/// Sucht die erste Slice-NALU (Typ 1 oder 5) und laesst Start-Code,
/// NALU-Header und das erste Slice-Byte unverschluesselt
fn h264_header_len(data: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i + 3 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let nalu_start = i + 3;
            let nalu_type = data[nalu_start] & 0x1F;
            if nalu_type == H264_SLICE_NON_IDR || nalu_type == H264_SLICE_IDR {
                return Some(nalu_start + 2);
            }
            i = nalu_start;
        } else {
            i += 1;
        }
    }
    None
}

/// Baut die 12-Byte IV aus SSRC, RTP-Timestamp und Frame-Zaehler
pub fn make_iv(ssrc: u32, timestamp: u32, counter: u32) -> [u8; IV_LENGTH] {
    let mut iv = [0u8; IV_LENGTH];
    iv[0..4].copy_from_slice(&ssrc.to_be_bytes());
    iv[4..8].copy_from_slice(&timestamp.to_be_bytes());
    iv[8..12].copy_from_slice(&counter.to_be_bytes());
    iv
}

/// Verschluesselt einen Frame und haengt IV + Trailer an
pub fn seal_frame(
    frame: &EncodedFrame,
    key: &SlotKey,
    codec: Option<Codec>,
    counter: u32,
) -> E2eeResult<Bytes> {
    let data = frame.data.as_ref();
    let header_len = unencrypted_header_len(data, frame.kind, codec);
    let (header, body) = data.split_at(header_len);

    let iv = make_iv(frame.ssrc, frame.timestamp, counter);
    let ciphertext = encrypt_aes256gcm(body, key.cipher_key.as_bytes(), &iv, header)?;

    let mut out =
        BytesMut::with_capacity(header.len() + ciphertext.len() + IV_LENGTH + FRAME_TRAILER_LEN);
    out.put_slice(header);
    out.put_slice(&ciphertext);
    out.put_slice(&iv);
    out.put_u8(IV_LENGTH as u8);
    out.put_u8(key.index);
    Ok(out.freeze())
}

/// Ein verschluesselter Frame, zerlegt in seine Bestandteile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedFrame<'a> {
    /// Key-Index aus dem Trailer
    pub key_index: KeyIndex,
    /// IV aus dem Trailer
    pub iv: [u8; IV_LENGTH],
    /// Header + Ciphertext (ohne IV und Trailer)
    pub body: &'a [u8],
}

impl<'a> SealedFrame<'a> {
    /// Zerlegt einen verschluesselten Frame anhand des Trailers
    pub fn parse(data: &'a [u8]) -> E2eeResult<Self> {
        if data.len() < TAG_LENGTH + IV_LENGTH + FRAME_TRAILER_LEN {
            return Err(E2eeError::UngueltigeDaten(format!(
                "Frame zu kurz fuer Trailer: {} Bytes",
                data.len()
            )));
        }
        let key_index = data[data.len() - 1];
        let iv_len = data[data.len() - 2] as usize;
        if iv_len != IV_LENGTH {
            return Err(E2eeError::UngueltigeDaten(format!(
                "Ungueltige IV-Laenge im Trailer: {iv_len}"
            )));
        }
        let iv_start = data.len() - FRAME_TRAILER_LEN - IV_LENGTH;
        let mut iv = [0u8; IV_LENGTH];
        iv.copy_from_slice(&data[iv_start..iv_start + IV_LENGTH]);

        Ok(Self {
            key_index,
            iv,
            body: &data[..iv_start],
        })
    }

    /// Entschluesselt den Frame und stellt den unverschluesselten Header wieder voran
    ///
    /// Die Header-Laenge wird ueber die urspruengliche Frame-Laenge (Body
    /// ohne Auth-Tag) bestimmt, wie beim Versiegeln.
    pub fn open(&self, kind: FrameKind, codec: Option<Codec>, key: &SlotKey) -> E2eeResult<Bytes> {
        let Some(klartext_len) = self.body.len().checked_sub(TAG_LENGTH) else {
            return Err(E2eeError::UngueltigeDaten(
                "Frame kuerzer als Auth-Tag".to_string(),
            ));
        };
        let header_len = unencrypted_header_len(&self.body[..klartext_len], kind, codec);
        let (header, ciphertext) = self.body.split_at(header_len);
        let plaintext = decrypt_aes256gcm(ciphertext, key.cipher_key.as_bytes(), &self.iv, header)?;

        let mut out = BytesMut::with_capacity(header.len() + plaintext.len());
        out.put_slice(header);
        out.put_slice(&plaintext);
        Ok(out.freeze())
    }
}

/// Prueft ob ein Frame vom Server injiziert wurde (endet mit dem SIF-Trailer)
pub fn is_server_injected(data: &[u8], sif_trailer: &[u8]) -> bool {
    !sif_trailer.is_empty() && data.len() >= sif_trailer.len() && data.ends_with(sif_trailer)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::KeyRing;
    use crate::options::KeyProviderOptions;

    fn schluessel() -> (KeyRing, SlotKey) {
        let ring = KeyRing::new(&KeyProviderOptions::default());
        ring.set_key(b"frame-schluessel", Some(4)).unwrap();
        let key = ring.current().unwrap();
        (ring, key)
    }

    fn video_frame(kind: FrameKind) -> EncodedFrame {
        let data: Vec<u8> = (0u8..64).collect();
        EncodedFrame::neu(data, kind, 3000, 0xCAFE)
    }

    #[test]
    fn vp8_header_laengen() {
        let data = [0u8; 32];
        assert_eq!(unencrypted_header_len(&data, FrameKind::Key, Some(Codec::Vp8)), 10);
        assert_eq!(unencrypted_header_len(&data, FrameKind::Delta, Some(Codec::Vp8)), 3);
        assert_eq!(unencrypted_header_len(&data, FrameKind::Delta, None), 3);
        assert_eq!(unencrypted_header_len(&data, FrameKind::Audio, Some(Codec::Opus)), 1);
        assert_eq!(unencrypted_header_len(&data, FrameKind::Key, Some(Codec::Av1)), 0);
        assert_eq!(unencrypted_header_len(&data, FrameKind::Key, Some(Codec::Vp9)), 0);
    }

    #[test]
    fn header_nie_laenger_als_frame() {
        assert_eq!(unencrypted_header_len(&[1, 2], FrameKind::Key, Some(Codec::Vp8)), 2);
        assert_eq!(unencrypted_header_len(&[], FrameKind::Audio, None), 0);
    }

    #[test]
    fn h264_slice_nalu_wird_gefunden() {
        // SPS (Typ 7), dann IDR-Slice (Typ 5)
        let data = [
            0, 0, 0, 1, 0x67, 0xAA, 0xBB, 0, 0, 1, 0x65, 0x88, 0x99, 0x11, 0x22,
        ];
        // Start der IDR-NALU ist Index 10 -> Header bis 12
        assert_eq!(unencrypted_header_len(&data, FrameKind::Key, Some(Codec::H264)), 12);
    }

    #[test]
    fn h264_ohne_slice_faellt_auf_vp8_regel_zurueck() {
        let data = [0, 0, 1, 0x67, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        assert_eq!(unencrypted_header_len(&data, FrameKind::Delta, Some(Codec::H264)), 3);
    }

    #[test]
    fn iv_aufbau() {
        let iv = make_iv(0x0102_0304, 0x0506_0708, 0x090A_0B0C);
        assert_eq!(iv, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn seal_und_open_roundtrip_vp8() {
        let (_ring, key) = schluessel();
        let frame = video_frame(FrameKind::Key);

        let sealed = seal_frame(&frame, &key, Some(Codec::Vp8), 1).unwrap();
        // Header bleibt lesbar
        assert_eq!(&sealed[..10], &frame.data[..10]);
        assert_eq!(sealed.len(), 64 + TAG_LENGTH + IV_LENGTH + FRAME_TRAILER_LEN);
        assert_eq!(sealed[sealed.len() - 1], 4);
        assert_eq!(sealed[sealed.len() - 2], IV_LENGTH as u8);

        let parsed = SealedFrame::parse(&sealed).unwrap();
        assert_eq!(parsed.key_index, 4);
        let opened = parsed.open(FrameKind::Key, Some(Codec::Vp8), &key).unwrap();
        assert_eq!(opened, frame.data);
    }

    #[test]
    fn seal_und_open_roundtrip_h264() {
        let (_ring, key) = schluessel();
        let mut data = vec![0, 0, 0, 1, 0x41, 0x9A];
        data.extend(std::iter::repeat(0x55).take(40));
        let frame = EncodedFrame::neu(data, FrameKind::Delta, 1, 2);

        let sealed = seal_frame(&frame, &key, Some(Codec::H264), 9).unwrap();
        let opened = SealedFrame::parse(&sealed)
            .unwrap()
            .open(FrameKind::Delta, Some(Codec::H264), &key)
            .unwrap();
        assert_eq!(opened, frame.data);
    }

    fn kurz_roundtrip(data: &[u8], kind: FrameKind, codec: Option<Codec>) {
        let (_ring, key) = schluessel();
        let frame = EncodedFrame::neu(data.to_vec(), kind, 77, 5);
        let sealed = seal_frame(&frame, &key, codec, 3).unwrap();
        assert_eq!(sealed.len(), data.len() + TAG_LENGTH + IV_LENGTH + FRAME_TRAILER_LEN);
        let opened = SealedFrame::parse(&sealed)
            .unwrap()
            .open(kind, codec, &key)
            .unwrap();
        assert_eq!(&opened[..], data);
    }

    #[test]
    fn leerer_frame_roundtrip() {
        kurz_roundtrip(&[], FrameKind::Audio, Some(Codec::Opus));
        kurz_roundtrip(&[], FrameKind::Key, Some(Codec::Vp8));
    }

    #[test]
    fn frame_kuerzer_als_header_roundtrip() {
        kurz_roundtrip(&[0x9D, 0x01], FrameKind::Delta, Some(Codec::Vp8));
        kurz_roundtrip(&[0x9D, 0x01], FrameKind::Key, Some(Codec::Vp8));
        kurz_roundtrip(&[1, 2, 3, 4, 5, 6], FrameKind::Key, Some(Codec::Vp8));
        kurz_roundtrip(&[1, 2, 3, 4, 5, 6], FrameKind::Key, None);
    }

    #[test]
    fn h264_frame_endet_in_slice_nalu_roundtrip() {
        kurz_roundtrip(&[0, 0, 0, 1, 0x41], FrameKind::Delta, Some(Codec::H264));
        kurz_roundtrip(&[0, 0, 1], FrameKind::Delta, Some(Codec::H264));
    }

    #[test]
    fn manipulierter_header_schlaegt_fehl() {
        let (_ring, key) = schluessel();
        let frame = video_frame(FrameKind::Delta);
        let sealed = seal_frame(&frame, &key, Some(Codec::Vp8), 1).unwrap();

        let mut kaputt = sealed.to_vec();
        kaputt[0] ^= 0x01;
        let result = SealedFrame::parse(&kaputt)
            .unwrap()
            .open(FrameKind::Delta, Some(Codec::Vp8), &key);
        assert!(matches!(result, Err(E2eeError::AuthenticationFailed)));
    }

    #[test]
    fn anderer_zaehler_ergibt_andere_iv() {
        let (_ring, key) = schluessel();
        let frame = video_frame(FrameKind::Delta);
        let a = seal_frame(&frame, &key, None, 1).unwrap();
        let b = seal_frame(&frame, &key, None, 2).unwrap();
        assert_ne!(
            SealedFrame::parse(&a).unwrap().iv,
            SealedFrame::parse(&b).unwrap().iv
        );
    }

    #[test]
    fn zu_kurzer_frame_wird_abgelehnt() {
        assert!(matches!(
            SealedFrame::parse(&[0u8; 10]),
            Err(E2eeError::UngueltigeDaten(_))
        ));
    }

    #[test]
    fn falsche_iv_laenge_im_trailer() {
        let mut data = vec![0u8; 40];
        let n = data.len();
        data[n - 2] = 8;
        assert!(matches!(
            SealedFrame::parse(&data),
            Err(E2eeError::UngueltigeDaten(_))
        ));
    }

    #[test]
    fn sif_trailer_erkennung() {
        let trailer = b"SIF!";
        assert!(is_server_injected(b"abcSIF!", trailer));
        assert!(!is_server_injected(b"abcSIF", trailer));
        assert!(!is_server_injected(b"abc", b""));
    }
}
