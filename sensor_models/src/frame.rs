//! LD2450 frame codec.
//!
//! # Wire layout (30 bytes)
//! ```text
//! [0..4)   header  AA FF 03 00
//! [4..12)  target 1: x (u16 LE), y (u16 LE), speed/reserved (4 bytes)
//! [12..20) target 2
//! [20..28) target 3
//! [28..30) footer  55 CC
//! ```
//! Coordinates use a sign-magnitude encoding: the top bit is a polarity flag
//! (set = positive), the low 15 bits are the magnitude in millimetres.

use crate::observation::{Observation, Slot, SLOT_COUNT};
use thiserror::Error;

pub const FRAME_LEN: usize = 30;
pub const HEADER: [u8; 4] = [0xAA, 0xFF, 0x03, 0x00];
pub const FOOTER: [u8; 2] = [0x55, 0xCC];

const BLOCK_OFFSET: usize = HEADER.len();
const BLOCK_LEN: usize = 8;
const POLARITY_BIT: u16 = 0x8000;
const MAGNITUDE_MASK: u16 = 0x7FFF;

/// Reasons a payload is not a frame. These are transport noise: callers drop
/// the payload and carry on.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("frame must be 30 bytes, got {0}")]
    WrongLength(usize),
    #[error("frame header magic missing")]
    BadHeader,
    #[error("frame footer magic missing")]
    BadFooter,
    #[error("payload is not valid hex: {0}")]
    BadHex(#[from] hex::FromHexError),
}

/// Decode a polarity-flagged 16-bit word into signed millimetres.
pub fn decode_word(word: u16) -> i32 {
    let magnitude = (word & MAGNITUDE_MASK) as i32;
    if word & POLARITY_BIT != 0 {
        magnitude
    } else {
        -magnitude
    }
}

/// Inverse of [`decode_word`]. Magnitudes beyond 15 bits saturate.
pub fn encode_word(value_mm: i32) -> u16 {
    let magnitude = value_mm.unsigned_abs().min(MAGNITUDE_MASK as u32) as u16;
    if value_mm > 0 {
        magnitude | POLARITY_BIT
    } else {
        magnitude
    }
}

/// Check length and magics without decoding targets.
pub fn validate(buf: &[u8]) -> Result<(), FrameError> {
    if buf.len() != FRAME_LEN {
        return Err(FrameError::WrongLength(buf.len()));
    }
    if !buf.starts_with(&HEADER) {
        return Err(FrameError::BadHeader);
    }
    if !buf.ends_with(&FOOTER) {
        return Err(FrameError::BadFooter);
    }
    Ok(())
}

/// Decode a complete frame into zero to three observations, each carrying the
/// frame as lowercase hex.
pub fn decode_frame(buf: &[u8]) -> Result<Vec<Observation>, FrameError> {
    validate(buf)?;
    let raw = hex::encode(buf);

    let observations = buf[BLOCK_OFFSET..BLOCK_OFFSET + SLOT_COUNT * BLOCK_LEN]
        .chunks_exact(BLOCK_LEN)
        .enumerate()
        .filter(|(_, block)| block.iter().any(|&b| b != 0))
        .map(|(i, block)| {
            let x = u16::from_le_bytes([block[0], block[1]]);
            let y = u16::from_le_bytes([block[2], block[3]]);
            Observation {
                slot: Slot::from_block(i),
                x_mm: decode_word(x),
                y_mm: decode_word(y),
                raw_frame: Some(raw.clone()),
            }
        })
        .collect();

    Ok(observations)
}

/// Decode a network payload: ASCII hex of one frame, surrounding whitespace
/// ignored.
pub fn decode_hex_payload(payload: &[u8]) -> Result<Vec<Observation>, FrameError> {
    let text = String::from_utf8_lossy(payload);
    let bytes = hex::decode(text.trim())?;
    decode_frame(&bytes)
}

/// Build a frame from up to three `(x_mm, y_mm)` targets; `None` leaves the
/// block zeroed. Reserved bytes stay zero.
pub fn encode_frame(targets: &[Option<(i32, i32)>; SLOT_COUNT]) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[..HEADER.len()].copy_from_slice(&HEADER);
    frame[FRAME_LEN - FOOTER.len()..].copy_from_slice(&FOOTER);

    for (i, target) in targets.iter().enumerate() {
        if let Some((x, y)) = target {
            let off = BLOCK_OFFSET + i * BLOCK_LEN;
            frame[off..off + 2].copy_from_slice(&encode_word(*x).to_le_bytes());
            frame[off + 2..off + 4].copy_from_slice(&encode_word(*y).to_le_bytes());
        }
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polarity_bit_means_positive() {
        assert_eq!(decode_word(0x8005), 5);
        assert_eq!(decode_word(0x0005), -5);
        assert_eq!(decode_word(0xFFFF), 32767);
        assert_eq!(decode_word(0x7FFF), -32767);
        assert_eq!(decode_word(0x8000), 0);
    }

    #[test]
    fn encode_word_inverts_decode() {
        for v in [-32767, -1200, -1, 0, 1, 850, 32767] {
            assert_eq!(decode_word(encode_word(v)), v);
        }
        assert_eq!(decode_word(encode_word(40_000)), 32767);
    }

    #[test]
    fn decodes_known_frame() {
        // target 1: x = +5 (0x8005), y = -300 (0x012C); targets 2, 3 empty
        let mut buf = [0u8; FRAME_LEN];
        buf[..4].copy_from_slice(&HEADER);
        buf[4..8].copy_from_slice(&[0x05, 0x80, 0x2C, 0x01]);
        buf[28..].copy_from_slice(&FOOTER);

        let obs = decode_frame(&buf).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].slot, Slot(1));
        assert_eq!((obs[0].x_mm, obs[0].y_mm), (5, -300));
        let raw = obs[0].raw_frame.as_deref().unwrap();
        assert_eq!(raw.len(), FRAME_LEN * 2);
        assert!(raw.starts_with("aaff0300"));
        assert!(raw.ends_with("55cc"));
    }

    #[test]
    fn speed_bytes_alone_make_slot_occupied() {
        let mut buf = encode_frame(&[None, None, None]);
        buf[20 + 5] = 0x10;
        let obs = decode_frame(&buf).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].slot, Slot(3));
        assert_eq!((obs[0].x_mm, obs[0].y_mm), (0, 0));
    }

    #[test]
    fn empty_frame_yields_nothing() {
        let buf = encode_frame(&[None, None, None]);
        assert!(decode_frame(&buf).unwrap().is_empty());
    }

    #[test]
    fn all_slots_decode_in_order() {
        let buf = encode_frame(&[Some((-1500, 2000)), Some((0, 700)), Some((32767, -32767))]);
        let obs = decode_frame(&buf).unwrap();
        let slots: Vec<u8> = obs.iter().map(|o| o.slot.0).collect();
        assert_eq!(slots, vec![1, 2, 3]);
        assert_eq!((obs[0].x_mm, obs[0].y_mm), (-1500, 2000));
        assert_eq!((obs[2].x_mm, obs[2].y_mm), (32767, -32767));
    }

    #[test]
    fn rejects_malformed_frames() {
        let good = encode_frame(&[Some((1, 1)), None, None]);
        assert_eq!(decode_frame(&good[..29]), Err(FrameError::WrongLength(29)));

        let mut bad_header = good;
        bad_header[1] = 0x00;
        assert_eq!(decode_frame(&bad_header), Err(FrameError::BadHeader));

        let mut bad_footer = good;
        bad_footer[29] = 0x00;
        assert_eq!(decode_frame(&bad_footer), Err(FrameError::BadFooter));
    }

    #[test]
    fn hex_payload_is_trimmed_and_decoded() {
        let frame = encode_frame(&[None, Some((250, 1000)), None]);
        let payload = format!("  {}\n", hex::encode_upper(frame));
        let obs = decode_hex_payload(payload.as_bytes()).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].slot, Slot(2));
        assert_eq!(obs[0].raw_frame.as_deref(), Some(hex::encode(frame).as_str()));

        assert!(matches!(
            decode_hex_payload(b"not hex"),
            Err(FrameError::BadHex(_))
        ));
    }
}
