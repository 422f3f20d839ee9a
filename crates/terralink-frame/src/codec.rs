use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Start-of-frame marker.
pub const FRAME_START: u8 = 0xA5;

/// Frame header: start (1) + kind (1) + length (2) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Trailing checksum byte.
pub const TRAILER_SIZE: usize = 1;

/// Largest payload either peer accepts.
pub const MAX_PAYLOAD: usize = 512;

/// One checksum-verified protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message kind byte.
    pub kind: u8,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload + checksum).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + TRAILER_SIZE
    }
}

/// Additive checksum: low byte of `kind + len_lo + len_hi + sum(payload)`.
pub fn checksum(kind: u8, payload: &[u8]) -> u8 {
    let [len_lo, len_hi] = (payload.len() as u16).to_le_bytes();
    payload
        .iter()
        .fold(kind.wrapping_add(len_lo).wrapping_add(len_hi), |acc, b| {
            acc.wrapping_add(*b)
        })
}

/// Encode a frame into the wire format.
///
/// ```text
/// ┌──────┬──────┬─────────────┬─────────────────┬──────────┐
/// │ 0xA5 │ kind │ length      │ payload         │ checksum │
/// │ (1B) │ (1B) │ (2B LE)     │ (length bytes)  │ (1B)     │
/// └──────┴──────┴─────────────┴─────────────────┴──────────┘
/// ```
///
/// Fails without touching `dst` when the payload exceeds [`MAX_PAYLOAD`].
pub fn encode_frame(kind: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len() + TRAILER_SIZE);
    dst.put_u8(FRAME_START);
    dst.put_u8(kind);
    dst.put_u16_le(payload.len() as u16);
    dst.put_slice(payload);
    dst.put_u8(checksum(kind, payload));
    Ok(())
}

/// Decode the next frame from a buffer, resynchronizing on the start marker.
///
/// Bytes ahead of the first start marker are discarded. Returns `Ok(None)`
/// when the buffer holds no complete frame yet; the partial frame, if any,
/// stays at the front of `src`.
///
/// A header announcing more than `max_payload` bytes is reported as an error
/// after the header has been consumed. A frame whose checksum does not match
/// is reported after the whole frame has been consumed, so nothing inside a
/// rejected frame is ever rescanned as a frame of its own.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    match src.iter().position(|b| *b == FRAME_START) {
        Some(offset) => src.advance(offset),
        None => {
            src.clear();
            return Ok(None);
        }
    }

    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let kind = src[1];
    let payload_len = u16::from_le_bytes([src[2], src[3]]) as usize;

    if payload_len > max_payload {
        src.advance(HEADER_SIZE);
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len + TRAILER_SIZE;
    if src.len() < total {
        return Ok(None);
    }

    let expected = checksum(kind, &src[HEADER_SIZE..HEADER_SIZE + payload_len]);
    let received = src[HEADER_SIZE + payload_len];
    if expected != received {
        src.advance(total);
        return Err(FrameError::ChecksumMismatch { expected, received });
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    src.advance(TRAILER_SIZE);

    Ok(Some(Frame { kind, payload }))
}

/// Configuration for frame reading and writing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: [`MAX_PAYLOAD`].
    pub max_payload_size: usize,
    /// Time allowed for the rest of the header once a start marker arrived.
    pub header_timeout: Duration,
    /// Time allowed for the payload once the header is complete.
    pub payload_timeout: Duration,
    /// Time allowed for the checksum byte once the payload is complete.
    pub checksum_timeout: Duration,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
            header_timeout: Duration::from_millis(50),
            payload_timeout: Duration::from_millis(50),
            checksum_timeout: Duration::from_millis(20),
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encodes_documented_layout() {
        let mut buf = BytesMut::new();
        encode_frame(0x01, &[0x01], &mut buf).unwrap();

        assert_eq!(buf.as_ref(), &[0xA5, 0x01, 0x01, 0x00, 0x01, 0x03]);
    }

    #[test]
    fn checksum_wraps_and_includes_length() {
        let payload = vec![0xFF; 300];
        let expected = (0x10u32 + (300 & 0xFF) + (300 >> 8) + 0xFF * 300) as u8;
        assert_eq!(checksum(0x10, &payload), expected);
    }

    #[test]
    fn empty_payload_frame() {
        let mut buf = BytesMut::new();
        encode_frame(0x03, b"", &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + TRAILER_SIZE);

        let frame = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame.kind, 0x03);
        assert!(frame.payload.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let mut buf = BytesMut::new();
        let result = encode_frame(0x10, &[0u8; MAX_PAYLOAD + 1], &mut buf);

        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size, max }) if size == MAX_PAYLOAD + 1 && max == MAX_PAYLOAD
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_accepts_maximum_payload() {
        let mut buf = BytesMut::new();
        encode_frame(0x10, &[7u8; MAX_PAYLOAD], &mut buf).unwrap();
        let frame = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame.payload.len(), MAX_PAYLOAD);
    }

    #[test]
    fn incomplete_frame_is_kept() {
        let mut buf = BytesMut::new();
        encode_frame(0x1F, &[1, 2, 3, 4], &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_frame(&mut buf, MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
        assert_eq!(buf[0], FRAME_START);
    }

    #[test]
    fn garbage_without_marker_is_discarded() {
        let mut buf = BytesMut::from(&[0x00, 0x13, 0x37, 0xFF][..]);
        assert!(decode_frame(&mut buf, MAX_PAYLOAD).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_length_drops_header() {
        let mut buf = BytesMut::new();
        buf.put_u8(FRAME_START);
        buf.put_u8(0x10);
        buf.put_u16_le(600);
        buf.put_u8(0x42);

        let err = decode_frame(&mut buf, MAX_PAYLOAD).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 600, .. }));
        assert_eq!(buf.as_ref(), &[0x42]);
    }

    #[test]
    fn checksum_mismatch_resumes_after_frame() {
        let mut buf = BytesMut::new();
        encode_frame(0x80, &[9, 9], &mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0x01;
        encode_frame(0x20, &[1, 2, 3, 4], &mut buf).unwrap();

        let err = decode_frame(&mut buf, MAX_PAYLOAD).unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));

        let frame = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame.kind, 0x20);
        assert_eq!(frame.payload.as_ref(), &[1, 2, 3, 4]);
    }

    fn drain(buf: &mut BytesMut) -> Vec<Frame> {
        let mut delivered = Vec::new();
        loop {
            match decode_frame(buf, MAX_PAYLOAD) {
                Ok(Some(frame)) => delivered.push(frame),
                Ok(None) => break,
                Err(_) => continue,
            }
        }
        delivered
    }

    #[test]
    fn frame_nested_in_corrupted_payload_is_not_delivered() {
        let mut inner = BytesMut::new();
        encode_frame(0x03, &[], &mut inner).unwrap();

        let mut buf = BytesMut::new();
        encode_frame(0x30, &inner, &mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0x01;

        let err = decode_frame(&mut buf, MAX_PAYLOAD).unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));
        assert!(buf.is_empty());
        assert!(drain(&mut buf).is_empty());
    }

    #[test]
    fn marker_in_garbage_with_short_length_is_not_delivered() {
        // Looks like a 2-byte frame, but its checksum byte is wrong.
        let mut buf = BytesMut::from(&[0x00, FRAME_START, 0x81, 0x02, 0x00, 0x11, 0x22, 0x00][..]);
        encode_frame(0x01, &[1], &mut buf).unwrap();

        let delivered = drain(&mut buf);
        assert_eq!(delivered, vec![Frame::new(0x01, Bytes::from_static(&[1]))]);
        assert!(buf.is_empty());
    }

    #[test]
    fn back_to_back_frames() {
        let mut buf = BytesMut::new();
        encode_frame(0x01, &[1], &mut buf).unwrap();
        encode_frame(0x81, &[0, 4, 88, 2, 1], &mut buf).unwrap();

        let first = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        let second = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(first.kind, 0x01);
        assert_eq!(second.kind, 0x81);
        assert!(buf.is_empty());
    }

    #[test]
    fn frame_wire_size() {
        let frame = Frame::new(0x1F, Bytes::from_static(&[0, 0, 0, 0]));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 4 + TRAILER_SIZE);
    }

    fn garbage() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>().prop_filter("not a start marker", |b| *b != FRAME_START), 0..64)
    }

    /// A complete frame whose checksum byte is off by `delta`.
    fn corrupted_frame() -> impl Strategy<Value = Vec<u8>> {
        (any::<u8>(), prop::collection::vec(any::<u8>(), 0..32), 1u8..=255).prop_map(|(kind, payload, delta)| {
            let mut buf = BytesMut::new();
            encode_frame(kind, &payload, &mut buf).unwrap();
            let last = buf.len() - 1;
            buf[last] = buf[last].wrapping_add(delta);
            buf.to_vec()
        })
    }

    proptest! {
        #[test]
        fn roundtrip(kind in any::<u8>(), payload in prop::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD)) {
            let mut buf = BytesMut::new();
            encode_frame(kind, &payload, &mut buf).unwrap();

            let frame = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
            prop_assert_eq!(frame.kind, kind);
            prop_assert_eq!(frame.payload.as_ref(), payload.as_slice());
            prop_assert!(buf.is_empty());
        }

        #[test]
        fn flipped_checksum_bit_is_rejected(
            kind in any::<u8>(),
            payload in prop::collection::vec(any::<u8>(), 0..64),
            bit in 0u8..8,
        ) {
            let mut buf = BytesMut::new();
            encode_frame(kind, &payload, &mut buf).unwrap();
            let last = buf.len() - 1;
            buf[last] ^= 1 << bit;

            let mut delivered = Vec::new();
            loop {
                match decode_frame(&mut buf, MAX_PAYLOAD) {
                    Ok(Some(frame)) => delivered.push(frame),
                    Ok(None) => break,
                    Err(_) => continue,
                }
            }
            prop_assert!(!delivered.iter().any(|f| f.kind == kind && f.payload.as_ref() == payload.as_slice()));
        }

        #[test]
        fn resyncs_through_garbage(
            before in garbage(),
            after in garbage(),
            kind in any::<u8>(),
            payload in prop::collection::vec(any::<u8>().prop_filter("no marker", |b| *b != FRAME_START), 0..128),
        ) {
            let mut buf = BytesMut::from(before.as_slice());
            encode_frame(kind, &payload, &mut buf).unwrap();
            buf.put_slice(&after);

            let mut delivered = Vec::new();
            loop {
                match decode_frame(&mut buf, MAX_PAYLOAD) {
                    Ok(Some(frame)) => delivered.push(frame),
                    Ok(None) => break,
                    Err(_) => continue,
                }
            }

            prop_assert_eq!(delivered.len(), 1);
            prop_assert_eq!(delivered[0].kind, kind);
            prop_assert_eq!(delivered[0].payload.as_ref(), payload.as_slice());
            prop_assert!(buf.is_empty());
        }

        #[test]
        fn corrupted_frame_in_noise_delivers_only_real_frame(
            before in garbage(),
            decoy in corrupted_frame(),
            kind in any::<u8>(),
            payload in prop::collection::vec(any::<u8>(), 0..128),
        ) {
            let mut buf = BytesMut::from(before.as_slice());
            buf.put_slice(&decoy);
            encode_frame(kind, &payload, &mut buf).unwrap();

            let delivered = drain(&mut buf);
            prop_assert_eq!(delivered.len(), 1);
            prop_assert_eq!(delivered[0].kind, kind);
            prop_assert_eq!(delivered[0].payload.as_ref(), payload.as_slice());
            prop_assert!(buf.is_empty());
        }
    }
}
