//! Frame payload codec.
//!
//! A complete wire frame is the 64-byte header followed by
//! `header.value_count` little-endian `f32` values. Decoding is pure: it
//! borrows the input buffers and produces an owned [`Frame`]; the caller
//! decides what to do with codec failures (the routing layer drops the
//! frame and keeps the previous one).

use crate::protocol::header::{FrameHeader, HEADER_SIZE};
use crate::{MocapError, Result};

/// One decoded wire frame: validated header plus its float payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub values: Vec<f32>,
}

/// Decode a frame from its header bytes and payload bytes.
///
/// The payload may be longer than the declared value count (UDP datagrams
/// carry trailing padding from some senders); it must not be shorter.
pub fn decode(header_bytes: &[u8], payload_bytes: &[u8]) -> Result<Frame> {
    let header = FrameHeader::parse(header_bytes)?;
    let needed = header.value_count as usize * 4;
    if payload_bytes.len() < needed {
        return Err(MocapError::truncated_payload(needed, payload_bytes.len()));
    }

    let mut values = Vec::with_capacity(header.value_count as usize);
    for chunk in payload_bytes[..needed].chunks_exact(4) {
        values.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    Ok(Frame { header, values })
}

/// Encode a header and payload into one contiguous wire buffer.
///
/// Sets `value_count` from the slice length and validates the result, so an
/// encoded frame always decodes.
pub fn encode(header: &FrameHeader, values: &[f32]) -> Result<Vec<u8>> {
    let mut header = header.clone();
    header.value_count = u16::try_from(values.len()).map_err(|_| {
        MocapError::malformed_header(format!("payload of {} values overflows u16", values.len()))
    })?;
    header.validate()?;

    let mut out = Vec::with_capacity(HEADER_SIZE + values.len() * 4);
    out.extend_from_slice(&header.encode());
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::tests::arb_valid_header;
    use crate::protocol::MAX_VALUE_COUNT;
    use proptest::prelude::*;

    prop_compose! {
        fn arb_frame()(header in arb_valid_header())(
            values in proptest::collection::vec(-1000.0f32..1000.0, header.value_count as usize),
            header in Just(header)
        ) -> (FrameHeader, Vec<f32>) {
            (header, values)
        }
    }

    proptest! {
        #[test]
        fn decode_then_encode_is_identity((header, values) in arb_frame()) {
            let bytes = encode(&header, &values).expect("valid frame must encode");
            let frame = decode(&bytes[..HEADER_SIZE], &bytes[HEADER_SIZE..])
                .expect("encoded frame must decode");
            prop_assert_eq!(&frame.header, &header);
            prop_assert_eq!(&frame.values, &values);

            let again = encode(&frame.header, &frame.values).unwrap();
            prop_assert_eq!(again, bytes);
        }

        #[test]
        fn short_payload_is_truncation((header, values) in arb_frame()) {
            prop_assume!(!values.is_empty());
            let bytes = encode(&header, &values).unwrap();
            let short = &bytes[HEADER_SIZE..bytes.len() - 1];
            let result = decode(&bytes[..HEADER_SIZE], short);
            let truncated = matches!(result, Err(MocapError::TruncatedPayload { .. }));
            prop_assert!(truncated);
        }
    }

    #[test]
    fn trailing_payload_bytes_are_ignored() {
        let mut header = FrameHeader::default();
        header.value_count = 2;
        let mut payload = Vec::new();
        payload.extend_from_slice(&1.5f32.to_le_bytes());
        payload.extend_from_slice(&(-2.0f32).to_le_bytes());
        payload.extend_from_slice(&[0xAB; 7]);

        let frame = decode(&header.encode(), &payload).unwrap();
        assert_eq!(frame.values, vec![1.5, -2.0]);
    }

    #[test]
    fn oversized_value_slice_fails_to_encode() {
        let header = FrameHeader::default();
        let values = vec![0.0f32; MAX_VALUE_COUNT + 1];
        assert!(matches!(
            encode(&header, &values),
            Err(MocapError::MalformedHeader { .. })
        ));
    }
}
