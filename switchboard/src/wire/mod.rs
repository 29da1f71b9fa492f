//! Wire format for envelope framing.
//!
//! Frame format: `[length:varint][envelope:N]`
//!
//! - **length**: envelope byte count, LEB128 variable-length integer
//! - **envelope**: tag-length-value fields, see [`envelope`]
//!
//! Framing errors are unrecoverable: once a length prefix is malformed the
//! frame boundaries of everything after it are unknown, so the connection
//! driver treats any [`WireError`] from the decode path as a transport
//! failure. Errors *inside* a well-delimited frame are the envelope codec's
//! business and stay per-message.

pub mod envelope;

pub use envelope::{DecodeError, EncodeError, Envelope, EnvelopeCodec, MessageKind};

/// Maximum envelope size (1MB).
///
/// Frames larger than this are rejected on both sides to prevent memory
/// exhaustion from a bad or hostile peer.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Longest legal LEB128 encoding of a u64.
pub const MAX_VARINT_LEN: usize = 10;

/// Wire format error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Not enough data to parse the frame.
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData {
        /// Minimum bytes required to parse.
        needed: usize,
        /// Actual bytes available.
        have: usize,
    },

    /// A varint ran past its maximum length or overflowed 64 bits.
    #[error("malformed varint")]
    MalformedVarint,

    /// Frame exceeds the maximum allowed size.
    #[error("frame too large: {size} bytes (max {MAX_FRAME_SIZE})")]
    FrameTooLarge {
        /// Declared or actual frame size in bytes.
        size: usize,
    },
}

/// Append the LEB128 encoding of `value` to `out`.
pub fn encode_varint(value: u64, out: &mut Vec<u8>) {
    let mut v = value;
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decode a LEB128 varint from the front of `buf`.
///
/// Returns `Ok(None)` if the buffer ends in the middle of a varint that could
/// still complete with more data.
///
/// # Errors
///
/// Returns `MalformedVarint` if the encoding exceeds [`MAX_VARINT_LEN`] bytes
/// or overflows a u64. More data can never repair either condition.
pub fn decode_varint(buf: &[u8]) -> Result<Option<(u64, usize)>, WireError> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(WireError::MalformedVarint);
        }
        // The tenth byte may only carry the final bit of a u64.
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(WireError::MalformedVarint);
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        return Err(WireError::MalformedVarint);
    }
    Ok(None)
}

/// Frame an encoded envelope: length prefix followed by the bytes.
///
/// # Errors
///
/// Returns `FrameTooLarge` if the envelope exceeds [`MAX_FRAME_SIZE`].
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>, WireError> {
    if body.len() > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge { size: body.len() });
    }

    let mut frame = Vec::with_capacity(body.len() + MAX_VARINT_LEN);
    encode_varint(body.len() as u64, &mut frame);
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Try to extract one frame from the front of `buf`.
///
/// Returns `Ok(Some((body, consumed)))` when a complete frame is available,
/// `Ok(None)` when more data is needed.
///
/// # Errors
///
/// Returns `MalformedVarint` or `FrameTooLarge` when the length prefix is
/// unusable; the stream cannot be resynchronized after either.
pub fn try_decode_frame(buf: &[u8]) -> Result<Option<(&[u8], usize)>, WireError> {
    let (length, prefix_len) = match decode_varint(buf)? {
        Some(decoded) => decoded,
        None => return Ok(None),
    };

    if length > MAX_FRAME_SIZE as u64 {
        return Err(WireError::FrameTooLarge {
            size: length as usize,
        });
    }

    let total = prefix_len + length as usize;
    if buf.len() < total {
        return Ok(None);
    }

    Ok(Some((&buf[prefix_len..total], total)))
}

/// Extract one frame, treating incomplete data as an error.
///
/// # Errors
///
/// Returns `InsufficientData` where [`try_decode_frame`] would return
/// `Ok(None)`, plus everything that function can return.
pub fn decode_frame(buf: &[u8]) -> Result<(&[u8], usize), WireError> {
    match try_decode_frame(buf)? {
        Some(decoded) => Ok(decoded),
        None => Err(WireError::InsufficientData {
            needed: buf.len() + 1,
            have: buf.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_roundtrip_boundaries() {
        let cases = [
            0u64,
            1,
            127,
            128,
            16_383,
            16_384,
            u64::from(u32::MAX),
            u64::MAX,
        ];
        for value in cases {
            let mut buf = Vec::new();
            encode_varint(value, &mut buf);
            let (decoded, len) = decode_varint(&buf)
                .expect("decode")
                .expect("complete varint");
            assert_eq!(decoded, value, "value {value}");
            assert_eq!(len, buf.len());
        }
    }

    #[test]
    fn varint_single_byte_sizes() {
        let mut buf = Vec::new();
        encode_varint(127, &mut buf);
        assert_eq!(buf, vec![0x7f]);

        buf.clear();
        encode_varint(128, &mut buf);
        assert_eq!(buf, vec![0x80, 0x01]);
    }

    #[test]
    fn varint_partial_needs_more_data() {
        // Continuation bit set with nothing following.
        assert_eq!(decode_varint(&[0x80]).expect("decode"), None);
        assert_eq!(decode_varint(&[]).expect("decode"), None);
    }

    #[test]
    fn varint_too_long_is_malformed() {
        let buf = [0x80u8; 11];
        assert_eq!(decode_varint(&buf), Err(WireError::MalformedVarint));
    }

    #[test]
    fn varint_overflow_is_malformed() {
        // Ten bytes, but the tenth carries more than the final bit.
        let mut buf = vec![0xffu8; 9];
        buf.push(0x02);
        assert_eq!(decode_varint(&buf), Err(WireError::MalformedVarint));
    }

    #[test]
    fn frame_roundtrip() {
        let body = b"hello envelope";
        let frame = encode_frame(body).expect("encode");
        let (decoded, consumed) = try_decode_frame(&frame)
            .expect("decode")
            .expect("complete frame");
        assert_eq!(decoded, body);
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn frame_empty_body() {
        let frame = encode_frame(b"").expect("encode");
        assert_eq!(frame, vec![0x00]);
        let (body, consumed) = try_decode_frame(&frame)
            .expect("decode")
            .expect("complete frame");
        assert!(body.is_empty());
        assert_eq!(consumed, 1);
    }

    #[test]
    fn frame_partial_returns_none() {
        let frame = encode_frame(b"0123456789").expect("encode");
        for cut in 0..frame.len() {
            assert_eq!(
                try_decode_frame(&frame[..cut]).expect("decode"),
                None,
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn frame_too_large_on_encode() {
        let body = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            encode_frame(&body),
            Err(WireError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn frame_too_large_on_decode() {
        let mut buf = Vec::new();
        encode_varint((MAX_FRAME_SIZE + 1) as u64, &mut buf);
        assert!(matches!(
            try_decode_frame(&buf),
            Err(WireError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn multiple_frames_decode_sequentially() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&encode_frame(b"first").expect("encode"));
        buf.extend_from_slice(&encode_frame(b"second").expect("encode"));

        let (body, consumed) = try_decode_frame(&buf).expect("decode").expect("frame");
        assert_eq!(body, b"first");
        let rest = &buf[consumed..];
        let (body, consumed) = try_decode_frame(rest).expect("decode").expect("frame");
        assert_eq!(body, b"second");
        assert_eq!(consumed, rest.len());
    }

    #[test]
    fn decode_frame_rejects_partial() {
        let frame = encode_frame(b"payload").expect("encode");
        assert!(matches!(
            decode_frame(&frame[..3]),
            Err(WireError::InsufficientData { .. })
        ));
    }
}
