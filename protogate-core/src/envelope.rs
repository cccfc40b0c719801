//! Length-prefixed envelope framing for the binary transport.
//!
//! Requests sent as `application/grpc-web+proto` carry exactly one message
//! wrapped in an envelope:
//!
//! ```text
//! [flags:1][length:4][payload:length]
//! ```

use bytes::Bytes;

/// Envelope flags.
pub mod envelope_flags {
    /// Regular message (uncompressed).
    pub const MESSAGE: u8 = 0x00;
    /// Compressed message.
    pub const COMPRESSED: u8 = 0x01;
}

/// Envelope header size (flags + length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// Envelope framing errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// Incomplete envelope header.
    #[error("incomplete envelope header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// Payload shorter than the declared length.
    #[error("incomplete envelope: expected {expected} payload bytes, got {actual}")]
    IncompletePayload { expected: usize, actual: usize },

    /// Bytes after the single envelope.
    #[error("protocol error: {0} trailing bytes after envelope")]
    TrailingBytes(usize),

    /// Compressed payloads are not negotiated by this transport.
    #[error("compressed envelopes are not supported")]
    Compressed,

    /// Invalid frame flags.
    #[error("invalid frame flags: 0x{0:02x}")]
    InvalidFlags(u8),
}

/// Wrap a payload in an uncompressed envelope.
pub fn wrap_envelope(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.push(envelope_flags::MESSAGE);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Parse envelope header from bytes.
///
/// Returns `(flags, length)` if successful.
pub fn parse_envelope_header(data: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::IncompleteHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}

/// Extract the payload of a body holding exactly one uncompressed envelope.
pub fn unwrap_envelope(body: &Bytes) -> Result<Bytes, EnvelopeError> {
    let (flags, length) = parse_envelope_header(body)?;
    match flags {
        envelope_flags::MESSAGE => {}
        envelope_flags::COMPRESSED => return Err(EnvelopeError::Compressed),
        other => return Err(EnvelopeError::InvalidFlags(other)),
    }

    let length = length as usize;
    let available = body.len() - ENVELOPE_HEADER_SIZE;
    if available < length {
        return Err(EnvelopeError::IncompletePayload {
            expected: length,
            actual: available,
        });
    }
    if available > length {
        return Err(EnvelopeError::TrailingBytes(available - length));
    }

    Ok(body.slice(ENVELOPE_HEADER_SIZE..))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_envelope() {
        let frame = wrap_envelope(b"hello");

        assert_eq!(frame[0], envelope_flags::MESSAGE);
        assert_eq!(
            u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]),
            5
        );
        assert_eq!(&frame[5..], b"hello");
    }

    #[test]
    fn test_unwrap_envelope() {
        let body = Bytes::from(wrap_envelope(b"hello"));
        assert_eq!(unwrap_envelope(&body).unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_unwrap_empty_payload() {
        let body = Bytes::from(wrap_envelope(b""));
        assert!(unwrap_envelope(&body).unwrap().is_empty());
    }

    #[test]
    fn test_parse_envelope_header_incomplete() {
        let err = parse_envelope_header(&[0x00, 0x00, 0x00]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "incomplete envelope header: expected 5 bytes, got 3"
        );
    }

    #[test]
    fn test_unwrap_short_payload() {
        let body = Bytes::from_static(&[0x00, 0x00, 0x00, 0x00, 0x05, b'h', b'i']);
        assert_eq!(
            unwrap_envelope(&body),
            Err(EnvelopeError::IncompletePayload {
                expected: 5,
                actual: 2
            })
        );
    }

    #[test]
    fn test_unwrap_trailing_bytes() {
        let mut frame = wrap_envelope(b"hi");
        frame.push(0xFF);
        assert_eq!(
            unwrap_envelope(&Bytes::from(frame)),
            Err(EnvelopeError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_unwrap_rejects_flags() {
        let mut frame = wrap_envelope(b"hi");
        frame[0] = envelope_flags::COMPRESSED;
        assert_eq!(
            unwrap_envelope(&Bytes::from(frame.clone())),
            Err(EnvelopeError::Compressed)
        );
        frame[0] = 0x80;
        assert_eq!(
            unwrap_envelope(&Bytes::from(frame)),
            Err(EnvelopeError::InvalidFlags(0x80))
        );
    }
}
