//! Frame decoding
//!
//! With `compress=true` the exchange sends every push as a binary frame of
//! raw deflate data (no zlib header). Text frames are passed through.

use crate::transport::{Frame, TransportError};
use flate2::read::DeflateDecoder;
use std::io::Read;

/// Largest inflated message accepted from the exchange
pub const MAX_INFLATED_LEN: usize = 16 * 1024 * 1024;

/// Inflate a raw-deflate payload of at most [`MAX_INFLATED_LEN`] bytes
pub fn inflate(data: &[u8]) -> Result<Vec<u8>, TransportError> {
    inflate_limited(data, MAX_INFLATED_LEN)
}

/// Inflate a raw-deflate payload, rejecting output longer than `limit`
pub fn inflate_limited(data: &[u8], limit: usize) -> Result<Vec<u8>, TransportError> {
    let mut decoder = DeflateDecoder::new(data).take(limit as u64 + 1);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).min(limit));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| TransportError::Inflate(e.to_string()))?;
    if out.len() > limit {
        return Err(TransportError::Inflate(format!(
            "inflated frame exceeds {} bytes",
            limit
        )));
    }
    Ok(out)
}

/// Bytes of the message carried by a frame
pub fn decode_frame(frame: Frame) -> Result<Vec<u8>, TransportError> {
    match frame {
        Frame::Text(text) => Ok(text.into_bytes()),
        Frame::Binary(data) => inflate(&data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_inflate_raw_deflate() {
        let message = br#"{"event":"subscribe","channel":"spot/depth:BTC-USDT"}"#;
        assert_eq!(inflate(&deflate(message)).unwrap(), message.to_vec());
    }

    #[test]
    fn test_inflate_rejects_garbage() {
        let err = inflate(&[0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, TransportError::Inflate(_)));
    }

    #[test]
    fn test_inflate_enforces_limit() {
        let bomb = deflate(&vec![b'0'; 64 * 1024]);
        assert!(bomb.len() < 1024);

        let err = inflate_limited(&bomb, 4096).unwrap_err();
        assert!(err.to_string().contains("exceeds 4096 bytes"), "{}", err);

        assert_eq!(inflate_limited(&bomb, 64 * 1024).unwrap().len(), 64 * 1024);
    }

    #[test]
    fn test_text_frames_pass_through() {
        assert_eq!(decode_frame(Frame::Text("pong".into())).unwrap(), b"pong".to_vec());
        assert_eq!(
            decode_frame(Frame::Binary(deflate(b"pong"))).unwrap(),
            b"pong".to_vec()
        );
    }
}
