// Codec - Length-delimited framing for JSON messages
//
// Each frame is a 4-byte big-endian body length followed by the body. The
// decoder buffers partial reads and only ever hands out complete frames.

use crate::sync::protocol::{Message, ProtocolError};

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Encode a message into a single length-prefixed frame
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let body = message.to_json()?;
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::MessageTooLarge {
            len: body.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Incremental frame decoder
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len,
        }
    }

    /// Append bytes read from the stream
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame body.
    ///
    /// `Ok(None)` means more bytes are needed. An oversized length header is
    /// unrecoverable: the stream can no longer be split into frames.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&self.buf[..HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;
        if len > self.max_frame_len {
            return Err(ProtocolError::MessageTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }

        let body = self.buf[HEADER_LEN..HEADER_LEN + len].to_vec();
        self.buf.drain(..HEADER_LEN + len);
        Ok(Some(body))
    }

    /// Bytes buffered but not yet returned
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
