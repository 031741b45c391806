//! Message codec: `#`-terminated JSON frames.
//!
//! A `#` can only appear inside JSON string literals, so the encoder writes
//! it as the escape `\u0023` and the delimiter never occurs within a frame.

use ballot_messages::MessageCode;
use serde_json::Value;

use crate::{Envelope, ProtocolError};

/// Terminates every frame on the wire.
pub const FRAME_DELIMITER: u8 = b'#';

/// Maximum frame size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

/// Serialize an envelope into a delimited frame.
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(envelope)?;
    let mut frame = Vec::with_capacity(json.len() + 1);
    for byte in json {
        if byte == FRAME_DELIMITER {
            frame.extend_from_slice(br"\u0023");
        } else {
            frame.push(byte);
        }
    }
    if frame.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: frame.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    frame.push(FRAME_DELIMITER);
    Ok(frame)
}

/// Parse one frame (without its delimiter) into an envelope.
///
/// Rejects non-object payloads and unknown codes before attempting a full
/// decode, so each fault is reported distinctly.
pub fn parse_frame(frame: &[u8]) -> Result<Envelope, ProtocolError> {
    let value: Value = serde_json::from_slice(frame)?;
    let Some(object) = value.as_object() else {
        return Err(ProtocolError::Malformed("payload is not a JSON object".into()));
    };
    let code = object
        .get("code")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing code".into()))?;
    code.parse::<MessageCode>()
        .map_err(|e| ProtocolError::UnknownCode(e.0))?;
    Ok(serde_json::from_value(value)?)
}

/// Receive buffer that accumulates stream bytes and yields complete frames.
///
/// Each received byte is searched for the delimiter once, so a large frame
/// arriving in many reads costs time linear in its size.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    /// `buf[..scanned]` holds no delimiter.
    scanned: usize,
    /// Start of the bytes after the last delimiter seen.
    tail_start: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let start = self.buf.len();
        self.buf.extend_from_slice(bytes);
        if let Some(last) = bytes.iter().rposition(|b| *b == FRAME_DELIMITER) {
            self.tail_start = start + last + 1;
        }
        let pending = self.buf.len() - self.tail_start;
        if pending > MAX_MESSAGE_SIZE {
            self.buf.clear();
            self.scanned = 0;
            self.tail_start = 0;
            return Err(ProtocolError::MessageTooLarge {
                size: pending,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(())
    }

    /// Take the next complete frame, skipping empty ones.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == FRAME_DELIMITER) else {
                self.scanned = self.buf.len();
                return None;
            };
            let pos = self.scanned + offset;
            let frame: Vec<u8> = self.buf.drain(..=pos).take(pos).collect();
            self.scanned = 0;
            self.tail_start = self.tail_start.saturating_sub(pos + 1);
            if !frame.iter().all(u8::is_ascii_whitespace) {
                return Some(frame);
            }
        }
    }

    /// Bytes received but not yet terminated.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.tail_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_types::NodeId;
    use serde_json::json;

    fn envelope(text: &str) -> Envelope {
        Envelope::new(MessageCode::Text, NodeId::from("a"), json!({ "text": text }))
    }

    #[test]
    fn frame_ends_with_delimiter() {
        let frame = encode_frame(&envelope("hi")).unwrap();
        assert_eq!(*frame.last().unwrap(), FRAME_DELIMITER);
        assert_eq!(frame.iter().filter(|b| **b == FRAME_DELIMITER).count(), 1);
    }

    #[test]
    fn hash_inside_strings_is_escaped() {
        let env = envelope("vote #1 ## now");
        let frame = encode_frame(&env).unwrap();
        assert_eq!(frame.iter().filter(|b| **b == FRAME_DELIMITER).count(), 1);
        let parsed = parse_frame(&frame[..frame.len() - 1]).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn buffer_splits_concatenated_and_partial_frames() {
        let a = encode_frame(&envelope("one")).unwrap();
        let b = encode_frame(&envelope("two")).unwrap();
        let mut stream = a.clone();
        stream.extend_from_slice(&b);

        let mut buf = FrameBuffer::new();
        let split = a.len() + 5;
        buf.extend(&stream[..split]).unwrap();
        let first = buf.next_frame().unwrap();
        assert_eq!(parse_frame(&first).unwrap().data["text"], json!("one"));
        assert!(buf.next_frame().is_none());
        assert_eq!(buf.pending(), 5);

        buf.extend(&stream[split..]).unwrap();
        let second = buf.next_frame().unwrap();
        assert_eq!(parse_frame(&second).unwrap().data["text"], json!("two"));
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn large_frame_arrives_in_many_reads() {
        let big = "x".repeat(200_000);
        let frame = encode_frame(&envelope(&big)).unwrap();
        let mut buf = FrameBuffer::new();
        let mut frames = Vec::new();
        for chunk in frame.chunks(8 * 1024) {
            buf.extend(chunk).unwrap();
            while let Some(f) = buf.next_frame() {
                frames.push(f);
            }
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(parse_frame(&frames[0]).unwrap().data["text"], json!(big));
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn unread_frames_do_not_count_as_pending() {
        let a = encode_frame(&envelope("one")).unwrap();
        let b = encode_frame(&envelope("two")).unwrap();
        let mut stream = a.clone();
        stream.extend_from_slice(&b);
        stream.extend_from_slice(b"{\"partial");

        let mut buf = FrameBuffer::new();
        buf.extend(&stream).unwrap();
        assert_eq!(buf.pending(), 9);
        assert!(buf.next_frame().is_some());
        assert!(buf.next_frame().is_some());
        assert!(buf.next_frame().is_none());
        assert_eq!(buf.pending(), 9);
    }

    #[test]
    fn empty_frames_are_skipped() {
        let mut buf = FrameBuffer::new();
        buf.extend(b"##\n#").unwrap();
        assert!(buf.next_frame().is_none());
    }

    #[test]
    fn non_object_is_malformed() {
        assert!(matches!(parse_frame(b"[1,2]"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(parse_frame(b"not json"), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn unknown_code_is_reported() {
        let mut value = serde_json::to_value(envelope("x")).unwrap();
        value["code"] = json!("SELF_DESTRUCT");
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            parse_frame(&bytes),
            Err(ProtocolError::UnknownCode(code)) if code == "SELF_DESTRUCT"
        ));
    }

    #[test]
    fn oversized_pending_data_is_rejected() {
        let mut buf = FrameBuffer::new();
        let chunk = vec![b'a'; MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            buf.extend(&chunk),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
        assert_eq!(buf.pending(), 0);
    }
}
