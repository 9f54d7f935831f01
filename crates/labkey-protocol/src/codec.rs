//! Tokio codec for the reader's newline-delimited serial stream.
//!
//! [`ReaderLineCodec`] frames raw serial bytes into lines and encodes
//! [`DeviceCommand`]s in the configured [`Dialect`].
//!
//! ```text
//! serial bytes -> Decoder -> String (one line, no terminator)
//! DeviceCommand -> Encoder -> "<encoded>\n"
//! ```
//!
//! # Robustness
//!
//! Arduino boards print garbage while they reset, and some firmware writes
//! Latin-1 text. The decoder therefore:
//! - strips a trailing `\r`
//! - decodes lossily, never failing on invalid UTF-8
//! - skips blank lines
//! - discards a line longer than the maximum length up to its newline,
//!   instead of ending the stream with an error
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use tokio_util::codec::Decoder;
//! use labkey_protocol::ReaderLineCodec;
//!
//! let mut codec = ReaderLineCodec::new();
//! let mut buffer = BytesMut::from(&b"READER_READY\r\nCARD_REM"[..]);
//!
//! assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some("READER_READY"));
//! assert_eq!(codec.decode(&mut buffer).unwrap(), None);
//! ```

use bytes::{Buf, BytesMut};
use labkey_core::{Error, Result, constants::MAX_LINE_LENGTH};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::command::{DeviceCommand, Dialect};

/// Line codec for the reader serial link.
#[derive(Debug, Clone)]
pub struct ReaderLineCodec {
    dialect: Dialect,
    max_length: usize,
    /// Bytes already scanned for a newline.
    next_index: usize,
    /// Dropping the rest of an oversized line.
    discarding: bool,
}

impl ReaderLineCodec {
    /// Create a codec with the JSON dialect and the default maximum line
    /// length.
    pub fn new() -> Self {
        Self::with_dialect(Dialect::default())
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            max_length: MAX_LINE_LENGTH,
            next_index: 0,
            discarding: false,
        }
    }

    /// Override the maximum line length.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn max_line_length(&self) -> usize {
        self.max_length
    }

    fn finish_line(&self, raw: &[u8]) -> Option<String> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.len() > self.max_length {
            warn!(
                length = raw.len(),
                max_length = self.max_length,
                "Discarding oversized reader line"
            );
            return None;
        }

        let line = String::from_utf8_lossy(raw);
        if line.trim().is_empty() {
            None
        } else {
            Some(line.into_owned())
        }
    }
}

impl Default for ReaderLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ReaderLineCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            let read_to = src.len();
            // A trailing `\r` may still be followed by its `\n`.
            let pending = read_to - usize::from(src.last() == Some(&b'\r'));
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    src.advance(self.next_index + offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    return Ok(None);
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let raw = src.split_to(end + 1);
                    if let Some(line) = self.finish_line(&raw[..end]) {
                        return Ok(Some(line));
                    }
                }
                (false, None) if pending > self.max_length => {
                    warn!(
                        buffered = read_to,
                        max_length = self.max_length,
                        "Reader line exceeds maximum length, discarding until newline"
                    );
                    self.discarding = true;
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        self.next_index = 0;
        if self.discarding || src.is_empty() {
            self.discarding = false;
            src.clear();
            return Ok(None);
        }

        let raw = src.split_to(src.len());
        Ok(self.finish_line(&raw))
    }
}

impl Encoder<DeviceCommand> for ReaderLineCodec {
    type Error = Error;

    fn encode(&mut self, item: DeviceCommand, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(item.encode_line(self.dialect).as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut ReaderLineCodec, buffer: &mut BytesMut) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = codec.decode(buffer).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_codec_defaults() {
        let codec = ReaderLineCodec::default();
        assert_eq!(codec.dialect(), Dialect::Json);
        assert_eq!(codec.max_line_length(), MAX_LINE_LENGTH);
    }

    #[test]
    fn test_decode_multiple_lines() {
        let mut codec = ReaderLineCodec::new();
        let mut buffer = BytesMut::from(&b"READER_READY\r\nCARD_DETECTED:A6860588\nCARD_REMOVED\n"[..]);

        assert_eq!(
            decode_all(&mut codec, &mut buffer),
            vec!["READER_READY", "CARD_DETECTED:A6860588", "CARD_REMOVED"]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_partial_line() {
        let mut codec = ReaderLineCodec::new();
        let mut buffer = BytesMut::from(&b"CARD_"[..]);
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice(b"REMOVED\n");
        assert_eq!(
            codec.decode(&mut buffer).unwrap().as_deref(),
            Some("CARD_REMOVED")
        );
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        let mut codec = ReaderLineCodec::new();
        let mut buffer = BytesMut::from(&b"\r\n\n  \nREADER_READY\n"[..]);
        assert_eq!(decode_all(&mut codec, &mut buffer), vec!["READER_READY"]);
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        let mut codec = ReaderLineCodec::new();
        let mut buffer = BytesMut::from(&b"Card Type: MIFARE \xff1KB\n"[..]);
        let line = codec.decode(&mut buffer).unwrap().unwrap();
        assert!(line.starts_with("Card Type: MIFARE"));
        assert!(line.contains('\u{FFFD}'));
    }

    #[test]
    fn test_decode_discards_oversized_line() {
        let mut codec = ReaderLineCodec::new().max_length(8);
        let mut buffer = BytesMut::from(&b"0123456789ABCDEF"[..]);
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice(b"more garbage\nACK\n");
        assert_eq!(decode_all(&mut codec, &mut buffer), vec!["ACK"]);
    }

    #[test]
    fn test_decode_keeps_full_length_line_split_before_newline() {
        let mut codec = ReaderLineCodec::new().max_length(8);
        let mut buffer = BytesMut::from("A6860588\r");
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buffer).unwrap(), Some("A6860588".to_string()));
    }

    #[test]
    fn test_decode_eof_flushes_trailing_line() {
        let mut codec = ReaderLineCodec::new();
        let mut buffer = BytesMut::from(&b"READER_READY\nCARD_REMOVED"[..]);
        assert_eq!(
            codec.decode_eof(&mut buffer).unwrap().as_deref(),
            Some("READER_READY")
        );
        assert_eq!(
            codec.decode_eof(&mut buffer).unwrap().as_deref(),
            Some("CARD_REMOVED")
        );
        assert_eq!(codec.decode_eof(&mut buffer).unwrap(), None);
    }

    #[test]
    fn test_encode_uses_dialect() {
        let mut buffer = BytesMut::new();
        ReaderLineCodec::with_dialect(Dialect::Text)
            .encode(DeviceCommand::Scan, &mut buffer)
            .unwrap();
        ReaderLineCodec::new()
            .encode(DeviceCommand::Scan, &mut buffer)
            .unwrap();
        assert_eq!(&buffer[..], b"SCAN\n{\"cmd\":\"scan\"}\n");
    }
}
