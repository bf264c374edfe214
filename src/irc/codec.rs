/// IRC line codec - frames a TCP byte stream into IRC messages.
///
/// Splits on `\r\n`, parses each line into a [`Message`], and serializes
/// outgoing lines with `\r\n` termination.
///
/// A frame split across two reads stays buffered until its terminator
/// arrives. Lines that fail to parse and oversized lines (> 8191 bytes) are
/// skipped instead of killing the connection; only I/O errors surface.
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use super::message::{Message, ParseError};

/// Maximum line length (including `\r\n`).
/// RFC 2812 says 512 bytes. IRCv3 `message-tags` can push this to 8191.
const MAX_LINE_LENGTH: usize = 8191;

/// Codec error: an outbound line that would break framing, or an I/O error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("outbound line contains an embedded CR or LF")]
    EmbeddedNewline,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A tokio codec that frames IRC messages on `\r\n` boundaries.
#[derive(Debug, Default)]
pub struct IrcCodec {
    /// True when we're discarding an oversized line and waiting for `\r\n`.
    skipping: bool,
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.skipping {
                match src.windows(2).position(|w| w == b"\r\n") {
                    Some(pos) => {
                        warn!(bytes = pos + 2, "codec: finished skipping oversized line tail");
                        src.advance(pos + 2);
                        self.skipping = false;
                    }
                    None => {
                        src.clear();
                        return Ok(None);
                    }
                }
            }

            let Some(pos) = src.windows(2).position(|w| w == b"\r\n") else {
                // No complete line yet.
                if src.len() > MAX_LINE_LENGTH {
                    warn!(
                        bytes = src.len(),
                        "codec: discarding oversized partial line, waiting for terminator"
                    );
                    src.clear();
                    self.skipping = true;
                }
                return Ok(None);
            };

            let line_bytes = src.split_to(pos);
            src.advance(2); // skip \r\n

            if pos > MAX_LINE_LENGTH {
                warn!(bytes = pos, "codec: skipped oversized IRC line");
                continue;
            }

            let line = String::from_utf8_lossy(&line_bytes);
            match Message::parse(&line) {
                Ok(msg) => return Ok(Some(msg)),
                Err(ParseError::Empty) => continue,
                Err(e) => {
                    debug!(line = %line, "codec: skipping unparseable line: {e}");
                    continue;
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(msg) = self.decode(src)? {
            return Ok(Some(msg));
        }
        if !src.is_empty() {
            debug!(bytes = src.len(), "codec: dropping unterminated line at EOF");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<String> for IrcCodec {
    type Error = CodecError;

    /// Encode one raw line. A single caller-supplied `\r\n` is stripped
    /// before the terminator is appended, so it is never doubled.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.strip_suffix("\r\n").unwrap_or(&item);
        if line.contains(['\r', '\n']) {
            return Err(CodecError::EmbeddedNewline);
        }
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
