use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Header field carrying the payload size in bytes.
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Terminates the header block.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Maximum accepted header block size: 4 KiB.
pub const MAX_HEADER_SIZE: usize = 4 * 1024;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Encode one framed message into the wire format.
///
/// Wire format:
/// ```text
/// Content-Length: <n>\r\n
/// \r\n
/// <n bytes of payload>
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", payload.len());
    dst.reserve(header.len() + payload.len());
    dst.put_slice(header.as_bytes());
    dst.put_slice(payload);
}

/// Decode one framed payload from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message
/// yet. On success, consumes the frame bytes from the buffer. Unknown
/// header fields (e.g. `Content-Type`) are ignored.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    let Some(header_end) = find_terminator(src) else {
        if src.len() > MAX_HEADER_SIZE {
            return Err(FrameError::InvalidHeader(format!(
                "no header terminator within {MAX_HEADER_SIZE} bytes"
            )));
        }
        return Ok(None); // Need more data
    };

    let header = std::str::from_utf8(&src[..header_end])
        .map_err(|_| FrameError::InvalidHeader("header block is not valid UTF-8".to_string()))?;

    let mut content_length: Option<usize> = None;
    for line in header.split("\r\n").filter(|line| !line.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            return Err(FrameError::InvalidHeader(format!(
                "malformed header line {line:?}"
            )));
        };
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let parsed = value.trim().parse::<usize>().map_err(|_| {
                FrameError::InvalidHeader(format!(
                    "unparseable {CONTENT_LENGTH} value {:?}",
                    value.trim()
                ))
            })?;
            content_length = Some(parsed);
        }
    }

    let Some(payload_len) = content_length else {
        return Err(FrameError::InvalidHeader(format!(
            "missing {CONTENT_LENGTH} header"
        )));
    };

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = header_end + HEADER_TERMINATOR.len() + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(header_end + HEADER_TERMINATOR.len());
    Ok(Some(src.split_to(payload_len).freeze()))
}

fn find_terminator(src: &[u8]) -> Option<usize> {
    if src.len() < HEADER_TERMINATOR.len() {
        return None;
    }
    src.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
