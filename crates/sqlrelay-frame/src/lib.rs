//! Header-delimited JSON-RPC message framing for byte-stream channels.
//!
//! Every message on the wire is a header block followed by a JSON payload:
//! - A `Content-Length` header carrying the payload size in bytes
//! - A blank line (`\r\n\r\n`) terminating the header block
//! - Exactly that many bytes of payload
//!
//! Payload semantics stay opaque at this layer: only enough of the JSON
//! envelope is read to classify a message as request, response, or
//! notification. No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, MAX_HEADER_SIZE};
pub use error::{FrameError, Result};
pub use message::{RpcMessage, Shape, METHOD_EXIT, METHOD_INITIALIZE, METHOD_SHUTDOWN};
pub use reader::MessageReader;
pub use writer::MessageWriter;
