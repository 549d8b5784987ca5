use bytes::Bytes;
use serde_json::Value;

use crate::error::{FrameError, Result};

/// Reserved method: client startup handshake.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Reserved method: graceful shutdown request.
pub const METHOD_SHUTDOWN: &str = "shutdown";
/// Reserved method: immediate exit notification.
pub const METHOD_EXIT: &str = "exit";

/// Envelope classification of one framed message.
///
/// The relay recognizes only enough of the envelope to route a message;
/// everything else in the payload stays opaque.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Carries a correlation id and expects a reply.
    Request { id: Value, method: String },
    /// Carries the correlation id of a prior request.
    Response { id: Value },
    /// Fire-and-forget, no correlation id.
    Notification { method: String },
}

/// One framed JSON-RPC message: the raw payload plus its envelope shape.
///
/// The payload is never rewritten; forwarding a message reproduces the
/// received bytes exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcMessage {
    payload: Bytes,
    shape: Shape,
}

impl RpcMessage {
    /// Classify a raw payload into a message.
    ///
    /// A payload that is not a JSON object, or that carries neither an
    /// `id` nor a `method` field, is not a routable envelope and fails
    /// with [`FrameError::InvalidEnvelope`].
    pub fn from_payload(payload: Bytes) -> Result<Self> {
        let value: Value = serde_json::from_slice(&payload)
            .map_err(|err| FrameError::InvalidEnvelope(err.to_string()))?;
        let Some(object) = value.as_object() else {
            return Err(FrameError::InvalidEnvelope(
                "payload is not a JSON object".to_string(),
            ));
        };

        // `id: null` is a valid correlation id (error responses use it),
        // so presence of the key decides, not the value.
        let id = object.get("id").cloned();
        let method = match object.get("method") {
            None => None,
            Some(Value::String(method)) => Some(method.clone()),
            Some(other) => {
                return Err(FrameError::InvalidEnvelope(format!(
                    "method field is not a string: {other}"
                )));
            }
        };

        let shape = match (id, method) {
            (Some(id), Some(method)) => Shape::Request { id, method },
            (Some(id), None) => Shape::Response { id },
            (None, Some(method)) => Shape::Notification { method },
            (None, None) => {
                return Err(FrameError::InvalidEnvelope(
                    "neither id nor method present".to_string(),
                ));
            }
        };

        Ok(Self { payload, shape })
    }

    /// Classify a borrowed payload, copying it into the message.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        Self::from_payload(Bytes::copy_from_slice(payload))
    }

    /// The raw payload bytes, exactly as received.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The envelope classification.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match &self.shape {
            Shape::Request { method, .. } | Shape::Notification { method } => Some(method),
            Shape::Response { .. } => None,
        }
    }

    /// True for the reserved `initialize` request.
    pub fn is_initialize_request(&self) -> bool {
        matches!(&self.shape, Shape::Request { method, .. } if method == METHOD_INITIALIZE)
    }

    /// True for `shutdown` requests and `exit` notifications.
    pub fn is_shutdown_message(&self) -> bool {
        matches!(self.method(), Some(METHOD_SHUTDOWN | METHOD_EXIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_request() {
        let message =
            RpcMessage::from_slice(br#"{"jsonrpc":"2.0","id":3,"method":"query/execute"}"#)
                .unwrap();
        assert!(matches!(
            message.shape(),
            Shape::Request { method, .. } if method == "query/execute"
        ));
        assert_eq!(message.method(), Some("query/execute"));
    }

    #[test]
    fn classifies_response() {
        let message = RpcMessage::from_slice(br#"{"jsonrpc":"2.0","id":3,"result":{}}"#).unwrap();
        assert!(matches!(message.shape(), Shape::Response { .. }));
        assert_eq!(message.method(), None);
    }

    #[test]
    fn classifies_null_id_as_response() {
        let message =
            RpcMessage::from_slice(br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700}}"#)
                .unwrap();
        assert!(matches!(
            message.shape(),
            Shape::Response { id } if id.is_null()
        ));
    }

    #[test]
    fn classifies_notification() {
        let message =
            RpcMessage::from_slice(br#"{"jsonrpc":"2.0","method":"telemetry/event"}"#).unwrap();
        assert!(matches!(
            message.shape(),
            Shape::Notification { method } if method == "telemetry/event"
        ));
    }

    #[test]
    fn string_ids_are_preserved() {
        let message =
            RpcMessage::from_slice(br#"{"id":"req-7","method":"connection/connect"}"#).unwrap();
        assert!(matches!(
            message.shape(),
            Shape::Request { id, .. } if id == &Value::from("req-7")
        ));
    }

    #[test]
    fn rejects_non_object_payload() {
        let err = RpcMessage::from_slice(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, FrameError::InvalidEnvelope(_)));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = RpcMessage::from_slice(b"{not json").unwrap_err();
        assert!(matches!(err, FrameError::InvalidEnvelope(_)));
    }

    #[test]
    fn rejects_envelope_without_id_or_method() {
        let err = RpcMessage::from_slice(br#"{"jsonrpc":"2.0","params":{}}"#).unwrap_err();
        assert!(matches!(err, FrameError::InvalidEnvelope(_)));
    }

    #[test]
    fn rejects_non_string_method() {
        let err = RpcMessage::from_slice(br#"{"id":1,"method":42}"#).unwrap_err();
        assert!(matches!(err, FrameError::InvalidEnvelope(_)));
    }

    #[test]
    fn recognizes_lifecycle_methods() {
        let initialize = RpcMessage::from_slice(br#"{"id":0,"method":"initialize"}"#).unwrap();
        assert!(initialize.is_initialize_request());
        assert!(!initialize.is_shutdown_message());

        let shutdown = RpcMessage::from_slice(br#"{"id":9,"method":"shutdown"}"#).unwrap();
        assert!(shutdown.is_shutdown_message());

        let exit = RpcMessage::from_slice(br#"{"method":"exit"}"#).unwrap();
        assert!(exit.is_shutdown_message());
        assert!(!exit.is_initialize_request());
    }

    #[test]
    fn initialize_notification_is_not_the_handshake() {
        // Only an initialize *request* starts the lifecycle.
        let message = RpcMessage::from_slice(br#"{"method":"initialize"}"#).unwrap();
        assert!(!message.is_initialize_request());
    }

    #[test]
    fn payload_is_untouched() {
        let raw = br#"{"id": 1, "method": "x",   "params": {"keep":"spacing"}}"#;
        let message = RpcMessage::from_slice(raw).unwrap();
        assert_eq!(message.payload().as_ref(), raw);
    }
}
