use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread;

use sqlrelay_frame::{FrameError, MessageReader, MessageWriter, RpcMessage};
use tracing::debug;

use crate::error::{HostError, Result};

/// Which side of the relay an endpoint represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The interactive caller connected over this process's own stdio.
    UpstreamClient,
    /// The spawned subprocess doing the actual work.
    DownstreamWorker,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::UpstreamClient => "upstream-client",
            Role::DownstreamWorker => "downstream-worker",
        }
    }

    /// The side messages from this endpoint are forwarded to.
    pub fn opposite(self) -> Role {
        match self {
            Role::UpstreamClient => Role::DownstreamWorker,
            Role::DownstreamWorker => Role::UpstreamClient,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Event {
    Message(RpcMessage),
    Closed(Option<FrameError>),
}

/// One side of the relay: a framed channel plus role and liveness.
///
/// A dedicated reader thread decodes incoming frames into an internal
/// queue, so a `receive()` pending on one thread can be unblocked by a
/// `close()` from another. Concurrent `send()`s are serialized; each
/// writes one complete frame.
pub struct Endpoint {
    role: Role,
    writer: Mutex<Option<MessageWriter<Box<dyn Write + Send>>>>,
    events: Mutex<Receiver<Event>>,
    wake_tx: Sender<Event>,
    alive: AtomicBool,
}

impl Endpoint {
    /// Build an endpoint over a raw stream pair and start its reader
    /// thread.
    pub fn from_stream<R, W>(reader: R, writer: W, role: Role) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (tx, rx) = channel();

        let reader_tx = tx.clone();
        let mut framed = MessageReader::new(reader);
        thread::spawn(move || loop {
            match framed.read_message() {
                Ok(message) => {
                    if reader_tx.send(Event::Message(message)).is_err() {
                        break; // endpoint dropped
                    }
                }
                Err(FrameError::ConnectionClosed) => {
                    let _ = reader_tx.send(Event::Closed(None));
                    break;
                }
                Err(err) => {
                    let _ = reader_tx.send(Event::Closed(Some(err)));
                    break;
                }
            }
        });

        Self {
            role,
            writer: Mutex::new(Some(MessageWriter::new(Box::new(writer)))),
            events: Mutex::new(rx),
            wake_tx: tx,
            alive: AtomicBool::new(true),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Receive the next message, blocking until one arrives or the
    /// channel closes. A close from another thread unblocks the call.
    pub fn receive(&self) -> Result<RpcMessage> {
        if !self.is_alive() {
            return Err(HostError::ChannelClosed { role: self.role });
        }

        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        match events.recv() {
            Ok(Event::Message(message)) => Ok(message),
            Ok(Event::Closed(None)) | Err(_) => {
                drop(events);
                self.close();
                Err(HostError::ChannelClosed { role: self.role })
            }
            Ok(Event::Closed(Some(err))) => {
                drop(events);
                self.close();
                Err(HostError::Framing {
                    role: self.role,
                    source: err,
                })
            }
        }
    }

    /// Send one message as a complete frame. Concurrent senders are
    /// serialized; a failed send marks the channel dead.
    pub fn send(&self, message: &RpcMessage) -> Result<()> {
        let mut slot = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(writer) = slot.as_mut() else {
            return Err(HostError::ChannelClosed { role: self.role });
        };

        if let Err(err) = writer.write_message(message) {
            self.alive.store(false, Ordering::SeqCst);
            *slot = None;
            drop(slot);
            let _ = self.wake_tx.send(Event::Closed(None));
            return Err(HostError::ChannelWrite {
                role: self.role,
                source: err,
            });
        }

        Ok(())
    }

    /// Close the channel. Idempotent and safe to call from any thread;
    /// a pending `receive()` unblocks with a closure error. Dropping the
    /// write half signals EOF to a worker's stdin.
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            debug!(role = %self.role, "closing endpoint");
            let mut slot = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = None;
            drop(slot);
            let _ = self.wake_tx.send(Event::Closed(None));
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;
    use std::time::Duration;

    use sqlrelay_frame::MessageReader;

    use super::*;

    fn request(payload: &[u8]) -> RpcMessage {
        RpcMessage::from_slice(payload).unwrap()
    }

    /// Endpoint on one end of a socket pair, raw framed reader/writer on
    /// the other.
    fn endpoint_with_peer(role: Role) -> (Endpoint, MessageReader<UnixStream>, MessageWriter<UnixStream>) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let read_half = ours.try_clone().unwrap();
        let endpoint = Endpoint::from_stream(read_half, ours, role);
        let peer_reader = MessageReader::new(theirs.try_clone().unwrap());
        let peer_writer = MessageWriter::new(theirs);
        (endpoint, peer_reader, peer_writer)
    }

    #[test]
    fn send_and_receive_roundtrip() {
        let (endpoint, mut peer_reader, mut peer_writer) =
            endpoint_with_peer(Role::UpstreamClient);

        peer_writer
            .write_message(&request(br#"{"id":1,"method":"ping"}"#))
            .unwrap();
        let received = endpoint.receive().unwrap();
        assert_eq!(received.method(), Some("ping"));

        endpoint
            .send(&request(br#"{"id":1,"method":"pong"}"#))
            .unwrap();
        let echoed = peer_reader.read_message().unwrap();
        assert_eq!(echoed.method(), Some("pong"));
    }

    #[test]
    fn payload_passes_through_byte_for_byte() {
        let (endpoint, _peer_reader, mut peer_writer) =
            endpoint_with_peer(Role::DownstreamWorker);

        let raw = br#"{"id": 42,  "result": {"rows": [1,2,3],  "spacing":"kept"}}"#;
        peer_writer.send(raw).unwrap();

        let received = endpoint.receive().unwrap();
        assert_eq!(received.payload().as_ref(), raw);
    }

    #[test]
    fn receive_reports_closure_on_peer_eof() {
        let (endpoint, peer_reader, peer_writer) = endpoint_with_peer(Role::DownstreamWorker);
        drop(peer_reader);
        drop(peer_writer);

        let err = endpoint.receive().unwrap_err();
        assert!(matches!(
            err,
            HostError::ChannelClosed {
                role: Role::DownstreamWorker
            }
        ));
        assert!(!endpoint.is_alive());
    }

    #[test]
    fn receive_reports_framing_error_on_garbage() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let read_half = ours.try_clone().unwrap();
        let endpoint = Endpoint::from_stream(read_half, ours, Role::UpstreamClient);

        use std::io::Write as _;
        theirs.write_all(b"this is not a frame\r\n\r\n").unwrap();
        theirs.flush().unwrap();

        let err = endpoint.receive().unwrap_err();
        assert!(matches!(err, HostError::Framing { .. }));
        assert!(!endpoint.is_alive());
    }

    #[test]
    fn close_unblocks_pending_receive() {
        let (endpoint, _peer_reader, _peer_writer) = endpoint_with_peer(Role::UpstreamClient);
        let endpoint = Arc::new(endpoint);

        let pending = {
            let endpoint = Arc::clone(&endpoint);
            thread::spawn(move || endpoint.receive())
        };

        // Give the receiver time to block.
        thread::sleep(Duration::from_millis(50));
        endpoint.close();

        let result = pending.join().unwrap();
        assert!(matches!(result, Err(HostError::ChannelClosed { .. })));
    }

    #[test]
    fn close_is_idempotent() {
        let (endpoint, _peer_reader, _peer_writer) = endpoint_with_peer(Role::DownstreamWorker);

        endpoint.close();
        endpoint.close();
        assert!(!endpoint.is_alive());
    }

    #[test]
    fn send_after_close_fails() {
        let (endpoint, _peer_reader, _peer_writer) = endpoint_with_peer(Role::DownstreamWorker);

        endpoint.close();
        let err = endpoint
            .send(&request(br#"{"id":1,"method":"late"}"#))
            .unwrap_err();
        assert!(matches!(err, HostError::ChannelClosed { .. }));
    }

    #[test]
    fn send_failure_marks_channel_dead() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let read_half = ours.try_clone().unwrap();
        let endpoint = Endpoint::from_stream(read_half, ours, Role::DownstreamWorker);
        drop(theirs);

        // Writing into a closed socket fails after the peer is gone;
        // the first send may still land in the OS buffer.
        let message = request(br#"{"id":1,"method":"m"}"#);
        let mut failed = false;
        for _ in 0..16 {
            if endpoint.send(&message).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
        assert!(!endpoint.is_alive());
    }

    #[test]
    fn roles_are_labelled_for_diagnostics() {
        assert_eq!(Role::UpstreamClient.to_string(), "upstream-client");
        assert_eq!(Role::DownstreamWorker.to_string(), "downstream-worker");
        assert_eq!(Role::UpstreamClient.opposite(), Role::DownstreamWorker);
        assert_eq!(Role::DownstreamWorker.opposite(), Role::UpstreamClient);
    }

    #[test]
    fn per_direction_order_is_preserved() {
        let (endpoint, _peer_reader, mut peer_writer) =
            endpoint_with_peer(Role::UpstreamClient);

        for index in 0..32 {
            let payload = format!(r#"{{"id":{index},"method":"seq"}}"#);
            peer_writer.send(payload.as_bytes()).unwrap();
        }

        for index in 0..32 {
            let received = endpoint.receive().unwrap();
            let expected = format!(r#"{{"id":{index},"method":"seq"}}"#);
            assert_eq!(received.payload().as_ref(), expected.as_bytes());
        }
    }
}
