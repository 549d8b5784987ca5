use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use sqlrelay_frame::RpcMessage;
use tracing::{debug, info, warn};

use crate::endpoint::Role;
use crate::registry::CallbackRegistry;

/// Upper bound on each shutdown callback, after which it is abandoned.
pub const SHUTDOWN_CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Host lifecycle states, strictly forward-moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum HostState {
    Uninitialized = 0,
    Initializing = 1,
    Running = 2,
    ShuttingDown = 3,
    Terminated = 4,
}

impl HostState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => HostState::Uninitialized,
            1 => HostState::Initializing,
            2 => HostState::Running,
            3 => HostState::ShuttingDown,
            _ => HostState::Terminated,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostState::Uninitialized => "uninitialized",
            HostState::Initializing => "initializing",
            HostState::Running => "running",
            HostState::ShuttingDown => "shutting-down",
            HostState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused the shutdown path to start. First trigger wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// A `shutdown` request or `exit` notification from upstream.
    LifecycleMessage,
    /// One of the framed channels closed or failed.
    ChannelClosed(Role),
    /// The worker process terminated.
    WorkerExit(Option<i32>),
    /// A termination signal was delivered to this process.
    Signal,
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::LifecycleMessage => f.write_str("lifecycle message"),
            ShutdownTrigger::ChannelClosed(role) => write!(f, "{role} channel closed"),
            ShutdownTrigger::WorkerExit(code) => write!(f, "worker exit (code {code:?})"),
            ShutdownTrigger::Signal => f.write_str("termination signal"),
        }
    }
}

/// What the relay pump should do with an upstream message.
#[derive(Debug, PartialEq)]
pub enum Directive {
    /// Forward these messages downstream, in order.
    Forward(Vec<RpcMessage>),
    /// Held back until initialization completes.
    Buffer,
    /// Discard the message.
    Drop,
    /// Forward the trigger best-effort, then run the shutdown sequence.
    Shutdown(Option<RpcMessage>),
}

/// Drives the host state machine and runs lifecycle callbacks.
///
/// Consulted by the upstream pump for every message; upstream traffic
/// observed before `initialize` is buffered here so the worker never
/// sees a request ahead of the handshake.
pub struct LifecycleCoordinator {
    state: AtomicU8,
    registry: CallbackRegistry,
    pending: Mutex<Vec<RpcMessage>>,
    callback_timeout: Duration,
}

impl Default for LifecycleCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleCoordinator {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(HostState::Uninitialized as u8),
            registry: CallbackRegistry::new(),
            pending: Mutex::new(Vec::new()),
            callback_timeout: SHUTDOWN_CALLBACK_TIMEOUT,
        }
    }

    /// Override the per-callback shutdown timeout.
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub fn state(&self) -> HostState {
        HostState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Mark the session as started and awaiting the handshake.
    pub fn start(&self) {
        if self.advance(HostState::Uninitialized, HostState::Initializing) {
            debug!("session started, awaiting initialize");
        }
    }

    /// Classify one upstream message and decide how the pump handles it.
    pub fn on_upstream_message(&self, message: RpcMessage) -> Directive {
        let state = self.state();
        if state >= HostState::ShuttingDown {
            debug!(method = ?message.method(), "dropping message during shutdown");
            return Directive::Drop;
        }

        if message.is_shutdown_message() {
            return Directive::Shutdown(Some(message));
        }

        if message.is_initialize_request() {
            if state >= HostState::Running {
                warn!("duplicate initialize request dropped");
                return Directive::Drop;
            }
            return Directive::Forward(self.run_initialize(message));
        }

        match state {
            HostState::Running => Directive::Forward(vec![message]),
            _ => {
                self.pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(message);
                Directive::Buffer
            }
        }
    }

    /// Run the initialize callbacks, then release the handshake followed
    /// by every buffered message in arrival order.
    fn run_initialize(&self, handshake: RpcMessage) -> Vec<RpcMessage> {
        let callbacks = self.registry.seal_initialize();
        info!(callbacks = callbacks.len(), "initialize received, running callbacks");

        for (index, callback) in callbacks.iter().enumerate() {
            if let Err(err) = callback(&handshake) {
                warn!(index, error = %err, "initialize callback failed");
            }
        }

        let buffered = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if !buffered.is_empty() {
            debug!(count = buffered.len(), "releasing buffered pre-initialize messages");
        }

        let mut release = Vec::with_capacity(1 + buffered.len());
        release.push(handshake);
        release.extend(buffered);

        self.state
            .store(HostState::Running as u8, Ordering::SeqCst);
        release
    }

    /// Run the shutdown sequence once. Returns false when another
    /// trigger already claimed it.
    pub fn execute_shutdown(&self, trigger: ShutdownTrigger, message: Option<&RpcMessage>) -> bool {
        if !self.claim_shutdown() {
            debug!(%trigger, "shutdown already in progress, trigger ignored");
            return false;
        }
        info!(%trigger, "shutting down");

        let callbacks = self.registry.seal_shutdown();
        for (index, callback) in callbacks.into_iter().enumerate() {
            self.run_shutdown_callback(index, callback, message.cloned());
        }

        self.state
            .store(HostState::Terminated as u8, Ordering::SeqCst);
        info!("session terminated");
        true
    }

    /// Run one shutdown callback on its own thread, bounded by the
    /// configured timeout. A timed-out callback is abandoned; its thread
    /// is left to finish in the background.
    fn run_shutdown_callback(
        &self,
        index: usize,
        callback: crate::registry::ShutdownCallback,
        trigger: Option<RpcMessage>,
    ) {
        let (done_tx, done_rx) = channel();
        thread::spawn(move || {
            let result = callback(trigger.as_ref());
            let _ = done_tx.send(result);
        });

        match done_rx.recv_timeout(self.callback_timeout) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(index, error = %err, "shutdown callback failed"),
            Err(RecvTimeoutError::Timeout) => {
                warn!(index, timeout = ?self.callback_timeout, "shutdown callback timed out, abandoned");
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!(index, "shutdown callback panicked");
            }
        }
    }

    fn claim_shutdown(&self) -> bool {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if HostState::from_u8(current) >= HostState::ShuttingDown {
                return false;
            }
            match self.state.compare_exchange(
                current,
                HostState::ShuttingDown as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    fn advance(&self, from: HostState, to: HostState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
