use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use sqlrelay_frame::RpcMessage;
use tracing::warn;

/// Error type returned by lifecycle callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Runs when the `initialize` request arrives, before it is forwarded.
pub type InitializeCallback =
    Arc<dyn Fn(&RpcMessage) -> Result<(), CallbackError> + Send + Sync>;

/// Runs during shutdown. The trigger message is `None` when shutdown
/// was caused by channel closure or a signal rather than a lifecycle
/// message.
pub type ShutdownCallback =
    Arc<dyn Fn(Option<&RpcMessage>) -> Result<(), CallbackError> + Send + Sync>;

/// Ordered, append-only lists of lifecycle callbacks.
///
/// Each list is sealed when its phase begins; the coordinator then
/// iterates an immutable snapshot, so callbacks run without holding any
/// registry lock. Registration after sealing is a warn-logged no-op.
#[derive(Default)]
pub struct CallbackRegistry {
    initialize: Mutex<Vec<InitializeCallback>>,
    shutdown: Mutex<Vec<ShutdownCallback>>,
    initialize_sealed: AtomicBool,
    shutdown_sealed: AtomicBool,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_initialize(&self, callback: InitializeCallback) {
        if self.initialize_sealed.load(Ordering::SeqCst) {
            warn!("initialize callback registered after initialization began; ignored");
            return;
        }
        self.initialize
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    pub fn register_shutdown(&self, callback: ShutdownCallback) {
        if self.shutdown_sealed.load(Ordering::SeqCst) {
            warn!("shutdown callback registered after shutdown began; ignored");
            return;
        }
        self.shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    /// Seal the initialize list and return its snapshot in registration
    /// order.
    pub(crate) fn seal_initialize(&self) -> Vec<InitializeCallback> {
        self.initialize_sealed.store(true, Ordering::SeqCst);
        self.initialize
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Seal the shutdown list and return its snapshot in registration
    /// order.
    pub(crate) fn seal_shutdown(&self) -> Vec<ShutdownCallback> {
        self.shutdown_sealed.store(true, Ordering::SeqCst);
        self.shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
