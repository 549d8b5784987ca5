//! Relay session and lifecycle management for the SQL tools host.
//!
//! This is the coordination layer: it owns one endpoint per side of the
//! relay (the editor upstream, the worker subprocess downstream), pumps
//! framed messages between them, and intercepts the reserved lifecycle
//! methods to run registered initialize/shutdown callbacks.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod launcher;
pub mod lifecycle;
pub mod registry;
pub mod relay;

pub use config::LaunchConfig;
pub use endpoint::{Endpoint, Role};
pub use error::{HostError, Result};
pub use launcher::{spawn_worker, ExitObserver, SpawnedWorker};
pub use lifecycle::{
    Directive, HostState, LifecycleCoordinator, ShutdownTrigger, SHUTDOWN_CALLBACK_TIMEOUT,
};
pub use registry::{CallbackError, CallbackRegistry, InitializeCallback, ShutdownCallback};
pub use relay::RelaySession;
