use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::endpoint::{Endpoint, Role};
use crate::error::{HostError, Result};
use crate::lifecycle::{Directive, LifecycleCoordinator, ShutdownTrigger};

struct Inner {
    upstream: Endpoint,
    downstream: Endpoint,
    coordinator: LifecycleCoordinator,
}

/// One relay session: an upstream endpoint, a downstream endpoint, and
/// the lifecycle coordinator between them. Cheap to clone; all clones
/// share the same session.
#[derive(Clone)]
pub struct RelaySession {
    inner: Arc<Inner>,
}

impl RelaySession {
    pub fn new(
        upstream: Endpoint,
        downstream: Endpoint,
        coordinator: LifecycleCoordinator,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                upstream,
                downstream,
                coordinator,
            }),
        }
    }

    pub fn coordinator(&self) -> &LifecycleCoordinator {
        &self.inner.coordinator
    }

    /// Start the shutdown path from outside the pumps (signal handler,
    /// worker exit observer). Later triggers are no-ops.
    pub fn initiate_shutdown(&self, trigger: ShutdownTrigger) {
        self.shutdown_with(trigger, None);
    }

    fn shutdown_with(&self, trigger: ShutdownTrigger, message: Option<&sqlrelay_frame::RpcMessage>) {
        if self.inner.coordinator.execute_shutdown(trigger, message) {
            self.inner.upstream.close();
            self.inner.downstream.close();
        }
    }

    /// Pump messages in both directions until the session terminates.
    ///
    /// Spawns one thread per direction and blocks until both finish.
    /// The upstream pump consults the coordinator per message; the
    /// downstream pump is a pass-through. Either pump ending starts the
    /// shutdown path for the whole session.
    pub fn run(&self) -> Result<()> {
        self.inner.coordinator.start();

        let upstream_pump = {
            let session = self.clone();
            thread::Builder::new()
                .name("pump-upstream".to_string())
                .spawn(move || session.pump_upstream())
                .map_err(|_| HostError::PumpFailed)?
        };
        let downstream_pump = {
            let session = self.clone();
            thread::Builder::new()
                .name("pump-downstream".to_string())
                .spawn(move || session.pump_downstream())
                .map_err(|_| HostError::PumpFailed)?
        };

        let mut failed = upstream_pump.join().is_err();
        failed |= downstream_pump.join().is_err();
        if failed {
            return Err(HostError::PumpFailed);
        }
        Ok(())
    }

    /// Upstream → downstream, with lifecycle interception.
    fn pump_upstream(&self) {
        loop {
            let message = match self.inner.upstream.receive() {
                Ok(message) => message,
                Err(err) => {
                    match err {
                        HostError::ChannelClosed { .. } => {
                            debug!("upstream channel closed")
                        }
                        _ => warn!(error = %err, "upstream channel failed"),
                    }
                    self.shutdown_with(ShutdownTrigger::ChannelClosed(Role::UpstreamClient), None);
                    return;
                }
            };

            match self.inner.coordinator.on_upstream_message(message) {
                Directive::Forward(batch) => {
                    for message in batch {
                        if let Err(err) = self.inner.downstream.send(&message) {
                            warn!(error = %err, "downstream send failed");
                            self.shutdown_with(
                                ShutdownTrigger::ChannelClosed(Role::DownstreamWorker),
                                None,
                            );
                            return;
                        }
                    }
                }
                Directive::Buffer | Directive::Drop => {}
                Directive::Shutdown(trigger) => {
                    // Best effort: let the worker see its own shutdown.
                    if let Some(message) = &trigger {
                        if let Err(err) = self.inner.downstream.send(message) {
                            debug!(error = %err, "could not forward shutdown trigger");
                        }
                    }
                    self.shutdown_with(ShutdownTrigger::LifecycleMessage, trigger.as_ref());
                    return;
                }
            }
        }
    }

    /// Downstream → upstream, pass-through.
    fn pump_downstream(&self) {
        loop {
            let message = match self.inner.downstream.receive() {
                Ok(message) => message,
                Err(err) => {
                    match err {
                        HostError::ChannelClosed { .. } => {
                            debug!("downstream channel closed")
                        }
                        _ => warn!(error = %err, "downstream channel failed"),
                    }
                    self.shutdown_with(
                        ShutdownTrigger::ChannelClosed(Role::DownstreamWorker),
                        None,
                    );
                    return;
                }
            };

            if let Err(err) = self.inner.upstream.send(&message) {
                warn!(error = %err, "upstream send failed");
                self.shutdown_with(ShutdownTrigger::ChannelClosed(Role::UpstreamClient), None);
                return;
            }
        }
    }
}
