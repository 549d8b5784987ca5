use std::process::{Child, Command, Stdio};
use std::thread;

use tracing::{debug, info};

use crate::config::LaunchConfig;
use crate::endpoint::{Endpoint, Role};
use crate::error::{HostError, Result};

/// A launched worker: the framed channel over its stdio plus an
/// observer for its termination.
pub struct SpawnedWorker {
    pub endpoint: Endpoint,
    pub exit: ExitObserver,
}

impl std::fmt::Debug for SpawnedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedWorker").finish_non_exhaustive()
    }
}

/// Waits on a worker process and reports its exit exactly once.
pub struct ExitObserver {
    child: Child,
}

impl ExitObserver {
    /// Spawn a thread that waits for the worker to terminate and then
    /// invokes `on_exit` with the exit code (`None` when killed by a
    /// signal). Consumes the observer; the callback fires exactly once.
    pub fn watch<F>(mut self, on_exit: F)
    where
        F: FnOnce(Option<i32>) + Send + 'static,
    {
        thread::spawn(move || {
            let code = match self.child.wait() {
                Ok(status) => status.code(),
                Err(_) => None,
            };
            info!(exit_code = ?code, "worker process terminated");
            on_exit(code);
        });
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

/// Spawn the worker executable with stdin/stdout piped for the framed
/// channel and stderr inherited. Failure here is fatal: the relay must
/// not start without a worker.
pub fn spawn_worker(config: &LaunchConfig) -> Result<SpawnedWorker> {
    if config.worker_path.as_os_str().is_empty() {
        return Err(HostError::Spawn("no worker executable given".to_string()));
    }

    debug!(
        path = %config.worker_path.display(),
        args = ?config.worker_args,
        "spawning worker"
    );

    let mut child = Command::new(&config.worker_path)
        .args(&config.worker_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|err| {
            HostError::Spawn(format!("{}: {err}", config.worker_path.display()))
        })?;

    // Both handles exist because we asked for pipes above.
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| HostError::Spawn("worker stdin not captured".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| HostError::Spawn("worker stdout not captured".to_string()))?;

    info!(pid = child.id(), "worker started");

    Ok(SpawnedWorker {
        endpoint: Endpoint::from_stream(stdout, stdin, Role::DownstreamWorker),
        exit: ExitObserver { child },
    })
}
