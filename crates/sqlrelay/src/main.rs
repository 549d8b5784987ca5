mod exit;
mod logging;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use sqlrelay_host::{
    spawn_worker, Endpoint, LaunchConfig, RelaySession, Role, ShutdownTrigger,
    LifecycleCoordinator, SpawnedWorker,
};

/// Protocol version announced at startup.
const HOST_PROTOCOL_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(
    name = "sqlrelay",
    version,
    about = "Stdio JSON-RPC relay host for the SQL tools service"
)]
struct Cli {
    /// Enable diagnostic logging to a file.
    #[arg(long)]
    enable_logging: bool,

    /// Directory for diagnostic log files.
    #[arg(long, value_name = "PATH")]
    log_dir: Option<PathBuf>,

    /// Path to the backend worker executable.
    #[arg(long, value_name = "PATH")]
    mssqltools_exec: Option<PathBuf>,

    /// Locale the service runs under.
    #[arg(long, value_name = "TAG")]
    locale: Option<String>,
}

impl Cli {
    /// Launch configuration for the worker. The logging and locale flags
    /// are forwarded to the worker; the executable path itself never is.
    fn launch_config(&self) -> LaunchConfig {
        let mut args = Vec::new();
        if self.enable_logging {
            args.push("--enable-logging".to_string());
        }
        if let Some(dir) = &self.log_dir {
            args.push("--log-dir".to_string());
            args.push(dir.display().to_string());
        }
        if let Some(locale) = &self.locale {
            args.push("--locale".to_string());
            args.push(locale.clone());
        }

        LaunchConfig::new(self.mssqltools_exec.clone().unwrap_or_default())
            .with_args(args)
            .with_logging(self.enable_logging, self.log_dir.clone())
            .with_locale(self.locale.clone())
    }
}

fn main() {
    // Bad flags never fail startup: usage goes to stdout and the process
    // exits cleanly, same as -h/--help.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            println!("{}", err.render());
            std::process::exit(exit::SUCCESS);
        }
    };

    match run(cli) {
        Ok(()) => std::process::exit(exit::SUCCESS),
        Err(err) => {
            error!(error = %err, "relay host failed");
            eprintln!("error: {err}");
            std::process::exit(exit::FAILURE);
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let log_path = logging::init_logging(cli.enable_logging, cli.log_dir.as_deref())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        protocol = HOST_PROTOCOL_VERSION,
        log_file = ?log_path,
        locale = ?cli.locale,
        "sql tools relay starting"
    );

    let SpawnedWorker {
        endpoint: downstream,
        exit: worker_exit,
    } = spawn_worker(&cli.launch_config())?;
    let upstream = Endpoint::from_stream(io::stdin(), io::stdout(), Role::UpstreamClient);

    let coordinator = LifecycleCoordinator::new();
    coordinator.registry().register_initialize(Arc::new(|_| {
        info!("client initialize received");
        Ok(())
    }));
    coordinator.registry().register_shutdown(Arc::new(|trigger| {
        info!(via_message = trigger.is_some(), "relay shutting down");
        Ok(())
    }));

    let session = RelaySession::new(upstream, downstream, coordinator);

    {
        let session = session.clone();
        ctrlc::set_handler(move || session.initiate_shutdown(ShutdownTrigger::Signal))?;
    }
    {
        let session = session.clone();
        worker_exit.watch(move |code| {
            session.initiate_shutdown(ShutdownTrigger::WorkerExit(code));
        });
    }

    session.run()?;
    info!("sql tools relay stopped");
    Ok(())
}
