use std::path::PathBuf;

/// Worker launch configuration, built once at startup from command-line
/// input and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct LaunchConfig {
    /// Path to the worker executable.
    pub worker_path: PathBuf,
    /// Ordered arguments passed to the worker.
    pub worker_args: Vec<String>,
    /// Whether diagnostic logging is enabled.
    pub enable_logging: bool,
    /// Directory where diagnostic log files are written.
    pub log_dir: Option<PathBuf>,
    /// Locale tag the service runs under.
    pub locale: Option<String>,
}

impl LaunchConfig {
    /// Configuration for a worker executable with no extra arguments.
    pub fn new(worker_path: impl Into<PathBuf>) -> Self {
        Self {
            worker_path: worker_path.into(),
            ..Self::default()
        }
    }

    /// Replace the worker argument list.
    pub fn with_args<S: Into<String>, I: IntoIterator<Item = S>>(mut self, args: I) -> Self {
        self.worker_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the logging flags.
    pub fn with_logging(mut self, enabled: bool, log_dir: Option<PathBuf>) -> Self {
        self.enable_logging = enabled;
        self.log_dir = log_dir;
        self
    }

    /// Set the locale tag.
    pub fn with_locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale;
        self
    }
}
