//! Daemon-level error type.

/// Top-level error for the simgate binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Configuration loading failed.
    #[error("config error in {path}: {source}")]
    Config {
        /// The file that failed to load.
        path: String,
        /// The underlying config error.
        source: simgate_core::config::ConfigError,
    },

    /// Background services failed to start.
    #[error("startup error: {source}")]
    Startup {
        /// The underlying startup error.
        #[from]
        source: simgate_server::startup::StartupError,
    },

    /// The HTTP server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: simgate_server::ServerError,
    },
}
