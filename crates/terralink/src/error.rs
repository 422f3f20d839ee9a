use std::path::PathBuf;

/// Errors raised while bringing up or running the core.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] terralink_transport::TransportError),

    /// Link session error.
    #[error("link error: {0}")]
    Link(#[from] terralink_link::LinkError),

    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid.
    #[error("invalid config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration file parsed but holds an unusable value.
    #[error("invalid config {}: {field} must be greater than zero", path.display())]
    ConfigValue { path: PathBuf, field: &'static str },

    /// A core task thread could not be started.
    #[error("failed to spawn {name} task: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A core task panicked.
    #[error("{0} task panicked")]
    TaskPanicked(&'static str),
}

pub type Result<T> = std::result::Result<T, AppError>;
