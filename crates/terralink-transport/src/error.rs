use std::path::PathBuf;

/// Errors raised while bringing up or using the byte transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link socket could not be created at `path`.
    #[error("cannot bind link socket {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Nothing is listening at `path`, or the connection was refused.
    #[error("cannot reach link socket {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("accepting display connection failed: {0}")]
    Accept(std::io::Error),

    /// Applying a stream option (timeouts, cloning) failed.
    #[error("failed to configure link stream: {0}")]
    Configure(std::io::Error),

    #[error("link stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
