/// Errors that can occur in link session operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] terralink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] terralink_frame::FrameError),

    /// State was offered before the display announced readiness.
    #[error("display has not announced readiness")]
    DisplayNotReady,

    /// An outgoing message does not fit in one frame.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A link task thread could not be started.
    #[error("failed to spawn link task: {0}")]
    Spawn(#[source] std::io::Error),

    /// An inbound payload does not match the layout of its message kind.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },
}

impl LinkError {
    pub(crate) fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            kind,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
