use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{LinkError, Result};
use crate::session::LinkSession;

/// Timing for the display liveness watchdog.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// How often the watchdog looks at the link.
    pub period: Duration,
    /// Silence after which the display is pinged.
    pub state_timeout: Duration,
    /// Time a ping may go unanswered before the display is marked offline.
    pub ping_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(250),
            state_timeout: Duration::from_millis(3000),
            ping_timeout: Duration::from_millis(1000),
        }
    }
}

/// Outcome of one watchdog step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessCheck {
    /// Nothing to do: no handshake yet, display offline, or recent traffic.
    Quiet,
    /// The display went silent and was pinged.
    PingSent,
    /// A ping is outstanding and still within its timeout.
    AwaitingPong,
    /// The ping went unanswered; readiness was cleared.
    Expired,
}

/// Run [`LinkSession::check_liveness`] every `config.period` until the link closes.
pub fn spawn_watchdog(session: Arc<LinkSession>, config: WatchdogConfig) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("link-watchdog".into())
        .spawn(move || {
            while session.sleep(config.period) {
                let check = session.check_liveness(Instant::now(), &config);
                if check != LivenessCheck::Quiet {
                    debug!(?check, "watchdog tick");
                }
            }
        })
        .map_err(LinkError::Spawn)
}
