//! Core controller for a terrarium display link.
//!
//! terralink runs the core side of a framed point-to-point link to a touch
//! display: it owns the simulated terrarium state, keeps the display's view
//! of it current, and reacts to touches and commands coming back.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte streams with read timeouts (Unix sockets, socket pairs)
//! - [`frame`]: Start-marker framing with checksum and resynchronization
//! - [`link`]: Message payloads, link session, receive pump, watchdog
//! - [`state`]: Terrarium profiles, simulation and snapshots
//! - [`CoreApp`]: Wires the layers together and runs the periodic tasks

/// Re-export transport types.
pub mod transport {
    pub use terralink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use terralink_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use terralink_link::*;
}

/// Re-export state types.
pub mod state {
    pub use terralink_state::*;
}

pub mod app;
pub mod config;
pub mod display;
pub mod error;

pub use app::{CoreApp, CoreHandle};
pub use config::{ConfigFile, CoreConfig};
pub use display::{DisplayConfig, DisplayEvent, DisplayPeer};
pub use error::{AppError, Result};
