//! Core side of the terrarium display link.
//!
//! A [`LinkSession`] owns the handshake and readiness state for one display,
//! sends HELLO, state snapshots and pings, and dispatches inbound frames to
//! registered callbacks. The receive pump ([`spawn_receive_pump`]) feeds it
//! from a [`terralink_frame::FrameReader`]; the optional watchdog
//! ([`spawn_watchdog`]) pings a display that went quiet.

pub mod delta;
pub mod error;
pub mod events;
pub mod kind;
pub mod messages;
pub mod pump;
pub mod session;
pub mod watchdog;

pub use delta::apply_delta;
pub use error::{LinkError, Result};
pub use events::LinkEvents;
pub use messages::{
    Command, CommandAck, CommandStatus, DisplayInfo, HelloAck, StateFrame, TerrariumSnapshot,
    TouchEvent, TouchKind, CMD_RELOAD_PROFILES, MAX_TERRARIUMS, NAME_LEN, PROTOCOL_VERSION,
};
pub use pump::{run_receive_pump, spawn_receive_pump, PumpExit};
pub use session::{CommandOutcome, LinkConfig, LinkSession};
pub use watchdog::{spawn_watchdog, LivenessCheck, WatchdogConfig};
