//! Authoritative terrarium state for the core controller.
//!
//! [`StateManager`] owns the slots, advances the day/night simulation,
//! applies touch perturbations and projects everything into the
//! [`terralink_link::StateFrame`] sent to the display.

pub mod clock;
pub mod config;
pub mod error;
pub mod manager;
pub mod profile;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Bounds, Limits, StateConfig};
pub use error::{ProfileError, Result};
pub use manager::StateManager;
pub use profile::{ProfileRecord, ProfileSource, Slot};
