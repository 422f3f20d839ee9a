//! Byte transport underneath the terrarium link.
//!
//! The link protocol only needs a duplex byte channel with blocking reads,
//! blocking writes and a read timeout it can change between reads. On the
//! board that channel is a UART; on a host it is a Unix domain socket or an
//! in-process socket pair. [`LinkStream`] wraps all of them.

pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::{LinkStream, TimeoutRead};

#[cfg(unix)]
pub use uds::LinkListener;
