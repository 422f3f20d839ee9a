use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Set once the HELLO / HELLO_ACK exchange completed.
pub const HANDSHAKE: u8 = 1 << 0;
/// Set while the display has announced readiness.
pub const DISPLAY_READY: u8 = 1 << 1;
/// Set once when the link goes down.
pub const CLOSED: u8 = 1 << 2;

/// Bit flags tasks can poll or block on.
#[derive(Debug, Default)]
pub struct LinkEvents {
    bits: Mutex<u8>,
    changed: Condvar,
}

impl LinkEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `bits`, waking waiters. Returns the flags as they were before.
    pub fn set(&self, bits: u8) -> u8 {
        let mut guard = self.bits.lock();
        let previous = *guard;
        *guard |= bits;
        if *guard != previous {
            self.changed.notify_all();
        }
        previous
    }

    /// Clear `bits`. Returns the flags as they were before.
    pub fn clear(&self, bits: u8) -> u8 {
        let mut guard = self.bits.lock();
        let previous = *guard;
        *guard &= !bits;
        previous
    }

    /// Current flags.
    pub fn get(&self) -> u8 {
        *self.bits.lock()
    }

    /// True when every bit in `bits` is set.
    pub fn contains(&self, bits: u8) -> bool {
        self.get() & bits == bits
    }

    /// Block until every bit in `bits` is set or `timeout` elapses.
    ///
    /// Returns whether the bits were all set on return.
    pub fn wait_all(&self, bits: u8, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.bits.lock();
        while *guard & bits != bits {
            if self.changed.wait_until(&mut guard, deadline).timed_out() {
                return *guard & bits == bits;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn set_reports_previous_bits() {
        let events = LinkEvents::new();
        assert_eq!(events.set(HANDSHAKE), 0);
        assert_eq!(events.set(HANDSHAKE), HANDSHAKE);
        assert!(events.contains(HANDSHAKE));
        assert!(!events.contains(HANDSHAKE | DISPLAY_READY));
    }

    #[test]
    fn clear_removes_only_requested_bits() {
        let events = LinkEvents::new();
        events.set(HANDSHAKE | DISPLAY_READY);
        events.clear(DISPLAY_READY);
        assert_eq!(events.get(), HANDSHAKE);
    }

    #[test]
    fn wait_all_times_out_when_partially_set() {
        let events = LinkEvents::new();
        events.set(HANDSHAKE);

        let started = Instant::now();
        assert!(!events.wait_all(HANDSHAKE | DISPLAY_READY, Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn wait_all_wakes_when_last_bit_arrives() {
        let events = Arc::new(LinkEvents::new());
        let setter = {
            let events = Arc::clone(&events);
            std::thread::spawn(move || {
                events.set(HANDSHAKE);
                std::thread::sleep(Duration::from_millis(20));
                events.set(DISPLAY_READY);
            })
        };

        assert!(events.wait_all(HANDSHAKE | DISPLAY_READY, Duration::from_secs(5)));
        setter.join().unwrap();
    }
}
