//! Message kind bytes shared with the display firmware.

/// Core announces itself and its protocol version.
pub const HELLO: u8 = 0x01;
/// Answer to HELLO: version and capability bits.
pub const HELLO_ACK: u8 = 0x02;
/// Display asks for an immediate full snapshot.
pub const REQUEST_STATE: u8 = 0x03;
/// Complete snapshot of every terrarium.
pub const STATE_FULL: u8 = 0x10;
/// Changed fields since the last snapshot.
pub const STATE_DELTA: u8 = 0x11;
/// Liveness probe carrying a millisecond timestamp.
pub const PING: u8 = 0x1F;
/// Echo of a PING payload.
pub const PONG: u8 = 0x20;
/// Display-to-core command (opcode + optional argument).
pub const COMMAND: u8 = 0x30;
/// Result of a COMMAND.
pub const COMMAND_ACK: u8 = 0x31;
/// Touch input forwarded from the display panel.
pub const TOUCH_EVENT: u8 = 0x80;
/// Display finished booting and accepts state.
pub const DISPLAY_READY: u8 = 0x81;
/// Free-form error report.
pub const ERROR: u8 = 0xFE;

/// Returns a human-readable name for a message kind.
pub fn kind_name(kind: u8) -> &'static str {
    match kind {
        HELLO => "HELLO",
        HELLO_ACK => "HELLO_ACK",
        REQUEST_STATE => "REQUEST_STATE",
        STATE_FULL => "STATE_FULL",
        STATE_DELTA => "STATE_DELTA",
        PING => "PING",
        PONG => "PONG",
        COMMAND => "COMMAND",
        COMMAND_ACK => "COMMAND_ACK",
        TOUCH_EVENT => "TOUCH_EVENT",
        DISPLAY_READY => "DISPLAY_READY",
        ERROR => "ERROR",
        _ => "UNKNOWN",
    }
}
