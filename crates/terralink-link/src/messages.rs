//! Payload layouts for each message kind.
//!
//! All multi-byte fields are little-endian. Layouts are fixed by the display
//! firmware; sizes below are part of that contract.

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use tracing::warn;

use crate::error::{LinkError, Result};

/// Protocol version spoken by this endpoint.
pub const PROTOCOL_VERSION: u8 = 1;

/// Capability bits advertised in HELLO_ACK (bit 1: host controller).
pub const CORE_CAPABILITIES: u8 = 0x02;

/// Most terrariums a single state frame can carry.
pub const MAX_TERRARIUMS: usize = 4;

/// Size of each name buffer on the wire, including the NUL terminator.
pub const NAME_LEN: usize = 32;

/// Longest command argument accepted, in bytes.
pub const COMMAND_ARG_MAX: usize = 127;

/// `{epoch: u32, count: u8}`.
pub const STATE_HEADER_SIZE: usize = 5;

/// `id + 2 names + 9 floats + feeding timestamp + activity`.
pub const SNAPSHOT_RECORD_SIZE: usize = 1 + 2 * NAME_LEN + 9 * 4 + 4 + 4;

/// `{kind: u32, point_id: u8, pad: u8, x: u16, y: u16}`.
pub const TOUCH_EVENT_SIZE: usize = 10;

/// `{width: u16, height: u16, protocol_version: u8}`.
pub const DISPLAY_READY_SIZE: usize = 5;

/// `{opcode: u8, status: i32, terrarium_count: u8}`.
pub const COMMAND_ACK_SIZE: usize = 6;

/// Command opcode: reload terrarium profiles, optional path argument.
pub const CMD_RELOAD_PROFILES: u8 = 0x01;

/// HELLO_ACK payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloAck {
    pub protocol_version: u8,
    pub capabilities: u8,
}

impl HelloAck {
    pub fn encode(&self) -> [u8; 2] {
        [self.protocol_version, self.capabilities]
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        match payload {
            [protocol_version, capabilities, ..] => Ok(Self {
                protocol_version: *protocol_version,
                capabilities: *capabilities,
            }),
            _ => Err(LinkError::invalid("HELLO_ACK", "expected 2 bytes")),
        }
    }
}

/// Display geometry announced with DISPLAY_READY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayInfo {
    pub width: u16,
    pub height: u16,
    pub protocol_version: u8,
}

impl DisplayInfo {
    pub fn encode(&self) -> [u8; DISPLAY_READY_SIZE] {
        let [w0, w1] = self.width.to_le_bytes();
        let [h0, h1] = self.height.to_le_bytes();
        [w0, w1, h0, h1, self.protocol_version]
    }

    pub fn decode(mut payload: &[u8]) -> Result<Self> {
        if payload.len() < DISPLAY_READY_SIZE {
            return Err(LinkError::invalid(
                "DISPLAY_READY",
                format!("expected {DISPLAY_READY_SIZE} bytes, got {}", payload.len()),
            ));
        }
        Ok(Self {
            width: payload.get_u16_le(),
            height: payload.get_u16_le(),
            protocol_version: payload.get_u8(),
        })
    }
}

/// Touch phase reported by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchKind {
    Down,
    Move,
    Up,
    Other(u32),
}

impl TouchKind {
    fn from_wire(raw: u32) -> Self {
        match raw {
            0 => Self::Down,
            1 => Self::Move,
            2 => Self::Up,
            other => Self::Other(other),
        }
    }

    fn to_wire(self) -> u32 {
        match self {
            Self::Down => 0,
            Self::Move => 1,
            Self::Up => 2,
            Self::Other(raw) => raw,
        }
    }
}

/// TOUCH_EVENT payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    pub kind: TouchKind,
    pub point_id: u8,
    pub x: u16,
    pub y: u16,
}

impl TouchEvent {
    pub fn new(kind: TouchKind, x: u16, y: u16) -> Self {
        Self {
            kind,
            point_id: 0,
            x,
            y,
        }
    }

    pub fn encode(&self) -> [u8; TOUCH_EVENT_SIZE] {
        let mut out = [0u8; TOUCH_EVENT_SIZE];
        out[0..4].copy_from_slice(&self.kind.to_wire().to_le_bytes());
        out[4] = self.point_id;
        out[6..8].copy_from_slice(&self.x.to_le_bytes());
        out[8..10].copy_from_slice(&self.y.to_le_bytes());
        out
    }

    pub fn decode(mut payload: &[u8]) -> Result<Self> {
        if payload.len() < TOUCH_EVENT_SIZE {
            return Err(LinkError::invalid(
                "TOUCH_EVENT",
                format!("expected {TOUCH_EVENT_SIZE} bytes, got {}", payload.len()),
            ));
        }
        let kind = TouchKind::from_wire(payload.get_u32_le());
        let point_id = payload.get_u8();
        payload.advance(1);
        Ok(Self {
            kind,
            point_id,
            x: payload.get_u16_le(),
            y: payload.get_u16_le(),
        })
    }
}

/// Wire projection of one terrarium slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TerrariumSnapshot {
    pub id: u8,
    pub scientific_name: String,
    pub common_name: String,
    pub temp_day_c: f32,
    pub temp_night_c: f32,
    pub humidity_day_pct: f32,
    pub humidity_night_pct: f32,
    pub lux_day: f32,
    pub lux_night: f32,
    pub hydration_pct: f32,
    pub stress_pct: f32,
    pub health_pct: f32,
    pub last_feeding_timestamp: u32,
    pub activity_score: f32,
}

impl TerrariumSnapshot {
    fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u8(self.id);
        put_name(dst, &self.scientific_name);
        put_name(dst, &self.common_name);
        for value in [
            self.temp_day_c,
            self.temp_night_c,
            self.humidity_day_pct,
            self.humidity_night_pct,
            self.lux_day,
            self.lux_night,
            self.hydration_pct,
            self.stress_pct,
            self.health_pct,
        ] {
            dst.put_f32_le(value);
        }
        dst.put_u32_le(self.last_feeding_timestamp);
        dst.put_f32_le(self.activity_score);
    }

    fn decode_from(src: &mut &[u8]) -> Self {
        Self {
            id: src.get_u8(),
            scientific_name: get_name(src),
            common_name: get_name(src),
            temp_day_c: src.get_f32_le(),
            temp_night_c: src.get_f32_le(),
            humidity_day_pct: src.get_f32_le(),
            humidity_night_pct: src.get_f32_le(),
            lux_day: src.get_f32_le(),
            lux_night: src.get_f32_le(),
            hydration_pct: src.get_f32_le(),
            stress_pct: src.get_f32_le(),
            health_pct: src.get_f32_le(),
            last_feeding_timestamp: src.get_u32_le(),
            activity_score: src.get_f32_le(),
        }
    }
}

/// A full snapshot: epoch plus one record per terrarium.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StateFrame {
    pub epoch: u32,
    pub terrariums: Vec<TerrariumSnapshot>,
}

impl StateFrame {
    /// Encode as a STATE_FULL payload.
    ///
    /// Records beyond [`MAX_TERRARIUMS`] are dropped with a warning.
    pub fn encode(&self) -> BytesMut {
        let count = self.wire_count();
        let mut dst = BytesMut::with_capacity(STATE_HEADER_SIZE + count * SNAPSHOT_RECORD_SIZE);
        dst.put_u32_le(self.epoch);
        dst.put_u8(count as u8);
        for terrarium in &self.terrariums[..count] {
            terrarium.encode_into(&mut dst);
        }
        dst
    }

    pub fn decode(mut payload: &[u8]) -> Result<Self> {
        if payload.len() < STATE_HEADER_SIZE {
            return Err(LinkError::invalid("STATE_FULL", "truncated header"));
        }
        let epoch = payload.get_u32_le();
        let count = payload.get_u8() as usize;
        if count > MAX_TERRARIUMS {
            return Err(LinkError::invalid(
                "STATE_FULL",
                format!("{count} terrariums exceeds limit {MAX_TERRARIUMS}"),
            ));
        }
        if payload.len() < count * SNAPSHOT_RECORD_SIZE {
            return Err(LinkError::invalid(
                "STATE_FULL",
                format!("{count} records need {} bytes", count * SNAPSHOT_RECORD_SIZE),
            ));
        }
        let terrariums = (0..count)
            .map(|_| TerrariumSnapshot::decode_from(&mut payload))
            .collect();
        Ok(Self { epoch, terrariums })
    }

    /// Number of records that fit on the wire.
    pub fn wire_count(&self) -> usize {
        if self.terrariums.len() > MAX_TERRARIUMS {
            warn!(
                count = self.terrariums.len(),
                max = MAX_TERRARIUMS,
                "clamping terrarium count"
            );
        }
        self.terrariums.len().min(MAX_TERRARIUMS)
    }
}

/// A command sent by the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub opcode: u8,
    /// Argument text, absent when the frame carried only the opcode.
    pub argument: Option<String>,
}

impl Command {
    pub fn new(opcode: u8, argument: Option<&str>) -> Self {
        Self {
            opcode,
            argument: argument.map(str::to_string),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.opcode];
        if let Some(argument) = &self.argument {
            out.extend_from_slice(truncate_utf8(argument, COMMAND_ARG_MAX).as_bytes());
        }
        out
    }

    /// Decode a command; the argument is cut to [`COMMAND_ARG_MAX`] bytes and
    /// read up to its first NUL.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (opcode, rest) = payload
            .split_first()
            .ok_or_else(|| LinkError::invalid("COMMAND", "missing opcode"))?;
        let argument = (!rest.is_empty()).then(|| {
            let rest = &rest[..rest.len().min(COMMAND_ARG_MAX)];
            let end = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
            String::from_utf8_lossy(&rest[..end]).into_owned()
        });
        Ok(Self {
            opcode: *opcode,
            argument,
        })
    }

    /// The argument, treating an empty string as absent.
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref().filter(|arg| !arg.is_empty())
    }
}

/// Status codes carried in COMMAND_ACK, shared with the display firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    Fail,
    InvalidArg,
    InvalidState,
    NotFound,
    NotSupported,
    Other(i32),
}

impl CommandStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Fail => -1,
            Self::InvalidArg => 0x102,
            Self::InvalidState => 0x103,
            Self::NotFound => 0x105,
            Self::NotSupported => 0x106,
            Self::Other(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            -1 => Self::Fail,
            0x102 => Self::InvalidArg,
            0x103 => Self::InvalidState,
            0x105 => Self::NotFound,
            0x106 => Self::NotSupported,
            other => Self::Other(other),
        }
    }
}

/// COMMAND_ACK payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandAck {
    pub opcode: u8,
    pub status: CommandStatus,
    pub terrarium_count: u8,
}

impl CommandAck {
    pub fn encode(&self) -> [u8; COMMAND_ACK_SIZE] {
        let mut out = [0u8; COMMAND_ACK_SIZE];
        out[0] = self.opcode;
        out[1..5].copy_from_slice(&self.status.code().to_le_bytes());
        out[5] = self.terrarium_count;
        out
    }

    pub fn decode(mut payload: &[u8]) -> Result<Self> {
        if payload.len() < COMMAND_ACK_SIZE {
            return Err(LinkError::invalid("COMMAND_ACK", "expected 6 bytes"));
        }
        Ok(Self {
            opcode: payload.get_u8(),
            status: CommandStatus::from_code(payload.get_i32_le()),
            terrarium_count: payload.get_u8(),
        })
    }
}

pub(crate) fn put_name(dst: &mut BytesMut, name: &str) {
    let bytes = truncate_utf8(name, NAME_LEN - 1).as_bytes();
    dst.put_slice(bytes);
    dst.put_bytes(0, NAME_LEN - bytes.len());
}

pub(crate) fn get_name(src: &mut &[u8]) -> String {
    let raw = &src[..NAME_LEN];
    let end = raw.iter().position(|b| *b == 0).unwrap_or(NAME_LEN);
    let name = String::from_utf8_lossy(&raw[..end]).into_owned();
    src.advance(NAME_LEN);
    name
}

/// Longest prefix of `text` that fits in `max` bytes without splitting a character.
pub fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
