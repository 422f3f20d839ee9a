use std::path::Path;

use terralink_frame::{Frame, FrameConfig, FrameReader, FrameWriter};
use terralink_link::kind::{self, kind_name};
use terralink_link::{
    apply_delta, Command, CommandAck, DisplayInfo, HelloAck, LinkError, StateFrame, TouchEvent,
    PROTOCOL_VERSION,
};
use terralink_transport::{LinkListener, LinkStream};
use tracing::{debug, info, trace, warn};

use crate::error::Result;

/// What a simulated display announces about itself.
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub width: u16,
    pub height: u16,
    pub protocol_version: u8,
    pub capabilities: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 600,
            protocol_version: PROTOCOL_VERSION,
            capabilities: 0,
        }
    }
}

/// Something the core sent that a display cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    /// A complete snapshot, from STATE_FULL or a STATE_DELTA applied to the last one.
    State(StateFrame),
    CommandAck(CommandAck),
    Pong(Vec<u8>),
    /// The core reported an error string.
    Error(String),
}

/// Display end of a link, for tests and the `display` command.
///
/// Answers HELLO and PING on its own and keeps the last snapshot as the
/// baseline for STATE_DELTA frames.
pub struct DisplayPeer {
    reader: FrameReader<LinkStream>,
    writer: FrameWriter<LinkStream>,
    config: DisplayConfig,
    handshake_done: bool,
    baseline: Option<StateFrame>,
}

impl DisplayPeer {
    pub fn new(stream: LinkStream, config: DisplayConfig) -> Result<Self> {
        let write_half = stream.try_clone()?;
        Ok(Self {
            reader: FrameReader::with_config(stream, FrameConfig::default()),
            writer: FrameWriter::with_config(write_half, FrameConfig::default()),
            config,
            handshake_done: false,
            baseline: None,
        })
    }

    /// Connect to a core listening on a Unix socket.
    pub fn connect(path: impl AsRef<Path>, config: DisplayConfig) -> Result<Self> {
        Self::new(LinkListener::connect(path)?, config)
    }

    pub fn is_handshake_done(&self) -> bool {
        self.handshake_done
    }

    /// Last snapshot received.
    pub fn baseline(&self) -> Option<&StateFrame> {
        self.baseline.as_ref()
    }

    /// Wait for the core's HELLO, acknowledge it and announce readiness.
    pub fn handshake(&mut self) -> Result<()> {
        while !self.handshake_done {
            let frame = self.read()?;
            if let Some(event) = self.dispatch(&frame)? {
                debug!(?event, "event before handshake ignored");
            }
        }
        self.announce_ready()
    }

    /// Send DISPLAY_READY with the configured geometry.
    pub fn announce_ready(&mut self) -> Result<()> {
        let info = DisplayInfo {
            width: self.config.width,
            height: self.config.height,
            protocol_version: self.config.protocol_version,
        };
        self.send(kind::DISPLAY_READY, &info.encode())
    }

    pub fn request_state(&mut self) -> Result<()> {
        self.send(kind::REQUEST_STATE, &[])
    }

    pub fn send_touch(&mut self, event: &TouchEvent) -> Result<()> {
        self.send(kind::TOUCH_EVENT, &event.encode())
    }

    pub fn send_command(&mut self, command: &Command) -> Result<()> {
        self.send(kind::COMMAND, &command.encode())
    }

    pub fn send_ping(&mut self, stamp: u32) -> Result<()> {
        self.send(kind::PING, &stamp.to_le_bytes())
    }

    /// Block until the next event, answering protocol traffic in between.
    pub fn recv(&mut self) -> Result<DisplayEvent> {
        loop {
            let frame = self.read()?;
            if let Some(event) = self.dispatch(&frame)? {
                return Ok(event);
            }
        }
    }

    /// Block until the next snapshot.
    pub fn recv_state(&mut self) -> Result<StateFrame> {
        loop {
            if let DisplayEvent::State(frame) = self.recv()? {
                return Ok(frame);
            }
        }
    }

    /// Shut the link down in both directions.
    pub fn close(&self) -> Result<()> {
        Ok(self.writer.get_ref().shutdown()?)
    }

    fn read(&mut self) -> Result<Frame> {
        Ok(self.reader.read_frame().map_err(LinkError::from)?)
    }

    fn send(&mut self, kind: u8, payload: &[u8]) -> Result<()> {
        trace!(kind = kind_name(kind), len = payload.len(), "display sending frame");
        Ok(self.writer.send(kind, payload).map_err(LinkError::from)?)
    }

    fn dispatch(&mut self, frame: &Frame) -> Result<Option<DisplayEvent>> {
        let payload = frame.payload.as_ref();
        let event = match frame.kind {
            kind::HELLO => {
                let ack = HelloAck {
                    protocol_version: self.config.protocol_version,
                    capabilities: self.config.capabilities,
                };
                self.send(kind::HELLO_ACK, &ack.encode())?;
                if !self.handshake_done {
                    info!(core_version = payload.first().copied().unwrap_or(0), "core said hello");
                }
                self.handshake_done = true;
                None
            }
            kind::HELLO_ACK => {
                self.handshake_done = true;
                None
            }
            kind::PING => {
                self.send(kind::PONG, payload)?;
                None
            }
            kind::PONG => Some(DisplayEvent::Pong(payload.to_vec())),
            kind::STATE_FULL => {
                let state = StateFrame::decode(payload)?;
                self.baseline = Some(state.clone());
                Some(DisplayEvent::State(state))
            }
            kind::STATE_DELTA => match self.baseline.as_mut() {
                Some(baseline) => match apply_delta(baseline, payload) {
                    Ok(()) => Some(DisplayEvent::State(baseline.clone())),
                    Err(err) => {
                        warn!(error = %err, "delta rejected; requesting full state");
                        self.baseline = None;
                        self.request_state()?;
                        None
                    }
                },
                None => {
                    debug!("delta without baseline; requesting full state");
                    self.request_state()?;
                    None
                }
            },
            kind::COMMAND_ACK => Some(DisplayEvent::CommandAck(CommandAck::decode(payload)?)),
            kind::ERROR => Some(DisplayEvent::Error(String::from_utf8_lossy(payload).into_owned())),
            other => {
                debug!(kind = kind_name(other), "display ignoring frame");
                None
            }
        };
        Ok(event)
    }
}

impl std::fmt::Debug for DisplayPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayPeer")
            .field("config", &self.config)
            .field("handshake_done", &self.handshake_done)
            .field("stats", &self.reader.stats())
            .finish()
    }
}
