use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use terralink_frame::{Frame, FrameConfig, FrameError, FrameReader, FrameWriter};
use terralink_transport::LinkStream;
use tracing::{debug, error, info, trace, warn};

use crate::delta::{DeltaTracker, Outgoing};
use crate::error::{LinkError, Result};
use crate::events::{LinkEvents, CLOSED, DISPLAY_READY, HANDSHAKE};
use crate::kind::{self, kind_name};
use crate::messages::{
    Command, CommandAck, CommandStatus, DisplayInfo, HelloAck, StateFrame, TouchEvent,
    CORE_CAPABILITIES, MAX_TERRARIUMS, PROTOCOL_VERSION,
};
use crate::watchdog::{LivenessCheck, WatchdogConfig};

pub type HandshakeCallback = Arc<dyn Fn(&LinkSession, u8) + Send + Sync>;
pub type DisplayReadyCallback = Arc<dyn Fn(&LinkSession, &DisplayInfo) + Send + Sync>;
pub type RequestStateCallback = Arc<dyn Fn(&LinkSession) + Send + Sync>;
pub type TouchCallback = Arc<dyn Fn(&LinkSession, &TouchEvent) + Send + Sync>;
pub type CommandCallback = Arc<dyn Fn(&LinkSession, &Command) -> CommandOutcome + Send + Sync>;

/// What a command handler reports back to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    pub status: CommandStatus,
    /// Terrariums active after the command; clamped to [`MAX_TERRARIUMS`] on the wire.
    pub terrarium_count: usize,
}

impl CommandOutcome {
    pub fn new(status: CommandStatus, terrarium_count: usize) -> Self {
        Self {
            status,
            terrarium_count,
        }
    }
}

/// Configuration for the core side of the link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Version sent in HELLO and HELLO_ACK.
    pub protocol_version: u8,
    /// Capability bits sent in HELLO_ACK.
    pub capabilities: u8,
    /// Send STATE_DELTA between periodic full frames.
    pub delta_updates: bool,
    /// Ping an idle display and drop readiness when it stops answering.
    pub watchdog: Option<WatchdogConfig>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            capabilities: CORE_CAPABILITIES,
            delta_updates: false,
            watchdog: None,
        }
    }
}

#[derive(Default)]
struct Callbacks {
    handshake: Option<HandshakeCallback>,
    display_ready: Option<DisplayReadyCallback>,
    request_state: Option<RequestStateCallback>,
    touch: Option<TouchCallback>,
    command: Option<CommandCallback>,
}

struct PeerState {
    protocol_version: u8,
    display_info: Option<DisplayInfo>,
    last_activity: Instant,
    display_alive: bool,
    ping_sent_at: Option<Instant>,
    watchdog_expired: bool,
}

/// Core-side protocol state for one display link.
///
/// Handshake and readiness flags live in [`LinkEvents`] so tasks can block on
/// them. Inbound frames are fed to [`LinkSession::handle_frame`] by the
/// receive pump, which runs registered callbacks on its own thread: a slow
/// callback delays reception of the next frame.
pub struct LinkSession {
    config: LinkConfig,
    writer: Mutex<FrameWriter<Box<dyn Write + Send>>>,
    events: LinkEvents,
    peer: Mutex<PeerState>,
    delta: Mutex<DeltaTracker>,
    callbacks: RwLock<Callbacks>,
    started_at: Instant,
}

impl LinkSession {
    /// Create a session that writes frames to `writer`.
    pub fn new(writer: impl Write + Send + 'static, frame: FrameConfig, config: LinkConfig) -> Self {
        let now = Instant::now();
        let writer: Box<dyn Write + Send> = Box::new(writer);
        Self {
            config,
            writer: Mutex::new(FrameWriter::with_config(writer, frame)),
            events: LinkEvents::new(),
            peer: Mutex::new(PeerState {
                protocol_version: 0,
                display_info: None,
                last_activity: now,
                display_alive: false,
                ping_sent_at: None,
                watchdog_expired: false,
            }),
            delta: Mutex::new(DeltaTracker::default()),
            callbacks: RwLock::new(Callbacks::default()),
            started_at: now,
        }
    }

    /// Bind a session to a connected stream.
    ///
    /// The session keeps a clone of the stream for writing; the returned
    /// reader is meant for the receive pump.
    pub fn open(
        stream: LinkStream,
        frame: FrameConfig,
        config: LinkConfig,
    ) -> Result<(Arc<Self>, FrameReader<LinkStream>)> {
        let write_half = stream.try_clone()?;
        write_half.set_write_timeout(frame.write_timeout)?;
        let session = Arc::new(Self::new(write_half, frame.clone(), config));
        Ok((session, FrameReader::with_config(stream, frame)))
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn events(&self) -> &LinkEvents {
        &self.events
    }

    pub fn is_handshake_done(&self) -> bool {
        self.events.contains(HANDSHAKE)
    }

    pub fn is_display_ready(&self) -> bool {
        self.events.contains(DISPLAY_READY)
    }

    /// Block until both handshake and display readiness are set.
    pub fn wait_for_display_ready(&self, timeout: Duration) -> bool {
        self.events.wait_all(HANDSHAKE | DISPLAY_READY, timeout)
    }

    /// Version reported by the display in its last HELLO_ACK (0 if unknown).
    pub fn peer_protocol_version(&self) -> u8 {
        self.peer.lock().protocol_version
    }

    /// Geometry from the last DISPLAY_READY.
    pub fn display_info(&self) -> Option<DisplayInfo> {
        self.peer.lock().display_info
    }

    /// True while the display keeps sending frames; only tracked by the watchdog.
    pub fn is_display_alive(&self) -> bool {
        self.peer.lock().display_alive
    }

    pub fn is_closed(&self) -> bool {
        self.events.contains(CLOSED)
    }

    /// Mark the link as down, waking anything parked in [`LinkSession::sleep`].
    pub fn mark_closed(&self) {
        self.events.set(CLOSED);
    }

    /// Sleep for `period` or until the link closes.
    ///
    /// Returns `false` once the link is closed.
    pub fn sleep(&self, period: Duration) -> bool {
        !self.events.wait_all(CLOSED, period)
    }

    /// Fired once, when the handshake first completes.
    pub fn on_handshake(&self, callback: impl Fn(&LinkSession, u8) + Send + Sync + 'static) {
        self.callbacks.write().handshake = Some(Arc::new(callback));
    }

    pub fn on_display_ready(
        &self,
        callback: impl Fn(&LinkSession, &DisplayInfo) + Send + Sync + 'static,
    ) {
        self.callbacks.write().display_ready = Some(Arc::new(callback));
    }

    pub fn on_request_state(&self, callback: impl Fn(&LinkSession) + Send + Sync + 'static) {
        self.callbacks.write().request_state = Some(Arc::new(callback));
    }

    pub fn on_touch(&self, callback: impl Fn(&LinkSession, &TouchEvent) + Send + Sync + 'static) {
        self.callbacks.write().touch = Some(Arc::new(callback));
    }

    pub fn on_command(
        &self,
        callback: impl Fn(&LinkSession, &Command) -> CommandOutcome + Send + Sync + 'static,
    ) {
        self.callbacks.write().command = Some(Arc::new(callback));
    }

    /// Send HELLO carrying this endpoint's protocol version.
    pub fn send_hello(&self) -> Result<()> {
        self.send_frame(kind::HELLO, &[self.config.protocol_version])
    }

    /// Send a liveness probe carrying milliseconds since the session started.
    pub fn send_ping(&self) -> Result<()> {
        let now_ms = self.started_at.elapsed().as_millis() as u32;
        self.send_frame(kind::PING, &now_ms.to_le_bytes())
    }

    /// Publish a snapshot to the display.
    ///
    /// Refuses with [`LinkError::DisplayNotReady`] until the display has
    /// announced readiness. Sends STATE_FULL, or STATE_DELTA when delta
    /// updates are enabled and the display holds a usable baseline.
    pub fn send_state(&self, frame: &StateFrame) -> Result<()> {
        if !self.is_display_ready() {
            return Err(LinkError::DisplayNotReady);
        }

        if !self.config.delta_updates {
            return self.send_frame(kind::STATE_FULL, &frame.encode());
        }

        let now = Instant::now();
        let mut tracker = self.delta.lock();
        let result = match tracker.plan(frame, now) {
            Outgoing::Full => self
                .send_frame(kind::STATE_FULL, &frame.encode())
                .map(|()| tracker.record_full(frame, now)),
            Outgoing::Delta(delta) => {
                trace!(changed = delta.changed, "sending state delta");
                self.send_frame(kind::STATE_DELTA, &delta.payload)
                    .map(|()| tracker.record_delta(frame, delta.changed))
            }
        };
        if result.is_err() {
            tracker.schedule_full();
        }
        result
    }

    /// Make the next published snapshot a full frame.
    pub fn schedule_full_frame(&self) {
        self.delta.lock().schedule_full();
    }

    fn send_frame(&self, kind: u8, payload: &[u8]) -> Result<()> {
        debug!(kind = kind_name(kind), len = payload.len(), "sending frame");
        self.writer
            .lock()
            .send(kind, payload)
            .map_err(|err| match err {
                FrameError::PayloadTooLarge { size, max } => {
                    LinkError::PayloadTooLarge { size, max }
                }
                other => LinkError::Frame(other),
            })
    }

    /// Dispatch one decoded inbound frame.
    ///
    /// Registered callbacks run on the calling thread before this returns.
    pub fn handle_frame(&self, frame: &Frame) -> Result<()> {
        self.note_activity(Instant::now());
        let payload = frame.payload.as_ref();

        match frame.kind {
            kind::HELLO_ACK => {
                let version = match HelloAck::decode(payload) {
                    Ok(ack) => ack.protocol_version,
                    Err(err) => {
                        debug!(error = %err, "short HELLO_ACK; peer version unknown");
                        0
                    }
                };
                self.peer.lock().protocol_version = version;
                self.complete_handshake(version);
            }
            kind::HELLO => {
                debug!("peer-initiated HELLO; acknowledging");
                let ack = HelloAck {
                    protocol_version: self.config.protocol_version,
                    capabilities: self.config.capabilities,
                };
                let sent = self.send_frame(kind::HELLO_ACK, &ack.encode());
                let version = payload.first().copied().unwrap_or(0);
                self.peer.lock().protocol_version = version;
                self.complete_handshake(version);
                sent?;
            }
            kind::DISPLAY_READY => match DisplayInfo::decode(payload) {
                Ok(info) => {
                    self.peer.lock().display_info = Some(info);
                    self.events.set(DISPLAY_READY);
                    self.schedule_full_frame();
                    info!(
                        width = info.width,
                        height = info.height,
                        protocol_version = info.protocol_version,
                        "display ready"
                    );
                    let callback = self.callbacks.read().display_ready.clone();
                    if let Some(callback) = callback {
                        callback(self, &info);
                    }
                }
                Err(err) => warn!(error = %err, "ignoring DISPLAY_READY"),
            },
            kind::REQUEST_STATE => {
                self.schedule_full_frame();
                let callback = self.callbacks.read().request_state.clone();
                if let Some(callback) = callback {
                    callback(self);
                }
            }
            kind::TOUCH_EVENT => match TouchEvent::decode(payload) {
                Ok(event) => {
                    trace!(?event, "touch event");
                    let callback = self.callbacks.read().touch.clone();
                    if let Some(callback) = callback {
                        callback(self, &event);
                    }
                }
                Err(err) => debug!(error = %err, "ignoring TOUCH_EVENT"),
            },
            kind::COMMAND => match Command::decode(payload) {
                Ok(command) => self.handle_command(&command)?,
                Err(err) => warn!(error = %err, "command frame dropped"),
            },
            kind::PING => self.send_frame(kind::PONG, payload)?,
            kind::PONG => trace!("pong received"),
            kind::ERROR => warn!(
                message = %String::from_utf8_lossy(payload),
                "display reported an error"
            ),
            other => warn!(kind = other, "unhandled frame kind"),
        }
        Ok(())
    }

    fn handle_command(&self, command: &Command) -> Result<()> {
        let callback = self.callbacks.read().command.clone();
        let outcome = match callback {
            Some(callback) => {
                info!(
                    opcode = command.opcode,
                    argument = command.argument().unwrap_or("<default>"),
                    "command received"
                );
                callback(self, command)
            }
            None => CommandOutcome::new(CommandStatus::NotSupported, 0),
        };

        let ack = CommandAck {
            opcode: command.opcode,
            status: outcome.status,
            terrarium_count: outcome.terrarium_count.min(MAX_TERRARIUMS) as u8,
        };
        self.send_frame(kind::COMMAND_ACK, &ack.encode())
            .inspect_err(|err| warn!(error = %err, "failed to send command ack"))
    }

    fn complete_handshake(&self, peer_version: u8) {
        if self.events.set(HANDSHAKE) & HANDSHAKE != 0 {
            return;
        }
        info!(peer_version, "handshake complete");
        let callback = self.callbacks.read().handshake.clone();
        if let Some(callback) = callback {
            callback(self, peer_version);
        }
    }

    fn note_activity(&self, now: Instant) {
        let mut peer = self.peer.lock();
        peer.last_activity = now;
        peer.ping_sent_at = None;
        if !peer.display_alive {
            if peer.watchdog_expired {
                info!("display link restored; waiting for DISPLAY_READY");
            }
            peer.display_alive = true;
        }
        peer.watchdog_expired = false;
    }

    /// One watchdog step at time `now`.
    ///
    /// Pings a display that has been silent for `state_timeout`; if the ping
    /// goes unanswered for `ping_timeout`, clears display readiness and
    /// schedules a full frame for when it comes back.
    pub fn check_liveness(&self, now: Instant, config: &WatchdogConfig) -> LivenessCheck {
        if !self.is_handshake_done() {
            return LivenessCheck::Quiet;
        }

        let mut peer = self.peer.lock();
        if !peer.display_alive
            || now.saturating_duration_since(peer.last_activity) < config.state_timeout
        {
            return LivenessCheck::Quiet;
        }

        let ping_sent_at = peer.ping_sent_at;
        match ping_sent_at {
            None => {
                peer.ping_sent_at = Some(now);
                drop(peer);
                match self.send_ping() {
                    Ok(()) => {
                        warn!(
                            idle_ms = config.state_timeout.as_millis() as u64,
                            "no display activity; ping sent"
                        );
                        LivenessCheck::PingSent
                    }
                    Err(err) => {
                        error!(error = %err, "failed to send watchdog ping");
                        self.peer.lock().ping_sent_at = None;
                        LivenessCheck::Quiet
                    }
                }
            }
            Some(sent) if now.saturating_duration_since(sent) >= config.ping_timeout => {
                peer.display_alive = false;
                peer.watchdog_expired = true;
                peer.ping_sent_at = None;
                drop(peer);
                self.events.clear(DISPLAY_READY);
                self.schedule_full_frame();
                error!(
                    timeout_ms = config.ping_timeout.as_millis() as u64,
                    "display watchdog expired; marking panel offline"
                );
                LivenessCheck::Expired
            }
            Some(_) => LivenessCheck::AwaitingPong,
        }
    }
}

impl std::fmt::Debug for LinkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSession")
            .field("config", &self.config)
            .field("events", &self.events.get())
            .field("closed", &self.is_closed())
            .finish()
    }
}
