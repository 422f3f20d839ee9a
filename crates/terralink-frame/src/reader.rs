use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use terralink_transport::TimeoutRead;
use tracing::{debug, trace, warn};

use crate::codec::{decode_frame, Frame, FrameConfig, FRAME_START, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 256;

/// Counters for everything the reader dropped on the way to a valid frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames handed to the caller.
    pub frames: u64,
    /// Bytes skipped while hunting for a start marker.
    pub skipped_bytes: u64,
    /// Partial frames abandoned because a stage timed out.
    pub timeouts: u64,
    /// Frames dropped for a bad checksum.
    pub checksum_errors: u64,
    /// Headers dropped for announcing an oversized payload.
    pub oversized: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Scan,
    Header,
    Payload,
    Checksum,
}

/// Reads complete, checksum-verified frames from a byte stream.
///
/// Corruption never reaches the caller: garbage is skipped, bad frames are
/// dropped, and a frame that stalls mid-way is abandoned once its stage
/// timeout passes. Only end-of-stream and hard I/O errors are returned.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    stats: FrameStats,
    stage: Stage,
    deadline: Option<Instant>,
}

impl<T: TimeoutRead> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            stats: FrameStats::default(),
            stage: Stage::Scan,
            deadline: None,
        }
    }

    /// Read the next valid frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.decode_buffered() {
                self.stats.frames += 1;
                self.stage = Stage::Scan;
                self.deadline = None;
                trace!(kind = frame.kind, len = frame.payload.len(), "frame received");
                return Ok(frame);
            }

            self.enter_stage(self.current_stage());
            let timeout = match self.deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        self.abandon_partial();
                        continue;
                    }
                    Some(remaining)
                }
                None => None,
            };
            self.inner.set_read_timeout(timeout)?;

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if self.stage != Stage::Scan
                        && matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    self.abandon_partial();
                    continue;
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    fn decode_buffered(&mut self) -> Option<Frame> {
        loop {
            let before = self.buf.len();
            let result = decode_frame(&mut self.buf, self.config.max_payload_size);
            let consumed = (before - self.buf.len()) as u64;

            match result {
                Ok(Some(frame)) => {
                    self.stats.skipped_bytes += consumed - frame.wire_size() as u64;
                    return Some(frame);
                }
                Ok(None) => {
                    self.stats.skipped_bytes += consumed;
                    return None;
                }
                Err(FrameError::ChecksumMismatch { expected, received }) => {
                    self.stats.checksum_errors += 1;
                    self.stats.skipped_bytes += consumed;
                    warn!(expected, received, "checksum mismatch; frame dropped");
                }
                Err(FrameError::PayloadTooLarge { size, max }) => {
                    self.stats.oversized += 1;
                    self.stats.skipped_bytes += consumed;
                    warn!(size, max, "frame length exceeds limit; header dropped");
                }
                Err(err) => {
                    warn!(error = %err, "frame dropped");
                    return None;
                }
            }
        }
    }

    fn current_stage(&self) -> Stage {
        if self.buf.first() != Some(&FRAME_START) {
            return Stage::Scan;
        }
        if self.buf.len() < HEADER_SIZE {
            return Stage::Header;
        }
        let payload_len = u16::from_le_bytes([self.buf[2], self.buf[3]]) as usize;
        if self.buf.len() < HEADER_SIZE + payload_len {
            Stage::Payload
        } else {
            Stage::Checksum
        }
    }

    fn enter_stage(&mut self, stage: Stage) {
        if stage == self.stage && (stage == Stage::Scan || self.deadline.is_some()) {
            return;
        }
        self.stage = stage;
        self.deadline = self.stage_timeout(stage).map(|t| Instant::now() + t);
    }

    fn stage_timeout(&self, stage: Stage) -> Option<Duration> {
        match stage {
            Stage::Scan => None,
            Stage::Header => Some(self.config.header_timeout),
            Stage::Payload => Some(self.config.payload_timeout),
            Stage::Checksum => Some(self.config.checksum_timeout),
        }
    }

    fn abandon_partial(&mut self) {
        self.stats.timeouts += 1;
        self.stats.skipped_bytes += self.buf.len() as u64;
        debug!(stage = ?self.stage, buffered = self.buf.len(), "frame stalled; partial frame discarded");
        self.buf.clear();
        self.stage = Stage::Scan;
        self.deadline = None;
    }

    /// Counters accumulated since the reader was created.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
