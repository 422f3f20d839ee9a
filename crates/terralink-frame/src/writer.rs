use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, FrameConfig, HEADER_SIZE, MAX_PAYLOAD, TRAILER_SIZE};
use crate::error::{FrameError, Result};

/// Writes complete frames to any `Write` stream.
///
/// A frame is encoded in full before the first byte is written, so a size
/// error never leaves a partial frame on the wire.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(HEADER_SIZE + MAX_PAYLOAD + TRAILER_SIZE),
            config,
        }
    }

    /// Encode and send one frame.
    pub fn send(&mut self, kind: u8, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(kind, payload, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        trace!(kind, len = payload.len(), "frame sent");

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::codec::decode_frame;

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(0x01, &[1]).unwrap();

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let frame = decode_frame(&mut wire, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame.kind, 0x01);
        assert_eq!(frame.payload.as_ref(), &[1]);
    }

    #[test]
    fn rejects_payload_over_config_limit_without_writing() {
        let config = FrameConfig {
            max_payload_size: 8,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), config);

        let err = writer.send(0x10, &[0u8; 9]).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 8 }));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn rejects_payload_over_protocol_limit() {
        let config = FrameConfig {
            max_payload_size: 4096,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), config);

        let err = writer.send(0x10, &[0u8; MAX_PAYLOAD + 1]).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { max: MAX_PAYLOAD, .. }));
    }

    #[test]
    fn handles_short_and_interrupted_writes() {
        let sink = FlakySink {
            written: Arc::new(Mutex::new(Vec::new())),
            calls: 0,
        };
        let written = Arc::clone(&sink.written);
        let mut writer = FrameWriter::new(sink);

        writer.send(0x1F, &[1, 2, 3, 4]).unwrap();

        let mut wire = BytesMut::from(written.lock().unwrap().as_slice());
        let frame = decode_frame(&mut wire, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn zero_length_write_reports_closed() {
        let mut writer = FrameWriter::new(ClosedSink);
        assert!(matches!(
            writer.send(0x03, &[]),
            Err(FrameError::ConnectionClosed)
        ));
    }

    struct FlakySink {
        written: Arc<Mutex<Vec<u8>>>,
        calls: usize,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.calls += 1;
            match self.calls % 2 {
                1 => Err(std::io::Error::from(ErrorKind::Interrupted)),
                _ => {
                    self.written.lock().unwrap().push(buf[0]);
                    Ok(1)
                }
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ClosedSink;

    impl Write for ClosedSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
