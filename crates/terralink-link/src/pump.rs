use std::sync::Arc;
use std::thread::JoinHandle;

use terralink_frame::{FrameError, FrameReader, FrameStats};
use terralink_transport::TimeoutRead;
use tracing::{debug, error, info, warn};

use crate::error::{LinkError, Result};
use crate::kind::kind_name;
use crate::session::LinkSession;

/// Why the receive pump stopped, with the decoder counters at that point.
#[derive(Debug)]
pub struct PumpExit {
    pub error: FrameError,
    pub stats: FrameStats,
}

/// Decode frames and dispatch them to `session` until the transport fails.
///
/// Framing problems are absorbed by the reader; dispatch errors are logged
/// and the loop continues. Returns only on end-of-stream or a hard read
/// error, after marking the session closed.
pub fn run_receive_pump<T: TimeoutRead>(reader: &mut FrameReader<T>, session: &LinkSession) -> PumpExit {
    loop {
        match reader.read_frame() {
            Ok(frame) => {
                debug!(kind = kind_name(frame.kind), len = frame.payload.len(), "frame received");
                if let Err(err) = session.handle_frame(&frame) {
                    warn!(kind = kind_name(frame.kind), error = %err, "frame handling failed");
                }
            }
            Err(err) => {
                session.mark_closed();
                let stats = reader.stats();
                match &err {
                    FrameError::ConnectionClosed => info!(?stats, "link closed by peer"),
                    other => error!(error = %other, ?stats, "link read failed"),
                }
                return PumpExit { error: err, stats };
            }
        }
    }
}

/// Run the receive pump on a dedicated `link-rx` thread.
pub fn spawn_receive_pump<T>(mut reader: FrameReader<T>, session: Arc<LinkSession>) -> Result<JoinHandle<PumpExit>>
where
    T: TimeoutRead + Send + 'static,
{
    std::thread::Builder::new()
        .name("link-rx".into())
        .spawn(move || run_receive_pump(&mut reader, &session))
        .map_err(LinkError::Spawn)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};
    use terralink_frame::{encode_frame, FrameConfig, FRAME_START};

    use super::*;
    use crate::kind;
    use crate::LinkConfig;

    #[test]
    fn dispatches_until_end_of_stream() {
        let mut wire = BytesMut::new();
        wire.put_slice(&[0x00, 0x11]);
        encode_frame(kind::HELLO_ACK, &[1, 0], &mut wire).unwrap();
        wire.put_slice(&[FRAME_START, kind::DISPLAY_READY, 0x05]);
        encode_frame(kind::DISPLAY_READY, &[0, 4, 88, 2, 1], &mut wire).unwrap();

        let session = LinkSession::new(std::io::sink(), FrameConfig::default(), LinkConfig::default());
        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));

        let exit = run_receive_pump(&mut reader, &session);

        assert!(matches!(exit.error, FrameError::ConnectionClosed));
        assert_eq!(exit.stats.frames, 2);
        assert!(session.is_handshake_done());
        assert!(session.is_display_ready());
        assert!(session.is_closed());
    }
}
