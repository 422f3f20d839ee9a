use std::time::{Duration, Instant};

use terralink::{AppError, DisplayConfig, DisplayEvent, DisplayPeer};
use terralink_link::{Command, TouchEvent, TouchKind, CMD_RELOAD_PROFILES};
use terralink_transport::TransportError;
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, DisplayArgs};
use crate::exit::{app_error, CliResult, SUCCESS};
use crate::output::{print_command_ack, print_state, OutputFormat};

const CONNECT_RETRY: Duration = Duration::from_millis(100);

pub fn run(args: DisplayArgs, format: OutputFormat) -> CliResult<i32> {
    let config = DisplayConfig {
        width: args.width,
        height: args.height,
        ..DisplayConfig::default()
    };
    let timeout = parse_duration(&args.connect_timeout)?;
    let mut peer = connect_with_retry(&args, config, timeout)?;

    peer.handshake().map_err(|err| app_error("handshake failed", err))?;
    info!("handshake complete; display ready announced");

    if let Some(x) = args.touch {
        let event = TouchEvent::new(TouchKind::Down, x, args.height / 2);
        peer.send_touch(&event)
            .map_err(|err| app_error("touch failed", err))?;
    }
    if let Some(dir) = &args.reload {
        let argument = (!dir.is_empty()).then_some(dir.as_str());
        peer.send_command(&Command::new(CMD_RELOAD_PROFILES, argument))
            .map_err(|err| app_error("command failed", err))?;
    }

    let mut printed = 0usize;
    loop {
        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
        match peer.recv() {
            Ok(DisplayEvent::State(frame)) => {
                print_state(&frame, "core", format);
                printed = printed.saturating_add(1);
            }
            Ok(DisplayEvent::CommandAck(ack)) => print_command_ack(&ack, format),
            Ok(DisplayEvent::Error(message)) => warn!(%message, "core reported an error"),
            Ok(DisplayEvent::Pong(_)) => debug!("pong"),
            Err(AppError::Link(terralink_link::LinkError::Frame(
                terralink_frame::FrameError::ConnectionClosed,
            ))) => {
                info!("core closed the link");
                break;
            }
            Err(err) => return Err(app_error("receive failed", err)),
        }
    }

    let _ = peer.close();
    Ok(SUCCESS)
}

fn connect_with_retry(args: &DisplayArgs, config: DisplayConfig, timeout: Duration) -> CliResult<DisplayPeer> {
    let deadline = Instant::now() + timeout;
    loop {
        match DisplayPeer::connect(&args.path, config.clone()) {
            Ok(peer) => return Ok(peer),
            Err(AppError::Transport(TransportError::Connect { .. })) if Instant::now() < deadline => {
                std::thread::sleep(CONNECT_RETRY);
            }
            Err(err) => return Err(app_error("connect failed", err)),
        }
    }
}
