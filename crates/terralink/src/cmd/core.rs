use std::sync::Arc;

use terralink::{CoreApp, CoreConfig};
use terralink_frame::FrameError;
use terralink_link::{LinkSession, WatchdogConfig};
use terralink_state::SystemClock;
use terralink_transport::{LinkListener, LinkStream};
use tracing::{debug, info};

use crate::cmd::{parse_duration, CoreArgs};
use crate::exit::{app_error, frame_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: CoreArgs) -> CliResult<i32> {
    let config = build_config(&args)?;

    let listener = LinkListener::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    info!(path = %listener.path().display(), "waiting for display");

    let stream = listener
        .accept()
        .map_err(|err| transport_error("accept failed", err))?;
    info!(peer_pid = ?stream.peer_pid(), "display connected");

    let control = stream
        .try_clone()
        .map_err(|err| transport_error("stream clone failed", err))?;
    let handle = CoreApp::start(stream, config, Arc::new(SystemClock::new()))
        .map_err(|err| app_error("core start failed", err))?;
    install_ctrlc_handler(Arc::clone(handle.session()), control)?;

    let exit = handle.join().map_err(|err| app_error("core stopped", err))?;
    info!(
        frames = exit.stats.frames,
        skipped_bytes = exit.stats.skipped_bytes,
        checksum_errors = exit.stats.checksum_errors,
        "link closed"
    );

    match exit.error {
        FrameError::ConnectionClosed => Ok(SUCCESS),
        err => Err(frame_error("link failed", err)),
    }
}

fn build_config(args: &CoreArgs) -> CliResult<CoreConfig> {
    let mut config = match &args.config {
        Some(path) => CoreConfig::from_file(path).map_err(|err| app_error("config", err))?,
        None => CoreConfig::default(),
    };

    if let Some(dir) = &args.profiles {
        config.state.profile_dir = Some(dir.clone());
    }
    if let Some(interval) = &args.publish_interval {
        config.publish_interval = parse_duration(interval)?;
    }
    if args.delta {
        config.link.delta_updates = true;
    }
    if args.watchdog && config.link.watchdog.is_none() {
        config.link.watchdog = Some(WatchdogConfig::default());
    }

    debug!(?config, "core configuration");
    Ok(config)
}

fn install_ctrlc_handler(session: Arc<LinkSession>, control: LinkStream) -> CliResult<()> {
    ctrlc::set_handler(move || {
        session.mark_closed();
        let _ = control.shutdown();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
