use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use terralink_link::{
    spawn_receive_pump, spawn_watchdog, Command, CommandOutcome, CommandStatus, LinkError,
    LinkSession, PumpExit, CMD_RELOAD_PROFILES,
};
use terralink_state::{Clock, ProfileError, ProfileSource, StateManager};
use terralink_transport::LinkStream;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::error::{AppError, Result};

/// Entry point for running the core side of a display link.
pub struct CoreApp;

impl CoreApp {
    /// Wire a state manager and link session to `stream` and start every task.
    ///
    /// Spawns the receive pump, the one-shot handshake task, the simulation
    /// tick, the periodic publisher and, when configured, the watchdog.
    /// Periodic tasks stop as soon as the link is marked closed.
    pub fn start(stream: LinkStream, config: CoreConfig, clock: Arc<dyn Clock>) -> Result<CoreHandle> {
        let state = Arc::new(StateManager::new(config.state.clone(), clock));
        let control = stream.try_clone()?;
        let (session, reader) = LinkSession::open(stream, config.frame.clone(), config.link.clone())?;
        register_callbacks(&session, &state);

        let pump = spawn_receive_pump(reader, Arc::clone(&session))?;
        let mut tasks = Vec::new();

        tasks.push(spawn_task("core-handshake", {
            let session = Arc::clone(&session);
            let state = Arc::clone(&state);
            let retry = config.handshake_retry;
            let timeout = config.handshake_timeout;
            move || handshake_task(&session, &state, retry, timeout)
        })?);

        tasks.push(spawn_task("core-state-update", {
            let session = Arc::clone(&session);
            let state = Arc::clone(&state);
            let period = config.update_period;
            move || {
                let step = period.as_secs_f32();
                loop {
                    state.update(step);
                    if !session.sleep(period) {
                        break;
                    }
                }
            }
        })?);

        tasks.push(spawn_task("core-state-publish", {
            let session = Arc::clone(&session);
            let state = Arc::clone(&state);
            let period = config.publish_interval;
            move || {
                loop {
                    if session.is_display_ready() {
                        publish(&session, &state);
                    }
                    if !session.sleep(period) {
                        break;
                    }
                }
            }
        })?);

        if let Some(watchdog) = config.link.watchdog.clone() {
            tasks.push(spawn_watchdog(Arc::clone(&session), watchdog)?);
        }

        info!(terrariums = state.slot_count(), "core started");
        Ok(CoreHandle {
            session,
            state,
            control,
            pump,
            tasks,
        })
    }
}

/// Handle to a running core.
pub struct CoreHandle {
    session: Arc<LinkSession>,
    state: Arc<StateManager>,
    control: LinkStream,
    pump: JoinHandle<PumpExit>,
    tasks: Vec<JoinHandle<()>>,
}

impl CoreHandle {
    pub fn session(&self) -> &Arc<LinkSession> {
        &self.session
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    /// Close the link; every task winds down shortly after.
    pub fn shutdown(&self) {
        self.session.mark_closed();
        if let Err(err) = self.control.shutdown() {
            debug!(error = %err, "link already shut down");
        }
    }

    /// Wait for the receive pump to end, then for the remaining tasks.
    pub fn join(self) -> Result<PumpExit> {
        let exit = self
            .pump
            .join()
            .map_err(|_| AppError::TaskPanicked("link-rx"))?;
        for task in self.tasks {
            if task.join().is_err() {
                warn!("core task panicked during shutdown");
            }
        }
        Ok(exit)
    }
}

impl std::fmt::Debug for CoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreHandle")
            .field("session", &self.session)
            .field("state", &self.state)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

fn spawn_task(name: &'static str, task: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(name.into())
        .spawn(task)
        .map_err(|source| AppError::Spawn { name, source })
}

fn register_callbacks(session: &LinkSession, state: &Arc<StateManager>) {
    let ready_state = Arc::clone(state);
    session.on_display_ready(move |session, _info| publish(session, &ready_state));

    let request_state = Arc::clone(state);
    session.on_request_state(move |session| publish(session, &request_state));

    let touch_state = Arc::clone(state);
    session.on_touch(move |_, event| touch_state.apply_touch(event));

    let command_state = Arc::clone(state);
    session.on_command(move |session, command| handle_command(session, &command_state, command));
}

fn handshake_task(session: &LinkSession, state: &StateManager, retry: Duration, timeout: Duration) {
    while !session.is_handshake_done() {
        if let Err(err) = session.send_hello() {
            warn!(error = %err, "failed to send HELLO");
        }
        if !session.sleep(retry) {
            return;
        }
    }
    info!(peer_version = session.peer_protocol_version(), "handshake complete");

    if !session.wait_for_display_ready(timeout) {
        if session.is_closed() {
            return;
        }
        warn!(timeout_ms = timeout.as_millis() as u64, "display ready timeout");
    }
    publish(session, state);
}

/// Build a snapshot and offer it to the display.
pub fn publish(session: &LinkSession, state: &StateManager) {
    let frame = state.snapshot();
    match session.send_state(&frame) {
        Ok(()) => debug!(epoch = frame.epoch, terrariums = frame.terrariums.len(), "state published"),
        Err(LinkError::DisplayNotReady) => debug!("state not published; display not ready"),
        Err(err) => warn!(error = %err, "failed to send state frame"),
    }
}

/// Run one display command against the state manager.
pub fn handle_command(session: &LinkSession, state: &StateManager, command: &Command) -> CommandOutcome {
    let status = match command.opcode {
        CMD_RELOAD_PROFILES => {
            let status = reload_status(state.reload_profiles(command.argument().map(Path::new)));
            if matches!(status, CommandStatus::Ok | CommandStatus::NotFound) {
                publish(session, state);
            }
            status
        }
        opcode => {
            warn!(opcode, "unhandled command opcode");
            CommandStatus::NotSupported
        }
    };
    CommandOutcome::new(status, state.slot_count())
}

fn reload_status(result: terralink_state::Result<ProfileSource>) -> CommandStatus {
    match result {
        Ok(ProfileSource::Directory { .. }) => CommandStatus::Ok,
        Ok(ProfileSource::BuiltIn { .. }) => CommandStatus::NotFound,
        Err(ProfileError::NoUsableProfiles { .. }) => CommandStatus::InvalidState,
        Err(err) => {
            warn!(error = %err, "profile reload failed");
            CommandStatus::Fail
        }
    }
}
