#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use terralink::frame::FrameError;
use terralink::link::{Command, CommandAck, CommandStatus, TouchEvent, TouchKind, CMD_RELOAD_PROFILES};
use terralink::state::ManualClock;
use terralink::transport::LinkStream;
use terralink::{CoreApp, CoreConfig, CoreHandle, DisplayConfig, DisplayEvent, DisplayPeer};

const IDLE: Duration = Duration::from_secs(3600);

fn quiet_config() -> CoreConfig {
    CoreConfig {
        handshake_retry: Duration::from_millis(20),
        handshake_timeout: Duration::from_secs(2),
        update_period: IDLE,
        publish_interval: IDLE,
        ..CoreConfig::default()
    }
}

fn start(config: CoreConfig) -> (CoreHandle, DisplayPeer) {
    let (core, display) = LinkStream::pair().expect("stream pair");
    let handle = CoreApp::start(core, config, Arc::new(ManualClock::default())).expect("core should start");
    wait_for_first_update(&handle);
    let peer = DisplayPeer::new(display, DisplayConfig::default()).expect("display peer");
    (handle, peer)
}

/// With a one-hour step every slot drains below the feeding threshold, so
/// the first update stamps the current epoch as the feeding time.
fn wait_for_first_update(handle: &CoreHandle) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let epoch = handle.state().epoch_seconds();
        if handle
            .state()
            .slots()
            .iter()
            .all(|slot| slot.last_feeding_timestamp == epoch)
        {
            return;
        }
        assert!(Instant::now() < deadline, "first update never ran");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn recv_ack(peer: &mut DisplayPeer) -> CommandAck {
    loop {
        match peer.recv().expect("event") {
            DisplayEvent::CommandAck(ack) => return ack,
            DisplayEvent::State(_) => continue,
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

fn stop(handle: CoreHandle) {
    handle.shutdown();
    let exit = handle.join().expect("core tasks should join");
    assert!(matches!(exit.error, FrameError::ConnectionClosed));
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "terralink-core-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

#[test]
fn display_receives_built_in_state_after_handshake() {
    let (handle, mut peer) = start(quiet_config());

    peer.handshake().expect("handshake");
    let state = peer.recv_state().expect("first snapshot");

    assert!(handle.session().wait_for_display_ready(Duration::from_secs(2)));
    assert_eq!(state.terrariums.len(), 3);
    assert_eq!(state.terrariums[0].scientific_name, "Python regius");
    assert_eq!(state.terrariums[1].scientific_name, "Pogona vitticeps");
    assert_eq!(state.epoch, 1_700_000_000);

    stop(handle);
}

#[test]
fn first_update_runs_before_the_first_period_elapses() {
    let (core, _display) = LinkStream::pair().expect("stream pair");
    let handle = CoreApp::start(core, quiet_config(), Arc::new(ManualClock::default())).expect("core should start");

    wait_for_first_update(&handle);
    assert!(handle.state().slots().iter().all(|slot| slot.hydration_pct == 90.0));

    handle.shutdown();
    handle.join().expect("core tasks should join");
}

#[test]
fn touch_in_first_zone_relieves_stress() {
    let (handle, mut peer) = start(quiet_config());
    peer.handshake().expect("handshake");
    peer.recv_state().expect("first snapshot");

    let before = handle.state().slots()[0].stress_pct;
    peer.send_touch(&TouchEvent::new(TouchKind::Down, 100, 300)).expect("touch");

    let deadline = Instant::now() + Duration::from_secs(2);
    while handle.state().slots()[0].stress_pct == before {
        assert!(Instant::now() < deadline, "touch was never applied");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(handle.state().slots()[0].stress_pct, before - 5.0);

    stop(handle);
}

#[test]
fn reload_without_profile_directory_acks_not_found() {
    let (handle, mut peer) = start(quiet_config());
    peer.handshake().expect("handshake");

    peer.send_command(&Command::new(CMD_RELOAD_PROFILES, None)).expect("command");
    let ack = recv_ack(&mut peer);

    assert_eq!(ack.opcode, CMD_RELOAD_PROFILES);
    assert_eq!(ack.status, CommandStatus::NotFound);
    assert_eq!(ack.terrarium_count, 3);

    stop(handle);
}

#[test]
fn reload_from_directory_replaces_slots_and_republishes() {
    let dir = unique_temp_dir("reload");
    std::fs::write(
        dir.join("gecko.json"),
        r#"{
            "scientific_name": "Rhacodactylus leachianus",
            "common_name": "New Caledonian giant gecko",
            "environment": {
                "temp_day_c": 26.0, "temp_night_c": 20.0,
                "humidity_day_pct": 70.0, "humidity_night_pct": 80.0,
                "lux_day": 200.0, "lux_night": 2.0
            }
        }"#,
    )
    .expect("profile should be writable");

    let (handle, mut peer) = start(quiet_config());
    peer.handshake().expect("handshake");
    peer.recv_state().expect("first snapshot");

    let arg = dir.to_string_lossy().into_owned();
    peer.send_command(&Command::new(CMD_RELOAD_PROFILES, Some(arg.as_str())))
        .expect("command");

    let state = loop {
        let state = peer.recv_state().expect("snapshot");
        if state.terrariums.len() == 1 {
            break state;
        }
    };
    assert_eq!(state.terrariums[0].common_name, "New Caledonian giant gecko");

    let ack = recv_ack(&mut peer);
    assert_eq!(ack.status, CommandStatus::Ok);
    assert_eq!(ack.terrarium_count, 1);
    assert_eq!(handle.state().profile_dir(), Some(dir.clone()));

    stop(handle);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn delta_mode_keeps_display_in_sync() {
    let mut config = quiet_config();
    config.link.delta_updates = true;
    let (handle, mut peer) = start(config);
    peer.handshake().expect("handshake");
    peer.recv_state().expect("first snapshot");

    let before = handle.state().slots()[2].stress_pct;
    peer.send_touch(&TouchEvent::new(TouchKind::Down, 900, 300)).expect("touch");
    let deadline = Instant::now() + Duration::from_secs(2);
    while handle.state().slots()[2].stress_pct == before {
        assert!(Instant::now() < deadline, "touch was never applied");
        std::thread::sleep(Duration::from_millis(5));
    }

    let expected = handle.state().slots()[2].stress_pct;
    peer.request_state().expect("request");
    loop {
        let state = peer.recv_state().expect("snapshot");
        if state.terrariums[2].stress_pct == expected {
            break;
        }
        assert!(Instant::now() < deadline, "display never caught up");
    }

    stop(handle);
}

#[test]
fn display_hangup_ends_the_core() {
    let (handle, mut peer) = start(quiet_config());
    peer.handshake().expect("handshake");

    peer.close().expect("close");
    let exit = handle.join().expect("core tasks should join");
    assert!(matches!(exit.error, FrameError::ConnectionClosed));
}
