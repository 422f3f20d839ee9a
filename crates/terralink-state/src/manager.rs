use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use terralink_link::{StateFrame, TouchEvent, TouchKind, MAX_TERRARIUMS};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::StateConfig;
use crate::error::{ProfileError, Result};
use crate::profile::{built_in_slots, load_directory, ProfileSource, Slot};

const FEED_THRESHOLD_PCT: f32 = 55.0;
const FEED_HYDRATION_PCT: f32 = 90.0;
const FEED_STRESS_RELIEF: f32 = 6.0;
const FEED_HEALTH_BONUS: f32 = 3.5;
const TOUCH_STRESS_CEILING: f32 = 80.0;
const PRESS_ACTIVITY_BOOST: f32 = 0.1;
const MOVE_ACTIVITY_BOOST: f32 = 0.02;

struct Inner {
    slots: Vec<Slot>,
    profile_dir: Option<PathBuf>,
}

/// Owner of the terrarium slots.
///
/// Every operation takes the slot lock for its whole duration, so the
/// update tick, touch handling and snapshot building never interleave.
pub struct StateManager {
    config: StateConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl StateManager {
    /// Create a manager and populate it with [`StateManager::init`].
    pub fn new(config: StateConfig, clock: Arc<dyn Clock>) -> Self {
        let manager = Self {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                profile_dir: config.profile_dir.clone(),
            }),
            config,
            clock,
        };
        manager.init();
        manager
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Reset every slot from the configured profile sources.
    ///
    /// Falls back to the built-in profiles when no directory yields usable
    /// profiles. Calling it again discards all simulated progress.
    pub fn init(&self) {
        self.inner.lock().profile_dir = self.config.profile_dir.clone();
        if let Err(err) = self.reload_profiles(None) {
            warn!(error = %err, "profile load failed; using built-in profiles");
            let slots = built_in_slots(self.config.slot_count, self.epoch_seconds());
            self.inner.lock().slots = slots;
        }
        info!(terrariums = self.slot_count(), "state manager initialized");
    }

    /// Replace the slots from a profile source.
    ///
    /// Tries `path`, else the remembered directory, then the fallback
    /// directory, then the built-in table. A directory that loads becomes the
    /// remembered one. Returns an error, keeping the current slots, when a
    /// directory held profile files but none could be used.
    pub fn reload_profiles(&self, path: Option<&Path>) -> Result<ProfileSource> {
        let now_epoch = self.epoch_seconds();
        let preferred = match path {
            Some(path) if !path.as_os_str().is_empty() => Some(path.to_path_buf()),
            _ => self.inner.lock().profile_dir.clone(),
        };

        let mut first_error: Option<ProfileError> = None;
        let candidates = [preferred, self.config.fallback_profile_dir.clone()];
        for dir in candidates.into_iter().flatten() {
            match load_directory(&dir, now_epoch) {
                Ok(Some(slots)) => {
                    let count = slots.len();
                    info!(dir = %dir.display(), count, "profiles loaded");
                    let mut inner = self.inner.lock();
                    inner.slots = slots;
                    inner.profile_dir = Some(dir.clone());
                    return Ok(ProfileSource::Directory { path: dir, count });
                }
                Ok(None) => debug!(dir = %dir.display(), "no profiles found"),
                Err(err) => {
                    warn!(error = %err, "profile directory unusable");
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        let slots = built_in_slots(self.config.slot_count, now_epoch);
        let count = slots.len();
        warn!(count, "falling back to built-in profiles");
        self.inner.lock().slots = slots;
        Ok(ProfileSource::BuiltIn { count })
    }

    /// Advance the simulation by `delta_seconds` at the clock's current time.
    pub fn update(&self, delta_seconds: f32) {
        self.update_at(delta_seconds, self.clock.elapsed());
    }

    /// Advance the simulation by `delta_seconds` with `now` as the absolute time.
    ///
    /// The environment waveform depends only on `now`; the metric trends are
    /// integrated over `delta_seconds`.
    pub fn update_at(&self, delta_seconds: f32, now: Duration) {
        let time_s = now.as_secs_f32();
        let epoch = self.epoch_at(now);
        let bounds = self.config.bounds;
        let mut inner = self.inner.lock();

        for slot in inner.slots.iter_mut() {
            let wave = (time_s * slot.cycle_speed + slot.phase_offset).sin();
            let wave2 = (time_s * slot.cycle_speed * 0.7 + slot.phase_offset * 1.2).cos();
            let targets = slot.targets;

            slot.current.temp_day_c = targets.temp_day_c + wave * 1.8;
            slot.current.temp_night_c = targets.temp_night_c + wave;
            slot.current.humidity_day_pct = (targets.humidity_day_pct + wave2 * 6.0).clamp(30.0, 95.0);
            slot.current.humidity_night_pct =
                (targets.humidity_night_pct + wave2 * 4.0).clamp(40.0, 98.0);
            slot.current.lux_day = (targets.lux_day + wave * 80.0).clamp(50.0, 900.0);
            slot.current.lux_night = (targets.lux_night + (wave2 + 1.0) * 2.0).clamp(0.0, 20.0);

            let pulse = (time_s * slot.cycle_speed * 1.3 + slot.phase_offset).sin();
            slot.activity_score = bounds.activity.clamp(0.45 + 0.4 * pulse);

            let stress_trend = (30.0 - slot.activity_score * 45.0 + slot.enrichment_factor * 5.0) * 0.015;
            slot.stress_pct = bounds.stress.clamp(slot.stress_pct + stress_trend * delta_seconds);

            let drain = slot.enrichment_factor * (0.20 + 0.05 * (1.0 - slot.activity_score));
            slot.hydration_pct = bounds.hydration.clamp(slot.hydration_pct - drain * delta_seconds);

            if slot.hydration_pct < FEED_THRESHOLD_PCT {
                slot.hydration_pct = FEED_HYDRATION_PCT;
                slot.last_feeding_timestamp = epoch;
                slot.stress_pct = bounds.stress.clamp(slot.stress_pct - FEED_STRESS_RELIEF);
                slot.health_pct = (slot.health_pct + FEED_HEALTH_BONUS).min(100.0);
                debug!(id = slot.id, "terrarium fed");
            }

            let hydration_penalty = (70.0 - slot.hydration_pct) * 0.01;
            let stress_penalty = slot.stress_pct * 0.006;
            slot.health_pct = bounds
                .health
                .clamp(slot.health_pct - (hydration_penalty + stress_penalty) * delta_seconds);
        }
    }

    /// Perturb the slot under the touch point.
    ///
    /// The panel is split into equal vertical zones, one per slot. A press
    /// relieves stress and raises activity; a move raises activity slightly.
    pub fn apply_touch(&self, event: &TouchEvent) {
        let mut inner = self.inner.lock();
        let count = inner.slots.len();
        if count == 0 {
            return;
        }

        let zone = usize::from(self.config.display_width) / count;
        let index = match zone {
            0 => 0,
            zone => (usize::from(event.x) / zone).min(count - 1),
        };
        let activity = self.config.bounds.activity;
        let slot = &mut inner.slots[index];

        match event.kind {
            TouchKind::Down => {
                slot.stress_pct =
                    (slot.stress_pct - self.config.touch_relief).clamp(0.0, TOUCH_STRESS_CEILING);
                slot.activity_score = activity.clamp(slot.activity_score + PRESS_ACTIVITY_BOOST);
            }
            TouchKind::Move => {
                slot.activity_score = activity.clamp(slot.activity_score + MOVE_ACTIVITY_BOOST);
            }
            _ => return,
        }
        debug!(slot = index, x = event.x, kind = ?event.kind, "touch applied");
    }

    /// Fill `out` with the current epoch and one record per slot.
    pub fn build_frame(&self, out: &mut StateFrame) {
        let epoch = self.epoch_seconds();
        let inner = self.inner.lock();
        out.epoch = epoch;
        out.terrariums.clear();
        out.terrariums
            .extend(inner.slots.iter().take(MAX_TERRARIUMS).map(Slot::to_snapshot));
    }

    /// Build a fresh snapshot.
    pub fn snapshot(&self) -> StateFrame {
        let mut frame = StateFrame::default();
        self.build_frame(&mut frame);
        frame
    }

    /// Copy of the live slots.
    pub fn slots(&self) -> Vec<Slot> {
        self.inner.lock().slots.clone()
    }

    pub fn slot_count(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Directory used by argument-less reloads.
    pub fn profile_dir(&self) -> Option<PathBuf> {
        self.inner.lock().profile_dir.clone()
    }

    /// Seconds since the Unix epoch, as reported in snapshots.
    pub fn epoch_seconds(&self) -> u32 {
        self.epoch_at(self.clock.elapsed())
    }

    fn epoch_at(&self, now: Duration) -> u32 {
        let secs = u32::try_from(now.as_secs()).unwrap_or(u32::MAX);
        self.config.base_epoch.saturating_add(secs)
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("config", &self.config)
            .field("slots", &self.slot_count())
            .finish()
    }
}
