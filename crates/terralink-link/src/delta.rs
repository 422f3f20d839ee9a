//! STATE_DELTA encoding: only the fields that moved since the last frame.
//!
//! Payload: `{epoch: u32, count: u8, changed: u8}` followed by, for each
//! changed terrarium, `{id: u8, mask: u16}` and the changed fields in mask
//! bit order. Names travel as full 32-byte buffers, everything else as four
//! bytes.

use std::time::{Duration, Instant};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{LinkError, Result};
use crate::messages::{get_name, put_name, StateFrame, TerrariumSnapshot, NAME_LEN};

pub const FIELD_SCIENTIFIC_NAME: u16 = 1 << 0;
pub const FIELD_COMMON_NAME: u16 = 1 << 1;
pub const FIELD_TEMP_DAY: u16 = 1 << 2;
pub const FIELD_TEMP_NIGHT: u16 = 1 << 3;
pub const FIELD_HUMIDITY_DAY: u16 = 1 << 4;
pub const FIELD_HUMIDITY_NIGHT: u16 = 1 << 5;
pub const FIELD_LUX_DAY: u16 = 1 << 6;
pub const FIELD_LUX_NIGHT: u16 = 1 << 7;
pub const FIELD_HYDRATION: u16 = 1 << 8;
pub const FIELD_STRESS: u16 = 1 << 9;
pub const FIELD_HEALTH: u16 = 1 << 10;
pub const FIELD_LAST_FEEDING: u16 = 1 << 11;
pub const FIELD_ACTIVITY: u16 = 1 << 12;

/// `{epoch: u32, count: u8, changed: u8}`.
pub const DELTA_HEADER_SIZE: usize = 6;

/// Float fields closer than this are treated as unchanged.
pub const FLOAT_EPSILON: f32 = 0.0005;

/// A full frame is forced after this many non-empty deltas in a row.
pub const MAX_DELTAS_BETWEEN_FULL: u32 = 20;

/// A full frame is forced when the last one is older than this.
pub const FULL_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

type FloatField = (u16, fn(&TerrariumSnapshot) -> f32, fn(&mut TerrariumSnapshot, f32));

const FLOAT_FIELDS: [FloatField; 9] = [
    (FIELD_TEMP_DAY, |t| t.temp_day_c, |t, v| t.temp_day_c = v),
    (FIELD_TEMP_NIGHT, |t| t.temp_night_c, |t, v| t.temp_night_c = v),
    (FIELD_HUMIDITY_DAY, |t| t.humidity_day_pct, |t, v| t.humidity_day_pct = v),
    (FIELD_HUMIDITY_NIGHT, |t| t.humidity_night_pct, |t, v| t.humidity_night_pct = v),
    (FIELD_LUX_DAY, |t| t.lux_day, |t, v| t.lux_day = v),
    (FIELD_LUX_NIGHT, |t| t.lux_night, |t, v| t.lux_night = v),
    (FIELD_HYDRATION, |t| t.hydration_pct, |t, v| t.hydration_pct = v),
    (FIELD_STRESS, |t| t.stress_pct, |t, v| t.stress_pct = v),
    (FIELD_HEALTH, |t| t.health_pct, |t, v| t.health_pct = v),
];

fn changed_fields(prev: &TerrariumSnapshot, next: &TerrariumSnapshot) -> u16 {
    let mut mask = 0;
    if prev.scientific_name != next.scientific_name {
        mask |= FIELD_SCIENTIFIC_NAME;
    }
    if prev.common_name != next.common_name {
        mask |= FIELD_COMMON_NAME;
    }
    for (bit, get, _) in FLOAT_FIELDS {
        if (get(prev) - get(next)).abs() > FLOAT_EPSILON {
            mask |= bit;
        }
    }
    if prev.last_feeding_timestamp != next.last_feeding_timestamp {
        mask |= FIELD_LAST_FEEDING;
    }
    if (prev.activity_score - next.activity_score).abs() > FLOAT_EPSILON {
        mask |= FIELD_ACTIVITY;
    }
    mask
}

/// Encoded STATE_DELTA payload and the number of terrariums it touches.
#[derive(Debug, Clone)]
pub struct Delta {
    pub payload: BytesMut,
    pub changed: u8,
}

/// Encode `next` relative to `prev`.
///
/// Returns `None` when `prev` cannot serve as a baseline: different
/// terrarium count, an id missing from `prev`, or an epoch going backwards.
pub fn encode_delta(prev: &StateFrame, next: &StateFrame) -> Option<Delta> {
    let count = next.wire_count();
    if prev.terrariums.len() != count || next.epoch < prev.epoch {
        return None;
    }

    let mut body = BytesMut::new();
    let mut changed = 0u8;
    for terrarium in &next.terrariums[..count] {
        let baseline = prev.terrariums.iter().find(|t| t.id == terrarium.id)?;
        let mask = changed_fields(baseline, terrarium);
        if mask == 0 {
            continue;
        }
        changed += 1;
        body.put_u8(terrarium.id);
        body.put_u16_le(mask);
        if mask & FIELD_SCIENTIFIC_NAME != 0 {
            put_name(&mut body, &terrarium.scientific_name);
        }
        if mask & FIELD_COMMON_NAME != 0 {
            put_name(&mut body, &terrarium.common_name);
        }
        for (bit, get, _) in FLOAT_FIELDS {
            if mask & bit != 0 {
                body.put_f32_le(get(terrarium));
            }
        }
        if mask & FIELD_LAST_FEEDING != 0 {
            body.put_u32_le(terrarium.last_feeding_timestamp);
        }
        if mask & FIELD_ACTIVITY != 0 {
            body.put_f32_le(terrarium.activity_score);
        }
    }

    let mut payload = BytesMut::with_capacity(DELTA_HEADER_SIZE + body.len());
    payload.put_u32_le(next.epoch);
    payload.put_u8(count as u8);
    payload.put_u8(changed);
    payload.extend_from_slice(&body);
    Some(Delta { payload, changed })
}

/// Apply a STATE_DELTA payload to the frame it was computed against.
pub fn apply_delta(base: &mut StateFrame, mut payload: &[u8]) -> Result<()> {
    if payload.len() < DELTA_HEADER_SIZE {
        return Err(LinkError::invalid("STATE_DELTA", "truncated header"));
    }
    let epoch = payload.get_u32_le();
    let count = payload.get_u8() as usize;
    let changed = payload.get_u8();
    if count != base.terrariums.len() {
        return Err(LinkError::invalid(
            "STATE_DELTA",
            format!("count {count} does not match baseline {}", base.terrariums.len()),
        ));
    }

    let truncated = || LinkError::invalid("STATE_DELTA", "truncated entry");
    for _ in 0..changed {
        if payload.len() < 3 {
            return Err(truncated());
        }
        let id = payload.get_u8();
        let mask = payload.get_u16_le();
        let needed = entry_len(mask);
        if payload.len() < needed {
            return Err(truncated());
        }
        let terrarium = base
            .terrariums
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| LinkError::invalid("STATE_DELTA", format!("unknown terrarium {id}")))?;

        if mask & FIELD_SCIENTIFIC_NAME != 0 {
            terrarium.scientific_name = get_name(&mut payload);
        }
        if mask & FIELD_COMMON_NAME != 0 {
            terrarium.common_name = get_name(&mut payload);
        }
        for (bit, _, set) in FLOAT_FIELDS {
            if mask & bit != 0 {
                set(terrarium, payload.get_f32_le());
            }
        }
        if mask & FIELD_LAST_FEEDING != 0 {
            terrarium.last_feeding_timestamp = payload.get_u32_le();
        }
        if mask & FIELD_ACTIVITY != 0 {
            terrarium.activity_score = payload.get_f32_le();
        }
    }

    base.epoch = epoch;
    Ok(())
}

fn entry_len(mask: u16) -> usize {
    let names = [FIELD_SCIENTIFIC_NAME, FIELD_COMMON_NAME]
        .iter()
        .filter(|bit| mask & **bit != 0)
        .count();
    let words = (mask & !(FIELD_SCIENTIFIC_NAME | FIELD_COMMON_NAME)).count_ones() as usize;
    names * NAME_LEN + words * 4
}

/// What the session should put on the wire for the next snapshot.
#[derive(Debug)]
pub(crate) enum Outgoing {
    Full,
    Delta(Delta),
}

/// Tracks the last frame the display received and when a full frame is due.
#[derive(Debug, Default)]
pub(crate) struct DeltaTracker {
    baseline: Option<StateFrame>,
    deltas_since_full: u32,
    last_full_at: Option<Instant>,
    force_full: bool,
}

impl DeltaTracker {
    /// Make the next snapshot a full frame.
    pub(crate) fn schedule_full(&mut self) {
        self.force_full = true;
    }

    pub(crate) fn plan(&self, frame: &StateFrame, now: Instant) -> Outgoing {
        let stale = self
            .last_full_at
            .is_none_or(|at| now.saturating_duration_since(at) >= FULL_REFRESH_INTERVAL);
        if self.force_full || stale || self.deltas_since_full >= MAX_DELTAS_BETWEEN_FULL {
            return Outgoing::Full;
        }
        match self.baseline.as_ref().and_then(|prev| encode_delta(prev, frame)) {
            Some(delta) => Outgoing::Delta(delta),
            None => Outgoing::Full,
        }
    }

    pub(crate) fn record_full(&mut self, frame: &StateFrame, now: Instant) {
        self.baseline = Some(frame.clone());
        self.deltas_since_full = 0;
        self.last_full_at = Some(now);
        self.force_full = false;
    }

    pub(crate) fn record_delta(&mut self, frame: &StateFrame, changed: u8) {
        self.baseline = Some(frame.clone());
        if changed > 0 {
            self.deltas_since_full += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(epoch: u32, stresses: &[f32]) -> StateFrame {
        StateFrame {
            epoch,
            terrariums: stresses
                .iter()
                .enumerate()
                .map(|(i, stress)| TerrariumSnapshot {
                    id: i as u8,
                    scientific_name: format!("Species {i}"),
                    common_name: format!("Common {i}"),
                    stress_pct: *stress,
                    health_pct: 90.0,
                    ..TerrariumSnapshot::default()
                })
                .collect(),
        }
    }

    #[test]
    fn unchanged_frame_has_no_entries() {
        let prev = frame(10, &[20.0, 30.0]);
        let delta = encode_delta(&prev, &frame(11, &[20.0, 30.0])).unwrap();

        assert_eq!(delta.changed, 0);
        assert_eq!(delta.payload.len(), DELTA_HEADER_SIZE);
        assert_eq!(&delta.payload[0..4], &11u32.to_le_bytes());
    }

    #[test]
    fn small_float_jitter_is_ignored() {
        let prev = frame(10, &[20.0]);
        let delta = encode_delta(&prev, &frame(10, &[20.0001])).unwrap();
        assert_eq!(delta.changed, 0);
    }

    #[test]
    fn changed_field_is_encoded_with_mask() {
        let prev = frame(10, &[20.0, 30.0]);
        let next = frame(11, &[20.0, 25.5]);
        let delta = encode_delta(&prev, &next).unwrap();

        assert_eq!(delta.changed, 1);
        let body = &delta.payload[DELTA_HEADER_SIZE..];
        assert_eq!(body[0], 1);
        assert_eq!(u16::from_le_bytes([body[1], body[2]]), FIELD_STRESS);
        assert_eq!(f32::from_le_bytes([body[3], body[4], body[5], body[6]]), 25.5);
        assert_eq!(body.len(), 7);
    }

    #[test]
    fn apply_reconstructs_next_frame() {
        let prev = frame(10, &[20.0, 30.0, 40.0]);
        let mut next = frame(12, &[21.0, 30.0, 12.0]);
        next.terrariums[2].common_name = "Renamed".into();
        next.terrariums[0].last_feeding_timestamp = 99;

        let delta = encode_delta(&prev, &next).unwrap();
        let mut rebuilt = prev.clone();
        apply_delta(&mut rebuilt, &delta.payload).unwrap();

        assert_eq!(rebuilt, next);
    }

    #[test]
    fn incompatible_baselines() {
        let prev = frame(10, &[20.0, 30.0]);
        assert!(encode_delta(&prev, &frame(11, &[20.0])).is_none());
        assert!(encode_delta(&prev, &frame(9, &[20.0, 30.0])).is_none());

        let mut renumbered = frame(11, &[20.0, 30.0]);
        renumbered.terrariums[1].id = 7;
        assert!(encode_delta(&prev, &renumbered).is_none());
    }

    #[test]
    fn apply_rejects_mismatched_or_truncated_payloads() {
        let prev = frame(10, &[20.0, 30.0]);
        let delta = encode_delta(&prev, &frame(11, &[1.0, 2.0])).unwrap();

        let mut wrong_count = frame(10, &[20.0]);
        assert!(apply_delta(&mut wrong_count, &delta.payload).is_err());

        let mut base = prev.clone();
        let cut = &delta.payload[..delta.payload.len() - 2];
        assert!(apply_delta(&mut base, cut).is_err());
    }

    #[test]
    fn tracker_starts_with_full_frame() {
        let tracker = DeltaTracker::default();
        let now = Instant::now();
        assert!(matches!(tracker.plan(&frame(1, &[1.0]), now), Outgoing::Full));
    }

    #[test]
    fn tracker_sends_deltas_after_full() {
        let mut tracker = DeltaTracker::default();
        let now = Instant::now();
        tracker.record_full(&frame(1, &[1.0]), now);

        assert!(matches!(
            tracker.plan(&frame(2, &[2.0]), now),
            Outgoing::Delta(_)
        ));
    }

    #[test]
    fn tracker_forces_full_after_delta_budget() {
        let mut tracker = DeltaTracker::default();
        let now = Instant::now();
        tracker.record_full(&frame(1, &[0.0]), now);

        for i in 0..MAX_DELTAS_BETWEEN_FULL {
            let next = frame(2 + i, &[i as f32 + 1.0]);
            match tracker.plan(&next, now) {
                Outgoing::Delta(delta) => tracker.record_delta(&next, delta.changed),
                Outgoing::Full => panic!("full frame before budget was spent"),
            }
        }

        assert!(matches!(
            tracker.plan(&frame(100, &[500.0]), now),
            Outgoing::Full
        ));
    }

    #[test]
    fn tracker_forces_full_when_stale_or_scheduled() {
        let mut tracker = DeltaTracker::default();
        let start = Instant::now();
        tracker.record_full(&frame(1, &[1.0]), start);

        let later = start + FULL_REFRESH_INTERVAL;
        assert!(matches!(tracker.plan(&frame(2, &[2.0]), later), Outgoing::Full));

        tracker.record_full(&frame(2, &[2.0]), later);
        tracker.schedule_full();
        assert!(matches!(tracker.plan(&frame(3, &[3.0]), later), Outgoing::Full));
    }
}
