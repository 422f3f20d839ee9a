use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use terralink_link::{TerrariumSnapshot, MAX_TERRARIUMS};
use tracing::{debug, warn};

use crate::error::{ProfileError, Result};

/// Largest profile file read from disk.
pub const MAX_PROFILE_FILE_SIZE: u64 = 64 * 1024;

const DEFAULT_CYCLE_SPEED: [f32; MAX_TERRARIUMS] = [0.03, 0.045, 0.038, 0.033];
const DEFAULT_PHASE_OFFSET: [f32; MAX_TERRARIUMS] = [0.0, 1.1, 2.4, 3.1];
const DEFAULT_ENRICHMENT: [f32; MAX_TERRARIUMS] = [1.0, 1.3, 0.8, 1.1];
const FEEDING_INTERVAL_SECS: u32 = 6 * 3600;

/// Day and night targets for one enclosure.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Environment {
    pub temp_day_c: f32,
    pub temp_night_c: f32,
    pub humidity_day_pct: f32,
    pub humidity_night_pct: f32,
    pub lux_day: f32,
    pub lux_night: f32,
}

/// Optional starting metrics in a profile record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Metrics {
    pub hydration_pct: Option<f32>,
    pub stress_pct: Option<f32>,
    pub health_pct: Option<f32>,
    pub activity_score: Option<f32>,
    pub last_feeding_timestamp: Option<u32>,
}

impl Metrics {
    fn or(self, other: Metrics) -> Metrics {
        Metrics {
            hydration_pct: self.hydration_pct.or(other.hydration_pct),
            stress_pct: self.stress_pct.or(other.stress_pct),
            health_pct: self.health_pct.or(other.health_pct),
            activity_score: self.activity_score.or(other.activity_score),
            last_feeding_timestamp: self.last_feeding_timestamp.or(other.last_feeding_timestamp),
        }
    }
}

/// One profile file as stored on disk.
///
/// Metrics may be given in a `metrics` object or at the top level; the
/// object wins when both are present.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRecord {
    pub id: Option<u8>,
    pub scientific_name: String,
    pub common_name: String,
    pub environment: Environment,
    pub cycle_speed: Option<f32>,
    pub phase_offset: Option<f32>,
    pub enrichment_factor: Option<f32>,
    pub metrics: Option<Metrics>,
    #[serde(flatten)]
    pub inline_metrics: Metrics,
}

struct BuiltIn {
    scientific_name: &'static str,
    common_name: &'static str,
    environment: Environment,
}

const BUILT_IN: [BuiltIn; MAX_TERRARIUMS] = [
    BuiltIn {
        scientific_name: "Python regius",
        common_name: "Python royal",
        environment: Environment {
            temp_day_c: 31.0,
            temp_night_c: 24.0,
            humidity_day_pct: 60.0,
            humidity_night_pct: 70.0,
            lux_day: 400.0,
            lux_night: 5.0,
        },
    },
    BuiltIn {
        scientific_name: "Pogona vitticeps",
        common_name: "Dragon barbu",
        environment: Environment {
            temp_day_c: 35.0,
            temp_night_c: 22.0,
            humidity_day_pct: 40.0,
            humidity_night_pct: 50.0,
            lux_day: 650.0,
            lux_night: 10.0,
        },
    },
    BuiltIn {
        scientific_name: "Correlophus ciliatus",
        common_name: "Gecko à crête",
        environment: Environment {
            temp_day_c: 27.0,
            temp_night_c: 21.0,
            humidity_day_pct: 70.0,
            humidity_night_pct: 85.0,
            lux_day: 220.0,
            lux_night: 3.0,
        },
    },
    BuiltIn {
        scientific_name: "Eublepharis macularius",
        common_name: "Gecko léopard",
        environment: Environment {
            temp_day_c: 33.0,
            temp_night_c: 23.0,
            humidity_day_pct: 45.0,
            humidity_night_pct: 55.0,
            lux_day: 320.0,
            lux_night: 6.0,
        },
    },
];

/// Live state of one terrarium.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub id: u8,
    pub scientific_name: String,
    pub common_name: String,
    pub targets: Environment,
    pub current: Environment,
    pub hydration_pct: f32,
    pub stress_pct: f32,
    pub health_pct: f32,
    pub activity_score: f32,
    pub last_feeding_timestamp: u32,
    pub cycle_speed: f32,
    pub phase_offset: f32,
    pub enrichment_factor: f32,
}

impl Slot {
    fn new(
        index: usize,
        id: u8,
        scientific_name: String,
        common_name: String,
        targets: Environment,
        metrics: Metrics,
        now_epoch: u32,
    ) -> Self {
        let i = index.min(MAX_TERRARIUMS - 1);
        let n = i as f32;
        let finite = |value: Option<f32>| value.filter(|v| v.is_finite());
        let feeding_default = now_epoch.saturating_sub(FEEDING_INTERVAL_SECS * (i as u32 + 1));

        Self {
            id,
            scientific_name,
            common_name,
            targets,
            current: targets,
            hydration_pct: finite(metrics.hydration_pct)
                .unwrap_or(88.0 - n * 3.0)
                .clamp(0.0, 100.0),
            stress_pct: finite(metrics.stress_pct)
                .unwrap_or(15.0 + n * 4.0)
                .clamp(0.0, 85.0),
            health_pct: finite(metrics.health_pct)
                .unwrap_or(94.0 - n * 2.0)
                .clamp(0.0, 100.0),
            activity_score: finite(metrics.activity_score)
                .unwrap_or(0.5)
                .clamp(0.0, 1.0),
            last_feeding_timestamp: metrics
                .last_feeding_timestamp
                .filter(|&ts| ts != 0)
                .unwrap_or(feeding_default),
            cycle_speed: DEFAULT_CYCLE_SPEED[i],
            phase_offset: DEFAULT_PHASE_OFFSET[i],
            enrichment_factor: DEFAULT_ENRICHMENT[i],
        }
    }

    fn from_record(index: usize, record: ProfileRecord, now_epoch: u32) -> Self {
        let metrics = record.metrics.unwrap_or_default().or(record.inline_metrics);
        let mut slot = Self::new(
            index,
            record.id.unwrap_or(index as u8),
            record.scientific_name,
            record.common_name,
            record.environment,
            metrics,
            now_epoch,
        );
        if let Some(speed) = record.cycle_speed.filter(|v| v.is_finite() && *v > 0.0) {
            slot.cycle_speed = speed;
        }
        if let Some(phase) = record.phase_offset.filter(|v| v.is_finite()) {
            slot.phase_offset = phase;
        }
        if let Some(factor) = record.enrichment_factor.filter(|v| v.is_finite() && *v > 0.0) {
            slot.enrichment_factor = factor;
        }
        slot
    }

    /// Wire projection of this slot.
    pub fn to_snapshot(&self) -> TerrariumSnapshot {
        TerrariumSnapshot {
            id: self.id,
            scientific_name: self.scientific_name.clone(),
            common_name: self.common_name.clone(),
            temp_day_c: self.current.temp_day_c,
            temp_night_c: self.current.temp_night_c,
            humidity_day_pct: self.current.humidity_day_pct,
            humidity_night_pct: self.current.humidity_night_pct,
            lux_day: self.current.lux_day,
            lux_night: self.current.lux_night,
            hydration_pct: self.hydration_pct,
            stress_pct: self.stress_pct,
            health_pct: self.health_pct,
            last_feeding_timestamp: self.last_feeding_timestamp,
            activity_score: self.activity_score,
        }
    }
}

/// Slots built from the compiled-in species table.
pub fn built_in_slots(count: usize, now_epoch: u32) -> Vec<Slot> {
    BUILT_IN
        .iter()
        .take(count.min(MAX_TERRARIUMS))
        .enumerate()
        .map(|(i, profile)| {
            Slot::new(
                i,
                i as u8,
                profile.scientific_name.to_owned(),
                profile.common_name.to_owned(),
                profile.environment,
                Metrics::default(),
                now_epoch,
            )
        })
        .collect()
}

/// Load up to [`MAX_TERRARIUMS`] profiles from `dir`.
///
/// Returns `Ok(None)` when the directory is missing or holds no `.json`
/// files, and an error when profile files exist but none of them load.
/// Individual bad files are skipped with a warning.
pub fn load_directory(dir: &Path, now_epoch: u32) -> Result<Option<Vec<Slot>>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ProfileError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ProfileError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name.starts_with('.') || !has_json_extension(&file_name) {
            continue;
        }
        candidates.push(entry.path());
    }

    if candidates.is_empty() {
        return Ok(None);
    }
    candidates.sort_by_key(|path| path.to_string_lossy().to_lowercase());
    if candidates.len() > MAX_TERRARIUMS {
        warn!(
            dir = %dir.display(),
            ignored = candidates.len() - MAX_TERRARIUMS,
            "profile limit reached; remaining files ignored"
        );
        candidates.truncate(MAX_TERRARIUMS);
    }

    let mut slots = Vec::with_capacity(candidates.len());
    for path in candidates {
        match read_record(&path) {
            Ok(record) => {
                debug!(path = %path.display(), "profile loaded");
                slots.push(Slot::from_record(slots.len(), record, now_epoch));
            }
            Err(err) => warn!(error = %err, "skipping profile"),
        }
    }

    if slots.is_empty() {
        return Err(ProfileError::NoUsableProfiles {
            path: dir.to_path_buf(),
        });
    }
    Ok(Some(slots))
}

fn has_json_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn read_record(path: &Path) -> Result<ProfileRecord> {
    let io_error = |source: std::io::Error| ProfileError::Io {
        path: path.to_path_buf(),
        source,
    };

    let metadata = std::fs::symlink_metadata(path).map_err(io_error)?;
    if metadata.file_type().is_symlink() || !metadata.is_file() {
        return Err(io_error(std::io::Error::other("not a regular file")));
    }
    if metadata.len() > MAX_PROFILE_FILE_SIZE {
        return Err(ProfileError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max: MAX_PROFILE_FILE_SIZE,
        });
    }

    let file = std::fs::File::open(path).map_err(io_error)?;
    let mut content = String::new();
    file.take(MAX_PROFILE_FILE_SIZE + 1)
        .read_to_string(&mut content)
        .map_err(io_error)?;
    if content.len() as u64 > MAX_PROFILE_FILE_SIZE {
        return Err(ProfileError::TooLarge {
            path: path.to_path_buf(),
            size: content.len() as u64,
            max: MAX_PROFILE_FILE_SIZE,
        });
    }

    serde_json::from_str(&content).map_err(|source| ProfileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Where the active profile set came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSource {
    Directory { path: PathBuf, count: usize },
    BuiltIn { count: usize },
}

impl ProfileSource {
    pub fn count(&self) -> usize {
        match self {
            Self::Directory { count, .. } | Self::BuiltIn { count } => *count,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "terralink-state-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub(crate) const GECKO: &str = r#"{
        "scientific_name": "Rhacodactylus leachianus",
        "common_name": "New Caledonian giant gecko",
        "environment": {
            "temp_day_c": 26.0, "temp_night_c": 20.0,
            "humidity_day_pct": 70.0, "humidity_night_pct": 80.0,
            "lux_day": 200.0, "lux_night": 2.0
        },
        "metrics": { "hydration_pct": 77.0 }
    }"#;

    #[test]
    fn built_ins_follow_slot_count() {
        let slots = built_in_slots(3, 1_000_000);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[1].scientific_name, "Pogona vitticeps");
        assert_eq!(slots[2].id, 2);
        assert_eq!(slots[0].hydration_pct, 88.0);
        assert_eq!(slots[2].stress_pct, 23.0);
        assert_eq!(slots[1].last_feeding_timestamp, 1_000_000 - 12 * 3600);
        assert_eq!(built_in_slots(9, 0).len(), MAX_TERRARIUMS);
    }

    #[test]
    fn record_applies_metrics_and_tuning_defaults() {
        let mut record: ProfileRecord = serde_json::from_str(GECKO).unwrap();
        record.cycle_speed = Some(-1.0);
        record.inline_metrics.stress_pct = Some(33.0);
        let slot = Slot::from_record(1, record, 100_000);

        assert_eq!(slot.id, 1);
        assert_eq!(slot.hydration_pct, 77.0);
        assert_eq!(slot.stress_pct, 33.0);
        assert_eq!(slot.health_pct, 92.0);
        assert_eq!(slot.cycle_speed, 0.045);
        assert_eq!(slot.current.temp_day_c, 26.0);
    }

    #[test]
    fn missing_environment_is_rejected() {
        let result: std::result::Result<ProfileRecord, _> =
            serde_json::from_str(r#"{"scientific_name":"x","common_name":"y"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn directory_is_loaded_in_case_insensitive_order() {
        let dir = temp_dir("order");
        std::fs::write(dir.join("b.JSON"), GECKO.replace("Rhacodactylus", "Beta")).unwrap();
        std::fs::write(dir.join("A.json"), GECKO.replace("Rhacodactylus", "Alpha")).unwrap();
        std::fs::write(dir.join(".hidden.json"), GECKO).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let slots = load_directory(&dir, 0).unwrap().unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots[0].scientific_name.starts_with("Alpha"));
        assert!(slots[1].scientific_name.starts_with("Beta"));
        assert_eq!(slots[1].id, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bad_files_are_skipped() {
        let dir = temp_dir("skip");
        std::fs::write(dir.join("1.json"), "{ not json").unwrap();
        std::fs::write(dir.join("2.json"), GECKO).unwrap();

        let slots = load_directory(&dir, 0).unwrap().unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].id, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn directory_of_bad_files_is_an_error() {
        let dir = temp_dir("bad");
        std::fs::write(dir.join("only.json"), "[]").unwrap();

        let result = load_directory(&dir, 0);
        assert!(matches!(result, Err(ProfileError::NoUsableProfiles { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_or_empty_directory_yields_nothing() {
        let dir = temp_dir("empty");
        assert!(load_directory(&dir, 0).unwrap().is_none());
        assert!(load_directory(&dir.join("absent"), 0).unwrap().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn oversized_file_is_skipped() {
        let dir = temp_dir("large");
        let padding = " ".repeat(MAX_PROFILE_FILE_SIZE as usize);
        std::fs::write(dir.join("big.json"), format!("{GECKO}{padding}")).unwrap();

        let result = load_directory(&dir, 0);
        assert!(matches!(result, Err(ProfileError::NoUsableProfiles { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn at_most_four_profiles_are_read() {
        let dir = temp_dir("limit");
        for i in 0..6 {
            std::fs::write(dir.join(format!("{i}.json")), GECKO).unwrap();
        }
        let slots = load_directory(&dir, 0).unwrap().unwrap();
        assert_eq!(slots.len(), MAX_TERRARIUMS);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn limit_keeps_first_files_in_sorted_order() {
        let dir = temp_dir("limit-order");
        for name in ["e", "C", "a", "D", "b", "F"] {
            std::fs::write(dir.join(format!("{name}.json")), GECKO.replace("Rhacodactylus", name)).unwrap();
        }

        let slots = load_directory(&dir, 0).unwrap().unwrap();
        let names: Vec<_> = slots
            .iter()
            .map(|slot| slot.scientific_name.split(' ').next().unwrap_or_default().to_owned())
            .collect();
        assert_eq!(names, ["a", "b", "C", "D"]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
