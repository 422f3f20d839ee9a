use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use terralink_frame::FrameConfig;
use terralink_link::LinkConfig;
use terralink_state::StateConfig;

use crate::error::{AppError, Result};

/// Timing and sub-configuration for a running core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Delay between HELLO retries until the handshake completes.
    pub handshake_retry: Duration,
    /// How long the handshake task waits for DISPLAY_READY.
    pub handshake_timeout: Duration,
    /// Simulation tick period; also the step passed to each update.
    pub update_period: Duration,
    /// Period of the state publisher.
    pub publish_interval: Duration,
    pub frame: FrameConfig,
    pub link: LinkConfig,
    pub state: StateConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            handshake_retry: Duration::from_millis(500),
            handshake_timeout: Duration::from_secs(5),
            update_period: Duration::from_millis(100),
            publish_interval: Duration::from_secs(1),
            frame: FrameConfig::default(),
            link: LinkConfig::default(),
            state: StateConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Defaults overlaid with the settings in a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        ConfigFile::load(path)?.apply(&mut config);
        Ok(config)
    }
}

/// On-disk form of [`CoreConfig`]. Every field is optional; durations are
/// in milliseconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub handshake_retry_ms: Option<u64>,
    pub handshake_timeout_ms: Option<u64>,
    pub update_period_ms: Option<u64>,
    pub publish_interval_ms: Option<u64>,
    pub frame: FrameSection,
    pub link: LinkSection,
    pub state: StateSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameSection {
    pub max_payload_size: Option<usize>,
    pub header_timeout_ms: Option<u64>,
    pub payload_timeout_ms: Option<u64>,
    pub checksum_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkSection {
    pub delta_updates: Option<bool>,
    pub watchdog: Option<WatchdogSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchdogSection {
    pub period_ms: Option<u64>,
    pub state_timeout_ms: Option<u64>,
    pub ping_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateSection {
    pub slot_count: Option<usize>,
    pub display_width: Option<u16>,
    pub touch_relief: Option<f32>,
    pub base_epoch: Option<u32>,
    pub profile_dir: Option<PathBuf>,
    pub fallback_profile_dir: Option<PathBuf>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AppError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file: Self = serde_json::from_str(&content).map_err(|source| AppError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        file.check_durations().map_err(|field| AppError::ConfigValue {
            path: path.to_path_buf(),
            field,
        })?;
        Ok(file)
    }

    /// Name of the first duration set to zero, if any. A zero period would
    /// turn the core's timed loops into busy loops.
    pub fn check_durations(&self) -> std::result::Result<(), &'static str> {
        let mut fields = vec![
            ("handshake_retry_ms", self.handshake_retry_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("update_period_ms", self.update_period_ms),
            ("publish_interval_ms", self.publish_interval_ms),
            ("frame.header_timeout_ms", self.frame.header_timeout_ms),
            ("frame.payload_timeout_ms", self.frame.payload_timeout_ms),
            ("frame.checksum_timeout_ms", self.frame.checksum_timeout_ms),
            ("frame.write_timeout_ms", self.frame.write_timeout_ms),
        ];
        if let Some(watchdog) = &self.link.watchdog {
            fields.push(("link.watchdog.period_ms", watchdog.period_ms));
            fields.push(("link.watchdog.state_timeout_ms", watchdog.state_timeout_ms));
            fields.push(("link.watchdog.ping_timeout_ms", watchdog.ping_timeout_ms));
        }

        match fields.into_iter().find(|(_, ms)| *ms == Some(0)) {
            Some((field, _)) => Err(field),
            None => Ok(()),
        }
    }

    /// Overwrite the fields of `config` that this file sets.
    ///
    /// Durations are taken as given; [`ConfigFile::load`] has already
    /// rejected zero values for files read from disk.
    pub fn apply(self, config: &mut CoreConfig) {
        set_ms(&mut config.handshake_retry, self.handshake_retry_ms);
        set_ms(&mut config.handshake_timeout, self.handshake_timeout_ms);
        set_ms(&mut config.update_period, self.update_period_ms);
        set_ms(&mut config.publish_interval, self.publish_interval_ms);

        let frame = self.frame;
        if let Some(max) = frame.max_payload_size {
            config.frame.max_payload_size = max;
        }
        set_ms(&mut config.frame.header_timeout, frame.header_timeout_ms);
        set_ms(&mut config.frame.payload_timeout, frame.payload_timeout_ms);
        set_ms(&mut config.frame.checksum_timeout, frame.checksum_timeout_ms);
        if let Some(ms) = frame.write_timeout_ms {
            config.frame.write_timeout = Some(Duration::from_millis(ms));
        }

        if let Some(delta) = self.link.delta_updates {
            config.link.delta_updates = delta;
        }
        if let Some(section) = self.link.watchdog {
            let mut watchdog = config.link.watchdog.take().unwrap_or_default();
            set_ms(&mut watchdog.period, section.period_ms);
            set_ms(&mut watchdog.state_timeout, section.state_timeout_ms);
            set_ms(&mut watchdog.ping_timeout, section.ping_timeout_ms);
            config.link.watchdog = Some(watchdog);
        }

        let state = self.state;
        if let Some(count) = state.slot_count {
            config.state.slot_count = count;
        }
        if let Some(width) = state.display_width {
            config.state.display_width = width;
        }
        if let Some(relief) = state.touch_relief {
            config.state.touch_relief = relief;
        }
        if let Some(epoch) = state.base_epoch {
            config.state.base_epoch = epoch;
        }
        if state.profile_dir.is_some() {
            config.state.profile_dir = state.profile_dir;
        }
        if state.fallback_profile_dir.is_some() {
            config.state.fallback_profile_dir = state.fallback_profile_dir;
        }
    }
}

fn set_ms(target: &mut Duration, ms: Option<u64>) {
    if let Some(ms) = ms {
        *target = Duration::from_millis(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_firmware_timings() {
        let config = CoreConfig::default();
        assert_eq!(config.handshake_retry, Duration::from_millis(500));
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.update_period, Duration::from_millis(100));
        assert_eq!(config.publish_interval, Duration::from_secs(1));
        assert!(!config.link.delta_updates);
        assert!(config.link.watchdog.is_none());
        assert_eq!(config.state.slot_count, 3);
    }

    #[test]
    fn file_overrides_only_given_fields() {
        let file: ConfigFile = serde_json::from_str(
            r#"{
                "publish_interval_ms": 250,
                "frame": { "write_timeout_ms": 40 },
                "link": { "delta_updates": true, "watchdog": { "ping_timeout_ms": 300 } },
                "state": { "slot_count": 4, "profile_dir": "/srv/profiles" }
            }"#,
        )
        .unwrap();
        let mut config = CoreConfig::default();
        file.apply(&mut config);

        assert_eq!(config.publish_interval, Duration::from_millis(250));
        assert_eq!(config.update_period, Duration::from_millis(100));
        assert_eq!(config.frame.write_timeout, Some(Duration::from_millis(40)));
        assert_eq!(config.frame.header_timeout, Duration::from_millis(50));
        assert!(config.link.delta_updates);
        let watchdog = config.link.watchdog.unwrap();
        assert_eq!(watchdog.ping_timeout, Duration::from_millis(300));
        assert_eq!(watchdog.state_timeout, Duration::from_secs(3));
        assert_eq!(config.state.slot_count, 4);
        assert_eq!(config.state.profile_dir, Some(PathBuf::from("/srv/profiles")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: std::result::Result<ConfigFile, _> =
            serde_json::from_str(r#"{ "publish_interval": 3 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn zero_durations_are_rejected() {
        let file: ConfigFile = serde_json::from_str(r#"{ "update_period_ms": 0 }"#).unwrap();
        assert_eq!(file.check_durations(), Err("update_period_ms"));

        let file: ConfigFile =
            serde_json::from_str(r#"{ "link": { "watchdog": { "period_ms": 0 } } }"#).unwrap();
        assert_eq!(file.check_durations(), Err("link.watchdog.period_ms"));

        let file: ConfigFile = serde_json::from_str(r#"{ "publish_interval_ms": 1 }"#).unwrap();
        assert_eq!(file.check_durations(), Ok(()));
    }

    #[test]
    fn zero_duration_file_fails_to_load() {
        let path = std::env::temp_dir().join(format!("terralink-zero-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "frame": { "header_timeout_ms": 0 } }"#).unwrap();

        let err = CoreConfig::from_file(&path).unwrap_err();
        assert!(matches!(
            err,
            AppError::ConfigValue { field: "frame.header_timeout_ms", .. }
        ));
        assert!(err.to_string().contains("greater than zero"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let err = CoreConfig::from_file(Path::new("/nonexistent/terralink.json")).unwrap_err();
        assert!(matches!(err, AppError::ConfigRead { .. }));
        assert!(err.to_string().contains("/nonexistent/terralink.json"));
    }
}
