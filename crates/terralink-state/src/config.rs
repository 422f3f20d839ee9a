use std::path::PathBuf;

/// Inclusive `[min, max]` range for one simulated metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub min: f32,
    pub max: f32,
}

impl Limits {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Bounds applied to every slot after each simulation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub hydration: Limits,
    pub stress: Limits,
    pub health: Limits,
    pub activity: Limits,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            hydration: Limits::new(45.0, 100.0),
            stress: Limits::new(5.0, 85.0),
            health: Limits::new(65.0, 100.0),
            activity: Limits::new(0.0, 1.0),
        }
    }
}

/// State manager settings.
#[derive(Debug, Clone)]
pub struct StateConfig {
    /// Slots populated from built-in profiles.
    pub slot_count: usize,
    /// Panel width used to map touch X coordinates onto slots.
    pub display_width: u16,
    /// Stress removed by a touch press.
    pub touch_relief: f32,
    /// Epoch seconds reported when the clock reads zero.
    pub base_epoch: u32,
    /// Profile directory tried when a reload names none.
    pub profile_dir: Option<PathBuf>,
    /// Directory tried after the preferred one yields nothing.
    pub fallback_profile_dir: Option<PathBuf>,
    pub bounds: Bounds,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            slot_count: 3,
            display_width: 1024,
            touch_relief: 5.0,
            base_epoch: 1_700_000_000,
            profile_dir: None,
            fallback_profile_dir: None,
            bounds: Bounds::default(),
        }
    }
}
