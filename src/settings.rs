use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inclusive bounds for a numeric timer setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub min: u32,
    pub max: u32,
}

impl Limit {
    /// Round and clamp a raw value, falling back when it is not a finite number
    pub fn clamp(&self, raw: Option<f64>, fallback: u32) -> u32 {
        match raw {
            Some(v) if v.is_finite() => v.round().clamp(self.min as f64, self.max as f64) as u32,
            _ => fallback,
        }
    }
}

pub const INSPECTION_SECONDS: Limit = Limit { min: 5, max: 60 };
pub const LAUNCH_COUNTDOWN_SECONDS: Limit = Limit { min: 1, max: 10 };
pub const SCRAMBLE_MOVE_COUNT: Limit = Limit { min: 10, max: 30 };
pub const AUTO_SESSION_AFTER_HOURS: Limit = Limit { min: 1, max: 24 };

/// Timer behaviour persisted alongside the sessions.
///
/// Deserialization never fails: every field is read independently and an
/// absent or malformed value falls back to its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "serde_json::Value")]
pub struct TimerSettings {
    pub inspection_enabled: bool,
    pub inspection_seconds: u32,
    pub launch_countdown_enabled: bool,
    pub launch_countdown_seconds: u32,
    pub scramble_move_count: u32,
    pub auto_session_after_hours: u32,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            inspection_enabled: true,
            inspection_seconds: 15,
            launch_countdown_enabled: true,
            launch_countdown_seconds: 5,
            scramble_move_count: 25,
            auto_session_after_hours: 6,
        }
    }
}

impl TimerSettings {
    /// Normalize an arbitrary JSON value into settings
    pub fn normalize(raw: &Value) -> Self {
        let d = Self::default();
        let num = |key: &str| raw.get(key).and_then(Value::as_f64);
        let flag = |key: &str| raw.get(key).and_then(Value::as_bool);

        Self {
            inspection_enabled: flag("inspectionEnabled").unwrap_or(d.inspection_enabled),
            inspection_seconds: INSPECTION_SECONDS
                .clamp(num("inspectionSeconds"), d.inspection_seconds),
            launch_countdown_enabled: flag("launchCountdownEnabled")
                .unwrap_or(d.launch_countdown_enabled),
            launch_countdown_seconds: LAUNCH_COUNTDOWN_SECONDS
                .clamp(num("launchCountdownSeconds"), d.launch_countdown_seconds),
            scramble_move_count: SCRAMBLE_MOVE_COUNT
                .clamp(num("scrambleMoveCount"), d.scramble_move_count),
            auto_session_after_hours: AUTO_SESSION_AFTER_HOURS
                .clamp(num("autoSessionAfterHours"), d.auto_session_after_hours),
        }
    }

    /// Shallow-merge a partial update, clamping every numeric field
    pub fn merged(&self, patch: &TimerSettingsPatch) -> Self {
        Self {
            inspection_enabled: patch.inspection_enabled.unwrap_or(self.inspection_enabled),
            inspection_seconds: INSPECTION_SECONDS
                .clamp(patch.inspection_seconds, self.inspection_seconds),
            launch_countdown_enabled: patch
                .launch_countdown_enabled
                .unwrap_or(self.launch_countdown_enabled),
            launch_countdown_seconds: LAUNCH_COUNTDOWN_SECONDS
                .clamp(patch.launch_countdown_seconds, self.launch_countdown_seconds),
            scramble_move_count: SCRAMBLE_MOVE_COUNT
                .clamp(patch.scramble_move_count, self.scramble_move_count),
            auto_session_after_hours: AUTO_SESSION_AFTER_HOURS
                .clamp(patch.auto_session_after_hours, self.auto_session_after_hours),
        }
    }

    pub fn inactivity_threshold_ms(&self) -> i64 {
        self.auto_session_after_hours as i64 * 3_600_000
    }
}

impl From<Value> for TimerSettings {
    fn from(raw: Value) -> Self {
        Self::normalize(&raw)
    }
}

/// Partial settings update; `None` leaves the current value untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimerSettingsPatch {
    pub inspection_enabled: Option<bool>,
    pub inspection_seconds: Option<f64>,
    pub launch_countdown_enabled: Option<bool>,
    pub launch_countdown_seconds: Option<f64>,
    pub scramble_move_count: Option<f64>,
    pub auto_session_after_hours: Option<f64>,
}

impl TimerSettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
