use crate::cube_mode::CubeMode;
use crate::settings::TimerSettings;
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Spacing assumed between solves when upgrading legacy sessions that only
/// stored bare times
pub const LEGACY_SOLVE_INTERVAL_MS: i64 = 3 * 60 * 1000;

pub const MIGRATION_VERSION: u32 = 1;

/// A single recorded solve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    /// Solve duration in milliseconds
    pub time: u64,
    /// When the solve was recorded, epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scramble: Option<String>,
}

impl TimeEntry {
    pub fn new(time: u64, timestamp: i64, scramble: Option<String>) -> Self {
        Self {
            time,
            timestamp,
            scramble,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawSession")]
pub struct Session {
    pub id: i64,
    pub name: String,
    /// ISO-8601 creation timestamp
    pub date: String,
    pub cube_mode: CubeMode,
    pub times: Vec<TimeEntry>,
}

impl Session {
    pub fn new(id: i64, name: impl Into<String>, created_ms: i64, cube_mode: CubeMode) -> Self {
        Self {
            id,
            name: name.into(),
            date: iso_timestamp(created_ms),
            cube_mode,
            times: Vec::new(),
        }
    }

    /// Creation time in epoch milliseconds. Falls back to the id, which is
    /// allocated from the creation clock, when `date` does not parse.
    pub fn created_ms(&self) -> i64 {
        parse_iso_ms(&self.date).unwrap_or(self.id)
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn time_values(&self) -> Vec<u64> {
        self.times.iter().map(|t| t.time).collect()
    }

    pub fn last_solve_ms(&self) -> Option<i64> {
        self.times.iter().map(|t| t.timestamp).max()
    }
}

pub fn iso_timestamp(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_iso_ms(date: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(date)
        .ok()
        .map(|d| d.timestamp_millis())
}

/// Most recently dated session, ties broken by the highest id
pub fn most_recent_session_id(sessions: &[Session]) -> Option<i64> {
    sessions
        .iter()
        .max_by_key(|s| (s.created_ms(), s.id))
        .map(|s| s.id)
}

/// The persisted aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub current_session_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_mode")]
    pub preferred_cube_mode: CubeMode,
    #[serde(default)]
    pub timer_settings: TimerSettings,
    #[serde(default)]
    pub migration_version: u32,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
            current_session_id: None,
            preferred_cube_mode: CubeMode::default(),
            timer_settings: TimerSettings::default(),
            migration_version: 0,
        }
    }
}

impl StoreState {
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice::<StoreState>(bytes).map(StoreState::normalized)
    }

    /// Drop duplicate session ids (first occurrence wins) and repair a
    /// dangling current-session pointer
    pub fn normalized(mut self) -> Self {
        let mut seen = HashSet::new();
        self.sessions.retain(|s| seen.insert(s.id));
        self.heal_current();
        self
    }

    pub fn session(&self, id: i64) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn session_mut(&mut self, id: i64) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn position(&self, id: i64) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == id)
    }

    pub fn current(&self) -> Option<&Session> {
        self.current_session_id.and_then(|id| self.session(id))
    }

    /// Repoint the current session when it no longer exists
    pub fn heal_current(&mut self) {
        let valid = self
            .current_session_id
            .is_some_and(|id| self.position(id).is_some());
        if !valid {
            self.current_session_id = most_recent_session_id(&self.sessions);
        }
    }

    /// Latest solve timestamp among sessions of one category
    pub fn last_solve_ms(&self, mode: CubeMode) -> Option<i64> {
        self.sessions
            .iter()
            .filter(|s| s.cube_mode == mode)
            .filter_map(Session::last_solve_ms)
            .max()
    }
}

fn lenient_mode<'de, D>(deserializer: D) -> Result<CubeMode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).unwrap_or_default())
}

/// Wire shape accepted for a session, including blobs written before solves
/// carried timestamps
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSession {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    date: String,
    #[serde(default, deserialize_with = "lenient_mode")]
    cube_mode: CubeMode,
    #[serde(default)]
    times: Vec<RawTime>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTime {
    Entry(TimeEntry),
    Millis(f64),
}

impl From<RawSession> for Session {
    fn from(raw: RawSession) -> Self {
        let base = parse_iso_ms(&raw.date).unwrap_or(raw.id);
        let times = raw
            .times
            .into_iter()
            .enumerate()
            .map(|(i, t)| match t {
                RawTime::Entry(entry) => entry,
                RawTime::Millis(ms) => TimeEntry {
                    time: ms.max(0.0).round() as u64,
                    timestamp: base + i as i64 * LEGACY_SOLVE_INTERVAL_MS,
                    scramble: None,
                },
            })
            .collect();

        Self {
            id: raw.id,
            name: raw.name,
            date: raw.date,
            cube_mode: raw.cube_mode,
            times,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(id: i64, date: &str) -> Session {
        Session {
            id,
            name: format!("Session {id}"),
            date: date.to_string(),
            cube_mode: CubeMode::Three,
            times: vec![],
        }
    }

    #[test]
    fn iso_timestamp_matches_js_format() {
        assert_eq!(iso_timestamp(1_704_067_200_000), "2024-01-01T00:00:00.000Z");
        assert_eq!(parse_iso_ms("2024-01-01T00:00:00.000Z"), Some(1_704_067_200_000));
        assert_eq!(parse_iso_ms("not a date"), None);
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut s = session(1, "2024-03-01T10:00:00.000Z");
        s.times.push(TimeEntry::new(12_345, 1_709_287_200_000, Some("R U".into())));
        s.times.push(TimeEntry::new(9_000, 1_709_287_260_000, None));
        let state = StoreState {
            sessions: vec![s],
            current_session_id: Some(1),
            preferred_cube_mode: CubeMode::Skewb,
            timer_settings: TimerSettings::default(),
            migration_version: 1,
        };
        let bytes = serde_json::to_vec(&state).unwrap();
        assert_eq!(StoreState::from_json(&bytes).unwrap(), state);

        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["currentSessionId"], json!(1));
        assert_eq!(v["sessions"][0]["cubeMode"], json!("3x3x3"));
        assert!(v["sessions"][0]["times"][1].get("scramble").is_none());
    }

    #[test]
    fn legacy_numeric_times_are_upgraded() {
        let raw = json!({
            "sessions": [{
                "id": 5,
                "name": "Sessione 1",
                "date": "2024-01-01T00:00:00.000Z",
                "times": [10000, 12000]
            }],
            "currentSessionId": 5
        });
        let state = StoreState::from_json(raw.to_string().as_bytes()).unwrap();
        let s = &state.sessions[0];
        assert_eq!(s.cube_mode, CubeMode::Three);
        assert_eq!(s.times[0], TimeEntry::new(10_000, 1_704_067_200_000, None));
        assert_eq!(s.times[1].timestamp, 1_704_067_200_000 + LEGACY_SOLVE_INTERVAL_MS);
        assert_eq!(state.timer_settings, TimerSettings::default());
        assert_eq!(state.migration_version, 0);
    }

    #[test]
    fn duplicate_ids_are_dropped_on_load() {
        let raw = json!({
            "sessions": [
                {"id": 1, "name": "a", "date": "2024-01-01T00:00:00.000Z", "cubeMode": "3x3x3", "times": []},
                {"id": 1, "name": "b", "date": "2024-01-02T00:00:00.000Z", "cubeMode": "3x3x3", "times": []}
            ],
            "currentSessionId": 1
        });
        let state = StoreState::from_json(raw.to_string().as_bytes()).unwrap();
        assert_eq!(state.sessions.len(), 1);
        assert_eq!(state.sessions[0].name, "a");
    }

    #[test]
    fn dangling_current_id_is_healed_to_most_recent() {
        let state = StoreState {
            sessions: vec![
                session(1, "2024-01-01T00:00:00.000Z"),
                session(3, "2024-02-01T00:00:00.000Z"),
                session(2, "2024-02-01T00:00:00.000Z"),
            ],
            current_session_id: Some(99),
            ..Default::default()
        }
        .normalized();
        assert_eq!(state.current_session_id, Some(3));
    }

    #[test]
    fn unknown_cube_mode_falls_back_to_default() {
        let raw = json!({
            "sessions": [{"id": 1, "name": "x", "date": "", "cubeMode": "clock", "times": []}],
            "preferredCubeMode": "clock"
        });
        let state = StoreState::from_json(raw.to_string().as_bytes()).unwrap();
        assert_eq!(state.sessions[0].cube_mode, CubeMode::Three);
        assert_eq!(state.preferred_cube_mode, CubeMode::Three);
        assert_eq!(state.current_session_id, Some(1));
    }

    #[test]
    fn created_ms_falls_back_to_id() {
        assert_eq!(session(42, "garbage").created_ms(), 42);
    }

    #[test]
    fn last_solve_is_per_category() {
        let mut a = session(1, "2024-01-01T00:00:00.000Z");
        a.times.push(TimeEntry::new(1, 500, None));
        let mut b = session(2, "2024-01-01T00:00:00.000Z");
        b.cube_mode = CubeMode::Two;
        b.times.push(TimeEntry::new(1, 900, None));
        let state = StoreState {
            sessions: vec![a, b],
            ..Default::default()
        };
        assert_eq!(state.last_solve_ms(CubeMode::Three), Some(500));
        assert_eq!(state.last_solve_ms(CubeMode::Two), Some(900));
        assert_eq!(state.last_solve_ms(CubeMode::Skewb), None);
    }
}
