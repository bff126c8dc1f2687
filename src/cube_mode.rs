use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Puzzle category a session is timed in
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, strum_macros::Display,
)]
pub enum CubeMode {
    #[serde(rename = "2x2x2")]
    #[strum(serialize = "2x2x2")]
    Two,
    #[default]
    #[serde(rename = "3x3x3")]
    #[strum(serialize = "3x3x3")]
    Three,
    #[serde(rename = "4x4x4")]
    #[strum(serialize = "4x4x4")]
    Four,
    #[serde(rename = "5x5x5")]
    #[strum(serialize = "5x5x5")]
    Five,
    #[serde(rename = "pyraminx")]
    #[strum(serialize = "pyraminx")]
    Pyraminx,
    #[serde(rename = "skewb")]
    #[strum(serialize = "skewb")]
    Skewb,
    #[serde(rename = "megaminx")]
    #[strum(serialize = "megaminx")]
    Megaminx,
    #[serde(rename = "square-1")]
    #[strum(serialize = "square-1")]
    SquareOne,
}

impl CubeMode {
    /// All categories in display order
    pub const ALL: [CubeMode; 8] = [
        CubeMode::Two,
        CubeMode::Three,
        CubeMode::Four,
        CubeMode::Five,
        CubeMode::Pyraminx,
        CubeMode::Skewb,
        CubeMode::Megaminx,
        CubeMode::SquareOne,
    ];

    /// Stable identifier used in persisted state
    pub fn id(&self) -> &'static str {
        match self {
            CubeMode::Two => "2x2x2",
            CubeMode::Three => "3x3x3",
            CubeMode::Four => "4x4x4",
            CubeMode::Five => "5x5x5",
            CubeMode::Pyraminx => "pyraminx",
            CubeMode::Skewb => "skewb",
            CubeMode::Megaminx => "megaminx",
            CubeMode::SquareOne => "square-1",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CubeMode::Two => "2x2x2 Pocket Cube",
            CubeMode::Three => "3x3x3 Standard",
            CubeMode::Four => "4x4x4 Revenge",
            CubeMode::Five => "5x5x5 Professor",
            CubeMode::Pyraminx => "Pyraminx",
            CubeMode::Skewb => "Skewb",
            CubeMode::Megaminx => "Megaminx",
            CubeMode::SquareOne => "Square-1",
        }
    }

    pub fn short_label(&self) -> &'static str {
        match self {
            CubeMode::Two => "2x2",
            CubeMode::Three => "3x3",
            CubeMode::Four => "4x4",
            CubeMode::Five => "5x5",
            CubeMode::Pyraminx => "PYRA",
            CubeMode::Skewb => "SKEWB",
            CubeMode::Megaminx => "MEGA",
            CubeMode::SquareOne => "SQ-1",
        }
    }

    /// NxNxN puzzles that scramble with face turns
    pub fn is_cuboid(&self) -> bool {
        matches!(
            self,
            CubeMode::Two | CubeMode::Three | CubeMode::Four | CubeMode::Five
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cube mode: {0}")]
pub struct UnknownCubeMode(pub String);

impl FromStr for CubeMode {
    type Err = UnknownCubeMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        CubeMode::ALL
            .into_iter()
            .find(|mode| mode.id() == wanted || mode.short_label().to_lowercase() == wanted)
            .ok_or(UnknownCubeMode(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_three_by_three() {
        assert_eq!(CubeMode::default(), CubeMode::Three);
    }

    #[test]
    fn display_matches_id() {
        for mode in CubeMode::ALL {
            assert_eq!(mode.to_string(), mode.id());
        }
    }

    #[test]
    fn serde_uses_ids() {
        let json = serde_json::to_string(&CubeMode::SquareOne).unwrap();
        assert_eq!(json, "\"square-1\"");
        let back: CubeMode = serde_json::from_str("\"2x2x2\"").unwrap();
        assert_eq!(back, CubeMode::Two);
        assert!(serde_json::from_str::<CubeMode>("\"6x6x6\"").is_err());
    }

    #[test]
    fn parse_accepts_ids_and_short_labels() {
        assert_eq!("pyraminx".parse::<CubeMode>(), Ok(CubeMode::Pyraminx));
        assert_eq!("SQ-1".parse::<CubeMode>(), Ok(CubeMode::SquareOne));
        assert_eq!("4x4".parse::<CubeMode>(), Ok(CubeMode::Four));
        assert_eq!(
            "clock".parse::<CubeMode>(),
            Err(UnknownCubeMode("clock".to_string()))
        );
    }

    #[test]
    fn only_nxn_are_cuboid() {
        let cuboid: Vec<_> = CubeMode::ALL.into_iter().filter(|m| m.is_cuboid()).collect();
        assert_eq!(
            cuboid,
            vec![CubeMode::Two, CubeMode::Three, CubeMode::Four, CubeMode::Five]
        );
    }
}
