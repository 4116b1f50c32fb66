//! Difficulty tiers from the OSM `sac_scale` tag, falling back to length.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Three-tier course difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
}

impl Difficulty {
    /// Map a `sac_scale` value to a tier, or `None` if the grade is unknown.
    pub fn from_sac_scale(grade: &str) -> Option<Self> {
        match grade.trim() {
            "hiking" => Some(Self::Easy),
            "mountain_hiking" => Some(Self::Moderate),
            "demanding_mountain_hiking"
            | "alpine_hiking"
            | "demanding_alpine_hiking"
            | "difficult_alpine_hiking" => Some(Self::Hard),
            _ => None,
        }
    }

    /// Tier by length alone: under 5 km easy, under 10 km moderate, otherwise hard.
    pub fn from_length(length_km: f64) -> Self {
        if length_km < 5.0 {
            Self::Easy
        } else if length_km < 10.0 {
            Self::Moderate
        } else {
            Self::Hard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Moderate => "moderate",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a course. A recognised `sac_scale` hint always wins over length.
///
/// ```
/// use trek_courses::{classify_difficulty, Difficulty};
///
/// assert_eq!(classify_difficulty(Some("demanding_mountain_hiking"), 2.0), Difficulty::Hard);
/// assert_eq!(classify_difficulty(None, 2.0), Difficulty::Easy);
/// assert_eq!(classify_difficulty(Some("T3"), 12.0), Difficulty::Hard);
/// ```
pub fn classify_difficulty(sac_hint: Option<&str>, length_km: f64) -> Difficulty {
    sac_hint
        .and_then(Difficulty::from_sac_scale)
        .unwrap_or_else(|| Difficulty::from_length(length_km))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_overrides_length() {
        assert_eq!(classify_difficulty(Some("hiking"), 30.0), Difficulty::Easy);
        assert_eq!(classify_difficulty(Some("mountain_hiking"), 1.0), Difficulty::Moderate);
        for grade in [
            "demanding_mountain_hiking",
            "alpine_hiking",
            "demanding_alpine_hiking",
            "difficult_alpine_hiking",
        ] {
            assert_eq!(classify_difficulty(Some(grade), 2.0), Difficulty::Hard);
        }
    }

    #[test]
    fn test_length_fallback_boundaries() {
        assert_eq!(classify_difficulty(None, 4.99), Difficulty::Easy);
        assert_eq!(classify_difficulty(None, 5.0), Difficulty::Moderate);
        assert_eq!(classify_difficulty(None, 9.99), Difficulty::Moderate);
        assert_eq!(classify_difficulty(None, 10.0), Difficulty::Hard);
    }

    #[test]
    fn test_unknown_hint_uses_length() {
        assert_eq!(classify_difficulty(Some(""), 2.0), Difficulty::Easy);
        assert_eq!(classify_difficulty(Some("strolling"), 7.0), Difficulty::Moderate);
    }

    #[test]
    fn test_hint_whitespace_is_ignored() {
        assert_eq!(classify_difficulty(Some(" mountain_hiking "), 2.0), Difficulty::Moderate);
    }

    #[test]
    fn test_serializes_lowercase() {
        let json = serde_json::to_string(&Difficulty::Moderate).unwrap();
        assert_eq!(json, "\"moderate\"");
        assert_eq!(Difficulty::Hard.to_string(), "hard");
    }
}
