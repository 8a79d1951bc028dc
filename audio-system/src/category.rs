use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mixing category. Each has its own volume and scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundCategory {
    Music,
    Effect,
    Ambient,
    Voice,
}

impl SoundCategory {
    pub const COUNT: usize = 4;

    /// Mix order. Fixed so output is deterministic.
    pub const ALL: [SoundCategory; Self::COUNT] = [
        SoundCategory::Music,
        SoundCategory::Effect,
        SoundCategory::Ambient,
        SoundCategory::Voice,
    ];

    pub const fn index(self) -> usize {
        match self {
            SoundCategory::Music => 0,
            SoundCategory::Effect => 1,
            SoundCategory::Ambient => 2,
            SoundCategory::Voice => 3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SoundCategory::Music => "music",
            SoundCategory::Effect => "effect",
            SoundCategory::Ambient => "ambient",
            SoundCategory::Voice => "voice",
        }
    }
}

impl fmt::Display for SoundCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SoundCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SoundCategory::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown sound category '{}'", s))
    }
}
