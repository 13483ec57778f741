use serde::{Deserialize, Serialize};

use crate::color::{Rgb, DARK_TEXT_LUMINANCE, T_HIGH, T_MED};
use crate::zones::ZoneKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextColor {
    Light,
    Dark,
}

impl TextColor {
    pub fn for_background(background: Rgb) -> Self {
        if background.relative_luminance() > DARK_TEXT_LUMINANCE {
            TextColor::Dark
        } else {
            TextColor::Light
        }
    }

    pub fn css(self) -> &'static str {
        match self {
            TextColor::Light => "#fff",
            TextColor::Dark => "#111",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Same breakpoints as the color ramp.
    pub fn from_intensity(intensity: f64) -> Self {
        if intensity <= T_MED {
            RiskLevel::Low
        } else if intensity <= T_HIGH {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub key: ZoneKey,
    pub name: String,
    pub people: u64,
    pub density: f64,
    pub intensity: f64,
    pub risk_color: String,
    pub text_color: TextColor,
    pub risk_level: RiskLevel,
}

/// Published state of every zone for one tick. Handed out behind an `Arc`
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub scenario: String,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub zones: Vec<ZoneSnapshot>,
}

impl Snapshot {
    pub fn zone(&self, key: &str) -> Option<&ZoneSnapshot> {
        self.zones.iter().find(|zone| zone.key.as_str() == key)
    }

    pub fn total_people(&self) -> u64 {
        self.zones.iter().map(|zone| zone.people).sum()
    }

    pub fn highest_risk(&self) -> Option<&ZoneSnapshot> {
        self.zones
            .iter()
            .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
    }
}
