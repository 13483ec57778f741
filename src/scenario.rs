use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    engine::{EngineBuilder, EngineSettings, FeedMode},
    systems::{EstimatorParams, FlowParams},
    zones::ZoneConfig,
};

fn default_tick_ms() -> u64 {
    1_000
}

fn default_history_len() -> usize {
    60
}

fn default_alert_cooldown_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub seed: u64,
    pub total_population: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default)]
    pub feed: FeedMode,
    #[serde(default)]
    pub flow: FlowParams,
    #[serde(default)]
    pub estimator: EstimatorParams,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    #[serde(default = "default_alert_cooldown_secs")]
    pub alert_cooldown_secs: u64,
    pub zones: Vec<ZoneConfig>,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    /// Five-zone event ground with 25 000 attendees.
    pub fn festival_grounds() -> Self {
        Self {
            name: "festival_grounds".into(),
            description: Some("Entrance, work area, food court, stalls and main hall".into()),
            seed: 7,
            total_population: 25_000,
            tick_ms: default_tick_ms(),
            feed: FeedMode::Simulated,
            flow: FlowParams::default(),
            estimator: EstimatorParams::default(),
            history_len: default_history_len(),
            alert_cooldown_secs: default_alert_cooldown_secs(),
            zones: vec![
                ZoneConfig::new("A", "Entrance", 150.0, 0.12),
                ZoneConfig::new("B", "Work Area", 200.0, 0.35),
                ZoneConfig::new("C", "Food Court", 100.0, 0.18),
                ZoneConfig::new("D", "Stalls", 120.0, 0.10),
                ZoneConfig::new("E", "Main Hall", 500.0, 0.20),
            ],
        }
    }

    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            scenario_name: self.name.clone(),
            seed: self.seed,
            total_population: self.total_population,
            feed: self.feed,
            flow: self.flow.clone(),
            estimator: self.estimator.clone(),
        }
    }

    pub fn engine_builder(&self) -> EngineBuilder {
        EngineBuilder::new(self.settings()).with_zones(self.zones.clone())
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_fills_defaults() {
        let yaml = r#"
name: plaza
seed: 3
total_population: 400
zones:
  - key: N
    name: North
    area_sqm: 80
    weight: 1
  - key: S
    name: South
    area_sqm: 120
    weight: 2
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.tick_ms, 1_000);
        assert_eq!(scenario.feed, FeedMode::Simulated);
        assert_eq!(scenario.flow, FlowParams::default());
        assert_eq!(scenario.estimator.alpha, 0.6);
        assert_eq!(scenario.history_len, 60);
        assert_eq!(scenario.alert_cooldown(), Duration::from_secs(60));
        assert_eq!(scenario.zones[1].area_sqm, 120.0);
    }

    #[test]
    fn partial_blocks_keep_remaining_defaults() {
        let yaml = r#"
name: gate
seed: 1
total_population: 10
feed: external
flow:
  surge_probability: 0.0
estimator:
  alpha: 0.7
zones:
  - { key: G, name: Gate, area_sqm: 10, weight: 1 }
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.feed, FeedMode::External);
        assert_eq!(scenario.flow.surge_probability, 0.0);
        assert_eq!(scenario.flow.base_mobility, 0.006);
        assert_eq!(scenario.estimator.alpha, 0.7);
        assert_eq!(scenario.estimator.intensity_scale, 6.0);
    }

    #[test]
    fn builtin_layout_builds_an_engine() {
        let scenario = Scenario::festival_grounds();
        let engine = scenario.engine_builder().build().unwrap();
        assert_eq!(engine.registry().len(), 5);
        assert_eq!(engine.population().current_total(), 25_000);
    }

    #[test]
    fn missing_file_reports_path() {
        let loader = ScenarioLoader::new("/nonexistent");
        let err = loader.load("nope.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("nope.yaml"));
    }
}
