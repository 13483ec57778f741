pub mod alerts;
pub mod color;
pub mod engine;
pub mod error;
pub mod history;
pub mod rng;
pub mod scenario;
pub mod scheduler;
pub mod snapshot;
pub mod systems;
pub mod web;
pub mod zones;

pub use engine::{Engine, EngineBuilder, EngineSettings, FeedMode};
pub use error::{ColorError, ConfigError, EngineError, ZoneError};
pub use scenario::{Scenario, ScenarioLoader};
pub use snapshot::{RiskLevel, Snapshot, ZoneSnapshot};
pub use zones::{ZoneConfig, ZoneKey, ZoneRegistry};
