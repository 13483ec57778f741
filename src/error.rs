use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColorError {
    #[error("malformed hex color '{0}': expected a 6-digit hex triplet")]
    Format(String),
}

/// Fatal configuration problems. Raised before any engine state exists.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("zone registry must contain at least one zone")]
    EmptyRegistry,
    #[error("zone key '{0}' defined more than once")]
    DuplicateZone(String),
    #[error("zone '{key}' has non-positive area {area}")]
    NonPositiveArea { key: String, area: f64 },
    #[error("zone '{key}' has non-positive weight {weight}")]
    NonPositiveWeight { key: String, weight: f64 },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ZoneError {
    #[error("unknown zone '{0}'")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Zone(#[from] ZoneError),
    #[error("engine is driven by the internal simulator; external observations are not accepted")]
    SimulatedFeed,
}
