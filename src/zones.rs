use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ZoneError};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneKey(String);

impl ZoneKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ZoneKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ZoneKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Zone definition as it appears in a scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub key: String,
    pub name: String,
    pub area_sqm: f64,
    pub weight: f64,
}

impl ZoneConfig {
    pub fn new(key: &str, name: &str, area_sqm: f64, weight: f64) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            area_sqm,
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub key: ZoneKey,
    pub name: String,
    pub area_sqm: f64,
    pub weight: f64,
}

/// Immutable table of zones. Iteration order is configuration order and is
/// the order every other component walks zones in.
#[derive(Debug, Clone)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
    index: HashMap<ZoneKey, usize>,
    total_weight: f64,
}

impl ZoneRegistry {
    pub fn configure(configs: Vec<ZoneConfig>) -> Result<Self, ConfigError> {
        if configs.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        let mut zones = Vec::with_capacity(configs.len());
        let mut index = HashMap::with_capacity(configs.len());
        for config in configs {
            let key = ZoneKey::new(config.key.trim());
            if key.as_str().is_empty() {
                return Err(ConfigError::InvalidParameter(
                    "zone key must not be empty".into(),
                ));
            }
            if index.contains_key(&key) {
                return Err(ConfigError::DuplicateZone(key.to_string()));
            }
            if !(config.area_sqm.is_finite() && config.area_sqm > 0.0) {
                return Err(ConfigError::NonPositiveArea {
                    key: key.to_string(),
                    area: config.area_sqm,
                });
            }
            if !(config.weight.is_finite() && config.weight > 0.0) {
                return Err(ConfigError::NonPositiveWeight {
                    key: key.to_string(),
                    weight: config.weight,
                });
            }
            index.insert(key.clone(), zones.len());
            zones.push(Zone {
                key,
                name: config.name,
                area_sqm: config.area_sqm,
                weight: config.weight,
            });
        }

        let total_weight = zones.iter().map(|zone| zone.weight).sum();
        Ok(Self {
            zones,
            index,
            total_weight,
        })
    }

    pub fn list_zone_keys(&self) -> Vec<ZoneKey> {
        self.zones.iter().map(|zone| zone.key.clone()).collect()
    }

    pub fn get_zone(&self, key: &str) -> Result<&Zone, ZoneError> {
        self.index_of(key).map(|idx| &self.zones[idx])
    }

    pub fn index_of(&self, key: &str) -> Result<usize, ZoneError> {
        self.index
            .get(key)
            .copied()
            .ok_or_else(|| ZoneError::NotFound(key.to_string()))
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }
}
