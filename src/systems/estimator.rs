//! Smoothed density and rate-amplified intensity per zone.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color::intensity_to_rgb;
use crate::error::ConfigError;
use crate::snapshot::{RiskLevel, TextColor, ZoneSnapshot};
use crate::zones::{Zone, ZoneKey};

fn default_alpha() -> f64 {
    0.6
}

fn default_intensity_scale() -> f64 {
    6.0
}

fn default_min_dt_secs() -> f64 {
    0.001
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorParams {
    /// Exponential smoothing weight of the newest sample, shared by density
    /// and intensity.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_intensity_scale")]
    pub intensity_scale: f64,
    #[serde(default = "default_min_dt_secs")]
    pub min_dt_secs: f64,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            intensity_scale: default_intensity_scale(),
            min_dt_secs: default_min_dt_secs(),
        }
    }
}

impl EstimatorParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "alpha must be within (0, 1], got {}",
                self.alpha
            )));
        }
        if !(self.intensity_scale.is_finite() && self.intensity_scale >= 0.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "intensity_scale must be non-negative, got {}",
                self.intensity_scale
            )));
        }
        if !(self.min_dt_secs.is_finite() && self.min_dt_secs > 0.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "min_dt_secs must be positive, got {}",
                self.min_dt_secs
            )));
        }
        Ok(())
    }
}

/// State carried between ticks for one zone.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedMetrics {
    pub smoothed_density: f64,
    pub smoothed_intensity: f64,
    pub previous_people: u64,
    pub previous_seen: Duration,
}

pub struct DensityEstimator {
    params: EstimatorParams,
    metrics: HashMap<ZoneKey, SmoothedMetrics>,
}

impl DensityEstimator {
    pub fn new(params: EstimatorParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            metrics: HashMap::new(),
        })
    }

    pub fn metrics(&self, key: &str) -> Option<&SmoothedMetrics> {
        self.metrics.get(key)
    }

    /// Folds one headcount into the zone's running state. `seen_at` is a
    /// monotonic reading; a reading at or before the previous one is treated
    /// as `min_dt_secs` later.
    ///
    /// The first observation of a zone seeds its state from itself, so it
    /// contributes no rate of change.
    pub fn observe(&mut self, zone: &Zone, people: u64, seen_at: Duration) -> ZoneSnapshot {
        let EstimatorParams {
            alpha,
            intensity_scale,
            min_dt_secs,
        } = self.params;
        let raw_density = people as f64 / zone.area_sqm;

        let previous = self
            .metrics
            .entry(zone.key.clone())
            .or_insert_with(|| SmoothedMetrics {
                smoothed_density: raw_density,
                smoothed_intensity: 0.0,
                previous_people: people,
                previous_seen: seen_at,
            });

        let dt = seen_at
            .saturating_sub(previous.previous_seen)
            .as_secs_f64()
            .max(min_dt_secs);
        let density = alpha * raw_density + (1.0 - alpha) * previous.smoothed_density;
        let rate = (people as f64 - previous.previous_people as f64) / (zone.area_sqm * dt);
        let raw_intensity = density * (1.0 + intensity_scale * rate.abs());
        let intensity = alpha * raw_intensity + (1.0 - alpha) * previous.smoothed_intensity;

        *previous = SmoothedMetrics {
            smoothed_density: density,
            smoothed_intensity: intensity,
            previous_people: people,
            previous_seen: seen_at,
        };

        let color = intensity_to_rgb(intensity);
        ZoneSnapshot {
            key: zone.key.clone(),
            name: zone.name.clone(),
            people,
            density,
            intensity,
            risk_color: color.to_hex(),
            text_color: TextColor::for_background(color),
            risk_level: RiskLevel::from_intensity(intensity),
        }
    }
}
