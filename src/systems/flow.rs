//! Stochastic movement of attendees between zones.
//!
//! Every step moves a small random share of each zone into a common pool,
//! hands the pool back out by attraction weight, occasionally fires a surge
//! toward one zone, and finally renormalises so the headcount never drifts.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::zones::{ZoneKey, ZoneRegistry};

/// Largest surge a scenario may configure; bigger crowds arriving at once
/// belong in the base population.
pub const MAX_SURGE_SIZE: u64 = 100_000;

fn default_base_mobility() -> f64 {
    0.006
}

fn default_mobility_jitter() -> f64 {
    0.002
}

fn default_inflow_jitter() -> f64 {
    0.02
}

fn default_surge_probability() -> f64 {
    0.06
}

fn default_surge_min() -> u64 {
    50
}

fn default_surge_max() -> u64 {
    170
}

fn default_donor_fraction() -> f64 {
    0.01
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowParams {
    /// Mean share of a zone's occupants that leaves per tick.
    #[serde(default = "default_base_mobility")]
    pub base_mobility: f64,
    /// Half-width of the uniform noise added to `base_mobility`.
    #[serde(default = "default_mobility_jitter")]
    pub mobility_jitter: f64,
    /// Upper bound of the uniform noise added to each zone's inflow weight.
    #[serde(default = "default_inflow_jitter")]
    pub inflow_jitter: f64,
    #[serde(default = "default_surge_probability")]
    pub surge_probability: f64,
    #[serde(default = "default_surge_min")]
    pub surge_min: u64,
    /// Exclusive.
    #[serde(default = "default_surge_max")]
    pub surge_max: u64,
    #[serde(default = "default_donor_fraction")]
    pub donor_fraction: f64,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            base_mobility: default_base_mobility(),
            mobility_jitter: default_mobility_jitter(),
            inflow_jitter: default_inflow_jitter(),
            surge_probability: default_surge_probability(),
            surge_min: default_surge_min(),
            surge_max: default_surge_max(),
            donor_fraction: default_donor_fraction(),
        }
    }
}

impl FlowParams {
    /// Quiet crowd: no surges, so per-tick drift stays inside mobility bounds.
    pub fn without_surges() -> Self {
        Self {
            surge_probability: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidParameter(msg));
        if !(self.base_mobility >= 0.0 && self.mobility_jitter >= 0.0) {
            return invalid("mobility and jitter must be non-negative".into());
        }
        if self.base_mobility + self.mobility_jitter >= 1.0 {
            return invalid(format!(
                "base_mobility + mobility_jitter must stay below 1.0, got {}",
                self.base_mobility + self.mobility_jitter
            ));
        }
        if !(self.inflow_jitter.is_finite() && self.inflow_jitter >= 0.0) {
            return invalid(format!(
                "inflow_jitter must be finite and non-negative, got {}",
                self.inflow_jitter
            ));
        }
        if !(0.0..=1.0).contains(&self.surge_probability) {
            return invalid(format!(
                "surge_probability must be within [0, 1], got {}",
                self.surge_probability
            ));
        }
        if self.surge_min >= self.surge_max {
            return invalid(format!(
                "surge range {}..{} is empty",
                self.surge_min, self.surge_max
            ));
        }
        if self.surge_max > MAX_SURGE_SIZE + 1 {
            return invalid(format!(
                "surge_max {} exceeds the {MAX_SURGE_SIZE} person ceiling",
                self.surge_max
            ));
        }
        if !(0.0..=1.0).contains(&self.donor_fraction) {
            return invalid(format!(
                "donor_fraction must be within [0, 1], got {}",
                self.donor_fraction
            ));
        }
        Ok(())
    }
}

/// Headcount per zone, indexed in registry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationState {
    people: Vec<u64>,
    total: u64,
}

impl PopulationState {
    /// Splits `total` by normalised weight, flooring each share, then deals
    /// the rounding remainder round-robin in registry order.
    pub fn distribute(registry: &ZoneRegistry, total: u64) -> Self {
        let weight_sum = registry.total_weight();
        let mut people: Vec<u64> = registry
            .zones()
            .iter()
            .map(|zone| (total as f64 * (zone.weight / weight_sum)).floor() as u64)
            .collect();
        let assigned: u64 = people.iter().sum();
        let remainder = total.saturating_sub(assigned);
        let n = people.len();
        for i in 0..remainder as usize {
            people[i % n] += 1;
        }
        let mut state = Self { people, total };
        renormalize(&mut state);
        state
    }

    pub fn people(&self) -> &[u64] {
        &self.people
    }

    /// The conserved headcount.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn current_total(&self) -> u64 {
        self.people.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surge {
    pub zone: ZoneKey,
    pub size: u64,
    pub funded: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowReport {
    pub moved: u64,
    pub surge: Option<Surge>,
    /// Signed headcount added by renormalisation.
    pub correction: i64,
}

#[derive(Debug, Clone)]
pub struct FlowSimulator {
    params: FlowParams,
}

impl FlowSimulator {
    pub fn new(params: FlowParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn step<R: Rng + ?Sized>(
        &self,
        registry: &ZoneRegistry,
        state: &mut PopulationState,
        rng: &mut R,
    ) -> FlowReport {
        let moved = self.outflow(state, rng);
        self.inflow(registry, state, moved, rng);
        let surge = if rng.gen_bool(self.params.surge_probability) {
            Some(self.surge(registry, state, rng))
        } else {
            None
        };
        let correction = renormalize(state);
        debug_assert_eq!(state.current_total(), state.total);

        FlowReport {
            moved,
            surge,
            correction,
        }
    }

    fn outflow<R: Rng + ?Sized>(&self, state: &mut PopulationState, rng: &mut R) -> u64 {
        let mut total_out = 0;
        for count in state.people.iter_mut() {
            let noise = (rng.gen::<f64>() - 0.5) * 2.0 * self.params.mobility_jitter;
            let fraction = (self.params.base_mobility + noise).max(0.0);
            let out = ((*count as f64 * fraction).floor() as u64).min(*count);
            *count -= out;
            total_out += out;
        }
        total_out
    }

    fn inflow<R: Rng + ?Sized>(
        &self,
        registry: &ZoneRegistry,
        state: &mut PopulationState,
        total_out: u64,
        rng: &mut R,
    ) {
        let weights: Vec<f64> = registry
            .zones()
            .iter()
            .map(|zone| zone.weight + rng.gen::<f64>() * self.params.inflow_jitter)
            .collect();
        let weight_sum: f64 = weights.iter().sum();

        let mut allocated = 0;
        for (count, weight) in state.people.iter_mut().zip(&weights) {
            let add = (total_out as f64 * (weight / weight_sum)).floor() as u64;
            *count += add;
            allocated += add;
        }

        let n = state.people.len();
        for _ in 0..total_out.saturating_sub(allocated) {
            state.people[rng.gen_range(0..n)] += 1;
        }
    }

    fn surge<R: Rng + ?Sized>(
        &self,
        registry: &ZoneRegistry,
        state: &mut PopulationState,
        rng: &mut R,
    ) -> Surge {
        let n = state.people.len();
        let target = rng.gen_range(0..n);
        let size = rng.gen_range(self.params.surge_min..self.params.surge_max);
        state.people[target] += size;

        let mut donors: Vec<usize> = (0..n).filter(|&idx| idx != target).collect();
        donors.sort_by(|&a, &b| state.people[b].cmp(&state.people[a]));

        let mut left = size;
        for donor in donors {
            if left == 0 {
                break;
            }
            let available = state.people[donor];
            let share = (available as f64 * self.params.donor_fraction).floor() as u64 + 1;
            let take = left.min(share).min(available);
            state.people[donor] -= take;
            left -= take;
        }

        let zone = registry.zones()[target].key.clone();
        debug!(zone = %zone, size, funded = size - left, "surge");
        Surge {
            zone,
            size,
            funded: size - left,
        }
    }
}

/// Pulls the headcount back to the conserved total: surplus is added to the
/// emptiest zones round-robin, deficit is taken from the fullest zones while
/// skipping empty ones. Whole rounds are applied at once, so the cost depends
/// on the zone count and not on the size of the gap. Returns the signed
/// correction applied.
pub fn renormalize(state: &mut PopulationState) -> i64 {
    let current = state.current_total();
    let n = state.people.len();
    let mut order: Vec<usize> = (0..n).collect();

    if state.total > current {
        let missing = state.total - current;
        order.sort_by_key(|&idx| state.people[idx]);
        let rounds = missing / n as u64;
        let partial = (missing % n as u64) as usize;
        for (rank, &idx) in order.iter().enumerate() {
            state.people[idx] += rounds + u64::from(rank < partial);
        }
        missing as i64
    } else if current > state.total {
        let excess = current - state.total;
        order.sort_by(|&a, &b| state.people[b].cmp(&state.people[a]));
        let mut left = excess;
        // Each pass either empties a zone or settles the remainder.
        while left > 0 {
            let active: Vec<usize> = order
                .iter()
                .copied()
                .filter(|&idx| state.people[idx] > 0)
                .collect();
            let Some(lowest) = active.iter().map(|&idx| state.people[idx]).min() else {
                break;
            };
            let rounds = (left / active.len() as u64).min(lowest);
            if rounds == 0 {
                for &idx in active.iter().take(left as usize) {
                    state.people[idx] -= 1;
                }
                left = 0;
            } else {
                for &idx in &active {
                    state.people[idx] -= rounds;
                }
                left -= rounds * active.len() as u64;
            }
        }
        -(excess as i64)
    } else {
        0
    }
}
