use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::snapshot::{RiskLevel, Snapshot};
use crate::zones::ZoneKey;

const MAX_RECENT_ALERTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub zone: ZoneKey,
    pub name: String,
    pub tick: u64,
    pub people: u64,
    pub intensity: f64,
    pub raised_at_secs: f64,
}

/// Raises an alert when a zone reaches high risk, then stays quiet for that
/// zone until `cooldown` of engine time has passed.
#[derive(Debug, Clone)]
pub struct RiskAlertMonitor {
    cooldown: Duration,
    last_raised: HashMap<ZoneKey, f64>,
    recent: VecDeque<RiskAlert>,
}

impl RiskAlertMonitor {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_raised: HashMap::new(),
            recent: VecDeque::new(),
        }
    }

    pub fn inspect(&mut self, snapshot: &Snapshot) -> Vec<RiskAlert> {
        let now = snapshot.elapsed_secs;
        let cooldown = self.cooldown.as_secs_f64();
        let mut raised = Vec::new();

        for zone in snapshot
            .zones
            .iter()
            .filter(|zone| zone.risk_level == RiskLevel::High)
        {
            let cooling = self
                .last_raised
                .get(&zone.key)
                .is_some_and(|last| now - last < cooldown);
            if cooling {
                continue;
            }

            warn!(
                zone = %zone.key,
                name = %zone.name,
                people = zone.people,
                intensity = zone.intensity,
                "high crowd risk"
            );
            self.last_raised.insert(zone.key.clone(), now);
            raised.push(RiskAlert {
                zone: zone.key.clone(),
                name: zone.name.clone(),
                tick: snapshot.tick,
                people: zone.people,
                intensity: zone.intensity,
                raised_at_secs: now,
            });
        }

        for alert in &raised {
            if self.recent.len() == MAX_RECENT_ALERTS {
                self.recent.pop_front();
            }
            self.recent.push_back(alert.clone());
        }
        raised
    }

    pub fn recent(&self) -> impl Iterator<Item = &RiskAlert> {
        self.recent.iter()
    }
}
