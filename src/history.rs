//! Rolling per-zone density series for charting.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;
use crate::zones::ZoneKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub tick: u64,
    pub recorded_at: DateTime<Utc>,
    pub densities: BTreeMap<ZoneKey, f64>,
}

impl HistoryEntry {
    pub fn time_label(&self) -> String {
        self.recorded_at
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTrend {
    pub zone: ZoneKey,
    pub latest: f64,
    pub mean: f64,
    pub peak: f64,
    pub peak_tick: u64,
}

/// Keeps the newest `capacity` rows; older rows fall off the front.
#[derive(Debug, Clone)]
pub struct DensityHistory {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl DensityHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, snapshot: &Snapshot) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            tick: snapshot.tick,
            recorded_at: Utc::now(),
            densities: snapshot
                .zones
                .iter()
                .map(|zone| (zone.key.clone(), zone.density))
                .collect(),
        });
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn series<'a>(&'a self, zone: &'a str) -> impl Iterator<Item = (u64, f64)> + 'a {
        self.entries
            .iter()
            .filter_map(move |entry| entry.densities.get(zone).map(|d| (entry.tick, *d)))
    }

    pub fn latest(&self, zone: &str) -> Option<f64> {
        self.series(zone).last().map(|(_, density)| density)
    }

    pub fn mean(&self, zone: &str) -> Option<f64> {
        let (count, sum) = self
            .series(zone)
            .fold((0usize, 0.0), |(count, sum), (_, d)| (count + 1, sum + d));
        (count > 0).then(|| sum / count as f64)
    }

    /// Highest density in the window and the tick it was seen at. Ties keep
    /// the earliest tick.
    pub fn peak(&self, zone: &str) -> Option<(u64, f64)> {
        self.series(zone).fold(None, |best, (tick, density)| match best {
            Some((_, top)) if top >= density => best,
            _ => Some((tick, density)),
        })
    }

    pub fn trends(&self) -> Vec<ZoneTrend> {
        let Some(last) = self.entries.back() else {
            return Vec::new();
        };
        last.densities
            .keys()
            .filter_map(|zone| {
                let (peak_tick, peak) = self.peak(zone.as_str())?;
                Some(ZoneTrend {
                    zone: zone.clone(),
                    latest: self.latest(zone.as_str())?,
                    mean: self.mean(zone.as_str())?,
                    peak,
                    peak_tick,
                })
            })
            .collect()
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let rows: Vec<&HistoryEntry> = self.entries.iter().collect();
        let json = serde_json::to_string_pretty(&rows)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
