//! Drives the engine at a fixed cadence.
//!
//! Ticks are strictly sequential: the loop only awaits between ticks, and a
//! late timer is delayed rather than bursting to catch up.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::snapshot::Snapshot;

const MAX_STATS_HISTORY: usize = 100;

/// Timing for a single tick
#[derive(Debug, Clone)]
pub struct TickStats {
    pub tick: u64,
    pub engine_time: Duration,
    pub duration: Duration,
}

/// Requests delivered to the task that owns the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Observe { zone: String, people: u64 },
}

pub struct TickScheduler {
    cadence: Duration,
    stats_history: VecDeque<TickStats>,
}

impl TickScheduler {
    pub fn new(cadence: Duration) -> Self {
        Self {
            cadence,
            stats_history: VecDeque::with_capacity(MAX_STATS_HISTORY),
        }
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    /// Get recent tick statistics
    pub fn recent_stats(&self) -> impl Iterator<Item = &TickStats> {
        self.stats_history.iter()
    }

    pub fn average_tick_time(&self) -> Option<Duration> {
        if self.stats_history.is_empty() {
            return None;
        }
        let total: Duration = self.stats_history.iter().map(|s| s.duration).sum();
        Some(total / self.stats_history.len() as u32)
    }

    /// Runs `ticks` steps on a virtual clock spaced by the cadence, as fast
    /// as the engine allows.
    pub fn run_virtual(&mut self, engine: &mut Engine, ticks: u64) -> Option<Arc<Snapshot>> {
        let mut latest = None;
        for _ in 0..ticks {
            let now = self.cadence * (engine.current_tick() + 1) as u32;
            latest = Some(self.step(engine, now));
        }
        latest
    }

    /// Real-time loop. Commands are applied between ticks; the loop exits
    /// when `shutdown` resolves.
    pub async fn run<F>(
        &mut self,
        engine: &mut Engine,
        mut commands: mpsc::Receiver<EngineCommand>,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        let started = time::Instant::now();
        let mut interval = time::interval_at(started + self.cadence, self.cadence);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.step(engine, started.elapsed());
                }
                Some(command) = commands.recv() => {
                    apply_command(engine, command, started.elapsed());
                }
            }
        }
        debug!(ticks = engine.current_tick(), "scheduler stopped");
    }

    fn step(&mut self, engine: &mut Engine, now: Duration) -> Arc<Snapshot> {
        let start = Instant::now();
        let snapshot = engine.tick(now);
        let stats = TickStats {
            tick: snapshot.tick,
            engine_time: now,
            duration: start.elapsed(),
        };
        if self.stats_history.len() == MAX_STATS_HISTORY {
            self.stats_history.pop_front();
        }
        self.stats_history.push_back(stats);
        snapshot
    }
}

fn apply_command(engine: &mut Engine, command: EngineCommand, now: Duration) {
    match command {
        EngineCommand::Observe { zone, people } => {
            if let Err(err) = engine.report_observation(&zone, people, now) {
                warn!(%zone, people, "observation rejected: {err}");
            }
        }
    }
}
