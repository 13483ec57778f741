use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::EngineError,
    rng::RngManager,
    snapshot::{Snapshot, ZoneSnapshot},
    systems::{
        DensityEstimator, EstimatorParams, FlowParams, FlowReport, FlowSimulator,
        PopulationState,
    },
    zones::{ZoneConfig, ZoneRegistry},
};

const FLOW_STREAM: &str = "flow";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Headcounts come from the internal flow simulator.
    #[default]
    Simulated,
    /// Headcounts are pushed in through `Engine::report_observation`.
    External,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    pub total_population: u64,
    pub feed: FeedMode,
    pub flow: FlowParams,
    pub estimator: EstimatorParams,
}

pub type SubscriptionId = u64;

type Subscriber = Box<dyn FnMut(&Arc<Snapshot>) + Send>;

pub struct EngineBuilder {
    settings: EngineSettings,
    zones: Vec<ZoneConfig>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            zones: Vec::new(),
        }
    }

    pub fn with_zones(mut self, zones: Vec<ZoneConfig>) -> Self {
        self.zones = zones;
        self
    }

    /// Validates everything up front; nothing is built on error.
    pub fn build(self) -> Result<Engine, EngineError> {
        let registry = Arc::new(ZoneRegistry::configure(self.zones)?);
        let flow = FlowSimulator::new(self.settings.flow.clone())?;
        let estimator = DensityEstimator::new(self.settings.estimator.clone())?;
        let population = PopulationState::distribute(&registry, self.settings.total_population);
        let zone_count = registry.len();

        info!(
            scenario = %self.settings.scenario_name,
            zones = zone_count,
            feed = ?self.settings.feed,
            seed = self.settings.seed,
            "engine configured"
        );

        let mut engine = Engine {
            rng: RngManager::new(self.settings.seed),
            registry,
            population,
            flow,
            estimator,
            tick: 0,
            pending: vec![None; zone_count],
            zone_snapshots: vec![None; zone_count],
            latest: None,
            last_flow: None,
            subscribers: Vec::new(),
            next_subscription: 0,
            settings: self.settings,
        };
        if engine.settings.feed == FeedMode::Simulated {
            engine.prime();
        }
        Ok(engine)
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    people: u64,
    seen_at: Duration,
}

/// Owns all mutable crowd state. Readers only ever receive `Arc<Snapshot>`
/// values, so the engine itself is meant to live on one task or thread.
pub struct Engine {
    settings: EngineSettings,
    registry: Arc<ZoneRegistry>,
    population: PopulationState,
    flow: FlowSimulator,
    estimator: DensityEstimator,
    rng: RngManager,
    tick: u64,
    pending: Vec<Option<Observation>>,
    zone_snapshots: Vec<Option<ZoneSnapshot>>,
    latest: Option<Arc<Snapshot>>,
    last_flow: Option<FlowReport>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: SubscriptionId,
}

impl Engine {
    pub fn registry(&self) -> &Arc<ZoneRegistry> {
        &self.registry
    }

    pub fn feed(&self) -> FeedMode {
        self.settings.feed
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn population(&self) -> &PopulationState {
        &self.population
    }

    pub fn last_flow(&self) -> Option<&FlowReport> {
        self.last_flow.as_ref()
    }

    /// Latest published state, for callers that join late.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.latest.clone()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Arc<Snapshot>) + Send + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Queues a headcount from an outside producer. The newest report per
    /// zone is folded in on the next tick.
    pub fn report_observation(
        &mut self,
        zone: &str,
        people: u64,
        seen_at: Duration,
    ) -> Result<(), EngineError> {
        if self.settings.feed != FeedMode::External {
            return Err(EngineError::SimulatedFeed);
        }
        let index = self.registry.index_of(zone)?;
        self.pending[index] = Some(Observation { people, seen_at });
        Ok(())
    }

    /// Advances one step at engine time `now` and notifies every subscriber.
    pub fn tick(&mut self, now: Duration) -> Arc<Snapshot> {
        self.tick += 1;
        match self.settings.feed {
            FeedMode::Simulated => {
                let mut rng = self.rng.stream(FLOW_STREAM);
                let report = self
                    .flow
                    .step(&self.registry, &mut self.population, &mut rng);
                self.last_flow = Some(report);
                self.observe_population(now);
            }
            FeedMode::External => {
                for (index, zone) in self.registry.zones().iter().enumerate() {
                    if let Some(observation) = self.pending[index].take() {
                        self.zone_snapshots[index] = Some(self.estimator.observe(
                            zone,
                            observation.people,
                            observation.seen_at,
                        ));
                    }
                }
            }
        }

        let snapshot = Arc::new(self.assemble(now));
        self.latest = Some(snapshot.clone());
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&snapshot);
        }
        debug!(
            tick = self.tick,
            zones = snapshot.zones.len(),
            people = snapshot.total_people(),
            "tick published"
        );
        snapshot
    }

    /// Tears the engine down, dropping every subscriber.
    pub fn dispose(mut self) {
        let subscribers = self.subscribers.len();
        self.subscribers.clear();
        info!(
            scenario = %self.settings.scenario_name,
            ticks = self.tick,
            subscribers,
            "engine disposed"
        );
    }

    fn prime(&mut self) {
        self.observe_population(Duration::ZERO);
        self.latest = Some(Arc::new(self.assemble(Duration::ZERO)));
    }

    fn observe_population(&mut self, now: Duration) {
        for (index, zone) in self.registry.zones().iter().enumerate() {
            let people = self.population.people()[index];
            self.zone_snapshots[index] = Some(self.estimator.observe(zone, people, now));
        }
    }

    fn assemble(&self, now: Duration) -> Snapshot {
        Snapshot {
            scenario: self.settings.scenario_name.clone(),
            tick: self.tick,
            elapsed_secs: now.as_secs_f64(),
            zones: self.zone_snapshots.iter().flatten().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn settings(feed: FeedMode) -> EngineSettings {
        EngineSettings {
            scenario_name: "two_zones".into(),
            seed: 11,
            total_population: 1_000,
            feed,
            flow: FlowParams::default(),
            estimator: EstimatorParams::default(),
        }
    }

    fn two_zones() -> Vec<ZoneConfig> {
        vec![
            ZoneConfig::new("A", "North", 100.0, 0.5),
            ZoneConfig::new("B", "South", 100.0, 0.5),
        ]
    }

    fn engine(feed: FeedMode) -> Engine {
        EngineBuilder::new(settings(feed))
            .with_zones(two_zones())
            .build()
            .unwrap()
    }

    #[test]
    fn simulated_engine_primes_tick_zero() {
        let engine = engine(FeedMode::Simulated);
        let snapshot = engine.snapshot().expect("primed snapshot");
        assert_eq!(snapshot.tick, 0);
        assert_eq!(snapshot.zones.len(), 2);
        assert_eq!(snapshot.zone("A").unwrap().people, 500);
        assert!((snapshot.zone("B").unwrap().density - 5.0).abs() < 1e-12);
    }

    #[test]
    fn subscribers_receive_each_tick_until_unsubscribed() {
        let mut engine = engine(FeedMode::Simulated);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = engine.subscribe(move |snapshot| sink.lock().unwrap().push(snapshot.tick));
        assert_eq!(engine.subscriber_count(), 1);

        engine.tick(Duration::from_secs(1));
        engine.tick(Duration::from_secs(2));
        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));
        assert_eq!(engine.subscriber_count(), 0);
        engine.tick(Duration::from_secs(3));

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(engine.snapshot().unwrap().tick, 3);
    }

    #[test]
    fn simulated_engine_rejects_observations() {
        let mut engine = engine(FeedMode::Simulated);
        assert!(matches!(
            engine.report_observation("A", 10, Duration::ZERO),
            Err(EngineError::SimulatedFeed)
        ));
    }

    #[test]
    fn external_feed_publishes_reported_zones_only() {
        let mut engine = engine(FeedMode::External);
        assert!(engine.snapshot().is_none());

        engine
            .report_observation("A", 40, Duration::from_millis(100))
            .unwrap();
        engine
            .report_observation("A", 50, Duration::from_millis(900))
            .unwrap();
        let first = engine.tick(Duration::from_secs(1));
        assert_eq!(first.zones.len(), 1);
        let zone = first.zone("A").unwrap();
        assert_eq!(zone.people, 50);
        assert!((zone.intensity - 0.6 * 0.5).abs() < 1e-12);

        engine
            .report_observation("B", 10, Duration::from_millis(1_500))
            .unwrap();
        let second = engine.tick(Duration::from_secs(2));
        assert_eq!(second.zones.len(), 2);
        assert_eq!(second.zones[0].key.as_str(), "A");
        assert_eq!(second.zone("A"), first.zone("A"));
    }

    #[test]
    fn unknown_zone_is_reported() {
        let mut engine = engine(FeedMode::External);
        assert!(matches!(
            engine.report_observation("Z", 1, Duration::ZERO),
            Err(EngineError::Zone(_))
        ));
    }

    #[test]
    fn bad_configuration_builds_nothing() {
        let result = EngineBuilder::new(settings(FeedMode::Simulated))
            .with_zones(vec![ZoneConfig::new("A", "A", -1.0, 1.0)])
            .build();
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
