mod estimator;
mod flow;

pub use estimator::{DensityEstimator, EstimatorParams, SmoothedMetrics};
pub use flow::{renormalize, FlowParams, MAX_SURGE_SIZE, FlowReport, FlowSimulator, PopulationState, Surge};
