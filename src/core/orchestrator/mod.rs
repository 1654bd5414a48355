pub mod cache;
mod executor;
pub mod factory;
pub mod normalizer;
pub mod planner;
pub mod types;

#[cfg(test)]
mod tests;

pub use cache::{OrchestratorCache, OrchestratorFactory, ProviderError};
pub use executor::Orchestrator;
pub use factory::ProviderOrchestratorFactory;
pub use normalizer::normalize;
pub use planner::{PlanGenerator, PlanParseError, fallback_plan, parse_plan};
pub use types::{
    AggregatedResult, Complexity, HistoryTurn, Metric, Plan, PlanParameters, RunState, StepRecord,
};

pub fn can_transition(from: RunState, to: RunState) -> bool {
    if from == to {
        return true;
    }
    match from {
        RunState::NotStarted => matches!(to, RunState::Iterating),
        RunState::Iterating => matches!(to, RunState::Completed),
        RunState::Completed => false,
    }
}
