use tracing::{debug, info, warn};

use super::can_transition;
use super::normalizer::normalize;
use super::planner::PlanGenerator;
use super::types::{AggregatedResult, HistoryTurn, Plan, RunState, StepRecord};
use crate::core::steps::{StepOutput, StepRegistry, StepRole};

/// Plans a request, then drives the steps in order with a single rolling
/// context slot.
pub struct Orchestrator {
    planner: PlanGenerator,
    steps: StepRegistry,
}

/// Mutable state of one `execute` call.
struct Run {
    state: RunState,
    result: AggregatedResult,
    context: Option<StepOutput>,
}

impl Run {
    fn new(query: &str, plan: Plan) -> Self {
        Self {
            state: RunState::NotStarted,
            result: AggregatedResult::new(query, plan),
            context: None,
        }
    }

    fn transition(&mut self, to: RunState) {
        debug_assert!(
            can_transition(self.state, to),
            "illegal run transition {:?} -> {:?}",
            self.state,
            to
        );
        debug!("Run {} -> {}", self.state.as_str(), to.as_str());
        self.state = to;
    }

    fn adopt(&mut self, output: &StepOutput) {
        self.result.final_data = output.data.clone();
        self.result.final_columns = output.columns.clone();
        self.context = Some(output.clone());
    }

    /// Folds a successful invocation into the aggregate according to the
    /// step's role.
    fn route(&mut self, role: StepRole, output: StepOutput) -> StepOutput {
        match role {
            StepRole::Report => self.result.report = output.report.clone(),
            StepRole::Visualization => self.result.viz_config = output.config.clone(),
            StepRole::Anomaly => {
                self.result.anomalies.extend(output.anomalies.iter().cloned());
                if !output.is_failure() && output.has_data() {
                    self.adopt(&output);
                }
            }
            StepRole::Analytical => match &output.error {
                Some(error) => {
                    warn!("{} failed: {}", output.step, error);
                    self.result.error = Some(error.clone());
                }
                None => self.adopt(&output),
            },
        }
        output
    }
}

impl Orchestrator {
    pub fn new(planner: PlanGenerator, steps: StepRegistry) -> Self {
        Self { planner, steps }
    }

    pub fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    pub async fn execute(&self, query: &str, history: &[HistoryTurn]) -> AggregatedResult {
        let plan = normalize(self.planner.generate(query, history).await);
        self.execute_plan(query, plan).await
    }

    /// Runs `plan.steps` exactly as given. `execute` normalizes first.
    pub async fn execute_plan(&self, query: &str, plan: Plan) -> AggregatedResult {
        let order = plan.steps.clone();
        let mut run = Run::new(query, plan);
        run.transition(RunState::Iterating);

        for id in &order {
            let Some((step_id, step)) = self.steps.resolve(id) else {
                debug!("Skipping unresolvable step '{}'", id);
                continue;
            };
            let role = step_id.role();
            debug!("Running {} as {} ({:?})", step_id, step.name(), role);

            let record = match step.run(query, run.context.as_ref()).await {
                Ok(output) => StepRecord::Completed(run.route(role, output)),
                Err(e) => {
                    let error = format!("{:#}", e);
                    warn!("{} could not run: {}", step_id, error);
                    if role == StepRole::Analytical {
                        run.result.error = Some(error.clone());
                    }
                    StepRecord::Failed { error }
                }
            };
            run.result.step_results.insert(id.clone(), record);
        }

        run.transition(RunState::Completed);
        info!(
            "Pipeline finished: {} step results, {} rows, error: {}",
            run.result.step_results.len(),
            run.result.final_data.len(),
            run.result.error.as_deref().unwrap_or("none")
        );
        run.result
    }
}
