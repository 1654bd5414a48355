mod plan_parsing;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::llm::testing::{ScriptedProvider, client};
use crate::core::orchestrator::{Orchestrator, PlanGenerator};
use crate::core::steps::{Step, StepId, StepOutput, StepRegistry};

pub(super) type Journal = Arc<Mutex<Vec<String>>>;

/// Step that replays canned results and records the context it was given.
pub(super) struct ScriptedStep {
    id: StepId,
    script: Mutex<VecDeque<Result<StepOutput, String>>>,
    journal: Journal,
    pub(super) contexts: Mutex<Vec<Option<StepOutput>>>,
}

impl ScriptedStep {
    pub(super) fn new(
        id: StepId,
        journal: &Journal,
        script: Vec<Result<StepOutput, String>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            script: Mutex::new(script.into()),
            journal: journal.clone(),
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub(super) fn seen_context(&self, call: usize) -> Option<StepOutput> {
        self.contexts.lock().unwrap()[call].clone()
    }
}

#[async_trait]
impl Step for ScriptedStep {
    fn id(&self) -> StepId {
        self.id
    }

    fn name(&self) -> &'static str {
        "Scripted"
    }

    async fn run(
        &self,
        _request: &str,
        context: Option<&StepOutput>,
    ) -> anyhow::Result<StepOutput> {
        self.journal
            .lock()
            .unwrap()
            .push(self.id.as_str().to_string());
        self.contexts.lock().unwrap().push(context.cloned());
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(out)) => Ok(out),
            Some(Err(e)) => Err(anyhow::anyhow!(e)),
            None => Ok(StepOutput::new(self.id, "noop")),
        }
    }
}

pub(super) fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub(super) fn table(id: StepId, operation: &str, rows: Value) -> StepOutput {
    let data: Vec<crate::core::warehouse::Row> = serde_json::from_value(rows).unwrap();
    let mut out = StepOutput::new(id, operation);
    out.columns = data
        .first()
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default();
    out.row_count = data.len();
    out.data = data;
    out
}

pub(super) fn domain_failure(id: StepId, message: &str) -> StepOutput {
    let mut out = StepOutput::new(id, "failed");
    out.error = Some(message.to_string());
    out
}

/// Orchestrator whose planner always replies with `planner_reply`.
pub(super) fn orchestrator_with(planner_reply: &str, steps: Vec<Arc<ScriptedStep>>) -> Orchestrator {
    let llm = Arc::new(client(Arc::new(ScriptedProvider::replying(planner_reply))));
    let mut registry = StepRegistry::new();
    for step in steps {
        registry.register(step);
    }
    Orchestrator::new(PlanGenerator::new(llm), registry)
}

pub(super) fn orchestrator(steps: Vec<Arc<ScriptedStep>>) -> Orchestrator {
    orchestrator_with("not a plan", steps)
}
