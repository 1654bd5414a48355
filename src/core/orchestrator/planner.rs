use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::types::{Complexity, HistoryTurn, Plan, PlanParameters};
use crate::core::llm::{LlmClient, strip_code_fences};
use crate::core::steps::StepId;

/// Turns of history forwarded to the decision service.
pub const HISTORY_WINDOW: usize = 3;

pub const FALLBACK_REASONING: &str = "Default fallback plan";

#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("plan is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plan has no steps")]
    NoSteps,

    #[error("plan has no intent")]
    NoIntent,
}

fn planner_prompt() -> String {
    let mut steps = String::new();
    for (i, id) in StepId::ALL.iter().enumerate() {
        steps.push_str(&format!(
            "{}. \"{}\" – {}\n",
            i + 1,
            id.as_str(),
            id.describe()
        ));
    }
    format!(
        r#"You are the Planner for a multi-step OLAP BI platform.
Analyze the user's natural language question and decide which steps to run, in order.

AVAILABLE STEPS:
{steps}
OUTPUT FORMAT (strict JSON):
{{
  "intent": "one sentence describing what the user wants",
  "steps": ["step1", "step2", ...],
  "primary_step": "the main step doing the analysis",
  "complexity": "simple" | "multi_step",
  "parameters": {{
    "filters": {{}},
    "group_by": [],
    "metric": "revenue | profit | quantity | profit_margin",
    "top_n": null
  }},
  "reasoning": "why these steps were selected"
}}

RULES:
- Always include "report" as the last step.
- Always include "visualization" when the question involves trends or comparisons.
- For "drill into top performer by month" use dimension_navigator then kpi_calculator.
- For "compare X vs Y" use kpi_calculator.
- For "show only / filter to" use cube_operations.
- For "find anomalies / what's unusual" use anomaly_detection.
- Return ONLY valid JSON."#
    )
}

/// Strict decode of the decision service's reply.
pub fn parse_plan(raw: &str) -> Result<Plan, PlanParseError> {
    let plan: Plan = serde_json::from_str(strip_code_fences(raw))?;
    if plan.steps.is_empty() {
        return Err(PlanParseError::NoSteps);
    }
    if plan.intent.trim().is_empty() {
        return Err(PlanParseError::NoIntent);
    }
    Ok(plan)
}

/// Deterministic plan used whenever the decision service's reply is unusable.
pub fn fallback_plan(request: &str) -> Plan {
    Plan {
        intent: request.to_string(),
        steps: vec![
            StepId::CubeOperations.as_str().to_string(),
            StepId::Report.as_str().to_string(),
            StepId::Visualization.as_str().to_string(),
        ],
        primary_step: Some(StepId::CubeOperations.as_str().to_string()),
        complexity: Complexity::Simple,
        parameters: PlanParameters::default(),
        reasoning: FALLBACK_REASONING.to_string(),
    }
}

/// The last `HISTORY_WINDOW` turns, serialized for the prompt.
pub fn history_suffix(history: &[HistoryTurn]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    let encoded = serde_json::to_string(recent).unwrap_or_default();
    format!(
        "\nConversation history (last {} turns): {}",
        recent.len(),
        encoded
    )
}

pub struct PlanGenerator {
    llm: Arc<LlmClient>,
}

impl PlanGenerator {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// Never fails: any decision-service or decoding problem yields the
    /// fallback plan.
    pub async fn generate(&self, request: &str, history: &[HistoryTurn]) -> Plan {
        let user = format!(
            "User query: {request}{}\n\nProduce the plan JSON:",
            history_suffix(history)
        );
        let raw = match self.llm.complete(&planner_prompt(), &user).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Planner call failed ({}), using fallback plan", e);
                return fallback_plan(request);
            }
        };

        match parse_plan(&raw) {
            Ok(plan) => {
                info!(
                    "Plan: {:?} ({}, primary {:?})",
                    plan.steps,
                    plan.complexity.as_str(),
                    plan.primary_step
                );
                plan
            }
            Err(e) => {
                warn!("Planner reply unusable ({}), using fallback plan", e);
                fallback_plan(request)
            }
        }
    }
}
