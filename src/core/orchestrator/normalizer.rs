use super::types::Plan;
use crate::core::steps::{StepId, StepRole};

fn role_of(id: &str) -> Option<StepRole> {
    StepId::parse(id).map(StepId::role)
}

/// Enforces the ordering rules on a step list: exactly one visualization
/// (first occurrence kept, appended when absent) and exactly one report,
/// always last. Everything else keeps its order, duplicates included.
pub fn normalize_steps(steps: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(steps.len() + 2);
    let mut has_viz = false;

    for id in steps {
        match role_of(id) {
            Some(StepRole::Report) => {}
            Some(StepRole::Visualization) => {
                if !has_viz {
                    out.push(StepId::Visualization.as_str().to_string());
                    has_viz = true;
                }
            }
            _ => out.push(id.clone()),
        }
    }

    if !has_viz {
        out.push(StepId::Visualization.as_str().to_string());
    }
    out.push(StepId::Report.as_str().to_string());
    out
}

/// Pure: returns a new plan whose steps satisfy the ordering rules.
pub fn normalize(plan: Plan) -> Plan {
    let steps = normalize_steps(&plan.steps);
    Plan { steps, ..plan }
}
