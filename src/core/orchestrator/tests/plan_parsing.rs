use std::sync::Arc;

use crate::core::llm::LlmError;
use crate::core::llm::testing::{ScriptedProvider, client};
use crate::core::orchestrator::planner::{FALLBACK_REASONING, history_suffix};
use crate::core::orchestrator::{
    Complexity, HistoryTurn, Metric, PlanGenerator, PlanParseError, fallback_plan, parse_plan,
};

#[test]
fn parses_full_plan() {
    let plan = parse_plan(
        r#"{
            "intent": "Compare regions year over year",
            "steps": ["kpi_calculator", "visualization", "report"],
            "primary_step": "kpi_calculator",
            "complexity": "multi_step",
            "parameters": {
                "filters": {"year": [2023, 2024]},
                "group_by": ["region"],
                "metric": "revenue",
                "top_n": 5
            },
            "reasoning": "YoY comparison"
        }"#,
    )
    .unwrap();
    assert_eq!(plan.steps, vec!["kpi_calculator", "visualization", "report"]);
    assert_eq!(plan.primary_step.as_deref(), Some("kpi_calculator"));
    assert_eq!(plan.complexity, Complexity::MultiStep);
    assert_eq!(plan.parameters.group_by, vec!["region"]);
    assert_eq!(plan.parameters.metric, Some(Metric::Revenue));
    assert_eq!(plan.parameters.top_n, Some(5));
    assert!(plan.parameters.filters.contains_key("year"));
}

#[test]
fn accepts_legacy_field_names_inside_fences() {
    let plan = parse_plan(
        "```json\n{\"intent\": \"top countries\", \"agents\": [\"kpi_calculator\", \"report_generator\"], \
         \"primary_agent\": \"kpi_calculator\", \"parameters\": {\"groupby\": [\"country\"], \"top_n\": \"5\"}}\n```",
    )
    .unwrap();
    assert_eq!(plan.steps, vec!["kpi_calculator", "report_generator"]);
    assert_eq!(plan.primary_step.as_deref(), Some("kpi_calculator"));
    assert_eq!(plan.parameters.group_by, vec!["country"]);
    assert_eq!(plan.parameters.top_n, Some(5));
    assert_eq!(plan.complexity, Complexity::Simple);
    assert!(plan.reasoning.is_empty());
}

#[test]
fn unknown_enum_labels_are_tolerated() {
    let plan = parse_plan(
        r#"{"intent": "x", "steps": ["cube_operations"], "complexity": "epic",
            "parameters": {"metric": "revenue | profit", "top_n": null}}"#,
    )
    .unwrap();
    assert_eq!(plan.complexity, Complexity::Simple);
    assert_eq!(plan.parameters.metric, None);
    assert_eq!(plan.parameters.top_n, None);
}

#[test]
fn explicit_nulls_read_as_absent_fields() {
    let plan = parse_plan(
        r#"{"intent": "x", "steps": ["kpi_calculator"], "reasoning": null}"#,
    )
    .unwrap();
    assert_eq!(plan.steps, vec!["kpi_calculator"]);
    assert!(plan.reasoning.is_empty());

    let plan = parse_plan(r#"{"intent": "x", "steps": ["kpi_calculator"], "parameters": null}"#)
        .unwrap();
    assert_eq!(plan.steps, vec!["kpi_calculator"]);
    assert!(plan.parameters.filters.is_empty());
    assert!(plan.parameters.group_by.is_empty());

    let plan = parse_plan(
        r#"{"intent": "x", "steps": ["kpi_calculator"],
            "parameters": {"filters": null, "group_by": ["region"], "metric": "profit"}}"#,
    )
    .unwrap();
    assert!(plan.parameters.filters.is_empty());
    assert_eq!(plan.parameters.group_by, vec!["region"]);
    assert_eq!(plan.parameters.metric, Some(Metric::Profit));

    let plan = parse_plan(
        r#"{"intent": "x", "steps": ["kpi_calculator"],
            "parameters": {"filters": {"year": 2024}, "group_by": null, "top_n": null}}"#,
    )
    .unwrap();
    assert!(plan.parameters.group_by.is_empty());
    assert!(plan.parameters.filters.contains_key("year"));
    assert_eq!(plan.parameters.top_n, None);
}

#[test]
fn malformed_replies_are_rejected() {
    assert!(matches!(
        parse_plan("Sure! I would run the cube step."),
        Err(PlanParseError::Json(_))
    ));
    assert!(matches!(
        parse_plan(r#"{"intent": "x", "steps": []}"#),
        Err(PlanParseError::NoSteps)
    ));
    assert!(matches!(
        parse_plan(r#"{"intent": "  ", "steps": ["report"]}"#),
        Err(PlanParseError::NoIntent)
    ));
    assert!(parse_plan(r#"{"steps": ["report"]}"#).is_err());
    assert!(parse_plan("```json\n{\"intent\": \"x\"").is_err());
}

#[test]
fn fallback_plan_shape() {
    let plan = fallback_plan("Show only Q4 2024 sales");
    assert_eq!(plan.intent, "Show only Q4 2024 sales");
    assert_eq!(plan.steps, vec!["cube_operations", "report", "visualization"]);
    assert_eq!(plan.primary_step.as_deref(), Some("cube_operations"));
    assert_eq!(plan.complexity, Complexity::Simple);
    assert!(plan.parameters.filters.is_empty());
    assert!(plan.parameters.group_by.is_empty());
    assert_eq!(plan.parameters.metric, None);
    assert_eq!(plan.reasoning, FALLBACK_REASONING);
}

#[test]
fn history_is_windowed_to_the_last_three_turns() {
    assert_eq!(history_suffix(&[]), "");
    let history: Vec<HistoryTurn> = (1..=5)
        .map(|i| HistoryTurn::new("user", format!("turn {i}")))
        .collect();
    let suffix = history_suffix(&history);
    assert!(suffix.contains("last 3 turns"));
    assert!(!suffix.contains("turn 2"));
    assert!(suffix.contains("turn 3"));
    assert!(suffix.contains("turn 5"));
}

#[tokio::test]
async fn generator_never_fails() {
    let garbage = Arc::new(ScriptedProvider::replying("I cannot help with that"));
    let planner = PlanGenerator::new(Arc::new(client(garbage)));
    let plan = planner.generate("q", &[]).await;
    assert_eq!(plan.reasoning, FALLBACK_REASONING);

    let down = Arc::new(ScriptedProvider::new(vec![Err(LlmError::from_status(
        "scripted",
        401,
        "bad key".to_string(),
    ))]));
    let planner = PlanGenerator::new(Arc::new(client(down)));
    let plan = planner.generate("q", &[]).await;
    assert_eq!(plan, fallback_plan("q"));
}

#[tokio::test]
async fn generator_sends_request_and_history() {
    let provider = Arc::new(ScriptedProvider::replying(
        r#"{"intent": "i", "steps": ["anomaly_detection"]}"#,
    ));
    let planner = PlanGenerator::new(Arc::new(client(provider.clone())));
    let history = vec![
        HistoryTurn::new("user", "revenue by region"),
        HistoryTurn::new("assistant", "Europe leads"),
    ];

    let plan = planner.generate("what is unusual there?", &history).await;
    assert_eq!(plan.steps, vec!["anomaly_detection"]);

    let seen = provider.seen.lock().unwrap();
    let system = &seen[0][0].content;
    let user = &seen[0][1].content;
    assert!(system.contains("\"dimension_navigator\""));
    assert!(user.contains("User query: what is unusual there?"));
    assert!(user.contains("Europe leads"));
}
