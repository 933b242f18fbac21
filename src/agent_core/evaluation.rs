//! Evaluation harness — replays fixed inputs and scores tool selection.
//!
//! Each case runs on a fresh orchestrator from the caller's factory, so no
//! history, compaction state or audit log leaks between cases. A case
//! passes when any tool request in its conversation names the expected
//! tool. Turn errors fail the case but not the experiment.

use serde::{Deserialize, Serialize};

use super::errors::AgentError;
use super::orchestrator::Orchestrator;

// ─── Records ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalCase {
    pub input: String,
    pub expected_tool_name: String,
}

impl EvalCase {
    pub fn new(input: &str, expected_tool_name: &str) -> Self {
        Self {
            input: input.to_string(),
            expected_tool_name: expected_tool_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalResult {
    pub input: String,
    pub expected_tool_name: String,
    /// The matching tool if it was requested, else the first one requested.
    pub actual_tool_name: Option<String>,
    pub passed: bool,
    /// 1.0 on a match, 0.0 otherwise.
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentReport {
    pub experiment_name: String,
    #[serde(rename = "perCaseResults")]
    pub results: Vec<EvalResult>,
    /// Mean score in `[0, 1]`; 0 for an empty experiment.
    pub average_score: f64,
    pub passed: usize,
    pub failed: usize,
}

// ─── Harness ────────────────────────────────────────────────────────────────

/// Run every case against a fresh orchestrator and score it.
pub async fn run_experiment<F>(
    experiment_name: &str,
    cases: &[EvalCase],
    factory: F,
) -> ExperimentReport
where
    F: Fn() -> Result<Orchestrator, AgentError>,
{
    tracing::info!(experiment = experiment_name, cases = cases.len(), "experiment started");

    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        let result = run_case(case, &factory).await;
        tracing::info!(
            experiment = experiment_name,
            input = %case.input,
            expected = %case.expected_tool_name,
            actual = ?result.actual_tool_name,
            passed = result.passed,
            "eval case scored"
        );
        results.push(result);
    }

    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;
    let average_score = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64
    };

    tracing::info!(
        experiment = experiment_name,
        passed,
        failed,
        average_score,
        "experiment finished"
    );

    ExperimentReport {
        experiment_name: experiment_name.to_string(),
        results,
        average_score,
        passed,
        failed,
    }
}

async fn run_case<F>(case: &EvalCase, factory: &F) -> EvalResult
where
    F: Fn() -> Result<Orchestrator, AgentError>,
{
    let mut orchestrator = match factory() {
        Ok(o) => o,
        Err(e) => return score(case, Vec::new(), Some(e.to_string())),
    };

    match orchestrator.run_turn(&case.input).await {
        Ok(_) => {
            let requested = orchestrator
                .store()
                .tool_requests()
                .map(|r| r.name.clone())
                .collect();
            score(case, requested, None)
        }
        // Failed turns are discarded from the store; the audit log still
        // shows what was dispatched.
        Err(e) => {
            let requested = orchestrator
                .audit_log()
                .iter()
                .map(|entry| entry.tool_name.clone())
                .collect();
            score(case, requested, Some(e.to_string()))
        }
    }
}

fn score(case: &EvalCase, requested: Vec<String>, error: Option<String>) -> EvalResult {
    let matched = requested.iter().any(|name| *name == case.expected_tool_name);
    let actual_tool_name = if matched {
        Some(case.expected_tool_name.clone())
    } else {
        requested.into_iter().next()
    };

    EvalResult {
        input: case.input.clone(),
        expected_tool_name: case.expected_tool_name.clone(),
        actual_tool_name,
        passed: matched,
        score: if matched { 1.0 } else { 0.0 },
        error,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
