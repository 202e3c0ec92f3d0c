// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use super::outcome::{assemble, Outcome};
use super::state::{OrchestratorState, Stage};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, RetryStage};
use estel::{ChartDecider, ChartRenderer, RenderLoop};
use std::sync::Arc;
use stele::{ExecutionLoop, QueryExecutor, QueryRepairer, QuerySynthesizer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const EMPTY_RESULT_HINT: &str = "The query returned 0 rows. The SQL ran successfully but produced no results. Try different table joins, filters, or column names.";

/// Collaborators wired in at startup.
#[derive(Clone)]
pub struct PipelineServices {
    pub synthesizer: Arc<dyn QuerySynthesizer>,
    pub executor: Arc<dyn QueryExecutor>,
    pub repairer: Arc<dyn QueryRepairer>,
    pub decider: Arc<dyn ChartDecider>,
    pub renderer: Arc<dyn ChartRenderer>,
}

/// Where `CheckResult` sends the run next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    Render,
    Retry { hint: String },
    GiveUp { hint: String, last_error: PipelineError },
}

/// Pure routing over the state after execution. An execution failure takes
/// precedence over the empty-result check.
pub fn check_result(state: &OrchestratorState, max_retries: u32) -> Routing {
    if state.has_rows() {
        return Routing::Render;
    }
    let (hint, last_error) = if state.execution_succeeded == Some(true) {
        (EMPTY_RESULT_HINT.to_string(), PipelineError::EmptyResult)
    } else {
        let message = state.error_message.clone().unwrap_or_default();
        let failure = PipelineError::Execution(message.clone());
        let last_error = if state.execution_exhausted {
            PipelineError::budget_exhausted(RetryStage::Execution, state.execution_attempts, failure)
        } else {
            failure
        };
        (format!("execution error: {message}"), last_error)
    };
    if state.retry_count + 1 > max_retries {
        Routing::GiveUp { hint, last_error }
    } else {
        Routing::Retry { hint }
    }
}

pub struct OrchestratorEngine {
    synthesizer: Arc<dyn QuerySynthesizer>,
    execution: ExecutionLoop,
    render: RenderLoop,
    config: PipelineConfig,
}

impl OrchestratorEngine {
    pub fn new(services: PipelineServices, config: PipelineConfig) -> Self {
        let execution = ExecutionLoop::new(services.executor, services.repairer)
            .with_max_attempts(config.limits.execution);
        let render = RenderLoop::new(services.decider, services.renderer)
            .with_max_attempts(config.limits.render);
        Self {
            synthesizer: services.synthesizer,
            execution,
            render,
            config,
        }
    }
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run_pipeline(&self, question: &str) -> Outcome {
        self.run_pipeline_with_cancel(question, &CancellationToken::new()).await
    }

    pub async fn run_pipeline_with_cancel(&self, question: &str, cancel: &CancellationToken) -> Outcome {
        self.run_with_state(question, cancel).await.0
    }

    /// Runs one question to completion and returns the final state next to
    /// the assembled outcome.
    #[instrument(skip(self, cancel), fields(question_len = question.len()))]
    pub async fn run_with_state(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> (Outcome, OrchestratorState) {
        let mut state = OrchestratorState::new(question);
        let mut stage = Stage::Synthesize;
        while !stage.is_terminal() {
            if cancel.is_cancelled() {
                info!(?stage, retry_count = state.retry_count, "Pipeline cancelled");
                state.cancelled = true;
                state.fail(PipelineError::Cancelled);
                break;
            }
            if state.transitions >= self.config.max_transitions {
                error!(transitions = state.transitions, "Transition limit reached");
                state.fail(PipelineError::TransitionLimit(state.transitions));
                break;
            }
            state.transitions += 1;
            debug!(?stage, retry_count = state.retry_count, "Orchestrator step");
            stage = match stage {
                Stage::Synthesize => self.synthesize(&mut state).await,
                Stage::Execute => self.execute(&mut state, cancel).await,
                Stage::CheckResult => self.route(&mut state),
                Stage::Render => self.render_chart(&mut state, cancel).await,
                Stage::Done | Stage::GiveUp => stage,
            };
        }
        let outcome = assemble(&state);
        info!(
            status = outcome.status(),
            retry_count = state.retry_count,
            synthesis_attempts = state.synthesis_attempts,
            "Pipeline finished"
        );
        (outcome, state)
    }

    async fn synthesize(&self, state: &mut OrchestratorState) -> Stage {
        state.synthesis_attempts += 1;
        match self
            .synthesizer
            .synthesize(&state.question, state.correction_hint.as_deref())
            .await
        {
            Ok(query) => {
                debug!(attempt = state.synthesis_attempts, "Query synthesised");
                state.query = Some(query);
                Stage::Execute
            }
            Err(e) => {
                error!(attempt = state.synthesis_attempts, error = %e, "Query synthesis failed");
                state.fail(PipelineError::Synthesis(e.to_string()));
                Stage::GiveUp
            }
        }
    }

    async fn execute(&self, state: &mut OrchestratorState, cancel: &CancellationToken) -> Stage {
        let query = state.query.clone().unwrap_or_default();
        let report = self.execution.run(&query, cancel).await;
        state.execution_attempts = report.attempt;
        state.execution_exhausted = !report.succeeded()
            && !report.cancelled
            && report.attempt >= self.execution.max_attempts();
        state.query = Some(report.query);
        // A cancelled loop is picked up at the next step boundary.
        match report.result {
            Some(result) => {
                state.execution_succeeded = Some(true);
                state.result_summary = Some(result.summary);
                state.rows = Some(result.rows);
                state.error_message = None;
            }
            None => {
                state.execution_succeeded = Some(false);
                state.rows = None;
                state.result_summary = None;
                state.error_message = report.error;
            }
        }
        Stage::CheckResult
    }

    fn route(&self, state: &mut OrchestratorState) -> Stage {
        match check_result(state, self.config.limits.orchestration) {
            Routing::Render => Stage::Render,
            Routing::Retry { hint } => {
                state.retry_count += 1;
                warn!(retry_count = state.retry_count, hint = %hint, "Attempt rejected, synthesising again");
                state.correction_hint = Some(hint);
                Stage::Synthesize
            }
            Routing::GiveUp { hint, last_error } => {
                state.retry_count += 1;
                state.correction_hint = Some(hint);
                let failure = PipelineError::budget_exhausted(
                    RetryStage::Orchestration,
                    state.retry_count,
                    last_error,
                );
                error!(retry_count = state.retry_count, error = %failure, "Giving up");
                state.fail(failure);
                Stage::GiveUp
            }
        }
    }

    /// Render failures are terminal for the run; they never re-enter synthesis.
    async fn render_chart(&self, state: &mut OrchestratorState, cancel: &CancellationToken) -> Stage {
        let rows = state.rows.as_deref().unwrap_or_default();
        let report = self.render.run(&state.question, rows, cancel).await;
        state.render_attempts = report.attempt;
        if report.cancelled {
            state.cancelled = true;
            state.fail(PipelineError::Cancelled);
            return Stage::GiveUp;
        }
        match report.figure {
            Some(figure) => {
                state.render_succeeded = Some(true);
                state.chart_payload = Some(figure);
                state.chart_spec = report.spec;
            }
            None => {
                state.render_succeeded = Some(false);
                let last = report
                    .failure
                    .map(|f| PipelineError::from_chart_stage(f.stage, f.message))
                    .unwrap_or_else(|| PipelineError::Render(report.error.unwrap_or_default()));
                let viz_error = if report.attempt >= self.render.max_attempts() {
                    PipelineError::budget_exhausted(RetryStage::Render, report.attempt, last)
                } else {
                    last
                };
                warn!(error = %viz_error, "Visualisation failed, returning data only");
                state.render_error = Some(viz_error.to_string());
            }
        }
        Stage::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executed(rows: usize) -> OrchestratorState {
        let mut state = OrchestratorState::new("q");
        state.execution_succeeded = Some(true);
        state.rows = Some(vec![serde_json::Map::new(); rows]);
        state
    }

    #[test]
    fn rows_route_to_render() {
        assert_eq!(check_result(&executed(2), 2), Routing::Render);
    }

    #[test]
    fn empty_result_gets_fixed_hint() {
        assert_eq!(
            check_result(&executed(0), 2),
            Routing::Retry {
                hint: EMPTY_RESULT_HINT.to_string()
            }
        );
    }

    #[test]
    fn execution_error_takes_precedence() {
        let mut state = OrchestratorState::new("q");
        state.execution_succeeded = Some(false);
        state.error_message = Some("syntax error".into());
        assert_eq!(
            check_result(&state, 2),
            Routing::Retry {
                hint: "execution error: syntax error".into()
            }
        );
        state.retry_count = 2;
        assert_eq!(
            check_result(&state, 2),
            Routing::GiveUp {
                hint: "execution error: syntax error".into(),
                last_error: PipelineError::Execution("syntax error".into()),
            }
        );
    }

    #[test]
    fn spent_repair_budget_is_recorded_in_the_last_error() {
        let mut state = OrchestratorState::new("q");
        state.execution_succeeded = Some(false);
        state.error_message = Some("syntax error".into());
        state.execution_attempts = 3;
        state.execution_exhausted = true;
        state.retry_count = 2;
        let Routing::GiveUp { hint, last_error } = check_result(&state, 2) else {
            panic!("expected to give up");
        };
        assert_eq!(hint, "execution error: syntax error");
        assert_eq!(
            last_error.to_string(),
            "execution retry budget exhausted after 3 attempts: execution error: syntax error"
        );
    }
}
