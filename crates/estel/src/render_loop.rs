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

use crate::chart_catalog::ChartCatalog;
use crate::chart_spec::ChartSpec;
use crate::data_profile::{DataProfile, Record};
use crate::decide::{interpret_decision, ChartDecider, ChartDecisionRequest};
use crate::error::{ChartError, RenderError};
use crate::render::{ChartRenderer, Figure};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const MAX_RENDER_RETRIES: u32 = 3;

/// Stage and message of the most recent failed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFailure {
    pub stage: &'static str,
    pub message: String,
}

/// What the render loop hands back to its caller.
#[derive(Debug, Clone, Default)]
pub struct RenderReport {
    pub spec: Option<ChartSpec>,
    pub figure: Option<Figure>,
    /// `"<stage> error: <message>"`, also fed back to the decider.
    pub error: Option<String>,
    pub failure: Option<RenderFailure>,
    /// Failed decide/render rounds.
    pub attempt: u32,
    pub cancelled: bool,
}
impl RenderReport {
    pub fn succeeded(&self) -> bool {
        self.figure.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderStep {
    Decide,
    Render,
    Done,
    GiveUp,
}

pub struct RenderLoop {
    decider: Arc<dyn ChartDecider>,
    renderer: Arc<dyn ChartRenderer>,
    max_attempts: u32,
}

impl RenderLoop {
    pub fn new(decider: Arc<dyn ChartDecider>, renderer: Arc<dyn ChartRenderer>) -> Self {
        Self {
            decider,
            renderer,
            max_attempts: MAX_RENDER_RETRIES,
        }
    }
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[instrument(skip(self, rows, cancel), fields(rows = rows.len()))]
    pub async fn run(
        &self,
        question: &str,
        rows: &[Record],
        cancel: &CancellationToken,
    ) -> RenderReport {
        let mut report = RenderReport::default();
        if rows.is_empty() {
            let failure = RenderFailure {
                stage: "render",
                message: RenderError::EmptyData.to_string(),
            };
            report.error = Some(format!("{} error: {}", failure.stage, failure.message));
            report.failure = Some(failure);
            return report;
        }
        let profile = DataProfile::from_rows(rows);
        let mut step = RenderStep::Decide;
        loop {
            if cancel.is_cancelled() {
                info!(attempt = report.attempt, "Render loop cancelled");
                report.cancelled = true;
                return report;
            }
            debug!(?step, attempt = report.attempt, "Render loop step");
            step = match step {
                RenderStep::Decide if report.attempt >= self.max_attempts => RenderStep::GiveUp,
                RenderStep::Decide => match self.decide(question, &profile, &report).await {
                    Ok(spec) => {
                        report.spec = Some(spec);
                        RenderStep::Render
                    }
                    Err(err) => self.record_failure(&mut report, &err),
                },
                RenderStep::Render => match report.spec.as_ref() {
                    Some(spec) => match self.render(rows, spec) {
                        Ok(figure) => {
                            report.figure = Some(figure);
                            report.error = None;
                            report.failure = None;
                            RenderStep::Done
                        }
                        Err(err) => {
                            report.spec = None;
                            self.record_failure(&mut report, &ChartError::Render(err))
                        }
                    },
                    None => RenderStep::Decide,
                },
                RenderStep::Done => {
                    info!(attempt = report.attempt, "Chart rendered");
                    return report;
                }
                RenderStep::GiveUp => {
                    error!(
                        attempt = report.attempt,
                        error = report.error.as_deref().unwrap_or_default(),
                        "Render retry budget exhausted"
                    );
                    return report;
                }
            };
        }
    }

    async fn decide(
        &self,
        question: &str,
        profile: &DataProfile,
        report: &RenderReport,
    ) -> Result<ChartSpec, ChartError> {
        let request = ChartDecisionRequest::from_profile(question, profile)
            .with_previous_error(report.error.clone());
        let raw = self.decider.decide(&request).await?;
        interpret_decision(&raw, profile, question, ChartCatalog::builtin())
    }

    fn render(&self, rows: &[Record], spec: &ChartSpec) -> Result<Figure, RenderError> {
        catch_unwind(AssertUnwindSafe(|| self.renderer.render(rows, spec))).unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "renderer panicked".to_string());
            Err(RenderError::Failed { message })
        })
    }

    fn record_failure(&self, report: &mut RenderReport, err: &ChartError) -> RenderStep {
        report.attempt += 1;
        let failure = RenderFailure {
            stage: err.stage(),
            message: inner_message(err),
        };
        let message = format!("{} error: {}", failure.stage, failure.message);
        warn!(attempt = report.attempt, max = self.max_attempts, error = %message, "Chart attempt failed");
        report.error = Some(message);
        report.failure = Some(failure);
        RenderStep::Decide
    }
}

fn inner_message(err: &ChartError) -> String {
    match err {
        ChartError::Catalog(e) => e.to_string(),
        ChartError::Decision(e) => e.to_string(),
        ChartError::Decode(e) => e.to_string(),
        ChartError::Validation(e) => e.to_string(),
        ChartError::Render(e) => e.to_string(),
    }
}
