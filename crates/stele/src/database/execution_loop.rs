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

use super::executor::QueryExecutor;
use super::identifiers::normalise_identifiers;
use super::statement::extract_statement;
use super::types::{ExecutionError, QueryResult};
use crate::nlu::repair::QueryRepairer;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const MAX_EXEC_RETRIES: u32 = 3;

/// Final state of one execution loop invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// The last query submitted, after identifier normalisation.
    pub query: String,
    pub result: Option<QueryResult>,
    pub error: Option<String>,
    /// Repairs performed.
    pub attempt: u32,
    pub cancelled: bool,
}
impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.result.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecStep {
    Execute,
    Repair,
    Done,
    GiveUp,
}

pub struct ExecutionLoop {
    executor: Arc<dyn QueryExecutor>,
    repairer: Arc<dyn QueryRepairer>,
    max_attempts: u32,
}

impl ExecutionLoop {
    pub fn new(executor: Arc<dyn QueryExecutor>, repairer: Arc<dyn QueryRepairer>) -> Self {
        Self {
            executor,
            repairer,
            max_attempts: MAX_EXEC_RETRIES,
        }
    }
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[instrument(skip(self, query, cancel), fields(query_len = query.len()))]
    pub async fn run(&self, query: &str, cancel: &CancellationToken) -> ExecutionReport {
        let mut report = ExecutionReport {
            query: query.to_string(),
            ..ExecutionReport::default()
        };
        let mut step = ExecStep::Execute;
        loop {
            if cancel.is_cancelled() {
                info!(attempt = report.attempt, "Execution loop cancelled");
                report.cancelled = true;
                return report;
            }
            debug!(?step, attempt = report.attempt, "Execution loop step");
            step = match step {
                ExecStep::Execute => {
                    report.query = normalise_identifiers(&report.query);
                    match self.execute(&report.query).await {
                        Ok(result) => {
                            report.result = Some(result);
                            report.error = None;
                            ExecStep::Done
                        }
                        Err(err) => {
                            warn!(attempt = report.attempt, error = %err, "Query execution failed");
                            report.error = Some(err.message);
                            if report.attempt >= self.max_attempts {
                                ExecStep::GiveUp
                            } else {
                                ExecStep::Repair
                            }
                        }
                    }
                }
                ExecStep::Repair => {
                    self.repair(&mut report).await;
                    ExecStep::Execute
                }
                ExecStep::Done => {
                    info!(
                        attempt = report.attempt,
                        rows = report.result.as_ref().map(QueryResult::row_count).unwrap_or(0),
                        "Query executed"
                    );
                    return report;
                }
                ExecStep::GiveUp => {
                    error!(
                        attempt = report.attempt,
                        error = report.error.as_deref().unwrap_or_default(),
                        "Execution retry budget exhausted"
                    );
                    return report;
                }
            };
        }
    }

    /// A panicking connector counts as an ordinary execution failure.
    async fn execute(&self, query: &str) -> Result<QueryResult, ExecutionError> {
        AssertUnwindSafe(self.executor.execute(query))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "query executor panicked".to_string());
                Err(ExecutionError::new(message))
            })
    }

    async fn repair(&self, report: &mut ExecutionReport) {
        let exec_error = report.error.clone().unwrap_or_default();
        report.attempt += 1;
        match self.repairer.repair(&report.query, &exec_error).await {
            Ok(response) => {
                let candidate = extract_statement(&response);
                if candidate.is_empty() {
                    warn!(attempt = report.attempt, "Repair response held no statement");
                } else {
                    debug!(attempt = report.attempt, "Repaired query");
                    report.query = candidate;
                }
            }
            Err(e) => {
                warn!(attempt = report.attempt, error = %e, "Query repair failed");
                report.error = Some(format!("{exec_error} (repair failed: {e})"));
            }
        }
    }
}
