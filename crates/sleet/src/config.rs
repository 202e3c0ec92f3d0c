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

use estel::MAX_RENDER_RETRIES;
use serde::{Deserialize, Serialize};
use stele::MAX_EXEC_RETRIES;

pub const MAX_ORCH_RETRIES: u32 = 2;

/// Attempt ceilings for the three bounded loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryLimits {
    #[serde(default = "default_orchestration")]
    pub orchestration: u32,
    #[serde(default = "default_execution")]
    pub execution: u32,
    #[serde(default = "default_render")]
    pub render: u32,
}
fn default_orchestration() -> u32 {
    MAX_ORCH_RETRIES
}
fn default_execution() -> u32 {
    MAX_EXEC_RETRIES
}
fn default_render() -> u32 {
    MAX_RENDER_RETRIES
}
impl Default for RetryLimits {
    fn default() -> Self {
        Self {
            orchestration: MAX_ORCH_RETRIES,
            execution: MAX_EXEC_RETRIES,
            render: MAX_RENDER_RETRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub limits: RetryLimits,
    /// Hard stop for the outer state machine.
    #[serde(default = "default_max_transitions")]
    pub max_transitions: usize,
}
fn default_max_transitions() -> usize {
    32
}
impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limits: RetryLimits::default(),
            max_transitions: default_max_transitions(),
        }
    }
}

impl PipelineConfig {
    /// Fewest transitions a run can need when every outer attempt is used.
    pub fn required_transitions(&self) -> usize {
        3 * (self.limits.orchestration as usize + 1) + 2
    }
    pub fn validate(&self) -> Result<(), String> {
        if self.limits.render == 0 {
            return Err("limits.render must be at least 1".to_string());
        }
        if self.max_transitions < self.required_transitions() {
            return Err(format!(
                "max_transitions ({}) is below the {} needed for {} orchestration retries",
                self.max_transitions,
                self.required_transitions(),
                self.limits.orchestration
            ));
        }
        Ok(())
    }
}
