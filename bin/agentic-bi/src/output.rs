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

use sleet::Outcome;
use std::fmt::Write;

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CANCELLED: u8 = 130;

/// Full and partial success both retrieved data.
pub fn exit_status(outcome: &Outcome) -> u8 {
    match outcome {
        Outcome::FullSuccess { .. } | Outcome::PartialSuccess { .. } => 0,
        Outcome::Failure { .. } => EXIT_FAILURE,
        Outcome::Cancelled { .. } => EXIT_CANCELLED,
    }
}

/// Plain-text report for a terminal.
pub fn render_text(outcome: &Outcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "status: {}", outcome.status());
    if let Some(query) = outcome.query() {
        let _ = writeln!(out, "\nquery:\n{query}");
    }
    match outcome {
        Outcome::FullSuccess { rows, spec, summary, .. } => {
            let _ = writeln!(out, "\nrows: {}", rows.len());
            if let Some(summary) = summary {
                let _ = writeln!(out, "{summary}");
            }
            let _ = writeln!(out, "\nchart: {} \"{}\"", spec.kind, spec.title);
        }
        Outcome::PartialSuccess { rows, summary, viz_error, .. } => {
            let _ = writeln!(out, "\nrows: {}", rows.len());
            if let Some(summary) = summary {
                let _ = writeln!(out, "{summary}");
            }
            let _ = writeln!(out, "\nchart unavailable: {viz_error}");
        }
        Outcome::Failure { error, .. } => {
            let _ = writeln!(out, "\nerror: {error}");
        }
        Outcome::Cancelled { .. } => {}
    }
    out
}
