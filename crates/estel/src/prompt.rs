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
use crate::decide::ChartDecisionRequest;

pub const DECISION_SYSTEM_PROMPT: &str =
    "You are a data visualisation expert. You reply with a single JSON object and nothing else.";

const RESPONSE_SHAPE: &str = r#"{"chart_type": "<kind>", "title": "<short title>", "x": "<column>", "y": "<column>", "color": "<column or omit>", "size": "<column or omit>", "names": "<column>", "values": "<column>", "z": "<column>", "path": ["<column>", "<column>"], "nbins": <integer or omit>, "barmode": "<group|stack or omit>"}"#;

pub fn build_decision_prompt(request: &ChartDecisionRequest, catalog: &ChartCatalog) -> String {
    let mut prompt = format!(
        "Choose the best chart for answering the question below.\n\n\
         Question: {question}\n\n\
         Columns:\n{columns}\n\n\
         Sample rows:\n{sample}\n\n\
         Total rows: {rows}\n\n\
         Supported chart kinds and their fields:\n{rules}\n\n\
         Rules:\n\
         - Use only column names listed above, spelled exactly.\n\
         - Give single column names as strings, never lists, except for treemap path.\n\
         - Omit fields that the chosen kind does not use.\n",
        question = request.question,
        columns = request.columns,
        sample = request.sample,
        rows = request.row_count,
        rules = catalog.rules_text(),
    );
    if let Some(previous) = &request.previous_error {
        prompt.push_str(&format!(
            "\nYour previous answer was rejected: {previous}\nPick fields that avoid this problem.\n"
        ));
    }
    prompt.push_str(&format!("\nReply with ONLY this JSON:\n{RESPONSE_SHAPE}\n"));
    prompt
}
