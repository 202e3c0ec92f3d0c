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

pub mod chart_catalog;
pub mod chart_spec;
pub mod data_profile;
pub mod decide;
pub mod decode;
pub mod error;
pub mod normalise;
pub mod prompt;
pub mod render;
pub mod render_loop;
pub mod validate;

pub use chart_catalog::{ChartCatalog, ChartKind, Field, FieldShape, KindSchema};
pub use chart_spec::{ChartSpec, FieldValue, DEFAULT_TITLE};
pub use data_profile::{summarise_rows, ColumnProfile, ColumnType, DataProfile, Record};
pub use decide::{interpret_decision, ChartDecider, ChartDecisionRequest};
pub use decode::decode_chart_response;
pub use error::{
    CatalogError, ChartError, DecisionError, DecodeError, RenderError, Result, ValidationError,
};
pub use normalise::{normalise, title_from_question};
pub use prompt::{build_decision_prompt, DECISION_SYSTEM_PROMPT};
pub use render::{ChartRenderer, Figure, PlotlyRenderer};
pub use render_loop::{RenderFailure, RenderLoop, RenderReport, MAX_RENDER_RETRIES};
pub use validate::validate_chart_spec;
