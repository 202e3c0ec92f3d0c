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

use async_trait::async_trait;
use estel::{
    ChartDecider, ChartDecisionRequest, ChartKind, ChartRenderer, ChartSpec, DecisionError, Field,
    Figure, PlotlyRenderer, Record, RenderError, RenderLoop, MAX_RENDER_RETRIES,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

struct ScriptedDecider {
    replies: Mutex<VecDeque<Result<String, DecisionError>>>,
    fallback: String,
    requests: Mutex<Vec<ChartDecisionRequest>>,
}

impl ScriptedDecider {
    fn new(replies: Vec<Result<String, DecisionError>>, fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: fallback.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }
    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
    fn previous_errors(&self) -> Vec<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.previous_error.clone())
            .collect()
    }
}

#[async_trait]
impl ChartDecider for ScriptedDecider {
    async fn decide(&self, request: &ChartDecisionRequest) -> Result<String, DecisionError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

struct FailingRenderer {
    failures_left: AtomicU32,
}

impl ChartRenderer for FailingRenderer {
    fn render(&self, rows: &[Record], spec: &ChartSpec) -> Result<Figure, RenderError> {
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(RenderError::Failed {
                message: "figure backend unavailable".into(),
            });
        }
        PlotlyRenderer.render(rows, spec)
    }
}

struct PanickingRenderer;

impl ChartRenderer for PanickingRenderer {
    fn render(&self, _rows: &[Record], _spec: &ChartSpec) -> Result<Figure, RenderError> {
        panic!("plotting backend crashed");
    }
}

fn sales_rows() -> Vec<Record> {
    [("Widget", 120.0, "North"), ("Gadget", 80.5, "South"), ("Gizmo", 42.0, "East")]
        .iter()
        .map(|(p, r, g)| {
            json!({"Product": p, "Revenue": r, "Region": g})
                .as_object()
                .unwrap()
                .clone()
        })
        .collect()
}

const BAR: &str = r#"{"chart_type": "bar", "title": "Revenue by product", "x": "Product", "y": "Revenue"}"#;

#[tokio::test]
async fn first_decision_renders() {
    let decider = ScriptedDecider::new(vec![], BAR);
    let render_loop = RenderLoop::new(decider.clone(), Arc::new(PlotlyRenderer));
    let report = render_loop
        .run("revenue by product", &sales_rows(), &CancellationToken::new())
        .await;
    assert!(report.succeeded());
    assert_eq!(report.attempt, 0);
    assert_eq!(report.spec.unwrap().kind, ChartKind::Bar);
    assert_eq!(decider.calls(), 1);
    assert!(report.error.is_none());
}

#[tokio::test]
async fn invalid_decision_is_retried_with_feedback() {
    let decider = ScriptedDecider::new(
        vec![
            Ok("I think a bar chart would be nice.".into()),
            Ok(r#"{"chart_type": "radar", "x": "Product"}"#.into()),
        ],
        BAR,
    );
    let render_loop = RenderLoop::new(decider.clone(), Arc::new(PlotlyRenderer));
    let report = render_loop
        .run("revenue by product", &sales_rows(), &CancellationToken::new())
        .await;
    assert!(report.succeeded());
    assert_eq!(report.attempt, 2);
    let feedback = decider.previous_errors();
    assert_eq!(feedback[0], None);
    assert!(feedback[1].as_deref().unwrap().starts_with("decode error"));
    assert!(feedback[2].as_deref().unwrap().contains("unsupported chart_type 'radar'"));
}

#[tokio::test]
async fn unparsable_decisions_exhaust_the_budget() {
    let decider = ScriptedDecider::new(vec![], "no idea, sorry");
    let render_loop = RenderLoop::new(decider.clone(), Arc::new(PlotlyRenderer));
    let report = render_loop
        .run("revenue by product", &sales_rows(), &CancellationToken::new())
        .await;
    assert!(!report.succeeded());
    assert_eq!(report.attempt, MAX_RENDER_RETRIES);
    assert_eq!(decider.calls(), MAX_RENDER_RETRIES as usize);
    assert!(report.spec.is_none());
    assert!(report.error.unwrap().contains("no JSON object"));
}

#[tokio::test]
async fn render_failure_goes_back_to_deciding() {
    let decider = ScriptedDecider::new(vec![], BAR);
    let renderer = Arc::new(FailingRenderer {
        failures_left: AtomicU32::new(1),
    });
    let render_loop = RenderLoop::new(decider.clone(), renderer);
    let report = render_loop
        .run("revenue by product", &sales_rows(), &CancellationToken::new())
        .await;
    assert!(report.succeeded());
    assert_eq!(report.attempt, 1);
    assert_eq!(decider.calls(), 2);
    assert!(decider.previous_errors()[1]
        .as_deref()
        .unwrap()
        .contains("figure backend unavailable"));
}

#[tokio::test]
async fn renderer_panic_is_a_render_error() {
    let decider = ScriptedDecider::new(vec![], BAR);
    let render_loop =
        RenderLoop::new(decider.clone(), Arc::new(PanickingRenderer)).with_max_attempts(2);
    let report = render_loop
        .run("revenue by product", &sales_rows(), &CancellationToken::new())
        .await;
    assert!(!report.succeeded());
    assert_eq!(report.attempt, 2);
    assert!(report.error.unwrap().contains("plotting backend crashed"));
}

#[tokio::test]
async fn decision_service_errors_consume_attempts() {
    let decider = ScriptedDecider::new(
        vec![Err(DecisionError::new("timed out after 30s"))],
        BAR,
    );
    let render_loop = RenderLoop::new(decider.clone(), Arc::new(PlotlyRenderer));
    let report = render_loop
        .run("revenue by product", &sales_rows(), &CancellationToken::new())
        .await;
    assert!(report.succeeded());
    assert_eq!(report.attempt, 1);
}

#[tokio::test]
async fn pie_with_literal_values_renders() {
    let rows: Vec<Record> = [("North", 42), ("South", 28), ("East", 22), ("West", 8)]
        .iter()
        .map(|(r, s)| json!({"Region": r, "MarketShare": s}).as_object().unwrap().clone())
        .collect();
    let decider = ScriptedDecider::new(
        vec![],
        r#"{"chart_type": "pie", "names": "Region", "values": [42, 28, 22, 8],}"#,
    );
    let render_loop = RenderLoop::new(decider, Arc::new(PlotlyRenderer));
    let report = render_loop
        .run("market share by region", &rows, &CancellationToken::new())
        .await;
    let spec = report.spec.unwrap();
    assert_eq!(spec.column(Field::Values), Some("MarketShare"));
    assert_eq!(spec.title, "Market Share By Region");
    assert_eq!(
        report.figure.unwrap().traces()[0]["values"],
        json!([42.0, 28.0, 22.0, 8.0])
    );
}

#[tokio::test]
async fn cancelled_token_stops_before_deciding() {
    let decider = ScriptedDecider::new(vec![], BAR);
    let render_loop = RenderLoop::new(decider.clone(), Arc::new(PlotlyRenderer));
    let token = CancellationToken::new();
    token.cancel();
    let report = render_loop.run("revenue", &sales_rows(), &token).await;
    assert!(report.cancelled);
    assert_eq!(decider.calls(), 0);
}

#[tokio::test]
async fn empty_rows_skip_the_decision_service() {
    let decider = ScriptedDecider::new(vec![], BAR);
    let render_loop = RenderLoop::new(decider.clone(), Arc::new(PlotlyRenderer));
    let report = render_loop.run("revenue", &[], &CancellationToken::new()).await;
    assert!(!report.succeeded());
    assert_eq!(decider.calls(), 0);
    assert_eq!(report.failure.map(|f| f.stage), Some("render"));
}
