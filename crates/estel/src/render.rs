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

use crate::chart_catalog::{ChartKind, Field};
use crate::chart_spec::ChartSpec;
use crate::data_profile::{cell_text, Record};
use crate::error::RenderError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Serialised Plotly figure (`{"data": [...], "layout": {...}}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Figure(Value);
impl Figure {
    pub fn new(traces: Vec<Value>, layout: Value) -> Self {
        Figure(json!({ "data": traces, "layout": layout }))
    }
    pub fn as_json(&self) -> &Value {
        &self.0
    }
    pub fn into_json(self) -> Value {
        self.0
    }
    pub fn traces(&self) -> &[Value] {
        self.0["data"].as_array().map(Vec::as_slice).unwrap_or(&[])
    }
}

pub trait ChartRenderer: Send + Sync {
    fn render(&self, rows: &[Record], spec: &ChartSpec) -> Result<Figure, RenderError>;
}

#[derive(Debug, Clone, Default)]
pub struct PlotlyRenderer;

impl ChartRenderer for PlotlyRenderer {
    fn render(&self, rows: &[Record], spec: &ChartSpec) -> Result<Figure, RenderError> {
        if rows.is_empty() {
            return Err(RenderError::EmptyData);
        }
        let frame = Frame { rows, spec };
        match spec.kind {
            ChartKind::Bar => render_bar(&frame),
            ChartKind::Line => render_line(&frame),
            ChartKind::Scatter => render_scatter(&frame),
            ChartKind::Pie => render_pie(&frame),
            ChartKind::Histogram => render_histogram(&frame),
            ChartKind::Box => render_box(&frame),
            ChartKind::Heatmap => render_heatmap(&frame),
            ChartKind::Treemap => render_treemap(&frame),
        }
    }
}

struct Frame<'a> {
    rows: &'a [Record],
    spec: &'a ChartSpec,
}
impl<'a> Frame<'a> {
    fn required(&self, field: Field) -> Result<&'a str, RenderError> {
        self.spec.column(field).ok_or_else(|| RenderError::Failed {
            message: format!("{} chart has no '{}' column", self.spec.kind, field),
        })
    }
    fn ensure_column(&self, column: &str) -> Result<(), RenderError> {
        if self.rows.iter().any(|r| r.contains_key(column)) {
            Ok(())
        } else {
            Err(RenderError::MissingColumn {
                column: column.to_string(),
            })
        }
    }
    fn values(&self, column: &str, idx: &[usize]) -> Result<Vec<Value>, RenderError> {
        self.ensure_column(column)?;
        Ok(idx
            .iter()
            .map(|&i| self.rows[i].get(column).cloned().unwrap_or(Value::Null))
            .collect())
    }
    fn numbers(&self, column: &str, idx: &[usize]) -> Result<Vec<Value>, RenderError> {
        self.ensure_column(column)?;
        idx.iter()
            .map(|&i| match self.rows[i].get(column) {
                None | Some(Value::Null) => Ok(Value::Null),
                Some(v) => as_number(v).map(Value::from).ok_or_else(|| RenderError::NonNumeric {
                    column: column.to_string(),
                    kind: self.spec.kind.to_string(),
                }),
            })
            .collect()
    }
    fn all_rows(&self) -> Vec<usize> {
        (0..self.rows.len()).collect()
    }
    /// Row indices per distinct `color` value, in first-seen order.
    fn groups(&self) -> Result<Vec<(Option<String>, Vec<usize>)>, RenderError> {
        let Some(color) = self.spec.column(Field::Color) else {
            return Ok(vec![(None, self.all_rows())]);
        };
        self.ensure_column(color)?;
        let mut order: Vec<(Option<String>, Vec<usize>)> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();
        for (i, row) in self.rows.iter().enumerate() {
            let key = cell_text(row.get(color));
            let slot = *position.entry(key.clone()).or_insert_with(|| {
                order.push((Some(key), Vec::new()));
                order.len() - 1
            });
            order[slot].1.push(i);
        }
        Ok(order)
    }
    fn layout(&self, x_title: Option<&str>, y_title: Option<&str>) -> Map<String, Value> {
        let mut layout = Map::new();
        layout.insert("title".into(), json!({ "text": self.spec.title }));
        if let Some(x) = x_title {
            layout.insert("xaxis".into(), json!({ "title": { "text": x } }));
        }
        if let Some(y) = y_title {
            layout.insert("yaxis".into(), json!({ "title": { "text": y } }));
        }
        if let Some(color) = self.spec.column(Field::Color) {
            layout.insert("legend".into(), json!({ "title": { "text": color } }));
        }
        layout
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn named(mut trace: Value, name: &Option<String>) -> Value {
    if let (Some(name), Some(obj)) = (name, trace.as_object_mut()) {
        obj.insert("name".into(), Value::String(name.clone()));
    }
    trace
}

fn render_bar(frame: &Frame) -> Result<Figure, RenderError> {
    let (x, y) = (frame.required(Field::X)?, frame.required(Field::Y)?);
    let mut traces = Vec::new();
    for (name, idx) in frame.groups()? {
        let trace = json!({
            "type": "bar",
            "x": frame.values(x, &idx)?,
            "y": frame.numbers(y, &idx)?,
        });
        traces.push(named(trace, &name));
    }
    let mut layout = frame.layout(Some(x), Some(y));
    let barmode = frame.spec.mode(Field::Barmode).unwrap_or("relative");
    layout.insert("barmode".into(), Value::String(barmode.to_string()));
    Ok(Figure::new(traces, Value::Object(layout)))
}

fn render_line(frame: &Frame) -> Result<Figure, RenderError> {
    xy_traces(frame, "lines")
}

fn render_scatter(frame: &Frame) -> Result<Figure, RenderError> {
    xy_traces(frame, "markers")
}

fn xy_traces(frame: &Frame, mode: &str) -> Result<Figure, RenderError> {
    let (x, y) = (frame.required(Field::X)?, frame.required(Field::Y)?);
    let size = frame.spec.column(Field::Size);
    let mut traces = Vec::new();
    for (name, idx) in frame.groups()? {
        let mut trace = json!({
            "type": "scatter",
            "mode": mode,
            "x": frame.values(x, &idx)?,
            "y": frame.numbers(y, &idx)?,
        });
        if let Some(size) = size {
            trace["marker"] = json!({ "size": frame.numbers(size, &idx)?, "sizemode": "area" });
        }
        traces.push(named(trace, &name));
    }
    Ok(Figure::new(
        traces,
        Value::Object(frame.layout(Some(x), Some(y))),
    ))
}

fn render_pie(frame: &Frame) -> Result<Figure, RenderError> {
    let (names, values) = (frame.required(Field::Names)?, frame.required(Field::Values)?);
    let idx = frame.all_rows();
    let trace = json!({
        "type": "pie",
        "labels": frame.values(names, &idx)?,
        "values": frame.numbers(values, &idx)?,
    });
    Ok(Figure::new(vec![trace], Value::Object(frame.layout(None, None))))
}

fn render_histogram(frame: &Frame) -> Result<Figure, RenderError> {
    let x = frame.required(Field::X)?;
    let nbins = frame.spec.count(Field::Nbins);
    let mut traces = Vec::new();
    for (name, idx) in frame.groups()? {
        let mut trace = json!({ "type": "histogram", "x": frame.values(x, &idx)? });
        if let Some(n) = nbins {
            trace["nbinsx"] = Value::from(n);
        }
        traces.push(named(trace, &name));
    }
    let mut layout = frame.layout(Some(x), Some("count"));
    layout.insert("barmode".into(), Value::String("relative".into()));
    Ok(Figure::new(traces, Value::Object(layout)))
}

fn render_box(frame: &Frame) -> Result<Figure, RenderError> {
    let y = frame.required(Field::Y)?;
    let x = frame.spec.column(Field::X);
    let mut traces = Vec::new();
    for (name, idx) in frame.groups()? {
        let mut trace = json!({ "type": "box", "y": frame.numbers(y, &idx)? });
        if let Some(x) = x {
            trace["x"] = Value::Array(frame.values(x, &idx)?);
        }
        traces.push(named(trace, &name));
    }
    let mut layout = frame.layout(x, Some(y));
    if frame.spec.column(Field::Color).is_some() {
        layout.insert("boxmode".into(), Value::String("group".into()));
    }
    Ok(Figure::new(traces, Value::Object(layout)))
}

fn render_heatmap(frame: &Frame) -> Result<Figure, RenderError> {
    let (x, y, z) = (
        frame.required(Field::X)?,
        frame.required(Field::Y)?,
        frame.required(Field::Z)?,
    );
    let idx = frame.all_rows();
    let trace = json!({
        "type": "histogram2d",
        "histfunc": "sum",
        "x": frame.values(x, &idx)?,
        "y": frame.values(y, &idx)?,
        "z": frame.numbers(z, &idx)?,
        "colorbar": { "title": { "text": format!("sum of {z}") } },
    });
    Ok(Figure::new(
        vec![trace],
        Value::Object(frame.layout(Some(x), Some(y))),
    ))
}

#[derive(Default)]
struct TreeNode {
    label: String,
    parent: String,
    value: f64,
}

fn render_treemap(frame: &Frame) -> Result<Figure, RenderError> {
    let path = frame
        .spec
        .columns(Field::Path)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| RenderError::Failed {
            message: "treemap chart has no 'path' columns".to_string(),
        })?;
    let values = frame.required(Field::Values)?;
    for column in path {
        frame.ensure_column(column)?;
    }
    let numbers = frame.numbers(values, &frame.all_rows())?;
    let mut ids: Vec<String> = Vec::new();
    let mut nodes: HashMap<String, TreeNode> = HashMap::new();
    for (row, amount) in frame.rows.iter().zip(numbers.iter()) {
        let Some(amount) = amount.as_f64() else {
            continue;
        };
        let labels: Vec<String> = path.iter().map(|c| cell_text(row.get(c))).collect();
        if labels.iter().any(String::is_empty) {
            continue;
        }
        let mut parent = String::new();
        for depth in 0..labels.len() {
            let id = labels[..=depth].join("/");
            let node = nodes.entry(id.clone()).or_insert_with(|| {
                ids.push(id.clone());
                TreeNode {
                    label: labels[depth].clone(),
                    parent: parent.clone(),
                    value: 0.0,
                }
            });
            node.value += amount;
            parent = id;
        }
    }
    if ids.is_empty() {
        return Err(RenderError::EmptyData);
    }
    let column = |f: fn(&TreeNode) -> Value| -> Vec<Value> { ids.iter().map(|id| f(&nodes[id])).collect() };
    let trace = json!({
        "type": "treemap",
        "ids": ids,
        "labels": column(|n| Value::String(n.label.clone())),
        "parents": column(|n| Value::String(n.parent.clone())),
        "values": column(|n| Value::from(n.value)),
        "branchvalues": "total",
    });
    Ok(Figure::new(vec![trace], Value::Object(frame.layout(None, None))))
}
