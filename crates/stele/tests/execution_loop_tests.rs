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
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use stele::{
    ExecutionError, ExecutionLoop, QueryExecutor, QueryRepairer, QueryResult, RepairError,
    MAX_EXEC_RETRIES,
};
use tokio_util::sync::CancellationToken;

/// Fails any query that does not contain `accept`, which must appear verbatim.
struct PickyExecutor {
    accept: String,
    seen: Mutex<Vec<String>>,
}
impl PickyExecutor {
    fn new(accept: &str) -> Arc<Self> {
        Arc::new(Self {
            accept: accept.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}
#[async_trait]
impl QueryExecutor for PickyExecutor {
    async fn execute(&self, query: &str) -> Result<QueryResult, ExecutionError> {
        self.seen.lock().unwrap().push(query.to_string());
        if query.contains(&self.accept) {
            let row = json!({"Name": "Mountain-100", "ListPrice": 3399.99});
            Ok(QueryResult {
                rows: vec![row.as_object().unwrap().clone()],
                summary: "| Name | ListPrice |".to_string(),
            })
        } else {
            Err(ExecutionError::new(r#"column "listprice" does not exist"#))
        }
    }
}

struct PanickingExecutor;
#[async_trait]
impl QueryExecutor for PanickingExecutor {
    async fn execute(&self, _query: &str) -> Result<QueryResult, ExecutionError> {
        panic!("connection reset by peer")
    }
}

struct ScriptedRepairer {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<(String, String)>>,
}
impl ScriptedRepairer {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }
    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}
#[async_trait]
impl QueryRepairer for ScriptedRepairer {
    async fn repair(&self, broken_query: &str, error_message: &str) -> Result<String, RepairError> {
        self.calls
            .lock()
            .unwrap()
            .push((broken_query.to_string(), error_message.to_string()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(RepairError::EmptyResponse)
    }
}

#[tokio::test]
async fn repaired_query_succeeds_after_one_repair() {
    let executor = PickyExecutor::new(r#""ListPrice""#);
    let repairer = ScriptedRepairer::new(&[
        "Sure! Here is the corrected query:\n```sql\nSELECT p.Name, p.ListPrice FROM Production.Product p;\n```\nIt now uses the right column.",
    ]);
    let report = ExecutionLoop::new(executor.clone(), repairer.clone())
        .run("SELECT p.Name, p.listprice FROM Production.Product p", &CancellationToken::new())
        .await;

    assert!(report.succeeded());
    assert_eq!(report.attempt, 1);
    assert_eq!(report.error, None);
    assert_eq!(report.result.as_ref().map(QueryResult::row_count), Some(1));
    assert_eq!(
        report.query,
        r#"SELECT p."Name", p."ListPrice" FROM "Production"."Product" p"#
    );

    let calls = repairer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, r#"column "listprice" does not exist"#);
    assert_eq!(executor.seen().len(), 2);
}

#[tokio::test]
async fn budget_exhaustion_keeps_the_last_store_error() {
    let executor = PickyExecutor::new("never matches");
    let repairer = ScriptedRepairer::new(&["SELECT 1", "SELECT 2", "SELECT 3", "SELECT 4"]);
    let report = ExecutionLoop::new(executor.clone(), repairer.clone())
        .run("SELECT 0", &CancellationToken::new())
        .await;

    assert!(!report.succeeded());
    assert_eq!(report.attempt, MAX_EXEC_RETRIES);
    assert_eq!(repairer.calls().len(), MAX_EXEC_RETRIES as usize);
    assert_eq!(
        executor.seen(),
        vec!["SELECT 0", "SELECT 1", "SELECT 2", "SELECT 3"]
    );
    assert_eq!(report.error.as_deref(), Some(r#"column "listprice" does not exist"#));
}

#[tokio::test]
async fn connector_panic_is_an_execution_failure() {
    let repairer = ScriptedRepairer::new(&[]);
    let report = ExecutionLoop::new(Arc::new(PanickingExecutor), repairer.clone())
        .with_max_attempts(1)
        .run("SELECT 1", &CancellationToken::new())
        .await;

    assert!(!report.succeeded());
    assert_eq!(report.attempt, 1);
    assert_eq!(report.error.as_deref(), Some("connection reset by peer"));
    assert_eq!(repairer.calls()[0].1, "connection reset by peer");
}

#[tokio::test]
async fn empty_repair_keeps_previous_query() {
    let executor = PickyExecutor::new("never matches");
    let repairer = ScriptedRepairer::new(&["   ", "I could not fix that."]);
    let report = ExecutionLoop::new(executor.clone(), repairer)
        .with_max_attempts(2)
        .run("SELECT 0", &CancellationToken::new())
        .await;

    assert_eq!(report.attempt, 2);
    assert_eq!(executor.seen(), vec!["SELECT 0"; 3]);
}

#[tokio::test]
async fn apology_from_repairer_never_reaches_the_store() {
    let executor = PickyExecutor::new("never matches");
    let apology = "I'm sorry, I cannot fix this query without more information.";
    let repairer = ScriptedRepairer::new(&[apology; 3]);
    let report = ExecutionLoop::new(executor.clone(), repairer.clone())
        .run("SELECT x FROM t", &CancellationToken::new())
        .await;

    assert!(!report.succeeded());
    assert_eq!(report.attempt, MAX_EXEC_RETRIES);
    assert_eq!(report.query, "SELECT x FROM t");
    assert_eq!(executor.seen(), vec!["SELECT x FROM t"; MAX_EXEC_RETRIES as usize + 1]);
    assert!(repairer.calls().iter().all(|(broken, _)| broken == "SELECT x FROM t"));
}
