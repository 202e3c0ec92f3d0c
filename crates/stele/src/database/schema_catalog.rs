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

use super::types::DatabaseError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

pub const DEFAULT_TOP_K: usize = 3;

/// One table blueprint handed to the query synthesizer as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDdl {
    pub schema: String,
    pub table: String,
    pub ddl: String,
}
impl TableDdl {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

#[async_trait]
pub trait SchemaRetriever: Send + Sync {
    async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<TableDdl>, DatabaseError>;
}

/// Ranks an in-memory set of table blueprints by word overlap with the
/// question. Ties keep catalogue order.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaRetriever {
    tables: Vec<TableDdl>,
}

impl StaticSchemaRetriever {
    pub fn new(tables: Vec<TableDdl>) -> Self {
        Self { tables }
    }
    pub fn len(&self) -> usize {
        self.tables.len()
    }
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn score(question_terms: &HashSet<String>, table: &TableDdl) -> usize {
        let name_terms = terms(&table.table);
        let ddl_terms = terms(&table.ddl);
        question_terms
            .iter()
            .map(|t| {
                let in_name = name_terms.iter().any(|n| n.contains(t.as_str()) || t.contains(n.as_str()));
                let in_ddl = ddl_terms.contains(t);
                usize::from(in_name) * 3 + usize::from(in_ddl)
            })
            .sum()
    }
}

/// Lowercased words of at least three characters, with CamelCase split.
fn terms(text: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut word = String::new();
    let mut prev_lower = false;
    for ch in text.chars().chain(std::iter::once(' ')) {
        let boundary = !ch.is_alphanumeric() || (ch.is_uppercase() && prev_lower);
        if boundary && !word.is_empty() {
            if word.len() >= 3 {
                out.insert(word.trim_end_matches('s').to_string());
            }
            word.clear();
        }
        if ch.is_alphanumeric() {
            word.extend(ch.to_lowercase());
        }
        prev_lower = ch.is_lowercase();
    }
    out
}

#[async_trait]
impl SchemaRetriever for StaticSchemaRetriever {
    async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<TableDdl>, DatabaseError> {
        let question_terms = terms(question);
        let mut scored: Vec<(usize, usize)> = self
            .tables
            .iter()
            .enumerate()
            .map(|(idx, t)| (Self::score(&question_terms, t), idx))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let picked: Vec<TableDdl> = scored
            .into_iter()
            .take(top_k)
            .map(|(_, idx)| self.tables[idx].clone())
            .collect();
        debug!(
            tables = ?picked.iter().map(TableDdl::full_name).collect::<Vec<_>>(),
            "Relevant tables"
        );
        Ok(picked)
    }
}

/// Joins retrieved blueprints into the context block given to the model.
pub fn schema_context(tables: &[TableDdl]) -> String {
    tables
        .iter()
        .map(|t| t.ddl.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_ddl(schema: &str, table: &str, columns: &[(String, String, bool)]) -> String {
    let mut lines = vec![format!("CREATE TABLE {schema}.{table} (")];
    for (name, data_type, nullable) in columns {
        let null_str = if *nullable { "NULL" } else { "NOT NULL" };
        lines.push(format!("  {name} {data_type} {null_str},"));
    }
    lines.push(");".to_string());
    lines.join("\n")
}

/// Builds `CREATE TABLE` blueprints for every base table in `schemas`.
#[instrument(skip(pool))]
pub async fn load_table_ddl(pool: &PgPool, schemas: &[String]) -> Result<Vec<TableDdl>, DatabaseError> {
    let rows = sqlx::query(
        "SELECT c.table_schema::text AS table_schema, c.table_name::text AS table_name, \
                c.column_name::text AS column_name, c.data_type::text AS data_type, \
                c.is_nullable::text AS is_nullable \
         FROM information_schema.columns c \
         JOIN information_schema.tables t \
           ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
         WHERE c.table_schema = ANY($1) AND t.table_type = 'BASE TABLE' \
         ORDER BY c.table_schema, c.table_name, c.ordinal_position",
    )
    .bind(schemas)
    .fetch_all(pool)
    .await
    .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

    let mut tables: Vec<(String, String, Vec<(String, String, bool)>)> = Vec::new();
    for row in rows {
        let get = |col: &str| -> Result<String, DatabaseError> {
            row.try_get::<String, _>(col)
                .map_err(|e| DatabaseError::SerialisationError(e.to_string()))
        };
        let (schema, table) = (get("table_schema")?, get("table_name")?);
        let column = (get("column_name")?, get("data_type")?, get("is_nullable")? == "YES");
        match tables.last_mut() {
            Some((s, t, cols)) if *s == schema && *t == table => cols.push(column),
            _ => tables.push((schema, table, vec![column])),
        }
    }
    info!(tables = tables.len(), "Generated DDL blueprints");
    Ok(tables
        .into_iter()
        .map(|(schema, table, columns)| TableDdl {
            ddl: render_ddl(&schema, &table, &columns),
            schema,
            table,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(schema: &str, name: &str, cols: &[&str]) -> TableDdl {
        let columns: Vec<(String, String, bool)> = cols
            .iter()
            .map(|c| (c.to_string(), "integer".to_string(), false))
            .collect();
        TableDdl {
            schema: schema.into(),
            table: name.into(),
            ddl: render_ddl(schema, name, &columns),
        }
    }

    #[test]
    fn ddl_layout() {
        let ddl = render_ddl(
            "HumanResources",
            "Employee",
            &[
                ("BusinessEntityID".into(), "integer".into(), false),
                ("VacationHours".into(), "smallint".into(), true),
            ],
        );
        assert_eq!(
            ddl,
            "CREATE TABLE HumanResources.Employee (\n  BusinessEntityID integer NOT NULL,\n  VacationHours smallint NULL,\n);"
        );
    }

    #[test]
    fn camel_case_is_split_into_terms() {
        let t = terms("SalesOrderHeader TotalDue");
        assert!(t.contains("sale"));
        assert!(t.contains("order"));
        assert!(t.contains("header"));
        assert!(t.contains("total"));
    }

    #[tokio::test]
    async fn ranks_tables_by_overlap() {
        let retriever = StaticSchemaRetriever::new(vec![
            table("Production", "ProductInventory", &["Quantity", "ProductID"]),
            table("HumanResources", "Employee", &["VacationHours", "JobTitle"]),
            table("Sales", "SalesOrderHeader", &["TotalDue", "OrderDate"]),
        ]);
        let picked = retriever
            .retrieve("Show me the top 5 employees by vacation hours", 1)
            .await
            .unwrap();
        assert_eq!(picked[0].full_name(), "HumanResources.Employee");
        let all = retriever.retrieve("anything", 10).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn context_joins_with_blank_lines() {
        let a = table("Sales", "Store", &["Name"]);
        let b = table("Sales", "Customer", &["StoreID"]);
        let ctx = schema_context(&[a.clone(), b.clone()]);
        assert_eq!(ctx, format!("{}\n\n{}", a.ddl, b.ddl));
    }
}
