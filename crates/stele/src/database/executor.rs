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

use super::types::{DatabaseError, DatabaseSettings, ExecutionError, QueryResult};
use async_trait::async_trait;
use estel::{summarise_rows, Record};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use tracing::{debug, info, instrument};

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str) -> Result<QueryResult, ExecutionError>;
}

/// Runs read-only queries against Postgres, returning each row as an ordered
/// JSON record.
#[derive(Debug, Clone)]
pub struct PostgresExecutor {
    pool: PgPool,
    summary_rows: usize,
    statement_timeout: Duration,
}

impl PostgresExecutor {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.statement_timeout_seconds))
            .connect(&settings.url)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        info!(max_connections = settings.max_connections, "Connected to Postgres");
        Ok(Self::from_pool(pool, settings))
    }
    pub fn from_pool(pool: PgPool, settings: &DatabaseSettings) -> Self {
        Self {
            pool,
            summary_rows: settings.summary_rows,
            statement_timeout: Duration::from_secs(settings.statement_timeout_seconds),
        }
    }
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_records(&self, query: &str) -> Result<Vec<Record>, DatabaseError> {
        let wrapped = wrap_as_json_rows(query);
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        let rows = sqlx::query(&wrapped)
            .fetch_all(&mut *tx)
            .await
            .map_err(store_error)?;
        if let Err(e) = tx.rollback().await {
            debug!(error = %e, "Rollback of read-only transaction failed");
        }
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let text: Option<String> = row
                .try_get("record")
                .map_err(|e| DatabaseError::SerialisationError(e.to_string()))?;
            let Some(text) = text else {
                records.push(Record::new());
                continue;
            };
            let record: Record = serde_json::from_str(&text)
                .map_err(|e| DatabaseError::SerialisationError(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }
}

fn store_error(err: sqlx::Error) -> DatabaseError {
    match err {
        sqlx::Error::Database(db) => DatabaseError::QueryFailed(db.message().to_string()),
        sqlx::Error::PoolTimedOut => DatabaseError::Timeout,
        other => DatabaseError::QueryFailed(other.to_string()),
    }
}

/// `SELECT row_to_json(t)::text AS record FROM (<query>) t`
pub fn wrap_as_json_rows(query: &str) -> String {
    let body = query.trim().trim_end_matches(';').trim_end();
    format!("SELECT row_to_json(t)::text AS record FROM (\n{body}\n) t")
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    async fn execute(&self, query: &str) -> Result<QueryResult, ExecutionError> {
        let rows = match tokio::time::timeout(self.statement_timeout, self.fetch_records(query)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                let QueryFailedMessage(message) = e.into();
                return Err(ExecutionError::new(message));
            }
            Err(_) => return Err(DatabaseError::Timeout.into()),
        };
        debug!(rows = rows.len(), "Query returned rows");
        let summary = summarise_rows(&rows, self.summary_rows);
        Ok(QueryResult { rows, summary })
    }
}

/// Store messages reach the caller verbatim, without the `Query failed:` prefix.
struct QueryFailedMessage(String);
impl From<DatabaseError> for QueryFailedMessage {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::QueryFailed(msg) => QueryFailedMessage(msg),
            other => QueryFailedMessage(other.to_string()),
        }
    }
}
