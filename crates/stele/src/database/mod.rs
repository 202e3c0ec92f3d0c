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

pub mod execution_loop;
pub mod executor;
pub mod identifiers;
pub mod schema_catalog;
pub mod statement;
pub mod types;

pub use execution_loop::{ExecutionLoop, ExecutionReport, MAX_EXEC_RETRIES};
pub use executor::{PostgresExecutor, QueryExecutor};
pub use identifiers::normalise_identifiers;
pub use schema_catalog::{load_table_ddl, SchemaRetriever, StaticSchemaRetriever, TableDdl};
pub use statement::extract_statement;
pub use types::{DatabaseError, DatabaseSettings, ExecutionError, QueryResult};
