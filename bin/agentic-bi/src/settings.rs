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

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use llm_contracts::LlmSettings;
use serde::{Deserialize, Serialize};
use sleet::PipelineConfig;
use std::path::Path;
use stele::DatabaseSettings;

pub const ENV_PREFIX: &str = "AGENTIC_BI";
pub const DEFAULT_CONFIG_NAME: &str = "agentic-bi";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
}
fn default_retrieval_top_k() -> usize {
    3
}
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            llm: LlmSettings::default(),
            database: DatabaseSettings::default(),
            retrieval_top_k: default_retrieval_top_k(),
        }
    }
}

impl AppConfig {
    /// Built-in defaults, then `agentic-bi.{toml,yaml,json}` from the working
    /// directory (or `path` when given), then `AGENTIC_BI__SECTION__KEY`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("database.schemas"),
            )
            .build()
            .context("failed to read configuration sources")?;
        let config: AppConfig = settings
            .try_deserialize()
            .context("configuration has an invalid shape")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.pipeline.validate().map_err(|e| format!("pipeline: {e}"))?;
        self.llm.validate().map_err(|e| format!("llm: {e}"))?;
        self.database.validate().map_err(|e| format!("database: {e}"))?;
        if self.retrieval_top_k == 0 {
            return Err("retrieval_top_k must be at least 1".to_string());
        }
        Ok(())
    }

    /// Copy safe to print: the database password is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.database.url = mask_password(&copy.database.url);
        copy
    }
}

fn mask_password(url: &str) -> String {
    let Some(scheme_end) = url.find("://").map(|i| i + 3) else {
        return url.to_string();
    };
    let Some(at) = url[scheme_end..].find('@').map(|i| i + scheme_end) else {
        return url.to_string();
    };
    match url[scheme_end..at].find(':') {
        Some(colon) => format!("{}:****{}", &url[..scheme_end + colon], &url[at..]),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "retrieval_top_k = 5\n\n[pipeline.limits]\nrender = 2\n\n[database]\nurl = \"postgres://bi:secret@db:5432/aw\"\nschemas = [\"Sales\"]\n"
        )
        .unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.retrieval_top_k, 5);
        assert_eq!(config.pipeline.limits.render, 2);
        assert_eq!(config.pipeline.limits.execution, 3);
        assert_eq!(config.database.schemas, vec!["Sales".to_string()]);
        assert_eq!(config.database.max_connections, 5);
        assert!(config.validate().is_ok());
        assert_eq!(config.redacted().database.url, "postgres://bi:****@db:5432/aw");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn invalid_values_are_reported_by_section() {
        let config = AppConfig {
            retrieval_top_k: 3,
            llm: LlmSettings {
                model: " ".into(),
                ..LlmSettings::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().unwrap_err().starts_with("llm:"));
    }

    #[test]
    fn urls_without_password_are_unchanged() {
        assert_eq!(mask_password("postgres://localhost/aw"), "postgres://localhost/aw");
        assert_eq!(mask_password("postgres://bi@localhost/aw"), "postgres://bi@localhost/aw");
    }
}
