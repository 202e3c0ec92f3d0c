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

mod output;
mod settings;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use estel::PlotlyRenderer;
use settings::AppConfig;
use sleet::{OrchestratorEngine, Outcome, PipelineServices};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use stele::database::load_table_ddl;
use stele::{
    GuardVerdict, LLMAdapter, LlmChartDecider, LlmQueryRepairer, LlmQuerySynthesizer,
    OllamaAdapter, PostgresExecutor, PromptGuard, StaticSchemaRetriever,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "agentic-bi",
    about = "Answer business questions against Postgres with SQL and a chart"
)]
struct Cli {
    /// Configuration file (defaults to ./agentic-bi.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask one question and print the outcome
    Ask {
        question: String,
        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
        /// Write the Plotly figure to this file on success
        #[arg(long, value_name = "PATH")]
        figure_out: Option<PathBuf>,
    },
    /// Load, validate and print the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::load(cli.config.as_deref())?;
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {e}"))?;

    match cli.cmd {
        Command::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Ask {
            question,
            json,
            figure_out,
        } => ask(&config, &question, json, figure_out.as_deref()).await,
    }
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn ask(config: &AppConfig, question: &str, json: bool, figure_out: Option<&Path>) -> Result<ExitCode> {
    if let GuardVerdict::Denied(message) = PromptGuard::new().check(question) {
        warn!("Question rejected by prompt guard");
        eprintln!("{message}");
        return Ok(ExitCode::from(output::EXIT_FAILURE));
    }

    let engine = build_engine(config).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    let outcome = engine.run_pipeline_with_cancel(question, &cancel).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", output::render_text(&outcome));
    }
    if let (Some(path), Outcome::FullSuccess { figure, .. }) = (figure_out, &outcome) {
        std::fs::write(path, serde_json::to_vec_pretty(figure)?)
            .with_context(|| format!("failed to write figure to {}", path.display()))?;
        info!(path = %path.display(), "Figure written");
    }
    Ok(ExitCode::from(output::exit_status(&outcome)))
}

async fn build_engine(config: &AppConfig) -> Result<OrchestratorEngine> {
    let llm: Arc<dyn LLMAdapter> = Arc::new(OllamaAdapter::new(&config.llm)?);
    if let Err(e) = llm.health_check().await {
        warn!(model = llm.model_name(), error = %e, "LLM health check failed");
    }

    let executor = PostgresExecutor::connect(&config.database).await?;
    let tables = load_table_ddl(executor.pool(), &config.database.schemas).await?;
    info!(tables = tables.len(), "Schema catalogue loaded");
    let retriever = Arc::new(StaticSchemaRetriever::new(tables));

    let services = PipelineServices {
        synthesizer: Arc::new(
            LlmQuerySynthesizer::new(llm.clone(), retriever).with_top_k(config.retrieval_top_k),
        ),
        executor: Arc::new(executor),
        repairer: Arc::new(LlmQueryRepairer::new(llm.clone())),
        decider: Arc::new(LlmChartDecider::new(llm)),
        renderer: Arc::new(PlotlyRenderer),
    };
    Ok(OrchestratorEngine::new(services, config.pipeline.clone()))
}
