//! Implementations of the `sforge` subcommands.
//!
//! Each `run_*` function reads its input, does its work, and prints to
//! stdout. Logs go to stderr through `tracing`.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use study_forge_core::artifact::strategy_for;
use study_forge_core::chunk::split_text;
use study_forge_core::models::{ArtifactType, GenerationRequest, ResultSet, TypeParams};
use study_forge_core::pipeline::{plan_text, Route};

use crate::client::HttpGenerationClient;
use crate::config::Config;
use crate::orchestrator::Orchestrator;

/// Read source text from `path`, or stdin when `path` is `-`.
pub fn read_source(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read source text from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source file: {}", path.display()))
}

/// Run the full pipeline and print the [`ResultSet`] as JSON.
///
/// Returns an error after printing when nothing usable was produced.
pub async fn run_generate(
    cfg: &Config,
    path: &Path,
    artifact: ArtifactType,
    count: Option<u32>,
    params: TypeParams,
) -> Result<()> {
    let text = read_source(path)?;
    let request =
        GenerationRequest::new(text, artifact, count, params).context("Invalid generation request")?;

    let client = HttpGenerationClient::new(&cfg.generation)?;
    let orchestrator = Orchestrator::new(Arc::new(client), cfg.pipeline());
    let result = orchestrator.generate(&request).await;

    print_result(&result)?;
    result.into_result()?;
    Ok(())
}

pub fn print_result(result: &ResultSet) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("Failed to serialize result")?;
    println!("{}", json);
    Ok(())
}

/// Print the token estimate and the route the request would take.
pub fn run_estimate(cfg: &Config, path: &Path, artifact: ArtifactType) -> Result<()> {
    let text = read_source(path)?;
    let plan = plan_text(&text, None, strategy_for(artifact), &cfg.budget);

    println!("artifact:          {}", artifact);
    println!("characters:        {}", text.chars().count());
    println!("words:             {}", text.split_whitespace().count());
    println!("estimated tokens:  {}", plan.estimate);
    println!("budget per call:   {}", plan.max_tokens_per_call);
    println!("chunk char budget: {}", plan.chunk_char_budget);
    match plan.route {
        Route::Direct => println!("route:             direct (1 call)"),
        Route::Chunked => println!("route:             chunked ({} calls)", plan.units.len()),
    }
    Ok(())
}

/// Print chunk indices and sizes.
pub fn run_chunk(
    cfg: &Config,
    path: &Path,
    artifact: ArtifactType,
    max_chars: Option<usize>,
) -> Result<()> {
    let text = read_source(path)?;
    let budget = max_chars.unwrap_or_else(|| cfg.budget.chunk_char_budget(artifact));
    let chunks = split_text(&text, budget);

    println!("{} chunk(s), budget {} chars", chunks.len(), budget);
    for chunk in &chunks {
        let preview: String = chunk.text.chars().take(60).collect();
        let marker = if chunk.char_size > budget { " (oversized)" } else { "" };
        println!(
            "  [{}] {} chars{}: {}",
            chunk.index,
            chunk.char_size,
            marker,
            preview.replace('\n', " ")
        );
    }
    Ok(())
}

/// Print the prompt(s) that `generate` would send.
pub fn run_prompt(
    cfg: &Config,
    path: &Path,
    artifact: ArtifactType,
    count: Option<u32>,
    params: TypeParams,
) -> Result<()> {
    let text = read_source(path)?;
    let strategy = strategy_for(artifact);
    let plan = plan_text(&text, count, strategy, &cfg.budget);

    for unit in &plan.units {
        if plan.route == Route::Chunked {
            println!("===== chunk {} of {} =====", unit.chunk.index + 1, plan.units.len());
        }
        println!(
            "{}",
            strategy.build_prompt(&unit.chunk.text, unit.target, &params, &cfg.validation)
        );
    }
    Ok(())
}
