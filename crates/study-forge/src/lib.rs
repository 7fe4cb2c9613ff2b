//! # Study Forge
//!
//! Turns long study material into flashcards, quiz questions, and notes by
//! driving an external generative-text service through a bounded, chunked
//! pipeline.
//!
//! This crate wires the runtime-free core ([`study_forge_core`]) to the
//! outside world:
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | TOML configuration and validation |
//! | [`client`] | reqwest client for Gemini and OpenAI-compatible APIs |
//! | [`orchestrator`] | routing, bounded fan-out, retries, assembly |
//! | [`logging`] | tracing subscriber setup |
//! | [`commands`] | `sforge` subcommand implementations |
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use study_forge::client::HttpGenerationClient;
//! use study_forge::config::Config;
//! use study_forge::orchestrator::Orchestrator;
//! use study_forge_core::models::{ArtifactType, GenerationRequest, TypeParams};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let cfg = Config::default();
//! let client = HttpGenerationClient::new(&cfg.generation)?;
//! let orchestrator = Orchestrator::new(Arc::new(client), cfg.pipeline());
//!
//! let request = GenerationRequest::new(
//!     "Mitochondria produce ATP through cellular respiration.",
//!     ArtifactType::Flashcard,
//!     Some(5),
//!     TypeParams::default(),
//! )?;
//! let result = orchestrator.generate(&request).await.into_result()?;
//! println!("{} flashcards", result.items.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod commands;
pub mod config;
pub mod logging;
pub mod orchestrator;
