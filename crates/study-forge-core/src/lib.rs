//! # Study Forge Core
//!
//! Runtime-free logic of the chunked generation pipeline: data models,
//! token estimation, chunking, prompt rendering, response sanitizing,
//! schema validation, deduplication, and result assembly.
//!
//! This crate contains no tokio, HTTP client, filesystem I/O, or global
//! state. The generative-text service is reached only through the
//! [`GenerationBackend`](backend::GenerationBackend) trait, which the
//! application crate implements.
//!
//! | Module | Stage |
//! |--------|-------|
//! | [`estimate`] | token cost heuristic |
//! | [`chunk`] | structure-aware text splitting |
//! | [`prompt`] | per-artifact instruction templates |
//! | [`backend`] | generation call abstraction |
//! | [`sanitize`] | JSON recovery from untrusted replies |
//! | [`validate`] | per-artifact schema rules |
//! | [`dedup`] | content-hash deduplication |
//! | [`artifact`] | strategy object per artifact type |
//! | [`pipeline`] | routing, per-unit execution, assembly |

pub mod artifact;
pub mod backend;
pub mod chunk;
pub mod config;
pub mod dedup;
pub mod error;
pub mod estimate;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod sanitize;
pub mod validate;
