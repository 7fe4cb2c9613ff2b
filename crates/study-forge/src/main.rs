//! # Study Forge CLI (`sforge`)
//!
//! Generates learning artifacts from plain text and exposes the pipeline's
//! intermediate stages for inspection.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sforge generate <file> --type <t>` | Run the pipeline and print the result as JSON |
//! | `sforge estimate <file>` | Show the token estimate and routing decision |
//! | `sforge chunk <file>` | Show how the text would be split |
//! | `sforge prompt <file> --type <t>` | Print the prompt(s) that would be sent |
//! | `sforge completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! # Ten flashcards from a chapter
//! sforge generate chapter3.txt --type flashcard --count 10
//!
//! # Hard true/false quiz from stdin
//! cat notes.md | sforge generate - --type quiz --count 8 --quiz-kind true_false --difficulty hard
//!
//! # Grade an answer
//! echo "It splits the cell" | sforge generate - --type answer_validation \
//!     --question "What is mitosis?" --reference "Division of a cell nucleus"
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use study_forge::{commands, config, logging};
use study_forge_core::models::{ArtifactType, Difficulty, QuizKind, TypeParams};

/// Study Forge: chunked generation of flashcards, quizzes, and notes.
#[derive(Parser)]
#[command(
    name = "sforge",
    about = "Study Forge: turn long study material into flashcards, quizzes, and notes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/sforge.toml` when present, otherwise built-in
    /// defaults are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    /// Default log level when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate artifacts and print the result set as JSON.
    ///
    /// Exits with status 1 when no usable records were produced.
    Generate {
        /// Source text file, or `-` for stdin.
        file: PathBuf,

        /// Artifact type: flashcard, quiz_question, study_note,
        /// enhanced_note, answer_validation.
        #[arg(long = "type", value_parser = parse_artifact)]
        artifact: ArtifactType,

        /// Number of items to produce (1-50). Required for flashcards and quizzes.
        #[arg(long)]
        count: Option<u32>,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Show the token estimate and whether the request would be chunked.
    Estimate {
        /// Source text file, or `-` for stdin.
        file: PathBuf,

        #[arg(long = "type", value_parser = parse_artifact, default_value = "flashcard")]
        artifact: ArtifactType,
    },

    /// Split the text and show chunk sizes.
    Chunk {
        /// Source text file, or `-` for stdin.
        file: PathBuf,

        #[arg(long = "type", value_parser = parse_artifact, default_value = "flashcard")]
        artifact: ArtifactType,

        /// Override the chunk size derived from the token budget.
        #[arg(long)]
        max_chars: Option<usize>,
    },

    /// Print the rendered prompt(s) without calling the service.
    Prompt {
        /// Source text file, or `-` for stdin.
        file: PathBuf,

        #[arg(long = "type", value_parser = parse_artifact)]
        artifact: ArtifactType,

        #[arg(long)]
        count: Option<u32>,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Print a shell completion script.
    Completions {
        shell: Shell,
    },
}

/// Artifact-specific parameters.
#[derive(clap::Args)]
struct ParamArgs {
    /// Quiz sub-type: multiple_choice, true_false, fill_in_blanks.
    #[arg(long, value_parser = parse_quiz_kind)]
    quiz_kind: Option<QuizKind>,

    /// Quiz difficulty: easy, medium, hard.
    #[arg(long, value_parser = parse_difficulty)]
    difficulty: Option<Difficulty>,

    /// Question being answered (answer_validation).
    #[arg(long)]
    question: Option<String>,

    /// Reference answer to grade against (answer_validation).
    #[arg(long)]
    reference: Option<String>,
}

impl From<ParamArgs> for TypeParams {
    fn from(args: ParamArgs) -> Self {
        TypeParams {
            quiz_kind: args.quiz_kind,
            difficulty: args.difficulty,
            question: args.question,
            reference_answer: args.reference,
        }
    }
}

fn parse_artifact(s: &str) -> Result<ArtifactType, String> {
    s.parse().map_err(|e: study_forge_core::error::RequestError| e.to_string())
}

fn parse_quiz_kind(s: &str) -> Result<QuizKind, String> {
    s.parse().map_err(|e: study_forge_core::error::RequestError| e.to_string())
}

fn parse_difficulty(s: &str) -> Result<Difficulty, String> {
    s.parse().map_err(|e: study_forge_core::error::RequestError| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "sforge", &mut std::io::stdout());
        return Ok(());
    }

    logging::init_logging(cli.log_json, &cli.log_level)?;
    let cfg = config::load_config_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate {
            file,
            artifact,
            count,
            params,
        } => {
            commands::run_generate(&cfg, &file, artifact, count, params.into()).await?;
        }
        Commands::Estimate { file, artifact } => {
            commands::run_estimate(&cfg, &file, artifact)?;
        }
        Commands::Chunk {
            file,
            artifact,
            max_chars,
        } => {
            commands::run_chunk(&cfg, &file, artifact, max_chars)?;
        }
        Commands::Prompt {
            file,
            artifact,
            count,
            params,
        } => {
            commands::run_prompt(&cfg, &file, artifact, count, params.into())?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
