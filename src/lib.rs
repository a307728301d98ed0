//! # llm-docgen
//!
//! Generates per-file markdown documentation for a source tree with a
//! chat-completion model, then merges the results into one master document.
//!
//! ## Features
//!
//! - Recursive discovery by file-name suffix, with optional `.gitignore` support
//! - Documentation tree mirroring the source tree through a path-segment remap
//! - Per-call token usage and cost bookkeeping
//! - Atomic file writes with optional backups
//! - Master document aggregation with code-fence stripping
//!
//! ## Quick Start
//!
//! ```no_run
//! use llm_docgen::{Config, ConnectionSettings};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .root_dir("./source_code")
//!     .suffix(".py")
//!     .master_path("./master.md")
//!     .connection(ConnectionSettings::from_env())
//!     .build()?;
//!
//! let report = llm_docgen::run(config)?;
//! report.batch.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library follows a pipeline architecture:
//! 1. **Scanner**: Discovers source files and maps them to documentation paths
//! 2. **Generator**: Prompts the model for one file and writes its answer
//! 3. **Pipeline**: Drives the generator over every file, tracking cost
//! 4. **Aggregator**: Concatenates the documentation tree into a master document

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod aggregator;
mod client;
mod config;
mod cost;
mod error;
mod file;
mod generator;
mod pipeline;
mod prompt;
mod report;
mod scanner;
mod writer;

pub use aggregator::{AggregateStats, Aggregator, aggregate, remove_markdown_code_blocks};
pub use client::{
    AzureOpenAiClient, Choice, ChoiceMessage, CompletionClient, CompletionRequest,
    CompletionResult, DEFAULT_REQUEST_TIMEOUT, FunctionCall, SEED, TEMPERATURE, ToolCall, Usage,
};
pub use config::{
    Config, ConfigBuilder, ConnectionSettings, ENV_API_KEY, ENV_API_VERSION, ENV_DEPLOYMENT,
    ENV_ENDPOINT,
};
pub use cost::{CostAccountant, CostLedger, CostRecord, DEFAULT_RATE_PER_THOUSAND_TOKENS};
pub use error::{Error, Result};
pub use file::{SourceFile, read_source};
pub use generator::{DocGenerator, GeneratedDocument};
pub use pipeline::{BatchSummary, FileFailure, Pipeline, RunReport};
pub use report::ResponseReport;
pub use scanner::{discover, output_path_for, remap};
pub use writer::read_document;

/// Runs the documentation batch against Azure OpenAI, then aggregates the
/// result when a master document is configured.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - Connection settings are incomplete (checked before any call)
/// - A file fails while `fail_fast` is set
/// - Aggregation fails
///
/// # Examples
///
/// ```no_run
/// use llm_docgen::{Config, ConnectionSettings, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .root_dir(".")
///     .connection(ConnectionSettings::from_env())
///     .build()?;
///
/// run(config)?;
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<RunReport> {
    let client = AzureOpenAiClient::new(&config.connection)?;
    Pipeline::new(config, client)?.run()
}
