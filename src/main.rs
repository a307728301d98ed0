use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use llm_docgen::{
    Aggregator, AzureOpenAiClient, CompletionClient, CompletionRequest, Config, ConnectionSettings,
    CostAccountant, CostLedger, DEFAULT_RATE_PER_THOUSAND_TOKENS, Pipeline, ResponseReport,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_SYSTEM_PROMPT: &str = "you are an ai assistant";

#[derive(Parser, Debug)]
#[command(
    name = "llm-docgen",
    version,
    author,
    about = "Generate markdown documentation for a source tree with an LLM",
    long_about = "Generate markdown documentation for a source tree with an LLM.\n\n\
    Every file matching the suffix is sent to an Azure OpenAI deployment, one at a time, \
    and the answer is written to a mirrored documentation tree. The tree can then be \
    merged into a single master document.\n\n\
    Connection settings are read from AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_KEY, \
    AZURE_OPENAI_API_VERSION and AZURE_OPENAI_DEPLOYMENT (a .env file is honoured).\n\n\
    USAGE EXAMPLES:\n  \
      # Document every Python file under ./source_code\n  \
      llm-docgen generate --dir ./source_code\n\n  \
      # Document, then merge everything into one file\n  \
      llm-docgen run --dir ./source_code --master ./master.md\n\n  \
      # Merge an existing documentation tree\n  \
      llm-docgen aggregate --dir ./generated_documentation --master ./master.md\n\n  \
      # One-off question\n  \
      llm-docgen ask \"What is a monad?\""
)]
struct Cli {
    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Document every matching source file
    Generate(BatchArgs),

    /// Document every matching source file, then build the master document
    Run(BatchArgs),

    /// Merge a documentation tree into a master document
    Aggregate(AggregateArgs),

    /// Send a single question and print the full response report
    Ask(AskArgs),
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Root directory of the source tree
    #[arg(short, long, default_value = ".", value_name = "PATH")]
    dir: PathBuf,

    /// File name suffix selecting source files
    #[arg(short, long, default_value = ".py")]
    suffix: String,

    /// Path segment identifying the source tree
    #[arg(long, default_value = "source_code", value_name = "SEGMENT")]
    from_segment: String,

    /// Replacement segment for the documentation tree
    #[arg(long, default_value = "generated_documentation", value_name = "SEGMENT")]
    to_segment: String,

    /// Master document built after the batch (required by `run`)
    #[arg(short, long, value_name = "FILE")]
    master: Option<PathBuf>,

    /// Price per 1000 tokens used for cost estimates
    #[arg(long, default_value_t = DEFAULT_RATE_PER_THOUSAND_TOKENS)]
    rate: f64,

    /// Path to a Tera template replacing the built-in prompt
    ///
    /// The template receives `path` and `content` variables. The
    /// `detect_language` filter maps a path to a code-fence language,
    /// e.g. `{{ path | detect_language }}`.
    #[arg(long, value_name = "FILE")]
    template: Option<PathBuf>,

    /// Glob pattern (relative to --dir) to skip; can be repeated
    #[arg(long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Honour .gitignore files and skip hidden entries
    #[arg(long)]
    respect_ignore: bool,

    /// Dry run (no completion calls, no file writes)
    #[arg(long)]
    dry_run: bool,

    /// Back up existing documentation files before overwriting them
    #[arg(long)]
    backup: bool,

    /// Write summary.json into the documentation root
    #[arg(long)]
    summary: bool,

    /// Print the full report of every completion response
    #[arg(long)]
    show_responses: bool,

    /// Label master document sections relative to the documentation root
    #[arg(long)]
    relative_labels: bool,

    /// Stop at the first file that fails
    #[arg(long)]
    fail_fast: bool,
}

impl BatchArgs {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut builder = Config::builder()
            .root_dir(self.dir)
            .suffix(self.suffix)
            .segments(self.from_segment, self.to_segment)
            .rate_per_thousand_tokens(self.rate)
            .exclude_patterns(self.exclude)
            .respect_ignore_files(self.respect_ignore)
            .dry_run(self.dry_run)
            .backup_existing(self.backup)
            .write_summary(self.summary)
            .print_responses(self.show_responses)
            .relative_labels(self.relative_labels)
            .fail_fast(self.fail_fast)
            .connection(ConnectionSettings::from_env());

        if let Some(master) = self.master {
            builder = builder.master_path(master);
        }

        if let Some(template_path) = self.template {
            builder = builder.prompt_template_path(template_path);
        }

        builder.build().context("Failed to build configuration")
    }
}

#[derive(Args, Debug)]
struct AggregateArgs {
    /// Documentation tree to merge
    #[arg(short, long, value_name = "PATH")]
    dir: PathBuf,

    /// Master document to rebuild (previous content is discarded)
    #[arg(short, long, value_name = "FILE")]
    master: PathBuf,

    /// Label sections relative to --dir
    #[arg(long)]
    relative_labels: bool,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Question sent as the user message
    question: String,

    /// System message
    #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
    system: String,

    /// Ask for a JSON object instead of free text
    #[arg(long)]
    json: bool,

    /// Price per 1000 tokens used for the cost estimate
    #[arg(long, default_value_t = DEFAULT_RATE_PER_THOUSAND_TOKENS)]
    rate: f64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    // Values already in the environment win over the .env file.
    dotenvy::dotenv().ok();

    match cli.command {
        Command::Generate(args) => run_batch(args, false),
        Command::Run(args) => run_batch(args, true),
        Command::Aggregate(args) => run_aggregate(args),
        Command::Ask(args) => run_ask(args),
    }
}

fn run_batch(args: BatchArgs, aggregate: bool) -> anyhow::Result<()> {
    if aggregate && args.master.is_none() {
        bail!("`run` needs --master to know where to build the master document");
    }

    let mut config = args.into_config()?;
    if !aggregate {
        config.master_path = None;
    }

    let client = AzureOpenAiClient::new(&config.connection)
        .context("Failed to create completion client")?;

    let report = Pipeline::new(config, client)
        .context("Failed to create pipeline")?
        .run()
        .context("Documentation run failed")?;

    report.batch.print_summary();
    if let Some(stats) = &report.aggregate {
        info!(
            "✓ Appended {} documents ({} bytes) to {}",
            stats.files_appended,
            stats.bytes_written,
            stats.master_path.display()
        );
    }

    if !report.batch.is_success() {
        bail!("{} file(s) could not be documented", report.batch.files_failed);
    }

    Ok(())
}

fn run_aggregate(args: AggregateArgs) -> anyhow::Result<()> {
    let stats = Aggregator::new()
        .relative_labels(args.relative_labels)
        .reset_and_rebuild(&args.dir, &args.master)
        .with_context(|| format!("Failed to aggregate {}", args.dir.display()))?;

    info!(
        "✓ Appended {} documents ({} bytes) to {}",
        stats.files_appended,
        stats.bytes_written,
        stats.master_path.display()
    );
    Ok(())
}

fn run_ask(args: AskArgs) -> anyhow::Result<()> {
    let client = AzureOpenAiClient::new(&ConnectionSettings::from_env())
        .context("Failed to create completion client")?;

    let request = CompletionRequest::user(args.question)
        .with_system(args.system)
        .json(args.json);
    let result = client.complete(&request).context("Completion failed")?;

    let accountant = CostAccountant::new(args.rate);
    let mut ledger = CostLedger::new();
    let record = accountant.record(&mut ledger, result.total_tokens());

    println!("{}", ResponseReport::new(&result, record.estimate));
    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("llm_docgen=info"),
        1 => EnvFilter::new("llm_docgen=debug"),
        _ => EnvFilter::new("llm_docgen=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
