use crate::{
    aggregator::{AggregateStats, Aggregator},
    client::CompletionClient,
    config::Config,
    cost::{CostAccountant, CostLedger},
    error::{Error, Result},
    generator::DocGenerator,
    report::ResponseReport,
    scanner::Scanner,
    writer::Writer,
};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// A source file that could not be documented.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    /// Source file that failed
    pub path: PathBuf,

    /// Why it failed
    #[serde(serialize_with = "serialize_display")]
    pub error: Error,
}

fn serialize_display<S: Serializer>(
    error: &Error,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Statistics collected during one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Source files found by discovery
    pub files_discovered: usize,

    /// Files documented successfully
    pub files_processed: usize,

    /// Files that failed
    pub files_failed: usize,

    /// Per-file failure details, in discovery order
    pub failures: Vec<FileFailure>,

    /// Tokens consumed across all calls
    pub total_tokens: u64,

    /// Estimated cost across all calls
    pub total_cost: f64,

    /// Total execution time
    pub duration: Duration,

    /// Root of the documentation tree
    pub docs_root: PathBuf,

    /// Whether this was a dry run
    pub dry_run: bool,
}

impl BatchSummary {
    /// Returns `true` if every discovered file was documented.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.files_failed == 0
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║            Documentation Batch Summary                ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Files Discovered:     {:>8}                        ║",
            self.files_discovered
        );
        println!(
            "║   - Documented:       {:>8}                        ║",
            self.files_processed
        );
        println!(
            "║   - Failed:           {:>8}                        ║",
            self.files_failed
        );
        println!("║                                                       ║");
        println!(
            "║ Total Tokens:         {:>8}                        ║",
            self.total_tokens
        );
        println!(
            "║ Estimated Cost:       {:>8.4} $                      ║",
            self.total_cost
        );
        println!("║                                                       ║");
        println!("║ Documentation Root:                                   ║");
        println!("║   {}", self.docs_root.display());
        println!(
            "║ Total Time:           {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        if self.dry_run {
            println!("║                                                       ║");
            println!("║ ⚠ No calls made, no files written (dry run mode)      ║");
        }
        println!("╚═══════════════════════════════════════════════════════╝\n");

        for failure in &self.failures {
            println!("  ✗ {}: {}", failure.path.display(), failure.error);
        }
    }
}

/// Outcome of [`Pipeline::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Documentation batch statistics
    pub batch: BatchSummary,

    /// Aggregation statistics, when a master document was configured
    pub aggregate: Option<AggregateStats>,
}

/// Batch driver: documents every discovered source file, one at a time.
pub struct Pipeline {
    config: Config,
    scanner: Scanner,
    generator: DocGenerator,
    accountant: CostAccountant,
    writer: Writer,
    client: Box<dyn CompletionClient>,
}

impl Pipeline {
    /// Creates a new pipeline around `client`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The prompt template cannot be loaded
    pub fn new(config: Config, client: impl CompletionClient + 'static) -> Result<Self> {
        config.validate()?;

        let scanner = Scanner::new(&config)?;
        let generator = DocGenerator::new(&config)?;
        let accountant = CostAccountant::new(config.rate_per_thousand_tokens);
        let writer = Writer::new(config.backup_existing);

        Ok(Self {
            config,
            scanner,
            generator,
            accountant,
            writer,
            client: Box::new(client),
        })
    }

    /// Configuration this pipeline runs with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Documents every source file under the root directory.
    ///
    /// # Process
    ///
    /// 1. **Check**: connection settings must be complete
    /// 2. **Discover**: snapshot of matching files, taken once
    /// 3. **Generate**: one completion call per file, strictly in order
    ///
    /// A failing file is recorded and the batch moves on, unless
    /// `fail_fast` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Connection settings are incomplete (no call is made, nothing is written)
    /// - Discovery fails
    /// - A file fails while `fail_fast` is set
    /// - The summary file cannot be written
    #[instrument(skip(self), fields(root_dir = %self.config.root_dir.display()))]
    pub fn run_batch(&self) -> Result<BatchSummary> {
        self.config.connection.require_credentials()?;

        let start_time = Instant::now();
        let docs_root = self.config.docs_root();

        info!("Stage 1/2: Discovering *{} files...", self.config.suffix);
        let files = self.scanner.discover()?;
        let total = files.len();
        info!("✓ Discovered {} files", total);

        let mut ledger = CostLedger::new();
        let mut failures = Vec::new();
        let mut files_processed = 0;
        let mut total_tokens = 0;

        if self.config.dry_run {
            warn!("Dry run mode enabled - skipping completion calls and writes");
            for file in &files {
                info!(
                    "Would document {} -> {}",
                    file.relative_path,
                    self.generator.output_path(&file.absolute_path).display()
                );
            }
        } else {
            info!("Stage 2/2: Generating documentation...");
            for (index, file) in files.iter().enumerate() {
                info!(
                    "[{}/{}] {} ({} bytes)",
                    index + 1,
                    total,
                    file.relative_path,
                    file.len
                );

                match self
                    .generator
                    .generate_doc(self.client.as_ref(), &file.absolute_path)
                {
                    Ok(doc) => {
                        let record = self.accountant.record(&mut ledger, doc.total_tokens());
                        info!(
                            "  {} used {} tokens, estimated ${:.4} (running total ${:.4})",
                            doc.completion.id,
                            doc.total_tokens(),
                            record.estimate,
                            record.running_total
                        );
                        if self.config.print_responses {
                            println!("{}", ResponseReport::new(&doc.completion, record.estimate));
                        }
                        total_tokens += doc.total_tokens();
                        files_processed += 1;
                    }
                    Err(e) if self.config.fail_fast => {
                        error!("✗ {}: {}", file.relative_path, e);
                        return Err(e);
                    }
                    Err(e) => {
                        error!("✗ {}: {}", file.relative_path, e);
                        failures.push(FileFailure {
                            path: file.absolute_path.clone(),
                            error: e,
                        });
                    }
                }
            }
        }

        let summary = BatchSummary {
            files_discovered: total,
            files_processed,
            files_failed: failures.len(),
            failures,
            total_tokens,
            total_cost: ledger.total(),
            duration: start_time.elapsed(),
            docs_root,
            dry_run: self.config.dry_run,
        };

        if self.config.write_summary && !self.config.dry_run {
            self.writer.write_summary(&summary.docs_root, &summary)?;
        }

        if summary.is_success() {
            info!(
                "✓ Documented {} files in {:.2}s",
                summary.files_processed,
                summary.duration.as_secs_f64()
            );
        } else {
            warn!(
                "Documented {} files, {} failed",
                summary.files_processed, summary.files_failed
            );
        }

        Ok(summary)
    }

    /// Runs the batch, then rebuilds the master document when one is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch fails as a whole or aggregation fails.
    pub fn run(self) -> Result<RunReport> {
        let batch = self.run_batch()?;

        let aggregate = match self.config.master_path.as_deref() {
            Some(_) if self.config.dry_run => {
                warn!("Dry run mode enabled - skipping aggregation");
                None
            }
            Some(_) if !batch.docs_root.is_dir() => {
                warn!(
                    "Documentation root {} does not exist - skipping aggregation",
                    batch.docs_root.display()
                );
                None
            }
            Some(master) => Some(
                Aggregator::new()
                    .relative_labels(self.config.relative_labels)
                    .reset_and_rebuild(&batch.docs_root, master)?,
            ),
            None => None,
        };

        Ok(RunReport { batch, aggregate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{result_with, ScriptedClient};
    use crate::config::ConnectionSettings;
    use assert_fs::prelude::*;
    use std::path::Path;
    use std::sync::Arc;

    fn test_connection() -> ConnectionSettings {
        ConnectionSettings {
            endpoint: Some("https://example.openai.azure.com".to_string()),
            api_key: Some("test-key".to_string()),
            api_version: Some("2024-02-01".to_string()),
            deployment: Some("gpt-test".to_string()),
        }
    }

    fn create_test_config(root: &Path) -> crate::config::ConfigBuilder {
        Config::builder()
            .root_dir(root)
            .segments("source", "docs")
            .connection(test_connection())
    }

    fn source_tree() -> assert_fs::TempDir {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("source/a.py").write_str("a = 1").unwrap();
        temp.child("source/pkg/b.py").write_str("b = 2").unwrap();
        temp
    }

    #[test]
    fn test_missing_credentials_makes_no_calls() {
        let temp = source_tree();
        let client = Arc::new(ScriptedClient::always("doc"));
        let config = Config::builder()
            .root_dir(temp.path().join("source"))
            .segments("source", "docs")
            .build()
            .unwrap();

        let err = Pipeline::new(config, Arc::clone(&client))
            .unwrap()
            .run_batch()
            .unwrap_err();

        assert!(err.is_config());
        assert!(err.to_string().contains("AZURE_OPENAI_KEY"));
        assert_eq!(client.calls(), 0);
        assert!(!temp.path().join("docs").exists());
    }

    #[test]
    fn test_batch_documents_every_file() {
        let temp = source_tree();
        let client = Arc::new(ScriptedClient::always("# Doc"));
        let config = create_test_config(&temp.path().join("source"))
            .build()
            .unwrap();

        let summary = Pipeline::new(config, Arc::clone(&client))
            .unwrap()
            .run_batch()
            .unwrap();

        assert_eq!(summary.files_discovered, 2);
        assert_eq!(summary.files_processed, 2);
        assert!(summary.is_success());
        assert_eq!(summary.docs_root, temp.path().join("docs"));
        assert_eq!(client.calls(), 2);
        temp.child("docs/a.md").assert("# Doc");
        temp.child("docs/pkg/b.md").assert("# Doc");
    }

    #[test]
    fn test_batch_accumulates_cost() {
        let temp = source_tree();
        let client = ScriptedClient::default();
        client.push(Ok(result_with("one", 1000)));
        client.push(Ok(result_with("two", 500)));
        let config = create_test_config(&temp.path().join("source"))
            .rate_per_thousand_tokens(0.01)
            .build()
            .unwrap();

        let summary = Pipeline::new(config, client).unwrap().run_batch().unwrap();

        assert_eq!(summary.total_tokens, 1500);
        assert!((summary.total_cost - 0.015).abs() < 1e-12);
    }

    #[test]
    fn test_batch_continues_after_failure() {
        let temp = source_tree();
        let client = Arc::new(ScriptedClient::always("doc"));
        client.push(Err(Error::transport("service returned 500")));
        let config = create_test_config(&temp.path().join("source"))
            .build()
            .unwrap();

        let summary = Pipeline::new(config, Arc::clone(&client))
            .unwrap()
            .run_batch()
            .unwrap();

        assert_eq!(client.calls(), 2);
        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.failures[0].path, temp.path().join("source/a.py"));
        assert!(summary.failures[0].error.is_transport());
        assert!(!temp.path().join("docs/a.md").exists());
        temp.child("docs/pkg/b.md").assert("doc");
    }

    /// Deletes `doomed` on its first call, as if the file vanished mid-batch.
    struct DeletingClient {
        inner: ScriptedClient,
        doomed: PathBuf,
    }

    impl CompletionClient for DeletingClient {
        fn complete(
            &self,
            request: &crate::client::CompletionRequest,
        ) -> Result<crate::client::CompletionResult> {
            let _ = std::fs::remove_file(&self.doomed);
            self.inner.complete(request)
        }
    }

    #[test]
    fn test_file_removed_after_discovery_is_recorded() {
        let temp = source_tree();
        let doomed = temp.path().join("source/pkg/b.py");
        let client = Arc::new(DeletingClient {
            inner: ScriptedClient::always("doc"),
            doomed: doomed.clone(),
        });
        let config = create_test_config(&temp.path().join("source"))
            .build()
            .unwrap();

        let summary = Pipeline::new(config, Arc::clone(&client))
            .unwrap()
            .run_batch()
            .unwrap();

        assert_eq!(summary.files_discovered, 2);
        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.failures[0].path, doomed);
        assert!(summary.failures[0].error.is_not_found());
        assert_eq!(client.inner.calls(), 1);
        temp.child("docs/a.md").assert("doc");
        assert!(!temp.path().join("docs/pkg/b.md").exists());
    }

    #[test]
    fn test_fail_fast_stops_at_first_failure() {
        let temp = source_tree();
        let client = Arc::new(ScriptedClient::always("doc"));
        client.push(Err(Error::transport("connection reset")));
        let config = create_test_config(&temp.path().join("source"))
            .fail_fast(true)
            .build()
            .unwrap();

        let err = Pipeline::new(config, Arc::clone(&client))
            .unwrap()
            .run_batch()
            .unwrap_err();

        assert!(err.is_transport());
        assert_eq!(client.calls(), 1);
        assert!(!temp.path().join("docs/pkg/b.md").exists());
    }

    #[test]
    fn test_dry_run_makes_no_calls_or_writes() {
        let temp = source_tree();
        let client = Arc::new(ScriptedClient::always("doc"));
        let config = create_test_config(&temp.path().join("source"))
            .dry_run(true)
            .write_summary(true)
            .master_path(temp.path().join("master.md"))
            .build()
            .unwrap();

        let report = Pipeline::new(config, Arc::clone(&client))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(report.batch.files_discovered, 2);
        assert_eq!(report.batch.files_processed, 0);
        assert!(report.aggregate.is_none());
        assert_eq!(client.calls(), 0);
        assert!(!temp.path().join("docs").exists());
        assert!(!temp.path().join("master.md").exists());
    }

    #[test]
    fn test_empty_tree_is_not_an_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("source/readme.txt").write_str("nothing").unwrap();
        let client = Arc::new(ScriptedClient::always("doc"));
        let config = create_test_config(&temp.path().join("source"))
            .build()
            .unwrap();

        let summary = Pipeline::new(config, Arc::clone(&client))
            .unwrap()
            .run_batch()
            .unwrap();

        assert_eq!(summary.files_discovered, 0);
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn test_summary_file_written_to_docs_root() {
        let temp = source_tree();
        let config = create_test_config(&temp.path().join("source"))
            .write_summary(true)
            .build()
            .unwrap();

        Pipeline::new(config, ScriptedClient::always("doc"))
            .unwrap()
            .run_batch()
            .unwrap();

        let written: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(temp.path().join("docs/summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(written["files_processed"], 2);
        assert_eq!(written["files_failed"], 0);
    }

    #[test]
    fn test_run_aggregates_into_master() {
        let temp = source_tree();
        let master = temp.child("out/master.md");
        let config = create_test_config(&temp.path().join("source"))
            .master_path(master.path())
            .relative_labels(true)
            .build()
            .unwrap();

        let report = Pipeline::new(config, ScriptedClient::always("```markdown\nDoc\n```"))
            .unwrap()
            .run()
            .unwrap();

        let aggregate = report.aggregate.unwrap();
        assert_eq!(aggregate.files_appended, 2);
        let expected = format!(
            "File Path: a.md\n\nDoc\n\n---\n\nFile Path: {}\n\nDoc\n\n---\n\n",
            Path::new("pkg").join("b.md").display()
        );
        master.assert(expected);
    }
}
