use crate::cost::DEFAULT_RATE_PER_THOUSAND_TOKENS;
use crate::error::{Error, Result};
use globset::Glob;
use std::path::{Path, PathBuf};

const DEFAULT_SUFFIX: &str = ".py";
const DEFAULT_SOURCE_SEGMENT: &str = "source_code";
const DEFAULT_DOCS_SEGMENT: &str = "generated_documentation";

/// Environment variable holding the service endpoint URL.
pub const ENV_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
/// Environment variable holding the API credential.
pub const ENV_API_KEY: &str = "AZURE_OPENAI_KEY";
/// Environment variable holding the API version.
pub const ENV_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
/// Environment variable holding the deployment (model) name.
pub const ENV_DEPLOYMENT: &str = "AZURE_OPENAI_DEPLOYMENT";

/// Connection settings for the completion service.
///
/// Every value is optional here; [`ConnectionSettings::require_credentials`]
/// decides whether a run may start.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Service endpoint URL
    pub endpoint: Option<String>,

    /// API credential
    pub api_key: Option<String>,

    /// API version query parameter
    pub api_version: Option<String>,

    /// Deployment / model name
    pub deployment: Option<String>,
}

// Keeps the key out of debug logs.
impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_version", &self.api_version)
            .field("deployment", &self.deployment)
            .finish()
    }
}

impl ConnectionSettings {
    /// Reads the settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through an arbitrary lookup function.
    ///
    /// Blank values are treated as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            endpoint: read(ENV_ENDPOINT),
            api_key: read(ENV_API_KEY),
            api_version: read(ENV_API_VERSION),
            deployment: read(ENV_DEPLOYMENT),
        }
    }

    /// Checks that endpoint, credential and API version are all present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming every missing variable.
    pub fn require_credentials(&self) -> Result<()> {
        let missing: Vec<&str> = [
            (ENV_ENDPOINT, &self.endpoint),
            (ENV_API_KEY, &self.api_key),
            (ENV_API_VERSION, &self.api_version),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::config(format!(
                "missing connection settings: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Configuration for the documentation pipeline.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Root directory of the source tree
    pub root_dir: PathBuf,

    /// File name suffix selecting source files (e.g. `.py`)
    pub suffix: String,

    /// Path segment identifying the source tree
    pub source_segment: String,

    /// Replacement segment identifying the documentation tree
    pub docs_segment: String,

    /// Master document written by the aggregation stage
    pub master_path: Option<PathBuf>,

    /// Price per 1000 tokens used for cost estimates
    pub rate_per_thousand_tokens: f64,

    /// Path to a Tera template replacing the built-in prompt.
    ///
    /// Templates receive `path` and `content`, and may use the
    /// `detect_language` filter to turn a path into a code-fence language.
    pub prompt_template_path: Option<PathBuf>,

    /// Glob patterns (relative to the root) excluded from discovery
    pub exclude_patterns: Vec<String>,

    /// Honour `.gitignore` and skip hidden files during discovery
    pub respect_ignore_files: bool,

    /// Dry run mode (no completion calls, no file writes)
    pub dry_run: bool,

    /// Create backups of existing documentation files before overwriting
    pub backup_existing: bool,

    /// Persist the batch summary as `summary.json` in the documentation root
    pub write_summary: bool,

    /// Print the full diagnostic report of every completion response
    pub print_responses: bool,

    /// Label master document sections relative to the documentation root
    pub relative_labels: bool,

    /// Abort the batch on the first per-file failure
    pub fail_fast: bool,

    /// Completion service connection settings
    pub connection: ConnectionSettings,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use llm_docgen::Config;
    ///
    /// let config = Config::builder()
    ///     .root_dir(".")
    ///     .suffix(".rs")
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// Connection settings are not checked here; the batch driver does that
    /// right before it would make its first call.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Root directory doesn't exist
    /// - Suffix or source segment is empty
    /// - The cost rate is negative or not finite
    /// - The prompt template path doesn't point at a file
    /// - An exclude pattern is not a valid glob
    pub fn validate(&self) -> Result<()> {
        if !self.root_dir.exists() {
            return Err(Error::config(format!(
                "Root directory does not exist: {}",
                self.root_dir.display()
            )));
        }

        if !self.root_dir.is_dir() {
            return Err(Error::config(format!(
                "Root path is not a directory: {}",
                self.root_dir.display()
            )));
        }

        if self.suffix.is_empty() {
            return Err(Error::config("suffix must not be empty"));
        }

        if self.source_segment.is_empty() {
            return Err(Error::config("source_segment must not be empty"));
        }

        if !self.rate_per_thousand_tokens.is_finite() || self.rate_per_thousand_tokens < 0.0 {
            return Err(Error::config(format!(
                "rate_per_thousand_tokens must be a non-negative number, got {}",
                self.rate_per_thousand_tokens
            )));
        }

        if let Some(ref template_path) = self.prompt_template_path {
            if !template_path.is_file() {
                return Err(Error::config(format!(
                    "Template file does not exist: {}",
                    template_path.display()
                )));
            }
        }

        for pattern in &self.exclude_patterns {
            Glob::new(pattern).map_err(|e| {
                Error::config(format!("Invalid exclude pattern '{pattern}': {e}"))
            })?;
        }

        Ok(())
    }

    /// Documentation root mirroring `root_dir`.
    #[must_use]
    pub fn docs_root(&self) -> PathBuf {
        crate::scanner::remap(&self.root_dir, &self.source_segment, &self.docs_segment)
    }

    /// Output path for one source file.
    #[must_use]
    pub fn output_path_for(&self, source: &Path) -> PathBuf {
        crate::scanner::output_path_for(source, &self.source_segment, &self.docs_segment)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            suffix: DEFAULT_SUFFIX.to_string(),
            source_segment: DEFAULT_SOURCE_SEGMENT.to_string(),
            docs_segment: DEFAULT_DOCS_SEGMENT.to_string(),
            master_path: None,
            rate_per_thousand_tokens: DEFAULT_RATE_PER_THOUSAND_TOKENS,
            prompt_template_path: None,
            exclude_patterns: Vec::new(),
            respect_ignore_files: false,
            dry_run: false,
            backup_existing: false,
            write_summary: false,
            print_responses: false,
            relative_labels: false,
            fail_fast: false,
            connection: ConnectionSettings::default(),
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    root_dir: Option<PathBuf>,
    suffix: Option<String>,
    source_segment: Option<String>,
    docs_segment: Option<String>,
    master_path: Option<PathBuf>,
    rate_per_thousand_tokens: Option<f64>,
    prompt_template_path: Option<PathBuf>,
    exclude_patterns: Vec<String>,
    respect_ignore_files: bool,
    dry_run: bool,
    backup_existing: bool,
    write_summary: bool,
    print_responses: bool,
    relative_labels: bool,
    fail_fast: bool,
    connection: Option<ConnectionSettings>,
}

impl ConfigBuilder {
    /// Sets the root directory of the source tree.
    #[must_use]
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(path.into());
        self
    }

    /// Sets the file name suffix selecting source files.
    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Sets the source-tree segment and its documentation-tree replacement.
    #[must_use]
    pub fn segments(mut self, source: impl Into<String>, docs: impl Into<String>) -> Self {
        self.source_segment = Some(source.into());
        self.docs_segment = Some(docs.into());
        self
    }

    /// Sets the master document path.
    #[must_use]
    pub fn master_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.master_path = Some(path.into());
        self
    }

    /// Sets the price per 1000 tokens.
    #[must_use]
    pub fn rate_per_thousand_tokens(mut self, rate: f64) -> Self {
        self.rate_per_thousand_tokens = Some(rate);
        self
    }

    /// Sets the path to an external prompt template.
    ///
    /// The template receives `path` and `content` variables; the
    /// `detect_language` filter maps a path to a code-fence language
    /// (`{{ path | detect_language }}`).
    #[must_use]
    pub fn prompt_template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.prompt_template_path = Some(path.into());
        self
    }

    /// Sets glob patterns excluded from discovery.
    #[must_use]
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Enables `.gitignore` and hidden-file filtering during discovery.
    #[must_use]
    pub fn respect_ignore_files(mut self, enabled: bool) -> Self {
        self.respect_ignore_files = enabled;
        self
    }

    /// Enables dry run mode.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Enables or disables backup creation.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = enabled;
        self
    }

    /// Enables writing `summary.json` after a batch.
    #[must_use]
    pub fn write_summary(mut self, enabled: bool) -> Self {
        self.write_summary = enabled;
        self
    }

    /// Enables printing the diagnostic report of each response.
    #[must_use]
    pub fn print_responses(mut self, enabled: bool) -> Self {
        self.print_responses = enabled;
        self
    }

    /// Labels master document sections relative to the documentation root.
    #[must_use]
    pub fn relative_labels(mut self, enabled: bool) -> Self {
        self.relative_labels = enabled;
        self
    }

    /// Aborts the batch on the first per-file failure.
    #[must_use]
    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    /// Sets the connection settings.
    #[must_use]
    pub fn connection(mut self, settings: ConnectionSettings) -> Self {
        self.connection = Some(settings);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let config = Config {
            root_dir: self.root_dir.unwrap_or_else(|| PathBuf::from(".")),
            suffix: self.suffix.unwrap_or_else(|| DEFAULT_SUFFIX.to_string()),
            source_segment: self
                .source_segment
                .unwrap_or_else(|| DEFAULT_SOURCE_SEGMENT.to_string()),
            docs_segment: self
                .docs_segment
                .unwrap_or_else(|| DEFAULT_DOCS_SEGMENT.to_string()),
            master_path: self.master_path,
            rate_per_thousand_tokens: self
                .rate_per_thousand_tokens
                .unwrap_or(DEFAULT_RATE_PER_THOUSAND_TOKENS),
            prompt_template_path: self.prompt_template_path,
            exclude_patterns: self.exclude_patterns,
            respect_ignore_files: self.respect_ignore_files,
            dry_run: self.dry_run,
            backup_existing: self.backup_existing,
            write_summary: self.write_summary,
            print_responses: self.print_responses,
            relative_labels: self.relative_labels,
            fail_fast: self.fail_fast,
            connection: self.connection.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
