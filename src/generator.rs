use crate::{
    client::{CompletionClient, CompletionRequest, CompletionResult},
    config::Config,
    error::{Error, Result},
    file::read_source,
    prompt::PromptTemplate,
    scanner::{output_path_for, remap},
    writer::Writer,
};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Markdown produced from one source file.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDocument {
    /// File the documentation describes
    pub source_path: PathBuf,

    /// Where the documentation was written
    pub output_path: PathBuf,

    /// Markdown returned by the model
    pub content: String,

    /// When the document was written
    pub generated_at: DateTime<Local>,

    /// Response the content came from
    #[serde(skip)]
    pub completion: CompletionResult,
}

impl GeneratedDocument {
    /// Tokens consumed producing this document.
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.completion.total_tokens()
    }
}

/// Turns one source file into one documentation file.
pub struct DocGenerator {
    prompt: PromptTemplate,
    writer: Writer,
    source_segment: String,
    docs_segment: String,
}

impl DocGenerator {
    /// Creates a generator from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt template cannot be loaded.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            prompt: PromptTemplate::new(config.prompt_template_path.as_deref())?,
            writer: Writer::new(config.backup_existing),
            source_segment: config.source_segment.clone(),
            docs_segment: config.docs_segment.clone(),
        })
    }

    /// Output path for `source_path`.
    #[must_use]
    pub fn output_path(&self, source_path: &Path) -> PathBuf {
        output_path_for(source_path, &self.source_segment, &self.docs_segment)
    }

    /// Builds the completion request for a file's content.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt template fails to render.
    pub fn build_request(&self, source_path: &Path, content: &str) -> Result<CompletionRequest> {
        Ok(CompletionRequest::user(self.prompt.render(source_path, content)?))
    }

    /// Reads `source_path`, asks the model to document it and writes the
    /// answer under the mapped output path.
    ///
    /// # Errors
    ///
    /// - [`Error::SourceNotFound`] if the file is gone
    /// - [`Error::Configuration`] if the mapped output path is the source itself
    /// - any client error, unchanged
    /// - [`Error::MalformedResponse`] if the response has no text content
    /// - IO errors from writing the document
    pub fn generate_doc(
        &self,
        client: &dyn CompletionClient,
        source_path: &Path,
    ) -> Result<GeneratedDocument> {
        let output_path = self.output_path(source_path);
        if output_path == source_path {
            return Err(Error::config(format!(
                "output path for '{}' is the source file itself; check the segment mapping",
                source_path.display()
            )));
        }
        if remap(source_path, &self.source_segment, &self.docs_segment) == source_path {
            warn!(
                "'{}' does not contain '{}'; documentation will be written beside the source",
                source_path.display(),
                self.source_segment
            );
        }

        let content = read_source(source_path)?;
        let request = self.build_request(source_path, &content)?;
        let completion = client.complete(&request)?;

        let markdown = completion
            .content()
            .ok_or_else(|| {
                Error::malformed(format!("response '{}' carried no content", completion.id))
            })?
            .to_string();

        self.writer.write_document(&output_path, &markdown)?;
        debug!(
            "Documented {} -> {}",
            source_path.display(),
            output_path.display()
        );

        Ok(GeneratedDocument {
            source_path: source_path.to_path_buf(),
            output_path,
            content: markdown,
            generated_at: Local::now(),
            completion,
        })
    }
}
