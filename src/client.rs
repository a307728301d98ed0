//! Completion service adapter.
//!
//! [`CompletionClient`] is the seam the pipeline talks to. [`AzureOpenAiClient`]
//! is the production implementation: one blocking HTTP request per call,
//! deterministic sampling, no retries.

use crate::config::ConnectionSettings;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Fixed sampling temperature.
pub const TEMPERATURE: f32 = 0.0;

/// Fixed sampling seed.
pub const SEED: u64 = 42;

/// Default overall transport timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest slice of an error body carried into a transport error, after the
/// API key has been masked.
const ERROR_BODY_LIMIT: usize = 500;

/// Something that can answer a completion request.
pub trait CompletionClient: Send + Sync {
    /// Issues exactly one completion request.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if the user prompt is empty
    /// - [`Error::Transport`] on network or service failure
    /// - [`Error::MalformedResponse`] if the response lacks a choice or usage block
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult>;
}

impl<T: CompletionClient + ?Sized> CompletionClient for std::sync::Arc<T> {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult> {
        (**self).complete(request)
    }
}

/// One completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Optional system message
    pub system_prompt: Option<String>,

    /// User message; must not be empty
    pub user_prompt: String,

    /// Request a JSON object instead of free text
    pub json_mode: bool,
}

impl CompletionRequest {
    /// Creates a free-text request with a single user message.
    #[must_use]
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            user_prompt: prompt.into(),
            json_mode: false,
        }
    }

    /// Adds a system message.
    #[must_use]
    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Selects JSON or free-text response mode.
    #[must_use]
    pub const fn json(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.user_prompt.trim().is_empty() {
            return Err(Error::invalid_request("user prompt must not be empty"));
        }
        Ok(())
    }
}

/// Token usage reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u64,

    /// Tokens in the completion
    #[serde(default)]
    pub completion_tokens: u64,

    /// Prompt plus completion
    pub total_tokens: u64,
}

/// Function name and JSON-encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name
    pub name: String,

    /// Arguments as a JSON-encoded string
    #[serde(default)]
    pub arguments: String,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier
    pub id: String,

    /// Tool type, normally `function`
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,

    /// Requested function
    pub function: FunctionCall,
}

fn default_tool_type() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Decodes the arguments string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the arguments are not valid JSON.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.function.arguments)?)
    }
}

/// Message carried by a choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    /// Role, normally `assistant`
    pub role: String,

    /// Text content; absent when the model only calls tools
    #[serde(default)]
    pub content: Option<String>,

    /// Legacy single function call
    #[serde(default)]
    pub function_call: Option<FunctionCall>,

    /// Tool invocations
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChoiceMessage {
    /// Tool calls, empty when none were requested.
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

/// One response choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Position in the choices list
    #[serde(default)]
    pub index: u32,

    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,

    /// The generated message
    pub message: ChoiceMessage,
}

/// A completion response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// Response identifier
    pub id: String,

    /// Token usage
    pub usage: Usage,

    /// Generated choices; never empty once returned by a client
    pub choices: Vec<Choice>,
}

impl CompletionResult {
    /// Total tokens consumed by the call.
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.usage.total_tokens
    }

    /// Content of the first choice.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }

    /// Parses a raw response body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if the body cannot be decoded or
    /// carries no choices.
    pub fn from_json(body: &str) -> Result<Self> {
        let result: Self = serde_json::from_str(body)
            .map_err(|e| Error::malformed(format!("cannot decode response: {e}")))?;
        if result.choices.is_empty() {
            return Err(Error::malformed(format!(
                "response '{}' has no choices",
                result.id
            )));
        }
        Ok(result)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
    seed: u64,
}

/// Azure OpenAI chat-completions client.
pub struct AzureOpenAiClient {
    http: Client,
    url: String,
    api_key: String,
    deployment: String,
}

impl std::fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("url", &self.url)
            .field("deployment", &self.deployment)
            .finish_non_exhaustive()
    }
}

impl AzureOpenAiClient {
    /// Creates a client with the default transport timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a setting is missing or the HTTP
    /// client cannot be constructed.
    pub fn new(settings: &ConnectionSettings) -> Result<Self> {
        Self::with_timeout(settings, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client with a custom overall transport timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a setting is missing or the HTTP
    /// client cannot be constructed.
    pub fn with_timeout(settings: &ConnectionSettings, timeout: Duration) -> Result<Self> {
        settings.require_credentials()?;

        let (Some(endpoint), Some(api_key), Some(api_version)) = (
            settings.endpoint.as_deref(),
            settings.api_key.as_deref(),
            settings.api_version.as_deref(),
        ) else {
            return Err(Error::config("missing connection settings"));
        };
        let deployment = settings.deployment.as_deref().ok_or_else(|| {
            Error::config(format!(
                "missing connection settings: {}",
                crate::config::ENV_DEPLOYMENT
            ))
        })?;

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: chat_completions_url(endpoint, deployment, api_version),
            api_key: api_key.to_string(),
            deployment: deployment.to_string(),
        })
    }

    /// Deployment name requests are sent to.
    #[must_use]
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    fn build_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequestBody<'a> {
        request_body(&self.deployment, request)
    }
}

fn request_body<'a>(model: &'a str, request: &'a CompletionRequest) -> ChatRequestBody<'a> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system_prompt.as_deref() {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.user_prompt,
    });

    ChatRequestBody {
        model,
        messages,
        response_format: ResponseFormat {
            kind: if request.json_mode { "json_object" } else { "text" },
        },
        temperature: TEMPERATURE,
        seed: SEED,
    }
}

fn chat_completions_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

/// Masks `secret` in an error body, then truncates it.
fn error_snippet(body: &str, secret: &str) -> String {
    if secret.is_empty() {
        return truncate_body(body).to_string();
    }
    truncate_body(&body.replace(secret, "<redacted>")).to_string()
}

fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

impl CompletionClient for AzureOpenAiClient {
    fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult> {
        request.validate()?;

        debug!(
            deployment = %self.deployment,
            json_mode = request.json_mode,
            prompt_chars = request.user_prompt.len(),
            "Invoking completion service"
        );

        let response = self
            .http
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&self.build_body(request))
            .send()
            .map_err(|e| Error::transport(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| Error::transport(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(Error::transport(format!(
                "service returned {status}: {}",
                error_snippet(&body, &self.api_key)
            )));
        }

        let result = CompletionResult::from_json(&body)?;

        debug!(
            id = %result.id,
            total_tokens = result.total_tokens(),
            choices = result.choices.len(),
            "Completion received"
        );

        Ok(result)
    }
}
