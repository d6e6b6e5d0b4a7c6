mod ollama;
mod openai;

use async_trait::async_trait;
use std::time::Duration;

use crate::sanitize::sanitize_text;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// Request for a text completion
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Instructions sent as the system message
    pub system: String,
    /// The user prompt
    pub prompt: String,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Timeout for the request
    pub timeout: Duration,
    /// Optional model override instead of the configured model
    pub model_override: Option<String>,
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
    pub metadata: ResponseMetadata,
}

/// Metadata about the LLM response
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Name of the provider (e.g., "openai", "ollama")
    pub provider: String,
    /// Model name used
    pub model: String,
    /// Tokens consumed (if available)
    pub tokens_used: Option<u32>,
    /// Latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for the given request
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Manager for the configured LLM providers, in priority order
pub struct LlmManager {
    pub providers: Vec<Box<dyn LlmProvider>>,
}

impl LlmManager {
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Ask each provider in turn and return the first successful response.
    /// Returns the last error if every provider fails.
    pub async fn generate_first(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
        let mut last_error =
            LlmError::ConfigError("No LLM providers configured".to_string());

        for provider in &self.providers {
            match provider.generate(request.clone()).await {
                Ok(response) => {
                    tracing::info!(
                        "Provider {} answered in {}ms (model {}, tokens {:?})",
                        response.metadata.provider,
                        response.metadata.latency_ms,
                        response.metadata.model,
                        response.metadata.tokens_used
                    );
                    return Ok(response);
                }
                Err(e) => {
                    tracing::error!("Provider {} failed: {}", provider.name(), e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

/// Configuration for LLM providers
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// OpenAI model to use
    pub openai_model: String,
    /// Ollama base URL
    pub ollama_base_url: Option<String>,
    /// Ollama model to use
    pub ollama_model: String,
    /// Default timeout for LLM requests
    pub default_timeout: Duration,
    /// Default max tokens for responses
    pub default_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            ollama_base_url: None,
            ollama_model: "llama3.2".to_string(),
            default_timeout: Duration::from_secs(60),
            default_max_tokens: 2048,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            openai_model: non_empty_env("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            ollama_base_url: non_empty_env("OLLAMA_BASE_URL"),
            ollama_model: non_empty_env("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            default_timeout: non_empty_env("LLM_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_timeout),
            default_max_tokens: non_empty_env("LLM_MAX_TOKENS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_max_tokens),
        }
    }

    /// Build an LlmManager with all configured providers
    pub fn build_manager(&self) -> LlmResult<LlmManager> {
        let mut providers: Vec<Box<dyn LlmProvider>> = Vec::new();

        if let Some(api_key) = &self.openai_api_key {
            providers.push(Box::new(OpenAiProvider::new(
                api_key.clone(),
                self.openai_model.clone(),
            )));
        }

        if let Some(base_url) = &self.ollama_base_url {
            providers.push(Box::new(OllamaProvider::new(
                base_url.clone(),
                self.ollama_model.clone(),
            )?));
        }

        if providers.is_empty() {
            return Err(LlmError::ConfigError(
                "No LLM providers configured. Set OPENAI_API_KEY or OLLAMA_BASE_URL".to_string(),
            ));
        }

        Ok(LlmManager::new(providers))
    }

    /// Request for `count` new questions in the named category
    pub fn question_request(
        &self,
        category_name: &str,
        examples: &[String],
        count: u32,
    ) -> GenerateRequest {
        GenerateRequest {
            system: QUESTION_WRITER_SYSTEM_PROMPT.to_string(),
            prompt: build_generation_prompt(category_name, examples, count),
            max_tokens: Some(self.default_max_tokens),
            temperature: Some(0.8),
            timeout: self.default_timeout,
            model_override: None,
        }
    }
}

/// System prompt for writing new game prompts
pub const QUESTION_WRITER_SYSTEM_PROMPT: &str = "You are a helpful assistant, creating questions for a game called CoupleConvo. \
CoupleConvo is a conversation starter game for couples looking to deepen their connection. \
The game covers a wide range of categories, such as: Would you rather, Most likely to, \
Never have I ever, Complete the sentence, Fun questions, Deep questions, Controversial questions. \
Both partners either answer the same question or each answers a different one. \
Write questions that are warm, specific and fun to discuss out loud.";

/// Build the user prompt listing a few existing questions as style examples
pub fn build_generation_prompt(category_name: &str, examples: &[String], count: u32) -> String {
    let mut prompt = format!(
        "Generate new questions for the category \"{}\" based on these existing questions:\n\n",
        category_name
    );
    for example in examples {
        prompt.push_str("- ");
        prompt.push_str(example);
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "\nPlease generate {} new questions for this category, following this format:\n\n\
         - Question 1\n- Question 2\n- Question 3\n\n\
         It is imperative that you follow this format at all costs.",
        count
    ));
    prompt
}

/// Split a bulleted completion into cleaned question texts
pub fn parse_generated_questions(text: &str) -> Vec<String> {
    text.lines().filter_map(sanitize_text).collect()
}
