//! Answer generation from a system prompt, optional retrieved context and a query.
//!
//! Enforces the configured character budgets around a [`Provider`] call:
//! the whole prompt is kept within `max_input_characters` (context is cut
//! before the query is), and the answer is truncated at a sentence boundary
//! to `max_output_characters`.

use std::sync::Arc;

use lorebot_core::error::{Error, ProviderError};
use lorebot_core::message::Message;
use lorebot_core::provider::{Provider, ProviderRequest};
use lorebot_core::text::truncate;
use tracing::{debug, info};

/// Prefix of the context block appended to the system prompt.
const CONTEXT_HEADER: &str = "\n\nContext: ";

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
    pub max_input_characters: Option<usize>,
    pub max_output_characters: Option<usize>,
}

pub struct AnswerGenerator {
    provider: Arc<dyn Provider>,
    options: GeneratorOptions,
}

impl std::fmt::Debug for AnswerGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerGenerator")
            .field("provider", &self.provider.name())
            .field("options", &self.options)
            .finish()
    }
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn Provider>, options: GeneratorOptions) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&options.temperature) {
            return Err(Error::config(format!(
                "Invalid temperature provided: {}",
                options.temperature
            )));
        }
        if options.system_prompt.trim().is_empty() {
            return Err(Error::config("Invalid system prompt provided: empty"));
        }
        let prompt_len = options.system_prompt.chars().count();
        if let Some(max) = options.max_input_characters {
            if max <= prompt_len {
                return Err(Error::config(format!(
                    "Maximum input characters is too small to pass any user prompts \
                     ({max} vs. {prompt_len} characters excluding context)"
                )));
            }
        }
        if options.max_output_characters == Some(0) {
            return Err(Error::config("Invalid maximum output characters count provided: 0"));
        }
        Ok(Self { provider, options })
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Build the system and user messages within the input budget.
    pub fn build_prompt(&self, query: &str, context: Option<&str>) -> Vec<Message> {
        let system = &self.options.system_prompt;
        let mut context: Option<String> = context.map(str::to_string);
        let mut query: String = query.to_string();

        if let Some(max) = self.options.max_input_characters {
            let system_len = system.chars().count();
            let header_len = CONTEXT_HEADER.chars().count();
            let query_len = query.chars().count();

            if let Some(ctx) = &mut context {
                let room = max.saturating_sub(system_len + header_len + query_len);
                if ctx.chars().count() > room {
                    *ctx = ctx.chars().take(room).collect();
                }
            }

            let used = system_len + context.as_ref().map_or(0, |c| header_len + c.chars().count());
            let room = max.saturating_sub(used);
            if query_len > room {
                query = query.chars().take(room).collect();
            }
        }

        let system_with_context = match context {
            Some(ctx) => format!("{system}{CONTEXT_HEADER}{ctx}"),
            None => system.clone(),
        };
        vec![Message::system(system_with_context), Message::user(query)]
    }

    /// Generate an answer for `query` using `context`.
    pub async fn generate(&self, query: &str, context: Option<&str>) -> Result<String, ProviderError> {
        let messages = self.build_prompt(query, context);
        let request = ProviderRequest {
            model: self.options.model.clone(),
            messages,
            temperature: self.options.temperature,
            max_tokens: self
                .options
                .max_output_characters
                .map(|c| u32::try_from(c).unwrap_or(u32::MAX)),
        };

        debug!(provider = %self.provider.name(), model = %request.model, "Generating answer");
        let response = self.provider.complete(request).await?;
        if let Some(usage) = &response.usage {
            info!(model = %response.model, tokens = usage.total_tokens, "Answer generated");
        }

        let answer = response.message.content;
        Ok(match self.options.max_output_characters {
            Some(max) => truncate(&answer, max),
            None => answer,
        })
    }
}
