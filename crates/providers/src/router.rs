//! Builds the configured provider, generator and embedder from [`AppConfig`].

use std::sync::Arc;

use lorebot_config::AppConfig;
use lorebot_core::embedding::Embedder;
use lorebot_core::error::{Error, ProviderError};
use lorebot_core::provider::Provider;
use tracing::info;

use crate::generator::{AnswerGenerator, GeneratorOptions};
use crate::hash_embed::HashEmbedder;
use crate::openai_compat::{OpenAiCompatProvider, OpenAiEmbedder};

/// Build the chat completion provider named by `[ai].provider`.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, Error> {
    let ai = &config.ai;
    let base_url = ai
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&ai.provider));
    let api_key = match (&ai.api_key, ai.provider.as_str()) {
        (Some(key), _) => key.clone(),
        (None, "ollama" | "vllm" | "llamacpp") => ai.provider.clone(),
        (None, name) => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key configured for provider '{name}'"
            ))
            .into());
        }
    };

    info!(provider = %ai.provider, url = %base_url, model = %ai.model, "Using chat provider");
    Ok(Arc::new(OpenAiCompatProvider::new(
        &ai.provider,
        base_url,
        api_key,
    )?))
}

/// Build the answer generator, or `None` when AI answers are disabled.
pub fn build_generator(config: &AppConfig) -> Result<Option<AnswerGenerator>, Error> {
    if !config.ai.enabled {
        return Ok(None);
    }
    build_provider(config)
        .and_then(|provider| AnswerGenerator::new(provider, generator_options(config)))
        .map(Some)
}

pub fn generator_options(config: &AppConfig) -> GeneratorOptions {
    GeneratorOptions {
        model: config.ai.model.clone(),
        temperature: config.ai.temperature,
        system_prompt: config.ai.system_prompt.clone(),
        max_input_characters: config.ai.max_input_characters,
        max_output_characters: config.ai.max_output_characters,
    }
}

/// Build the embedder named by `[embedding].provider`.
///
/// `hash` is the local deterministic embedder; any other name is treated as
/// an OpenAI-compatible `/embeddings` endpoint sharing the `[ai]` API key.
pub fn build_embedder(config: &AppConfig) -> Result<Arc<dyn Embedder>, Error> {
    let emb = &config.embedding;
    let embedder: Arc<dyn Embedder> = match emb.provider.as_str() {
        "hash" => Arc::new(HashEmbedder::new(emb.dimensions)?),
        name => {
            let base_url = emb
                .api_url
                .clone()
                .unwrap_or_else(|| default_base_url(name));
            let api_key = config.ai.api_key.clone().ok_or_else(|| {
                ProviderError::NotConfigured(format!("no API key configured for embedder '{name}'"))
            })?;
            Arc::new(OpenAiEmbedder::new(
                base_url,
                api_key,
                &emb.model,
                emb.dimensions,
            )?)
        }
    };
    info!(embedder = %embedder.name(), dimensions = emb.dimensions, "Using embedder");
    Ok(embedder)
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "groq" => "https://api.groq.com/openai/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://api.{provider_name}.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("groq").contains("api.groq.com"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn groq_requires_api_key() {
        let mut config = AppConfig::default();
        config.ai.api_key = None;
        assert!(build_provider(&config).is_err());

        config.ai.api_key = Some("gsk-test".into());
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "groq");
    }

    #[test]
    fn local_providers_need_no_key() {
        let mut config = AppConfig::default();
        config.ai.provider = "ollama".into();
        config.ai.api_key = None;
        assert!(build_provider(&config).is_ok());
    }

    #[test]
    fn disabled_ai_builds_no_generator() {
        let mut config = AppConfig::default();
        config.ai.enabled = false;
        assert!(build_generator(&config).unwrap().is_none());
    }

    #[test]
    fn default_embedder_is_local_hash() {
        let config = AppConfig::default();
        let embedder = build_embedder(&config).unwrap();
        assert_eq!(embedder.name(), "hash");
        assert_eq!(embedder.dimensions(), config.embedding.dimensions);
    }

    #[test]
    fn remote_embedder_requires_key() {
        let mut config = AppConfig::default();
        config.embedding.provider = "openai".into();
        config.ai.api_key = None;
        assert!(build_embedder(&config).is_err());
    }
}
