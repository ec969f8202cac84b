use anyhow::{Context, Result};
use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use ollama_rs::Ollama;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::{LLMClient, LLMParams};

/// Retrieves an environment variable, or `default` when it is unset or blank.
pub fn get_env_var_or(var: &str, default: &str) -> String {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Retrieves and parses an environment variable.
///
/// # Arguments
/// - `var`: The name of the environment variable.
/// - `default`: Value returned when the variable is unset or blank.
///
/// # Returns
/// - `Err` if the variable is set but cannot be parsed as `T`.
pub fn get_env_var_parsed<T>(var: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value {:?} for environment variable {}", value, var)),
        _ => Ok(default),
    }
}

/// Builds the LLM client described by `LLM_TYPE`, `OLLAMA_HOST`, `OLLAMA_PORT`
/// and `OPENAI_API_KEY`, along with a printable description of the endpoint.
pub fn llm_client_from_env() -> Result<(LLMClient, String)> {
    match get_env_var_or("LLM_TYPE", "ollama").to_lowercase().as_str() {
        "openai" => {
            let api_key = env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY environment variable must be set when LLM_TYPE=openai")?;
            let config = OpenAIConfig::new().with_api_key(api_key);
            Ok((
                LLMClient::OpenAI(OpenAIClient::with_config(config)),
                "OpenAI API".to_string(),
            ))
        }
        _ => {
            let mut host = get_env_var_or("OLLAMA_HOST", "http://localhost");
            if !host.starts_with("http://") && !host.starts_with("https://") {
                host = format!("http://{}", host);
            }
            let port: u16 = get_env_var_parsed("OLLAMA_PORT", 11434)?;

            info!("Connecting to Ollama at {}:{}", host, port);
            let connection_info = format!("{}:{}", host, port);
            Ok((LLMClient::Ollama(Ollama::new(host, port)), connection_info))
        }
    }
}

/// Builds LLM request parameters from the environment.
pub fn llm_params_from_env() -> Result<(LLMParams, String)> {
    let (llm_client, connection_info) = llm_client_from_env()?;
    let params = LLMParams {
        llm_client,
        model: get_env_var_or("LLM_MODEL", "gemma3:4b"),
        temperature: get_env_var_parsed("LLM_TEMPERATURE", 0.1)?,
        timeout: Duration::from_secs(get_env_var_parsed("LLM_TIMEOUT_SECS", 120)?),
        max_retries: get_env_var_parsed("LLM_MAX_RETRIES", 3)?,
    };
    Ok((params, connection_info))
}
