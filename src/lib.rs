pub mod article;
pub mod clustering;
pub mod environment;
pub mod judge;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod relations;

use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use ollama_rs::Ollama;
use std::time::Duration;

pub const TARGET_LLM_REQUEST: &str = "llm_request";
pub const TARGET_PREFILTER: &str = "prefilter";
pub const TARGET_ENGINE: &str = "engine";
pub const TARGET_RELATIONS: &str = "relations";

#[derive(Clone, Debug)]
pub enum LLMClient {
    Ollama(Ollama),
    OpenAI(OpenAIClient<OpenAIConfig>),
}

#[derive(Clone, Debug)]
pub struct LLMParams {
    pub llm_client: LLMClient,
    pub model: String,
    pub temperature: f32,
    /// Upper bound for a single request attempt.
    pub timeout: Duration,
    /// Total attempts per call, including the first one.
    pub max_retries: u32,
}

/// Identifies the component issuing LLM requests in log lines.
#[derive(Clone, Debug)]
pub struct WorkerDetail {
    pub name: String,
    pub model: String,
    pub connection_info: String,
}
