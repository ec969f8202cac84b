use anyhow::{anyhow, Result};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use lazy_static::lazy_static;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::options::GenerationOptions;
use regex::Regex;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::{LLMClient, LLMParams, WorkerDetail, TARGET_LLM_REQUEST};

lazy_static! {
    static ref THINKING_BLOCK: Regex = Regex::new(r"(?s)<think>.*?</think>").unwrap();
}

/// Sends `prompt` to the configured model, retrying with exponential backoff.
///
/// Each attempt is bounded by `params.timeout`. Returns `None` once every
/// attempt has failed, timed out, or produced an empty answer.
pub async fn generate_llm_response(
    prompt: &str,
    params: &LLMParams,
    worker_detail: &WorkerDetail,
) -> Option<String> {
    let max_retries = params.max_retries.max(1);
    let mut backoff = 2;

    debug!(target: TARGET_LLM_REQUEST, "[{} {} {}]: sending prompt: {}", worker_detail.name, worker_detail.model, worker_detail.connection_info, prompt);

    for retry_count in 0..max_retries {
        match timeout(params.timeout, send_request(prompt, params)).await {
            Ok(Ok(response)) => {
                let response = strip_thinking_tags(&response);
                if !response.is_empty() {
                    debug!(target: TARGET_LLM_REQUEST, "[{} {} {}]: response received: {}", worker_detail.name, worker_detail.model, worker_detail.connection_info, response);
                    return Some(response);
                }
                warn!(target: TARGET_LLM_REQUEST, "[{} {} {}]: empty response", worker_detail.name, worker_detail.model, worker_detail.connection_info);
            }
            Ok(Err(e)) => {
                warn!(target: TARGET_LLM_REQUEST, "[{} {} {}]: error generating response: {:#}", worker_detail.name, worker_detail.model, worker_detail.connection_info, e);
            }
            Err(_) => {
                warn!(target: TARGET_LLM_REQUEST, "[{} {} {}]: request timed out after {:?}", worker_detail.name, worker_detail.model, worker_detail.connection_info, params.timeout);
            }
        }

        if retry_count < max_retries - 1 {
            info!(target: TARGET_LLM_REQUEST, "[{} {} {}]: retrying in {}s ({}/{})", worker_detail.name, worker_detail.model, worker_detail.connection_info, backoff, retry_count + 1, max_retries);
            sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }

    error!(target: TARGET_LLM_REQUEST, "[{} {} {}]: no response after {} attempts", worker_detail.name, worker_detail.model, worker_detail.connection_info, max_retries);
    None
}

async fn send_request(prompt: &str, params: &LLMParams) -> Result<String> {
    match &params.llm_client {
        LLMClient::Ollama(ollama) => {
            let mut request = GenerationRequest::new(params.model.clone(), prompt.to_string());
            request.options = Some(GenerationOptions::default().temperature(params.temperature));
            let response = ollama.generate(request).await?;
            Ok(response.response)
        }
        LLMClient::OpenAI(client) => {
            let message: ChatCompletionRequestMessage =
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into();
            let request = CreateChatCompletionRequestArgs::default()
                .model(params.model.clone())
                .temperature(params.temperature)
                .messages(vec![message])
                .build()?;
            let response = client.chat().create(request).await?;
            response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| anyhow!("OpenAI response contained no message content"))
        }
    }
}

/// Removes `<think>...</think>` blocks emitted by reasoning models.
pub fn strip_thinking_tags(response: &str) -> String {
    THINKING_BLOCK.replace_all(response, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_thinking_tags() {
        assert_eq!(
            strip_thinking_tags("<think>\nBoth mention capital.\n</think>\n0.42"),
            "0.42"
        );
        assert_eq!(
            strip_thinking_tags("<think>a</think>overlap<think>b</think>"),
            "overlap"
        );
        assert_eq!(strip_thinking_tags("  bloat \n"), "bloat");
    }
}
