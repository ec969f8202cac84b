use anyhow::{anyhow, bail, Context, Result};

use crate::llm::generate_llm_response;
use crate::prompt::similarity_prompt;
use crate::{LLMParams, WorkerDetail};

/// Scores how strongly two articles impose equivalent or conflicting
/// requirements, from 0 (unrelated) to 1 (same obligation).
///
/// Callers await one score at a time.
#[allow(async_fn_in_trait)]
pub trait Judge {
    async fn score(&self, text_a: &str, text_b: &str) -> Result<f64>;
}

/// Judge backed by an LLM prompted to answer with a single number.
pub struct LlmJudge {
    params: LLMParams,
    worker_detail: WorkerDetail,
}

impl LlmJudge {
    pub fn new(params: LLMParams, connection_info: String) -> Self {
        let worker_detail = WorkerDetail {
            name: "similarity judge".to_string(),
            model: params.model.clone(),
            connection_info,
        };
        Self {
            params,
            worker_detail,
        }
    }
}

impl Judge for LlmJudge {
    async fn score(&self, text_a: &str, text_b: &str) -> Result<f64> {
        let prompt = similarity_prompt(text_a, text_b);
        let response = generate_llm_response(&prompt, &self.params, &self.worker_detail)
            .await
            .ok_or_else(|| anyhow!("No response from model {}", self.params.model))?;
        parse_score(&response)
    }
}

/// Parses the judge's reply into a score clamped to [0, 1].
///
/// The answer is expected on the last non-empty line, optionally wrapped in
/// markdown emphasis or quotes and followed by a period.
pub fn parse_score(response: &str) -> Result<f64> {
    let answer = response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .ok_or_else(|| anyhow!("Empty judge response"))?;

    let answer = answer
        .trim_matches(|c: char| matches!(c, '*' | '`' | '"' | '\''))
        .trim_end_matches('.');

    let score: f64 = answer
        .parse()
        .with_context(|| format!("Unparsable judge score {:?}", answer))?;
    if !score.is_finite() {
        bail!("Judge score is not finite: {:?}", answer);
    }

    Ok(score.clamp(0.0, 1.0))
}
