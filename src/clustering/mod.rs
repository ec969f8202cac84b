// Module declarations
pub mod engine;
pub mod prefilter;
#[cfg(test)]
mod tests;
pub mod types;

pub use engine::{Assignment, ClusteringEngine, ClusteringOutcome, RunStats};
pub use prefilter::{Candidate, LexicalPrefilter, Reference};
pub use types::*;

use anyhow::{bail, Result};

use crate::environment::get_env_var_parsed;

/// Minimum lexical similarity for a reference to be sent to the judge
pub const DEFAULT_TFIDF_THRESHOLD: f64 = 0.11;

/// Minimum judge score for an article to join an existing cluster
pub const DEFAULT_LLM_THRESHOLD: f64 = 0.86;

/// Judge score at or above which no further candidates are considered
pub const DEFAULT_EARLY_EXIT: f64 = 0.91;

/// Articles whose judge text is shorter than this are treated as headings
pub const DEFAULT_MIN_ARTICLE_CHARS: usize = 100;

/// Tunable parameters of a clustering run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusteringConfig {
    pub tfidf_threshold: f64,
    pub llm_threshold: f64,
    pub early_exit: f64,
    pub min_article_chars: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            tfidf_threshold: DEFAULT_TFIDF_THRESHOLD,
            llm_threshold: DEFAULT_LLM_THRESHOLD,
            early_exit: DEFAULT_EARLY_EXIT,
            min_article_chars: DEFAULT_MIN_ARTICLE_CHARS,
        }
    }
}

/// Values given on the command line. `None` leaves the setting alone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfigOverrides {
    pub tfidf_threshold: Option<f64>,
    pub llm_threshold: Option<f64>,
    pub early_exit: Option<f64>,
    pub min_article_chars: Option<usize>,
}

impl ClusteringConfig {
    /// Reads overrides from `TFIDF_THRESHOLD`, `LLM_THRESHOLD`, `EARLY_EXIT`
    /// and `MIN_ARTICLE_CHARS`, falling back to the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_env_prefixed("")
    }

    /// Same as `from_env`, with every variable name prefixed by `prefix`.
    pub fn from_env_prefixed(prefix: &str) -> Result<Self> {
        let defaults = Self::default();
        let var = |name: &str| format!("{}{}", prefix, name);
        Ok(Self {
            tfidf_threshold: get_env_var_parsed(&var("TFIDF_THRESHOLD"), defaults.tfidf_threshold)?,
            llm_threshold: get_env_var_parsed(&var("LLM_THRESHOLD"), defaults.llm_threshold)?,
            early_exit: get_env_var_parsed(&var("EARLY_EXIT"), defaults.early_exit)?,
            min_article_chars: get_env_var_parsed(
                &var("MIN_ARTICLE_CHARS"),
                defaults.min_article_chars,
            )?,
        })
    }

    /// Applies command line values on top of this configuration.
    pub fn with_overrides(self, overrides: ConfigOverrides) -> Self {
        Self {
            tfidf_threshold: overrides.tfidf_threshold.unwrap_or(self.tfidf_threshold),
            llm_threshold: overrides.llm_threshold.unwrap_or(self.llm_threshold),
            early_exit: overrides.early_exit.unwrap_or(self.early_exit),
            min_article_chars: overrides.min_article_chars.unwrap_or(self.min_article_chars),
        }
    }

    /// Rejects thresholds outside of [0, 1].
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("tfidf_threshold", self.tfidf_threshold),
            ("llm_threshold", self.llm_threshold),
            ("early_exit", self.early_exit),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                bail!("{} must be within [0, 1], got {}", name, value);
            }
        }
        Ok(())
    }
}
