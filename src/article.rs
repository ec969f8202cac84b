use anyhow::{Context, Result};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// A single regulatory article as produced by the upstream parsing and
/// categorization stages.
///
/// Field names match the upstream JSON records exactly so that articles can be
/// written back out unchanged inside cluster output. Missing or `null` fields
/// read as empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(
        rename = "document title",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub document_title: Option<String>,
    #[serde(rename = "document name", default, deserialize_with = "lenient_string")]
    pub document_name: String,
    #[serde(rename = "article id", default, deserialize_with = "lenient_string")]
    pub article_id: String,
    #[serde(rename = "article name", default, deserialize_with = "lenient_string")]
    pub article_name: String,
    #[serde(
        rename = "article paragraphs",
        default,
        deserialize_with = "lenient_paragraphs"
    )]
    pub paragraphs: Vec<String>,
}

/// Accepts a string, a number (article ids such as `4`), or `null`.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a string, found {}",
            other
        ))),
    }
}

/// Accepts a list of strings or `null`; `null` entries are dropped.
fn lenient_paragraphs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let paragraphs: Option<Vec<Option<String>>> = Option::deserialize(deserializer)?;
    Ok(paragraphs.unwrap_or_default().into_iter().flatten().collect())
}

/// Reason an article was left out of clustering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No paragraph contains any non-whitespace text.
    NoText,
    /// Too short to be a real article, usually a section heading.
    TooShort { chars: usize, min: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoText => write!(f, "article has no paragraph text"),
            SkipReason::TooShort { chars, min } => {
                write!(f, "article text is {} chars, minimum is {}", chars, min)
            }
        }
    }
}

impl Article {
    /// Label used for log lines and for the cluster's reference label.
    pub fn label(&self) -> String {
        format!("{} {}", self.document_name, self.article_id)
    }

    /// Text used by the lexical pre-filter.
    pub fn comparable_text(&self) -> String {
        self.paragraphs.join("\n")
    }

    /// Text handed to the semantic judge, including the identifying header.
    pub fn judge_text(&self) -> String {
        let mut text = format!("Document Name: {}\n", self.document_name);
        text.push_str(&format!("Article ID: {}\n", self.article_id));
        text.push_str(&format!("Article Title: {}\n", self.article_name));
        text.push_str("Paragraphs:\n");
        for paragraph in &self.paragraphs {
            text.push_str(&format!("- {}\n", paragraph));
        }
        text
    }

    /// Checks that the article carries enough text to be compared.
    pub fn validate(&self, min_chars: usize) -> Result<(), SkipReason> {
        if self.paragraphs.iter().all(|p| p.trim().is_empty()) {
            return Err(SkipReason::NoText);
        }

        let chars = self.judge_text().chars().count();
        if chars < min_chars {
            return Err(SkipReason::TooShort {
                chars,
                min: min_chars,
            });
        }

        Ok(())
    }
}

/// Articles read from one or more files.
#[derive(Debug, Default)]
pub struct LoadedArticles {
    pub articles: Vec<Article>,
    /// Records that were not article objects and were left out.
    pub rejected: usize,
}

/// Converts each element of a JSON array on its own, skipping the ones that
/// do not deserialize. Returns the parsed values and the number skipped.
pub(crate) fn deserialize_records<T: DeserializeOwned>(
    records: Vec<Value>,
    source: &str,
) -> (Vec<T>, usize) {
    let mut parsed = Vec::with_capacity(records.len());
    let mut rejected = 0;
    for (idx, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<T>(record) {
            Ok(value) => parsed.push(value),
            Err(e) => {
                warn!("Skipping record {} of {}: {}", idx, source, e);
                rejected += 1;
            }
        }
    }
    (parsed, rejected)
}

/// Loads a JSON array of article records from a file.
///
/// A file that is not a JSON array is an error; individual malformed records
/// are skipped with a warning.
pub fn load_articles(path: &Path) -> Result<LoadedArticles> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read article file {}", path.display()))?;
    let records: Vec<Value> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse article file {}", path.display()))?;

    let (articles, rejected) = deserialize_records(records, &path.display().to_string());

    info!(
        "Loaded {} articles from {} ({} records rejected)",
        articles.len(),
        path.display(),
        rejected
    );
    Ok(LoadedArticles { articles, rejected })
}

/// Loads and concatenates several article files, preserving file order.
pub fn load_article_files<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedArticles> {
    let mut loaded = LoadedArticles::default();
    for path in paths {
        let file = load_articles(path.as_ref())?;
        loaded.articles.extend(file.articles);
        loaded.rejected += file.rejected;
    }
    Ok(loaded)
}

#[cfg(test)]
pub(crate) fn test_article(document: &str, id: &str, paragraphs: &[&str]) -> Article {
    Article {
        document_title: None,
        document_name: document.to_string(),
        article_id: id.to_string(),
        article_name: format!("Article {}", id),
        paragraphs: paragraphs.iter().map(|p| p.to_string()).collect(),
    }
}
