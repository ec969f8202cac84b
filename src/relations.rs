//! Pairwise relation analysis inside clusters.
//!
//! Every pair of distinct articles that share a cluster is labelled as a
//! contradiction, an overlap, or bloat (only generic similarity). Overlaps and
//! contradictions are the substantive findings; bloat is reported separately.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::article::{deserialize_records, Article};
use crate::llm::generate_llm_response;
use crate::prompt::relation_prompt;
use crate::{LLMParams, WorkerDetail, TARGET_RELATIONS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Contradiction,
    Overlap,
    Bloat,
}

impl Relation {
    /// Normalizes a free-form model answer to a label.
    ///
    /// Full label words win in decision order; a bare leading letter is
    /// accepted as a fallback.
    pub fn from_response(response: &str) -> Option<Relation> {
        let raw = response.trim().to_lowercase();

        if raw.contains("contradiction") {
            return Some(Relation::Contradiction);
        }
        if raw.contains("overlap") {
            return Some(Relation::Overlap);
        }
        if raw.contains("bloat") {
            return Some(Relation::Bloat);
        }

        match raw.chars().next() {
            Some('c') => Some(Relation::Contradiction),
            Some('o') => Some(Relation::Overlap),
            Some('b') => Some(Relation::Bloat),
            _ => None,
        }
    }
}

/// One cluster as read back from clustering output.
#[derive(Debug, Clone)]
pub struct ClusterRecord {
    pub reference_label: String,
    pub articles: Vec<MemberRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberRecord {
    pub article: Article,
    #[serde(default)]
    pub reference_article: bool,
}

/// Cluster as found on disk; members are converted one by one.
#[derive(Deserialize)]
struct RawCluster {
    #[serde(default)]
    reference_label: Option<String>,
    #[serde(default)]
    articles: Option<Vec<Value>>,
}

/// Relation found between two articles of the same cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub subcategory: String,
    pub section_a_id: String,
    pub section_b_id: String,
    /// Always `null`: relations are found between whole articles.
    pub paragraph_a_index: Option<usize>,
    /// Always `null`: relations are found between whole articles.
    pub paragraph_b_index: Option<usize>,
    pub paragraph_a_text: String,
    pub paragraph_b_text: String,
    pub relation: Relation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelationSummary {
    pub overlap: usize,
    pub contradiction: usize,
    pub bloat: usize,
    /// Substantive findings: overlap + contradiction.
    pub total_metric: usize,
    /// All classified pairs.
    pub total_all: usize,
}

/// Labels the relation between two full article texts.
#[allow(async_fn_in_trait)]
pub trait RelationClassifier {
    async fn classify(&self, text_a: &str, text_b: &str) -> Result<Relation>;
}

pub struct LlmRelationClassifier {
    params: LLMParams,
    worker_detail: WorkerDetail,
}

impl LlmRelationClassifier {
    pub fn new(params: LLMParams, connection_info: String) -> Self {
        let worker_detail = WorkerDetail {
            name: "relation classifier".to_string(),
            model: params.model.clone(),
            connection_info,
        };
        Self {
            params,
            worker_detail,
        }
    }
}

impl RelationClassifier for LlmRelationClassifier {
    async fn classify(&self, text_a: &str, text_b: &str) -> Result<Relation> {
        let prompt = relation_prompt(text_a, text_b);
        let response = generate_llm_response(&prompt, &self.params, &self.worker_detail)
            .await
            .ok_or_else(|| anyhow!("No response from model {}", self.params.model))?;
        Relation::from_response(&response)
            .ok_or_else(|| anyhow!("Model did not answer with a valid label: {:?}", response))
    }
}

/// Loads clustering output written by the `cluster` command.
///
/// Clusters and members that do not deserialize are skipped with a warning;
/// only a file that is not a JSON array is an error.
pub fn load_clusters(path: &Path) -> Result<Vec<ClusterRecord>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read cluster file {}", path.display()))?;
    let records: Vec<Value> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse cluster file {}", path.display()))?;

    let source = path.display().to_string();
    let (raw_clusters, rejected) = deserialize_records::<RawCluster>(records, &source);
    let mut rejected_members = 0;

    let clusters = raw_clusters
        .into_iter()
        .map(|raw| {
            let reference_label = raw.reference_label.unwrap_or_default();
            let (articles, skipped) = deserialize_records::<MemberRecord>(
                raw.articles.unwrap_or_default(),
                &format!("cluster {} in {}", reference_label, source),
            );
            rejected_members += skipped;
            ClusterRecord {
                reference_label,
                articles,
            }
        })
        .collect::<Vec<_>>();

    if rejected + rejected_members > 0 {
        warn!(
            target: TARGET_RELATIONS,
            "Skipped {} clusters and {} members from {}", rejected, rejected_members, source
        );
    }
    Ok(clusters)
}

/// Classifies every unordered pair of distinct articles within each cluster.
///
/// Pairs where either article has no paragraphs are skipped, as are pairs the
/// classifier fails on; both are logged and never abort the analysis.
pub async fn analyse_clusters<C: RelationClassifier>(
    clusters: &[ClusterRecord],
    classifier: &C,
) -> Vec<RelationRecord> {
    let mut results = Vec::new();

    for (cluster_idx, cluster) in clusters.iter().enumerate() {
        info!(
            target: TARGET_RELATIONS,
            "[{}/{}] Analysing cluster {} ({} articles)",
            cluster_idx + 1,
            clusters.len(),
            cluster.reference_label,
            cluster.articles.len()
        );

        let articles = &cluster.articles;
        for i in 0..articles.len() {
            for j in (i + 1)..articles.len() {
                let article_a = &articles[i].article;
                let article_b = &articles[j].article;

                if article_a.paragraphs.is_empty() || article_b.paragraphs.is_empty() {
                    debug!(
                        target: TARGET_RELATIONS,
                        "Skipping {} / {}: empty article", article_a.label(), article_b.label()
                    );
                    continue;
                }

                let text_a = article_a.paragraphs.join("\n\n");
                let text_b = article_b.paragraphs.join("\n\n");

                match classifier.classify(&text_a, &text_b).await {
                    Ok(relation) => {
                        debug!(
                            target: TARGET_RELATIONS,
                            "{} / {}: {:?}", article_a.label(), article_b.label(), relation
                        );
                        results.push(RelationRecord {
                            subcategory: cluster.reference_label.clone(),
                            section_a_id: article_a.article_id.clone(),
                            section_b_id: article_b.article_id.clone(),
                            paragraph_a_index: None,
                            paragraph_b_index: None,
                            paragraph_a_text: text_a,
                            paragraph_b_text: text_b,
                            relation,
                        });
                    }
                    Err(e) => {
                        warn!(
                            target: TARGET_RELATIONS,
                            "Could not classify {} / {}: {:#}", article_a.label(), article_b.label(), e
                        );
                    }
                }
            }
        }
    }

    results
}

/// Counts relation labels.
pub fn summarize_relations(results: &[RelationRecord]) -> RelationSummary {
    let mut summary = RelationSummary::default();
    for record in results {
        match record.relation {
            Relation::Overlap => summary.overlap += 1,
            Relation::Contradiction => summary.contradiction += 1,
            Relation::Bloat => summary.bloat += 1,
        }
    }
    summary.total_metric = summary.overlap + summary.contradiction;
    summary.total_all = summary.total_metric + summary.bloat;
    summary
}
