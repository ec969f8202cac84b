use tracing::{debug, info, warn};

use crate::article::{Article, SkipReason};
use crate::judge::Judge;
use crate::TARGET_ENGINE;

use super::prefilter::LexicalPrefilter;
use super::types::{ArticleKey, ClusterId, ClusterSet};
use super::ClusteringConfig;

/// Counters collected over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub processed: usize,
    pub skipped: usize,
    pub clusters_founded: usize,
    pub articles_attached: usize,
    pub early_exits: usize,
    pub judge_calls: usize,
    pub judge_failures: usize,
}

/// What happened to a single incoming article.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// The article became the reference of a new cluster.
    Founded(ClusterId),
    /// The article joined an existing cluster as a non-reference member.
    Attached {
        cluster: ClusterId,
        score: f64,
        early_exit: bool,
    },
    /// The article failed validation and was left out.
    Skipped(SkipReason),
}

/// Final partition and statistics of a run.
#[derive(Debug)]
pub struct ClusteringOutcome<'a> {
    pub clusters: ClusterSet<'a>,
    pub assignments: Vec<Assignment>,
    pub stats: RunStats,
}

/// Incrementally partitions articles into clusters using a lexical
/// pre-filter followed by a semantic judge.
pub struct ClusteringEngine<J> {
    config: ClusteringConfig,
    prefilter: LexicalPrefilter,
    judge: J,
}

impl<J: Judge> ClusteringEngine<J> {
    pub fn new(config: ClusteringConfig, judge: J) -> Self {
        Self {
            prefilter: LexicalPrefilter::new(config.tfidf_threshold),
            config,
            judge,
        }
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    pub fn judge(&self) -> &J {
        &self.judge
    }

    /// Clusters `articles` in input order, starting from an empty cluster set.
    ///
    /// Never fails: judge and pre-filter problems degrade to "no match", so
    /// every valid article ends up in exactly one cluster.
    pub async fn run<'a>(&self, articles: &'a [Article]) -> ClusteringOutcome<'a> {
        let total = articles.len();
        let mut clusters = ClusterSet::new();
        let mut assignments = Vec::with_capacity(total);
        let mut stats = RunStats::default();

        info!(
            target: TARGET_ENGINE,
            "Clustering {} articles (tfidf_threshold={:.2}, llm_threshold={:.2}, early_exit={:.2})",
            total, self.config.tfidf_threshold, self.config.llm_threshold, self.config.early_exit
        );

        for (idx, article) in articles.iter().enumerate() {
            if let Err(reason) = article.validate(self.config.min_article_chars) {
                warn!(
                    target: TARGET_ENGINE,
                    "[{}/{}] Skipping article {}: {}",
                    idx + 1,
                    total,
                    article.label(),
                    reason
                );
                stats.skipped += 1;
                assignments.push(Assignment::Skipped(reason));
                continue;
            }
            stats.processed += 1;

            info!(
                target: TARGET_ENGINE,
                "[{}/{}] Processing article {} ({:.1}%)",
                idx + 1,
                total,
                article.label(),
                (idx + 1) as f64 / total as f64 * 100.0
            );

            let assignment = self
                .assign(&mut clusters, ArticleKey(idx), article, &mut stats)
                .await;
            assignments.push(assignment);
        }

        info!(
            target: TARGET_ENGINE,
            "Clustering finished: {} clusters from {} articles ({} skipped, {} attached, {} judge calls, {} judge failures)",
            clusters.len(), stats.processed, stats.skipped, stats.articles_attached, stats.judge_calls, stats.judge_failures
        );

        ClusteringOutcome {
            clusters,
            assignments,
            stats,
        }
    }

    async fn assign<'a>(
        &self,
        clusters: &mut ClusterSet<'a>,
        key: ArticleKey,
        article: &'a Article,
        stats: &mut RunStats,
    ) -> Assignment {
        let label = article.label();

        let references = clusters.references();
        let candidates = self.prefilter.candidates(article, &references);

        if !candidates.is_empty() {
            let article_text = article.judge_text();

            for candidate in candidates {
                let Some(cluster_id) = clusters.cluster_for_reference(candidate.reference) else {
                    continue;
                };
                let Some(reference) = clusters.get(cluster_id).map(|c| c.reference()) else {
                    continue;
                };
                let score = self
                    .judge_score(&article_text, &reference.judge_text(), stats)
                    .await;

                debug!(
                    target: TARGET_ENGINE,
                    "Compared {} -> {}: lexical {:.3}, judge {:.2}",
                    label, reference.label(), candidate.similarity, score
                );

                let early_exit = score >= self.config.early_exit;
                if early_exit || score >= self.config.llm_threshold {
                    if let Err(e) = clusters.attach(cluster_id, key, article) {
                        warn!(target: TARGET_ENGINE, "Could not attach {}: {:#}", label, e);
                        continue;
                    }
                    stats.articles_attached += 1;
                    if early_exit {
                        stats.early_exits += 1;
                        info!(
                            target: TARGET_ENGINE,
                            "-> {} matched {} with {:.2}, skipping further comparisons",
                            label, reference.label(), score
                        );
                    } else {
                        info!(
                            target: TARGET_ENGINE,
                            "-> {} matched {} with {:.2}",
                            label, reference.label(), score
                        );
                    }
                    return Assignment::Attached {
                        cluster: cluster_id,
                        score,
                        early_exit,
                    };
                }
            }
        }

        let cluster_id = clusters.found(key, article);
        stats.clusters_founded += 1;
        info!(
            target: TARGET_ENGINE,
            "-> {} did not match any reference, added as new reference", label
        );
        Assignment::Founded(cluster_id)
    }

    /// Calls the judge and maps failures and out-of-range values into [0, 1].
    async fn judge_score(&self, article_text: &str, reference_text: &str, stats: &mut RunStats) -> f64 {
        stats.judge_calls += 1;
        match self.judge.score(article_text, reference_text).await {
            Ok(score) if score.is_finite() => score.clamp(0.0, 1.0),
            Ok(score) => {
                warn!(target: TARGET_ENGINE, "Judge returned non-finite score {}, treating as 0", score);
                stats.judge_failures += 1;
                0.0
            }
            Err(e) => {
                warn!(target: TARGET_ENGINE, "Judge call failed, treating as 0: {:#}", e);
                stats.judge_failures += 1;
                0.0
            }
        }
    }
}
