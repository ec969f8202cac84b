use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::article::{test_article, Article, SkipReason};
use crate::clustering::{
    Assignment, ClusteringConfig, ClusteringEngine, ConfigOverrides, DEFAULT_EARLY_EXIT, DEFAULT_LLM_THRESHOLD,
    DEFAULT_MIN_ARTICLE_CHARS, DEFAULT_TFIDF_THRESHOLD,
};
use crate::judge::Judge;

const MONTHLY_LCR: &str = "Institutions shall report the liquidity coverage ratio to the competent authority every month using the prescribed templates.";
const MONTHLY_LCR_FORMATS: &str = "Institutions shall report the liquidity coverage ratio to the competent authority every month using the prescribed templates and formats.";
const QUARTERLY_LCR: &str = "Institutions shall report the liquidity coverage ratio to the competent authority on a quarterly basis.";
const FREQUENT_LCR: &str = "The competent authority may require institutions to report the liquidity coverage ratio more frequently.";
const REMUNERATION: &str = "Remuneration policies must reward sustainable performance of identified staff over multiple years.";
const OUTSOURCING: &str = "Outsourcing arrangements covering critical functions require a documented register kept current by each firm.";

/// Judge answering from a table keyed by (incoming label, reference label).
///
/// Labels are read back from the judge text header. Unscripted pairs score 0.
struct ScriptedJudge {
    scores: HashMap<(String, String), Result<f64, String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedJudge {
    fn new(scores: &[(&str, &str, f64)]) -> Self {
        Self {
            scores: scores
                .iter()
                .map(|(a, b, s)| ((a.to_string(), b.to_string()), Ok(*s)))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self, article: &str, reference: &str) -> Self {
        self.scores.insert(
            (article.to_string(), reference.to_string()),
            Err("connection refused".to_string()),
        );
        self
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, article: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(a, _)| a == article)
            .map(|(_, reference)| reference)
            .collect()
    }
}

fn label_from_judge_text(text: &str) -> String {
    let mut lines = text.lines();
    let document = lines
        .next()
        .and_then(|l| l.strip_prefix("Document Name: "))
        .unwrap_or_default();
    let id = lines
        .next()
        .and_then(|l| l.strip_prefix("Article ID: "))
        .unwrap_or_default();
    format!("{} {}", document, id)
}

impl Judge for ScriptedJudge {
    async fn score(&self, text_a: &str, text_b: &str) -> Result<f64> {
        let key = (label_from_judge_text(text_a), label_from_judge_text(text_b));
        self.calls.lock().unwrap().push(key.clone());
        match self.scores.get(&key) {
            Some(Ok(score)) => Ok(*score),
            Some(Err(message)) => Err(anyhow!(message.clone())),
            None => Ok(0.0),
        }
    }
}

fn labels_by_cluster(outcome: &crate::clustering::ClusteringOutcome<'_>) -> Vec<Vec<String>> {
    outcome
        .clusters
        .clusters()
        .iter()
        .map(|cluster| cluster.members().iter().map(|m| m.article.label()).collect())
        .collect()
}

#[test]
fn test_default_config() {
    let config = ClusteringConfig::default();
    assert_eq!(config.tfidf_threshold, DEFAULT_TFIDF_THRESHOLD);
    assert_eq!(config.llm_threshold, DEFAULT_LLM_THRESHOLD);
    assert_eq!(config.early_exit, DEFAULT_EARLY_EXIT);
    assert_eq!(config.min_article_chars, DEFAULT_MIN_ARTICLE_CHARS);
    assert_eq!(
        (config.tfidf_threshold, config.llm_threshold, config.early_exit),
        (0.11, 0.86, 0.91)
    );
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation() {
    let config = ClusteringConfig {
        llm_threshold: 1.2,
        ..ClusteringConfig::default()
    };
    assert!(config.validate().unwrap_err().to_string().contains("llm_threshold"));

    let config = ClusteringConfig {
        tfidf_threshold: f64::NAN,
        ..ClusteringConfig::default()
    };
    assert!(config.validate().is_err());

    let config = ClusteringConfig {
        early_exit: -0.1,
        ..ClusteringConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_config_precedence_cli_over_env_over_default() {
    // Variables carry their own prefix, tests run in parallel.
    let prefix = "CONCORD_TEST_CFG_";
    std::env::set_var("CONCORD_TEST_CFG_TFIDF_THRESHOLD", "0.2");
    std::env::set_var("CONCORD_TEST_CFG_LLM_THRESHOLD", "0.8");
    std::env::remove_var("CONCORD_TEST_CFG_EARLY_EXIT");
    std::env::set_var("CONCORD_TEST_CFG_MIN_ARTICLE_CHARS", "50");

    let from_env = ClusteringConfig::from_env_prefixed(prefix).unwrap();
    assert_eq!(
        from_env,
        ClusteringConfig {
            tfidf_threshold: 0.2,
            llm_threshold: 0.8,
            early_exit: DEFAULT_EARLY_EXIT,
            min_article_chars: 50,
        }
    );

    let config = from_env.with_overrides(ConfigOverrides {
        llm_threshold: Some(0.9),
        min_article_chars: Some(0),
        ..ConfigOverrides::default()
    });
    assert_eq!(config.tfidf_threshold, 0.2);
    assert_eq!(config.llm_threshold, 0.9);
    assert_eq!(config.early_exit, DEFAULT_EARLY_EXIT);
    assert_eq!(config.min_article_chars, 0);

    assert_eq!(config.with_overrides(ConfigOverrides::default()), config);
}

#[test]
fn test_config_from_env_rejects_unparsable_values() {
    std::env::set_var("CONCORD_TEST_BADCFG_EARLY_EXIT", "very high");
    let err = ClusteringConfig::from_env_prefixed("CONCORD_TEST_BADCFG_").unwrap_err();
    assert!(err.to_string().contains("CONCORD_TEST_BADCFG_EARLY_EXIT"));
}

#[tokio::test]
async fn test_end_to_end_three_articles() {
    let articles = vec![
        test_article("doc1", "A", &[MONTHLY_LCR]),
        test_article("doc2", "B", &[QUARTERLY_LCR]),
        test_article("doc1", "C", &[FREQUENT_LCR]),
    ];
    let judge = ScriptedJudge::new(&[("doc2 B", "doc1 A", 0.9)]);
    let engine = ClusteringEngine::new(ClusteringConfig::default(), judge);

    let outcome = engine.run(&articles).await;

    assert_eq!(
        labels_by_cluster(&outcome),
        vec![
            vec!["doc1 A".to_string(), "doc2 B".to_string()],
            vec!["doc1 C".to_string()],
        ]
    );

    let clusters = outcome.clusters.clusters();
    assert_eq!(clusters[0].reference_label(), "doc1 A");
    assert!(clusters[0].members()[0].is_reference);
    assert!(!clusters[0].members()[1].is_reference);
    assert_eq!(clusters[1].reference_label(), "doc1 C");

    // C is never compared against A, they share a document
    assert_eq!(
        engine.judge().calls(),
        vec![("doc2 B".to_string(), "doc1 A".to_string())]
    );
    assert!(matches!(
        outcome.assignments[1],
        Assignment::Attached {
            early_exit: false,
            ..
        }
    ));
    assert_eq!(outcome.stats.clusters_founded, 2);
    assert_eq!(outcome.stats.articles_attached, 1);
    assert_eq!(outcome.stats.judge_calls, 1);
}

#[tokio::test]
async fn test_early_exit_stops_after_first_candidate() {
    let articles = vec![
        test_article("doc1", "R1", &[MONTHLY_LCR]),
        test_article("doc2", "R2", &[QUARTERLY_LCR]),
        test_article("doc3", "X", &[MONTHLY_LCR_FORMATS]),
    ];
    let judge = ScriptedJudge::new(&[
        ("doc2 R2", "doc1 R1", 0.1),
        ("doc3 X", "doc1 R1", 0.95),
        ("doc3 X", "doc2 R2", 0.99),
    ]);
    let engine = ClusteringEngine::new(ClusteringConfig::default(), judge);

    let outcome = engine.run(&articles).await;

    assert_eq!(engine.judge().calls_for("doc3 X"), vec!["doc1 R1"]);
    assert_eq!(
        outcome.assignments[2],
        Assignment::Attached {
            cluster: outcome.clusters.clusters()[0].id(),
            score: 0.95,
            early_exit: true,
        }
    );
    assert_eq!(outcome.stats.early_exits, 1);
}

#[tokio::test]
async fn test_low_score_moves_on_to_next_candidate() {
    let articles = vec![
        test_article("doc1", "R1", &[MONTHLY_LCR]),
        test_article("doc2", "R2", &[QUARTERLY_LCR]),
        test_article("doc3", "X", &[MONTHLY_LCR_FORMATS]),
    ];
    let judge = ScriptedJudge::new(&[
        ("doc2 R2", "doc1 R1", 0.1),
        ("doc3 X", "doc1 R1", 0.5),
        ("doc3 X", "doc2 R2", 0.87),
    ]);
    let engine = ClusteringEngine::new(ClusteringConfig::default(), judge);

    let outcome = engine.run(&articles).await;

    assert_eq!(engine.judge().calls_for("doc3 X"), vec!["doc1 R1", "doc2 R2"]);
    assert_eq!(
        labels_by_cluster(&outcome),
        vec![
            vec!["doc1 R1".to_string()],
            vec!["doc2 R2".to_string(), "doc3 X".to_string()],
        ]
    );
}

#[tokio::test]
async fn test_first_match_wins_over_better_later_match() {
    let articles = vec![
        test_article("doc1", "R1", &[MONTHLY_LCR]),
        test_article("doc2", "R2", &[QUARTERLY_LCR]),
        test_article("doc3", "X", &[MONTHLY_LCR_FORMATS]),
    ];
    // R1 ranks higher lexically; R2 would score better with the judge
    let judge = ScriptedJudge::new(&[
        ("doc2 R2", "doc1 R1", 0.1),
        ("doc3 X", "doc1 R1", 0.87),
        ("doc3 X", "doc2 R2", 0.90),
    ]);
    let engine = ClusteringEngine::new(ClusteringConfig::default(), judge);

    let outcome = engine.run(&articles).await;

    assert_eq!(engine.judge().calls_for("doc3 X"), vec!["doc1 R1"]);
    assert_eq!(
        labels_by_cluster(&outcome),
        vec![
            vec!["doc1 R1".to_string(), "doc3 X".to_string()],
            vec!["doc2 R2".to_string()],
        ]
    );
}

#[tokio::test]
async fn test_judge_failure_counts_as_no_match() {
    let articles = vec![
        test_article("doc1", "R1", &[MONTHLY_LCR]),
        test_article("doc2", "R2", &[QUARTERLY_LCR]),
        test_article("doc3", "X", &[MONTHLY_LCR_FORMATS]),
        test_article("doc4", "Y", &[MONTHLY_LCR]),
    ];
    let judge = ScriptedJudge::new(&[
        ("doc2 R2", "doc1 R1", 0.1),
        ("doc3 X", "doc2 R2", 0.9),
        ("doc4 Y", "doc1 R1", f64::NAN),
    ])
    .failing("doc3 X", "doc1 R1");
    let engine = ClusteringEngine::new(ClusteringConfig::default(), judge);

    let outcome = engine.run(&articles).await;

    assert_eq!(engine.judge().calls_for("doc3 X"), vec!["doc1 R1", "doc2 R2"]);
    assert_eq!(
        labels_by_cluster(&outcome)[1],
        vec!["doc2 R2".to_string(), "doc3 X".to_string()]
    );
    // NaN from the judge is a failure, so Y founds its own cluster
    assert!(matches!(outcome.assignments[3], Assignment::Founded(_)));
    assert_eq!(outcome.stats.judge_failures, 2);
    assert_eq!(outcome.clusters.article_count(), 4);
}

#[tokio::test]
async fn test_lexically_unrelated_articles_skip_the_judge() {
    let articles = vec![
        test_article("doc1", "1", &[MONTHLY_LCR]),
        test_article("doc2", "2", &[REMUNERATION]),
        test_article("doc3", "3", &[OUTSOURCING]),
    ];
    let judge = ScriptedJudge::new(&[]);
    let engine = ClusteringEngine::new(ClusteringConfig::default(), judge);

    let outcome = engine.run(&articles).await;

    assert!(engine.judge().calls().is_empty());
    assert_eq!(outcome.clusters.len(), 3);
}

#[tokio::test]
async fn test_short_and_empty_articles_are_skipped() {
    let articles = vec![
        test_article("doc1", "1", &[MONTHLY_LCR]),
        test_article("doc1", "2", &["Scope"]),
        test_article("doc2", "3", &[]),
    ];
    let engine = ClusteringEngine::new(ClusteringConfig::default(), ScriptedJudge::new(&[]));

    let outcome = engine.run(&articles).await;

    assert_eq!(outcome.clusters.len(), 1);
    assert!(matches!(
        outcome.assignments[1],
        Assignment::Skipped(SkipReason::TooShort { .. })
    ));
    assert_eq!(outcome.assignments[2], Assignment::Skipped(SkipReason::NoText));
    assert_eq!(outcome.stats.skipped, 2);
    assert_eq!(outcome.stats.processed, 1);
}

fn mixed_corpus() -> Vec<Article> {
    let texts = [
        MONTHLY_LCR,
        QUARTERLY_LCR,
        FREQUENT_LCR,
        REMUNERATION,
        OUTSOURCING,
        MONTHLY_LCR_FORMATS,
    ];
    let mut articles = Vec::new();
    for doc in 1..=3 {
        for (i, text) in texts.iter().enumerate() {
            articles.push(test_article(&format!("doc{}", doc), &i.to_string(), &[text]));
        }
    }
    articles
}

/// Scores every cross-document pair with the same article id highly, and
/// everything else from the lexical closeness of the id.
struct FormulaJudge {
    calls: Mutex<Vec<(String, String)>>,
}

impl Judge for FormulaJudge {
    async fn score(&self, text_a: &str, text_b: &str) -> Result<f64> {
        let a = label_from_judge_text(text_a);
        let b = label_from_judge_text(text_b);
        self.calls.lock().unwrap().push((a.clone(), b.clone()));
        let id_a = a.rsplit(' ').next().unwrap_or_default();
        let id_b = b.rsplit(' ').next().unwrap_or_default();
        Ok(if id_a == id_b { 0.93 } else { 0.87 })
    }
}

#[tokio::test]
async fn test_partition_and_reference_invariants() {
    let articles = mixed_corpus();
    let engine = ClusteringEngine::new(
        ClusteringConfig::default(),
        FormulaJudge {
            calls: Mutex::new(Vec::new()),
        },
    );

    let outcome = engine.run(&articles).await;

    // Every article lands in exactly one cluster, once
    let mut seen = HashSet::new();
    for cluster in outcome.clusters.clusters() {
        for member in cluster.members() {
            assert!(seen.insert(member.key), "article placed twice");
        }
    }
    assert_eq!(seen.len(), articles.len());
    assert_eq!(outcome.clusters.article_count(), articles.len());

    // Exactly one reference per cluster, and it is the founding member
    for cluster in outcome.clusters.clusters() {
        let references: Vec<_> = cluster.members().iter().filter(|m| m.is_reference).collect();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].key, cluster.reference_key());
        assert_eq!(
            outcome.clusters.cluster_for_reference(cluster.reference_key()),
            Some(cluster.id())
        );
    }

    // No judge comparison ever crosses two articles of the same document
    for (article, reference) in engine.judge().calls.lock().unwrap().iter() {
        let doc_a = article.split(' ').next().unwrap();
        let doc_b = reference.split(' ').next().unwrap();
        assert_ne!(doc_a, doc_b);
    }
}

#[tokio::test]
async fn test_raising_llm_threshold_never_adds_matches() {
    let articles = vec![
        test_article("doc1", "R1", &[MONTHLY_LCR]),
        test_article("doc2", "X", &[QUARTERLY_LCR]),
        test_article("doc3", "Y", &[FREQUENT_LCR]),
    ];
    let scores = [
        ("doc2 X", "doc1 R1", 0.88),
        ("doc3 Y", "doc1 R1", 0.89),
        ("doc3 Y", "doc2 X", 0.5),
    ];

    let mut previous: Option<(usize, usize)> = None;
    for llm_threshold in [0.5, 0.86, 0.885, 0.89, 0.9, 0.95] {
        let config = ClusteringConfig {
            llm_threshold,
            early_exit: 0.99,
            ..ClusteringConfig::default()
        };
        let engine = ClusteringEngine::new(config, ScriptedJudge::new(&scores));
        let outcome = engine.run(&articles).await;

        let matches = outcome.stats.articles_attached;
        let clusters = outcome.clusters.len();
        assert_eq!(clusters + matches, articles.len());

        if let Some((previous_matches, previous_clusters)) = previous {
            assert!(matches <= previous_matches, "threshold {}", llm_threshold);
            assert!(clusters >= previous_clusters, "threshold {}", llm_threshold);
        }
        previous = Some((matches, clusters));
    }

    // Lowest and highest thresholds bracket the behavior
    let low = ClusteringEngine::new(
        ClusteringConfig {
            llm_threshold: 0.5,
            early_exit: 0.99,
            ..ClusteringConfig::default()
        },
        ScriptedJudge::new(&scores),
    );
    assert_eq!(low.run(&articles).await.clusters.len(), 1);

    let high = ClusteringEngine::new(
        ClusteringConfig {
            llm_threshold: 0.95,
            early_exit: 0.99,
            ..ClusteringConfig::default()
        },
        ScriptedJudge::new(&scores),
    );
    assert_eq!(high.run(&articles).await.clusters.len(), 3);
}

#[tokio::test]
async fn test_empty_input() {
    let engine = ClusteringEngine::new(ClusteringConfig::default(), ScriptedJudge::new(&[]));
    let outcome = engine.run(&[]).await;

    assert!(outcome.clusters.is_empty());
    assert!(outcome.assignments.is_empty());
    assert_eq!(outcome.stats, Default::default());
}

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
struct LogBuffer(std::sync::Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn test_progress_is_logged_only_for_valid_articles() {
    let articles = vec![
        test_article("doc1", "1", &[MONTHLY_LCR]),
        test_article("doc1", "2", &["Scope"]),
        test_article("doc2", "3", &[REMUNERATION]),
    ];
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let engine = ClusteringEngine::new(ClusteringConfig::default(), ScriptedJudge::new(&[]));
    let outcome = engine.run(&articles).await;
    assert_eq!(outcome.stats.skipped, 1);

    let logs = buffer.contents();
    assert!(logs.contains("[1/3] Processing article doc1 1"));
    assert!(logs.contains("[3/3] Processing article doc2 3"));
    assert!(!logs.contains("Processing article doc1 2"));
    assert!(logs.contains("[2/3] Skipping article doc1 2"));
}
