use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use prettytable::{Cell, Row, Table};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use concord::article::load_article_files;
use concord::clustering::{
    ClusteringConfig, ClusteringEngine, ClusteringOutcome, ConfigOverrides,
};
use concord::environment::llm_params_from_env;
use concord::judge::LlmJudge;
use concord::logging::configure_logging;
use concord::relations::{
    analyse_clusters, load_clusters, summarize_relations, LlmRelationClassifier, RelationSummary,
};

#[derive(Parser)]
#[clap(name = "concord", about = "Cluster regulatory articles by semantic similarity")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Group articles from one or more JSON files into clusters
    Cluster {
        /// Article JSON files, processed in the order given
        #[clap(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Where to write the clusters
        #[clap(short, long, default_value = "clustered_articles.json")]
        output: PathBuf,

        /// Minimum TF-IDF cosine similarity for a judge comparison (0.0-1.0)
        #[clap(long)]
        tfidf_threshold: Option<f64>,

        /// Minimum judge score to join a cluster (0.0-1.0)
        #[clap(long)]
        llm_threshold: Option<f64>,

        /// Judge score that stops the search immediately (0.0-1.0)
        #[clap(long)]
        early_exit: Option<f64>,

        /// Articles with less text than this are skipped
        #[clap(long)]
        min_article_chars: Option<usize>,
    },

    /// Classify article pairs inside each cluster as overlap, contradiction or bloat
    Relations {
        /// Cluster JSON file written by `cluster`
        #[clap(short, long, default_value = "clustered_articles.json")]
        input: PathBuf,

        /// Where to write the relation records
        #[clap(short, long, default_value = "relations_output.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();

    let args = Cli::parse();

    match args.command {
        Commands::Cluster {
            input,
            output,
            tfidf_threshold,
            llm_threshold,
            early_exit,
            min_article_chars,
        } => {
            let config = ClusteringConfig::from_env()?.with_overrides(ConfigOverrides {
                tfidf_threshold,
                llm_threshold,
                early_exit,
                min_article_chars,
            });
            config.validate()?;

            cluster(&input, &output, config).await?;
        }
        Commands::Relations { input, output } => {
            relations(&input, &output).await?;
        }
    }

    Ok(())
}

async fn cluster(input: &[PathBuf], output: &Path, config: ClusteringConfig) -> Result<()> {
    let loaded = load_article_files(input)?;
    info!(
        "Loaded {} articles from {} files ({} records rejected)",
        loaded.articles.len(),
        input.len(),
        loaded.rejected
    );

    let (params, connection_info) = llm_params_from_env()?;
    let judge = LlmJudge::new(params, connection_info);
    let engine = ClusteringEngine::new(config, judge);

    let mut outcome = engine.run(&loaded.articles).await;
    // Records rejected while loading count as skipped articles
    outcome.stats.skipped += loaded.rejected;

    write_json(output, &outcome.clusters)?;
    print_clusters(&outcome);
    println!(
        "{} {} clusters written to {}",
        "✓".green(),
        outcome.clusters.len(),
        output.display()
    );

    Ok(())
}

async fn relations(input: &Path, output: &Path) -> Result<()> {
    let clusters = load_clusters(input)?;
    info!("Loaded {} clusters from {}", clusters.len(), input.display());

    let (params, connection_info) = llm_params_from_env()?;
    let classifier = LlmRelationClassifier::new(params, connection_info);

    let results = analyse_clusters(&clusters, &classifier).await;
    write_json(output, &results)?;

    print_summary(&summarize_relations(&results));
    println!(
        "{} {} relations written to {}",
        "✓".green(),
        results.len(),
        output.display()
    );

    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Prints clusters in a formatted table, followed by run statistics
fn print_clusters(outcome: &ClusteringOutcome<'_>) {
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("#"),
        Cell::new("Reference"),
        Cell::new("Articles"),
        Cell::new("Members"),
    ]));

    for cluster in outcome.clusters.clusters() {
        let members = cluster
            .members()
            .iter()
            .skip(1)
            .map(|member| member.article.label())
            .collect::<Vec<_>>()
            .join(", ");

        table.add_row(Row::new(vec![
            Cell::new(&(cluster.id().index() + 1).to_string()),
            Cell::new(&cluster.reference_label()),
            Cell::new(&cluster.len().to_string()),
            Cell::new(if members.is_empty() { "-" } else { members.as_str() }),
        ]));
    }

    table.printstd();

    let stats = &outcome.stats;
    println!("\n{}", "Run statistics".bold());
    println!("  {}: {}", "Processed".bright_blue(), stats.processed);
    println!("  {}: {}", "Skipped".bright_blue(), stats.skipped);
    println!("  {}: {}", "Clusters".bright_blue(), stats.clusters_founded);
    println!("  {}: {}", "Attached".bright_blue(), stats.articles_attached);
    println!("  {}: {}", "Early exits".bright_blue(), stats.early_exits);
    println!("  {}: {}", "Judge calls".bright_blue(), stats.judge_calls);
    if stats.judge_failures > 0 {
        println!(
            "  {}: {}",
            "Judge failures".bright_blue(),
            stats.judge_failures.to_string().red()
        );
    } else {
        println!("  {}: 0", "Judge failures".bright_blue());
    }
}

fn print_summary(summary: &RelationSummary) {
    let mut table = Table::new();
    table.add_row(Row::new(vec![Cell::new("Relation"), Cell::new("Count")]));
    for (label, count) in [
        ("Overlap", summary.overlap),
        ("Contradiction", summary.contradiction),
        ("Overlap + contradiction", summary.total_metric),
        ("Bloat", summary.bloat),
        ("Total", summary.total_all),
    ] {
        table.add_row(Row::new(vec![
            Cell::new(label),
            Cell::new(&count.to_string()),
        ]));
    }
    table.printstd();
}
