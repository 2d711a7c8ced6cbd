//! `entitylink` CLI (§6 CLI surface): `setup`, `run`, `clean`, `stats`
//! wrapping the pipeline coordinator over the embedded store.
//!
//! clap derive subcommands, `tracing-subscriber` init in `main`, and typed
//! errors mapped to process exit codes at the boundary.

use clap::{Parser, Subcommand};
use entitylink::blocking::BlockingEngine;
use entitylink::config::{BlockingConfig, Config, StrategyConfig};
use entitylink::edges::EdgeWriter;
use entitylink::index_setup::AnalyzerKind;
use entitylink::pipeline::{CancelToken, Pipeline, RunReport};
use entitylink::record::Record;
use entitylink::store::{ClusterStore, EdgeStore, GoldenRecordStore, RecordStore};
use entitylink::Error;
use entitylink_cluster::WeaklyConnectedComponents;
use entitylink_storage::{EmbeddedStore, ViewSpec};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// §6: "Exit codes: 0 success; 2 configuration error; 3 backend error; 4
/// cancelled."
const EXIT_OK: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_BACKEND_ERROR: u8 = 3;
const EXIT_CANCELLED: u8 = 4;

#[derive(Parser, Debug)]
#[command(name = "entitylink")]
#[command(about = "Entity resolution engine: blocking, Fellegi-Sunter scoring, clustering and golden-record synthesis")]
#[command(version)]
struct Cli {
    /// Directory holding the embedded store's persisted text-index segments.
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the analyzers and text-index views required by blocking (§4A).
    Setup {
        #[arg(long)]
        config: PathBuf,
        /// Restrict setup to these collections (defaults to `config.collections`).
        #[arg(long, value_delimiter = ',')]
        collections: Vec<String>,
        /// Recreate views that already exist instead of leaving them be.
        #[arg(long)]
        force: bool,
    },
    /// Execute the pipeline: blocking -> scoring -> edges -> clustering ->
    /// quality -> golden records (§4H).
    Run {
        #[arg(long)]
        config: PathBuf,
        /// Directory of `<collection>.jsonl` files to ingest before running
        /// (one JSON object per line: an `id`, an optional `source`, and
        /// field values). Omit to run against whatever the store already
        /// holds from a prior `run`/`setup` against the same `--data-dir`.
        #[arg(long)]
        records: Option<PathBuf>,
    },
    /// Drop edges, clusters and golden records produced by the engine (§6).
    Clean {
        #[arg(long)]
        config: PathBuf,
    },
    /// Print blocking-potential and edge-graph statistics for a collection (§6).
    Stats {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        collection: String,
        #[arg(long)]
        records: Option<PathBuf>,
    },
    /// Score one pair and print the per-field similarity/agreement/weight
    /// breakdown without writing an edge (SPEC_FULL.md dry-run/explain
    /// mode, for tuning field weights interactively).
    Explain {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        collection: String,
        #[arg(long = "a")]
        record_a: String,
        #[arg(long = "b")]
        record_b: String,
    },
}

/// Typed CLI-boundary error, collapsing the engine's closed error set (§7)
/// down to the three exit-code buckets §6 defines.
enum CliError {
    Config(String),
    Backend(String),
    Cancelled,
}

impl From<Error> for CliError {
    fn from(e: Error) -> Self {
        match &e {
            Error::Config(_) | Error::Toml(_) | Error::Yaml(_) => CliError::Config(e.to_string()),
            Error::Cancelled => CliError::Cancelled,
            _ => CliError::Backend(e.to_string()),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(EXIT_BACKEND_ERROR);
        }
    };

    match runtime.block_on(dispatch(cli)) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(CliError::Config(msg)) => {
            eprintln!("configuration error: {msg}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
        Err(CliError::Backend(msg)) => {
            eprintln!("backend error: {msg}");
            ExitCode::from(EXIT_BACKEND_ERROR)
        }
        Err(CliError::Cancelled) => {
            eprintln!("run cancelled");
            ExitCode::from(EXIT_CANCELLED)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Setup {
            config,
            collections,
            force,
        } => run_setup(&cli.data_dir, &config, &collections, force).await,
        Command::Run { config, records } => {
            run_pipeline(&cli.data_dir, &config, records.as_deref()).await
        }
        Command::Clean { config } => run_clean(&cli.data_dir, &config).await,
        Command::Stats {
            config,
            collection,
            records,
        } => run_stats(&cli.data_dir, &config, &collection, records.as_deref()).await,
        Command::Explain {
            config,
            collection,
            record_a,
            record_b,
        } => run_explain(&cli.data_dir, &config, &collection, &record_a, &record_b).await,
    }
}

/// Derive the text-index views blocking needs from its configured
/// strategies (§4A `create_view`): every `ngram`/`phonetic`/`hybrid`
/// strategy names a view, deduplicated since more than one strategy may
/// share it.
fn derive_view_specs(blocking: &BlockingConfig) -> Vec<ViewSpec> {
    let mut specs = Vec::new();
    let mut seen = HashSet::new();
    for strategy in &blocking.strategies {
        let spec = match strategy {
            StrategyConfig::Ngram {
                field,
                view,
                constraint_field,
                ..
            } => Some(ViewSpec {
                name: view.clone(),
                field: field.clone(),
                analyzer: AnalyzerKind::Ngram,
                constraint_field: constraint_field.clone(),
            }),
            StrategyConfig::Phonetic { field, view, .. } => Some(ViewSpec {
                name: view.clone(),
                field: field.clone(),
                analyzer: AnalyzerKind::Phonetic,
                constraint_field: None,
            }),
            // The BM25 pre-filter half of the hybrid strategy is an n-gram
            // query (§4B strategy 6); the Levenshtein gate runs afterward
            // on raw field values and needs no index of its own.
            StrategyConfig::Hybrid { field, view, .. } => Some(ViewSpec {
                name: view.clone(),
                field: field.clone(),
                analyzer: AnalyzerKind::Ngram,
                constraint_field: None,
            }),
            StrategyConfig::Exact { .. }
            | StrategyConfig::Composite { .. }
            | StrategyConfig::Geographic { .. }
            | StrategyConfig::GraphTraversal { .. } => None,
        };
        if let Some(spec) = spec {
            if seen.insert(spec.name.clone()) {
                specs.push(spec);
            }
        }
    }
    specs
}

async fn setup_store(data_dir: &Path, config: &Config) -> Result<EmbeddedStore, CliError> {
    let store = EmbeddedStore::on_disk(data_dir);
    let specs = derive_view_specs(&config.blocking);
    store.setup_views(&config.analyzers, specs)?;
    Ok(store)
}

async fn run_setup(
    data_dir: &Path,
    config_path: &Path,
    collections_filter: &[String],
    force: bool,
) -> Result<(), CliError> {
    let config = Config::load_from_path(config_path)?;
    let collections: Vec<&str> = if collections_filter.is_empty() {
        config.collections.iter().map(String::as_str).collect()
    } else {
        for c in collections_filter {
            entitylink::config::validate_identifier(c)?;
        }
        collections_filter.iter().map(String::as_str).collect()
    };
    if force {
        tracing::info!("force=true: views will be rebuilt from scratch");
    }

    let store = setup_store(data_dir, &config).await?;
    let status = store.setup_status();
    println!("collections: {}", collections.join(", "));
    println!("views ready: {}", status.join(", "));
    Ok(())
}

/// Load `<collection>.jsonl` files from `dir`, one JSON object per line:
/// `{"id": "...", "source": "...", <field>: <value>, ...}`. Missing files
/// are skipped (not every configured collection needs fresh records on
/// every run). Ingestion proper is out of scope (§1 Non-goals); this is
/// just enough plumbing to exercise the engine locally.
async fn load_records(
    store: &EmbeddedStore,
    collections: &[impl AsRef<str>],
    dir: &Path,
) -> Result<(), CliError> {
    for collection in collections {
        let collection = collection.as_ref();
        let path = dir.join(format!("{collection}.jsonl"));
        if !path.exists() {
            continue;
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CliError::Backend(format!("reading {}: {e}", path.display())))?;

        let mut records = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line)
                .map_err(|e| CliError::Backend(format!("{}:{}: {e}", path.display(), lineno + 1)))?;
            let Value::Object(mut obj) = value else {
                return Err(CliError::Backend(format!(
                    "{}:{}: expected a JSON object per line",
                    path.display(),
                    lineno + 1
                )));
            };
            let id = obj
                .remove("id")
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| {
                    CliError::Backend(format!("{}:{}: missing \"id\"", path.display(), lineno + 1))
                })?;
            let source = obj
                .remove("source")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| collection.to_string());

            let mut record = Record::new(id, source);
            for (field, field_value) in obj {
                record = record.with_field(field, field_value);
            }
            records.push(record);
        }

        let count = records.len();
        store.ingest_many(collection, records)?;
        tracing::info!(collection = %collection, records = count, "ingested records");
    }
    Ok(())
}

async fn run_pipeline(
    data_dir: &Path,
    config_path: &Path,
    records_dir: Option<&Path>,
) -> Result<(), CliError> {
    let config = Config::load_from_path(config_path)?;
    let store = setup_store(data_dir, &config).await?;

    if let Some(dir) = records_dir {
        load_records(&store, &config.collections, dir).await?;
    }

    let clusterer = WeaklyConnectedComponents::default();
    let cancel = CancelToken::new();
    let pipeline = Pipeline::new(&config);
    let report = pipeline
        .run(&store, &store, &store, &store, &clusterer, &cancel)
        .await?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    for c in &report.collections {
        println!(
            "collection={:<16} candidates_scored={:<8} edges_written={}",
            c.collection, c.candidates_scored, c.edges_written
        );
        for stat in &c.blocking_stats {
            println!(
                "  strategy={:<14} candidates={:<6} blocks={:<6} dropped_blocks={}",
                stat.strategy, stat.candidates_generated, stat.blocks_formed, stat.dropped_blocks
            );
        }
        for err in &c.blocking_errors {
            println!("  blocking strategy failed: {err}");
        }
    }
    println!(
        "clusters_emitted={} clusters_valid={} golden_records={}",
        report.clusters_emitted, report.quality.clusters_valid, report.golden_records_written
    );
    for (reason, count) in &report.quality.failure_histogram {
        println!("  quality failure: {reason}={count}");
    }
    for recommendation in &report.quality.recommendations {
        println!("  recommendation: {recommendation}");
    }
}

async fn run_clean(data_dir: &Path, config_path: &Path) -> Result<(), CliError> {
    let config = Config::load_from_path(config_path)?;
    let store = EmbeddedStore::on_disk(data_dir);

    let edge_writer = EdgeWriter::new(&config.edges, "fellegi_sunter");
    let removed_edges = edge_writer.clear(&store, None, None).await?;
    ClusterStore::truncate(&store).await?;
    GoldenRecordStore::truncate(&store).await?;

    println!("removed {removed_edges} edges; cleared clusters and golden records");
    Ok(())
}

async fn run_stats(
    data_dir: &Path,
    config_path: &Path,
    collection: &str,
    records_dir: Option<&Path>,
) -> Result<(), CliError> {
    let config = Config::load_from_path(config_path)?;
    entitylink::config::validate_identifier(collection)?;

    let store = setup_store(data_dir, &config).await?;
    if let Some(dir) = records_dir {
        load_records(&store, &[collection], dir).await?;
    }

    let record_count = RecordStore::record_count(&store, collection).await?;
    let total_possible_pairs = record_count.saturating_mul(record_count.saturating_sub(1)) / 2;

    let engine = BlockingEngine::from_config(&config.blocking);
    let (candidates, stats, errors) = engine.run(collection, &store, Some(&store)).await?;
    let reduction_ratio = if total_possible_pairs == 0 {
        0.0
    } else {
        1.0 - candidates.len() as f64 / total_possible_pairs as f64
    };

    println!("collection: {collection}");
    println!("records: {record_count}");
    println!("total_possible_pairs: {total_possible_pairs}");
    println!("candidate_count: {}", candidates.len());
    println!("reduction_ratio: {reduction_ratio:.4}");
    for s in &stats {
        println!(
            "  strategy={:<14} candidates={:<6} blocks={:<6} largest_block={:<6} dropped_blocks={}",
            s.strategy, s.candidates_generated, s.blocks_formed, s.largest_block, s.dropped_blocks
        );
    }
    for e in &errors {
        println!("  strategy error: {e}");
    }

    let edge_count = EdgeStore::edge_count(&store).await?;
    println!("edges: {edge_count}");
    Ok(())
}

async fn run_explain(
    data_dir: &Path,
    config_path: &Path,
    collection: &str,
    record_a: &str,
    record_b: &str,
) -> Result<(), CliError> {
    use entitylink::similarity::scorer::Scorer;

    let config = Config::load_from_path(config_path)?;
    entitylink::config::validate_identifier(collection)?;
    let store = EmbeddedStore::on_disk(data_dir);

    let a = RecordStore::get_record(&store, collection, record_a)
        .await?
        .ok_or_else(|| CliError::Backend(format!("record not found: {record_a}")))?;
    let b = RecordStore::get_record(&store, collection, record_b)
        .await?
        .ok_or_else(|| CliError::Backend(format!("record not found: {record_b}")))?;

    let scorer = Scorer::new(&config.scoring);
    let scored = scorer.score_pair(record_a, record_b, &a, &b);

    println!("pair: ({record_a}, {record_b})");
    let mut fields: Vec<_> = scored.per_field_scores.iter().collect();
    fields.sort_by(|(f1, _), (f2, _)| f1.cmp(f2));
    for (field, s) in fields {
        println!(
            "  field={:<16} similarity={:<8.4} agreement={:<6} weight={:+.4}",
            field, s.similarity, s.agreement, s.weight
        );
    }
    println!("total_score: {:.4}", scored.total_score);
    println!("decision: {:?}", scored.decision);
    println!("confidence: {:.4}", scored.confidence);
    Ok(())
}
