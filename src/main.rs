mod backtest;
mod config;
mod db;
mod errors;
mod execution;
mod settlement;
mod signals;
mod state;

use crate::backtest::{BacktestDataset, BacktestEngine, BacktestOptions, SweepVariant};
use crate::config::AppConfig;
use crate::errors::{EngineError, EngineResult};
use crate::execution::edge::{EdgeCalculator, EdgeResult};
use crate::execution::filter::{self, EdgeTier};
use crate::state::{DbCommand, League, PropContext, StatType};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "prop_edge")]
#[command(version = "0.1.0")]
#[command(about = "Signal-based edge scoring and backtesting for player props", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// League override (otherwise LEAGUE from the environment)
    #[arg(short, long, global = true)]
    league: Option<League>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score a file of prop contexts (JSON array or one per line)
    Score {
        #[arg(short, long)]
        input: PathBuf,
        /// Print every evaluated prop, not just those clearing the cutoffs
        #[arg(long)]
        all: bool,
        /// Store every evaluation in the database
        #[arg(long)]
        persist: bool,
    },

    /// Import historical records (JSON lines) into the database
    Import {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Replay stored history and report hit rate and calibration
    Backtest {
        #[command(flatten)]
        source: DatasetArgs,
        #[arg(long, default_value = "baseline")]
        label: String,
        /// Worker count (otherwise BACKTEST_WORKERS)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Skip recording the run
        #[arg(long)]
        no_store: bool,
    },

    /// Replay one dataset under a grid of scale and contrarian thresholds
    Sweep {
        #[command(flatten)]
        source: DatasetArgs,
        #[arg(long, value_delimiter = ',', default_value = "1.0,1.5,2.0")]
        scales: Vec<f64>,
        /// Contrarian thresholds in edge points; "off" disables the flip
        #[arg(long, value_delimiter = ',', default_value = "off,5,10,15")]
        thresholds: Vec<Threshold>,
    },

    /// List recorded backtest runs
    Runs {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(clap::Args, Debug)]
struct DatasetArgs {
    /// Read history from a JSON-lines file instead of the database
    #[arg(short, long)]
    input: Option<PathBuf>,
    #[arg(long)]
    stat: Option<StatType>,
    /// First event date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last event date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy)]
struct Threshold(Option<f64>);

impl FromStr for Threshold {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("off") {
            return Ok(Self(None));
        }
        s.parse::<f64>()
            .map(|t| Self(Some(t)))
            .map_err(|e| EngineError::Parse(format!("threshold {s:?}: {e}")))
    }
}

#[derive(Serialize)]
struct ScoredProp {
    tier: EdgeTier,
    #[serde(flatten)]
    result: EdgeResult,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, cfg).await {
        tracing::error!(error = %e, "prop_edge failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, cfg: AppConfig) -> EngineResult<()> {
    let league = cli.league.unwrap_or(cfg.league);
    let league_cfg = cfg.league_config(league)?;
    tracing::info!(league = %league, scale = league_cfg.scale, contrarian = league_cfg.contrarian.enabled, "prop_edge starting");

    match cli.command {
        Command::Score { input, all, persist } => {
            let raw = read_file(&input)?;
            let contexts = parse_contexts(&raw)?;
            let calculator = EdgeCalculator::new(league, league_cfg.clone());

            let mut evaluated = Vec::with_capacity(contexts.len());
            let mut rejected = 0usize;
            for ctx in &contexts {
                let outcome = ctx.validate().and_then(|_| calculator.evaluate(ctx));
                match outcome {
                    Ok(r) => evaluated.push((ctx.event_time, r)),
                    Err(e) if !e.is_rejection() => return Err(e),
                    Err(e) => {
                        rejected += 1;
                        tracing::warn!(entity = %ctx.entity_id, stat = %ctx.stat_type, error = %e, "prop rejected");
                    }
                }
            }

            if persist {
                let commands = evaluated
                    .iter()
                    .map(|(t, r)| db::edge_result_command(r, *t, None))
                    .collect::<EngineResult<Vec<_>>>()?;
                write_commands(&cfg, commands).await?;
            }

            let cutoffs = league_cfg.cutoffs;
            let results: Vec<EdgeResult> = evaluated.into_iter().map(|(_, r)| r).collect();
            let total = results.len();
            let shown = if all { results } else { filter::rank(results, &cutoffs) };
            tracing::info!(evaluated = total, rejected, shown = shown.len(), "scoring complete");

            for result in shown {
                let tier = filter::edge_tier(&result, &cutoffs);
                println!("{}", serde_json::to_string(&ScoredProp { tier, result })?);
            }
        }

        Command::Import { input } => {
            let dataset = BacktestDataset::from_json_lines(&read_file(&input)?)?;
            let pool = db::init_db(&cfg.db_path())?;
            let written = db::import_historical(&pool, dataset.records())?;
            println!("{}", serde_json::json!({ "records": dataset.len(), "written": written }));
        }

        Command::Backtest { source, label, workers, no_store } => {
            let dataset = Arc::new(load_dataset(&cfg, league, &source)?);
            let options = backtest_options(&cfg);
            let engine = Arc::new(BacktestEngine::new(league, league_cfg, options));
            let workers = workers.unwrap_or(cfg.backtest_workers);

            let summary = Arc::clone(&engine).run_parallel(dataset, workers).await?;

            if !no_store {
                let run_id = uuid::Uuid::new_v4().to_string();
                let cmd = db::backtest_run_command(&run_id, &label, engine.config(), &summary)?;
                write_commands(&cfg, vec![cmd]).await?;
                tracing::info!(run_id = %run_id, label = %label, "backtest run stored");
            }

            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Sweep { source, scales, thresholds } => {
            let dataset = load_dataset(&cfg, league, &source)?;
            let thresholds: Vec<Option<f64>> = thresholds.into_iter().map(|t| t.0).collect();
            let variants = SweepVariant::grid(&league_cfg, &scales, &thresholds);
            tracing::info!(variants = variants.len(), records = dataset.len(), "sweep starting");

            let engine = BacktestEngine::new(league, league_cfg, backtest_options(&cfg));
            for outcome in engine.sweep(&dataset, &variants) {
                let s = &outcome.summary;
                println!(
                    "{}",
                    serde_json::json!({
                        "label": outcome.label,
                        "settled": s.overall.samples,
                        "hit_rate": s.overall.hit_rate,
                        "roi": s.overall.roi,
                        "ece": s.expected_calibration_error,
                        "significant_buckets": s.significant_buckets().count(),
                    })
                );
            }
        }

        Command::Runs { limit } => {
            let pool = db::init_db(&cfg.db_path())?;
            for row in db::get_recent_runs(&pool, cli.league, limit)? {
                println!("{}", serde_json::to_string(&row)?);
            }
        }
    }
    Ok(())
}

fn backtest_options(cfg: &AppConfig) -> BacktestOptions {
    BacktestOptions {
        min_bucket_samples: cfg.min_bucket_samples,
        ..BacktestOptions::default()
    }
}

fn read_file(path: &Path) -> EngineResult<String> {
    std::fs::read_to_string(path).map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))
}

/// Contexts as a JSON array, or one JSON object per line.
fn parse_contexts(raw: &str) -> EngineResult<Vec<PropContext>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, l)| {
            serde_json::from_str(l).map_err(|e| EngineError::Parse(format!("context {}: {e}", i + 1)))
        })
        .collect()
}

fn load_dataset(cfg: &AppConfig, league: League, args: &DatasetArgs) -> EngineResult<BacktestDataset> {
    match &args.input {
        Some(path) => {
            let all = BacktestDataset::from_json_lines(&read_file(path)?)?;
            let kept = all
                .records()
                .iter()
                .filter(|r| {
                    let ctx = &r.context;
                    let day = ctx.event_date();
                    ctx.league == league
                        && args.stat.map_or(true, |s| s == ctx.stat_type)
                        && args.from.map_or(true, |f| day >= f)
                        && args.to.map_or(true, |t| day <= t)
                })
                .cloned()
                .collect();
            BacktestDataset::from_records(kept)
        }
        None => {
            let pool = db::init_db(&cfg.db_path())?;
            db::load_historical(
                &pool,
                &db::HistoricalFilter { league, stat_type: args.stat, from: args.from, to: args.to },
            )
        }
    }
}

/// Send commands through the writer task and wait for it to drain.
async fn write_commands(cfg: &AppConfig, commands: Vec<DbCommand>) -> EngineResult<()> {
    let pool = db::init_db(&cfg.db_path())?;
    let (db_tx, db_rx) = mpsc::channel::<DbCommand>(1024);
    let writer = tokio::spawn(db::run_db_writer(pool, db_rx));

    for cmd in commands {
        db_tx
            .send(cmd)
            .await
            .map_err(|e| EngineError::ChannelClosed(format!("db writer: {e}")))?;
    }
    drop(db_tx);
    writer.await?;
    Ok(())
}
