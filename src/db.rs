use crate::backtest::{BacktestDataset, BacktestSummary, HistoricalRecord};
use crate::config::LeagueConfig;
use crate::errors::{EngineError, EngineResult};
use crate::execution::edge::EdgeResult;
use crate::state::{DbCommand, League, StatType};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = include_str!("../migrations/001_init.sql");

pub fn init_db(db_path: &Path) -> EngineResult<DbPool> {
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| EngineError::Database(format!("create dir: {e}")))?;
    }
    let conn = Connection::open(db_path)?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA cache_size=-64000;")?;
    conn.execute_batch(SCHEMA)?;

    tracing::info!("database initialized at {}", db_path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

#[cfg(test)]
pub fn init_memory_db() -> EngineResult<DbPool> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Timestamps are stored as fixed-width RFC 3339 UTC so text comparison
/// orders them correctly.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn day_start(d: NaiveDate) -> String {
    format!("{}T00:00:00Z", d.format("%Y-%m-%d"))
}

/// Dedicated DB writer task. Reads commands from bounded channel, executes SQL.
/// This is the only task that writes while scoring or a backtest is running.
pub async fn run_db_writer(db: DbPool, mut rx: mpsc::Receiver<DbCommand>) {
    tracing::info!("db writer task started");

    while let Some(cmd) = rx.recv().await {
        if let Err(e) = execute_command(&db, cmd) {
            tracing::error!("db write error: {e}");
        }
    }

    tracing::info!("db writer task shutting down");
}

fn execute_command(db: &DbPool, cmd: DbCommand) -> EngineResult<()> {
    let conn = db.lock().map_err(|e| EngineError::Database(format!("lock poisoned: {e}")))?;

    match cmd {
        DbCommand::InsertEdgeResult {
            id, run_id, entity_id, stat_type, event_time, direction, edge_pct,
            model_probability, market_probability, confidence, payload, created_at,
        } => {
            conn.execute(
                "INSERT OR REPLACE INTO edge_results (id, run_id, entity_id, stat_type, event_time, direction, edge_pct, model_probability, market_probability, confidence, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![id, run_id, entity_id, stat_type, event_time, direction, edge_pct, model_probability, market_probability, confidence, payload, created_at],
            )?;
        }
        DbCommand::InsertBacktestRun {
            run_id, league, label, created_at, settled, hit_rate, config, summary,
        } => {
            conn.execute(
                "INSERT OR REPLACE INTO backtest_runs (run_id, league, label, created_at, settled, hit_rate, config, summary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![run_id, league, label, created_at, settled, hit_rate, config, summary],
            )?;
        }
    }
    Ok(())
}

// ── Command builders ──

pub fn edge_result_command(
    result: &EdgeResult,
    event_time: DateTime<Utc>,
    run_id: Option<&str>,
) -> EngineResult<DbCommand> {
    Ok(DbCommand::InsertEdgeResult {
        id: uuid::Uuid::new_v4().to_string(),
        run_id: run_id.map(str::to_string),
        entity_id: result.entity_id.clone(),
        stat_type: result.stat_type.as_str().to_string(),
        event_time: ts(event_time),
        direction: result.direction.to_string(),
        edge_pct: result.edge_pct,
        model_probability: result.model_probability,
        market_probability: result.market_probability,
        confidence: result.confidence,
        payload: serde_json::to_string(result)?,
        created_at: ts(Utc::now()),
    })
}

pub fn backtest_run_command(
    run_id: &str,
    label: &str,
    config: &LeagueConfig,
    summary: &BacktestSummary,
) -> EngineResult<DbCommand> {
    Ok(DbCommand::InsertBacktestRun {
        run_id: run_id.to_string(),
        league: summary.league.as_str().to_string(),
        label: label.to_string(),
        created_at: ts(Utc::now()),
        settled: summary.overall.samples as i64,
        hit_rate: summary.overall.hit_rate,
        config: serde_json::to_string(config)?,
        summary: serde_json::to_string(summary)?,
    })
}

// ── Historical props (cold path: import and replay load lock directly) ──

/// Upsert historical records in one transaction. Returns rows written.
pub fn import_historical(db: &DbPool, records: &[HistoricalRecord]) -> EngineResult<usize> {
    let mut conn = db.lock().map_err(|e| EngineError::Database(format!("lock: {e}")))?;
    let tx = conn.transaction()?;
    let imported_at = ts(Utc::now());
    let mut written = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO historical_props (entity_id, league, stat_type, game_id, event_time, line, context, outcome, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for rec in records {
            let ctx = &rec.context;
            written += stmt.execute(rusqlite::params![
                ctx.entity_id,
                ctx.league.as_str(),
                ctx.stat_type.as_str(),
                ctx.game_id,
                ts(ctx.event_time),
                ctx.line,
                serde_json::to_string(ctx)?,
                serde_json::to_string(&rec.outcome)?,
                imported_at,
            ])?;
        }
    }
    tx.commit()?;
    tracing::info!(records = records.len(), written, "historical props imported");
    Ok(written)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoricalFilter {
    pub league: League,
    pub stat_type: Option<StatType>,
    /// Inclusive, by event date (UTC).
    pub from: Option<NaiveDate>,
    /// Inclusive, by event date (UTC).
    pub to: Option<NaiveDate>,
}

impl HistoricalFilter {
    pub fn league(league: League) -> Self {
        Self { league, stat_type: None, from: None, to: None }
    }
}

/// Load matching records in event order and re-validate them as a dataset.
pub fn load_historical(db: &DbPool, filter: &HistoricalFilter) -> EngineResult<BacktestDataset> {
    let conn = db.lock().map_err(|e| EngineError::Database(format!("lock: {e}")))?;

    let mut sql = String::from("SELECT context, outcome FROM historical_props WHERE league = ?1");
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(filter.league.as_str())];
    if let Some(stat) = filter.stat_type {
        params.push(Box::new(stat.as_str()));
        sql.push_str(&format!(" AND stat_type = ?{}", params.len()));
    }
    if let Some(from) = filter.from {
        params.push(Box::new(day_start(from)));
        sql.push_str(&format!(" AND event_time >= ?{}", params.len()));
    }
    if let Some(to) = filter.to {
        let end = to
            .succ_opt()
            .ok_or_else(|| EngineError::InvalidInput(format!("date out of range: {to}")))?;
        params.push(Box::new(day_start(end)));
        sql.push_str(&format!(" AND event_time < ?{}", params.len()));
    }
    sql.push_str(" ORDER BY event_time, id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (context, outcome) = row?;
        records.push(HistoricalRecord {
            context: serde_json::from_str(&context)?,
            outcome: serde_json::from_str(&outcome)?,
        });
    }
    drop(stmt);
    drop(conn);

    tracing::debug!(league = %filter.league, records = records.len(), "historical props loaded");
    BacktestDataset::from_records(records)
}

// ── Run history ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct BacktestRunRow {
    pub run_id: String,
    pub league: String,
    pub label: String,
    pub created_at: String,
    pub settled: i64,
    pub hit_rate: Option<f64>,
}

pub fn get_recent_runs(db: &DbPool, league: Option<League>, limit: usize) -> EngineResult<Vec<BacktestRunRow>> {
    let conn = db.lock().map_err(|e| EngineError::Database(format!("lock: {e}")))?;
    let (sql, params): (&str, Vec<Box<dyn rusqlite::types::ToSql>>) = match league {
        Some(l) => (
            "SELECT run_id, league, label, created_at, settled, hit_rate FROM backtest_runs WHERE league = ?1 ORDER BY created_at DESC LIMIT ?2",
            vec![Box::new(l.as_str()), Box::new(limit as i64)],
        ),
        None => (
            "SELECT run_id, league, label, created_at, settled, hit_rate FROM backtest_runs ORDER BY created_at DESC LIMIT ?1",
            vec![Box::new(limit as i64)],
        ),
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
        Ok(BacktestRunRow {
            run_id: row.get(0)?,
            league: row.get(1)?,
            label: row.get(2)?,
            created_at: row.get(3)?,
            settled: row.get(4)?,
            hit_rate: row.get(5)?,
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}
