pub mod buckets;
pub mod calibration;
pub mod stats;
pub mod summary;

use crate::config::LeagueConfig;
use crate::errors::{EngineError, EngineResult};
use crate::execution::edge::{EdgeCalculator, EdgeResult};
use crate::execution::odds::probability_to_american;
use crate::settlement::{settled_pnl, ObservedOutcome, OutcomeSource, RoundingPolicy, Settlement, SettlementStatus};
use crate::state::{League, PropContext, StatType};
use buckets::Accumulator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
pub use summary::BacktestSummary;

/// One historical prop: the context as it stood before the event, and what
/// actually happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub context: PropContext,
    pub outcome: ObservedOutcome,
}

/// Materialized replay input. Independent of any calculator configuration,
/// so one dataset can back many runs.
#[derive(Debug, Clone, Default)]
pub struct BacktestDataset {
    records: Vec<HistoricalRecord>,
}

impl BacktestDataset {
    /// Any record whose inputs postdate its event poisons the dataset and
    /// fails the load. Other invalid records are kept and counted as
    /// rejected when replayed.
    pub fn from_records(records: Vec<HistoricalRecord>) -> EngineResult<Self> {
        for rec in &records {
            if let Err(e @ EngineError::LookAhead(_)) = rec.context.validate() {
                return Err(e);
            }
        }
        Ok(Self { records })
    }

    /// Pair each context with its outcome from `source`.
    pub fn from_source(contexts: Vec<PropContext>, source: &impl OutcomeSource) -> EngineResult<Self> {
        let records = contexts
            .into_iter()
            .map(|context| {
                let outcome = source.lookup(&context.entity_id, context.stat_type, context.event_date());
                HistoricalRecord { context, outcome }
            })
            .collect();
        Self::from_records(records)
    }

    /// One JSON `HistoricalRecord` per line. Blank lines are skipped.
    pub fn from_json_lines(raw: &str) -> EngineResult<Self> {
        let mut records = Vec::new();
        for (i, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let rec: HistoricalRecord = serde_json::from_str(line)
                .map_err(|e| EngineError::Parse(format!("line {}: {e}", i + 1)))?;
            records.push(rec);
        }
        Self::from_records(records)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn records(&self) -> &[HistoricalRecord] {
        &self.records
    }
}

/// One replayed prop. Never mutated after the replay builds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRecord {
    pub entity_id: String,
    pub stat_type: StatType,
    pub event_time: DateTime<Utc>,
    pub line: f64,
    pub result: EdgeResult,
    pub status: SettlementStatus,
    pub actual: Option<f64>,
    pub rounding_adjusted: bool,
    /// Flat-stake P/L at the posted price of the replayed side.
    pub profit: f64,
    pub stake: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestOptions {
    pub min_bucket_samples: u64,
    pub significance_alpha: f64,
    /// |strength| at or below this counts as a neutral signal.
    pub neutral_band: f64,
    pub rounding: RoundingPolicy,
    pub stake: f64,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        Self {
            min_bucket_samples: 30,
            significance_alpha: 0.05,
            neutral_band: 0.05,
            rounding: RoundingPolicy::default(),
            stake: 1.0,
        }
    }
}

/// An alternate configuration to replay the same dataset under.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepVariant {
    pub label: String,
    pub config: LeagueConfig,
}

impl SweepVariant {
    /// Cartesian grid of scale and contrarian threshold over `base`.
    /// A `None` threshold turns the contrarian policy off.
    pub fn grid(base: &LeagueConfig, scales: &[f64], thresholds: &[Option<f64>]) -> Vec<SweepVariant> {
        let mut out = Vec::with_capacity(scales.len() * thresholds.len());
        for &scale in scales {
            for &threshold in thresholds {
                let mut config = base.clone();
                config.scale = scale;
                config.contrarian.thresholds.clear();
                config.contrarian.enabled = threshold.is_some();
                config.contrarian.default_threshold = threshold;
                let label = match threshold {
                    Some(t) => format!("scale={scale:.2} contrarian={t:.1}"),
                    None => format!("scale={scale:.2} contrarian=off"),
                };
                out.push(SweepVariant { label, config });
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepOutcome {
    pub label: String,
    pub summary: BacktestSummary,
}

/// Replays a dataset through the edge calculator and settles every record.
/// Stateless between runs; holds only the calculator and options.
pub struct BacktestEngine {
    league: League,
    calculator: EdgeCalculator<'static>,
    options: BacktestOptions,
}

impl BacktestEngine {
    pub fn new(league: League, config: LeagueConfig, options: BacktestOptions) -> Self {
        Self {
            league,
            calculator: EdgeCalculator::new(league, config),
            options,
        }
    }

    #[inline]
    pub fn config(&self) -> &LeagueConfig {
        self.calculator.config()
    }

    /// Evaluate and settle one record. Errors when the prop is rejected.
    pub fn replay_one(&self, rec: &HistoricalRecord) -> EngineResult<BacktestRecord> {
        let ctx = &rec.context;
        let result = self.calculator.evaluate(ctx)?;

        let mut settlement = Settlement::new(result.direction, ctx.line);
        let status = settlement.resolve(&rec.outcome, &self.options.rounding)?;

        let odds = match ctx.odds.side(result.direction) {
            Some(o) => o,
            None => probability_to_american(result.market_probability)?,
        };
        let profit = settled_pnl(status, odds, self.options.stake);
        tracing::trace!(
            entity = %ctx.entity_id,
            stat = %ctx.stat_type,
            direction = %result.direction,
            status = status.as_str(),
            profit,
            "settled historical record"
        );

        Ok(BacktestRecord {
            entity_id: ctx.entity_id.clone(),
            stat_type: ctx.stat_type,
            event_time: ctx.event_time,
            line: ctx.line,
            result,
            status,
            actual: settlement.actual(),
            rounding_adjusted: settlement.rounding_adjusted(),
            profit,
            stake: self.options.stake,
        })
    }

    /// Replay a slice into a fresh accumulator.
    pub fn accumulate(&self, records: &[HistoricalRecord]) -> Accumulator {
        let mut acc = Accumulator::new();
        for rec in records {
            match self.replay_one(rec) {
                Ok(r) => acc.add(&r, self.options.neutral_band),
                Err(e) => {
                    tracing::warn!(
                        entity = %rec.context.entity_id,
                        stat = %rec.context.stat_type,
                        error = %e,
                        "rejected historical record"
                    );
                    acc.reject();
                }
            }
        }
        acc
    }

    pub fn run(&self, dataset: &BacktestDataset) -> BacktestSummary {
        let start = Instant::now();
        let acc = self.accumulate(dataset.records());
        self.finish(acc, start, 1)
    }

    /// Partition the dataset across `workers` blocking tasks, then merge the
    /// partial accumulators in partition order.
    pub async fn run_parallel(
        self: Arc<Self>,
        dataset: Arc<BacktestDataset>,
        workers: usize,
    ) -> EngineResult<BacktestSummary> {
        let start = Instant::now();
        let workers = workers.max(1);
        let len = dataset.len();
        let chunk = len.div_ceil(workers).max(1);

        let mut handles = Vec::with_capacity(workers);
        let mut lo = 0;
        while lo < len {
            let hi = (lo + chunk).min(len);
            let engine = Arc::clone(&self);
            let data = Arc::clone(&dataset);
            handles.push(tokio::task::spawn_blocking(move || {
                engine.accumulate(&data.records()[lo..hi])
            }));
            lo = hi;
        }

        let partitions = handles.len();
        let mut acc = Accumulator::new();
        for handle in handles {
            acc.merge(&handle.await?);
        }
        Ok(self.finish(acc, start, partitions))
    }

    /// Re-run the same dataset under each variant's configuration.
    pub fn sweep(&self, dataset: &BacktestDataset, variants: &[SweepVariant]) -> Vec<SweepOutcome> {
        variants
            .iter()
            .map(|v| {
                let engine = BacktestEngine::new(self.league, v.config.clone(), self.options);
                let summary = engine.run(dataset);
                tracing::info!(
                    variant = %v.label,
                    settled = summary.overall.samples,
                    hit_rate = ?summary.overall.hit_rate,
                    roi = ?summary.overall.roi,
                    "sweep variant complete"
                );
                SweepOutcome { label: v.label.clone(), summary }
            })
            .collect()
    }

    fn finish(&self, acc: Accumulator, start: Instant, partitions: usize) -> BacktestSummary {
        let summary = BacktestSummary::from_accumulator(self.league, &acc, &self.options);
        if summary.rejected > 0 {
            tracing::warn!(rejected = summary.rejected, "records rejected during replay");
        }
        tracing::info!(
            league = %self.league,
            records = summary.total_records,
            settled = summary.overall.samples,
            pushes = summary.overall.pushes,
            voids = summary.voids,
            hit_rate = ?summary.overall.hit_rate,
            ece = summary.expected_calibration_error,
            partitions,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "backtest complete"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::{event_time, points_prop};
    use crate::state::MarketOdds;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn recorded(value: f64) -> ObservedOutcome {
        ObservedOutcome::Recorded { value, time_on_ice_secs: Some(1200) }
    }

    fn record(i: usize, outcome: ObservedOutcome) -> HistoricalRecord {
        let mut context = points_prop();
        context.entity_id = format!("p{i}");
        context.line = if i % 3 == 0 { 1.5 } else { 0.5 };
        context.recent.average = Some(0.4 + (i % 7) as f64 * 0.2);
        HistoricalRecord { context, outcome }
    }

    fn dataset(n: usize) -> BacktestDataset {
        let records = (0..n)
            .map(|i| {
                let outcome = match i % 10 {
                    0 => ObservedOutcome::DidNotPlay,
                    1 => ObservedOutcome::NotAvailable,
                    _ => recorded((i % 4) as f64),
                };
                record(i, outcome)
            })
            .collect();
        BacktestDataset::from_records(records).unwrap()
    }

    fn engine(config: LeagueConfig) -> BacktestEngine {
        BacktestEngine::new(League::Nhl, config, BacktestOptions::default())
    }

    #[test]
    fn test_dataset_rejects_look_ahead() {
        let mut rec = record(0, recorded(1.0));
        rec.context.as_of = event_time() + chrono::Duration::minutes(5);
        let err = BacktestDataset::from_records(vec![rec]).unwrap_err();
        assert!(matches!(err, EngineError::LookAhead(_)));
    }

    #[test]
    fn test_invalid_record_counted_as_rejected() {
        let mut bad = record(1, recorded(1.0));
        bad.context.odds = MarketOdds::default();
        let ds = BacktestDataset::from_records(vec![record(0, recorded(2.0)), bad]).unwrap();
        let summary = engine(LeagueConfig::default()).run(&ds);
        assert_eq!(summary.total_records, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.evaluated, 1);
        assert_eq!(summary.overall.samples, 1);
    }

    #[test]
    fn test_voids_and_pending_excluded() {
        let ds = BacktestDataset::from_records(vec![
            record(0, ObservedOutcome::DidNotPlay),
            record(1, ObservedOutcome::Postponed),
            record(2, ObservedOutcome::NotAvailable),
            record(3, ObservedOutcome::Recorded { value: 1.0, time_on_ice_secs: Some(0) }),
            record(4, recorded(2.0)),
        ])
        .unwrap();
        let summary = engine(LeagueConfig::default()).run(&ds);
        assert_eq!(summary.voids, 3);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.overall.samples, 1);
        assert_eq!(summary.overall.pushes, 0);
    }

    #[test]
    fn test_replay_profit_uses_posted_price() {
        let e = engine(LeagueConfig::default());
        let r = e.replay_one(&record(1, recorded(3.0))).unwrap();
        let expected = match (r.status, r.result.direction) {
            (SettlementStatus::Hit, crate::state::Direction::Over) => 100.0 / 135.0,
            (SettlementStatus::Hit, crate::state::Direction::Under) => 1.05,
            (SettlementStatus::Miss, _) => -1.0,
            other => panic!("unexpected {other:?}"),
        };
        assert!((r.profit - expected).abs() < 1e-9);
        assert_eq!(r.actual, Some(3.0));
    }

    #[test]
    fn test_deterministic() {
        let ds = dataset(60);
        let e = engine(LeagueConfig::default());
        assert_eq!(e.run(&ds), e.run(&ds));
    }

    #[test]
    fn test_scale_change_preserves_total() {
        let ds = dataset(45);
        let base = engine(LeagueConfig::default()).run(&ds);
        let wide = engine(LeagueConfig { scale: 4.0, ..LeagueConfig::default() }).run(&ds);
        assert_eq!(base.total_records, wide.total_records);
        assert_eq!(base.total_records, 45);
        assert_eq!(base.voids, wide.voids);
    }

    #[test]
    fn test_sweep_grid() {
        let ds = dataset(30);
        let variants = SweepVariant::grid(&LeagueConfig::default(), &[1.0, 2.0], &[None, Some(5.0)]);
        assert_eq!(variants.len(), 4);
        assert_eq!(variants[1].label, "scale=1.00 contrarian=5.0");
        let results = engine(LeagueConfig::default()).sweep(&ds, &variants);
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.summary.total_records == 30));
        // contrarian off: nothing is flipped
        assert!(results[0].summary.by_contrarian.iter().all(|b| b.label == "model"));
    }

    #[test]
    fn test_from_source_pairs_outcomes() {
        let ctx = points_prop();
        let key = (ctx.entity_id.clone(), ctx.stat_type, ctx.event_date());
        let mut source: HashMap<(String, StatType, NaiveDate), ObservedOutcome> = HashMap::new();
        source.insert(key, recorded(2.0));
        let mut other = points_prop();
        other.entity_id = "unknown".into();
        let ds = BacktestDataset::from_source(vec![ctx, other], &source).unwrap();
        assert_eq!(ds.records()[0].outcome, recorded(2.0));
        assert_eq!(ds.records()[1].outcome, ObservedOutcome::NotAvailable);
    }

    #[test]
    fn test_json_lines_roundtrip_load() {
        let rec = record(0, ObservedOutcome::Postponed);
        let raw = format!("{}\n\n{}\n", serde_json::to_string(&rec).unwrap(), serde_json::to_string(&rec).unwrap());
        let ds = BacktestDataset::from_json_lines(&raw).unwrap();
        assert_eq!(ds.len(), 2);
        let summary = engine(LeagueConfig::default()).run(&ds);
        assert_eq!(summary.voids, 2);
        assert!(matches!(
            BacktestDataset::from_json_lines("{not json"),
            Err(EngineError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let ds = Arc::new(dataset(103));
        let e = Arc::new(engine(LeagueConfig::default()));
        let seq = e.run(&ds);
        let par = Arc::clone(&e).run_parallel(Arc::clone(&ds), 4).await.unwrap();
        assert_eq!(seq.total_records, par.total_records);
        assert_eq!(seq.rejected, par.rejected);
        assert_eq!(seq.voids, par.voids);
        assert_eq!(seq.pending, par.pending);
        assert_eq!(seq.overall.hits, par.overall.hits);
        assert_eq!(seq.overall.misses, par.overall.misses);
        assert_eq!(seq.overall.pushes, par.overall.pushes);
        for (a, b) in seq.by_edge.iter().zip(par.by_edge.iter()) {
            assert_eq!((a.hits, a.misses), (b.hits, b.misses));
        }
        // merge order is fixed, so repeated parallel runs agree exactly
        let again = Arc::clone(&e).run_parallel(Arc::clone(&ds), 4).await.unwrap();
        assert_eq!(par, again);
    }

    #[tokio::test]
    async fn test_parallel_empty_dataset() {
        let e = Arc::new(engine(LeagueConfig::default()));
        let s = e.run_parallel(Arc::new(BacktestDataset::default()), 3).await.unwrap();
        assert_eq!(s.total_records, 0);
        assert_eq!(s.overall.hit_rate, None);
    }
}
