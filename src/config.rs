use crate::errors::{EngineError, EngineResult};
use crate::signals::SignalKind;
use crate::state::{League, StatType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub calibration_path: Option<PathBuf>,
    pub backtest_workers: usize,
    pub min_bucket_samples: u64,
    pub league: League,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let backtest_workers = env_var_or("BACKTEST_WORKERS", "4")
            .parse::<usize>()
            .map_err(|e| EngineError::Config(format!("BACKTEST_WORKERS: {e}")))?;
        if backtest_workers == 0 {
            return Err(EngineError::Config("BACKTEST_WORKERS must be at least 1".into()));
        }

        let min_bucket_samples = env_var_or("MIN_BUCKET_SAMPLES", "30")
            .parse::<u64>()
            .map_err(|e| EngineError::Config(format!("MIN_BUCKET_SAMPLES: {e}")))?;

        let league = env_var_or("LEAGUE", "nhl")
            .parse::<League>()
            .map_err(|e| EngineError::Config(format!("LEAGUE: {e}")))?;

        Ok(Self {
            data_dir: PathBuf::from(env_var_or("DATA_DIR", "data")),
            calibration_path: std::env::var("CALIBRATION_PATH").ok().map(PathBuf::from),
            backtest_workers,
            min_bucket_samples,
            league,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("prop_edge.db")
    }

    /// Calibration for `league`: the JSON file when configured, else built-in defaults.
    pub fn league_config(&self, league: League) -> EngineResult<LeagueConfig> {
        match &self.calibration_path {
            Some(path) => CalibrationFile::load(path)?.for_league(league),
            None => Ok(LeagueConfig::default()),
        }
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// ── Calibration ──

/// Per-stat contrarian thresholds. A prop whose edge magnitude reaches its
/// threshold has its direction flipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrarianPolicy {
    pub enabled: bool,
    pub default_threshold: Option<f64>,
    pub thresholds: BTreeMap<StatType, f64>,
}

impl ContrarianPolicy {
    /// Thresholds that backtested well on historical NHL props.
    pub fn backtest_validated() -> Self {
        Self {
            enabled: true,
            default_threshold: None,
            thresholds: BTreeMap::from([
                (StatType::Goals, 15.0),
                (StatType::Saves, 5.0),
                (StatType::Assists, 5.0),
                (StatType::Points, 15.0),
                (StatType::ShotsOnGoal, 10.0),
            ]),
        }
    }

    /// Threshold in percentage points, if the policy applies to `stat`.
    #[inline]
    pub fn threshold_for(&self, stat: StatType) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        self.thresholds.get(&stat).copied().or(self.default_threshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cutoffs {
    /// Minimum edge, percentage points.
    pub min_edge_pct: f64,
    pub min_confidence: f64,
    pub high_edge_pct: f64,
    pub elite_edge_pct: f64,
}

impl Default for Cutoffs {
    fn default() -> Self {
        Self {
            min_edge_pct: 5.0,
            min_confidence: 0.60,
            high_edge_pct: 8.0,
            elite_edge_pct: 12.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeagueConfig {
    pub weights: BTreeMap<SignalKind, f64>,
    /// Weight for a registered signal with no entry in `weights`.
    pub default_weight: f64,
    /// Signals whose strength sign is flipped before aggregation.
    pub inverted_signals: BTreeSet<SignalKind>,
    /// Log-odds per unit of weighted signal.
    pub scale: f64,
    pub base_probability: f64,
    pub contrarian: ContrarianPolicy,
    pub cutoffs: Cutoffs,
}

impl Default for LeagueConfig {
    fn default() -> Self {
        Self {
            weights: BTreeMap::from([
                (SignalKind::LineValue, 0.35),
                (SignalKind::Trend, 0.15),
                (SignalKind::Usage, 0.10),
                (SignalKind::Matchup, 0.15),
                (SignalKind::Environment, 0.15),
                (SignalKind::Correlation, 0.10),
                (SignalKind::ShotQuality, 0.10),
                (SignalKind::GoalieSaves, 0.10),
                (SignalKind::GameTotals, 0.10),
            ]),
            default_weight: 0.1,
            inverted_signals: BTreeSet::new(),
            scale: 1.5,
            base_probability: 0.5,
            contrarian: ContrarianPolicy::default(),
            cutoffs: Cutoffs::default(),
        }
    }
}

impl LeagueConfig {
    #[inline]
    pub fn weight(&self, kind: SignalKind) -> f64 {
        self.weights.get(&kind).copied().unwrap_or(self.default_weight)
    }

    #[inline]
    pub fn is_inverted(&self, kind: SignalKind) -> bool {
        self.inverted_signals.contains(&kind)
    }

    pub fn validate(&self) -> EngineResult<()> {
        for (kind, w) in &self.weights {
            if !w.is_finite() || *w < 0.0 {
                return Err(EngineError::Config(format!("weight for {kind} must be >= 0, got {w}")));
            }
        }
        if !self.default_weight.is_finite() || self.default_weight < 0.0 {
            return Err(EngineError::Config(format!(
                "default_weight must be >= 0, got {}",
                self.default_weight
            )));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(EngineError::Config(format!("scale must be > 0, got {}", self.scale)));
        }
        if !(self.base_probability > 0.0 && self.base_probability < 1.0) {
            return Err(EngineError::Config(format!(
                "base_probability must be in (0, 1), got {}",
                self.base_probability
            )));
        }
        let thresholds = self
            .contrarian
            .thresholds
            .values()
            .chain(self.contrarian.default_threshold.iter());
        for t in thresholds {
            if !t.is_finite() || *t < 0.0 {
                return Err(EngineError::Config(format!("contrarian threshold must be >= 0, got {t}")));
            }
        }
        let c = &self.cutoffs;
        if !c.min_edge_pct.is_finite() || !(0.0..=1.0).contains(&c.min_confidence) {
            return Err(EngineError::Config("cutoffs out of range".into()));
        }
        Ok(())
    }
}

/// On-disk calibration: one `LeagueConfig` per league.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    #[serde(default)]
    pub leagues: BTreeMap<League, LeagueConfig>,
}

impl CalibrationFile {
    pub fn load(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> EngineResult<Self> {
        let file: Self = serde_json::from_str(raw)
            .map_err(|e| EngineError::Config(format!("calibration file: {e}")))?;
        for (league, cfg) in &file.leagues {
            cfg.validate()
                .map_err(|e| EngineError::Config(format!("{league}: {e}")))?;
        }
        Ok(file)
    }

    /// Leagues absent from the file fall back to defaults.
    pub fn for_league(&self, league: League) -> EngineResult<LeagueConfig> {
        Ok(self.leagues.get(&league).cloned().unwrap_or_default())
    }
}
