use crate::errors::{EngineError, EngineResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::str::FromStr;

// ── Market identity ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum League {
    Nhl,
    Nba,
    Nfl,
}

impl League {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nhl => "nhl",
            Self::Nba => "nba",
            Self::Nfl => "nfl",
        }
    }
}

impl std::fmt::Display for League {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for League {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nhl" => Ok(Self::Nhl),
            "nba" => Ok(Self::Nba),
            "nfl" => Ok(Self::Nfl),
            other => Err(EngineError::Parse(format!("unknown league: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatType {
    Points,
    Goals,
    Assists,
    ShotsOnGoal,
    BlockedShots,
    PpPoints,
    Saves,
    Totals,
}

impl StatType {
    pub const ALL: [StatType; 8] = [
        Self::Points,
        Self::Goals,
        Self::Assists,
        Self::ShotsOnGoal,
        Self::BlockedShots,
        Self::PpPoints,
        Self::Saves,
        Self::Totals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::Goals => "goals",
            Self::Assists => "assists",
            Self::ShotsOnGoal => "shots_on_goal",
            Self::BlockedShots => "blocked_shots",
            Self::PpPoints => "pp_points",
            Self::Saves => "saves",
            Self::Totals => "totals",
        }
    }

    /// Odds-feed market key for this stat.
    pub fn market_key(&self) -> &'static str {
        match self {
            Self::Points => "player_points",
            Self::Goals => "player_goals",
            Self::Assists => "player_assists",
            Self::ShotsOnGoal => "player_shots_on_goal",
            Self::BlockedShots => "player_blocked_shots",
            Self::PpPoints => "player_power_play_points",
            Self::Saves => "player_total_saves",
            Self::Totals => "totals",
        }
    }

    pub fn from_market_key(key: &str) -> Option<Self> {
        // Alternate-line markets settle on the same stat.
        let key = key.strip_suffix("_alternate").unwrap_or(key);
        Self::ALL.iter().copied().find(|s| s.market_key() == key)
    }

    /// Stats that move with game scoring environment.
    #[inline]
    pub fn is_scoring(&self) -> bool {
        matches!(self, Self::Points | Self::Goals | Self::Assists)
    }
}

impl std::fmt::Display for StatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .or_else(|| Self::from_market_key(&s))
            .ok_or_else(|| EngineError::Parse(format!("unknown stat type: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Over,
    Under,
}

impl Direction {
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Self::Over => Self::Under,
            Self::Under => Self::Over,
        }
    }

    /// +1 for over, -1 for under. Signal strength shares this convention.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Self::Over => 1.0,
            Self::Under => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Over => write!(f, "over"),
            Self::Under => write!(f, "under"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormAssessment {
    Hot,
    Neutral,
    Cold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    High,
    Average,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneDeployment {
    Offensive,
    Balanced,
    Defensive,
}

// ── Odds ──

/// Posted American odds. Values strictly between -100 and +100 (including 0)
/// do not exist on a real board and are rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct AmericanOdds(i32);

impl AmericanOdds {
    #[inline]
    pub fn value(self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for AmericanOdds {
    type Error = EngineError;

    fn try_from(odds: i32) -> Result<Self, Self::Error> {
        if odds.unsigned_abs() < 100 {
            return Err(EngineError::InvalidInput(format!(
                "malformed american odds: {odds}"
            )));
        }
        Ok(Self(odds))
    }
}

impl From<AmericanOdds> for i32 {
    fn from(o: AmericanOdds) -> Self {
        o.0
    }
}

impl FromStr for AmericanOdds {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let odds = digits
            .parse::<i32>()
            .map_err(|_| EngineError::InvalidInput(format!("non-numeric american odds: {s:?}")))?;
        Self::try_from(odds)
    }
}

impl std::fmt::Display for AmericanOdds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 > 0 {
            write!(f, "+{}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketOdds {
    #[serde(default)]
    pub over: Option<AmericanOdds>,
    #[serde(default)]
    pub under: Option<AmericanOdds>,
}

impl MarketOdds {
    pub fn both(over: i32, under: i32) -> EngineResult<Self> {
        Ok(Self {
            over: Some(AmericanOdds::try_from(over)?),
            under: Some(AmericanOdds::try_from(under)?),
        })
    }

    /// Odds posted for the given side.
    #[inline]
    pub fn side(&self, direction: Direction) -> Option<AmericanOdds> {
        match direction {
            Direction::Over => self.over,
            Direction::Under => self.under,
        }
    }
}

// ── Per-prop feature bag ──
//
// Every group is optional. Signals read what they need and lower their
// confidence when a group is absent.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonStats {
    pub games: Option<u32>,
    /// Per-game average of the prop's stat type.
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentForm {
    pub games: Option<u32>,
    pub average: Option<f64>,
    /// Consecutive games with at least one of the stat.
    pub streak: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deployment {
    /// Even-strength line (1-4).
    pub line_number: Option<u8>,
    /// Power-play unit (0 = none, 1, 2).
    pub pp_unit: Option<u8>,
    pub avg_toi_minutes: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalieMatchup {
    pub goalie_name: Option<String>,
    pub save_pct: Option<f64>,
    pub gaa: Option<f64>,
    pub high_danger_save_pct: Option<f64>,
    pub form: Option<FormAssessment>,
    pub confirmed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShootingProfile {
    pub quality: Option<QualityTier>,
    pub high_danger_shot_pct: Option<f64>,
    pub zone: Option<ZoneDeployment>,
}

/// Inputs for goalie saves props, from the goalie's point of view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalieWorkload {
    pub opponent_shots_per_game: Option<f64>,
    pub save_pct: Option<f64>,
    pub form: Option<FormAssessment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamScoring {
    pub goals_per_game: f64,
    pub goals_against_per_game: f64,
    #[serde(default)]
    pub goalie_gaa: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamProfile {
    pub home: Option<TeamScoring>,
    pub away: Option<TeamScoring>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Situation {
    pub is_home: Option<bool>,
    pub is_b2b: Option<bool>,
    pub days_rest: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameLines {
    pub total: Option<f64>,
    pub spread: Option<f64>,
}

/// When a data source folded into the context was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStamp {
    pub source: String,
    pub observed_at: DateTime<Utc>,
}

/// Read-only input to one evaluation. Built once per (entity, stat, date)
/// and borrowed by every signal; nothing downstream mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropContext {
    pub entity_id: String,
    pub entity_name: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub opponent: String,
    #[serde(default)]
    pub position: Option<String>,
    pub league: League,
    pub stat_type: StatType,
    #[serde(default)]
    pub game_id: String,
    pub event_time: DateTime<Utc>,
    /// Latest instant any input may describe.
    pub as_of: DateTime<Utc>,

    pub line: f64,
    pub odds: MarketOdds,

    #[serde(default)]
    pub season: SeasonStats,
    #[serde(default)]
    pub recent: RecentForm,
    #[serde(default)]
    pub deployment: Deployment,
    #[serde(default)]
    pub goalie_matchup: GoalieMatchup,
    #[serde(default)]
    pub shooting: ShootingProfile,
    #[serde(default)]
    pub workload: GoalieWorkload,
    #[serde(default)]
    pub team_profile: TeamProfile,
    #[serde(default)]
    pub situation: Situation,
    #[serde(default)]
    pub game_lines: GameLines,

    #[serde(default)]
    pub provenance: SmallVec<[SourceStamp; 4]>,
}

impl PropContext {
    pub fn builder(league: League, stat_type: StatType) -> PropContextBuilder {
        PropContextBuilder::new(league, stat_type)
    }

    /// Check required inputs and the no-look-ahead invariant.
    /// Called by the builder and by every dataset loader.
    pub fn validate(&self) -> EngineResult<()> {
        if !self.line.is_finite() || self.line <= 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "{} {}: line must be positive, got {}",
                self.entity_id, self.stat_type, self.line
            )));
        }
        if self.odds.over.is_none() && self.odds.under.is_none() {
            return Err(EngineError::InvalidInput(format!(
                "{} {}: no odds posted for either side",
                self.entity_id, self.stat_type
            )));
        }
        if self.as_of >= self.event_time {
            return Err(EngineError::LookAhead(format!(
                "{} {}: context as_of {} is not before event {}",
                self.entity_id, self.stat_type, self.as_of, self.event_time
            )));
        }
        for stamp in &self.provenance {
            if stamp.observed_at > self.as_of || stamp.observed_at >= self.event_time {
                return Err(EngineError::LookAhead(format!(
                    "{} {}: source {} observed at {} (as_of {}, event {})",
                    self.entity_id,
                    self.stat_type,
                    stamp.source,
                    stamp.observed_at,
                    self.as_of,
                    self.event_time
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn event_date(&self) -> NaiveDate {
        self.event_time.date_naive()
    }

    #[inline]
    pub fn is_goalie(&self) -> bool {
        self.position
            .as_deref()
            .map(|p| p.eq_ignore_ascii_case("g"))
            .unwrap_or(false)
    }
}

pub struct PropContextBuilder {
    ctx: PropContext,
    event_time: Option<DateTime<Utc>>,
    as_of: Option<DateTime<Utc>>,
}

impl PropContextBuilder {
    fn new(league: League, stat_type: StatType) -> Self {
        Self {
            ctx: PropContext {
                entity_id: String::new(),
                entity_name: String::new(),
                team: String::new(),
                opponent: String::new(),
                position: None,
                league,
                stat_type,
                game_id: String::new(),
                event_time: DateTime::<Utc>::MIN_UTC,
                as_of: DateTime::<Utc>::MIN_UTC,
                line: 0.0,
                odds: MarketOdds::default(),
                season: SeasonStats::default(),
                recent: RecentForm::default(),
                deployment: Deployment::default(),
                goalie_matchup: GoalieMatchup::default(),
                shooting: ShootingProfile::default(),
                workload: GoalieWorkload::default(),
                team_profile: TeamProfile::default(),
                situation: Situation::default(),
                game_lines: GameLines::default(),
                provenance: SmallVec::new(),
            },
            event_time: None,
            as_of: None,
        }
    }

    pub fn entity(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.ctx.entity_id = id.into();
        self.ctx.entity_name = name.into();
        self
    }

    pub fn teams(mut self, team: impl Into<String>, opponent: impl Into<String>) -> Self {
        self.ctx.team = team.into();
        self.ctx.opponent = opponent.into();
        self
    }

    pub fn position(mut self, position: impl Into<String>) -> Self {
        self.ctx.position = Some(position.into());
        self
    }

    pub fn game(mut self, game_id: impl Into<String>, event_time: DateTime<Utc>) -> Self {
        self.ctx.game_id = game_id.into();
        self.event_time = Some(event_time);
        self
    }

    pub fn as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn market(mut self, line: f64, odds: MarketOdds) -> Self {
        self.ctx.line = line;
        self.ctx.odds = odds;
        self
    }

    pub fn season(mut self, season: SeasonStats) -> Self {
        self.ctx.season = season;
        self
    }

    pub fn recent(mut self, recent: RecentForm) -> Self {
        self.ctx.recent = recent;
        self
    }

    pub fn deployment(mut self, deployment: Deployment) -> Self {
        self.ctx.deployment = deployment;
        self
    }

    pub fn goalie_matchup(mut self, matchup: GoalieMatchup) -> Self {
        self.ctx.goalie_matchup = matchup;
        self
    }

    pub fn shooting(mut self, shooting: ShootingProfile) -> Self {
        self.ctx.shooting = shooting;
        self
    }

    pub fn workload(mut self, workload: GoalieWorkload) -> Self {
        self.ctx.workload = workload;
        self
    }

    pub fn team_profile(mut self, profile: TeamProfile) -> Self {
        self.ctx.team_profile = profile;
        self
    }

    pub fn situation(mut self, situation: Situation) -> Self {
        self.ctx.situation = situation;
        self
    }

    pub fn game_lines(mut self, lines: GameLines) -> Self {
        self.ctx.game_lines = lines;
        self
    }

    /// Record that data from `source` observed at `observed_at` went into the context.
    pub fn observe(mut self, source: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        self.ctx.provenance.push(SourceStamp {
            source: source.into(),
            observed_at,
        });
        self
    }

    pub fn build(mut self) -> EngineResult<PropContext> {
        let event_time = self
            .event_time
            .ok_or_else(|| EngineError::InvalidInput("event time is required".into()))?;
        // Default cutoff: the newest source stamp, else the event itself
        // (which validate() then rejects).
        let as_of = self
            .as_of
            .or_else(|| self.ctx.provenance.iter().map(|s| s.observed_at).max())
            .unwrap_or(event_time);
        self.ctx.event_time = event_time;
        self.ctx.as_of = as_of;
        self.ctx.validate()?;
        Ok(self.ctx)
    }
}

// ── Signal output ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    /// [-1, 1]; negative favours under, positive favours over.
    pub strength: f64,
    /// [0, 1]; how far to trust `strength`.
    pub confidence: f64,
    pub evidence: String,
}

impl SignalResult {
    /// Clamps both numbers into range. NaN collapses to zero.
    pub fn new(strength: f64, confidence: f64, evidence: impl Into<String>) -> Self {
        Self {
            strength: clamp_or_zero(strength, -1.0, 1.0),
            confidence: clamp_or_zero(confidence, 0.0, 1.0),
            evidence: evidence.into(),
        }
    }

    /// Required input absent: neutral strength, reduced confidence.
    pub fn missing(confidence: f64, evidence: impl Into<String>) -> Self {
        Self::new(0.0, confidence, evidence)
    }

    /// Heuristic does not apply to this stat type. Carries no weight.
    pub fn not_applicable(evidence: impl Into<String>) -> Self {
        Self::new(0.0, 0.0, evidence)
    }
}

#[inline]
pub(crate) fn clamp_or_zero(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(lo, hi)
    }
}

// ── DB Commands (sent to writer task via bounded channel) ──

#[derive(Debug)]
pub enum DbCommand {
    InsertEdgeResult {
        id: String,
        run_id: Option<String>,
        entity_id: String,
        stat_type: String,
        event_time: String,
        direction: String,
        edge_pct: f64,
        model_probability: f64,
        market_probability: f64,
        confidence: f64,
        payload: String,
        created_at: String,
    },
    InsertBacktestRun {
        run_id: String,
        league: String,
        label: String,
        created_at: String,
        settled: i64,
        hit_rate: Option<f64>,
        config: String,
        summary: String,
    },
}
