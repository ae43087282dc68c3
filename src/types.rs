//! Shared types for the trading-cycle orchestrator.
//!
//! These types form the data model used across all modules: the
//! operational settings snapshot, the instrument registry entries,
//! analysis results, notifications and log records, plus the fatal
//! cycle error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Operational settings
// ---------------------------------------------------------------------------

/// Live operational switches, edited by the administrative surface and read
/// once per cycle. The orchestrator never writes this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalSettings {
    pub trading_enabled: bool,
    pub ai_enabled: bool,
    /// Overrides every other flag when set.
    pub emergency_stop: bool,
    pub spot_trading_enabled: bool,
    pub futures_trading_enabled: bool,
    /// Fraction of balance risked per trade (0.0 to 1.0).
    pub max_risk_per_trade: f64,
    /// Minimum signal confidence the execution strategy will act on.
    pub min_confidence: f64,
    pub max_open_positions: u32,
    pub updated_at: DateTime<Utc>,
}

impl Default for OperationalSettings {
    fn default() -> Self {
        Self {
            trading_enabled: false,
            ai_enabled: false,
            emergency_stop: false,
            spot_trading_enabled: true,
            futures_trading_enabled: false,
            max_risk_per_trade: 0.02,
            min_confidence: 0.7,
            max_open_positions: 5,
            updated_at: Utc::now(),
        }
    }
}

impl OperationalSettings {
    /// Whether instruments of `trading_type` may be analysed under these
    /// settings. BOTH is eligible while at least one market is open.
    pub fn allows(&self, trading_type: TradingType) -> bool {
        match trading_type {
            TradingType::Spot => self.spot_trading_enabled,
            TradingType::Futures => self.futures_trading_enabled,
            TradingType::Both => self.spot_trading_enabled || self.futures_trading_enabled,
        }
    }
}

// ---------------------------------------------------------------------------
// Instruments
// ---------------------------------------------------------------------------

/// Market an instrument is traded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingType {
    Spot,
    Futures,
    Both,
}

impl TradingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingType::Spot => "SPOT",
            TradingType::Futures => "FUTURES",
            TradingType::Both => "BOTH",
        }
    }
}

impl fmt::Display for TradingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradingType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SPOT" => Ok(TradingType::Spot),
            "FUTURES" | "FUTURE" => Ok(TradingType::Futures),
            "BOTH" => Ok(TradingType::Both),
            _ => anyhow::bail!("Unknown trading type: {s}"),
        }
    }
}

/// A tradable symbol from the instrument registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradableInstrument {
    pub symbol: String,
    pub trading_type: TradingType,
    pub enabled: bool,
}

impl TradableInstrument {
    pub fn new(symbol: impl Into<String>, trading_type: TradingType, enabled: bool) -> Self {
        Self {
            symbol: symbol.into(),
            trading_type,
            enabled,
        }
    }
}

impl fmt::Display for TradableInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.trading_type)
    }
}

// ---------------------------------------------------------------------------
// Analysis results
// ---------------------------------------------------------------------------

/// Categorical output of an analysis call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
    StrongBuy,
    StrongSell,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
            Signal::StrongBuy => write!(f, "STRONG_BUY"),
            Signal::StrongSell => write!(f, "STRONG_SELL"),
        }
    }
}

/// Optional qualifier of a signal's intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strength::Weak => write!(f, "WEAK"),
            Strength::Moderate => write!(f, "MODERATE"),
            Strength::Strong => write!(f, "STRONG"),
            Strength::VeryStrong => write!(f, "VERY_STRONG"),
        }
    }
}

/// Outcome of analysing one instrument during one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub signal: Signal,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub strength: Option<Strength>,
    pub trading_type: TradingType,
}

impl AnalysisResult {
    /// Confidence clamped into `[0, 1]`; collaborators occasionally
    /// report slightly out-of-range values.
    pub fn clamp_confidence(mut self) -> Self {
        self.confidence = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        self
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] {:.1}% ({})",
            self.symbol,
            self.signal,
            self.strength
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.confidence * 100.0,
            self.trading_type,
        )
    }
}

/// What the basic analysis entry point returns: no strength, no trading type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasicSignal {
    pub signal: Signal,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        }
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Priority::Low),
            "NORMAL" => Ok(Priority::Normal),
            "HIGH" => Ok(Priority::High),
            "URGENT" => Ok(Priority::Urgent),
            _ => anyhow::bail!("Unknown priority: {s}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Signal,
    Trade,
    System,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Signal => "SIGNAL",
            NotificationKind::Trade => "TRADE",
            NotificationKind::System => "SYSTEM",
            NotificationKind::Error => "ERROR",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SIGNAL" => Ok(NotificationKind::Signal),
            "TRADE" => Ok(NotificationKind::Trade),
            "SYSTEM" => Ok(NotificationKind::System),
            "ERROR" => Ok(NotificationKind::Error),
            _ => anyhow::bail!("Unknown notification type: {s}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationCategory {
    Ai,
    Trading,
    System,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Ai => "AI",
            NotificationCategory::Trading => "TRADING",
            NotificationCategory::System => "SYSTEM",
        }
    }
}

impl FromStr for NotificationCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AI" => Ok(NotificationCategory::Ai),
            "TRADING" => Ok(NotificationCategory::Trading),
            "SYSTEM" => Ok(NotificationCategory::System),
            _ => anyhow::bail!("Unknown notification category: {s}"),
        }
    }
}

/// A user-facing notification. Marked read or expired by the
/// administrative surface, never by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Log records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Levels kept under the long retention window.
    pub const CRITICAL: &'static [LogLevel] = &[LogLevel::Error, LogLevel::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            _ => anyhow::bail!("Unknown log level: {s}"),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted operational log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub category: String,
    pub message: String,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Cycle outcomes
// ---------------------------------------------------------------------------

/// Why a cycle intentionally did nothing. Skips exit with status 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    EmergencyStop,
    TradingDisabled,
    AiDisabled,
    CycleInProgress,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmergencyStop => write!(f, "emergency stop is active"),
            SkipReason::TradingDisabled => write!(f, "trading is disabled"),
            SkipReason::AiDisabled => write!(f, "AI signal generation is disabled"),
            SkipReason::CycleInProgress => write!(f, "another cycle is still running"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Fatal cycle errors. Any of these ends the invocation with exit code 1;
/// the next scheduled invocation starts from scratch.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store unreachable: {0}")]
    Connectivity(String),

    #[error("No execution strategy could be constructed: {0}")]
    StrategyUnavailable(String),

    #[error("Strategy run failed ({strategy}): {message}")]
    StrategyRun { strategy: String, message: String },
}

impl CycleError {
    /// Process exit code conveyed to the scheduler.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
