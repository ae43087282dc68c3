//! Analysis capability.
//!
//! The signal generator is opaque to the orchestrator. It is reached
//! through one of two entry points:
//! - `EnhancedAnalysis` takes the trading type, returns a full result
//! - `BasicAnalysis` takes the symbol only; strength and trading type are filled
//!   in by the caller
//!
//! `Analyzer` is the variant chosen once per cycle by probing the
//! execution strategy for the enhanced entry point.

pub mod bridge;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::strategy::ExecutionStrategy;
use crate::types::{AnalysisResult, BasicSignal, Strength, TradableInstrument, TradingType};

/// Strength attached to results from the basic entry point.
pub const DEFAULT_STRENGTH: Strength = Strength::Moderate;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// How an analysis call failed. Drives skip-versus-continue handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisErrorKind {
    /// The collaborator gave up waiting on upstream data.
    Timeout,
    /// Degenerate market data (zero volume, flat candles, ...).
    DivisionByZero,
    Other,
}

impl AnalysisErrorKind {
    /// Timeouts and degenerate data abandon the item with a skip.
    pub fn is_skip(&self) -> bool {
        matches!(self, AnalysisErrorKind::Timeout | AnalysisErrorKind::DivisionByZero)
    }
}

impl fmt::Display for AnalysisErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisErrorKind::Timeout => write!(f, "timeout"),
            AnalysisErrorKind::DivisionByZero => write!(f, "division by zero"),
            AnalysisErrorKind::Other => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("analysis {kind}: {message}")]
pub struct AnalysisError {
    pub kind: AnalysisErrorKind,
    pub message: String,
}

impl AnalysisError {
    pub fn new(kind: AnalysisErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::Timeout, message)
    }

    pub fn division_by_zero(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::DivisionByZero, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::Other, message)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Richer analysis entry point aware of the market being traded.
#[async_trait]
pub trait EnhancedAnalysis: Send + Sync {
    async fn analyze(
        &self,
        symbol: &str,
        trading_type: TradingType,
    ) -> Result<AnalysisResult, AnalysisError>;
}

/// Minimal analysis entry point.
#[async_trait]
pub trait BasicAnalysis: Send + Sync {
    async fn analyze(&self, symbol: &str) -> Result<BasicSignal, AnalysisError>;
}

/// The analysis variant used for a whole cycle.
#[derive(Clone)]
pub enum Analyzer {
    Enhanced(Arc<dyn EnhancedAnalysis>),
    Basic(Arc<dyn BasicAnalysis>),
}

impl Analyzer {
    /// Prefer the strategy's enhanced entry point when it offers one.
    pub fn probe(strategy: &dyn ExecutionStrategy) -> Self {
        match strategy.enhanced_analysis() {
            Some(enhanced) => Analyzer::Enhanced(enhanced),
            None => Analyzer::Basic(strategy.basic_analysis()),
        }
    }

    pub fn is_enhanced(&self) -> bool {
        matches!(self, Analyzer::Enhanced(_))
    }

    pub fn variant(&self) -> &'static str {
        match self {
            Analyzer::Enhanced(_) => "enhanced",
            Analyzer::Basic(_) => "basic",
        }
    }

    /// Analyse one instrument. Results from the basic path carry
    /// `DEFAULT_STRENGTH` and the instrument's own trading type.
    pub async fn analyze(
        &self,
        instrument: &TradableInstrument,
    ) -> Result<AnalysisResult, AnalysisError> {
        let result = match self {
            Analyzer::Enhanced(analysis) => {
                analysis
                    .analyze(&instrument.symbol, instrument.trading_type)
                    .await?
            }
            Analyzer::Basic(analysis) => {
                let basic = analysis.analyze(&instrument.symbol).await?;
                AnalysisResult {
                    symbol: instrument.symbol.clone(),
                    signal: basic.signal,
                    confidence: basic.confidence,
                    strength: Some(DEFAULT_STRENGTH),
                    trading_type: instrument.trading_type,
                }
            }
        };
        Ok(result.clamp_confidence())
    }
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Analyzer::{}", self.variant())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
