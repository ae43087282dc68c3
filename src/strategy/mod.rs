//! Execution strategies.
//!
//! A strategy performs the trading work of one cycle (order placement,
//! position management) and exposes the analysis entry points it was built
//! with. Strategies come from a `StrategyFactory` in two variants; the
//! selector prefers the enhanced one and degrades to basic.

pub mod bridge;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::analysis::{BasicAnalysis, EnhancedAnalysis};
use crate::types::OperationalSettings;

/// What a strategy run reports back. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default)]
    pub orders_placed: u32,
    #[serde(default)]
    pub positions_closed: u32,
    #[serde(default)]
    pub note: Option<String>,
}

/// One constructed execution strategy.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Perform the cycle's trading work under `settings`. Called exactly
    /// once per cycle.
    async fn execute(&self, settings: &OperationalSettings) -> Result<RunSummary>;

    /// The symbol-only analysis entry point every strategy offers.
    fn basic_analysis(&self) -> Arc<dyn BasicAnalysis>;

    /// The trading-type-aware entry point, when supported.
    fn enhanced_analysis(&self) -> Option<Arc<dyn EnhancedAnalysis>> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyVariant {
    Enhanced,
    Basic,
}

impl fmt::Display for StrategyVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyVariant::Enhanced => write!(f, "enhanced"),
            StrategyVariant::Basic => write!(f, "basic"),
        }
    }
}

/// Builds strategies. Construction may fail for either variant
/// (missing dependency, unreachable service, misconfiguration).
#[async_trait]
pub trait StrategyFactory: Send + Sync {
    async fn build_enhanced(&self) -> Result<Box<dyn ExecutionStrategy>>;

    async fn build_basic(&self) -> Result<Box<dyn ExecutionStrategy>>;
}
