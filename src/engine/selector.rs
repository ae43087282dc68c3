//! Strategy selection with graceful degradation.

use serde_json::json;
use tracing::debug;

use super::journal::{category, CycleLogger};
use crate::analysis::Analyzer;
use crate::strategy::{ExecutionStrategy, StrategyFactory, StrategyVariant};
use crate::types::CycleError;

/// The strategy and analysis capability used for a whole cycle.
pub struct Selection {
    pub strategy: Box<dyn ExecutionStrategy>,
    pub variant: StrategyVariant,
    pub analyzer: Analyzer,
    /// The enhanced strategy was attempted and failed.
    pub degraded: bool,
}

pub struct StrategySelector<'a> {
    factory: &'a dyn StrategyFactory,
    try_enhanced: bool,
}

impl<'a> StrategySelector<'a> {
    pub fn new(factory: &'a dyn StrategyFactory, try_enhanced: bool) -> Self {
        Self {
            factory,
            try_enhanced,
        }
    }

    pub async fn select(&self, log: &CycleLogger<'_>) -> Result<Selection, CycleError> {
        let mut degraded = false;

        if self.try_enhanced {
            match self.factory.build_enhanced().await {
                Ok(strategy) => return Ok(Self::finish(strategy, StrategyVariant::Enhanced, false)),
                Err(e) => {
                    log.warning(
                        category::STRATEGY,
                        "Enhanced strategy unavailable, degrading to basic",
                        json!({ "error": format!("{e:#}") }),
                    )
                    .await;
                    degraded = true;
                }
            }
        } else {
            debug!("Enhanced strategy disabled by configuration");
        }

        match self.factory.build_basic().await {
            Ok(strategy) => Ok(Self::finish(strategy, StrategyVariant::Basic, degraded)),
            Err(e) => {
                let message = format!("basic strategy: {e:#}");
                log.error(
                    category::STRATEGY,
                    "No execution strategy could be constructed",
                    json!({ "error": message }),
                )
                .await;
                Err(CycleError::StrategyUnavailable(message))
            }
        }
    }

    fn finish(
        strategy: Box<dyn ExecutionStrategy>,
        variant: StrategyVariant,
        degraded: bool,
    ) -> Selection {
        let analyzer = Analyzer::probe(strategy.as_ref());
        debug!(
            strategy = strategy.name(),
            variant = %variant,
            analyzer = analyzer.variant(),
            "Strategy selected"
        );
        Selection {
            strategy,
            variant,
            analyzer,
            degraded,
        }
    }
}
