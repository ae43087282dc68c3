//! Config gate: decides from the settings snapshot whether this cycle may
//! proceed.

use crate::types::{CycleError, OperationalSettings, SkipReason};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision<'a> {
    Allow(&'a OperationalSettings),
    Deny(SkipReason),
}

#[derive(Debug, Clone, Copy)]
pub struct ConfigGate {
    /// When set, `ai_enabled = false` denies the whole cycle. Otherwise the
    /// strategy still runs and only the analysis loop is skipped.
    pub require_ai: bool,
}

impl Default for ConfigGate {
    fn default() -> Self {
        Self { require_ai: true }
    }
}

impl ConfigGate {
    pub fn new(require_ai: bool) -> Self {
        Self { require_ai }
    }

    /// Checks are ordered: absent record, emergency stop, trading switch,
    /// AI switch.
    pub fn evaluate<'a>(
        &self,
        settings: Option<&'a OperationalSettings>,
    ) -> Result<GateDecision<'a>, CycleError> {
        let settings = settings.ok_or_else(|| {
            CycleError::Configuration("operational settings record is missing".into())
        })?;

        if settings.emergency_stop {
            return Ok(GateDecision::Deny(SkipReason::EmergencyStop));
        }
        if !settings.trading_enabled {
            return Ok(GateDecision::Deny(SkipReason::TradingDisabled));
        }
        if !settings.ai_enabled && self.require_ai {
            return Ok(GateDecision::Deny(SkipReason::AiDisabled));
        }
        Ok(GateDecision::Allow(settings))
    }
}
