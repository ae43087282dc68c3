//! Analysis served by the trading bridge.
//!
//! `GET /v2/analyze/{symbol}?trading_type=...` backs the enhanced entry
//! point, `GET /v1/analyze/{symbol}` the basic one. Analysis calls are
//! never retried; the loop decides what a failure means.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::{AnalysisError, AnalysisErrorKind, BasicAnalysis, EnhancedAnalysis};
use crate::bridge::{BridgeClient, BridgeError};
use crate::types::{AnalysisResult, BasicSignal, Signal, Strength, TradingType};

/// v2 payload. Symbol and trading type are echoed back by current bridges
/// but older builds omit them.
#[derive(Debug, Deserialize)]
struct EnhancedPayload {
    #[serde(default)]
    symbol: Option<String>,
    signal: Signal,
    confidence: f64,
    #[serde(default)]
    strength: Option<Strength>,
    #[serde(default)]
    trading_type: Option<TradingType>,
}

pub struct BridgeAnalyzer {
    client: Arc<BridgeClient>,
}

impl BridgeAnalyzer {
    pub fn new(client: Arc<BridgeClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EnhancedAnalysis for BridgeAnalyzer {
    async fn analyze(
        &self,
        symbol: &str,
        trading_type: TradingType,
    ) -> Result<AnalysisResult, AnalysisError> {
        let path = format!("/v2/analyze/{}", urlencoding::encode(symbol));
        let payload: EnhancedPayload = self
            .client
            .get_json(&path, &[("trading_type", trading_type.as_str())])
            .await
            .map_err(into_analysis_error)?;
        debug!(symbol, signal = %payload.signal, confidence = payload.confidence, "Enhanced analysis");

        Ok(AnalysisResult {
            symbol: payload.symbol.unwrap_or_else(|| symbol.to_string()),
            signal: payload.signal,
            confidence: payload.confidence,
            strength: payload.strength,
            trading_type: payload.trading_type.unwrap_or(trading_type),
        })
    }
}

#[async_trait]
impl BasicAnalysis for BridgeAnalyzer {
    async fn analyze(&self, symbol: &str) -> Result<BasicSignal, AnalysisError> {
        let path = format!("/v1/analyze/{}", urlencoding::encode(symbol));
        let signal: BasicSignal = self
            .client
            .get_json(&path, &[])
            .await
            .map_err(into_analysis_error)?;
        debug!(symbol, signal = %signal.signal, confidence = signal.confidence, "Basic analysis");
        Ok(signal)
    }
}

/// Map a bridge failure onto the tagged analysis error kinds.
pub(crate) fn into_analysis_error(err: BridgeError) -> AnalysisError {
    let kind = match &err {
        BridgeError::Timeout(_) => AnalysisErrorKind::Timeout,
        BridgeError::Remote { kind: Some(k), .. } => match k.as_str() {
            "timeout" => AnalysisErrorKind::Timeout,
            "division_by_zero" => AnalysisErrorKind::DivisionByZero,
            _ => AnalysisErrorKind::Other,
        },
        _ => AnalysisErrorKind::Other,
    };
    let message = match err {
        BridgeError::Remote { message, .. } if !message.is_empty() => message,
        other => other.to_string(),
    };
    AnalysisError::new(kind, message)
}
