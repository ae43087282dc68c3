//! Strategies executed by the trading bridge.
//!
//! Enhanced: requires the API key and a bridge that advertises enhanced
//! analysis on `/v2/capabilities`; runs through `POST /v2/cycle`.
//! Basic: no probe, key optional; runs through `POST /v1/cycle`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use secrecy::Secret;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{ExecutionStrategy, RunSummary, StrategyFactory, StrategyVariant};
use crate::analysis::bridge::BridgeAnalyzer;
use crate::analysis::{BasicAnalysis, EnhancedAnalysis};
use crate::bridge::{BridgeClient, Capabilities};
use crate::config::{AppConfig, BridgeConfig};
use crate::types::OperationalSettings;

/// Retries for a strategy run the bridge never accepted (connect failure,
/// 429). The run places orders, so a timeout or 5xx is never repeated.
const RUN_MAX_RETRIES: u32 = 3;

pub struct BridgeStrategyFactory {
    config: BridgeConfig,
}

impl BridgeStrategyFactory {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    fn client(&self, api_key: Option<String>) -> Result<Arc<BridgeClient>> {
        let client = BridgeClient::new(
            &self.config.base_url,
            api_key.map(Secret::new),
            Duration::from_secs(self.config.timeout_secs),
        )?;
        Ok(Arc::new(client))
    }
}

#[async_trait]
impl StrategyFactory for BridgeStrategyFactory {
    async fn build_enhanced(&self) -> Result<Box<dyn ExecutionStrategy>> {
        let api_key = AppConfig::resolve_env(&self.config.api_key_env)
            .context("Enhanced strategy needs the bridge API key")?;
        let client = self.client(Some(api_key))?;

        let caps: Capabilities = client
            .get_json("/v2/capabilities", &[])
            .await
            .context("Capability probe failed")?;
        if !caps.enhanced_analysis {
            bail!(
                "Bridge at {} does not offer enhanced analysis (version {})",
                client.base_url(),
                caps.version.as_deref().unwrap_or("unknown")
            );
        }

        info!(bridge = %client.base_url(), version = ?caps.version, "Enhanced strategy ready");
        Ok(Box::new(BridgeStrategy::new(StrategyVariant::Enhanced, client)))
    }

    async fn build_basic(&self) -> Result<Box<dyn ExecutionStrategy>> {
        let api_key = AppConfig::resolve_env(&self.config.api_key_env).ok();
        let client = self.client(api_key)?;
        debug!(bridge = %client.base_url(), authenticated = client.has_api_key(), "Basic strategy ready");
        Ok(Box::new(BridgeStrategy::new(StrategyVariant::Basic, client)))
    }
}

#[derive(Serialize)]
struct CycleRequest<'a> {
    settings: &'a OperationalSettings,
}

pub struct BridgeStrategy {
    name: String,
    variant: StrategyVariant,
    analyzer: Arc<BridgeAnalyzer>,
    client: Arc<BridgeClient>,
}

impl BridgeStrategy {
    pub fn new(variant: StrategyVariant, client: Arc<BridgeClient>) -> Self {
        Self {
            name: format!("bridge-{variant}"),
            variant,
            analyzer: Arc::new(BridgeAnalyzer::new(client.clone())),
            client,
        }
    }

    fn cycle_path(&self) -> &'static str {
        match self.variant {
            StrategyVariant::Enhanced => "/v2/cycle",
            StrategyVariant::Basic => "/v1/cycle",
        }
    }
}

#[async_trait]
impl ExecutionStrategy for BridgeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, settings: &OperationalSettings) -> Result<RunSummary> {
        let path = self.cycle_path();
        let summary: RunSummary = self
            .client
            .post_json(path, &CycleRequest { settings }, RUN_MAX_RETRIES)
            .await
            .with_context(|| format!("POST {path} failed"))?;
        Ok(summary)
    }

    fn basic_analysis(&self) -> Arc<dyn BasicAnalysis> {
        self.analyzer.clone()
    }

    fn enhanced_analysis(&self) -> Option<Arc<dyn EnhancedAnalysis>> {
        match self.variant {
            StrategyVariant::Enhanced => Some(self.analyzer.clone()),
            StrategyVariant::Basic => None,
        }
    }
}
