//! Home automation hub
//!
//! Usage: `hub [CONFIG_DIR]`. The config directory defaults to
//! `$HUB_CONFIG_DIR`, then the working directory.

use anyhow::{Context, Result};
use hub_config::HubConfig;
use hub_event_bus::EventBus;
use hub_rules::{
    JsonRuleStorage, RuleEngine, RuleLogEntry, RuleNotification, RuleRunner, SharedRuleEngine,
};
use hub_things::{SharedThingManager, ThingManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// The running hub
pub struct Hub {
    /// Event bus for thing events
    pub bus: Arc<EventBus>,
    /// Things, their states and action handlers
    pub things: SharedThingManager,
    pub engine: SharedRuleEngine,
    runner: RuleRunner,
}

impl Hub {
    /// Wire the hub together and load the stored rules
    pub async fn start(config: &HubConfig, config_dir: &Path) -> Result<Self> {
        let bus = Arc::new(EventBus::with_capacity(config.event_bus.capacity));
        let things = Arc::new(ThingManager::new(bus.clone()));

        let storage_dir = config.storage_dir(config_dir);
        info!(?storage_dir, "Using rule storage");
        let storage = Arc::new(JsonRuleStorage::new(&storage_dir));

        let engine = Arc::new(RuleEngine::new(things.clone(), things.clone(), storage));
        tokio::spawn(report_notifications(engine.subscribe()));
        tokio::spawn(report_log(engine.subscribe_log()));

        let loaded = engine
            .load()
            .await
            .with_context(|| format!("failed to load rules from {}", storage_dir.display()))?;
        info!(count = loaded, "Rules loaded");

        let runner = RuleRunner::new(engine.clone(), bus.clone())
            .with_sweep_interval(config.rules.sweep_interval());
        runner.start();

        Ok(Self {
            bus,
            things,
            engine,
            runner,
        })
    }

    pub fn stop(&self) {
        self.runner.stop();
    }
}

async fn report_notifications(mut rx: broadcast::Receiver<RuleNotification>) {
    loop {
        match rx.recv().await {
            Ok(notification) => {
                debug!(rule_id = %notification.rule_id(), ?notification, "Rule notification")
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Notification reporter lagged by {} notifications", n)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn report_log(mut rx: broadcast::Receiver<RuleLogEntry>) {
    loop {
        match rx.recv().await {
            Ok(entry) => info!(
                rule_id = %entry.rule_id,
                kind = ?entry.kind,
                value = ?entry.value,
                timestamp = %entry.timestamp,
                "Rule log"
            ),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Rule log reporter lagged by {} entries", n)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn config_dir() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HUB_CONFIG_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = config_dir();
    let config = HubConfig::load(&config_dir)
        .with_context(|| format!("failed to load configuration from {}", config_dir.display()))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(name = %config.name, ?config_dir, "Starting hub");

    let hub = Hub::start(&config, &config_dir).await?;
    info!(
        things = hub.things.thing_count(),
        rules = hub.engine.rule_ids().await.len(),
        subscribers = hub.bus.subscriber_count(),
        "Hub is running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    hub.stop();
    hub.engine.wait_for_pending_actions().await;

    Ok(())
}
