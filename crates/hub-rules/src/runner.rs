//! Event loop driving the rule engine
//!
//! The `RuleRunner` feeds every bus event to the engine, one at a time in
//! arrival order, and runs the periodic sweep for state-only rules.

use hub_event_bus::EventBus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::engine::RuleEngine;

/// Default interval of the periodic sweep
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct RuleRunner {
    engine: Arc<RuleEngine>,
    event_bus: Arc<EventBus>,
    sweep_interval: Duration,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
}

impl RuleRunner {
    pub fn new(engine: Arc<RuleEngine>, event_bus: Arc<EventBus>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            engine,
            event_bus,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn engine(&self) -> Arc<RuleEngine> {
        self.engine.clone()
    }

    /// Start processing events
    ///
    /// Subscribes to all events before returning, so nothing fired after this
    /// call is missed.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Rule runner already running");
            return;
        }

        info!(sweep_interval = ?self.sweep_interval, "Starting rule runner");

        let mut event_rx = self.event_bus.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let engine = self.engine.clone();
        let running = self.running.clone();
        let sweep_interval = self.sweep_interval;

        tokio::spawn(async move {
            let mut sweep = tokio::time::interval(sweep_interval);
            sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    event_result = event_rx.recv() => {
                        match event_result {
                            Ok(event) => engine.process_event(&event).await,
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("Rule runner lagged by {} events", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("Event bus closed, stopping rule runner");
                                break;
                            }
                        }
                    }
                    _ = sweep.tick() => {
                        engine.sweep().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal");
                        break;
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            info!("Rule runner stopped");
        });
    }

    /// Stop the runner
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        info!("Stopping rule runner");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::RuleNotification;
    use crate::rule::Rule;
    use crate::rule_action::{RuleAction, RuleActionParam};
    use crate::state_descriptor::StateDescriptor;
    use crate::state_evaluator::StateEvaluator;
    use crate::storage::MemoryRuleStorage;
    use crate::test_support::Home;
    use hub_core::ValueOperator;

    #[tokio::test]
    async fn test_state_change_activates_state_rule() {
        let home = Home::new();
        let sensor = home.add_sensor("Outside");
        let lamp = home.add_lamp("Porch");
        let engine = Arc::new(RuleEngine::new(
            home.things.clone(),
            home.things.clone(),
            Arc::new(MemoryRuleStorage::new()),
        ));

        let rule = Rule::new("Cold")
            .with_condition(StateEvaluator::leaf(StateDescriptor::for_thing(
                sensor,
                home.temperature,
                ValueOperator::LessThan,
                5.0,
            )))
            .with_action(
                RuleAction::for_thing(lamp, home.set_power)
                    .with_param(RuleActionParam::value(home.power_param, true)),
            );
        let rule_id = rule.id;
        engine.add_rule(rule).await.unwrap();

        let runner = RuleRunner::new(engine.clone(), home.bus.clone())
            .with_sweep_interval(Duration::from_secs(3600));
        runner.start();
        assert!(runner.is_running());

        let mut notifications = engine.subscribe();
        home.things
            .set_state_value(&sensor, &home.temperature, 2.5)
            .unwrap();
        let notification = tokio::time::timeout(Duration::from_secs(1), notifications.recv())
            .await
            .expect("timed out waiting for the rule to activate")
            .unwrap();
        assert!(matches!(
            notification,
            RuleNotification::RuleActiveChanged { rule_id: id, active: true } if id == rule_id
        ));
        assert!(engine.rule(&rule_id).await.unwrap().is_active());

        runner.stop();
        tokio::time::timeout(Duration::from_secs(1), async {
            while runner.is_running() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("runner did not stop");
    }
}
