//! Rule engine
//!
//! The [`RuleEngine`] owns all rules, keeps an index from trigger events to
//! rules, and runs the activation state machine:
//!
//! ```text
//! Inactive --(condition holds)--> Active      fire actions
//! Active --(condition fails)--> Inactive      fire exit actions
//! ```
//!
//! Actions fire on the edge only, never again while the rule stays active.
//! Resolved actions go through one submission queue, so the actions of one
//! firing are always submitted before those of the next.

use hub_core::{Action, Event, EventTypeId, RuleId, ThingId};
use hub_things::{ActionExecutor, ThingRegistry};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::{RuleError, RuleResult};
use crate::event_descriptor::{EventDescriptor, EventSource};
use crate::notification::{RuleLogEntry, RuleLogKind, RuleNotification};
use crate::rule::Rule;
use crate::rule_action::RuleAction;
use crate::storage::RuleStorage;

/// Capacity of the notification and log channels
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// What happens to rules referencing a removed thing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovePolicy {
    /// Remove every affected rule
    Cascade,
    /// Strip the thing from every affected rule
    Update,
}

type RuleSlot = Arc<Mutex<Rule>>;

/// Work item of the submission queue
enum Submission {
    Actions { rule_id: RuleId, actions: Vec<Action> },
    /// Answered once everything queued before it has been submitted
    Barrier(oneshot::Sender<()>),
}

/// Rules and the trigger index, always updated together
#[derive(Default)]
struct RuleIndex {
    rules: IndexMap<RuleId, RuleSlot>,
    by_thing: HashMap<(ThingId, EventTypeId), Vec<RuleId>>,
    by_interface: HashMap<(String, String), Vec<RuleId>>,
    state_only: Vec<RuleId>,
}

impl RuleIndex {
    fn slot(&self, rule_id: &RuleId) -> Option<RuleSlot> {
        self.rules.get(rule_id).cloned()
    }

    fn insert(&mut self, rule: Rule) {
        self.index(&rule);
        self.rules.insert(rule.id, Arc::new(Mutex::new(rule)));
    }

    fn remove(&mut self, rule_id: &RuleId) -> Option<RuleSlot> {
        let slot = self.rules.shift_remove(rule_id)?;
        self.unindex(rule_id);
        Some(slot)
    }

    fn index(&mut self, rule: &Rule) {
        if rule.is_state_only() {
            self.state_only.push(rule.id);
            return;
        }

        for descriptor in &rule.event_descriptors {
            let ids = match &descriptor.source {
                EventSource::Thing {
                    thing_id,
                    event_type_id,
                } => self.by_thing.entry((*thing_id, *event_type_id)).or_default(),
                EventSource::Interface { interface, event } => self
                    .by_interface
                    .entry((interface.clone(), event.clone()))
                    .or_default(),
            };
            if !ids.contains(&rule.id) {
                ids.push(rule.id);
            }
        }
    }

    fn unindex(&mut self, rule_id: &RuleId) {
        self.state_only.retain(|id| id != rule_id);
        self.by_thing.retain(|_, ids| {
            ids.retain(|id| id != rule_id);
            !ids.is_empty()
        });
        self.by_interface.retain(|_, ids| {
            ids.retain(|id| id != rule_id);
            !ids.is_empty()
        });
    }

    fn reindex(&mut self, rule: &Rule) {
        self.unindex(&rule.id);
        self.index(rule);
    }
}

/// The rule engine
pub struct RuleEngine {
    registry: Arc<dyn ThingRegistry>,
    executor: Arc<dyn ActionExecutor>,
    storage: Arc<dyn RuleStorage>,
    index: Arc<RwLock<RuleIndex>>,
    notifications: broadcast::Sender<RuleNotification>,
    log: broadcast::Sender<RuleLogEntry>,
    submissions: mpsc::UnboundedSender<Submission>,
    /// Receiving end of the queue until the worker is spawned on first use
    pending_worker: std::sync::Mutex<Option<mpsc::UnboundedReceiver<Submission>>>,
}

impl RuleEngine {
    /// Create an empty engine
    pub fn new(
        registry: Arc<dyn ThingRegistry>,
        executor: Arc<dyn ActionExecutor>,
        storage: Arc<dyn RuleStorage>,
    ) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let (log, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let (submissions, queue) = mpsc::unbounded_channel();

        Self {
            registry,
            executor,
            storage,
            index: Arc::new(RwLock::new(RuleIndex::default())),
            notifications,
            log,
            submissions,
            pending_worker: std::sync::Mutex::new(Some(queue)),
        }
    }

    /// Subscribe to rule notifications
    pub fn subscribe(&self) -> broadcast::Receiver<RuleNotification> {
        self.notifications.subscribe()
    }

    /// Subscribe to rule log entries
    pub fn subscribe_log(&self) -> broadcast::Receiver<RuleLogEntry> {
        self.log.subscribe()
    }

    /// Load all stored rules
    ///
    /// Rules that fail validation are kept; [`RuleEngine::rule_is_valid`]
    /// reports them. Each rule starts in the state its condition currently
    /// evaluates to, without firing anything.
    #[instrument(skip(self))]
    pub async fn load(&self) -> RuleResult<usize> {
        let groups = self.storage.list_groups().await?;
        let mut index = self.index.write().await;
        let mut loaded = 0;

        for group_key in groups {
            let mut rule = match self.storage.load_rule(&group_key).await {
                Ok(Some(rule)) => rule,
                Ok(None) => continue,
                Err(e) => {
                    error!(%group_key, error = %e, "Failed to load rule");
                    continue;
                }
            };

            if index.rules.contains_key(&rule.id) {
                warn!(rule_id = %rule.id, "Duplicate rule in storage, skipping");
                continue;
            }

            if let Err(e) = self.validate(&rule) {
                warn!(rule_id = %rule.id, error = %e, "Loaded rule is invalid");
            }

            rule.active = rule.enabled && rule.state_evaluator.evaluate(&*self.registry);
            debug!(rule_id = %rule.id, active = rule.active, "Loaded rule");
            index.insert(rule);
            loaded += 1;
        }

        info!(count = loaded, "Loaded rules");
        Ok(loaded)
    }

    /// Add a new rule
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn add_rule(&self, mut rule: Rule) -> RuleResult<()> {
        self.validate(&rule)?;

        let mut index = self.index.write().await;
        if index.rules.contains_key(&rule.id) {
            return Err(RuleError::DuplicateRuleId(rule.id));
        }

        rule.active = rule.enabled && rule.state_evaluator.evaluate(&*self.registry);
        self.storage.save_rule(&rule.id.to_string(), &rule).await?;

        info!(name = %rule.display_name(), active = rule.active, "Added rule");
        index.insert(rule.clone());
        drop(index);

        self.emit(RuleNotification::RuleAdded(rule));
        Ok(())
    }

    /// Replace an existing rule
    ///
    /// The new rule starts in the state its condition evaluates to, without
    /// firing actions or exit actions.
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn edit_rule(&self, mut rule: Rule) -> RuleResult<()> {
        self.validate(&rule)?;

        let mut index = self.index.write().await;
        let slot = index
            .slot(&rule.id)
            .ok_or(RuleError::RuleNotFound(rule.id))?;
        let mut current = slot.lock().await;

        rule.active = rule.enabled && rule.state_evaluator.evaluate(&*self.registry);
        self.storage.save_rule(&rule.id.to_string(), &rule).await?;

        *current = rule.clone();
        drop(current);
        index.reindex(&rule);
        drop(index);

        info!(name = %rule.display_name(), active = rule.active, "Edited rule");
        self.emit(RuleNotification::RuleConfigurationChanged(rule));
        Ok(())
    }

    /// Remove a rule
    ///
    /// Actions of this rule still queued for submission are dropped.
    #[instrument(skip(self))]
    pub async fn remove_rule(&self, rule_id: &RuleId) -> RuleResult<()> {
        let mut index = self.index.write().await;
        if !index.rules.contains_key(rule_id) {
            return Err(RuleError::RuleNotFound(*rule_id));
        }

        self.storage.delete_rule_group(&rule_id.to_string()).await?;
        index.remove(rule_id);
        drop(index);

        info!("Removed rule");
        self.emit(RuleNotification::RuleRemoved(*rule_id));
        Ok(())
    }

    /// Ids of all rules matching the predicate, in insertion order
    pub async fn find_rules<F>(&self, predicate: F) -> Vec<RuleId>
    where
        F: Fn(&Rule) -> bool,
    {
        let index = self.index.read().await;
        let mut found = Vec::new();
        for (rule_id, slot) in &index.rules {
            if predicate(&*slot.lock().await) {
                found.push(*rule_id);
            }
        }
        found
    }

    /// Enable a rule and evaluate it immediately
    #[instrument(skip(self))]
    pub async fn enable_rule(&self, rule_id: &RuleId) -> RuleResult<()> {
        let index = self.index.read().await;
        let slot = index.slot(rule_id).ok_or(RuleError::RuleNotFound(*rule_id))?;
        let mut rule = slot.lock().await;

        if rule.enabled {
            debug!("Rule already enabled");
            return Ok(());
        }

        let mut updated = rule.clone();
        updated.enabled = true;
        self.storage.save_rule(&rule_id.to_string(), &updated).await?;
        rule.enabled = true;

        info!(name = %rule.display_name(), "Enabled rule");
        self.log_entry(RuleLogEntry::new(*rule_id, RuleLogKind::EnabledChange).with_value(true));
        self.emit(RuleNotification::RuleConfigurationChanged(rule.clone()));

        self.transition(&mut rule, None);
        Ok(())
    }

    /// Disable a rule
    ///
    /// An active rule becomes inactive and fires its exit actions.
    #[instrument(skip(self))]
    pub async fn disable_rule(&self, rule_id: &RuleId) -> RuleResult<()> {
        let index = self.index.read().await;
        let slot = index.slot(rule_id).ok_or(RuleError::RuleNotFound(*rule_id))?;
        let mut rule = slot.lock().await;

        if !rule.enabled {
            debug!("Rule already disabled");
            return Ok(());
        }

        let mut updated = rule.clone();
        updated.enabled = false;
        self.storage.save_rule(&rule_id.to_string(), &updated).await?;
        rule.enabled = false;

        info!(name = %rule.display_name(), "Disabled rule");
        self.log_entry(RuleLogEntry::new(*rule_id, RuleLogKind::EnabledChange).with_value(false));
        self.emit(RuleNotification::RuleConfigurationChanged(rule.clone()));

        if rule.active {
            self.deactivate(&mut rule);
        }
        Ok(())
    }

    /// Fire the actions of a rule by hand
    ///
    /// Does not change the rule's active state.
    #[instrument(skip(self))]
    pub async fn execute_actions(&self, rule_id: &RuleId) -> RuleResult<()> {
        let index = self.index.read().await;
        let slot = index.slot(rule_id).ok_or(RuleError::RuleNotFound(*rule_id))?;
        let rule = slot.lock().await;

        if !rule.executable {
            return Err(RuleError::RuleNotExecutable(*rule_id));
        }
        if rule.has_event_based_actions() {
            return Err(RuleError::ContainsEventBasedAction(*rule_id));
        }

        info!(name = %rule.display_name(), "Executing actions");
        self.fire(*rule_id, &rule.actions, None);
        self.log_entry(RuleLogEntry::new(*rule_id, RuleLogKind::ActionsExecuted));
        Ok(())
    }

    /// Fire the exit actions of a rule by hand
    #[instrument(skip(self))]
    pub async fn execute_exit_actions(&self, rule_id: &RuleId) -> RuleResult<()> {
        let index = self.index.read().await;
        let slot = index.slot(rule_id).ok_or(RuleError::RuleNotFound(*rule_id))?;
        let rule = slot.lock().await;

        if !rule.executable {
            return Err(RuleError::RuleNotExecutable(*rule_id));
        }
        if rule.has_event_based_exit_actions() {
            return Err(RuleError::ContainsEventBasedAction(*rule_id));
        }

        info!(name = %rule.display_name(), "Executing exit actions");
        self.fire(*rule_id, &rule.exit_actions, None);
        self.log_entry(RuleLogEntry::new(*rule_id, RuleLogKind::ExitActionsExecuted));
        Ok(())
    }

    /// Wait until every action queued so far has been submitted
    pub async fn wait_for_pending_actions(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.enqueue(Submission::Barrier(done_tx));
        // A dropped barrier means the worker is gone; nothing is pending then
        let _ = done_rx.await;
    }

    /// Get a copy of a rule
    pub async fn rule(&self, rule_id: &RuleId) -> Option<Rule> {
        let slot = self.index.read().await.slot(rule_id)?;
        let rule = slot.lock().await.clone();
        Some(rule)
    }

    /// Copies of all rules, in insertion order
    pub async fn rules(&self) -> Vec<Rule> {
        let index = self.index.read().await;
        let mut rules = Vec::with_capacity(index.rules.len());
        for slot in index.rules.values() {
            rules.push(slot.lock().await.clone());
        }
        rules
    }

    pub async fn rule_ids(&self) -> Vec<RuleId> {
        self.index.read().await.rules.keys().copied().collect()
    }

    /// Whether a rule still refers to existing things, states and actions
    pub async fn rule_is_valid(&self, rule_id: &RuleId) -> RuleResult<bool> {
        let rule = self
            .rule(rule_id)
            .await
            .ok_or(RuleError::RuleNotFound(*rule_id))?;
        Ok(self.validate(&rule).is_ok())
    }

    /// Rules referencing the thing anywhere
    pub async fn rules_for_thing(&self, thing_id: &ThingId) -> Vec<RuleId> {
        self.find_rules(|rule| rule.contains_thing(thing_id)).await
    }

    /// Deal with rules referencing a thing that is being removed
    ///
    /// Returns the affected rule ids.
    #[instrument(skip(self))]
    pub async fn remove_thing(
        &self,
        thing_id: &ThingId,
        policy: RemovePolicy,
    ) -> RuleResult<Vec<RuleId>> {
        let affected = self.rules_for_thing(thing_id).await;

        match policy {
            RemovePolicy::Cascade => {
                for rule_id in &affected {
                    match self.remove_rule(rule_id).await {
                        Ok(()) | Err(RuleError::RuleNotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
            }
            RemovePolicy::Update => {
                let mut index = self.index.write().await;
                for rule_id in &affected {
                    let Some(slot) = index.slot(rule_id) else {
                        continue;
                    };
                    let mut rule = slot.lock().await;
                    rule.remove_thing(thing_id);
                    self.storage.save_rule(&rule_id.to_string(), &rule).await?;
                    let updated = rule.clone();
                    drop(rule);

                    index.reindex(&updated);
                    debug!(%rule_id, "Removed thing from rule");
                    self.emit(RuleNotification::RuleConfigurationChanged(updated));
                }
            }
        }

        info!(count = affected.len(), ?policy, "Updated rules for removed thing");
        Ok(affected)
    }

    /// Run every rule triggered by the event
    ///
    /// State-change events also re-evaluate state-only rules that reference
    /// the emitting thing or one of its interfaces.
    #[instrument(skip(self, event), fields(thing_id = %event.thing_id, event_type_id = %event.event_type_id))]
    pub async fn process_event(&self, event: &Event) {
        let registry = &*self.registry;
        let index = self.index.read().await;
        let interfaces = registry.thing_interfaces(&event.thing_id);

        let mut candidates: IndexSet<RuleId> = IndexSet::new();
        if let Some(ids) = index.by_thing.get(&(event.thing_id, event.event_type_id)) {
            candidates.extend(ids.iter().copied());
        }
        if !index.by_interface.is_empty() {
            if let Some(name) = registry.event_type_name(&event.thing_id, &event.event_type_id) {
                for interface in &interfaces {
                    if let Some(ids) = index.by_interface.get(&(interface.clone(), name.clone())) {
                        candidates.extend(ids.iter().copied());
                    }
                }
            }
        }

        trace!(candidates = candidates.len(), "Dispatching event");

        for rule_id in &candidates {
            let Some(slot) = index.slot(rule_id) else {
                continue;
            };
            let mut rule = slot.lock().await;

            if !rule.enabled {
                trace!(%rule_id, "Rule disabled, ignoring trigger");
                continue;
            }
            if !rule
                .event_descriptors
                .iter()
                .any(|descriptor| descriptor.matches(event, registry))
            {
                continue;
            }

            debug!(%rule_id, "Rule triggered");
            self.log_entry(RuleLogEntry::new(*rule_id, RuleLogKind::Trigger));
            self.transition(&mut rule, Some(event));
        }

        if event.state_change {
            for rule_id in &index.state_only {
                let Some(slot) = index.slot(rule_id) else {
                    continue;
                };
                let mut rule = slot.lock().await;
                if !rule.enabled {
                    continue;
                }

                let references = rule.state_evaluator.contains_thing(&event.thing_id)
                    || rule
                        .state_evaluator
                        .interfaces()
                        .iter()
                        .any(|i| interfaces.contains(i));
                if references {
                    trace!(%rule_id, "Re-evaluating state rule");
                    self.transition(&mut rule, None);
                }
            }
        }
    }

    /// Periodic re-evaluation
    ///
    /// State-only rules run the full transition. Rules with triggers only
    /// ever deactivate here; activating them needs a trigger event.
    pub async fn sweep(&self) {
        let index = self.index.read().await;
        trace!(rules = index.rules.len(), "Sweeping rules");

        for slot in index.rules.values() {
            let mut rule = slot.lock().await;
            if !rule.enabled {
                continue;
            }

            if rule.is_state_only() {
                self.transition(&mut rule, None);
            } else if rule.active && !rule.state_evaluator.evaluate(&*self.registry) {
                self.deactivate(&mut rule);
            }
        }
    }

    /// The activation state machine
    fn transition(&self, rule: &mut Rule, trigger: Option<&Event>) {
        let satisfied = rule.enabled && rule.state_evaluator.evaluate(&*self.registry);

        match (rule.active, satisfied) {
            (false, true) => self.activate(rule, trigger),
            (true, false) => self.deactivate(rule),
            (active, _) => trace!(rule_id = %rule.id, active, "No activation change"),
        }
    }

    fn activate(&self, rule: &mut Rule, trigger: Option<&Event>) {
        rule.active = true;
        info!(rule_id = %rule.id, name = %rule.display_name(), "Rule active");

        self.emit(RuleNotification::RuleActiveChanged {
            rule_id: rule.id,
            active: true,
        });
        self.log_entry(RuleLogEntry::new(rule.id, RuleLogKind::ActiveChange).with_value(true));

        self.fire(rule.id, &rule.actions, trigger);
        self.log_entry(RuleLogEntry::new(rule.id, RuleLogKind::ActionsExecuted));
    }

    fn deactivate(&self, rule: &mut Rule) {
        rule.active = false;
        info!(rule_id = %rule.id, name = %rule.display_name(), "Rule inactive");

        self.emit(RuleNotification::RuleActiveChanged {
            rule_id: rule.id,
            active: false,
        });
        self.log_entry(RuleLogEntry::new(rule.id, RuleLogKind::ActiveChange).with_value(false));

        if !rule.exit_actions.is_empty() {
            self.fire(rule.id, &rule.exit_actions, None);
            self.log_entry(RuleLogEntry::new(rule.id, RuleLogKind::ExitActionsExecuted));
        }
    }

    /// Resolve the templates now and queue the actions for submission
    fn fire(&self, rule_id: RuleId, templates: &[RuleAction], trigger: Option<&Event>) {
        let mut actions = Vec::new();
        for template in templates {
            match template.resolve(trigger, &*self.registry, rule_id) {
                Ok(resolved) => actions.extend(resolved),
                Err(e) => warn!(%rule_id, error = %e, "Skipping rule action"),
            }
        }

        if actions.is_empty() {
            return;
        }

        trace!(%rule_id, count = actions.len(), "Queueing actions");
        self.enqueue(Submission::Actions { rule_id, actions });
    }

    fn enqueue(&self, submission: Submission) {
        let queue = match self.pending_worker.lock() {
            Ok(mut pending) => pending.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(queue) = queue {
            debug!("Starting action submission worker");
            tokio::spawn(submit_actions(
                queue,
                self.executor.clone(),
                self.index.clone(),
            ));
        }

        if self.submissions.send(submission).is_err() {
            error!("Action submission worker stopped, dropping submission");
        }
    }

    /// Check a rule before it is added or edited
    fn validate(&self, rule: &Rule) -> RuleResult<()> {
        let registry = &*self.registry;

        if rule.actions.is_empty() {
            return Err(RuleError::InvalidRuleFormat(
                "a rule needs at least one action".to_string(),
            ));
        }

        for descriptor in &rule.event_descriptors {
            descriptor
                .validate(registry)
                .map_err(RuleError::InvalidEventDescriptor)?;
        }

        rule.state_evaluator
            .validate(registry)
            .map_err(RuleError::InvalidStateEvaluator)?;

        for action in rule.actions.iter().chain(&rule.exit_actions) {
            action
                .validate(registry)
                .map_err(RuleError::InvalidRuleAction)?;
        }

        if rule.has_event_based_exit_actions() {
            return Err(RuleError::ContainsEventBasedAction(rule.id));
        }

        if rule.has_event_based_actions() {
            // Event params bind by event type id, which an interface trigger
            // does not pin down
            if rule
                .event_descriptors
                .iter()
                .any(|d| matches!(d.source, EventSource::Interface { .. }))
            {
                return Err(RuleError::InvalidRuleAction(
                    "event params cannot be used with interface triggers".to_string(),
                ));
            }

            let triggers: Vec<EventTypeId> = rule
                .event_descriptors
                .iter()
                .filter_map(EventDescriptor::event_type_id)
                .collect();
            for action in &rule.actions {
                if let Some(event_type_id) = action.event_types().find(|e| !triggers.contains(e)) {
                    return Err(RuleError::InvalidRuleAction(format!(
                        "action reads params of event {} which does not trigger the rule",
                        event_type_id
                    )));
                }
            }
        }

        Ok(())
    }

    fn emit(&self, notification: RuleNotification) {
        // No subscribers is not an error
        let _ = self.notifications.send(notification);
    }

    fn log_entry(&self, entry: RuleLogEntry) {
        let _ = self.log.send(entry);
    }
}

/// Submit queued actions one at a time, in queue order
///
/// Actions of a rule that has been removed in the meantime are dropped.
/// Runs until the engine is dropped.
async fn submit_actions(
    mut queue: mpsc::UnboundedReceiver<Submission>,
    executor: Arc<dyn ActionExecutor>,
    index: Arc<RwLock<RuleIndex>>,
) {
    while let Some(submission) = queue.recv().await {
        let (rule_id, actions) = match submission {
            Submission::Actions { rule_id, actions } => (rule_id, actions),
            Submission::Barrier(done) => {
                let _ = done.send(());
                continue;
            }
        };

        for action in actions {
            let exists = index.read().await.rules.contains_key(&rule_id);
            if !exists {
                debug!(%rule_id, "Rule removed, dropping queued actions");
                break;
            }

            let thing_id = action.thing_id;
            let action_type_id = action.action_type_id;
            match executor.execute_action(action).await {
                Ok(status) => {
                    debug!(%rule_id, %thing_id, %action_type_id, ?status, "Action submitted")
                }
                Err(e) => {
                    warn!(%rule_id, %thing_id, %action_type_id, error = %e, "Action failed")
                }
            }
        }
    }
    debug!("Action submission worker stopped");
}

/// Thread-safe wrapper for RuleEngine
pub type SharedRuleEngine = Arc<RuleEngine>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_descriptor::EventDescriptor;
    use crate::rule_action::RuleActionParam;
    use crate::state_descriptor::StateDescriptor;
    use crate::state_evaluator::StateEvaluator;
    use crate::storage::MemoryRuleStorage;
    use crate::test_support::Home;
    use hub_core::ValueOperator;

    fn engine(home: &Home) -> (RuleEngine, Arc<MemoryRuleStorage>) {
        let storage = Arc::new(MemoryRuleStorage::new());
        let engine = RuleEngine::new(home.things.clone(), home.things.clone(), storage.clone());
        (engine, storage)
    }

    fn switch_on(home: &Home, lamp: ThingId) -> RuleAction {
        RuleAction::for_thing(lamp, home.set_power)
            .with_param(RuleActionParam::value(home.power_param, true))
    }

    #[tokio::test]
    async fn test_add_rule_requires_action() {
        let home = Home::new();
        let (engine, _) = engine(&home);

        assert!(matches!(
            engine.add_rule(Rule::new("empty")).await,
            Err(RuleError::InvalidRuleFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_add_rule_rejects_invalid_parts() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let (engine, storage) = engine(&home);

        let bad_trigger = Rule::new("r")
            .with_event(EventDescriptor::for_thing(ThingId::new(), home.pressed))
            .with_action(switch_on(&home, lamp));
        assert!(matches!(
            engine.add_rule(bad_trigger).await,
            Err(RuleError::InvalidEventDescriptor(_))
        ));

        let bad_condition = Rule::new("r")
            .with_condition(StateEvaluator::leaf(StateDescriptor::for_interface(
                "light",
                "color",
                ValueOperator::Equals,
                "red",
            )))
            .with_action(switch_on(&home, lamp));
        assert!(matches!(
            engine.add_rule(bad_condition).await,
            Err(RuleError::InvalidStateEvaluator(_))
        ));

        let bad_action = Rule::new("r").with_action(RuleAction::for_interface("light", "dim"));
        assert!(matches!(
            engine.add_rule(bad_action).await,
            Err(RuleError::InvalidRuleAction(_))
        ));

        assert!(storage.is_empty());
        assert!(engine.rule_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_event_params_need_matching_trigger() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let (engine, _) = engine(&home);

        let uses_button = RuleAction::for_thing(lamp, home.set_brightness).with_param(
            RuleActionParam::event_param(home.brightness_param, home.pressed, home.button),
        );

        let untriggered = Rule::new("r").with_action(uses_button.clone());
        assert!(matches!(
            engine.add_rule(untriggered).await,
            Err(RuleError::InvalidRuleAction(_))
        ));

        let exit = Rule::new("r")
            .with_event(EventDescriptor::for_thing(lamp, home.pressed))
            .with_action(switch_on(&home, lamp))
            .with_exit_action(uses_button.clone());
        assert!(matches!(
            engine.add_rule(exit).await,
            Err(RuleError::ContainsEventBasedAction(_))
        ));

        let interface_triggered = Rule::new("r")
            .with_event(EventDescriptor::for_interface("light", "pressed"))
            .with_action(uses_button.clone());
        assert!(matches!(
            engine.add_rule(interface_triggered).await,
            Err(RuleError::InvalidRuleAction(_))
        ));

        let triggered = Rule::new("r")
            .with_event(EventDescriptor::for_thing(lamp, home.pressed))
            .with_action(uses_button);
        let rule_id = triggered.id;
        engine.add_rule(triggered).await.unwrap();

        assert!(matches!(
            engine.execute_actions(&rule_id).await,
            Err(RuleError::ContainsEventBasedAction(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_and_missing() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let (engine, _) = engine(&home);

        let rule = Rule::new("r").with_action(switch_on(&home, lamp));
        engine.add_rule(rule.clone()).await.unwrap();
        assert!(matches!(
            engine.add_rule(rule).await,
            Err(RuleError::DuplicateRuleId(_))
        ));

        let missing = RuleId::new();
        assert!(matches!(
            engine.remove_rule(&missing).await,
            Err(RuleError::RuleNotFound(_))
        ));
        assert!(matches!(
            engine.enable_rule(&missing).await,
            Err(RuleError::RuleNotFound(_))
        ));
        assert!(matches!(
            engine.edit_rule(Rule::new("x").with_action(switch_on(&home, lamp))).await,
            Err(RuleError::RuleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_not_executable() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let (engine, _) = engine(&home);

        let rule = Rule::new("r")
            .with_action(switch_on(&home, lamp))
            .with_executable(false);
        let rule_id = rule.id;
        engine.add_rule(rule).await.unwrap();

        assert!(matches!(
            engine.execute_actions(&rule_id).await,
            Err(RuleError::RuleNotExecutable(_))
        ));
        assert!(matches!(
            engine.execute_exit_actions(&rule_id).await,
            Err(RuleError::RuleNotExecutable(_))
        ));
    }

    #[tokio::test]
    async fn test_initial_state_is_silent_evaluation() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        home.things.set_state_value(&lamp, &home.power, true).unwrap();
        let (engine, _) = engine(&home);
        let mut log = engine.subscribe_log();

        let rule = Rule::new("r")
            .with_condition(StateEvaluator::leaf(StateDescriptor::for_thing(
                lamp,
                home.power,
                ValueOperator::Equals,
                true,
            )))
            .with_action(switch_on(&home, lamp));
        let rule_id = rule.id;
        engine.add_rule(rule).await.unwrap();

        assert!(engine.rule(&rule_id).await.unwrap().is_active());
        assert!(log.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_index_follows_edits() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let (engine, _) = engine(&home);

        let rule = Rule::new("r")
            .with_event(EventDescriptor::for_thing(lamp, home.pressed))
            .with_action(switch_on(&home, lamp));
        let rule_id = rule.id;
        engine.add_rule(rule.clone()).await.unwrap();
        {
            let index = engine.index.read().await;
            assert_eq!(index.by_thing[&(lamp, home.pressed)], vec![rule_id]);
            assert!(index.state_only.is_empty());
        }

        let mut edited = rule;
        edited.event_descriptors.clear();
        engine.edit_rule(edited).await.unwrap();
        {
            let index = engine.index.read().await;
            assert!(index.by_thing.is_empty());
            assert_eq!(index.state_only, vec![rule_id]);
        }

        engine.remove_rule(&rule_id).await.unwrap();
        let index = engine.index.read().await;
        assert!(index.state_only.is_empty());
        assert!(index.rules.is_empty());
    }

    #[tokio::test]
    async fn test_find_rules() {
        let home = Home::new();
        let lamp = home.add_lamp("Desk");
        let (engine, _) = engine(&home);

        let a = Rule::new("Morning").with_action(switch_on(&home, lamp));
        let b = Rule::new("Evening").with_action(switch_on(&home, lamp));
        let b_id = b.id;
        engine.add_rule(a).await.unwrap();
        engine.add_rule(b).await.unwrap();

        assert_eq!(engine.find_rules(|r| r.name == "Evening").await, vec![b_id]);
        assert_eq!(engine.rules_for_thing(&lamp).await.len(), 2);
    }
}
