//! Condition trees
//!
//! A [`StateEvaluator`] node holds at most one [`StateDescriptor`] and any
//! number of child nodes, combined with AND or OR. Children are owned and
//! evaluated in list order.

use hub_core::{StateOperator, ThingId};
use hub_things::ThingRegistry;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::state_descriptor::StateDescriptor;

/// A node of a rule's condition tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateEvaluator {
    #[serde(default, skip_serializing_if = "StateDescriptor::is_empty")]
    pub descriptor: StateDescriptor,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StateEvaluator>,

    #[serde(default)]
    pub operator: StateOperator,
}

impl StateEvaluator {
    /// An empty evaluator, always true
    pub fn new() -> Self {
        Self::default()
    }

    /// A single condition
    pub fn leaf(descriptor: StateDescriptor) -> Self {
        Self {
            descriptor,
            ..Self::default()
        }
    }

    /// All children must hold
    pub fn all(children: Vec<StateEvaluator>) -> Self {
        Self {
            children,
            operator: StateOperator::And,
            ..Self::default()
        }
    }

    /// Any child must hold
    pub fn any(children: Vec<StateEvaluator>) -> Self {
        Self {
            children,
            operator: StateOperator::Or,
            ..Self::default()
        }
    }

    pub fn with_descriptor(mut self, descriptor: StateDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn with_child(mut self, child: StateEvaluator) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_operator(mut self, operator: StateOperator) -> Self {
        self.operator = operator;
        self
    }

    /// No descriptor and no children
    pub fn is_empty(&self) -> bool {
        self.descriptor.is_empty() && self.children.is_empty()
    }

    /// Evaluate the tree against the current state values
    pub fn evaluate(&self, registry: &dyn ThingRegistry) -> bool {
        if self.is_empty() {
            return true;
        }

        let has_descriptor = !self.descriptor.is_empty();
        let result = match self.operator {
            StateOperator::Or => {
                (has_descriptor && self.descriptor.matches(registry))
                    || self.children.iter().any(|child| child.evaluate(registry))
            }
            StateOperator::And => {
                (!has_descriptor || self.descriptor.matches(registry))
                    && self.children.iter().all(|child| child.evaluate(registry))
            }
        };

        trace!(
            operator = ?self.operator,
            has_descriptor,
            children = self.children.len(),
            result,
            "Evaluated state evaluator"
        );
        result
    }

    /// Check the tree against the registry
    ///
    /// For OR nodes one valid child is enough; AND nodes need every child to
    /// be valid.
    pub fn validate(&self, registry: &dyn ThingRegistry) -> Result<(), String> {
        self.descriptor.validate(registry)?;

        if self.children.is_empty() {
            return Ok(());
        }

        match self.operator {
            StateOperator::And => self
                .children
                .iter()
                .try_for_each(|child| child.validate(registry)),
            StateOperator::Or => {
                let mut first_error = None;
                for child in &self.children {
                    match child.validate(registry) {
                        Ok(()) => return Ok(()),
                        Err(reason) => {
                            first_error.get_or_insert(reason);
                        }
                    }
                }
                Err(first_error.unwrap_or_default())
            }
        }
    }

    pub fn is_valid(&self, registry: &dyn ThingRegistry) -> bool {
        self.validate(registry).is_ok()
    }

    /// Whether any descriptor in the tree references the thing
    pub fn contains_thing(&self, thing_id: &ThingId) -> bool {
        self.descriptor.thing_id().as_ref() == Some(thing_id)
            || self.children.iter().any(|c| c.contains_thing(thing_id))
    }

    /// Clear every descriptor referencing the thing
    ///
    /// The tree keeps its shape; cleared descriptors become neutral.
    pub fn remove_thing(&mut self, thing_id: &ThingId) {
        if self.descriptor.thing_id().as_ref() == Some(thing_id) {
            self.descriptor.clear();
        }
        for child in &mut self.children {
            child.remove_thing(thing_id);
        }
    }

    /// Thing ids referenced by the tree, in tree order
    pub fn contained_things(&self) -> Vec<ThingId> {
        let mut things = Vec::new();
        self.walk(&mut |node| {
            if let Some(id) = node.descriptor.thing_id() {
                if !things.contains(&id) {
                    things.push(id);
                }
            }
        });
        things
    }

    /// Interface names referenced by the tree, in tree order
    pub fn interfaces(&self) -> Vec<String> {
        let mut interfaces: Vec<String> = Vec::new();
        self.walk(&mut |node| {
            if let Some(interface) = node.descriptor.interface() {
                if !interfaces.iter().any(|i| i == interface) {
                    interfaces.push(interface.to_string());
                }
            }
        });
        interfaces
    }

    fn walk(&self, visit: &mut dyn FnMut(&StateEvaluator)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}
