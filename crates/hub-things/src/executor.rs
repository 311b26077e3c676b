//! Action submission

use async_trait::async_trait;
use hub_core::Action;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::registry::ThingResult;

/// Outcome of a successfully submitted action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The integration finished the action
    Completed,
    /// The integration accepted the action and reports completion later
    Async,
}

/// Executes resolved actions on things
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute_action(&self, action: Action) -> ThingResult<ExecutionStatus>;
}

/// Future returned by an action handler
pub type ActionFuture = Pin<Box<dyn Future<Output = ThingResult<ExecutionStatus>> + Send>>;

/// Integration callback performing the actions of one thing class
pub type ActionHandler = Arc<dyn Fn(Action) -> ActionFuture + Send + Sync>;
