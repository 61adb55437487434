//! Node steps and their outcomes
//!
//! A node's behavior is a [`Step`]: an async function from a [`StepContext`] to a
//! [`NodeOutcome`]. The outcome is a tagged value. A node that needs human input
//! does not raise anything; it returns [`NodeOutcome::Suspended`] with a payload
//! for the caller, and is invoked again with the caller's answer available as
//! [`StepContext::resume_value`].
//!
//! # Example
//!
//! ```rust
//! use stepgraph_core::node::{NodeOutcome, StepContext};
//! use stepgraph_core::state::StateDelta;
//! use serde_json::json;
//!
//! async fn confirm(ctx: StepContext) -> NodeOutcome {
//!     let answer = match ctx.interrupt(json!({"query": "confirm?"})) {
//!         Ok(answer) => answer,
//!         Err(suspend) => return suspend.into(),
//!     };
//!     let approved = answer.as_str().map(|a| a.eq_ignore_ascii_case("yes")).unwrap_or(false);
//!     NodeOutcome::completed(StateDelta::new().set("approved", json!(approved)))
//! }
//! ```

use crate::state::{State, StateDelta};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Error type a node reports when it fails
pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// Result of invoking a node once
#[derive(Debug)]
pub enum NodeOutcome {
    /// The node finished; its delta is committed with the rest of the superstep
    Completed(StateDelta),
    /// The node needs input from the caller; the payload is shown to them
    Suspended(Value),
    /// The node failed; the superstep is aborted
    Failed(NodeError),
}

impl NodeOutcome {
    pub fn completed(delta: StateDelta) -> Self {
        Self::Completed(delta)
    }

    pub fn suspended(payload: Value) -> Self {
        Self::Suspended(payload)
    }

    pub fn failed(error: impl Into<NodeError>) -> Self {
        Self::Failed(error.into())
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended(_))
    }
}

impl<E> From<Result<StateDelta, E>> for NodeOutcome
where
    E: Into<NodeError>,
{
    fn from(result: Result<StateDelta, E>) -> Self {
        match result {
            Ok(delta) => Self::Completed(delta),
            Err(e) => Self::Failed(e.into()),
        }
    }
}

/// Request to suspend, produced by [`StepContext::interrupt`]
#[derive(Debug, Clone, PartialEq)]
pub struct Suspend {
    pub payload: Value,
}

impl From<Suspend> for NodeOutcome {
    fn from(suspend: Suspend) -> Self {
        Self::Suspended(suspend.payload)
    }
}

/// Everything a node sees while it runs
#[derive(Debug, Clone)]
pub struct StepContext {
    node: String,
    step: i64,
    state: Arc<State>,
    resume: Option<Value>,
    metadata: Arc<HashMap<String, Value>>,
}

impl StepContext {
    pub fn new(node: impl Into<String>, step: i64, state: Arc<State>) -> Self {
        Self {
            node: node.into(),
            step,
            state,
            resume: None,
            metadata: Arc::new(HashMap::new()),
        }
    }

    pub fn with_resume(mut self, value: Value) -> Self {
        self.resume = Some(value);
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<HashMap<String, Value>>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Name of the running node
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Lineage step this superstep will commit as
    pub fn step(&self) -> i64 {
        self.step
    }

    /// State as it was before this superstep
    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_arc(&self) -> Arc<State> {
        Arc::clone(&self.state)
    }

    /// Value supplied by the caller when this node is re-entered after a suspension
    pub fn resume_value(&self) -> Option<&Value> {
        self.resume.as_ref()
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Ask the caller for input.
    ///
    /// Returns the resume value when the node is being re-entered, otherwise a
    /// [`Suspend`] the node should return as its outcome.
    pub fn interrupt(&self, payload: Value) -> Result<Value, Suspend> {
        match &self.resume {
            Some(value) => Ok(value.clone()),
            None => Err(Suspend { payload }),
        }
    }
}

/// Behavior of a node
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, ctx: StepContext) -> NodeOutcome;
}

/// Adapts an async closure into a [`Step`]
pub struct FnStep<F>(pub F);

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(StepContext) -> BoxFuture<'static, NodeOutcome> + Send + Sync,
{
    async fn run(&self, ctx: StepContext) -> NodeOutcome {
        (self.0)(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> StepContext {
        StepContext::new("confirm", 2, Arc::new(State::new()))
    }

    #[test]
    fn test_interrupt_without_resume_suspends() {
        let outcome: NodeOutcome = match ctx().interrupt(json!({"query": "confirm?"})) {
            Ok(_) => panic!("should suspend"),
            Err(suspend) => suspend.into(),
        };
        assert!(matches!(outcome, NodeOutcome::Suspended(ref p) if p == &json!({"query": "confirm?"})));
    }

    #[test]
    fn test_interrupt_with_resume_returns_value() {
        let ctx = ctx().with_resume(json!("no"));
        assert_eq!(ctx.interrupt(json!(null)), Ok(json!("no")));
        assert_eq!(ctx.resume_value(), Some(&json!("no")));
        assert_eq!(ctx.node(), "confirm");
        assert_eq!(ctx.step(), 2);
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: NodeOutcome = Ok::<_, NodeError>(StateDelta::new()).into();
        assert!(ok.is_completed());

        let err: NodeOutcome = Err::<StateDelta, _>("boom").into();
        assert!(matches!(err, NodeOutcome::Failed(ref e) if e.to_string() == "boom"));
    }

    #[tokio::test]
    async fn test_fn_step() {
        let step = FnStep(|ctx: StepContext| -> BoxFuture<'static, NodeOutcome> {
            Box::pin(async move {
                NodeOutcome::completed(StateDelta::new().set("node", json!(ctx.node())))
            })
        });
        match step.run(ctx()).await {
            NodeOutcome::Completed(delta) => assert_eq!(delta.get("node"), Some(&json!("confirm"))),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
