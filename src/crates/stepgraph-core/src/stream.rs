//! Run inputs and the incremental output stream
//!
//! [`CompiledGraph::stream`](crate::compiled::CompiledGraph::stream) returns a
//! [`RunStream`] that yields one [`StepOutput::Update`] per node each time a
//! superstep commits, or a single [`StepOutput::Interrupt`] as its last item when
//! the run suspends:
//!
//! ```text
//! {"trim": {"question": "..."}}
//! {"search": {"documents": [...]}}   {"gen_backstory": {"backstory": "..."}}
//! {"__interrupt__": [{"interrupt_id": "...", "node": "confirm_docs", "payload": {...}}, ...]}
//! ```
//!
//! The stream is lazy: nothing runs until it is polled, and dropping it discards
//! the superstep in flight. Checkpoints already written stay written.

use crate::error::Result;
use crate::graph::NodeId;
use crate::interrupt::{Interrupt, ResumeCommand};
use crate::state::{State, StateDelta};
use futures::Stream;
use serde_json::{json, Value};
use std::pin::Pin;

/// Key under which interrupts appear in the JSON form of a [`StepOutput`]
pub const INTERRUPT: &str = "__interrupt__";

/// What a run call should do with the thread
#[derive(Debug, Clone, PartialEq)]
pub enum RunInput {
    /// Start a run with this input on top of the thread's state
    State(StateDelta),
    /// Answer the interrupts the thread is waiting on
    Resume(ResumeCommand),
    /// Re-enter the latest checkpoint as-is
    Continue,
}

impl From<StateDelta> for RunInput {
    fn from(delta: StateDelta) -> Self {
        Self::State(delta)
    }
}

impl From<ResumeCommand> for RunInput {
    fn from(command: ResumeCommand) -> Self {
        Self::Resume(command)
    }
}

/// One item of a run stream
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    /// A node's delta was committed
    Update { node: NodeId, delta: StateDelta },
    /// The run suspended; resume with values keyed by `interrupt_id`
    Interrupt(Vec<Interrupt>),
}

impl StepOutput {
    /// `{node: delta}` or `{"__interrupt__": [...]}`
    pub fn to_json(&self) -> Value {
        match self {
            StepOutput::Update { node, delta } => json!({ node.as_str(): delta.to_json() }),
            StepOutput::Interrupt(interrupts) => json!({ INTERRUPT: interrupts }),
        }
    }
}

/// Lazy stream of run outputs
pub type RunStream = Pin<Box<dyn Stream<Item = Result<StepOutput>> + Send>>;

/// Final result of [`CompiledGraph::invoke`](crate::compiled::CompiledGraph::invoke)
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The frontier drained; the state is the thread's final state
    Completed(State),
    /// The run is waiting on these interrupts
    Interrupted(Vec<Interrupt>),
}

impl RunOutcome {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }

    pub fn state(&self) -> Option<&State> {
        match self {
            Self::Completed(state) => Some(state),
            Self::Interrupted(_) => None,
        }
    }

    pub fn interrupts(&self) -> &[Interrupt] {
        match self {
            Self::Interrupted(interrupts) => interrupts,
            Self::Completed(_) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_json_shape() {
        let output = StepOutput::Update {
            node: "trim".to_string(),
            delta: StateDelta::new().set("question", json!("hi")),
        };
        assert_eq!(output.to_json(), json!({"trim": {"question": "hi"}}));
    }

    #[test]
    fn test_interrupt_json_shape() {
        let interrupt = Interrupt::new("confirm_docs", json!({"query": "ok?"}));
        let id = interrupt.interrupt_id.clone();
        let output = StepOutput::Interrupt(vec![interrupt]);
        assert_eq!(
            output.to_json(),
            json!({"__interrupt__": [{"interrupt_id": id, "node": "confirm_docs", "payload": {"query": "ok?"}}]})
        );
    }

    #[test]
    fn test_outcome_accessors() {
        let done = RunOutcome::Completed(State::new());
        assert!(!done.is_interrupted());
        assert!(done.interrupts().is_empty());
        assert!(RunOutcome::Interrupted(vec![]).state().is_none());
    }
}
