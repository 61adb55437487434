//! Human-in-the-loop interrupts and resume commands
//!
//! When a node returns [`NodeOutcome::Suspended`](crate::node::NodeOutcome::Suspended)
//! the executor gives the suspension a fresh identity and stores it in the
//! checkpoint as an [`Interrupt`]. The caller answers by id:
//!
//! ```text
//!  Running ──suspend──► Suspended ──resume(id → value)──► Resumed
//!                           │
//!                           └──new run on the thread──► Abandoned
//! ```
//!
//! A resumed node runs again from its beginning with the value available as
//! [`StepContext::resume_value`](crate::node::StepContext::resume_value). Nodes
//! that suspended but received no value are re-invoked without one and usually
//! suspend again with a new id. Abandoned interrupts are simply left behind in
//! the history; there is nothing to clean up.
//!
//! # Example
//!
//! ```rust
//! use stepgraph_core::interrupt::{match_resume, Interrupt, InterruptStatus, ResumeCommand};
//! use serde_json::json;
//!
//! let pending = vec![
//!     Interrupt::new("confirm_docs", json!({"query": "relevant?"})),
//!     Interrupt::new("confirm_backstory", json!({"query": "interesting?"})),
//! ];
//!
//! let command = ResumeCommand::new().with(&pending[0].interrupt_id, json!("y"));
//! let plan = match_resume(&pending, &command).unwrap();
//!
//! assert_eq!(plan.resume_value("confirm_docs"), Some(&json!("y")));
//! assert_eq!(plan.status(&pending[1]), InterruptStatus::Suspended);
//! ```

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// A suspension surfaced to the caller: `{interrupt_id, node, payload}`
pub use stepgraph_checkpoint::PendingInterrupt as Interrupt;

/// Lifecycle of one suspended node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptStatus {
    Running,
    Suspended,
    Resumed,
    Abandoned,
}

/// Resume values keyed by interrupt id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeCommand {
    values: BTreeMap<String, Value>,
}

impl ResumeCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style answer to one interrupt
    pub fn with(mut self, interrupt_id: impl Into<String>, value: Value) -> Self {
        self.values.insert(interrupt_id.into(), value);
        self
    }

    pub fn insert(&mut self, interrupt_id: impl Into<String>, value: Value) {
        self.values.insert(interrupt_id.into(), value);
    }

    pub fn get(&self, interrupt_id: &str) -> Option<&Value> {
        self.values.get(interrupt_id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl From<HashMap<String, Value>> for ResumeCommand {
    fn from(values: HashMap<String, Value>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

impl FromIterator<(String, Value)> for ResumeCommand {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Outcome of matching a [`ResumeCommand`] against the pending interrupts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumePlan {
    resumed: BTreeMap<String, (String, Value)>,
    waiting: Vec<Interrupt>,
}

impl ResumePlan {
    /// Resume value for `node`, if the caller answered its interrupt
    pub fn resume_value(&self, node: &str) -> Option<&Value> {
        self.resumed.get(node).map(|(_, value)| value)
    }

    /// Nodes that will be re-entered with a value
    pub fn resumed_nodes(&self) -> impl Iterator<Item = &str> {
        self.resumed.keys().map(String::as_str)
    }

    /// Interrupts the caller did not answer
    pub fn waiting(&self) -> &[Interrupt] {
        &self.waiting
    }

    pub fn status(&self, interrupt: &Interrupt) -> InterruptStatus {
        match self.resumed.get(&interrupt.node) {
            Some((id, _)) if id == &interrupt.interrupt_id => InterruptStatus::Resumed,
            _ if self
                .waiting
                .iter()
                .any(|w| w.interrupt_id == interrupt.interrupt_id) =>
            {
                InterruptStatus::Suspended
            }
            _ => InterruptStatus::Running,
        }
    }
}

/// Validate `command` against `pending` and split the suspended nodes into those
/// resumed with a value and those still waiting.
///
/// Every id in the command must name a pending interrupt and the command must
/// not be empty; otherwise [`GraphError::ResumeMismatch`] is returned.
pub fn match_resume(pending: &[Interrupt], command: &ResumeCommand) -> Result<ResumePlan> {
    let unknown: Vec<String> = command
        .ids()
        .filter(|id| !pending.iter().any(|p| p.interrupt_id == *id))
        .map(str::to_string)
        .collect();

    if command.is_empty() || !unknown.is_empty() {
        return Err(GraphError::ResumeMismatch {
            unknown,
            pending: pending.iter().map(|p| p.interrupt_id.clone()).collect(),
        });
    }

    let mut plan = ResumePlan::default();
    for interrupt in pending {
        match command.get(&interrupt.interrupt_id) {
            Some(value) => {
                plan.resumed.insert(
                    interrupt.node.clone(),
                    (interrupt.interrupt_id.clone(), value.clone()),
                );
            }
            None => plan.waiting.push(interrupt.clone()),
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending() -> Vec<Interrupt> {
        vec![
            Interrupt::new("a", json!({"query": "a?"})),
            Interrupt::new("b", json!({"query": "b?"})),
        ]
    }

    #[test]
    fn test_all_answered() {
        let pending = pending();
        let command: ResumeCommand = pending
            .iter()
            .map(|p| (p.interrupt_id.clone(), json!(p.node.clone())))
            .collect();

        let plan = match_resume(&pending, &command).unwrap();
        assert_eq!(plan.resume_value("a"), Some(&json!("a")));
        assert_eq!(plan.resume_value("b"), Some(&json!("b")));
        assert!(plan.waiting().is_empty());
        assert_eq!(plan.status(&pending[0]), InterruptStatus::Resumed);
    }

    #[test]
    fn test_partial_answer_leaves_waiting() {
        let pending = pending();
        let command = ResumeCommand::new().with(pending[1].interrupt_id.clone(), json!("no"));

        let plan = match_resume(&pending, &command).unwrap();
        assert_eq!(plan.resumed_nodes().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(plan.waiting(), &pending[..1]);
        assert_eq!(plan.status(&pending[0]), InterruptStatus::Suspended);
    }

    #[test]
    fn test_unknown_id_is_mismatch() {
        let pending = pending();
        let command = ResumeCommand::new()
            .with(pending[0].interrupt_id.clone(), json!("y"))
            .with("not-an-id", json!("y"));

        let err = match_resume(&pending, &command).unwrap_err();
        assert!(matches!(
            err,
            GraphError::ResumeMismatch { ref unknown, ref pending } if unknown == &vec!["not-an-id".to_string()] && pending.len() == 2
        ));
    }

    #[test]
    fn test_empty_command_or_nothing_pending_is_mismatch() {
        assert!(match_resume(&pending(), &ResumeCommand::new()).is_err());
        assert!(match_resume(&[], &ResumeCommand::new().with("x", json!(1))).is_err());
    }

    #[test]
    fn test_resume_command_serializes_as_map() {
        let command = ResumeCommand::new().with("id-1", json!("yes"));
        assert_eq!(serde_json::to_value(&command).unwrap(), json!({"id-1": "yes"}));
    }
}
