//! Shared state, channel reducers and the State Store
//!
//! A run's state is an ordered map of channel name to JSON value. Every channel is
//! declared up front with a [`Reducer`] that decides how a node's write combines
//! with the current value:
//!
//! | Reducer | Behavior | Use Case |
//! |---------|----------|----------|
//! | [`Reducer::Overwrite`] | Last write wins | Flags, the current question |
//! | [`Reducer::Append`] | Concatenate into an array | Message history, event logs |
//!
//! Nodes never touch state directly. They return a [`StateDelta`] and the
//! executor hands every delta of a superstep to [`StateStore::apply`], which
//! produces the next state in one step.
//!
//! # Ordering
//!
//! Deltas are applied sorted by node name, so the outcome of a superstep does not
//! depend on which node finished first:
//!
//! ```rust
//! use stepgraph_core::state::{ChannelRegistry, Reducer, State, StateDelta, StateStore};
//! use serde_json::json;
//!
//! let mut channels = ChannelRegistry::new();
//! channels.declare("log", Reducer::Append, None).unwrap();
//!
//! let store = StateStore::new(channels.into());
//! let deltas = vec![
//!     ("b".to_string(), StateDelta::new().set("log", json!(2))),
//!     ("a".to_string(), StateDelta::new().set("log", json!(1))),
//! ];
//!
//! let next = store.apply(&State::new(), &deltas).unwrap();
//! assert_eq!(next.get("log"), Some(&json!([1, 2])));
//! ```

use crate::error::{GraphDefinitionError, GraphError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stepgraph_checkpoint::ChannelValues;
use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// How concurrent writes to a channel are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// Replace the current value
    #[default]
    Overwrite,
    /// Append to an ordered array; an array update is concatenated, anything
    /// else is pushed as one element
    Append,
}

impl Reducer {
    /// Combine `current` (absent if the channel was never written) with `update`.
    pub fn reduce(&self, current: Option<Value>, update: Value) -> Value {
        match self {
            Reducer::Overwrite => update,
            Reducer::Append => {
                let mut items = match current {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items,
                    Some(scalar) => vec![scalar],
                };
                match update {
                    Value::Array(more) => items.extend(more),
                    single => items.push(single),
                }
                Value::Array(items)
            }
        }
    }
}

/// Declaration of one state channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    pub reducer: Reducer,
    /// Seeded into the state of a fresh thread
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// The set of channels a graph may write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelRegistry {
    channels: BTreeMap<String, ChannelSpec>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a channel; names must be unique
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        reducer: Reducer,
        default: Option<Value>,
    ) -> std::result::Result<(), GraphDefinitionError> {
        let name = name.into();
        if self.channels.contains_key(&name) {
            return Err(GraphDefinitionError::DuplicateChannel(name));
        }
        self.channels.insert(
            name.clone(),
            ChannelSpec {
                name,
                reducer,
                default,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ChannelSpec> {
        self.channels.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.channels.values()
    }

    /// State holding the default of every channel that declares one
    pub fn defaults(&self) -> State {
        self.channels
            .values()
            .filter_map(|spec| spec.default.clone().map(|v| (spec.name.clone(), v)))
            .collect()
    }
}

/// Read-only view of a run's channel values.
///
/// Nodes receive it as `Arc<State>`; a new `State` is produced for every
/// committed superstep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(ChannelValues);

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: &str) -> Option<&Value> {
        self.0.get(channel)
    }

    /// String value of a channel, `None` if absent or not a string
    pub fn get_str(&self, channel: &str) -> Option<&str> {
        self.0.get(channel).and_then(Value::as_str)
    }

    /// Boolean value of a channel, `None` if absent or not a bool
    pub fn get_bool(&self, channel: &str) -> Option<bool> {
        self.0.get(channel).and_then(Value::as_bool)
    }

    /// Array value of a channel; absent and `null` read as empty
    pub fn get_array(&self, channel: &str) -> &[Value] {
        match self.0.get(channel) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.0.contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    pub fn values(&self) -> &ChannelValues {
        &self.0
    }

    pub fn into_values(self) -> ChannelValues {
        self.0
    }

    /// The whole state as a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}

impl From<ChannelValues> for State {
    fn from(values: ChannelValues) -> Self {
        Self(values)
    }
}

impl FromIterator<(String, Value)> for State {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Partial update returned by a node; absent channels are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDelta(ChannelValues);

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style write of one channel
    pub fn set(mut self, channel: impl Into<String>, value: Value) -> Self {
        self.0.insert(channel.into(), value);
        self
    }

    pub fn insert(&mut self, channel: impl Into<String>, value: Value) {
        self.0.insert(channel.into(), value);
    }

    /// Build a delta from a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(GraphError::InvalidInput(format!(
                "state update must be a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn get(&self, channel: &str) -> Option<&Value> {
        self.0.get(channel)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    pub fn into_values(self) -> ChannelValues {
        self.0
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}

impl From<ChannelValues> for StateDelta {
    fn from(values: ChannelValues) -> Self {
        Self(values)
    }
}

impl FromIterator<(String, Value)> for StateDelta {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Applies superstep deltas to a state according to the channel reducers.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    channels: Arc<ChannelRegistry>,
}

impl StateStore {
    pub fn new(channels: Arc<ChannelRegistry>) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Produce the state that results from applying `deltas` to `current`.
    ///
    /// Deltas are applied in node-name order (stable for equal names). `current`
    /// is never modified; if any delta writes an undeclared channel the whole
    /// call fails and nothing is produced.
    pub fn apply(&self, current: &State, deltas: &[(String, StateDelta)]) -> Result<State> {
        let mut ordered: Vec<&(String, StateDelta)> = deltas.iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(&b.0));

        let mut next = current.0.clone();
        let mut overwritten_by: HashMap<&str, &str> = HashMap::new();

        for (node, delta) in ordered {
            for (channel, value) in delta.iter() {
                let spec = self
                    .channels
                    .get(channel)
                    .ok_or_else(|| GraphError::unknown_channel(node.as_str(), channel.as_str()))?;

                if spec.reducer == Reducer::Overwrite {
                    if let Some(previous) = overwritten_by.insert(channel.as_str(), node.as_str()) {
                        if previous != node {
                            tracing::warn!(
                                channel = %channel,
                                previous = %previous,
                                winner = %node,
                                "Multiple nodes overwrote the same channel in one superstep"
                            );
                        }
                    }
                }

                let reduced = spec.reducer.reduce(next.remove(channel), value.clone());
                next.insert(channel.clone(), reduced);
            }
        }

        Ok(State(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> StateStore {
        let mut channels = ChannelRegistry::new();
        channels.declare("log", Reducer::Append, None).unwrap();
        channels.declare("x", Reducer::Overwrite, Some(json!(0))).unwrap();
        StateStore::new(Arc::new(channels))
    }

    #[test]
    fn test_append_reducer() {
        assert_eq!(Reducer::Append.reduce(None, json!(1)), json!([1]));
        assert_eq!(
            Reducer::Append.reduce(Some(json!([1])), json!([2, 3])),
            json!([1, 2, 3])
        );
        assert_eq!(Reducer::Append.reduce(Some(json!("a")), json!("b")), json!(["a", "b"]));
        assert_eq!(Reducer::Append.reduce(Some(Value::Null), json!([])), json!([]));
    }

    #[test]
    fn test_overwrite_reducer() {
        assert_eq!(Reducer::Overwrite.reduce(Some(json!(1)), json!(2)), json!(2));
        assert_eq!(Reducer::Overwrite.reduce(None, json!(null)), json!(null));
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let mut channels = ChannelRegistry::new();
        channels.declare("x", Reducer::Overwrite, None).unwrap();
        assert_eq!(
            channels.declare("x", Reducer::Append, None),
            Err(GraphDefinitionError::DuplicateChannel("x".to_string()))
        );
    }

    #[test]
    fn test_defaults() {
        let defaults = store().channels().defaults();
        assert_eq!(defaults.get("x"), Some(&json!(0)));
        assert!(!defaults.contains("log"));
    }

    #[test]
    fn test_apply_orders_by_node_name() {
        let deltas = vec![
            ("b".to_string(), StateDelta::new().set("log", json!(2)).set("x", json!("b"))),
            ("a".to_string(), StateDelta::new().set("log", json!(1)).set("x", json!("a"))),
        ];
        let next = store().apply(&State::new(), &deltas).unwrap();
        assert_eq!(next.get("log"), Some(&json!([1, 2])));
        assert_eq!(next.get("x"), Some(&json!("b")));
    }

    #[test]
    fn test_apply_is_copy_on_write() {
        let current: State = [("x".to_string(), json!(7))].into_iter().collect();
        let deltas = vec![(
            "a".to_string(),
            StateDelta::new().set("x", json!(8)).set("missing", json!(true)),
        )];

        let err = store().apply(&current, &deltas).unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownChannel { ref node, ref channel } if node == "a" && channel == "missing"
        ));
        assert_eq!(current.get("x"), Some(&json!(7)));
    }

    #[test]
    fn test_absent_keys_untouched() {
        let current: State = [
            ("x".to_string(), json!(1)),
            ("log".to_string(), json!(["seed"])),
        ]
        .into_iter()
        .collect();
        let next = store()
            .apply(&current, &[("a".to_string(), StateDelta::new().set("x", json!(2)))])
            .unwrap();
        assert_eq!(next.get_array("log"), &[json!("seed")]);
        assert_eq!(next.get("x"), Some(&json!(2)));
    }

    #[test]
    fn test_delta_from_value() {
        let delta = StateDelta::from_value(json!({"question": "hi"})).unwrap();
        assert_eq!(delta.get("question"), Some(&json!("hi")));
        assert!(StateDelta::from_value(json!([1])).is_err());
    }

    #[test]
    fn test_state_accessors() {
        let state: State = [
            ("q".to_string(), json!("hello")),
            ("ok".to_string(), json!(true)),
        ]
        .into_iter()
        .collect();
        assert_eq!(state.get_str("q"), Some("hello"));
        assert_eq!(state.get_bool("ok"), Some(true));
        assert!(state.get_array("docs").is_empty());
        assert_eq!(state.to_json(), json!({"q": "hello", "ok": true}));
    }
}
