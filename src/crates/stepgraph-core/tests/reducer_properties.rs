//! Barrier application does not depend on node completion order

use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use stepgraph_core::{ChannelRegistry, Reducer, State, StateDelta, StateStore};

fn store() -> StateStore {
    let mut channels = ChannelRegistry::new();
    channels.declare("log", Reducer::Append, None).unwrap();
    channels.declare("last", Reducer::Overwrite, None).unwrap();
    StateStore::new(Arc::new(channels))
}

/// One delta per node, named so that name order is index order
fn deltas(values: &[i64]) -> Vec<(String, StateDelta)> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            (
                format!("node_{:02}", i),
                StateDelta::new().set("log", json!(v)).set("last", json!(v)),
            )
        })
        .collect()
}

proptest! {
    #[test]
    fn apply_ignores_completion_order(
        (values, shuffled) in prop::collection::vec(any::<i64>(), 1..20)
            .prop_flat_map(|values| {
                let named = deltas(&values);
                (Just(values), Just(named).prop_shuffle())
            })
    ) {
        let store = store();
        let initial = State::from_iter([("log".to_string(), json!(["seed"]))]);

        let ordered = store.apply(&initial, &deltas(&values)).unwrap();
        let from_shuffled = store.apply(&initial, &shuffled).unwrap();
        prop_assert_eq!(&ordered, &from_shuffled);

        let mut expected = vec![json!("seed")];
        expected.extend(values.iter().map(|v| json!(v)));
        let expected = Value::Array(expected);
        prop_assert_eq!(ordered.get("log"), Some(&expected));

        let last = values.last().map(|v| json!(v));
        prop_assert_eq!(ordered.get("last"), last.as_ref());

        // The input snapshot is never mutated
        let seed = json!(["seed"]);
        prop_assert_eq!(initial.get("log"), Some(&seed));
    }

    #[test]
    fn append_wraps_scalar_current_value(current in any::<i64>(), update in any::<i64>()) {
        let merged = Reducer::Append.reduce(Some(json!(current)), json!(update));
        prop_assert_eq!(merged, json!([current, update]));
    }
}
