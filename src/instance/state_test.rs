use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use super::catalog::Catalog;
use super::state::*;

#[derive(Debug, PartialEq)]
struct Weights(Vec<u8>);

impl Opaque for Weights {
    const TAG: &'static str = "weights.v1";

    fn encode(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.0.clone())
    }

    fn decode(blob: &[u8]) -> anyhow::Result<Self> {
        Ok(Weights(blob.to_vec()))
    }
}

struct Tokenizer {
    vocab: usize,
}

#[test]
fn plain_values_round_trip_through_slots() {
    let state = StateGraph::new();
    state.set("threshold", &0.5).unwrap();
    state.set("labels", &vec!["cat", "dog"]).unwrap();

    assert_eq!(state.get::<f64>("threshold").unwrap(), Some(0.5));
    assert_eq!(state.require::<Vec<String>>("labels").unwrap(), ["cat", "dog"]);
    assert_eq!(state.get::<f64>("absent").unwrap(), None);
    assert!(matches!(state.require::<f64>("absent"), Err(StateError::Missing(_))));
    assert_eq!(state.len(), 2);
}

#[test]
fn update_starts_from_default() {
    let state = StateGraph::new();
    for _ in 0..3 {
        state.update::<u64, _, _>("hits", |n| *n += 1).unwrap();
    }
    assert_eq!(state.require::<u64>("hits").unwrap(), 3);
}

#[test]
fn opaque_values_need_matching_tag() {
    let state = StateGraph::new();
    state.put_opaque("w", &Weights(vec![1, 2, 3])).unwrap();
    assert_eq!(state.opaque::<Weights>("w").unwrap(), Some(Weights(vec![1, 2, 3])));
    assert!(matches!(state.get::<Vec<u8>>("w"), Err(StateError::KindMismatch { .. })));

    state.set("w", &"text").unwrap();
    assert!(matches!(state.opaque::<Weights>("w"), Err(StateError::KindMismatch { .. })));
}

#[test]
fn bindings_resolve_through_catalog() {
    let catalog = Catalog::new();
    catalog.bind("tokenizer", Arc::new(Tokenizer { vocab: 32_000 }));

    let state = StateGraph::new();
    state.bind("tok", "tokenizer");
    assert_eq!(state.binding::<Tokenizer>("tok", &catalog).unwrap().vocab, 32_000);

    state.bind("tok", "unregistered");
    assert!(matches!(
        state.binding::<Tokenizer>("tok", &catalog),
        Err(StateError::UnknownBinding(name)) if name == "unregistered"
    ));
}

#[test]
fn snapshot_serializes_every_kind() {
    let state = StateGraph::new();
    state.set("n", &7).unwrap();
    state.bind("tok", "tokenizer");
    state.put_opaque("w", &Weights(vec![0xde, 0xad])).unwrap();

    let encoded = serde_json::to_value(state.snapshot()).unwrap();
    assert_eq!(
        encoded,
        json!({
            "n": {"kind": "plain", "value": 7},
            "tok": {"kind": "binding", "name": "tokenizer"},
            "w": {"kind": "opaque", "tag": "weights.v1", "blob": "dead"},
        })
    );

    let decoded: BTreeMap<String, Captured> = serde_json::from_value(encoded).unwrap();
    let restored = StateGraph::from_slots(decoded);
    assert_eq!(restored.opaque::<Weights>("w").unwrap(), Some(Weights(vec![0xde, 0xad])));
    assert_eq!(restored.require::<i64>("n").unwrap(), 7);
}
