//! Session-persisted flow state.
//!
//! Each flow keeps its cross-request state under a single namespaced session
//! key as `{"flows": {<state token>: {"uri": .., "seed": {..}}}, "token": ..}`.
//! The `flows` map is keyed by the per-attempt correlator so that parallel
//! attempts in one session never clobber each other; the `token` member is
//! the single-use terminal slot holding a just-completed result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::Session;

/// One in-flight authorization attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    /// The URI the user originally requested, including any captured fragment.
    pub uri: String,

    /// Ephemeral per-attempt secrets that must survive the round trip to the
    /// authorization server, e.g. a PKCE code verifier.
    #[serde(default)]
    pub seed: BTreeMap<String, String>,
}

impl FlowState {
    /// Creates flow state for a target URI with the given seed.
    pub fn new(uri: impl Into<String>, seed: BTreeMap<String, String>) -> Self {
        FlowState { uri: uri.into(), seed }
    }
}

/// Typed view of one flow's namespaced session entry.
pub struct FlowScope<'a> {
    session: &'a dyn Session,
    namespace: &'a str,
}

impl<'a> FlowScope<'a> {
    /// Creates a scope for the given session and namespace.
    pub fn new(session: &'a dyn Session, namespace: &'a str) -> Self {
        FlowScope { session, namespace }
    }

    fn read(&self) -> Map<String, Value> {
        match self.session.value(self.namespace) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    fn write(&self, mut map: Map<String, Value>) {
        // An empty flow map carries no information, drop it
        if map.get("flows").and_then(Value::as_object).is_some_and(Map::is_empty) {
            map.remove("flows");
        }
        self.session.register(self.namespace, Value::Object(map));
    }

    /// Returns the pending flow entry for the given correlator, if any.
    pub fn flow(&self, state: &str) -> Option<FlowState> {
        let map = self.read();
        let entry = map.get("flows")?.get(state)?;
        serde_json::from_value(entry.clone()).ok()
    }

    /// Stores a flow entry under the given correlator.
    pub fn insert(&self, state: &str, flow: FlowState) {
        let mut map = self.read();
        let flows = map
            .entry("flows")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(flows) = flows {
            flows.insert(
                state.to_string(),
                serde_json::to_value(&flow).expect("flow state serialization"),
            );
        }
        self.write(map);
    }

    /// Replaces a flow entry. Used when a fragment-capture round trip
    /// rewrites the stored target.
    pub fn update(&self, state: &str, flow: FlowState) {
        self.insert(state, flow);
    }

    /// Removes the matched flow entry and stores the exchange result in the
    /// terminal slot, in one session write. Other pending entries survive.
    pub fn complete(&self, state: &str, token: Value) {
        let mut map = self.read();
        if let Some(Value::Object(flows)) = map.get_mut("flows") {
            flows.remove(state);
        }
        map.insert("token".to_string(), token);
        self.write(map);
    }

    /// Stores a result in the terminal slot without touching the flow map.
    /// Used by flows whose correlator lives on the provider side (CAS).
    pub fn set_token(&self, token: Value) {
        let mut map = self.read();
        map.insert("token".to_string(), token);
        self.write(map);
    }

    /// Consumes the terminal slot: the value is removed from the session the
    /// instant it is read.
    pub fn take_token(&self) -> Option<Value> {
        let mut map = self.read();
        let token = map.remove("token")?;
        self.write(map);
        Some(token)
    }
}
