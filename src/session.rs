//! Session store collaborator interface.
//!
//! Flows treat the session as an opaque key-value map with transmit and
//! destroy operations; all cross-request flow state lives here. The store is
//! expected to provide per-session mutual exclusion (last-write-wins or a
//! locked read-modify-write), which is not re-specified at this boundary.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::web::{Request, Response};

/// One user session, holding opaque structured values.
pub trait Session: Send + Sync {
    /// The session identifier.
    fn id(&self) -> &str;

    /// Whether the session still exists in its store.
    fn valid(&self) -> bool;

    /// Reads a value, or `None` if the key is absent.
    fn value(&self, key: &str) -> Option<Value>;

    /// Writes a value under the given key.
    fn register(&self, key: &str, value: Value);

    /// Removes the value under the given key.
    fn remove(&self, key: &str);

    /// Removes the session from its store.
    fn destroy(&self);

    /// Writes the session cookie (or equivalent) to the response. Must be
    /// called on every response path that mutated the session, including
    /// early-exit redirects.
    fn transmit(&self, response: &mut Response);
}

/// Factory and locator for [`Session`] instances.
pub trait Sessions: Send + Sync {
    /// Locates the session referenced by the request, if any.
    fn locate(&self, request: &Request) -> Option<Arc<dyn Session>>;

    /// Creates a new empty session.
    fn create(&self) -> Arc<dyn Session>;
}

const COOKIE: &str = "session";

/// In-memory session store used by the tests and by embedders that do not
/// need persistence. Sessions are identified by a cookie named `session`.
#[derive(Clone, Default)]
pub struct InMemorySessions {
    store: Arc<DashMap<String, HashMap<String, Value>>>,
}

impl InMemorySessions {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sessions for InMemorySessions {
    fn locate(&self, request: &Request) -> Option<Arc<dyn Session>> {
        let cookies = request.header("Cookie")?;
        let id = cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == COOKIE).then(|| value.to_string())
        })?;
        self.store.contains_key(&id).then(|| {
            Arc::new(InMemorySession { id, store: self.store.clone() }) as Arc<dyn Session>
        })
    }

    fn create(&self) -> Arc<dyn Session> {
        let id = Uuid::new_v4().simple().to_string();
        self.store.insert(id.clone(), HashMap::new());
        Arc::new(InMemorySession { id, store: self.store.clone() })
    }
}

struct InMemorySession {
    id: String,
    store: Arc<DashMap<String, HashMap<String, Value>>>,
}

impl Session for InMemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn valid(&self) -> bool {
        self.store.contains_key(&self.id)
    }

    fn value(&self, key: &str) -> Option<Value> {
        self.store.get(&self.id)?.get(key).cloned()
    }

    fn register(&self, key: &str, value: Value) {
        if let Some(mut values) = self.store.get_mut(&self.id) {
            values.insert(key.to_string(), value);
        }
    }

    fn remove(&self, key: &str) {
        if let Some(mut values) = self.store.get_mut(&self.id) {
            values.remove(key);
        }
    }

    fn destroy(&self) {
        self.store.remove(&self.id);
    }

    fn transmit(&self, response: &mut Response) {
        response.header("Set-Cookie", format!("{}={}", COOKIE, self.id));
    }
}
