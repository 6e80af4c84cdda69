//! Remote data store: the out-of-scope collaborator specified only at its
//! interface. An in-memory default implementation is provided so the
//! surrogate can run standalone; production deployments are expected to
//! supply their own [`RemoteDataStore`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use surrogate_shared::{SurrogateError, SurrogateResult};
use uuid::Uuid;

/// Opaque handle returned by [`RemoteDataStore::store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct RemoteDataHandle(Uuid);

impl std::fmt::Display for RemoteDataHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RemoteDataHandle {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(RemoteDataHandle)
            .map_err(|_| SurrogateError::UnknownHandle(s.to_string()))
    }
}

/// Interface the surrogate relies on for opaque, addressable storage of
/// task input/output payloads. Resolution, retention, expiry, cleanup.
pub trait RemoteDataStore: Send + Sync {
    fn resolve(&self, handle: RemoteDataHandle) -> SurrogateResult<Value>;
    fn retain(&self, handle: RemoteDataHandle) -> SurrogateResult<()>;
    fn expire(&self, handle: RemoteDataHandle) -> SurrogateResult<()>;
    fn store(&self, payload: Value) -> SurrogateResult<RemoteDataHandle>;
    fn cleanup(&self);
}

struct Entry {
    payload: Value,
    retained: bool,
    inserted_at: Instant,
}

/// In-memory default: entries expire after [`InMemoryDataStore::TTL`]
/// unless explicitly retained, reaped by [`cleanup`](RemoteDataStore::cleanup).
pub struct InMemoryDataStore {
    entries: Mutex<HashMap<RemoteDataHandle, Entry>>,
}

impl InMemoryDataStore {
    pub const TTL: Duration = Duration::from_secs(3600);

    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteDataStore for InMemoryDataStore {
    fn resolve(&self, handle: RemoteDataHandle) -> SurrogateResult<Value> {
        self.entries
            .lock()
            .get(&handle)
            .map(|entry| entry.payload.clone())
            .ok_or_else(|| SurrogateError::UnknownHandle(handle.to_string()))
    }

    fn retain(&self, handle: RemoteDataHandle) -> SurrogateResult<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(&handle)
            .ok_or_else(|| SurrogateError::UnknownHandle(handle.to_string()))?;
        entry.retained = true;
        Ok(())
    }

    fn expire(&self, handle: RemoteDataHandle) -> SurrogateResult<()> {
        self.entries
            .lock()
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| SurrogateError::UnknownHandle(handle.to_string()))
    }

    fn store(&self, payload: Value) -> SurrogateResult<RemoteDataHandle> {
        let handle = RemoteDataHandle(Uuid::new_v4());
        self.entries.lock().insert(
            handle,
            Entry {
                payload,
                retained: false,
                inserted_at: Instant::now(),
            },
        );
        Ok(handle)
    }

    fn cleanup(&self) {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.retained || entry.inserted_at.elapsed() < Self::TTL);
        let reaped = before - entries.len();
        if reaped > 0 {
            tracing::debug!(reaped, "expired remote data handles");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_resolve_round_trips() {
        let store = InMemoryDataStore::new();
        let handle = store.store(serde_json::json!(5)).unwrap();
        assert_eq!(store.resolve(handle).unwrap(), serde_json::json!(5));
    }

    #[test]
    fn resolve_unknown_handle_fails() {
        let store = InMemoryDataStore::new();
        let handle = "00000000-0000-0000-0000-000000000000".parse().unwrap();
        assert!(matches!(store.resolve(handle), Err(SurrogateError::UnknownHandle(_))));
    }

    #[test]
    fn expire_removes_entry() {
        let store = InMemoryDataStore::new();
        let handle = store.store(serde_json::json!("x")).unwrap();
        store.expire(handle).unwrap();
        assert!(store.resolve(handle).is_err());
    }

    #[test]
    fn retained_entries_survive_cleanup() {
        let store = InMemoryDataStore::new();
        let handle = store.store(serde_json::json!("x")).unwrap();
        store.retain(handle).unwrap();
        store.cleanup();
        assert!(store.resolve(handle).is_ok());
    }
}
