//! In-memory counter store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::ports::{Clock, CounterStore};

struct CounterEntry {
    value: u64,
    expires_at: DateTime<Utc>,
}

/// Counter store backed by a map, expiring entries against the injected
/// clock. Reference implementation of the port; a deployment would use
/// Redis with `INCR` + `EXPIRE NX` or an equivalent single script.
pub struct InMemoryCounterStore {
    state: Mutex<HashMap<String, CounterEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr(&self, key: &str, expires_at: DateTime<Utc>) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        // Create-with-expiry and increment are one operation under the
        // lock; the expiry is only set when the bucket is created.
        let entry = state.entry(key.to_string()).or_insert(CounterEntry {
            value: 0,
            expires_at,
        });
        if entry.expires_at <= now {
            entry.value = 0;
            entry.expires_at = expires_at;
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        match state.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value)),
            Some(_) => {
                // Lazy eviction on read.
                state.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.remove(key);
        Ok(())
    }
}
