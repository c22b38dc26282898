//! # session
//!
//! [`SessionRegistry`] — bookkeeping for connected client sessions and
//! their subscription scope. A session is created on WebSocket connect and
//! torn down on disconnect or heartbeat timeout; its delivery path (the
//! broadcast receiver) lives in the session task itself, so removal from
//! the registry is all the cleanup fanout needs.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::Timeframe;

/// One connected client and what it wants to see.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSession {
    pub id: Uuid,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: RwLock<HashMap<Uuid, ClientSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, symbol: &str, timeframe: Timeframe) -> ClientSession {
        let session = ClientSession {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            timeframe,
            connected_at: Utc::now(),
        };
        self.inner
            .write()
            .expect("session registry poisoned")
            .insert(session.id, session.clone());
        session
    }

    pub fn set_subscription(&self, id: Uuid, symbol: &str, timeframe: Timeframe) {
        if let Some(session) = self
            .inner
            .write()
            .expect("session registry poisoned")
            .get_mut(&id)
        {
            session.symbol = symbol.to_string();
            session.timeframe = timeframe;
        }
    }

    pub fn remove(&self, id: Uuid) {
        self.inner
            .write()
            .expect("session registry poisoned")
            .remove(&id);
    }

    pub fn count(&self) -> usize {
        self.inner.read().expect("session registry poisoned").len()
    }

    pub fn snapshot(&self) -> Vec<ClientSession> {
        self.inner
            .read()
            .expect("session registry poisoned")
            .values()
            .cloned()
            .collect()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_update_remove() {
        let registry = SessionRegistry::new();
        let session = registry.register("XAUUSD", Timeframe::M1);
        assert_eq!(registry.count(), 1);

        registry.set_subscription(session.id, "XAUUSD", Timeframe::M15);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].timeframe, Timeframe::M15);

        registry.remove(session.id);
        assert_eq!(registry.count(), 0);
    }
}
