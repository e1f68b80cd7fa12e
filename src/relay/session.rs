//! # Call Sessions
//!
//! In-memory record of one active call or meeting, and the registry that owns them.
//!
//! ## Session Lifecycle:
//! 1. **Created**: `SessionRegistry::create`, active from the first moment
//! 2. **Streaming**: `streamId` assigned; audio counters move with every frame
//! 3. **Removed**: `SessionRegistry::remove` deactivates the session and drops it from
//!    the map in the same critical section, so an inactive session is never visible
//!
//! ## Thread Safety:
//! Counters are atomics so stats can be read without blocking audio. Writers that need
//! the counter and the channel write to agree (sequence numbers, the final `end`
//! message) serialize on the per-session ingress lock.

use crate::error::RelayError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// One active call or meeting.
pub struct CallSession {
    id: String,
    started_at: DateTime<Utc>,
    started: Instant,
    active: AtomicBool,
    ingress: Mutex<()>,
    bytes_processed: AtomicU64,
    frames_sent: AtomicU64,
    egress_frames: AtomicU64,
    egress_bytes: AtomicU64,
    stream_id: RwLock<Option<String>>,
}

/// Point-in-time view of a session, as served by the stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStats {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub active: bool,
    pub duration_ms: u64,
    pub bytes_processed: u64,
    pub stream_id: Option<String>,
    pub frames_sent: u64,
    pub egress_frames: u64,
    pub egress_bytes: u64,
}

impl CallSession {
    fn new(id: String) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            started: Instant::now(),
            active: AtomicBool::new(true),
            ingress: Mutex::new(()),
            bytes_processed: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            egress_frames: AtomicU64::new(0),
            egress_bytes: AtomicU64::new(0),
            stream_id: RwLock::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::SeqCst)
    }

    pub fn duration_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn stream_id(&self) -> Option<String> {
        self.stream_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Begin a new stream epoch. Counters carry over.
    pub fn begin_stream(&self) -> String {
        let stream_id = Uuid::new_v4().to_string();
        *self
            .stream_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(stream_id.clone());
        debug!(call_id = %self.id, stream_id = %stream_id, "Stream epoch started");
        stream_id
    }

    /// Exclusive access to the ingress path of this session.
    pub async fn lock_ingress(&self) -> MutexGuard<'_, ()> {
        self.ingress.lock().await
    }

    /// Account one forwarded frame. `original_len` is the size before any transform.
    /// Returns the new byte total.
    pub fn record_ingress(&self, original_len: usize) -> u64 {
        self.frames_sent.fetch_add(1, Ordering::SeqCst);
        self.bytes_processed
            .fetch_add(original_len as u64, Ordering::SeqCst)
            + original_len as u64
    }

    pub fn record_egress(&self, len: usize) {
        self.egress_frames.fetch_add(1, Ordering::SeqCst);
        self.egress_bytes.fetch_add(len as u64, Ordering::SeqCst);
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn stats(&self) -> CallStats {
        CallStats {
            id: self.id.clone(),
            started_at: self.started_at,
            active: self.is_active(),
            duration_ms: self.duration_ms(),
            bytes_processed: self.bytes_processed(),
            stream_id: self.stream_id(),
            frames_sent: self.frames_sent.load(Ordering::SeqCst),
            egress_frames: self.egress_frames.load(Ordering::SeqCst),
            egress_bytes: self.egress_bytes.load(Ordering::SeqCst),
        }
    }
}

/// Owns every live [`CallSession`], keyed by call id.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<CallSession>>>,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    // A panic while holding the lock cannot leave the map half-written, so a
    // poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<CallSession>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<CallSession>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new session.
    ///
    /// ## Returns:
    /// - **Err(DuplicateSession)**: the id is already live
    /// - **Err(CapacityExceeded)**: the registry is full
    pub fn create(&self, id: &str) -> Result<Arc<CallSession>, RelayError> {
        let mut sessions = self.write();

        if sessions.contains_key(id) {
            return Err(RelayError::DuplicateSession(id.to_string()));
        }
        if sessions.len() >= self.capacity {
            return Err(RelayError::CapacityExceeded(self.capacity));
        }

        let session = Arc::new(CallSession::new(id.to_string()));
        sessions.insert(id.to_string(), session.clone());
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Result<Arc<CallSession>, RelayError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))
    }

    /// Deactivate and drop a session. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &str) -> Option<Arc<CallSession>> {
        let mut sessions = self.write();
        match sessions.remove(id) {
            Some(session) => {
                session.deactivate();
                Some(session)
            }
            None => {
                warn!(call_id = %id, "Attempted to remove unknown call session");
                None
            }
        }
    }

    /// Live call ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn sessions(&self) -> Vec<Arc<CallSession>> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let registry = SessionRegistry::new(10);
        let session = registry.create("call_1").unwrap();
        assert!(session.is_active());
        assert_eq!(session.bytes_processed(), 0);
        assert_eq!(session.stream_id(), None);
        assert_eq!(registry.get("call_1").unwrap().id(), "call_1");
        assert_eq!(
            registry.get("call_2").err(),
            Some(RelayError::SessionNotFound("call_2".to_string()))
        );
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let registry = SessionRegistry::new(10);
        registry.create("call_1").unwrap();
        assert_eq!(
            registry.create("call_1").err(),
            Some(RelayError::DuplicateSession("call_1".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capacity_limit() {
        let registry = SessionRegistry::new(2);
        registry.create("a").unwrap();
        registry.create("b").unwrap();
        assert_eq!(registry.create("c").err(), Some(RelayError::CapacityExceeded(2)));

        registry.remove("a");
        assert!(registry.create("c").is_ok());
    }

    #[test]
    fn test_remove_deactivates_and_is_idempotent() {
        let registry = SessionRegistry::new(10);
        let session = registry.create("call_1").unwrap();

        let removed = registry.remove("call_1").unwrap();
        assert!(Arc::ptr_eq(&session, &removed));
        assert!(!session.is_active());
        assert!(registry.is_empty());

        assert!(registry.remove("call_1").is_none());
        // The id can be reused once the previous call ended.
        assert!(registry.create("call_1").unwrap().is_active());
    }

    #[test]
    fn test_counters_and_stream_epochs() {
        let registry = SessionRegistry::new(10);
        let session = registry.create("call_1").unwrap();

        assert_eq!(session.record_ingress(100), 100);
        assert_eq!(session.record_ingress(60), 160);
        session.record_egress(40);

        let first = session.begin_stream();
        let second = session.begin_stream();
        assert_ne!(first, second);

        let stats = session.stats();
        assert_eq!(stats.bytes_processed, 160);
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.egress_frames, 1);
        assert_eq!(stats.egress_bytes, 40);
        assert_eq!(stats.stream_id, Some(second));
    }

    #[test]
    fn test_ids_are_sorted() {
        let registry = SessionRegistry::new(10);
        for id in ["c", "a", "b"] {
            registry.create(id).unwrap();
        }
        assert_eq!(registry.ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_concurrent_create_distinct_ids() {
        let registry = Arc::new(SessionRegistry::new(100));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.create(&format!("call_{}", i)).is_ok())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(registry.len(), 16);
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let registry = SessionRegistry::new(10);
        let session = registry.create("call_1").unwrap();
        let value = serde_json::to_value(session.stats()).unwrap();
        assert_eq!(value["id"], "call_1");
        assert_eq!(value["bytesProcessed"], 0);
        assert!(value.get("startedAt").is_some());
        assert!(value.get("durationMs").is_some());
    }
}
