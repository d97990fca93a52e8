use std::sync::Arc;

use dashmap::DashMap;
use metrics::gauge;
use serde::Serialize;
use uuid::Uuid;

use crate::session::{ProbeSession, SessionState};

/// Live sessions, kept for introspection only. The lifecycle of a session
/// never depends on its presence here.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, Arc<ProbeSession>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: SessionState,
    pub age_ms: u64,
    pub remaining_ttl_ms: u64,
    pub probe_running: bool,
    pub channel: Option<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, session: Arc<ProbeSession>) {
        self.sessions.insert(session.id(), session);
        self.publish_gauge();
    }

    pub(crate) fn remove(&self, session_id: Uuid) -> Option<Arc<ProbeSession>> {
        let removed = self.sessions.remove(&session_id).map(|(_, session)| session);
        self.publish_gauge();
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn sessions(&self) -> Vec<Arc<ProbeSession>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> = self
            .sessions()
            .into_iter()
            .map(|session| SessionSnapshot {
                session_id: session.id(),
                state: session.state(),
                age_ms: session.age().as_millis() as u64,
                remaining_ttl_ms: session.remaining().as_millis() as u64,
                probe_running: session.probe_running(),
                channel: session.channel_label(),
            })
            .collect();
        snapshots.sort_by(|a, b| b.age_ms.cmp(&a.age_ms));
        snapshots
    }

    fn publish_gauge(&self) {
        gauge!("rtc_probe_sessions_active").set(self.sessions.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::MockTransport;
    use crate::transport::PeerTransport;

    async fn session(ttl: Duration) -> Arc<ProbeSession> {
        let peer = MockTransport::default()
            .create_session()
            .await
            .expect("mock session");
        Arc::new(ProbeSession::new(peer, ttl))
    }

    #[test_timeout::tokio_timeout_test(10, paused)]
    async fn snapshot_lists_oldest_first() {
        let registry = SessionRegistry::new();
        let older = session(Duration::from_secs(20)).await;
        registry.insert(Arc::clone(&older));
        tokio::time::sleep(Duration::from_secs(3)).await;
        let newer = session(Duration::from_secs(20)).await;
        registry.insert(Arc::clone(&newer));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].session_id, older.id());
        assert_eq!(snapshot[0].age_ms, 3_000);
        assert_eq!(snapshot[0].remaining_ttl_ms, 17_000);
        assert_eq!(snapshot[1].session_id, newer.id());
        assert_eq!(snapshot[1].state, SessionState::Created);
        assert_eq!(snapshot[1].channel, None);

        assert!(registry.remove(older.id()).is_some());
        assert!(registry.remove(older.id()).is_none());
        assert_eq!(registry.len(), 1);
    }
}
