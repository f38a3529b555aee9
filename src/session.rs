//! In-memory scan session tracker.
//!
//! A passive keyed store: the scanner writes, everybody else reads snapshots.
//! Terminal sessions are immutable and are the only ones retention may drop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::config::ScannerConfig;
use crate::error::{Result, ScanError};
use crate::types::ScanSession;

/// How many sessions to keep and for how long after they finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub max_sessions: usize,
    pub ttl: Option<Duration>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            ttl: None,
        }
    }
}

impl From<&ScannerConfig> for SessionPolicy {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            max_sessions: config.max_sessions.max(1),
            ttl: config.session_ttl(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionTracker {
    policy: SessionPolicy,
    sessions: RwLock<HashMap<Uuid, ScanSession>>,
    finished_total: AtomicU64,
}

impl SessionTracker {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            sessions: RwLock::new(HashMap::new()),
            finished_total: AtomicU64::new(0),
        }
    }

    /// Insert a new session, pruning finished ones per the policy first.
    pub async fn create(&self, session: ScanSession) -> Uuid {
        let id = session.id;
        let mut map = self.sessions.write().await;
        prune_locked(&mut map, &self.policy, OffsetDateTime::now_utc());
        if session.status.is_terminal() {
            self.finished_total.fetch_add(1, Ordering::Relaxed);
        }
        map.insert(id, session);
        id
    }

    pub async fn get(&self, id: Uuid) -> Result<ScanSession> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ScanError::SessionNotFound(id))
    }

    /// Apply `mutator` under the write lock and return the updated snapshot.
    ///
    /// Terminal sessions reject further changes.
    pub async fn update<F>(&self, id: Uuid, mutator: F) -> Result<ScanSession>
    where
        F: FnOnce(&mut ScanSession),
    {
        let mut map = self.sessions.write().await;
        let session = map.get_mut(&id).ok_or(ScanError::SessionNotFound(id))?;
        if session.status.is_terminal() {
            return Err(ScanError::SessionFinalized(id));
        }
        mutator(session);
        if session.status.is_terminal() {
            self.finished_total.fetch_add(1, Ordering::Relaxed);
        }
        Ok(session.clone())
    }

    /// Sessions that have reached a terminal state, evicted ones included.
    pub fn finished_total(&self) -> u64 {
        self.finished_total.load(Ordering::Relaxed)
    }

    /// Sessions newest first, at most `limit`.
    pub async fn recent(&self, limit: usize) -> Vec<ScanSession> {
        let mut all: Vec<ScanSession> =
            self.sessions.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all.truncate(limit);
        all
    }

    /// Sessions that have not reached a terminal state.
    pub async fn active_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| !s.status.is_terminal())
            .count()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Drop expired terminal sessions, then the oldest terminal ones until there is room
/// for one more. Running sessions are never dropped, so the map may exceed the cap
/// while many scans are in flight.
fn prune_locked(
    map: &mut HashMap<Uuid, ScanSession>,
    policy: &SessionPolicy,
    now: OffsetDateTime,
) {
    if let Some(ttl) = policy.ttl {
        let cutoff = now - ttl;
        map.retain(|_, s| match s.ended_at {
            Some(ended) if s.status.is_terminal() => ended > cutoff,
            _ => true,
        });
    }

    if map.len() < policy.max_sessions {
        return;
    }
    let mut finished: Vec<(OffsetDateTime, Uuid)> = map
        .values()
        .filter(|s| s.status.is_terminal())
        .map(|s| (s.ended_at.unwrap_or(s.started_at), s.id))
        .collect();
    finished.sort();
    let excess = map.len() + 1 - policy.max_sessions;
    for (_, id) in finished.into_iter().take(excess) {
        debug!(session = %id, "evicting finished session");
        map.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScanStatus;

    fn finished(host: &str) -> ScanSession {
        let mut s = ScanSession::new(host, 1, 10);
        s.finish(ScanStatus::Completed, None);
        s
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let tracker = SessionTracker::default();
        let err = tracker.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ScanError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn update_mutates_until_terminal() {
        let tracker = SessionTracker::default();
        let id = tracker.create(ScanSession::new("h", 1, 2)).await;

        let s = tracker
            .update(id, |s| {
                s.status = ScanStatus::Running;
                s.record_scanned();
            })
            .await
            .unwrap();
        assert_eq!(s.scanned_ports, 1);
        assert_eq!(tracker.finished_total(), 0);

        tracker
            .update(id, |s| s.finish(ScanStatus::Completed, None))
            .await
            .unwrap();
        assert_eq!(tracker.finished_total(), 1);
        let err = tracker.update(id, |s| s.record_scanned()).await.unwrap_err();
        assert!(matches!(err, ScanError::SessionFinalized(_)));
        assert_eq!(tracker.get(id).await.unwrap().scanned_ports, 1);
    }

    #[tokio::test]
    async fn cap_evicts_oldest_finished_only() {
        let tracker = SessionTracker::new(SessionPolicy {
            max_sessions: 2,
            ttl: None,
        });
        let running = tracker.create(ScanSession::new("running", 1, 1)).await;
        let old = tracker.create(finished("old")).await;
        let newer = tracker.create(finished("newer")).await;

        assert_eq!(tracker.len().await, 2);
        assert!(tracker.get(running).await.is_ok());
        assert!(tracker.get(old).await.is_err());
        assert!(tracker.get(newer).await.is_ok());
        assert_eq!(tracker.active_count().await, 1);
        // The evicted session still counts as a finished scan.
        assert_eq!(tracker.finished_total(), 2);
    }

    #[tokio::test]
    async fn ttl_drops_expired_finished_sessions() {
        let tracker = SessionTracker::new(SessionPolicy {
            max_sessions: 10,
            ttl: Some(Duration::from_secs(60)),
        });
        let mut stale = finished("stale");
        stale.ended_at = Some(OffsetDateTime::now_utc() - Duration::from_secs(120));
        let stale_id = tracker.create(stale).await;
        let fresh_id = tracker.create(finished("fresh")).await;

        assert!(tracker.get(stale_id).await.is_err());
        assert!(tracker.get(fresh_id).await.is_ok());
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let tracker = SessionTracker::default();
        let mut a = ScanSession::new("a", 1, 1);
        a.started_at -= Duration::from_secs(10);
        tracker.create(a).await;
        tracker.create(ScanSession::new("b", 1, 1)).await;

        let hosts: Vec<String> = tracker
            .recent(5)
            .await
            .into_iter()
            .map(|s| s.target_host)
            .collect();
        assert_eq!(hosts, vec!["b", "a"]);
        assert_eq!(tracker.recent(1).await.len(), 1);
    }
}
