//! Multi-user hosting for the soul engine: maps a user id to its own
//! [`SoulEngine`] instance and prunes idle ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use crate::audit::AuditLog;
use crate::soul::{SoulConfig, SoulEngine};

/// Owns one [`SoulEngine`] per user id. A single core instance is
/// single-writer; hosting many instances behind a manager is an ambient
/// concern, not a change to that contract.
pub struct SoulSessionManager {
    sessions: RwLock<HashMap<String, Arc<Mutex<SoulEngine>>>>,
    last_active: RwLock<HashMap<String, chrono::DateTime<chrono::Utc>>>,
    audit: Arc<AuditLog>,
}

impl SoulSessionManager {
    pub fn new(audit: Arc<AuditLog>) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), last_active: RwLock::new(HashMap::new()), audit }
    }

    pub async fn get_or_create(&self, user_id: &str) -> Arc<Mutex<SoulEngine>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(user_id) {
                self.touch(user_id).await;
                return Arc::clone(session);
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(user_id) {
            return Arc::clone(session);
        }

        let engine = Arc::new(Mutex::new(SoulEngine::new(SoulConfig::default(), Arc::clone(&self.audit))));
        sessions.insert(user_id.to_string(), Arc::clone(&engine));
        drop(sessions);
        self.touch(user_id).await;
        engine
    }

    async fn touch(&self, user_id: &str) {
        self.last_active.write().await.insert(user_id.to_string(), chrono::Utc::now());
    }

    /// Remove sessions idle for longer than `max_idle`. Returns the number
    /// pruned.
    pub async fn prune_stale(&self, max_idle: Duration) -> usize {
        let cutoff = chrono::Utc::now() - chrono::TimeDelta::seconds(max_idle.as_secs() as i64);
        let stale: Vec<String> = {
            let last_active = self.last_active.read().await;
            last_active.iter().filter(|(_, t)| **t < cutoff).map(|(id, _)| id.clone()).collect()
        };
        if stale.is_empty() {
            return 0;
        }
        let mut sessions = self.sessions.write().await;
        let mut last_active = self.last_active.write().await;
        for id in &stale {
            sessions.remove(id);
            last_active.remove(id);
        }
        if !stale.is_empty() {
            tracing::info!("pruned {} stale soul session(s)", stale.len());
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditStorage;

    fn manager() -> SoulSessionManager {
        SoulSessionManager::new(Arc::new(AuditLog::new(Arc::new(InMemoryAuditStorage::default()), 10)))
    }

    #[tokio::test]
    async fn get_or_create_returns_same_instance_for_same_user() {
        let manager = manager();
        let a = manager.get_or_create("user-1").await;
        let b = manager.get_or_create("user-1").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn different_users_get_different_instances() {
        let manager = manager();
        let a = manager.get_or_create("user-1").await;
        let b = manager.get_or_create("user-2").await;
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn prune_stale_removes_idle_sessions() {
        let manager = manager();
        manager.get_or_create("user-1").await;
        manager.last_active.write().await.insert("user-1".to_string(), chrono::Utc::now() - chrono::TimeDelta::days(10));
        let pruned = manager.prune_stale(Duration::from_secs(86400)).await;
        assert_eq!(pruned, 1);
    }
}
