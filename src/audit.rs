//! Append-only audit log of mediation decisions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AuditError, AuditResult};

/// A single logged mediation decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub token_id: String,
    pub action: String,
    pub confidence: f64,
    pub principles: Vec<String>,
    pub reasoning: String,
    pub operation: Option<String>,
    pub severity: Option<String>,
    pub was_deep: bool,
}

impl AuditEntry {
    /// A single-line human-readable encoding. Reasoning longer than 50
    /// characters is shown in full; otherwise it is truncated to 50
    /// characters with a trailing `...` marker when truncation actually
    /// occurs. This is one function with one length-conditional branch,
    /// not two distinct encodings.
    pub fn to_short_string(&self) -> String {
        let reasoning = if self.reasoning.chars().count() > 50 {
            let truncated: String = self.reasoning.chars().take(50).collect();
            format!("{truncated}...")
        } else {
            self.reasoning.clone()
        };
        format!(
            "[{}] {} action={} confidence={:.2} deep={} reasoning={}",
            self.timestamp.to_rfc3339(),
            self.token_id,
            self.action,
            self.confidence,
            self.was_deep,
            reasoning
        )
    }
}

/// Aggregate statistics over the log.
#[derive(Debug, Clone, Serialize)]
pub struct AuditSummary {
    pub total: usize,
    pub by_action: std::collections::BTreeMap<String, usize>,
    pub mean_confidence: f64,
    pub deep_count: usize,
}

/// Durable append-log capability. The core never assumes a concrete file
/// or database; hosts provide an implementation.
#[async_trait::async_trait]
pub trait AuditStorage: Send + Sync {
    async fn append_line(&self, line: &str) -> std::io::Result<()>;
    async fn read_all_lines(&self) -> std::io::Result<Vec<String>>;
    async fn clear(&self) -> std::io::Result<()>;
}

/// In-memory reference implementation of [`AuditStorage`], suitable for a
/// host that wants durability without wiring in a real file/db backend.
#[derive(Default)]
pub struct InMemoryAuditStorage {
    lines: RwLock<Vec<String>>,
}

#[async_trait::async_trait]
impl AuditStorage for InMemoryAuditStorage {
    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        self.lines.write().await.push(line.to_string());
        Ok(())
    }

    async fn read_all_lines(&self) -> std::io::Result<Vec<String>> {
        Ok(self.lines.read().await.clone())
    }

    async fn clear(&self) -> std::io::Result<()> {
        self.lines.write().await.clear();
        Ok(())
    }
}

/// In-memory cache over a durable append-log, bounded by `max_entries`.
pub struct AuditLog {
    cache: RwLock<Vec<AuditEntry>>,
    storage: Arc<dyn AuditStorage>,
    max_entries: usize,
    hydrated: RwLock<bool>,
}

impl AuditLog {
    pub fn new(storage: Arc<dyn AuditStorage>, max_entries: usize) -> Self {
        Self {
            cache: RwLock::new(Vec::new()),
            storage,
            max_entries,
            hydrated: RwLock::new(false),
        }
    }

    async fn ensure_hydrated(&self) {
        {
            if *self.hydrated.read().await {
                return;
            }
        }
        let mut hydrated = self.hydrated.write().await;
        if *hydrated {
            return;
        }
        match self.storage.read_all_lines().await {
            Ok(lines) => {
                let mut cache = self.cache.write().await;
                for line in lines {
                    if let Ok(entry) = serde_json::from_str::<AuditEntry>(&line) {
                        cache.push(entry);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("audit log hydration failed: {e}");
            }
        }
        *hydrated = true;
    }

    /// Append an entry. A durable-storage failure is logged and does not
    /// surface to the caller; the in-memory cache is still updated.
    pub async fn log(&self, entry: AuditEntry) -> AuditResult<()> {
        self.ensure_hydrated().await;
        let line = serde_json::to_string(&entry)
            .map_err(|e| AuditError::StorageWrite(e.to_string()))?;
        if let Err(e) = self.storage.append_line(&line).await {
            tracing::warn!("audit log durable write failed: {e}");
        }
        let mut cache = self.cache.write().await;
        cache.push(entry);
        if cache.len() > self.max_entries {
            let overflow = cache.len() - self.max_entries;
            cache.drain(0..overflow);
        }
        Ok(())
    }

    pub async fn recent(&self, n: usize) -> Vec<AuditEntry> {
        self.ensure_hydrated().await;
        let cache = self.cache.read().await;
        cache.iter().rev().take(n).cloned().collect()
    }

    pub async fn filter_by_action(&self, action: &str) -> Vec<AuditEntry> {
        self.ensure_hydrated().await;
        let cache = self.cache.read().await;
        cache.iter().filter(|e| e.action == action).cloned().collect()
    }

    pub async fn filter_by_date(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<AuditEntry> {
        self.ensure_hydrated().await;
        let cache = self.cache.read().await;
        cache
            .iter()
            .filter(|e| start.is_none_or(|s| e.timestamp >= s) && end.is_none_or(|d| e.timestamp <= d))
            .cloned()
            .collect()
    }

    pub async fn summary(&self) -> AuditSummary {
        self.ensure_hydrated().await;
        let cache = self.cache.read().await;
        let mut by_action = std::collections::BTreeMap::new();
        let mut deep_count = 0;
        let mut confidence_sum = 0.0;
        for entry in cache.iter() {
            *by_action.entry(entry.action.clone()).or_insert(0) += 1;
            if entry.was_deep {
                deep_count += 1;
            }
            confidence_sum += entry.confidence;
        }
        let total = cache.len();
        AuditSummary {
            total,
            by_action,
            mean_confidence: if total > 0 { confidence_sum / total as f64 } else { 0.0 },
            deep_count,
        }
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
        if let Err(e) = self.storage.clear().await {
            tracing::warn!("audit log storage clear failed: {e}");
        }
    }
}
