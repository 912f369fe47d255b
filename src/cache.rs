//! Content-hash-keyed cache for expensive distance/loss computations.

use std::collections::HashMap;

/// A cached loss/distance value.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: f64,
    pub metric_name: String,
    pub cached_at: chrono::DateTime<chrono::Utc>,
}

/// Stable 16-hex-character digest of content, used as the cache key.
pub fn content_hash(content: &str) -> String {
    let hash = blake3::hash(content.as_bytes());
    hash.to_hex()[..16].to_string()
}

/// FIFO-evicting cache keyed by content hash, with a secondary key for the
/// kind of loss being cached (e.g. `node`, `edge`, `proof`).
pub struct LossCache {
    // insertion order preserved by `Vec` of keys alongside the map, so FIFO
    // eviction doesn't depend on hash iteration order.
    order: Vec<String>,
    entries: HashMap<String, HashMap<String, CacheEntry>>,
    max_size: usize,
}

impl LossCache {
    pub fn new(max_size: usize) -> Self {
        Self { order: Vec::new(), entries: HashMap::new(), max_size }
    }

    pub fn get(&self, content: &str, loss_type: &str) -> Option<f64> {
        let key = content_hash(content);
        self.entries.get(&key)?.get(loss_type).map(|e| e.value)
    }

    pub fn set(&mut self, content: &str, loss_type: &str, value: f64, metric_name: &str) {
        let key = content_hash(content);
        if !self.entries.contains_key(&key) {
            if self.entries.len() >= self.max_size {
                if let Some(oldest) = self.order.first().cloned() {
                    self.entries.remove(&oldest);
                    self.order.remove(0);
                }
            }
            self.order.push(key.clone());
        }
        self.entries.entry(key).or_default().insert(
            loss_type.to_string(),
            CacheEntry { value, metric_name: metric_name.to_string(), cached_at: chrono::Utc::now() },
        );
    }

    pub fn invalidate(&mut self, content: &str) {
        let key = content_hash(content);
        self.entries.remove(&key);
        self.order.retain(|k| k != &key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_sixteen_hex_chars() {
        let h = content_hash("hello world");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut cache = LossCache::new(10);
        cache.set("some content", "node", 0.3, "canonical");
        assert_eq!(cache.get("some content", "node"), Some(0.3));
        assert_eq!(cache.get("some content", "edge"), None);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut cache = LossCache::new(2);
        cache.set("a", "node", 0.1, "m");
        cache.set("b", "node", 0.2, "m");
        cache.set("c", "node", 0.3, "m");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a", "node"), None);
        assert_eq!(cache.get("c", "node"), Some(0.3));
    }

    #[test]
    fn invalidate_removes_all_loss_types_for_content() {
        let mut cache = LossCache::new(10);
        cache.set("x", "node", 0.1, "m");
        cache.set("x", "edge", 0.2, "m");
        cache.invalidate("x");
        assert_eq!(cache.get("x", "node"), None);
        assert_eq!(cache.get("x", "edge"), None);
    }
}
