//! Loss computer: `L(P) = d(P, C(R(P)))`, plus evidence-tier classification,
//! explosion prevention, and bootstrap fixed-point verification.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::cache::LossCache;
use crate::distance::SemanticDistance;
use crate::generator::{reconstitute, restructure, Generator};

pub const EXPLOSION_THRESHOLD: f64 = 0.6;

/// Kent-calibration reliability tier for a loss value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceTier {
    Categorical,
    Empirical,
    Aesthetic,
    Somatic,
    Chaotic,
}

pub fn classify_evidence_tier(loss: f64) -> EvidenceTier {
    if loss < 0.10 {
        EvidenceTier::Categorical
    } else if loss < 0.38 {
        EvidenceTier::Empirical
    } else if loss < 0.45 {
        EvidenceTier::Aesthetic
    } else if loss < 0.65 {
        EvidenceTier::Somatic
    } else {
        EvidenceTier::Chaotic
    }
}

/// Whether the triple `(A, ¬A, A∧¬A)` explodes: the combined loss exceeds
/// `EXPLOSION_THRESHOLD`.
pub fn prevents_explosion(loss_a: f64, loss_not_a: f64, loss_conjunction: f64) -> bool {
    loss_a + loss_not_a + loss_conjunction > EXPLOSION_THRESHOLD
}

/// Outcome of a bootstrap self-check: does a governing text survive its
/// own restructure/reconstitute cycle close to a fixed point?
#[derive(Debug, Clone)]
pub struct BootstrapVerification {
    pub loss: f64,
    pub regenerability: f64,
    pub is_self_describing: bool,
}

pub async fn verify_bootstrap_fixed_point(
    spec_text: &str,
    computer: &LossComputer,
) -> BootstrapVerification {
    let loss = computer.compute_loss(spec_text, false).await;
    BootstrapVerification {
        loss,
        regenerability: 1.0 - loss,
        is_self_describing: loss < 0.15,
    }
}

/// Computes `L(P) = d(P, C(R(P)))` with caching and generator fallback.
pub struct LossComputer {
    generator: Option<Arc<dyn Generator>>,
    metric: Arc<dyn SemanticDistance>,
    cache: Mutex<LossCache>,
}

impl LossComputer {
    pub fn new(metric: Arc<dyn SemanticDistance>, cache_size: usize) -> Self {
        Self { generator: None, metric, cache: Mutex::new(LossCache::new(cache_size)) }
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// `compute_loss(content)`. Checks the cache first; on a miss, attempts
    /// the full R∘C computation when a generator is configured, falling
    /// back to a heuristic "simplified" reconstruction (first and last
    /// sentences) on any generator failure or absence.
    pub async fn compute_loss(&self, content: &str, use_cache: bool) -> f64 {
        self.compute_loss_scoped(content, "node", use_cache).await
    }

    pub async fn node_loss(&self, content: &str) -> f64 {
        self.compute_loss_scoped(content, "node", true).await
    }

    pub async fn edge_loss(&self, source_text: &str, edge_kind: &str, target_text: &str) -> f64 {
        let combined = format!("{source_text} --[{edge_kind}]--> {target_text}");
        self.compute_loss_scoped(&combined, "edge", true).await
    }

    pub async fn proof_loss(&self, text: &str) -> f64 {
        self.compute_loss_scoped(text, "proof", true).await
    }

    pub fn coherence_from_loss(loss: f64) -> f64 {
        1.0 - loss
    }

    async fn compute_loss_scoped(&self, content: &str, loss_type: &str, use_cache: bool) -> f64 {
        if use_cache {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(content, loss_type) {
                return cached;
            }
        }

        let loss = self.compute_uncached(content).await;

        if use_cache {
            let mut cache = self.cache.lock().await;
            cache.set(content, loss_type, loss, self.metric.name());
        }
        loss.clamp(0.0, 1.0)
    }

    async fn compute_uncached(&self, content: &str) -> f64 {
        if let Some(generator) = &self.generator {
            let modular = restructure(generator.as_ref(), content).await;
            if let Ok(modular) = modular {
                if let Ok(reconstituted) = reconstitute(generator.as_ref(), &modular).await {
                    return self.metric.distance(content, &reconstituted).await;
                }
            }
        }
        let simplified = simplify_content(content);
        self.metric.distance(content, &simplified).await
    }
}

/// Heuristic simplification used as a cheap reconstitution stand-in when
/// the generator path is unavailable: first and last sentence.
fn simplify_content(content: &str) -> String {
    let sentences: Vec<&str> = content
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    match sentences.len() {
        0 => String::new(),
        1 => sentences[0].to_string(),
        _ => format!("{}. {}.", sentences[0], sentences[sentences.len() - 1]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::JaccardDistance;

    #[tokio::test]
    async fn loss_without_generator_uses_simplification_fallback() {
        let computer = LossComputer::new(Arc::new(JaccardDistance), 10);
        let loss = computer.compute_loss("one. two. three.", false).await;
        assert!((0.0..=1.0).contains(&loss));
    }

    #[tokio::test]
    async fn cached_loss_is_reused() {
        let computer = LossComputer::new(Arc::new(JaccardDistance), 10);
        let first = computer.compute_loss("repeat me", true).await;
        let second = computer.compute_loss("repeat me", true).await;
        assert_eq!(first, second);
    }

    #[test]
    fn evidence_tier_boundaries() {
        assert_eq!(classify_evidence_tier(0.05), EvidenceTier::Categorical);
        assert_eq!(classify_evidence_tier(0.20), EvidenceTier::Empirical);
        assert_eq!(classify_evidence_tier(0.40), EvidenceTier::Aesthetic);
        assert_eq!(classify_evidence_tier(0.50), EvidenceTier::Somatic);
        assert_eq!(classify_evidence_tier(0.80), EvidenceTier::Chaotic);
    }

    #[test]
    fn explosion_prevention_threshold() {
        assert!(!prevents_explosion(0.1, 0.1, 0.1));
        assert!(prevents_explosion(0.3, 0.3, 0.3));
    }

    #[tokio::test]
    async fn bootstrap_verification_flags_self_describing_text() {
        let computer = LossComputer::new(Arc::new(JaccardDistance), 10);
        let result = verify_bootstrap_fixed_point("stable text. stable text.", &computer).await;
        assert!(result.regenerability >= 0.0);
    }
}
