//! Pluggable semantic distance metrics with a canonical fallback chain.
//!
//! `distance(a, b)` is in `[0, 1]`: 0 means semantically identical, 1 means
//! maximally different. Implementations are not required to satisfy the
//! triangle inequality.

use std::collections::HashSet;

/// A semantic distance metric.
#[async_trait::async_trait]
pub trait SemanticDistance: Send + Sync {
    async fn distance(&self, a: &str, b: &str) -> f64;
    fn name(&self) -> &str;
}

/// Pure, dependency-free fallback: one minus the Jaccard index over
/// whitespace-tokenized lowercase words.
pub struct JaccardDistance;

#[async_trait::async_trait]
impl SemanticDistance for JaccardDistance {
    async fn distance(&self, a: &str, b: &str) -> f64 {
        jaccard_distance(a, b)
    }

    fn name(&self) -> &str {
        "jaccard"
    }
}

/// Synchronous Jaccard distance, used directly by callers (e.g. axiom
/// clustering) that don't need the async metric trait.
pub fn jaccard_distance(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    1.0 - (intersection as f64 / union as f64)
}

/// Bidirectional NLI entailment probability capability. Hosts implement
/// this against whatever contradiction/entailment model they have.
#[async_trait::async_trait]
pub trait EntailmentModel: Send + Sync {
    /// Probability that `premise` entails `hypothesis`, in `[0, 1]`.
    async fn entailment_probability(&self, premise: &str, hypothesis: &str) -> Option<f64>;
}

/// Embedding-backed cosine similarity capability.
#[async_trait::async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Cosine similarity in `[-1, 1]`, or `None` if embedding failed.
    async fn cosine_similarity(&self, a: &str, b: &str) -> Option<f64>;
}

/// Token/contextual F1 overlap capability — the middle tier of the
/// fallback chain, between entailment and embedding similarity.
#[async_trait::async_trait]
pub trait ContextualF1Model: Send + Sync {
    /// F1 score over matched tokens/spans in `[0, 1]`, or `None` if scoring
    /// failed.
    async fn f1_score(&self, a: &str, b: &str) -> Option<f64>;
}

/// The canonical distance: bidirectional entailment, falling back to
/// contextual F1, falling back to embedding cosine similarity, falling
/// back to pure Jaccard.
///
/// `d(A, B) = 1 - sqrt(P(A⊨B) * P(B⊨A))` when an entailment model is
/// available and returns values for both directions; `d(A, B) = 1 - F1`
/// for the contextual-overlap tier.
pub struct CanonicalDistance {
    entailment: Option<Box<dyn EntailmentModel>>,
    contextual_f1: Option<Box<dyn ContextualF1Model>>,
    embedding: Option<Box<dyn EmbeddingModel>>,
}

impl CanonicalDistance {
    pub fn new() -> Self {
        Self { entailment: None, contextual_f1: None, embedding: None }
    }

    pub fn with_entailment(mut self, model: Box<dyn EntailmentModel>) -> Self {
        self.entailment = Some(model);
        self
    }

    pub fn with_contextual_f1(mut self, model: Box<dyn ContextualF1Model>) -> Self {
        self.contextual_f1 = Some(model);
        self
    }

    pub fn with_embedding(mut self, model: Box<dyn EmbeddingModel>) -> Self {
        self.embedding = Some(model);
        self
    }
}

impl Default for CanonicalDistance {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SemanticDistance for CanonicalDistance {
    async fn distance(&self, a: &str, b: &str) -> f64 {
        if let Some(model) = &self.entailment {
            let forward = model.entailment_probability(a, b).await;
            let backward = model.entailment_probability(b, a).await;
            if let (Some(p_ab), Some(p_ba)) = (forward, backward) {
                let product = (p_ab * p_ba).max(0.0);
                return (1.0 - product.sqrt()).clamp(0.0, 1.0);
            }
        }
        if let Some(model) = &self.contextual_f1 {
            if let Some(f1) = model.f1_score(a, b).await {
                return (1.0 - f1).clamp(0.0, 1.0);
            }
        }
        if let Some(model) = &self.embedding {
            if let Some(sim) = model.cosine_similarity(a, b).await {
                return (1.0 - sim).clamp(0.0, 1.0);
            }
        }
        jaccard_distance(a, b)
    }

    fn name(&self) -> &str {
        "canonical"
    }
}

/// Result of comparing several metrics against the same pair — a
/// calibration/diagnostic helper, not part of the hot loss-computation
/// path.
#[derive(Debug, Clone)]
pub struct MetricComparison {
    pub per_metric: Vec<(String, f64)>,
    pub mean_distance: f64,
    pub variance: f64,
}

/// Run every supplied metric over `(a, b)` and report mean/variance —
/// disagreement among metrics is a useful calibration signal.
pub async fn compare_metrics(a: &str, b: &str, metrics: &[&dyn SemanticDistance]) -> MetricComparison {
    let mut per_metric = Vec::with_capacity(metrics.len());
    for metric in metrics {
        let d = metric.distance(a, b).await;
        per_metric.push((metric.name().to_string(), d));
    }
    let n = per_metric.len().max(1) as f64;
    let mean = per_metric.iter().map(|(_, d)| d).sum::<f64>() / n;
    let variance = per_metric.iter().map(|(_, d)| (d - mean).powi(2)).sum::<f64>() / n;
    MetricComparison { per_metric, mean_distance: mean, variance }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_have_zero_jaccard_distance() {
        assert_eq!(jaccard_distance("a b c", "a b c"), 0.0);
    }

    #[test]
    fn disjoint_strings_have_max_jaccard_distance() {
        assert_eq!(jaccard_distance("a b", "c d"), 1.0);
    }

    #[tokio::test]
    async fn canonical_falls_back_to_jaccard_with_no_models() {
        let metric = CanonicalDistance::new();
        let d = metric.distance("hello world", "hello world").await;
        assert_eq!(d, 0.0);
    }

    struct AlwaysEntails;
    #[async_trait::async_trait]
    impl EntailmentModel for AlwaysEntails {
        async fn entailment_probability(&self, _premise: &str, _hypothesis: &str) -> Option<f64> {
            Some(0.9)
        }
    }

    #[tokio::test]
    async fn canonical_uses_entailment_when_available() {
        let metric = CanonicalDistance::new().with_entailment(Box::new(AlwaysEntails));
        let d = metric.distance("a", "b").await;
        assert!((d - (1.0 - 0.9_f64)).abs() < 1e-9);
    }

    struct FixedF1(f64);
    #[async_trait::async_trait]
    impl ContextualF1Model for FixedF1 {
        async fn f1_score(&self, _a: &str, _b: &str) -> Option<f64> {
            Some(self.0)
        }
    }

    #[tokio::test]
    async fn canonical_uses_contextual_f1_when_entailment_unavailable() {
        let metric = CanonicalDistance::new().with_contextual_f1(Box::new(FixedF1(0.8)));
        let d = metric.distance("a", "b").await;
        assert!((d - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn canonical_prefers_entailment_over_contextual_f1() {
        let metric = CanonicalDistance::new()
            .with_entailment(Box::new(AlwaysEntails))
            .with_contextual_f1(Box::new(FixedF1(0.1)));
        let d = metric.distance("a", "b").await;
        assert!((d - (1.0 - 0.9_f64)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn compare_metrics_reports_disagreement() {
        let jaccard = JaccardDistance;
        let canonical = CanonicalDistance::new();
        let metrics: Vec<&dyn SemanticDistance> = vec![&jaccard, &canonical];
        let result = compare_metrics("a b", "a b", &metrics).await;
        assert_eq!(result.per_metric.len(), 2);
        assert_eq!(result.variance, 0.0);
    }
}
