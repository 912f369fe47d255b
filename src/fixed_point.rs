//! Fixed-point detection: repeated R∘C application stability analysis.

use std::collections::HashMap;

use crate::generator::{reconstitute, restructure, Generator};
use crate::loss::LossComputer;

pub const FIXED_POINT_THRESHOLD: f64 = 0.05;
pub const STABILITY_THRESHOLD: f64 = 0.02;
pub const MAX_STABILITY_ITERATIONS: usize = 3;

/// Outcome of applying repeated R∘C cycles to a piece of content.
#[derive(Debug, Clone)]
pub struct FixedPointResult {
    pub is_fixed_point: bool,
    pub loss: f64,
    pub stability: f64,
    pub iterations: usize,
    pub losses: Vec<f64>,
}

impl FixedPointResult {
    pub fn is_axiom_candidate(&self) -> bool {
        self.is_fixed_point && self.loss < 0.01
    }

    pub fn convergence_depth(&self) -> i64 {
        if self.is_fixed_point {
            self.iterations as i64
        } else {
            -1
        }
    }

    pub fn mean_loss(&self) -> f64 {
        if self.losses.is_empty() {
            return self.loss;
        }
        self.losses.iter().sum::<f64>() / self.losses.len() as f64
    }
}

fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// `detect_fixed_point(content, ...)`: fail fast on an initial loss above
/// threshold, otherwise iterate R∘C up to `max_iterations - 1` more times
/// and declare a fixed point iff every loss stays under `threshold` and
/// the standard deviation across iterations stays under
/// `stability_threshold`.
pub async fn detect_fixed_point(
    content: &str,
    computer: &LossComputer,
    generator: Option<&dyn Generator>,
    threshold: f64,
    stability_threshold: f64,
    max_iterations: usize,
) -> FixedPointResult {
    let initial_loss = computer.compute_loss(content, false).await;
    if initial_loss >= threshold {
        return FixedPointResult {
            is_fixed_point: false,
            loss: initial_loss,
            stability: 1.0,
            iterations: 1,
            losses: vec![initial_loss],
        };
    }

    let mut losses = vec![initial_loss];
    let mut current = content.to_string();

    if let Some(generator) = generator {
        for _ in 1..max_iterations {
            let Ok(modular) = restructure(generator, &current).await else { break };
            let Ok(reconstituted) = reconstitute(generator, &modular).await else { break };
            current = reconstituted;
            let loss = computer.compute_loss(&current, false).await;
            losses.push(loss);
        }
    }

    let stability = stdev(&losses);
    let is_fixed = losses.iter().all(|l| *l < threshold) && stability < stability_threshold;

    FixedPointResult {
        is_fixed_point: is_fixed,
        loss: initial_loss,
        stability,
        iterations: losses.len(),
        losses,
    }
}

/// Convenience wrapper using the module-level default thresholds.
pub async fn detect_fixed_point_default(
    content: &str,
    computer: &LossComputer,
    generator: Option<&dyn Generator>,
) -> FixedPointResult {
    detect_fixed_point(
        content,
        computer,
        generator,
        FIXED_POINT_THRESHOLD,
        STABILITY_THRESHOLD,
        MAX_STABILITY_ITERATIONS,
    )
    .await
}

/// Runs [`detect_fixed_point_default`] over an entire corpus (including
/// items that don't qualify as fixed points), keyed by the original content.
pub async fn batch_detect(
    corpus: &[String],
    computer: &LossComputer,
    generator: Option<&dyn Generator>,
) -> HashMap<String, FixedPointResult> {
    let mut out = HashMap::new();
    for item in corpus {
        let result = detect_fixed_point_default(item, computer, generator).await;
        out.insert(item.clone(), result);
    }
    out
}

/// Extracts the top-`k` fixed points from a corpus, sorted ascending by
/// initial loss.
pub async fn extract_axioms(
    corpus: &[String],
    computer: &LossComputer,
    generator: Option<&dyn Generator>,
    top_k: usize,
) -> Vec<(String, FixedPointResult)> {
    let mut candidates: Vec<(String, FixedPointResult)> = Vec::new();
    for item in corpus {
        let result = detect_fixed_point_default(item, computer, generator).await;
        if result.is_fixed_point {
            candidates.push((item.clone(), result));
        }
    }
    candidates.sort_by(|a, b| a.1.loss.partial_cmp(&b.1.loss).unwrap());
    candidates.truncate(top_k);
    candidates
}

/// Aggregate statistics over a batch of fixed-point detections.
#[derive(Debug, Clone)]
pub struct FixedPointMetrics {
    pub fixed_point_ratio: f64,
    pub axiom_candidate_ratio: f64,
    pub mean_loss: f64,
    pub mean_stability: f64,
    pub loss_distribution: Vec<f64>,
}

impl FixedPointMetrics {
    pub fn from_results(results: &HashMap<String, FixedPointResult>) -> Self {
        let n = results.len().max(1) as f64;
        let fixed = results.values().filter(|r| r.is_fixed_point).count() as f64;
        let candidates = results.values().filter(|r| r.is_axiom_candidate()).count() as f64;
        let mean_loss = results.values().map(|r| r.loss).sum::<f64>() / n;
        let mean_stability = results.values().map(|r| r.stability).sum::<f64>() / n;
        let mut loss_distribution: Vec<f64> = results.values().map(|r| r.loss).collect();
        loss_distribution.sort_by(|a, b| a.partial_cmp(b).unwrap());
        Self {
            fixed_point_ratio: fixed / n,
            axiom_candidate_ratio: candidates / n,
            mean_loss,
            mean_stability,
            loss_distribution,
        }
    }
}
