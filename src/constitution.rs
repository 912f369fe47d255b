//! Constitution & contradictions: the live set of active axioms and
//! super-additive-loss contradiction analysis between them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::discovery::DiscoveredAxiom;
use crate::error::{ConstitutionError, ConstitutionResult};
use crate::fixed_point::{detect_fixed_point_default, FIXED_POINT_THRESHOLD};
use crate::generator::Generator;
use crate::loss::LossComputer;

pub const CONTRADICTION_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxiomStatus {
    Active,
    Suspended,
    Retired,
    Conflicting,
}

#[derive(Debug, Clone)]
pub struct ConstitutionalAxiom {
    pub id: String,
    pub content: String,
    pub loss: f64,
    pub stability: f64,
    pub confidence: f64,
    pub status: AxiomStatus,
    pub added_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
    pub retirement_reason: Option<String>,
    pub source_decisions: usize,
}

impl ConstitutionalAxiom {
    pub fn from_discovered(axiom: &DiscoveredAxiom) -> Self {
        Self {
            id: format!("axiom-{}", Uuid::new_v4().simple()),
            content: axiom.content.clone(),
            loss: axiom.loss,
            stability: axiom.stability,
            confidence: axiom.confidence,
            status: AxiomStatus::Active,
            added_at: Utc::now(),
            retired_at: None,
            retirement_reason: None,
            source_decisions: axiom.source_count,
        }
    }

    pub fn retire(&self, reason: impl Into<String>) -> Self {
        let mut retired = self.clone();
        retired.status = AxiomStatus::Retired;
        retired.retired_at = Some(Utc::now());
        retired.retirement_reason = Some(reason.into());
        retired
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContradictionStrength {
    None,
    Weak,
    Moderate,
    Strong,
}

fn classify_strength(strength: f64) -> ContradictionStrength {
    if strength <= 0.1 {
        ContradictionStrength::None
    } else if strength <= 0.2 {
        ContradictionStrength::Weak
    } else if strength <= 0.5 {
        ContradictionStrength::Moderate
    } else {
        ContradictionStrength::Strong
    }
}

#[derive(Debug, Clone)]
pub struct Contradiction {
    pub axiom_a_id: String,
    pub axiom_b_id: String,
    pub strength: f64,
    pub kind: ContradictionStrength,
    pub loss_a: f64,
    pub loss_b: f64,
    pub loss_combined: f64,
    pub synthesis_hint: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolution: Option<String>,
}

impl Contradiction {
    pub fn is_strong(&self) -> bool {
        matches!(self.kind, ContradictionStrength::Strong)
    }
}

#[derive(Debug, Clone)]
pub struct ConstitutionSnapshot {
    pub timestamp: DateTime<Utc>,
    pub axiom_count: usize,
    pub active_count: usize,
    pub average_loss: f64,
    pub active_axiom_ids: Vec<String>,
}

pub struct Constitution {
    pub id: String,
    pub name: String,
    axioms: HashMap<String, ConstitutionalAxiom>,
    contradictions: Vec<Contradiction>,
    snapshots: Vec<ConstitutionSnapshot>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Constitution {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("constitution-{}", Uuid::new_v4().simple()),
            name: name.into(),
            axioms: HashMap::new(),
            contradictions: Vec::new(),
            snapshots: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn active_axioms(&self) -> Vec<&ConstitutionalAxiom> {
        self.axioms.values().filter(|a| a.status == AxiomStatus::Active).collect()
    }

    pub fn axiom_count(&self) -> usize {
        self.axioms.len()
    }

    pub fn active_count(&self) -> usize {
        self.active_axioms().len()
    }

    pub fn average_loss(&self) -> f64 {
        let active = self.active_axioms();
        if active.is_empty() {
            return 1.0;
        }
        active.iter().map(|a| a.loss).sum::<f64>() / active.len() as f64
    }

    pub fn unresolved_contradictions(&self) -> Vec<&Contradiction> {
        self.contradictions.iter().filter(|c| !c.resolved).collect()
    }

    pub fn snapshots(&self) -> &[ConstitutionSnapshot] {
        &self.snapshots
    }

    fn snapshot(&mut self) {
        let snapshot = ConstitutionSnapshot {
            timestamp: Utc::now(),
            axiom_count: self.axiom_count(),
            active_count: self.active_count(),
            average_loss: self.average_loss(),
            active_axiom_ids: self.active_axioms().into_iter().map(|a| a.id.clone()).collect(),
        };
        self.snapshots.push(snapshot);
        self.updated_at = Utc::now();
    }
}

/// Computes `strength = L(A∪B) - (L(A) + L(B))` for a pair of axioms,
/// classifying it and producing a synthesis hint from the cheapest ghost
/// alternative surfaced while restructuring the combined content.
pub async fn detect_contradiction(
    axiom_a: &ConstitutionalAxiom,
    axiom_b: &ConstitutionalAxiom,
    computer: &LossComputer,
    generator: Option<&dyn Generator>,
) -> Contradiction {
    let combined = format!("{} | {}", axiom_a.content, axiom_b.content);
    let loss_combined = computer.compute_loss(&combined, true).await;
    let strength = loss_combined - (axiom_a.loss + axiom_b.loss);

    let synthesis_hint = if let Some(generator) = generator {
        crate::generator::restructure(generator, &combined)
            .await
            .ok()
            .and_then(|modular| modular.ghosts.into_iter().min_by(|a, b| a.deferral_cost.partial_cmp(&b.deferral_cost).unwrap()))
            .map(|ghost| ghost.content)
    } else {
        None
    };

    Contradiction {
        axiom_a_id: axiom_a.id.clone(),
        axiom_b_id: axiom_b.id.clone(),
        strength,
        kind: classify_strength(strength),
        loss_a: axiom_a.loss,
        loss_b: axiom_b.loss,
        loss_combined,
        synthesis_hint,
        detected_at: Utc::now(),
        resolved: false,
        resolution: None,
    }
}

/// Orchestrates add/retire/contradiction-detection on a [`Constitution`].
pub struct ConstitutionService {
    computer: Arc<LossComputer>,
}

impl ConstitutionService {
    pub fn new(computer: Arc<LossComputer>) -> Self {
        Self { computer }
    }

    pub async fn add_axiom(
        &self,
        constitution: &mut Constitution,
        discovered: &DiscoveredAxiom,
        check_contradictions: bool,
        generator: Option<&dyn Generator>,
    ) -> ConstitutionResult<String> {
        if discovered.loss >= FIXED_POINT_THRESHOLD {
            return Err(ConstitutionError::LossTooHigh { loss: discovered.loss, threshold: FIXED_POINT_THRESHOLD });
        }
        let normalized = discovered.content.to_lowercase();
        if constitution.active_axioms().iter().any(|a| a.content.to_lowercase() == normalized) {
            return Err(ConstitutionError::Duplicate);
        }

        let axiom = ConstitutionalAxiom::from_discovered(discovered);
        let axiom_id = axiom.id.clone();

        if check_contradictions {
            let existing: Vec<ConstitutionalAxiom> = constitution.active_axioms().into_iter().cloned().collect();
            for other in &existing {
                let analysis = detect_contradiction(&axiom, other, &self.computer, generator).await;
                if analysis.strength > CONTRADICTION_TOLERANCE {
                    constitution.contradictions.push(analysis);
                }
            }
        }

        constitution.axioms.insert(axiom_id.clone(), axiom);
        constitution.snapshot();
        Ok(axiom_id)
    }

    pub fn retire_axiom(
        &self,
        constitution: &mut Constitution,
        axiom_id: &str,
        reason: impl Into<String>,
    ) -> ConstitutionResult<()> {
        let reason = reason.into();
        let Some(existing) = constitution.axioms.get(axiom_id) else {
            return Err(ConstitutionError::NotFound(axiom_id.to_string()));
        };
        let retired = existing.retire(reason.clone());
        constitution.axioms.insert(axiom_id.to_string(), retired);

        for contradiction in constitution.contradictions.iter_mut() {
            if !contradiction.resolved && (contradiction.axiom_a_id == axiom_id || contradiction.axiom_b_id == axiom_id) {
                contradiction.resolved = true;
                contradiction.resolution = Some(format!("axiom {axiom_id} retired: {reason}"));
            }
        }

        constitution.snapshot();
        Ok(())
    }

    /// Re-detect contradictions across every pair of currently-active
    /// axioms, replacing the unresolved set.
    pub async fn refresh_contradictions(
        &self,
        constitution: &mut Constitution,
        tolerance: f64,
        generator: Option<&dyn Generator>,
    ) {
        let active: Vec<ConstitutionalAxiom> = constitution.active_axioms().into_iter().cloned().collect();
        constitution.contradictions.retain(|c| c.resolved);

        for i in 0..active.len() {
            for j in (i + 1)..active.len() {
                let analysis = detect_contradiction(&active[i], &active[j], &self.computer, generator).await;
                if analysis.strength > tolerance {
                    constitution.contradictions.push(analysis);
                }
            }
        }
    }

    /// If the contradiction carries a synthesis hint, validate it as a
    /// fixed point and return a candidate new axiom when it qualifies.
    pub async fn synthesize_contradiction(
        &self,
        contradiction: &Contradiction,
        generator: Option<&dyn Generator>,
    ) -> Option<DiscoveredAxiom> {
        let hint = contradiction.synthesis_hint.as_ref()?;
        let result = detect_fixed_point_default(hint, &self.computer, generator).await;
        if result.is_fixed_point && result.loss < FIXED_POINT_THRESHOLD {
            Some(DiscoveredAxiom {
                content: hint.clone(),
                loss: result.loss,
                stability: result.stability,
                iterations: result.iterations,
                confidence: 1.0 - result.loss,
                source_count: 0,
            })
        } else {
            None
        }
    }
}

/// Reference-only in-memory store for prototyping before a host wires in
/// real persistence. Not a production storage engine.
#[derive(Default)]
pub struct InMemoryConstitutionStore {
    store: std::sync::Mutex<HashMap<String, (String, usize)>>,
}

impl InMemoryConstitutionStore {
    pub fn save(&self, constitution: &Constitution) {
        self.store
            .lock()
            .unwrap()
            .insert(constitution.id.clone(), (constitution.name.clone(), constitution.axiom_count()));
    }

    pub fn list_all(&self) -> Vec<String> {
        self.store.lock().unwrap().keys().cloned().collect()
    }

    pub fn delete(&self, id: &str) {
        self.store.lock().unwrap().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::JaccardDistance;

    fn discovered(content: &str, loss: f64) -> DiscoveredAxiom {
        DiscoveredAxiom { content: content.to_string(), loss, stability: 0.01, iterations: 2, confidence: 1.0 - loss, source_count: 5 }
    }

    #[tokio::test]
    async fn add_axiom_rejects_high_loss() {
        let computer = Arc::new(LossComputer::new(Arc::new(JaccardDistance), 10));
        let service = ConstitutionService::new(computer);
        let mut constitution = Constitution::new("test");
        let result = service.add_axiom(&mut constitution, &discovered("vague idea", 0.5), false, None).await;
        assert!(matches!(result, Err(ConstitutionError::LossTooHigh { .. })));
    }

    #[tokio::test]
    async fn add_axiom_rejects_duplicate_content() {
        let computer = Arc::new(LossComputer::new(Arc::new(JaccardDistance), 10));
        let service = ConstitutionService::new(computer);
        let mut constitution = Constitution::new("test");
        service.add_axiom(&mut constitution, &discovered("always ship small", 0.01), false, None).await.unwrap();
        let result = service.add_axiom(&mut constitution, &discovered("Always Ship Small", 0.01), false, None).await;
        assert!(matches!(result, Err(ConstitutionError::Duplicate)));
    }

    #[tokio::test]
    async fn add_axiom_appends_snapshot() {
        let computer = Arc::new(LossComputer::new(Arc::new(JaccardDistance), 10));
        let service = ConstitutionService::new(computer);
        let mut constitution = Constitution::new("test");
        service.add_axiom(&mut constitution, &discovered("axiom one", 0.01), false, None).await.unwrap();
        assert_eq!(constitution.snapshots().len(), 1);
    }

    #[tokio::test]
    async fn retire_axiom_resolves_contradictions_and_snapshots() {
        let computer = Arc::new(LossComputer::new(Arc::new(JaccardDistance), 10));
        let service = ConstitutionService::new(computer);
        let mut constitution = Constitution::new("test");
        let a_id = service.add_axiom(&mut constitution, &discovered("ship fast always", 0.01), true, None).await.unwrap();
        let _b_id = service.add_axiom(&mut constitution, &discovered("wait for full review cycles", 0.01), true, None).await.unwrap();

        service.retire_axiom(&mut constitution, &a_id, "superseded").unwrap();
        assert_eq!(constitution.snapshots().len(), 3);
        for contradiction in &constitution.contradictions {
            if contradiction.axiom_a_id == a_id || contradiction.axiom_b_id == a_id {
                assert!(contradiction.resolved);
            }
        }
    }

    #[test]
    fn contradiction_strength_classification() {
        assert!(matches!(classify_strength(0.05), ContradictionStrength::None));
        assert!(matches!(classify_strength(0.15), ContradictionStrength::Weak));
        assert!(matches!(classify_strength(0.4), ContradictionStrength::Moderate));
        assert!(matches!(classify_strength(0.9), ContradictionStrength::Strong));
    }
}
