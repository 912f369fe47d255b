//! Axiom discovery: mine recurring value patterns from decision records and
//! validate them as fixed points.

use regex::Regex;
use std::sync::OnceLock;

use crate::fixed_point::{detect_fixed_point_default, FixedPointResult};
use crate::generator::Generator;
use crate::loss::LossComputer;

pub const MIN_PATTERN_OCCURRENCES: usize = 3;
pub const MAX_CANDIDATES: usize = 20;

/// A minimal view of a past decision, enough to mine for value phrases.
#[derive(Debug, Clone, Default)]
pub struct DecisionRecord {
    pub response_text: String,
    pub proof_claim: Option<String>,
    pub decision: Option<String>,
    pub reasoning: Option<String>,
}

pub fn extract_decision_content(record: &DecisionRecord) -> String {
    let mut parts = vec![record.response_text.clone()];
    if let Some(claim) = &record.proof_claim {
        parts.push(claim.clone());
    }
    if let Some(decision) = &record.decision {
        parts.push(decision.clone());
    }
    if let Some(reasoning) = &record.reasoning {
        parts.push(reasoning.clone());
    }
    parts.join(" ")
}

fn patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(?i)(\w+(?:\s+\w+){0,3})\s+(?:is|are)\s+(?:important|essential|crucial|fundamental)").unwrap(),
            Regex::new(r"(?i)(?:always|never)\s+(\w+(?:\s+\w+){0,5})").unwrap(),
            Regex::new(r"(?i)(\w+(?:\s+\w+){0,3})\s+matters").unwrap(),
            Regex::new(r"(?i)prioritize\s+(\w+(?:\s+\w+){0,3})").unwrap(),
            Regex::new(r"(?i)value\s+(\w+(?:\s+\w+){0,3})").unwrap(),
            Regex::new(r"(?i)prefer\s+(\w+(?:\s+\w+){0,5})").unwrap(),
        ]
    })
}

/// Extracts candidate value phrases: regex-matched phrases plus short
/// capitalized sentences (3-10 words).
pub fn extract_value_phrases(text: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    for pattern in patterns() {
        for capture in pattern.captures_iter(text) {
            if let Some(m) = capture.get(1) {
                phrases.push(m.as_str().trim().to_lowercase());
            }
        }
    }

    for sentence in text.split(['.', '!', '?']) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let starts_capital = sentence.chars().next().is_some_and(|c| c.is_uppercase());
        let word_count = sentence.split_whitespace().count();
        if starts_capital && (3..=10).contains(&word_count) {
            phrases.push(sentence.to_lowercase());
        }
    }

    phrases
}

fn jaccard_word_overlap(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let set_b: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// A cluster of near-duplicate phrases, represented by its longest member.
#[derive(Debug, Clone)]
pub struct PhraseCluster {
    pub representative: String,
    pub count: usize,
}

/// Greedy Jaccard-overlap clustering, sorted by cluster size descending.
pub fn cluster_similar_phrases(phrases: &[String], threshold: f64) -> Vec<PhraseCluster> {
    let mut clusters: Vec<Vec<String>> = Vec::new();

    'outer: for phrase in phrases {
        for cluster in clusters.iter_mut() {
            if cluster.iter().any(|p| jaccard_word_overlap(p, phrase) >= threshold) {
                cluster.push(phrase.clone());
                continue 'outer;
            }
        }
        clusters.push(vec![phrase.clone()]);
    }

    let mut result: Vec<PhraseCluster> = clusters
        .into_iter()
        .map(|cluster| {
            let representative = cluster.iter().max_by_key(|p| p.len()).cloned().unwrap_or_default();
            PhraseCluster { representative, count: cluster.len() }
        })
        .collect();
    result.sort_by(|a, b| b.count.cmp(&a.count));
    result
}

/// Candidate axioms surfaced from a corpus of decisions, before fixed-point
/// validation.
pub fn extract_candidates(records: &[DecisionRecord], min_occurrences: usize) -> Vec<PhraseCluster> {
    let mut all_phrases = Vec::new();
    for record in records {
        let content = extract_decision_content(record);
        all_phrases.extend(extract_value_phrases(&content));
    }
    let clusters = cluster_similar_phrases(&all_phrases, 0.5);
    clusters
        .into_iter()
        .filter(|c| c.count >= min_occurrences)
        .take(MAX_CANDIDATES)
        .collect()
}

/// A candidate axiom that has cleared fixed-point validation.
#[derive(Debug, Clone)]
pub struct DiscoveredAxiom {
    pub content: String,
    pub loss: f64,
    pub stability: f64,
    pub iterations: usize,
    pub confidence: f64,
    pub source_count: usize,
}

impl DiscoveredAxiom {
    pub fn is_axiom(&self, threshold: f64) -> bool {
        self.loss < threshold
    }
}

/// Summary of a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub discovered: Vec<DiscoveredAxiom>,
    pub candidates_analyzed: usize,
    pub patterns_found: usize,
    pub decisions_processed: usize,
}

impl DiscoveryReport {
    pub fn axiom_count(&self, threshold: f64) -> usize {
        self.discovered.iter().filter(|a| a.is_axiom(threshold)).count()
    }

    pub fn average_loss(&self) -> f64 {
        if self.discovered.is_empty() {
            return 0.0;
        }
        self.discovered.iter().map(|a| a.loss).sum::<f64>() / self.discovered.len() as f64
    }
}

/// Full discovery pipeline: mine, cluster, filter, validate, report.
pub async fn discover_axioms(
    records: &[DecisionRecord],
    computer: &LossComputer,
    generator: Option<&dyn Generator>,
    min_occurrences: usize,
) -> DiscoveryReport {
    let mut all_phrases = Vec::new();
    for record in records {
        let content = extract_decision_content(record);
        all_phrases.extend(extract_value_phrases(&content));
    }
    let patterns_found = all_phrases.len();

    let candidates = extract_candidates(records, min_occurrences);

    let mut discovered = Vec::new();
    for candidate in &candidates {
        let result: FixedPointResult =
            detect_fixed_point_default(&candidate.representative, computer, generator).await;
        discovered.push(DiscoveredAxiom {
            content: candidate.representative.clone(),
            loss: result.loss,
            stability: result.stability,
            iterations: result.iterations,
            confidence: 1.0 - result.loss,
            source_count: candidate.count,
        });
    }
    discovered.sort_by(|a, b| a.loss.partial_cmp(&b.loss).unwrap());

    DiscoveryReport {
        discovered,
        candidates_analyzed: candidates.len(),
        patterns_found,
        decisions_processed: records.len(),
    }
}

/// Alternative entry point accepting raw text instead of decision records.
pub async fn discover_from_text(
    texts: &[String],
    computer: &LossComputer,
    generator: Option<&dyn Generator>,
    min_occurrences: usize,
) -> DiscoveryReport {
    let records: Vec<DecisionRecord> =
        texts.iter().map(|t| DecisionRecord { response_text: t.clone(), ..Default::default() }).collect();
    discover_axioms(&records, computer, generator, min_occurrences).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::JaccardDistance;
    use std::sync::Arc;

    #[test]
    fn extracts_importance_phrase() {
        let phrases = extract_value_phrases("Code clarity is essential to this team.");
        assert!(phrases.iter().any(|p| p.contains("code clarity")));
    }

    #[test]
    fn extracts_always_never_phrase() {
        let phrases = extract_value_phrases("always ship small diffs");
        assert!(phrases.iter().any(|p| p.contains("ship small diffs")));
    }

    #[test]
    fn clustering_groups_overlapping_phrases() {
        let phrases = vec![
            "code clarity matters".to_string(),
            "code clarity matters a lot".to_string(),
            "totally unrelated phrase".to_string(),
        ];
        let clusters = cluster_similar_phrases(&phrases, 0.5);
        assert!(clusters[0].count >= 2);
    }

    #[tokio::test]
    async fn discover_axioms_respects_min_occurrences() {
        let mut records = Vec::new();
        for _ in 0..5 {
            records.push(DecisionRecord { response_text: "code clarity matters".to_string(), ..Default::default() });
        }
        for _ in 0..5 {
            records.push(DecisionRecord { response_text: "always build small things".to_string(), ..Default::default() });
        }
        let computer = LossComputer::new(Arc::new(JaccardDistance), 50);
        let report = discover_axioms(&records, &computer, None, MIN_PATTERN_OCCURRENCES).await;
        assert!(report.candidates_analyzed >= 1);
        assert_eq!(report.decisions_processed, 10);
    }
}
