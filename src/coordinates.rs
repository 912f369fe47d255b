//! Principle coordinates: a fixed-dimension personality vector used to bias
//! generation and intercept scoring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single named axis of the coordinate vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    pub pole_low: String,
    pub pole_high: String,
    pub value: f64,
    pub confidence: f64,
    pub provenance: Vec<String>,
}

impl Axis {
    fn new(name: &str, pole_low: &str, pole_high: &str) -> Self {
        Self {
            name: name.to_string(),
            pole_low: pole_low.to_string(),
            pole_high: pole_high.to_string(),
            value: 0.5,
            confidence: 0.5,
            provenance: Vec::new(),
        }
    }
}

const AXIS_NAMES: [&str; 6] = [
    "minimalism",
    "risk_tolerance",
    "formality",
    "directness",
    "patience",
    "curiosity",
];

/// The six-axis principle coordinate vector. All axes are always present;
/// none can be removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordinates {
    axes: HashMap<String, Axis>,
}

impl Default for Coordinates {
    fn default() -> Self {
        let mut axes = HashMap::new();
        axes.insert("minimalism".into(), Axis::new("minimalism", "expansive", "minimal"));
        axes.insert(
            "risk_tolerance".into(),
            Axis::new("risk_tolerance", "cautious", "bold"),
        );
        axes.insert("formality".into(), Axis::new("formality", "casual", "formal"));
        axes.insert("directness".into(), Axis::new("directness", "diplomatic", "blunt"));
        axes.insert("patience".into(), Axis::new("patience", "urgent", "patient"));
        axes.insert("curiosity".into(), Axis::new("curiosity", "focused", "exploratory"));
        Self { axes }
    }
}

impl Coordinates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate a named axis. Returns `false` if the name is unknown. All
    /// resulting fields are clamped to `[0, 1]`.
    pub fn modify(&mut self, name: &str, delta: f64, absolute: Option<f64>, confidence_delta: f64) -> bool {
        let Some(axis) = self.axes.get_mut(name) else {
            return false;
        };
        axis.value = absolute.unwrap_or(axis.value + delta).clamp(0.0, 1.0);
        axis.confidence = (axis.confidence + confidence_delta).clamp(0.0, 1.0);
        true
    }

    pub fn axis(&self, name: &str) -> Option<&Axis> {
        self.axes.get(name)
    }

    /// A deterministic textual description suitable for concatenation into
    /// a generator prompt.
    pub fn to_prompt_section(&self) -> String {
        let mut lines = vec!["Principle coordinates:".to_string()];
        for name in AXIS_NAMES {
            if let Some(axis) = self.axes.get(name) {
                let pole = if axis.value >= 0.5 { &axis.pole_high } else { &axis.pole_low };
                lines.push(format!(
                    "- {}: {:.2} toward {} (confidence {:.2})",
                    axis.name, axis.value, pole, axis.confidence
                ));
            }
        }
        lines.join("\n")
    }

    /// Extract principle identifiers triggered by lowercase substring
    /// matching against a fixed keyword mapping. Deduplicated, capped at 3.
    pub fn match_keywords(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        const MAP: &[(&str, &str)] = &[
            ("delete", "minimalism"),
            ("remove", "minimalism"),
            ("simplify", "minimalism"),
            ("risk", "risk_tolerance"),
            ("experiment", "risk_tolerance"),
            ("please", "formality"),
            ("sir", "formality"),
            ("honestly", "directness"),
            ("blunt", "directness"),
            ("wait", "patience"),
            ("later", "patience"),
            ("explore", "curiosity"),
            ("wonder", "curiosity"),
        ];
        let mut matched = Vec::new();
        for (keyword, principle) in MAP {
            if lower.contains(keyword) && !matched.contains(&principle.to_string()) {
                matched.push(principle.to_string());
                if matched.len() == 3 {
                    break;
                }
            }
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_six_axes_present_by_default() {
        let c = Coordinates::default();
        for name in AXIS_NAMES {
            assert!(c.axis(name).is_some());
        }
    }

    #[test]
    fn modify_clamps_to_unit_interval() {
        let mut c = Coordinates::default();
        assert!(c.modify("minimalism", 10.0, None, 10.0));
        let axis = c.axis("minimalism").unwrap();
        assert_eq!(axis.value, 1.0);
        assert_eq!(axis.confidence, 1.0);
    }

    #[test]
    fn modify_unknown_axis_returns_false() {
        let mut c = Coordinates::default();
        assert!(!c.modify("nonexistent", 0.1, None, 0.0));
    }

    #[test]
    fn match_keywords_caps_at_three() {
        let c = Coordinates::default();
        let matched = c.match_keywords("please delete this, risk it, and explore honestly");
        assert!(matched.len() <= 3);
    }
}
