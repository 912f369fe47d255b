//! The soul engine: dialogue + intercept mediation, mode machine, budget
//! tiers, and the hard safety override.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::audit::{AuditEntry, AuditLog};
use crate::coordinates::Coordinates;
use crate::generator::{GenerationRequest, Generator};
use crate::template;

/// Dialogue/intercept mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Reflect,
    Advise,
    Challenge,
    Explore,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Reflect => "reflect",
            Mode::Advise => "advise",
            Mode::Challenge => "challenge",
            Mode::Explore => "explore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reflect" => Some(Mode::Reflect),
            "advise" => Some(Mode::Advise),
            "challenge" => Some(Mode::Challenge),
            "explore" => Some(Mode::Explore),
            _ => None,
        }
    }

    fn greeting(&self) -> String {
        match self {
            Mode::Reflect => "Entering REFLECT mode. Let's slow down and look.".to_string(),
            Mode::Advise => "Entering ADVISE mode. What decision is in front of you?".to_string(),
            Mode::Challenge => "Entering CHALLENGE mode. I'll push back where it's warranted.".to_string(),
            Mode::Explore => "Entering EXPLORE mode. Let's follow the thread.".to_string(),
        }
    }
}

/// How much generative budget a call is permitted to spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetTier {
    Dormant,
    Whisper,
    Dialogue,
    Deep,
}

/// Keywords that always force an escalation in [`SoulEngine::intercept_deep`],
/// regardless of any generator output.
const DANGEROUS_KEYWORDS: &[&str] = &[
    "delete", "remove", "drop", "truncate", "destroy", "rm", "rmdir", "del",
    "production", "prod", "force", "--force", "-f", "sudo", "password",
    "secret", "token", "credential", "api_key", "apikey", "format", "wipe",
    "purge", "erase",
];

/// Mutable soul state aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct SoulState {
    pub mode: Mode,
    pub session_tokens: u64,
    pub interactions: u64,
    pub created_at: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
    pub coordinates: Coordinates,
}

/// Output of a [`SoulEngine::dialogue`] call.
#[derive(Debug, Clone)]
pub struct DialogueOutput {
    pub response: String,
    pub was_template: bool,
    pub budget_tier: BudgetTier,
    pub tokens_used: u32,
}

/// A recommendation on a proposed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Approve,
    Reject,
    Review,
    Escalate,
}

/// A proposed operation submitted to the intercept path.
#[derive(Debug, Clone)]
pub struct InterceptToken {
    pub id: String,
    pub operation: String,
    pub reason: String,
    pub severity: Option<String>,
}

/// Result of evaluating a proposed operation.
#[derive(Debug, Clone)]
pub struct InterceptResult {
    pub handled: bool,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub principles: Vec<String>,
    pub patterns: Vec<String>,
    pub reasoning: String,
    pub audit_trail: String,
    pub was_deep: bool,
}

/// Configuration knobs for the soul engine, in the teacher's
/// builder-with-defaults style.
#[derive(Debug, Clone)]
pub struct SoulConfig {
    pub initial_mode: Mode,
}

impl Default for SoulConfig {
    fn default() -> Self {
        Self { initial_mode: Mode::Reflect }
    }
}

impl SoulConfig {
    pub fn with_initial_mode(mut self, mode: Mode) -> Self {
        self.initial_mode = mode;
        self
    }
}

/// The dialogue/intercept mediator owning one soul state.
pub struct SoulEngine {
    generator: Option<Arc<dyn Generator>>,
    audit: Arc<AuditLog>,
    state: RwLock<SoulState>,
}

impl SoulEngine {
    pub fn new(config: SoulConfig, audit: Arc<AuditLog>) -> Self {
        let now = Utc::now();
        Self {
            generator: None,
            audit,
            state: RwLock::new(SoulState {
                mode: config.initial_mode,
                session_tokens: 0,
                interactions: 0,
                created_at: now,
                last_interaction: now,
                coordinates: Coordinates::new(),
            }),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub async fn manifest(&self) -> SoulState {
        self.state.read().await.clone()
    }

    pub async fn manifest_brief(&self) -> HashMap<String, serde_json::Value> {
        let state = self.state.read().await;
        let mut map = HashMap::new();
        map.insert("mode".to_string(), serde_json::json!(state.mode.as_str()));
        map.insert("interactions".to_string(), serde_json::json!(state.interactions));
        map.insert("session_tokens".to_string(), serde_json::json!(state.session_tokens));
        map
    }

    pub async fn enter_mode(&self, mode: Mode) -> String {
        let mut state = self.state.write().await;
        state.mode = mode;
        mode.greeting()
    }

    pub fn get_starter(&self, mode: Mode) -> &'static str {
        match mode {
            Mode::Reflect => "What's alive for you right now?",
            Mode::Advise => "What decision are you sitting on?",
            Mode::Challenge => "What belief do you want tested?",
            Mode::Explore => "What's a thread you haven't pulled yet?",
        }
    }

    pub fn get_all_starters(&self, mode: Mode) -> Vec<&'static str> {
        vec![self.get_starter(mode)]
    }

    /// The main dialogue entry point.
    pub async fn dialogue(
        &self,
        message: &str,
        mode: Option<Mode>,
        budget: BudgetTier,
    ) -> DialogueOutput {
        let active_mode = {
            let mut state = self.state.write().await;
            if let Some(m) = mode {
                state.mode = m;
            }
            state.interactions += 1;
            state.last_interaction = Utc::now();
            state.mode
        };

        if message.trim().is_empty() {
            return DialogueOutput {
                response: template::EMPTY_INPUT_PROMPT.to_string(),
                was_template: true,
                budget_tier: BudgetTier::Dormant,
                tokens_used: 0,
            };
        }

        let mut rng = template::ThreadRandom;
        if matches!(budget, BudgetTier::Dormant | BudgetTier::Whisper) {
            if let Some(reply) = template::try_reply(message, active_mode.as_str(), &mut rng) {
                return DialogueOutput {
                    response: reply,
                    was_template: true,
                    budget_tier: budget,
                    tokens_used: 0,
                };
            }
            if matches!(budget, BudgetTier::Whisper) {
                return DialogueOutput {
                    response: "Go on — I'm listening.".to_string(),
                    was_template: false,
                    budget_tier: budget,
                    tokens_used: 0,
                };
            }
            // DORMANT never incurs a generator call: no template matched,
            // so hand back a canned acknowledgement instead of falling
            // through to the generative path below.
            return DialogueOutput {
                response: "Noted — I'm holding steady, nothing generative to add yet.".to_string(),
                was_template: true,
                budget_tier: budget,
                tokens_used: 0,
            };
        }

        // try the template even at higher tiers — zero-cost win if it matches
        if let Some(reply) = template::try_reply(message, active_mode.as_str(), &mut rng) {
            return DialogueOutput {
                response: reply,
                was_template: true,
                budget_tier: budget,
                tokens_used: 0,
            };
        }

        let Some(generator) = &self.generator else {
            return DialogueOutput {
                response: "I don't have anything generative to say right now.".to_string(),
                was_template: false,
                budget_tier: budget,
                tokens_used: 0,
            };
        };

        let coordinates = self.state.read().await.coordinates.clone();
        let mut system_text = coordinates.to_prompt_section();
        if matches!(budget, BudgetTier::Deep) {
            system_text.push_str("\n\n(deep mode: be thorough, name the principle coordinates explicitly)");
        }

        let request = GenerationRequest {
            system_text,
            user_text: message.to_string(),
            temperature: 0.7,
            max_tokens: if matches!(budget, BudgetTier::Deep) { 1024 } else { 512 },
        };

        match generator.generate(request).await {
            Ok(response) => {
                let mut state = self.state.write().await;
                state.session_tokens += response.tokens_used as u64;
                DialogueOutput {
                    response: response.text,
                    was_template: false,
                    budget_tier: budget,
                    tokens_used: response.tokens_used,
                }
            }
            Err(e) => {
                tracing::warn!("generator failure during dialogue: {e}");
                DialogueOutput {
                    response: "I hit a snag generating a reply — try rephrasing?".to_string(),
                    was_template: false,
                    budget_tier: budget,
                    tokens_used: 0,
                }
            }
        }
    }

    /// Shallow intercept path: no generator call.
    pub async fn intercept(&self, token: &InterceptToken) -> InterceptResult {
        let coordinates = self.state.read().await.coordinates.clone();
        let principles = coordinates.match_keywords(&token.operation);
        let patterns = coordinates.match_keywords(&token.reason);

        let confidence = (0.25 * principles.len() as f64).min(0.6) + (0.15 * patterns.len() as f64).min(0.4);
        let confidence = confidence.min(1.0);

        let lower_op = token.operation.to_lowercase();
        let is_mutating = lower_op.contains("add") || lower_op.contains("create");
        let minimalism_matched = principles.iter().any(|p| p == "minimalism");

        if confidence >= 0.8 && !principles.is_empty() {
            let recommendation = if is_mutating && minimalism_matched {
                Recommendation::Review
            } else if lower_op.contains("remove") && minimalism_matched {
                Recommendation::Approve
            } else {
                Recommendation::Review
            };
            let audit_trail = format!(
                "shallow intercept: principles={:?} confidence={:.2} -> {:?}",
                principles, confidence, recommendation
            );
            InterceptResult {
                handled: true,
                recommendation,
                confidence,
                principles,
                patterns,
                reasoning: "Matched principles with sufficient confidence for an automatic call.".to_string(),
                audit_trail,
                was_deep: false,
            }
        } else {
            InterceptResult {
                handled: false,
                recommendation: Recommendation::Escalate,
                confidence,
                principles,
                patterns,
                reasoning: "Confidence insufficient for an automatic decision; needs deeper review.".to_string(),
                audit_trail: "shallow intercept: insufficient confidence".to_string(),
                was_deep: false,
            }
        }
    }

    /// Generator-backed intercept path with the hard safety override.
    pub async fn intercept_deep(&self, token: &InterceptToken) -> InterceptResult {
        let lower_op = token.operation.to_lowercase();
        if DANGEROUS_KEYWORDS.iter().any(|kw| lower_op.contains(kw)) {
            let result = InterceptResult {
                handled: false,
                recommendation: Recommendation::Escalate,
                confidence: 0.0,
                principles: vec!["SAFETY_OVERRIDE".to_string()],
                patterns: vec![],
                reasoning: "Hard safety override: operation matches a dangerous-operation keyword.".to_string(),
                audit_trail: "SAFETY_OVERRIDE: escalated without generator consultation".to_string(),
                was_deep: true,
            };
            self.record_intercept(token, &result).await;
            return result;
        }

        let Some(generator) = &self.generator else {
            let mut result = self.intercept(token).await;
            result.was_deep = false;
            return result;
        };

        let coordinates = self.state.read().await.coordinates.clone();
        let system_text = format!(
            "{}\n\nHard rules: never auto-approve data-loss, production, secret-bearing, or low-confidence operations. \
             Respond in exactly this four-line format:\nRECOMMENDATION: approve|reject|review|escalate\n\
             CONFIDENCE: <0-1>\nPRINCIPLES: <comma separated>\nREASONING: <one line>",
            coordinates.to_prompt_section()
        );
        let user_text = format!(
            "Operation: {}\nReason: {}\nSeverity: {}",
            token.operation,
            token.reason,
            token.severity.as_deref().unwrap_or("unspecified")
        );

        let request = GenerationRequest { system_text, user_text, temperature: 0.1, max_tokens: 256 };

        let result = match generator.generate(request).await {
            Ok(response) => parse_intercept_response(&response.text),
            Err(e) => {
                tracing::warn!("generator failure during intercept_deep: {e}");
                InterceptResult {
                    handled: false,
                    recommendation: Recommendation::Escalate,
                    confidence: 0.0,
                    principles: vec!["ERROR_FALLBACK".to_string()],
                    patterns: vec![],
                    reasoning: format!("generator error: {e}"),
                    audit_trail: "ERROR_FALLBACK: escalated after generator failure".to_string(),
                    was_deep: true,
                }
            }
        };

        self.record_intercept(token, &result).await;
        result
    }

    async fn record_intercept(&self, token: &InterceptToken, result: &InterceptResult) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            token_id: token.id.clone(),
            action: format!("{:?}", result.recommendation).to_lowercase(),
            confidence: result.confidence,
            principles: result.principles.clone(),
            reasoning: result.reasoning.clone(),
            operation: Some(token.operation.clone()),
            severity: token.severity.clone(),
            was_deep: result.was_deep,
        };
        if let Err(e) = self.audit.log(entry).await {
            tracing::warn!("failed to record intercept audit entry: {e}");
        }
    }
}

fn parse_intercept_response(text: &str) -> InterceptResult {
    let mut recommendation = Recommendation::Escalate;
    let mut confidence = 0.0;
    let mut principles = Vec::new();
    let mut reasoning = String::new();

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("RECOMMENDATION:") {
            recommendation = match rest.trim().to_lowercase().as_str() {
                "approve" => Recommendation::Approve,
                "reject" => Recommendation::Reject,
                "review" => Recommendation::Review,
                _ => Recommendation::Escalate,
            };
        } else if let Some(rest) = line.strip_prefix("CONFIDENCE:") {
            confidence = rest.trim().parse::<f64>().unwrap_or(0.0).clamp(0.0, 1.0);
        } else if let Some(rest) = line.strip_prefix("PRINCIPLES:") {
            principles = rest.trim().split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        } else if let Some(rest) = line.strip_prefix("REASONING:") {
            reasoning = rest.trim().to_string();
        }
    }

    if matches!(recommendation, Recommendation::Approve) && confidence < 0.7 {
        recommendation = Recommendation::Escalate;
        reasoning = format!("{reasoning} (forced escalate: approve requires confidence >= 0.7)");
    }

    let audit_trail = format!("deep intercept: {:?} confidence={:.2} principles={:?}", recommendation, confidence, principles);
    let handled = !matches!(recommendation, Recommendation::Escalate);

    InterceptResult { handled, recommendation, confidence, principles, patterns: vec![], reasoning, audit_trail, was_deep: true }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditStorage;
    use crate::error::{GaloisError, GaloisResult};
    use crate::generator::GenerationResponse;

    fn audit() -> Arc<AuditLog> {
        Arc::new(AuditLog::new(Arc::new(InMemoryAuditStorage::default()), 100))
    }

    fn token(operation: &str) -> InterceptToken {
        InterceptToken { id: "tok-1".into(), operation: operation.into(), reason: "testing".into(), severity: None }
    }

    struct ApprovingGenerator;
    #[async_trait::async_trait]
    impl Generator for ApprovingGenerator {
        async fn generate(&self, _r: GenerationRequest) -> GaloisResult<GenerationResponse> {
            Ok(GenerationResponse {
                text: "RECOMMENDATION: approve\nCONFIDENCE: 0.95\nPRINCIPLES: Minimalism\nREASONING: looks fine".into(),
                model: "mock".into(),
                tokens_used: 10,
                raw_metadata: None,
            })
        }
    }

    struct FailingGenerator;
    #[async_trait::async_trait]
    impl Generator for FailingGenerator {
        async fn generate(&self, _r: GenerationRequest) -> GaloisResult<GenerationResponse> {
            Err(GaloisError::NoGenerator)
        }
    }

    #[tokio::test]
    async fn safety_override_escalates_without_calling_generator() {
        let soul = SoulEngine::new(SoulConfig::default(), audit()).with_generator(Arc::new(ApprovingGenerator));
        let result = soul.intercept_deep(&token("delete production database")).await;
        assert!(!result.handled);
        assert_eq!(result.recommendation, Recommendation::Escalate);
        assert_eq!(result.confidence, 0.0);
        assert!(result.principles.contains(&"SAFETY_OVERRIDE".to_string()));
        assert!(result.was_deep);
    }

    #[tokio::test]
    async fn empty_input_short_circuits_to_canned_prompt() {
        let soul = SoulEngine::new(SoulConfig::default(), audit());
        let output = soul.dialogue("", None, BudgetTier::Dialogue).await;
        assert_eq!(output.response, template::EMPTY_INPUT_PROMPT);
        assert!(output.was_template);
        assert!(matches!(output.budget_tier, BudgetTier::Dormant));
        assert_eq!(output.tokens_used, 0);
    }

    #[tokio::test]
    async fn mode_change_returns_mode_specific_greeting() {
        let soul = SoulEngine::new(SoulConfig::default(), audit());
        let greeting = soul.enter_mode(Mode::Challenge).await;
        assert!(greeting.starts_with("Entering CHALLENGE mode"));
    }

    #[tokio::test]
    async fn low_confidence_approve_is_forced_to_escalate() {
        struct WeakApproval;
        #[async_trait::async_trait]
        impl Generator for WeakApproval {
            async fn generate(&self, _r: GenerationRequest) -> GaloisResult<GenerationResponse> {
                Ok(GenerationResponse {
                    text: "RECOMMENDATION: approve\nCONFIDENCE: 0.4\nPRINCIPLES: none\nREASONING: unsure".into(),
                    model: "mock".into(),
                    tokens_used: 5,
                    raw_metadata: None,
                })
            }
        }
        let soul = SoulEngine::new(SoulConfig::default(), audit()).with_generator(Arc::new(WeakApproval));
        let result = soul.intercept_deep(&token("rename a file")).await;
        assert_eq!(result.recommendation, Recommendation::Escalate);
    }

    #[tokio::test]
    async fn generator_failure_escalates_with_error_fallback() {
        let soul = SoulEngine::new(SoulConfig::default(), audit()).with_generator(Arc::new(FailingGenerator));
        let result = soul.intercept_deep(&token("rename a file")).await;
        assert_eq!(result.recommendation, Recommendation::Escalate);
        assert!(result.principles.contains(&"ERROR_FALLBACK".to_string()));
    }

    #[tokio::test]
    async fn dormant_dialogue_never_calls_generator_without_template_match() {
        let soul = SoulEngine::new(SoulConfig::default(), audit()).with_generator(Arc::new(ApprovingGenerator));
        let output = soul.dialogue("something with no canned template match at all", None, BudgetTier::Dormant).await;
        assert!(output.was_template);
        assert!(!output.response.contains("RECOMMENDATION"));
        assert_eq!(output.tokens_used, 0);
        assert!(matches!(output.budget_tier, BudgetTier::Dormant));
    }
}
