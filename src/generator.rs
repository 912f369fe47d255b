//! Abstract text-generation capability. The core never assumes a specific
//! model backend; it only requires a small async generation contract,
//! plus the restructure/reconstitute adapters the loss computer needs.

use crate::error::{GaloisError, GaloisResult};

/// A single generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_text: String,
    pub user_text: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// A single generation response.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub model: String,
    pub tokens_used: u32,
    pub raw_metadata: Option<serde_json::Value>,
}

/// A chunk of a streamed generation.
#[derive(Debug, Clone)]
pub struct GenerationChunk {
    pub text: String,
    pub is_final: bool,
    pub tokens_used_so_far: u32,
}

/// The abstract generator capability every generative path in the core
/// is routed through.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> GaloisResult<GenerationResponse>;

    /// Streaming variant. Default implementation synthesizes a single
    /// final chunk from [`Generator::generate`]; backends that support
    /// real streaming should override this.
    async fn generate_stream(
        &self,
        request: GenerationRequest,
        on_chunk: &mut (dyn FnMut(GenerationChunk) + Send),
    ) -> GaloisResult<GenerationResponse> {
        let response = self.generate(request).await?;
        on_chunk(GenerationChunk {
            text: response.text.clone(),
            is_final: true,
            tokens_used_so_far: response.tokens_used,
        });
        Ok(response)
    }
}

/// A named, weighted component of a restructured prompt.
#[derive(Debug, Clone)]
pub struct ModularComponent {
    pub name: String,
    pub content: String,
    pub weight: f64,
    pub dependencies: Vec<String>,
}

/// An alternative restructuring path that was not chosen, carried forward
/// as a synthesis hint when contradictions arise.
#[derive(Debug, Clone)]
pub struct GhostAlternative {
    pub content: String,
    pub rationale: String,
    pub deferral_cost: f64,
}

/// The decomposed form of a piece of content.
#[derive(Debug, Clone, Default)]
pub struct ModularPrompt {
    pub components: Vec<ModularComponent>,
    pub ghosts: Vec<GhostAlternative>,
    pub structure_notes: String,
}

impl ModularPrompt {
    /// Reassemble components into a single text in dependency-respecting
    /// order (components with no unresolved dependency go first); this is
    /// the simple default `C` used when no generator-backed reconstitution
    /// is configured.
    pub fn to_text(&self) -> String {
        let mut resolved: Vec<&ModularComponent> = Vec::new();
        let mut remaining: Vec<&ModularComponent> = self.components.iter().collect();
        while !remaining.is_empty() {
            let mut progressed = false;
            remaining.retain(|c| {
                let deps_met = c.dependencies.iter().all(|d| resolved.iter().any(|r| &r.name == d));
                if deps_met {
                    resolved.push(c);
                    progressed = true;
                    false
                } else {
                    true
                }
            });
            if !progressed {
                // circular or missing dependency: append the rest as-is
                resolved.extend(remaining.drain(..));
                break;
            }
        }
        resolved.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n\n")
    }
}

const RESTRUCTURE_TEMPLATE: &str = "Decompose the following content into named, weighted \
components with explicit dependencies. Respond using repeated blocks of the form:\n\
COMPONENT: <name>\nCONTENT: <text>\nDEPENDS: <comma separated names or none>\n---\n\
Optionally end with a GHOST block naming an alternative you considered:\n\
GHOST: <content>\nRATIONALE: <why you didn't choose it>\nCOST: <0-1 deferral cost>\n\n\
Content:\n{content}";

const RECONSTITUTE_TEMPLATE: &str = "Reassemble the following components into a single \
coherent piece of text, respecting the stated dependencies:\n\n{components}";

/// Reference restructure adapter: prompts the generator with a fixed
/// template and parses the line-oriented `COMPONENT:/CONTENT:/DEPENDS:`
/// format. Falls back to wrapping the whole input as a single component
/// on parse failure.
pub async fn restructure(generator: &dyn Generator, content: &str) -> GaloisResult<ModularPrompt> {
    let prompt = RESTRUCTURE_TEMPLATE.replace("{content}", content);
    let request = GenerationRequest {
        system_text: "You decompose text into structured components.".to_string(),
        user_text: prompt,
        temperature: 0.2,
        max_tokens: 1024,
    };
    let response = generator.generate(request).await?;
    Ok(parse_modular_prompt(&response.text).unwrap_or_else(|| single_component_fallback(content)))
}

/// Reference reconstitute adapter: prompts the generator to reassemble a
/// [`ModularPrompt`] into text. Falls back to [`ModularPrompt::to_text`]
/// on any generator failure.
pub async fn reconstitute(generator: &dyn Generator, modular: &ModularPrompt) -> GaloisResult<String> {
    let components_text = modular
        .components
        .iter()
        .map(|c| format!("[{}] (depends on: {}) {}", c.name, c.dependencies.join(", "), c.content))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = RECONSTITUTE_TEMPLATE.replace("{components}", &components_text);
    let request = GenerationRequest {
        system_text: "You reassemble structured components into prose.".to_string(),
        user_text: prompt,
        temperature: 0.2,
        max_tokens: 1024,
    };
    match generator.generate(request).await {
        Ok(response) => Ok(response.text),
        Err(_) => Ok(modular.to_text()),
    }
}

fn single_component_fallback(content: &str) -> ModularPrompt {
    ModularPrompt {
        components: vec![ModularComponent {
            name: "whole".to_string(),
            content: content.to_string(),
            weight: 1.0,
            dependencies: Vec::new(),
        }],
        ghosts: Vec::new(),
        structure_notes: "fallback: single component".to_string(),
    }
}

fn parse_modular_prompt(text: &str) -> Option<ModularPrompt> {
    let mut components = Vec::new();
    let mut ghosts = Vec::new();
    let mut current_name: Option<String> = None;
    let mut current_content: Option<String> = None;
    let mut current_deps: Vec<String> = Vec::new();
    let mut ghost_content: Option<String> = None;
    let mut ghost_rationale: Option<String> = None;
    let mut ghost_cost: f64 = 0.0;

    let flush_component = |components: &mut Vec<ModularComponent>,
                            name: &mut Option<String>,
                            content: &mut Option<String>,
                            deps: &mut Vec<String>| {
        if let (Some(n), Some(c)) = (name.take(), content.take()) {
            components.push(ModularComponent {
                name: n,
                content: c,
                weight: 1.0,
                dependencies: std::mem::take(deps),
            });
        }
    };

    for line in text.lines() {
        let line = line.trim();
        if line == "---" {
            flush_component(&mut components, &mut current_name, &mut current_content, &mut current_deps);
        } else if let Some(rest) = line.strip_prefix("COMPONENT:") {
            flush_component(&mut components, &mut current_name, &mut current_content, &mut current_deps);
            current_name = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("CONTENT:") {
            current_content = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("DEPENDS:") {
            let rest = rest.trim();
            if !rest.eq_ignore_ascii_case("none") && !rest.is_empty() {
                current_deps = rest.split(',').map(|s| s.trim().to_string()).collect();
            }
        } else if let Some(rest) = line.strip_prefix("GHOST:") {
            ghost_content = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("RATIONALE:") {
            ghost_rationale = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("COST:") {
            ghost_cost = rest.trim().parse().unwrap_or(0.0);
        }
    }
    flush_component(&mut components, &mut current_name, &mut current_content, &mut current_deps);
    if let Some(content) = ghost_content {
        ghosts.push(GhostAlternative {
            content,
            rationale: ghost_rationale.unwrap_or_default(),
            deferral_cost: ghost_cost,
        });
    }

    if components.is_empty() {
        None
    } else {
        Some(ModularPrompt { components, ghosts, structure_notes: String::new() })
    }
}

/// A deterministic test/reference generator that echoes input with a
/// trivial transformation, used as a `MockGenerator` capability in tests.
pub struct EchoGenerator;

#[async_trait::async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, request: GenerationRequest) -> GaloisResult<GenerationResponse> {
        Ok(GenerationResponse {
            text: format!(
                "COMPONENT: whole\nCONTENT: {}\nDEPENDS: none\n---",
                request.user_text.trim()
            ),
            model: "echo".to_string(),
            tokens_used: request.user_text.len() as u32,
            raw_metadata: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_component_and_ghost_blocks() {
        let text = "COMPONENT: a\nCONTENT: first\nDEPENDS: none\n---\n\
                     COMPONENT: b\nCONTENT: second\nDEPENDS: a\n---\n\
                     GHOST: alt\nRATIONALE: too risky\nCOST: 0.4";
        let parsed = parse_modular_prompt(text).unwrap();
        assert_eq!(parsed.components.len(), 2);
        assert_eq!(parsed.components[1].dependencies, vec!["a".to_string()]);
        assert_eq!(parsed.ghosts.len(), 1);
        assert_eq!(parsed.ghosts[0].deferral_cost, 0.4);
    }

    #[test]
    fn malformed_text_yields_none() {
        assert!(parse_modular_prompt("not a structured response at all").is_none());
    }

    #[test]
    fn to_text_respects_dependency_order() {
        let modular = ModularPrompt {
            components: vec![
                ModularComponent { name: "b".into(), content: "second".into(), weight: 1.0, dependencies: vec!["a".into()] },
                ModularComponent { name: "a".into(), content: "first".into(), weight: 1.0, dependencies: vec![] },
            ],
            ghosts: vec![],
            structure_notes: String::new(),
        };
        assert_eq!(modular.to_text(), "first\n\nsecond");
    }

    #[tokio::test]
    async fn restructure_falls_back_on_malformed_echo() {
        struct Garbage;
        #[async_trait::async_trait]
        impl Generator for Garbage {
            async fn generate(&self, _r: GenerationRequest) -> GaloisResult<GenerationResponse> {
                Ok(GenerationResponse { text: "garbage".into(), model: "g".into(), tokens_used: 1, raw_metadata: None })
            }
        }
        let modular = restructure(&Garbage, "hello").await.unwrap();
        assert_eq!(modular.components.len(), 1);
        assert_eq!(modular.components[0].content, "hello");
    }
}
