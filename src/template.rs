//! Zero-cost, pattern-matched replies that bypass the generator entirely.

use rand::seq::SliceRandom;

/// Source of randomness for template selection, injected so tests can pin
/// the pick deterministically.
pub trait RandomSource {
    fn pick<'a>(&mut self, choices: &'a [&'static str]) -> &'a str;
}

/// Production random source backed by the thread-local RNG.
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn pick<'a>(&mut self, choices: &'a [&'static str]) -> &'a str {
        let mut rng = rand::thread_rng();
        choices.choose(&mut rng).copied().unwrap_or("")
    }
}

/// Deterministic random source for tests: always returns the element at a
/// fixed index (clamped to bounds).
pub struct FixedIndex(pub usize);

impl RandomSource for FixedIndex {
    fn pick<'a>(&mut self, choices: &'a [&'static str]) -> &'a str {
        choices[self.0.min(choices.len().saturating_sub(1))]
    }
}

const MORNING_GREETINGS: &[&str] = &["Morning. What's alive for you today?", "Good morning."];
const EVENING_GREETINGS: &[&str] = &["Evening. How'd the day land?", "Good evening."];
const GENERIC_GREETINGS: &[&str] = &["Hey. What's up?", "Hi there."];

const SESSION_TERMS: &[&str] = &["save", "done", "bye", "thanks", "goodbye", "exit"];

fn short_reply_for_mode(mode: &str) -> &'static [&'static str] {
    match mode {
        "reflect" => &["Sit with that a moment.", "What's underneath that?"],
        "advise" => &["Noted. Want a recommendation?", "Okay — what's the constraint?"],
        "challenge" => &["Is that actually true?", "Say more — push on that."],
        "explore" => &["Interesting. Where does that lead?", "Keep going."],
        _ => &["Go on."],
    }
}

/// Attempt a templated reply without invoking the generator. Returns `None`
/// if the input doesn't match a known small pattern class.
pub fn try_reply(input: &str, active_mode: &str, rng: &mut dyn RandomSource) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    let is_greeting = words.iter().any(|w| {
        matches!(*w, "hi" | "hello" | "hey" | "yo" | "greetings" | "morning" | "evening")
    });
    let is_session_term = words.iter().any(|w| SESSION_TERMS.contains(w));

    if is_greeting {
        let bank: &[&str] = if lower.contains("morning") {
            MORNING_GREETINGS
        } else if lower.contains("evening") {
            EVENING_GREETINGS
        } else {
            GENERIC_GREETINGS
        };
        return Some(rng.pick(bank).to_string());
    }

    if is_session_term {
        return Some("Take care. I'll remember where we left off.".to_string());
    }

    if trimmed.len() < 20 {
        let bank = short_reply_for_mode(active_mode);
        return Some(rng.pick(bank).to_string());
    }

    None
}

/// Fallback static prompt for empty/whitespace-only input. Callers (the
/// soul engine) use this directly rather than routing it through
/// [`try_reply`].
pub const EMPTY_INPUT_PROMPT: &str = "What's on your mind?";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_selects_morning_bank() {
        let mut rng = FixedIndex(0);
        let reply = try_reply("good morning!", "reflect", &mut rng).unwrap();
        assert!(MORNING_GREETINGS.contains(&reply.as_str()));
    }

    #[test]
    fn session_term_produces_farewell() {
        let mut rng = FixedIndex(0);
        let reply = try_reply("thanks, bye", "reflect", &mut rng).unwrap();
        assert!(reply.contains("Take care"));
    }

    #[test]
    fn short_input_uses_mode_bank() {
        let mut rng = FixedIndex(1);
        let reply = try_reply("ok sure", "challenge", &mut rng).unwrap();
        assert!(short_reply_for_mode("challenge").contains(&reply.as_str()));
    }

    #[test]
    fn long_non_matching_input_returns_none() {
        let mut rng = FixedIndex(0);
        let input = "I've been thinking about how we structure the quarterly review process";
        assert!(try_reply(input, "reflect", &mut rng).is_none());
    }

    #[test]
    fn empty_input_returns_none_from_try_reply() {
        let mut rng = FixedIndex(0);
        assert!(try_reply("   ", "reflect", &mut rng).is_none());
    }
}
