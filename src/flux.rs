//! Flux runtime: lifts the soul engine to an event-stream service with
//! synchronous perturbation injection and a periodic pulse loop.
//!
//! Scheduling is single-threaded cooperative per instance, grounded on
//! `flux.py::_merged_source`'s priority-merge: perturbations always drain
//! before the source is polled, and the whole loop runs inside one
//! `tokio::spawn`'d task per [`FluxRuntime`].

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};

use crate::event::{Event, EventKind, Payload};
use crate::soul::{BudgetTier, InterceptToken, Mode, SoulEngine};

const SOURCE_READ_TIMEOUT: Duration = Duration::from_millis(50);
const IDLE_SLEEP: Duration = Duration::from_millis(10);
const OUTPUT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
const EMIT_TIMEOUT: Duration = Duration::from_secs(1);
const PERTURBATION_INTENSITY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Dormant,
    Flowing,
    Draining,
    Stopped,
}

struct QueuedPerturbation {
    priority: i64,
    seq: u64,
    event: Event,
    reply: oneshot::Sender<Event>,
}

impl PartialEq for QueuedPerturbation {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueuedPerturbation {}
impl PartialOrd for QueuedPerturbation {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedPerturbation {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; lower `priority` value means higher
        // scheduling priority, so invert, and break ties FIFO by seq.
        other.priority.cmp(&self.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Configuration for a [`FluxRuntime`].
#[derive(Debug, Clone)]
pub struct FluxConfig {
    pub perturbation_timeout: Duration,
    pub pulse_interval: Option<Duration>,
    pub entropy_budget: u64,
    pub output_capacity: usize,
}

impl Default for FluxConfig {
    fn default() -> Self {
        Self {
            perturbation_timeout: Duration::from_secs(5),
            pulse_interval: Some(Duration::from_secs(30)),
            entropy_budget: 10_000,
            output_capacity: 256,
        }
    }
}

impl FluxConfig {
    pub fn with_perturbation_timeout(mut self, timeout: Duration) -> Self {
        self.perturbation_timeout = timeout;
        self
    }

    pub fn with_pulse_interval(mut self, interval: Option<Duration>) -> Self {
        self.pulse_interval = interval;
        self
    }

    pub fn with_entropy_budget(mut self, budget: u64) -> Self {
        self.entropy_budget = budget;
        self
    }
}

/// A pluggable best-effort observability sink. Failures are swallowed.
#[async_trait::async_trait]
pub trait MirrorSink: Send + Sync {
    async fn publish(&self, event: &Event);
}

/// An abstract event source the runtime polls for input. `next` should
/// return `Ok(None)` on a timeout (no item ready) and `Err(())` when the
/// source is exhausted.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    async fn next(&self, timeout: Duration) -> SourcePoll;
}

pub enum SourcePoll {
    Item(Event),
    Empty,
    Exhausted,
}

/// An `mpsc`-backed source: convenient default for feeding events from
/// ordinary producer code.
pub struct ChannelSource {
    receiver: Mutex<mpsc::Receiver<Event>>,
}

impl ChannelSource {
    pub fn new(receiver: mpsc::Receiver<Event>) -> Self {
        Self { receiver: Mutex::new(receiver) }
    }
}

#[async_trait::async_trait]
impl EventSource for ChannelSource {
    async fn next(&self, timeout: Duration) -> SourcePoll {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(event)) => SourcePoll::Item(event),
            Ok(None) => SourcePoll::Exhausted,
            Err(_) => SourcePoll::Empty,
        }
    }
}

/// Lifts a [`SoulEngine`] to a streaming event-processing service.
pub struct FluxRuntime {
    soul: Arc<SoulEngine>,
    config: FluxConfig,
    state: RwLock<Lifecycle>,
    perturbations: Mutex<BinaryHeap<QueuedPerturbation>>,
    perturbation_seq: AtomicU64,
    entropy_remaining: AtomicI64,
    output_tx: mpsc::Sender<Event>,
    output_rx: Mutex<mpsc::Receiver<Event>>,
    mirror: RwLock<Option<Arc<dyn MirrorSink>>>,
}

impl FluxRuntime {
    pub fn new(soul: Arc<SoulEngine>, config: FluxConfig) -> Self {
        let (output_tx, output_rx) = mpsc::channel(config.output_capacity);
        let entropy = config.entropy_budget as i64;
        Self {
            soul,
            config,
            state: RwLock::new(Lifecycle::Dormant),
            perturbations: Mutex::new(BinaryHeap::new()),
            perturbation_seq: AtomicU64::new(0),
            entropy_remaining: AtomicI64::new(entropy),
            output_tx,
            output_rx: Mutex::new(output_rx),
            mirror: RwLock::new(None),
        }
    }

    pub async fn set_mirror(&self, sink: Arc<dyn MirrorSink>) {
        *self.mirror.write().await = Some(sink);
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        *self.state.read().await
    }

    /// DORMANT/STOPPED -> FLOWING. Spawns the processing loop and,
    /// if configured, the pulse loop.
    pub async fn start(self: &Arc<Self>, source: Arc<dyn EventSource>) {
        {
            let mut state = self.state.write().await;
            if !matches!(*state, Lifecycle::Dormant | Lifecycle::Stopped) {
                return;
            }
            *state = Lifecycle::Flowing;
        }

        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            runtime.run_processing_loop(source).await;
        });

        if let Some(interval) = self.config.pulse_interval {
            let runtime = Arc::clone(self);
            tokio::spawn(async move {
                runtime.run_pulse_loop(interval).await;
            });
        }
    }

    /// Any state -> STOPPED. Drains pending perturbations with a
    /// cancellation error rather than leaving callers hanging.
    pub async fn stop(&self) {
        *self.state.write().await = Lifecycle::Stopped;
        let mut queue = self.perturbations.lock().await;
        while let Some(queued) = queue.pop() {
            let _ = queued.reply.send(Event::error(queued.event.kind, "flux runtime stopped"));
        }
    }

    /// STOPPED -> DORMANT. Clears counters and queues.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        if !matches!(*state, Lifecycle::Stopped) {
            return;
        }
        *state = Lifecycle::Dormant;
        self.entropy_remaining.store(self.config.entropy_budget as i64, Ordering::SeqCst);
        self.perturbations.lock().await.clear();
    }

    /// Submit an event for processing. In DORMANT, processes inline. In
    /// FLOWING/DRAINING, enqueues as a priority-0 perturbation and awaits
    /// a correlated completion, bounded by `perturbation_timeout`.
    pub async fn invoke(&self, event: Event) -> Event {
        let state = *self.state.read().await;
        match state {
            Lifecycle::Dormant => self.process_event(event).await,
            Lifecycle::Flowing | Lifecycle::Draining => {
                let (tx, rx) = oneshot::channel();
                let seq = self.perturbation_seq.fetch_add(1, Ordering::SeqCst);
                {
                    let mut queue = self.perturbations.lock().await;
                    queue.push(QueuedPerturbation { priority: 0, seq, event, reply: tx });
                }
                match tokio::time::timeout(self.config.perturbation_timeout, rx).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Event::error(EventKind::Perturbation, "perturbation dropped before completion"),
                    Err(_) => Event::error(EventKind::Perturbation, "perturbation timed out"),
                }
            }
            Lifecycle::Stopped => Event::error(event.kind, "flux runtime is stopped"),
        }
    }

    /// Non-blocking read of the next emitted output event, bounded by
    /// `OUTPUT_POLL_TIMEOUT`. Returns `None` on timeout.
    pub async fn poll_output(&self) -> Option<Event> {
        let mut rx = self.output_rx.lock().await;
        tokio::time::timeout(OUTPUT_POLL_TIMEOUT, rx.recv()).await.ok().flatten()
    }

    async fn emit(&self, event: Event) {
        if let Some(sink) = self.mirror.read().await.clone() {
            sink.publish(&event).await;
        }
        let tx = self.output_tx.clone();
        let _ = tokio::time::timeout(EMIT_TIMEOUT, tx.send(event)).await;
    }

    async fn run_processing_loop(&self, source: Arc<dyn EventSource>) {
        loop {
            if matches!(*self.state.read().await, Lifecycle::Stopped) {
                return;
            }

            let perturbation = { self.perturbations.lock().await.pop() };
            if let Some(queued) = perturbation {
                let result = self.process_event(queued.event).await;
                let _ = queued.reply.send(result);
                self.consume_entropy().await;
                continue;
            }

            if matches!(*self.state.read().await, Lifecycle::Draining) {
                *self.state.write().await = Lifecycle::Stopped;
                return;
            }

            match source.next(SOURCE_READ_TIMEOUT).await {
                SourcePoll::Item(event) => {
                    let result = self.process_event(event).await;
                    self.emit(result).await;
                    if !self.consume_entropy().await {
                        *self.state.write().await = Lifecycle::Draining;
                    }
                }
                SourcePoll::Exhausted => {
                    *self.state.write().await = Lifecycle::Draining;
                }
                SourcePoll::Empty => {
                    tokio::time::sleep(IDLE_SLEEP).await;
                }
            }
        }
    }

    /// Decrements the entropy budget; returns `false` once exhausted.
    async fn consume_entropy(&self) -> bool {
        self.entropy_remaining.fetch_sub(1, Ordering::SeqCst) > 0
    }

    async fn run_pulse_loop(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !matches!(*self.state.read().await, Lifecycle::Flowing) {
                return;
            }
            let state = self.soul.manifest().await;
            let pulse = Event::pulse(state.interactions, state.session_tokens, state.mode.as_str(), true);
            self.emit(pulse).await;
        }
    }

    /// Per-kind dispatch. Errors never propagate: any failure becomes an
    /// `error` event instead.
    async fn process_event(&self, event: Event) -> Event {
        let correlation_id = event.correlation_id.clone();
        let result = self.dispatch(&event).await;
        match result {
            Ok(mut out) => {
                if let Some(id) = correlation_id {
                    out = out.with_correlation_id(id);
                }
                out
            }
            Err(message) => Event::error(event.kind, message),
        }
    }

    async fn dispatch(&self, event: &Event) -> Result<Event, String> {
        match event.kind {
            EventKind::DialogueTurn => {
                let message = string_field(&event.payload, "message").unwrap_or_default();
                let mode = string_field(&event.payload, "mode").and_then(|m| Mode::parse(&m));
                let output = self.soul.dialogue(&message, mode, BudgetTier::Dialogue).await;
                let state = self.soul.manifest().await;
                Ok(response_event(EventKind::DialogueTurn, &output.response, &state))
            }
            EventKind::InterceptRequest => {
                let operation = string_field(&event.payload, "operation").unwrap_or_default();
                let reason = string_field(&event.payload, "reason").unwrap_or_default();
                let token = InterceptToken {
                    id: string_field(&event.payload, "id").unwrap_or_else(|| "unattributed".to_string()),
                    operation,
                    reason,
                    severity: string_field(&event.payload, "severity"),
                };
                let result = self.soul.intercept_deep(&token).await;
                let mut payload = Payload::new();
                payload.insert("recommendation".into(), Value::String(format!("{:?}", result.recommendation).to_lowercase()));
                payload.insert("confidence".into(), serde_json::to_value(result.confidence).unwrap());
                payload.insert("reasoning".into(), Value::String(result.reasoning.clone()));
                Ok(Event {
                    kind: EventKind::InterceptResult,
                    timestamp: chrono::Utc::now(),
                    payload,
                    state_snapshot: None,
                    correlation_id: None,
                })
            }
            EventKind::ModeChange => {
                let Some(mode) = string_field(&event.payload, "to_mode").and_then(|m| Mode::parse(&m)) else {
                    return Err("mode_change event missing a valid to_mode field".to_string());
                };
                let greeting = self.soul.enter_mode(mode).await;
                let state = self.soul.manifest().await;
                Ok(response_event(EventKind::DialogueTurn, &greeting, &state))
            }
            EventKind::EigenvectorProbe | EventKind::StateSnapshot => {
                let state = self.soul.manifest().await;
                let mut payload = Payload::new();
                payload.insert("coordinates".into(), serde_json::to_value(&state.coordinates).unwrap_or(Value::Null));
                Ok(Event { kind: event.kind, timestamp: chrono::Utc::now(), payload, state_snapshot: None, correlation_id: None })
            }
            EventKind::Ping => Ok(Event::ping()),
            EventKind::Perturbation => {
                let intensity = number_field(&event.payload, "intensity").unwrap_or(0.0);
                let state = self.soul.manifest().await;
                if intensity > PERTURBATION_INTENSITY_THRESHOLD {
                    let content = string_field(&event.payload, "content").unwrap_or_default();
                    let mut payload = Payload::new();
                    payload.insert("content".into(), Value::String(format!("noted a strong signal: {content}")));
                    Ok(Event { kind: EventKind::Thought, timestamp: chrono::Utc::now(), payload, state_snapshot: None, correlation_id: None })
                } else {
                    let mut payload = event.payload.clone();
                    payload.insert("mode".into(), Value::String(state.mode.as_str().to_string()));
                    payload.insert("interactions".into(), Value::from(state.interactions));
                    Ok(Event { kind: event.kind, timestamp: chrono::Utc::now(), payload, state_snapshot: None, correlation_id: None })
                }
            }
            EventKind::DialogueStart
            | EventKind::DialogueEnd
            | EventKind::Thought
            | EventKind::Feeling
            | EventKind::Observation
            | EventKind::SelfChallenge
            | EventKind::Gratitude
            | EventKind::DreamStart
            | EventKind::DreamPattern
            | EventKind::DreamInsight
            | EventKind::DreamEnd => {
                let state = self.soul.manifest().await;
                let mut payload = event.payload.clone();
                payload.insert("mode".into(), Value::String(state.mode.as_str().to_string()));
                payload.insert("interactions".into(), Value::from(state.interactions));
                payload.insert("coordinates".into(), serde_json::to_value(&state.coordinates).unwrap_or(Value::Null));
                Ok(Event { kind: event.kind, timestamp: chrono::Utc::now(), payload, state_snapshot: None, correlation_id: None })
            }
            _ => Ok(event.clone()),
        }
    }
}

fn string_field(payload: &Payload, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn number_field(payload: &Payload, key: &str) -> Option<f64> {
    payload.get(key).and_then(|v| v.as_f64())
}

fn response_event(kind: EventKind, message: &str, state: &crate::soul::SoulState) -> Event {
    let mut payload = Payload::new();
    payload.insert("message".into(), Value::String(message.to_string()));
    payload.insert("is_request".into(), Value::Bool(false));
    payload.insert("mode".into(), Value::String(state.mode.as_str().to_string()));
    Event { kind, timestamp: chrono::Utc::now(), payload, state_snapshot: None, correlation_id: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLog, InMemoryAuditStorage};
    use std::sync::atomic::AtomicBool;

    fn engine() -> Arc<SoulEngine> {
        let audit = Arc::new(AuditLog::new(Arc::new(InMemoryAuditStorage::default()), 10));
        Arc::new(SoulEngine::new(crate::soul::SoulConfig::default(), audit))
    }

    struct EmptySource;
    #[async_trait::async_trait]
    impl EventSource for EmptySource {
        async fn next(&self, _timeout: Duration) -> SourcePoll {
            tokio::time::sleep(Duration::from_millis(1)).await;
            SourcePoll::Exhausted
        }
    }

    #[tokio::test]
    async fn invoke_in_dormant_processes_inline() {
        let runtime = FluxRuntime::new(engine(), FluxConfig::default().with_pulse_interval(None));
        let mut payload = Payload::new();
        payload.insert("message".into(), Value::String("hello there".into()));
        let event = Event { kind: EventKind::DialogueTurn, timestamp: chrono::Utc::now(), payload, state_snapshot: None, correlation_id: None };
        let result = runtime.invoke(event).await;
        assert_eq!(result.kind, EventKind::DialogueTurn);
        assert!(result.payload.contains_key("message"));
    }

    #[tokio::test]
    async fn invoke_preserves_correlation_id() {
        let runtime = FluxRuntime::new(engine(), FluxConfig::default().with_pulse_interval(None));
        let event = Event::dialogue_turn("hi", true).with_correlation_id("abc");
        let result = runtime.invoke(event).await;
        assert_eq!(result.correlation_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn mode_change_emits_dialogue_turn_with_greeting() {
        let runtime = FluxRuntime::new(engine(), FluxConfig::default().with_pulse_interval(None));
        let event = Event::mode_change("challenge");
        let result = runtime.invoke(event).await;
        assert_eq!(result.kind, EventKind::DialogueTurn);
        let message = result.payload.get("message").unwrap().as_str().unwrap();
        assert!(message.starts_with("Entering CHALLENGE mode"));
    }

    #[tokio::test]
    async fn unknown_mode_change_yields_error_event() {
        let runtime = FluxRuntime::new(engine(), FluxConfig::default().with_pulse_interval(None));
        let event = Event::mode_change("not_a_real_mode");
        let result = runtime.invoke(event).await;
        assert_eq!(result.kind, EventKind::Error);
    }

    #[tokio::test]
    async fn start_then_stop_transitions_lifecycle() {
        let runtime = Arc::new(FluxRuntime::new(engine(), FluxConfig::default().with_pulse_interval(None)));
        runtime.start(Arc::new(EmptySource)).await;
        assert_eq!(runtime.lifecycle().await, Lifecycle::Flowing);
        runtime.stop().await;
        assert_eq!(runtime.lifecycle().await, Lifecycle::Stopped);
    }

    #[tokio::test]
    async fn high_intensity_perturbation_yields_thought_event() {
        let runtime = FluxRuntime::new(engine(), FluxConfig::default().with_pulse_interval(None));
        let event = Event::perturbation("unexpected input", 0.9);
        let result = runtime.invoke(event).await;
        assert_eq!(result.kind, EventKind::Thought);
    }

    #[tokio::test]
    async fn low_intensity_perturbation_passes_through_with_narrow_state() {
        let runtime = FluxRuntime::new(engine(), FluxConfig::default().with_pulse_interval(None));
        let event = Event::perturbation("minor note", 0.1);
        let result = runtime.invoke(event).await;
        assert_eq!(result.kind, EventKind::Perturbation);
        assert!(result.payload.contains_key("mode"));
        assert!(!result.payload.contains_key("coordinates"));
    }

    struct RecordingMirror {
        called: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl MirrorSink for RecordingMirror {
        async fn publish(&self, _event: &Event) {
            self.called.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn mirror_sink_receives_emitted_events() {
        let runtime = FluxRuntime::new(engine(), FluxConfig::default().with_pulse_interval(None));
        let called = Arc::new(AtomicBool::new(false));
        runtime.set_mirror(Arc::new(RecordingMirror { called: Arc::clone(&called) })).await;
        runtime.emit(Event::ping()).await;
        assert!(called.load(Ordering::SeqCst));
    }
}
