//! Fire-and-forget cross-subsystem event dispatch with result subscription.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::event::{Event, EventKind};

/// Outcome of a single handler invocation.
#[derive(Debug, Clone)]
pub struct SynergyResult {
    pub success: bool,
    pub handler_name: String,
    pub message: String,
    pub artifact_id: Option<String>,
}

/// A registered handler for a given event kind.
#[async_trait::async_trait]
pub trait SynergyHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, event: &Event) -> SynergyResult;
}

type ResultSubscriber = Box<dyn Fn(&Event, &SynergyResult) + Send + Sync>;

/// Registration/result-subscriber lists are guarded by a plain `Mutex`
/// rather than a tokio lock: registration may legitimately happen from a
/// synchronous context, and the critical sections here never hold across
/// an await point.
#[derive(Default)]
struct Registry {
    handlers: HashMap<EventKind, Vec<(u64, Arc<dyn SynergyHandler>)>>,
    subscribers: Vec<(u64, Arc<ResultSubscriber>)>,
    next_id: u64,
}

impl Registry {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Which registration a given [`Unsubscribe`] removes.
enum Registration {
    Handler(EventKind),
    Subscriber,
}

/// Returned by `register`/`subscribe_results`. Calling `unsubscribe`
/// removes just that one registration; dropping it without calling does
/// nothing (registration stays live).
pub struct Unsubscribe {
    bus: Weak<SynergyBus>,
    registration: Registration,
    id: u64,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        let Some(bus) = self.bus.upgrade() else { return };
        let mut registry = bus.registry.lock().unwrap();
        match self.registration {
            Registration::Handler(kind) => {
                if let Some(list) = registry.handlers.get_mut(&kind) {
                    list.retain(|(id, _)| *id != self.id);
                }
            }
            Registration::Subscriber => {
                registry.subscribers.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

/// The cross-subsystem event bus.
pub struct SynergyBus {
    registry: Mutex<Registry>,
    pending: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Default for SynergyBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SynergyBus {
    pub fn new() -> Self {
        Self { registry: Mutex::new(Registry::default()), pending: Mutex::new(Vec::new()) }
    }

    /// Register a handler for an event kind. Returns an [`Unsubscribe`]
    /// that removes just this registration.
    pub fn register(self: &Arc<Self>, kind: EventKind, handler: Arc<dyn SynergyHandler>) -> Unsubscribe {
        let mut registry = self.registry.lock().unwrap();
        let id = registry.next_id();
        registry.handlers.entry(kind).or_default().push((id, handler));
        Unsubscribe { bus: Arc::downgrade(self), registration: Registration::Handler(kind), id }
    }

    pub fn subscribe_results(
        self: &Arc<Self>,
        subscriber: impl Fn(&Event, &SynergyResult) + Send + Sync + 'static,
    ) -> Unsubscribe {
        let mut registry = self.registry.lock().unwrap();
        let id = registry.next_id();
        registry.subscribers.push((id, Arc::new(Box::new(subscriber))));
        Unsubscribe { bus: Arc::downgrade(self), registration: Registration::Subscriber, id }
    }

    fn handlers_for(&self, kind: EventKind) -> Vec<Arc<dyn SynergyHandler>> {
        let registry = self.registry.lock().unwrap();
        registry.handlers.get(&kind).map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect()).unwrap_or_default()
    }

    fn notify_subscribers(&self, event: &Event, result: &SynergyResult) {
        let subscribers = {
            let registry = self.registry.lock().unwrap();
            registry.subscribers.iter().map(|(_, s)| Arc::clone(s)).collect::<Vec<_>>()
        };
        for subscriber in subscribers {
            subscriber(event, result);
        }
    }

    async fn safe_handle(handler: &dyn SynergyHandler, event: &Event) -> SynergyResult {
        handler.handle(event).await
    }

    /// Fire-and-forget: spawns a background dispatch task. Handler
    /// failures are caught at the handler boundary via [`SynergyResult`],
    /// not propagated as a panic.
    pub fn emit(self: &Arc<Self>, event: Event) {
        let handlers = self.handlers_for(event.kind);
        if handlers.is_empty() {
            tracing::debug!("no handlers registered for {:?}", event.kind);
            return;
        }
        let bus = Arc::clone(self);
        let task = tokio::spawn(async move {
            for handler in handlers {
                let result = Self::safe_handle(handler.as_ref(), &event).await;
                bus.notify_subscribers(&event, &result);
            }
        });
        self.pending.lock().unwrap().push(task);
    }

    /// Synchronously run every handler and return all results.
    pub async fn emit_and_wait(&self, event: Event) -> Vec<SynergyResult> {
        let handlers = self.handlers_for(event.kind);
        let mut results = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let result = Self::safe_handle(handler.as_ref(), &event).await;
            self.notify_subscribers(&event, &result);
            results.push(result);
        }
        results
    }

    /// Await all pending dispatch tasks with a timeout. On timeout,
    /// pending handlers continue running in the background with no
    /// guarantee of completion.
    pub async fn drain(&self, timeout: Duration) {
        let tasks: Vec<_> = {
            let mut pending = self.pending.lock().unwrap();
            std::mem::take(&mut *pending)
        };
        if tasks.is_empty() {
            return;
        }
        let joined = futures::future::join_all(tasks);
        if tokio::time::timeout(timeout, joined).await.is_err() {
            tracing::warn!("synergy bus drain timed out with pending handlers still running");
        }
    }

    pub fn clear(&self) {
        let mut registry = self.registry.lock().unwrap();
        registry.handlers.clear();
        registry.subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        name: String,
        count: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl SynergyHandler for CountingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, _event: &Event) -> SynergyResult {
            self.count.fetch_add(1, Ordering::SeqCst);
            SynergyResult { success: true, handler_name: self.name.clone(), message: "ok".into(), artifact_id: None }
        }
    }

    struct FailingHandler;

    #[async_trait::async_trait]
    impl SynergyHandler for FailingHandler {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _event: &Event) -> SynergyResult {
            SynergyResult { success: false, handler_name: "failing".into(), message: "Handler failed: boom".into(), artifact_id: None }
        }
    }

    #[tokio::test]
    async fn emit_and_wait_runs_all_handlers_synchronously() {
        let bus = Arc::new(SynergyBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        bus.register(EventKind::Pulse, Arc::new(CountingHandler { name: "a".into(), count: Arc::clone(&count) }));
        bus.register(EventKind::Pulse, Arc::new(CountingHandler { name: "b".into(), count: Arc::clone(&count) }));
        let results = bus.emit_and_wait(Event::pulse(1, 1, "reflect", true)).await;
        assert_eq!(results.len(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn emit_is_fire_and_forget_and_drain_waits() {
        let bus = Arc::new(SynergyBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        bus.register(EventKind::Ping, Arc::new(CountingHandler { name: "a".into(), count: Arc::clone(&count) }));
        bus.emit(Event::ping());
        bus.drain(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_handler_does_not_panic_dispatch() {
        let bus = Arc::new(SynergyBus::new());
        bus.register(EventKind::Ping, Arc::new(FailingHandler));
        let results = bus.emit_and_wait(Event::ping()).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
    }

    #[tokio::test]
    async fn clear_removes_all_registrations() {
        let bus = Arc::new(SynergyBus::new());
        bus.register(EventKind::Ping, Arc::new(FailingHandler));
        bus.clear();
        let results = bus.emit_and_wait(Event::ping()).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_that_handler() {
        let bus = Arc::new(SynergyBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let unsub = bus.register(EventKind::Ping, Arc::new(CountingHandler { name: "a".into(), count: Arc::clone(&count) }));
        bus.register(EventKind::Ping, Arc::new(CountingHandler { name: "b".into(), count: Arc::clone(&count) }));
        unsub.unsubscribe();
        let results = bus.emit_and_wait(Event::ping()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_that_result_subscriber() {
        let bus = Arc::new(SynergyBus::new());
        bus.register(EventKind::Ping, Arc::new(FailingHandler));
        let removed_calls = Arc::new(AtomicUsize::new(0));
        let kept_calls = Arc::new(AtomicUsize::new(0));
        let removed_counter = Arc::clone(&removed_calls);
        let kept_counter = Arc::clone(&kept_calls);
        let removed_sub = bus.subscribe_results(move |_event, _result| {
            removed_counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.subscribe_results(move |_event, _result| {
            kept_counter.fetch_add(1, Ordering::SeqCst);
        });
        removed_sub.unsubscribe();
        bus.emit_and_wait(Event::ping()).await;
        assert_eq!(removed_calls.load(Ordering::SeqCst), 0);
        assert_eq!(kept_calls.load(Ordering::SeqCst), 1);
    }
}
