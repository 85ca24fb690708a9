//! Push invalidation: a subject-keyed subscription whose named events map to
//! local feed actions.
//!
//! The work is split in two. [`PushListener`] lives on the event loop next to
//! the feed; it decides *when* to rebind and *what* an event means. The
//! [`SubscriptionTask`] is the only code that touches the [`PushChannel`]: it
//! holds at most one open [`Subscription`], always closes the old one before
//! opening the next, and tags everything it forwards with the binding's
//! generation so the listener can drop envelopes that were already queued
//! when the key changed.

use crate::driver::panic_message;
use crate::traits::{PushChannel, Subscription};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A named event as delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct RemoteEvent {
    #[serde(rename = "event")]
    pub name: String,
    #[serde(default)]
    pub run_id: Option<String>,
}

impl RemoteEvent {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            run_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEnvelope {
    pub generation: u64,
    pub subject_key: String,
    pub event: RemoteEvent,
}

/// Everything the subscription task reports back to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    Opened {
        generation: u64,
        subject_key: String,
    },
    Failed {
        generation: u64,
        subject_key: String,
        reason: String,
    },
    Dropped {
        generation: u64,
        subject_key: String,
    },
    Event(PushEnvelope),
}

impl SubscriptionEvent {
    pub fn generation(&self) -> u64 {
        match self {
            SubscriptionEvent::Opened { generation, .. }
            | SubscriptionEvent::Failed { generation, .. }
            | SubscriptionEvent::Dropped { generation, .. } => *generation,
            SubscriptionEvent::Event(env) => env.generation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedAction {
    Reload,
}

/// Event name to action. Names not in the map are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMap {
    actions: HashMap<String, FeedAction>,
}

impl EventMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, name: &str, action: FeedAction) -> Self {
        self.actions.insert(name.to_string(), action);
        self
    }

    /// The run section's handlers: a cancelled run invalidates the pipeline's list.
    pub fn reload_on_cancel() -> Self {
        Self::new().on("cancel", FeedAction::Reload)
    }

    pub fn action_for(&self, name: &str) -> Option<FeedAction> {
        self.actions.get(name).copied()
    }
}

/// What the subscription task should be subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub generation: u64,
    pub subject_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unbound,
    Connecting,
    Live,
    /// Open failed or the channel dropped us; no live invalidation until rebind or retry.
    Offline,
}

pub struct PushListener {
    subject_key: Option<String>,
    generation: u64,
    handlers: EventMap,
    link: LinkState,
}

impl PushListener {
    pub fn new(handlers: EventMap) -> Self {
        Self {
            subject_key: None,
            generation: 0,
            handlers,
            link: LinkState::Unbound,
        }
    }

    pub fn subject_key(&self) -> Option<&str> {
        self.subject_key.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    /// New binding only when the key actually changes; same key is a no-op.
    pub fn bind(&mut self, subject_key: Option<&str>) -> Option<Binding> {
        if self.subject_key.as_deref() == subject_key {
            return None;
        }
        self.generation += 1;
        self.subject_key = subject_key.map(str::to_string);
        self.link = if self.subject_key.is_some() {
            LinkState::Connecting
        } else {
            LinkState::Unbound
        };
        tracing::info!(
            generation = self.generation,
            key = ?self.subject_key,
            "rebinding push subscription"
        );
        Some(self.binding())
    }

    /// The current binding, for retrying after a failure.
    pub fn binding(&self) -> Binding {
        Binding {
            generation: self.generation,
            subject_key: self.subject_key.clone(),
        }
    }

    /// Swap handlers without touching the subscription.
    pub fn set_handlers(&mut self, handlers: EventMap) {
        self.handlers = handlers;
    }

    /// Applies a status report and returns the action an event maps to, if any.
    /// Anything from an older generation is dropped.
    pub fn handle(&mut self, event: &SubscriptionEvent) -> Option<FeedAction> {
        if event.generation() != self.generation {
            tracing::debug!(
                generation = event.generation(),
                current = self.generation,
                "dropping event for previous binding"
            );
            return None;
        }
        match event {
            SubscriptionEvent::Opened { .. } => {
                self.link = LinkState::Live;
                None
            }
            SubscriptionEvent::Failed { .. } | SubscriptionEvent::Dropped { .. } => {
                self.link = LinkState::Offline;
                None
            }
            SubscriptionEvent::Event(env) => self.route(env),
        }
    }

    pub fn route(&self, envelope: &PushEnvelope) -> Option<FeedAction> {
        if envelope.generation != self.generation
            || self.subject_key.as_deref() != Some(envelope.subject_key.as_str())
        {
            return None;
        }
        self.handlers.action_for(&envelope.event.name)
    }
}

/// Owns the push channel on a tokio task. Dropping it closes the active subscription.
pub struct SubscriptionTask {
    bindings: watch::Sender<Binding>,
    handle: JoinHandle<()>,
}

impl SubscriptionTask {
    pub fn spawn<T>(channel: Arc<dyn PushChannel>, tx: mpsc::UnboundedSender<T>) -> Self
    where
        T: From<SubscriptionEvent> + Send + 'static,
    {
        let (bindings, rx) = watch::channel(Binding {
            generation: 0,
            subject_key: None,
        });
        let handle = tokio::spawn(supervise(channel, rx, tx));
        Self { bindings, handle }
    }

    pub fn rebind(&self, binding: Binding) {
        self.bindings.send_replace(binding);
    }

    /// Re-open the current binding, e.g. after `Failed` or `Dropped`.
    pub fn retry(&self) {
        self.bindings.send_modify(|_| {});
    }

    /// Close the active subscription and wait for the task to finish.
    pub async fn shutdown(self) {
        let SubscriptionTask { bindings, handle } = self;
        drop(bindings);
        if let Err(e) = handle.await {
            tracing::error!("subscription task ended abnormally: {e}");
        }
    }
}

enum Wake {
    Rebind,
    Shutdown,
    Event(Option<RemoteEvent>),
}

async fn close_active(active: &mut Option<(Binding, Box<dyn Subscription>)>) {
    if let Some((binding, sub)) = active.take() {
        tracing::info!(
            generation = binding.generation,
            key = sub.subject_key(),
            "closing push subscription"
        );
        sub.close().await;
    }
}

/// Keeps a subscription worker alive. A panicking channel is reported as
/// `Failed` for the current binding. The restarted worker waits for the next
/// rebind or retry instead of reopening the same key straight away.
async fn supervise<T>(
    channel: Arc<dyn PushChannel>,
    bindings: watch::Receiver<Binding>,
    tx: mpsc::UnboundedSender<T>,
) where
    T: From<SubscriptionEvent> + Send + 'static,
{
    let mut worker_bindings = bindings.clone();
    let mut resume = false;
    loop {
        let worker = tokio::spawn(run_subscriptions(
            channel.clone(),
            worker_bindings,
            tx.clone(),
            resume,
        ));
        let join_err = match worker.await {
            Ok(()) => return,
            Err(e) if e.is_panic() => e,
            Err(e) => {
                tracing::error!("subscription worker cancelled: {e}");
                return;
            }
        };

        let reason = format!(
            "subscription worker panicked: {}",
            panic_message(join_err.into_panic())
        );
        // Mark the current binding seen before reporting, so a retry sent in
        // response to the report wakes the restarted worker.
        worker_bindings = bindings.clone();
        let binding = worker_bindings.borrow_and_update().clone();
        tracing::error!(generation = binding.generation, "{reason}");
        let report = SubscriptionEvent::Failed {
            generation: binding.generation,
            subject_key: binding.subject_key.unwrap_or_default(),
            reason,
        };
        if tx.send(report.into()).is_err() {
            return;
        }
        resume = true;
    }
}

async fn run_subscriptions<T>(
    channel: Arc<dyn PushChannel>,
    mut bindings: watch::Receiver<Binding>,
    tx: mpsc::UnboundedSender<T>,
    resume: bool,
) where
    T: From<SubscriptionEvent> + Send + 'static,
{
    if resume && bindings.changed().await.is_err() {
        return;
    }

    let mut active: Option<(Binding, Box<dyn Subscription>)> = None;

    loop {
        let binding = bindings.borrow_and_update().clone();
        close_active(&mut active).await;

        if let Some(key) = binding.subject_key.clone() {
            let report = match channel.open_subscription(&key).await {
                Ok(sub) => {
                    tracing::info!(generation = binding.generation, key = %key, "push subscription open");
                    active = Some((binding.clone(), sub));
                    SubscriptionEvent::Opened {
                        generation: binding.generation,
                        subject_key: key,
                    }
                }
                Err(e) => {
                    tracing::warn!(generation = binding.generation, key = %key, "push subscription failed: {e}");
                    SubscriptionEvent::Failed {
                        generation: binding.generation,
                        subject_key: key,
                        reason: format!("{e}"),
                    }
                }
            };
            if tx.send(report.into()).is_err() {
                close_active(&mut active).await;
                return;
            }
        }

        loop {
            let wake = match active.as_mut() {
                Some((_, sub)) => {
                    tokio::select! {
                        changed = bindings.changed() => {
                            if changed.is_ok() { Wake::Rebind } else { Wake::Shutdown }
                        }
                        event = sub.next_event() => Wake::Event(event),
                    }
                }
                None => {
                    if bindings.changed().await.is_ok() {
                        Wake::Rebind
                    } else {
                        Wake::Shutdown
                    }
                }
            };

            match wake {
                Wake::Rebind => break,
                Wake::Shutdown => {
                    close_active(&mut active).await;
                    return;
                }
                Wake::Event(Some(event)) => {
                    let Some((current, _)) = active.as_ref() else {
                        continue;
                    };
                    let envelope = PushEnvelope {
                        generation: current.generation,
                        subject_key: current.subject_key.clone().unwrap_or_default(),
                        event,
                    };
                    if tx.send(SubscriptionEvent::Event(envelope).into()).is_err() {
                        close_active(&mut active).await;
                        return;
                    }
                }
                Wake::Event(None) => {
                    if let Some((dropped, _)) = active.take() {
                        tracing::warn!(generation = dropped.generation, "push subscription dropped");
                        let report = SubscriptionEvent::Dropped {
                            generation: dropped.generation,
                            subject_key: dropped.subject_key.unwrap_or_default(),
                        };
                        if tx.send(report.into()).is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use color_eyre::eyre::{eyre, Result};
    use std::sync::Mutex;

    fn envelope(generation: u64, key: &str, name: &str) -> PushEnvelope {
        PushEnvelope {
            generation,
            subject_key: key.to_string(),
            event: RemoteEvent::named(name),
        }
    }

    #[test]
    fn cancel_maps_to_reload() {
        let mut l = PushListener::new(EventMap::reload_on_cancel());
        let b = l.bind(Some("pipelineA")).unwrap();
        assert_eq!(
            l.route(&envelope(b.generation, "pipelineA", "cancel")),
            Some(FeedAction::Reload)
        );
    }

    #[test]
    fn unmapped_event_is_ignored() {
        let mut l = PushListener::new(EventMap::reload_on_cancel());
        let b = l.bind(Some("pipelineA")).unwrap();
        assert_eq!(l.route(&envelope(b.generation, "pipelineA", "resolved")), None);
    }

    #[test]
    fn same_key_does_not_rebind() {
        let mut l = PushListener::new(EventMap::reload_on_cancel());
        assert!(l.bind(Some("a")).is_some());
        assert!(l.bind(Some("a")).is_none());
        assert_eq!(l.generation(), 1);
    }

    #[test]
    fn handler_swap_keeps_binding() {
        let mut l = PushListener::new(EventMap::new());
        let b = l.bind(Some("a")).unwrap();
        assert_eq!(l.route(&envelope(b.generation, "a", "cancel")), None);
        l.set_handlers(EventMap::reload_on_cancel());
        assert_eq!(l.generation(), b.generation);
        assert_eq!(
            l.route(&envelope(b.generation, "a", "cancel")),
            Some(FeedAction::Reload)
        );
    }

    #[test]
    fn old_generation_events_dropped_after_rebind() {
        let mut l = PushListener::new(EventMap::reload_on_cancel());
        let a = l.bind(Some("pipelineA")).unwrap();
        let b = l.bind(Some("pipelineB")).unwrap();
        assert!(b.generation > a.generation);
        let queued = SubscriptionEvent::Event(envelope(a.generation, "pipelineA", "cancel"));
        assert_eq!(l.handle(&queued), None);
        let fresh = SubscriptionEvent::Event(envelope(b.generation, "pipelineB", "cancel"));
        assert_eq!(l.handle(&fresh), Some(FeedAction::Reload));
    }

    #[test]
    fn link_state_follows_reports() {
        let mut l = PushListener::new(EventMap::new());
        assert_eq!(l.link(), LinkState::Unbound);
        let b = l.bind(Some("a")).unwrap();
        assert_eq!(l.link(), LinkState::Connecting);
        l.handle(&SubscriptionEvent::Opened {
            generation: b.generation,
            subject_key: "a".into(),
        });
        assert_eq!(l.link(), LinkState::Live);
        l.handle(&SubscriptionEvent::Dropped {
            generation: b.generation,
            subject_key: "a".into(),
        });
        assert_eq!(l.link(), LinkState::Offline);
        l.bind(None);
        assert_eq!(l.link(), LinkState::Unbound);
    }

    // --- Subscription task ---

    #[derive(Default)]
    struct Log {
        entries: Mutex<Vec<String>>,
    }

    impl Log {
        fn push(&self, s: String) {
            self.entries.lock().unwrap().push(s);
        }
        fn snapshot(&self) -> Vec<String> {
            self.entries.lock().unwrap().clone()
        }
    }

    struct FakeChannel {
        log: Arc<Log>,
        senders: Mutex<HashMap<String, mpsc::UnboundedSender<RemoteEvent>>>,
        refuse: Option<&'static str>,
    }

    struct FakeSubscription {
        key: String,
        rx: mpsc::UnboundedReceiver<RemoteEvent>,
        log: Arc<Log>,
    }

    #[async_trait]
    impl PushChannel for FakeChannel {
        async fn open_subscription(&self, subject_key: &str) -> Result<Box<dyn Subscription>> {
            if self.refuse == Some(subject_key) {
                self.log.push(format!("refuse {subject_key}"));
                return Err(eyre!("refused"));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders
                .lock()
                .unwrap()
                .insert(subject_key.to_string(), tx);
            self.log.push(format!("open {subject_key}"));
            Ok(Box::new(FakeSubscription {
                key: subject_key.to_string(),
                rx,
                log: self.log.clone(),
            }))
        }
    }

    #[async_trait]
    impl Subscription for FakeSubscription {
        fn subject_key(&self) -> &str {
            &self.key
        }
        async fn next_event(&mut self) -> Option<RemoteEvent> {
            self.rx.recv().await
        }
        async fn close(self: Box<Self>) {
            self.log.push(format!("close {}", self.key));
        }
    }

    fn fake(refuse: Option<&'static str>) -> (Arc<FakeChannel>, Arc<Log>) {
        let log = Arc::new(Log::default());
        let channel = Arc::new(FakeChannel {
            log: log.clone(),
            senders: Mutex::new(HashMap::new()),
            refuse,
        });
        (channel, log)
    }

    fn emit(channel: &FakeChannel, key: &str, name: &str) {
        let senders = channel.senders.lock().unwrap();
        let _ = senders[key].send(RemoteEvent::named(name));
    }

    #[tokio::test]
    async fn rebinding_closes_old_before_opening_new() {
        let (channel, log) = fake(None);
        let (tx, mut rx) = mpsc::unbounded_channel::<SubscriptionEvent>();
        let task = SubscriptionTask::spawn(channel.clone(), tx);
        let mut listener = PushListener::new(EventMap::reload_on_cancel());

        task.rebind(listener.bind(Some("pipelineA")).unwrap());
        let opened = rx.recv().await.unwrap();
        assert!(matches!(opened, SubscriptionEvent::Opened { .. }));
        listener.handle(&opened);

        emit(&channel, "pipelineA", "cancel");
        let ev = rx.recv().await.unwrap();
        assert_eq!(listener.handle(&ev), Some(FeedAction::Reload));

        task.rebind(listener.bind(Some("pipelineB")).unwrap());
        let opened = rx.recv().await.unwrap();
        assert_eq!(
            opened,
            SubscriptionEvent::Opened {
                generation: 2,
                subject_key: "pipelineB".into()
            }
        );
        assert_eq!(
            log.snapshot(),
            vec!["open pipelineA", "close pipelineA", "open pipelineB"]
        );

        // The old key's sender now goes nowhere; nothing fires for it.
        emit(&channel, "pipelineA", "cancel");
        emit(&channel, "pipelineB", "cancel");
        let ev = rx.recv().await.unwrap();
        match &ev {
            SubscriptionEvent::Event(env) => assert_eq!(env.subject_key, "pipelineB"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(listener.handle(&ev), Some(FeedAction::Reload));

        task.shutdown().await;
        assert_eq!(log.snapshot().last().map(String::as_str), Some("close pipelineB"));
    }

    #[tokio::test]
    async fn open_failure_is_reported_and_retry_reopens() {
        let (channel, log) = fake(Some("bad"));
        let (tx, mut rx) = mpsc::unbounded_channel::<SubscriptionEvent>();
        let task = SubscriptionTask::spawn(channel, tx);
        let mut listener = PushListener::new(EventMap::reload_on_cancel());

        task.rebind(listener.bind(Some("bad")).unwrap());
        let failed = rx.recv().await.unwrap();
        assert!(matches!(failed, SubscriptionEvent::Failed { .. }));
        listener.handle(&failed);
        assert_eq!(listener.link(), LinkState::Offline);

        task.retry();
        assert!(matches!(
            rx.recv().await.unwrap(),
            SubscriptionEvent::Failed { .. }
        ));
        assert_eq!(log.snapshot(), vec!["refuse bad", "refuse bad"]);
        task.shutdown().await;
    }

    #[tokio::test]
    async fn dropped_subscription_is_reported() {
        let (channel, _log) = fake(None);
        let (tx, mut rx) = mpsc::unbounded_channel::<SubscriptionEvent>();
        let task = SubscriptionTask::spawn(channel.clone(), tx);
        task.rebind(Binding {
            generation: 1,
            subject_key: Some("a".into()),
        });
        assert!(matches!(rx.recv().await.unwrap(), SubscriptionEvent::Opened { .. }));
        channel.senders.lock().unwrap().clear();
        assert_eq!(
            rx.recv().await.unwrap(),
            SubscriptionEvent::Dropped {
                generation: 1,
                subject_key: "a".into()
            }
        );
        task.shutdown().await;
    }

    struct PanicOn {
        key: &'static str,
        inner: Arc<FakeChannel>,
    }

    #[async_trait]
    impl PushChannel for PanicOn {
        async fn open_subscription(&self, subject_key: &str) -> Result<Box<dyn Subscription>> {
            if subject_key == self.key {
                panic!("channel exploded on {subject_key}");
            }
            self.inner.open_subscription(subject_key).await
        }
    }

    #[tokio::test]
    async fn panicking_channel_is_reported_and_next_key_still_opens() {
        let (inner, log) = fake(None);
        let channel = Arc::new(PanicOn { key: "boom", inner });
        let (tx, mut rx) = mpsc::unbounded_channel::<SubscriptionEvent>();
        let task = SubscriptionTask::spawn(channel, tx);
        let mut listener = PushListener::new(EventMap::reload_on_cancel());

        task.rebind(listener.bind(Some("boom")).unwrap());
        let failed = rx.recv().await.unwrap();
        match &failed {
            SubscriptionEvent::Failed {
                generation,
                subject_key,
                reason,
            } => {
                assert_eq!(*generation, 1);
                assert_eq!(subject_key, "boom");
                assert!(reason.contains("channel exploded on boom"), "got {reason}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        listener.handle(&failed);
        assert_eq!(listener.link(), LinkState::Offline);

        // Retrying the same key attempts it again
        task.retry();
        assert!(matches!(
            rx.recv().await.unwrap(),
            SubscriptionEvent::Failed { generation: 1, .. }
        ));

        task.rebind(listener.bind(Some("pipelineB")).unwrap());
        let opened = rx.recv().await.unwrap();
        assert_eq!(
            opened,
            SubscriptionEvent::Opened {
                generation: 2,
                subject_key: "pipelineB".into()
            }
        );
        listener.handle(&opened);
        assert_eq!(listener.link(), LinkState::Live);

        task.shutdown().await;
        assert_eq!(log.snapshot(), vec!["open pipelineB", "close pipelineB"]);
    }

    #[tokio::test]
    async fn unbinding_closes_without_reopening() {
        let (channel, log) = fake(None);
        let (tx, mut rx) = mpsc::unbounded_channel::<SubscriptionEvent>();
        let task = SubscriptionTask::spawn(channel, tx);
        let mut listener = PushListener::new(EventMap::new());
        task.rebind(listener.bind(Some("a")).unwrap());
        rx.recv().await.unwrap();
        task.rebind(listener.bind(None).unwrap());
        task.shutdown().await;
        assert_eq!(log.snapshot(), vec!["open a", "close a"]);
    }
}
