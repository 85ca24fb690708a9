#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use color_eyre::eyre::{eyre, Result};
use runfeed::app::{AppConfig, AppState};
use runfeed::events::AppEvent;
use runfeed::model::{FutureState, PageResult, Resolution, ResolutionKind, Run, User};
use runfeed::push::{RemoteEvent, SubscriptionTask};
use runfeed::query::Query;
use runfeed::runtime;
use runfeed::traits::{PushChannel, RunFetcher, Subscription};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn run_with_id(id: &str) -> Run {
    Run {
        id: id.to_string(),
        parent_id: None,
        root_id: Some(id.to_string()),
        name: "train".to_string(),
        function_path: "pipelines.train".to_string(),
        created_at: Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()),
        failed_at: None,
        resolved_at: None,
        future_state: FutureState::Ran,
        tags: vec!["nightly".to_string()],
        user: Some(User {
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            email: "ada@example.com".to_string(),
            avatar_url: None,
        }),
    }
}

pub fn run_in_pipeline(id: &str, function_path: &str) -> Run {
    let mut run = run_with_id(id);
    run.function_path = function_path.to_string();
    run
}

pub fn child_run(id: &str, parent: &str) -> Run {
    let mut run = run_with_id(id);
    run.parent_id = Some(parent.to_string());
    run.root_id = Some(parent.to_string());
    run
}

pub fn numbered_runs(count: usize, function_path: &str) -> Vec<Run> {
    (0..count)
        .map(|i| run_in_pipeline(&format!("run{i:03}"), function_path))
        .collect()
}

pub fn config() -> AppConfig {
    AppConfig {
        bridge: "bridge".to_string(),
        function_path: None,
        roots_only: false,
        limit: 10,
        version_string: "runfeed v0.3.0+7".to_string(),
    }
}

/// Serves runs from memory, evaluating filters client-side.
pub struct InMemoryFetcher {
    runs: Mutex<Vec<Run>>,
    resolutions: Mutex<HashMap<String, Resolution>>,
    calls: Mutex<Vec<Query>>,
    /// Per-page artificial latency, to force out-of-order completion.
    delays: Mutex<HashMap<u32, Duration>>,
    failures: Mutex<usize>,
}

impl InMemoryFetcher {
    pub fn new(runs: Vec<Run>) -> Arc<Self> {
        Arc::new(Self {
            runs: Mutex::new(runs),
            resolutions: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delays: Mutex::new(HashMap::new()),
            failures: Mutex::new(0),
        })
    }

    pub fn set_runs(&self, runs: Vec<Run>) {
        *self.runs.lock().unwrap() = runs;
    }

    pub fn set_resolution(&self, root_id: &str, kind: ResolutionKind) {
        self.resolutions.lock().unwrap().insert(
            root_id.to_string(),
            Resolution {
                root_id: root_id.to_string(),
                kind,
            },
        );
    }

    pub fn delay_page(&self, page: u32, delay: Duration) {
        self.delays.lock().unwrap().insert(page, delay);
    }

    pub fn fail_next(&self, count: usize) {
        *self.failures.lock().unwrap() = count;
    }

    pub fn calls(&self) -> Vec<Query> {
        self.calls.lock().unwrap().clone()
    }

    pub fn pages_fetched(&self) -> Vec<u32> {
        self.calls().iter().map(|q| q.page).collect()
    }
}

#[async_trait]
impl RunFetcher for InMemoryFetcher {
    async fn fetch_runs(&self, query: &Query) -> Result<PageResult> {
        self.calls.lock().unwrap().push(query.clone());
        let delay = self.delays.lock().unwrap().get(&query.page).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(eyre!("backend unavailable"));
            }
        }
        let runs = self.runs.lock().unwrap();
        let matching: Vec<Run> = runs
            .iter()
            .filter(|r| query.filter.matches(r))
            .cloned()
            .collect();
        let offset = query.page as usize * query.limit as usize;
        Ok(PageResult {
            total_count: matching.len() as u64,
            runs: matching
                .into_iter()
                .skip(offset)
                .take(query.limit as usize)
                .collect(),
        })
    }

    async fn fetch_run(&self, run_id: &str) -> Result<Run> {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == run_id)
            .cloned()
            .ok_or_else(|| eyre!("no such run: {run_id}"))
    }

    async fn fetch_resolution(&self, root_id: &str) -> Result<Option<Resolution>> {
        Ok(self.resolutions.lock().unwrap().get(root_id).cloned())
    }
}

/// Push channel whose events are injected by the test. Keeps a log of opens and closes.
#[derive(Default)]
pub struct InMemoryChannel {
    log: Arc<Mutex<Vec<String>>>,
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<RemoteEvent>>>,
    refused: Mutex<HashSet<String>>,
}

impl InMemoryChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn refuse(&self, key: &str) {
        self.refused.lock().unwrap().insert(key.to_string());
    }

    pub fn accept(&self, key: &str) {
        self.refused.lock().unwrap().remove(key);
    }

    /// `false` when no live subscription for `key` exists.
    pub fn emit(&self, key: &str, name: &str) -> bool {
        self.senders
            .lock()
            .unwrap()
            .get(key)
            .is_some_and(|tx| tx.send(RemoteEvent::named(name)).is_ok())
    }

    /// Ends the subscription for `key` from the channel side.
    pub fn drop_subscription(&self, key: &str) {
        self.senders.lock().unwrap().remove(key);
    }
}

#[async_trait]
impl PushChannel for InMemoryChannel {
    async fn open_subscription(&self, subject_key: &str) -> Result<Box<dyn Subscription>> {
        self.log.lock().unwrap().push(format!("open {subject_key}"));
        if self.refused.lock().unwrap().contains(subject_key) {
            return Err(eyre!("connection refused"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().insert(subject_key.to_string(), tx);
        Ok(Box::new(MemorySubscription {
            subject_key: subject_key.to_string(),
            rx,
            log: self.log.clone(),
        }))
    }
}

struct MemorySubscription {
    subject_key: String,
    rx: mpsc::UnboundedReceiver<RemoteEvent>,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn subject_key(&self) -> &str {
        &self.subject_key
    }

    async fn next_event(&mut self) -> Option<RemoteEvent> {
        self.rx.recv().await
    }

    async fn close(mut self: Box<Self>) {
        self.rx.close();
        self.log.lock().unwrap().push(format!("close {}", self.subject_key));
    }
}

/// An [`AppState`] wired to in-memory collaborators, driven without a terminal.
pub struct Harness {
    pub state: AppState,
    pub fetcher: Arc<InMemoryFetcher>,
    pub channel: Arc<InMemoryChannel>,
    fetcher_dyn: Arc<dyn RunFetcher>,
    subscriptions: SubscriptionTask,
    tx: mpsc::UnboundedSender<AppEvent>,
    rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl Harness {
    pub fn new(config: AppConfig, runs: Vec<Run>) -> Self {
        let fetcher = InMemoryFetcher::new(runs);
        let channel = InMemoryChannel::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = SubscriptionTask::spawn(channel.clone(), tx.clone());
        let mut state = AppState::new(config);
        state.desktop_notify = false;
        Self {
            state,
            fetcher_dyn: fetcher.clone(),
            fetcher,
            channel,
            subscriptions,
            tx,
            rx,
        }
    }

    /// Pumps requests and feeds events back until nothing arrives for `quiet`.
    pub async fn settle_for(&mut self, quiet: Duration) {
        loop {
            runtime::pump(&mut self.state, &self.fetcher_dyn, &self.subscriptions, &self.tx);
            match tokio::time::timeout(quiet, self.rx.recv()).await {
                Ok(Some(event)) => runtime::handle_event(&mut self.state, event),
                Ok(None) | Err(_) => break,
            }
        }
    }

    pub async fn settle(&mut self) {
        self.settle_for(Duration::from_millis(150)).await;
    }

    /// Handles exactly one event, after pumping.
    pub async fn step(&mut self) {
        runtime::pump(&mut self.state, &self.fetcher_dyn, &self.subscriptions, &self.tx);
        if let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(2), self.rx.recv()).await {
            runtime::handle_event(&mut self.state, event);
        }
    }

    pub fn run_ids(runs: &[Run]) -> Vec<&str> {
        runs.iter().map(|r| r.id.as_str()).collect()
    }

    pub async fn shutdown(self) {
        self.subscriptions.shutdown().await;
    }
}
