//! Runs feed requests against the fetch collaborator on tokio tasks.
//!
//! Each request gets its own task; nothing is cancelled. Outcomes are posted
//! back to the event loop tagged with the feed name and sequence number, where
//! [`RunFeed::on_fetch_complete`] decides whether they still matter.

use crate::error::FeedError;
use crate::feed::{FetchRequest, RunFeed};
use crate::model::{PageResult, Resolution, Run};
use crate::traits::RunFetcher;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time;

/// Delay before the single retry of a root run load.
const ROOT_LOAD_RETRY_SECS: u64 = 2;

#[derive(Debug)]
pub struct FetchCompleted {
    pub feed: &'static str,
    pub seq: u64,
    pub result: Result<PageResult, FeedError>,
}

#[derive(Debug)]
pub struct RootLoaded {
    pub run_id: String,
    pub result: Result<(Run, Option<Resolution>), FeedError>,
}

#[derive(Debug)]
pub enum DriverEvent {
    Fetched(FetchCompleted),
    RootLoaded(RootLoaded),
    Crashed { label: &'static str, message: String },
}

/// Spawns one task per queued request of `feed`.
pub fn dispatch<T>(fetcher: &Arc<dyn RunFetcher>, feed: &mut RunFeed, tx: &mpsc::UnboundedSender<T>)
where
    T: From<DriverEvent> + Send + 'static,
{
    for request in feed.take_requests() {
        spawn_fetch(fetcher.clone(), feed.name(), request, tx.clone());
    }
}

pub fn spawn_fetch<T>(
    fetcher: Arc<dyn RunFetcher>,
    feed: &'static str,
    request: FetchRequest,
    tx: mpsc::UnboundedSender<T>,
) where
    T: From<DriverEvent> + Send + 'static,
{
    let report = tx.clone();
    spawn_monitored(report, "fetch", async move {
        let result = fetcher
            .fetch_runs(&request.query)
            .await
            .map_err(FeedError::fetch);
        let done = FetchCompleted {
            feed,
            seq: request.seq,
            result,
        };
        if tx.send(DriverEvent::Fetched(done).into()).is_err() {
            tracing::warn!(feed, seq = request.seq, "fetch: channel closed");
        }
    });
}

/// Loads a root run and its resolution: the context the run section waits on.
pub fn spawn_root_load<T>(fetcher: Arc<dyn RunFetcher>, run_id: String, tx: mpsc::UnboundedSender<T>)
where
    T: From<DriverEvent> + Send + 'static,
{
    let report = tx.clone();
    spawn_monitored(report, "root load", async move {
        let result = match load_root(fetcher.as_ref(), &run_id).await {
            Ok(loaded) => Ok(loaded),
            Err(first_err) => {
                // Single retry for transient failures
                time::sleep(time::Duration::from_secs(ROOT_LOAD_RETRY_SECS)).await;
                load_root(fetcher.as_ref(), &run_id).await.map_err(|retry_err| {
                    FeedError::Fetch(format!("{first_err} (retry also failed: {retry_err})"))
                })
            }
        };
        if tx
            .send(DriverEvent::RootLoaded(RootLoaded { run_id, result }).into())
            .is_err()
        {
            tracing::warn!("root load: channel closed");
        }
    });
}

async fn load_root(
    fetcher: &dyn RunFetcher,
    run_id: &str,
) -> color_eyre::eyre::Result<(Run, Option<Resolution>)> {
    let run = fetcher.fetch_run(run_id).await?;
    let root_id = run.root_id.clone().unwrap_or_else(|| run.id.clone());
    let resolution = fetcher.fetch_resolution(&root_id).await?;
    Ok((run, resolution))
}

/// Spawns `fut` and reports a panic as [`DriverEvent::Crashed`] instead of losing it.
pub fn spawn_monitored<T>(
    tx: mpsc::UnboundedSender<T>,
    label: &'static str,
    fut: impl Future<Output = ()> + Send + 'static,
) where
    T: From<DriverEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let handle = tokio::spawn(fut);
        if let Err(join_err) = handle.await {
            let message = if join_err.is_panic() {
                panic_message(join_err.into_panic())
            } else {
                "task cancelled".to_string()
            };
            tracing::error!("{label} panicked: {message}");
            if tx
                .send(DriverEvent::Crashed { label, message }.into())
                .is_err()
            {
                tracing::warn!("{label}: channel closed while reporting panic");
            }
        }
    });
}

/// Text of a panic payload, for `String` and `&str` payloads.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => match payload.downcast::<&str>() {
            Ok(s) => s.to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}
