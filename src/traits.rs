use crate::model::{PageResult, Resolution, Run};
use crate::push::RemoteEvent;
use crate::query::Query;
use async_trait::async_trait;
use color_eyre::eyre::Result;

/// Source of run pages. Concurrent calls may complete in any order.
#[async_trait]
pub trait RunFetcher: Send + Sync {
    async fn fetch_runs(&self, query: &Query) -> Result<PageResult>;
    async fn fetch_run(&self, run_id: &str) -> Result<Run>;
    async fn fetch_resolution(&self, root_id: &str) -> Result<Option<Resolution>>;
}

/// Push transport. Reconnection, if any, is the channel's business.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn open_subscription(&self, subject_key: &str) -> Result<Box<dyn Subscription>>;
}

/// One open subscription. Implementations must also release their resources on
/// `Drop`, since a task holding one can be aborted mid-await.
#[async_trait]
pub trait Subscription: Send {
    fn subject_key(&self) -> &str;
    /// `None` once the channel dropped the subscription.
    async fn next_event(&mut self) -> Option<RemoteEvent>;
    async fn close(self: Box<Self>);
}
