//! Fetch/reload orchestration for one paginated run feed.
//!
//! [`RunFeed`] never performs I/O. Every fetch it wants is queued as a
//! [`FetchRequest`] carrying a strictly increasing sequence number; the
//! driver executes the requests and hands outcomes back through
//! [`RunFeed::on_fetch_complete`]. Only the outcome of the most recently
//! issued request is ever applied, so out-of-order arrivals converge on the
//! last fetch issued.

use crate::error::FeedError;
use crate::model::{PageResult, Run};
use crate::pagination::Pagination;
use crate::query::{Filter, Query};
use crate::readiness::ReadinessGate;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub seq: u64,
    pub query: Query,
}

/// What happened to a completed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Runs and total replaced.
    Applied,
    /// Superseded by a later request; dropped without touching state.
    Stale,
    /// Latest request failed; previous runs are still displayed.
    Failed(FeedError),
    /// The page fell off the end; moved to `page` and issued one corrective fetch.
    Corrected { page: u32 },
}

pub struct RunFeed {
    name: &'static str,
    filter: Filter,
    pagination: Pagination,
    runs: Vec<Run>,
    /// Sequence number of the last issued request (0 = none yet).
    last_seq: u64,
    /// The last issued request, while it has not completed.
    in_flight: Option<FetchRequest>,
    outbox: Vec<FetchRequest>,
    last_error: Option<FeedError>,
    gate: ReadinessGate,
    /// Issue nothing while the gate is closed.
    gated: bool,
    loading_sink: Option<watch::Sender<bool>>,
}

impl RunFeed {
    pub fn new(name: &'static str, filter: Filter, limit: u32) -> Self {
        Self {
            name,
            filter,
            pagination: Pagination::new(limit),
            runs: Vec::new(),
            last_seq: 0,
            in_flight: None,
            outbox: Vec::new(),
            last_error: None,
            gate: ReadinessGate::new(),
            gated: false,
            loading_sink: None,
        }
    }

    /// Publish every `is_loading` change to `sink`. The feed never reads it back.
    pub fn with_loading_sink(mut self, sink: watch::Sender<bool>) -> Self {
        sink.send_replace(self.is_loading());
        self.loading_sink = Some(sink);
        self
    }

    /// Hold every fetch until the readiness gate first opens. Filter and page
    /// changes made meanwhile are kept and go out with the gate's reload.
    pub fn behind_gate(mut self) -> Self {
        self.gated = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn query(&self) -> Query {
        Query::new(
            self.filter.clone(),
            self.pagination.page(),
            self.pagination.limit(),
        )
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn page(&self) -> u32 {
        self.pagination.page()
    }

    pub fn display_page(&self) -> u64 {
        self.pagination.display_page()
    }

    pub fn total_pages(&self) -> u64 {
        self.pagination.display_total_pages()
    }

    pub fn total_count(&self) -> Option<u64> {
        self.pagination.total_count()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn last_error(&self) -> Option<&FeedError> {
        self.last_error.as_ref()
    }

    /// Initial load for feeds that are not behind a readiness gate.
    pub fn start(&mut self) {
        self.request_current();
    }

    /// Always issues a fresh fetch for the current query, superseding any in flight.
    pub fn reload(&mut self) {
        if self.held() {
            return;
        }
        let query = self.query();
        self.issue(query);
    }

    /// Returns `false` when already on the last known page.
    pub fn next_page(&mut self) -> bool {
        if !self.pagination.next_page() {
            return false;
        }
        self.request_current();
        true
    }

    pub fn previous_page(&mut self) -> bool {
        if !self.pagination.previous_page() {
            return false;
        }
        self.request_current();
        true
    }

    /// A structurally equal filter is a no-op; otherwise back to page 0 and fetch.
    pub fn set_filter(&mut self, filter: Filter) -> bool {
        if filter == self.filter {
            return false;
        }
        self.filter = filter;
        let limit = self.pagination.limit();
        self.pagination.reset(limit);
        self.request_current();
        true
    }

    pub fn set_limit(&mut self, limit: u32) -> bool {
        if limit.max(1) == self.pagination.limit() {
            return false;
        }
        self.pagination.reset(limit);
        self.request_current();
        true
    }

    /// Feeds the external "still loading" flag through the readiness gate.
    /// Returns `true` when this observation triggered a reload.
    pub fn set_not_ready(&mut self, not_ready: bool) -> bool {
        if !self.gate.observe(not_ready) {
            return false;
        }
        tracing::debug!(feed = self.name, "ready, reloading");
        self.reload();
        true
    }

    /// Requests queued since the last call, oldest first.
    pub fn take_requests(&mut self) -> Vec<FetchRequest> {
        std::mem::take(&mut self.outbox)
    }

    pub fn on_fetch_complete(
        &mut self,
        seq: u64,
        result: Result<PageResult, FeedError>,
    ) -> FetchOutcome {
        if self.in_flight.as_ref().map(|r| r.seq) != Some(seq) {
            tracing::debug!(
                feed = self.name,
                seq,
                latest = self.last_seq,
                "discarding stale page"
            );
            return FetchOutcome::Stale;
        }
        self.in_flight = None;

        let outcome = match result {
            Err(err) => {
                tracing::warn!(feed = self.name, seq, "fetch failed: {err}");
                self.last_error = Some(err.clone());
                FetchOutcome::Failed(err)
            }
            Ok(page) => {
                if let Some(clamped) = self.pagination.on_result(page.total_count) {
                    tracing::debug!(
                        feed = self.name,
                        page = clamped,
                        total = page.total_count,
                        "page out of range, refetching"
                    );
                    self.request_current();
                    FetchOutcome::Corrected { page: clamped }
                } else {
                    self.runs = page.runs;
                    self.last_error = None;
                    FetchOutcome::Applied
                }
            }
        };
        self.publish_loading();
        outcome
    }

    fn held(&self) -> bool {
        let held = self.gated && !self.gate.is_ready();
        if held {
            tracing::debug!(feed = self.name, "held until ready");
        }
        held
    }

    fn request_current(&mut self) {
        if self.held() {
            return;
        }
        let query = self.query();
        if let Some(pending) = &self.in_flight {
            if pending.query == query {
                tracing::debug!(feed = self.name, seq = pending.seq, "attaching to in-flight fetch");
                return;
            }
        }
        self.issue(query);
    }

    fn issue(&mut self, query: Query) {
        self.last_seq += 1;
        let request = FetchRequest {
            seq: self.last_seq,
            query,
        };
        tracing::debug!(
            feed = self.name,
            seq = request.seq,
            page = request.query.page,
            "issuing fetch"
        );
        self.in_flight = Some(request.clone());
        self.outbox.push(request);
        self.publish_loading();
    }

    fn publish_loading(&self) {
        if let Some(sink) = &self.loading_sink {
            let loading = self.is_loading();
            sink.send_if_modified(|current| {
                if *current == loading {
                    false
                } else {
                    *current = loading;
                    true
                }
            });
        }
    }
}
