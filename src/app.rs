//! Application state: the two run feeds, the push listener bound to the
//! selected pipeline, and the transient UI around them.
//!
//! Nothing here performs I/O. Work that needs the outside world is either a
//! feed request (drained by the driver) or an [`Effect`] collected in the
//! state's outbox and executed by the event loop.

use crate::diff::{StateTracker, Transition};
use crate::driver::{DriverEvent, FetchCompleted, RootLoaded};
use crate::error::FeedError;
use crate::feed::{FetchOutcome, RunFeed};
use crate::input::Action;
use crate::model::{Resolution, Run};
use crate::push::{Binding, EventMap, FeedAction, LinkState, PushListener, SubscriptionEvent};
use crate::query::{Filter, FilterValue, RunField};
use chrono::{DateTime, Utc};
use tokio::sync::watch;

pub const LIST_FEED: &str = "list";
pub const SECTION_FEED: &str = "section";

pub const NOTIFICATION_TTL_SECS: u64 = 5;
/// Must match the length of `BRAILLE_FRAMES` in `tui::spinner`.
pub const SPINNER_FRAME_COUNT: usize = 10;
/// Below 60 cols the tags and owner columns are dropped.
pub const NARROW_WIDTH_THRESHOLD: u16 = 60;
pub const ERROR_TTL_SECS: u64 = 10;

/// `"? Runs"` while the total is unknown or zero.
pub fn stats_label(total_count: Option<u64>) -> String {
    match total_count {
        None | Some(0) => "? Runs".to_string(),
        Some(1) => "1 Run".to_string(),
        Some(n) => format!("{n} Runs"),
    }
}

pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

/// Unicode-width-aware truncation with ellipsis.
/// Returns `""` when `max_width` is 0.
pub fn truncate(s: &str, max_width: usize) -> String {
    use unicode_width::UnicodeWidthStr;
    if max_width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(s) <= max_width {
        s.to_string()
    } else {
        let mut result = String::new();
        let mut width = 0;
        for c in s.chars() {
            let cw = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
            if width + cw + 1 > max_width {
                result.push('\u{2026}');
                break;
            }
            result.push(c);
            width += cw;
        }
        result
    }
}

/// Immutable configuration set at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bridge: String,
    pub function_path: Option<String>,
    pub roots_only: bool,
    pub limit: u32,
    pub version_string: String,
}

impl AppConfig {
    /// The run list's filter: optional root-only and pipeline restrictions.
    pub fn list_filter(&self) -> Filter {
        let mut parts = Vec::new();
        if self.roots_only {
            parts.push(Filter::eq(RunField::ParentId, FilterValue::Null));
        }
        if let Some(path) = &self.function_path {
            parts.push(Filter::eq(RunField::FunctionPath, path.as_str()));
        }
        Filter::and(parts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    List,
    Section,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub run_id: String,
    pub message: String,
    pub timestamp: std::time::Instant,
}

/// Side effects requested by the state for the event loop to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    LoadRoot(String),
    Rebind(Binding),
    RetrySubscription,
    Notify(Transition),
}

pub struct AppState {
    pub config: AppConfig,

    pub list: RunFeed,
    /// The selected pipeline's root runs. Held until the root run has loaded.
    pub section: RunFeed,
    pub push: PushListener,

    pub root: Option<Run>,
    pub resolution: Option<Resolution>,
    /// Id of the root run being loaded; later selections supersede it.
    pub root_pending: Option<String>,

    pub tracker: StateTracker,

    pub focus: Focus,
    pub list_cursor: usize,
    pub section_cursor: usize,

    // Transient UI
    pub notifications: Vec<Notification>,
    pub error: Option<(String, std::time::Instant)>,
    pub spinner_frame: usize,
    pub should_quit: bool,

    pub desktop_notify: bool,

    list_busy: watch::Receiver<bool>,
    section_busy: watch::Receiver<bool>,
    effects: Vec<Effect>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let (list_tx, list_busy) = watch::channel(false);
        let (section_tx, section_busy) = watch::channel(false);
        let list = RunFeed::new(LIST_FEED, config.list_filter(), config.limit)
            .with_loading_sink(list_tx);
        let section = RunFeed::new(SECTION_FEED, Filter::all(), config.limit)
            .behind_gate()
            .with_loading_sink(section_tx);
        Self {
            config,
            list,
            section,
            push: PushListener::new(EventMap::reload_on_cancel()),
            root: None,
            resolution: None,
            root_pending: None,
            tracker: StateTracker::new(),
            focus: Focus::List,
            list_cursor: 0,
            section_cursor: 0,
            notifications: Vec::new(),
            error: None,
            spinner_frame: 0,
            should_quit: false,
            desktop_notify: true,
            list_busy,
            section_busy,
            effects: Vec::new(),
        }
    }

    /// Initial load; `root_run` opens the run section straight away.
    pub fn start(&mut self, root_run: Option<&str>) {
        self.list.start();
        if let Some(run_id) = root_run {
            self.select_root(run_id);
        }
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Shared busy indicator: either feed fetching or the root context loading.
    pub fn is_loading(&self) -> bool {
        *self.list_busy.borrow() || *self.section_busy.borrow() || self.root_pending.is_some()
    }

    pub fn link(&self) -> LinkState {
        self.push.link()
    }

    pub fn focused_feed(&self) -> &RunFeed {
        match self.focus {
            Focus::List => &self.list,
            Focus::Section => &self.section,
        }
    }

    fn focused_feed_mut(&mut self) -> &mut RunFeed {
        match self.focus {
            Focus::List => &mut self.list,
            Focus::Section => &mut self.section,
        }
    }

    fn focused_cursor_mut(&mut self) -> &mut usize {
        match self.focus {
            Focus::List => &mut self.list_cursor,
            Focus::Section => &mut self.section_cursor,
        }
    }

    pub fn selected_run(&self) -> Option<&Run> {
        match self.focus {
            Focus::List => self.list.runs().get(self.list_cursor),
            Focus::Section => self.section.runs().get(self.section_cursor),
        }
    }

    /// Makes `run_id` the section's root. Its pipeline is only known once the
    /// run has loaded, so the section is held until then.
    pub fn select_root(&mut self, run_id: &str) {
        if self.root_pending.as_deref() == Some(run_id)
            || (self.root_pending.is_none() && self.root.as_ref().is_some_and(|r| r.id == run_id))
        {
            return;
        }
        tracing::info!(run_id, "selecting root run");
        self.root_pending = Some(run_id.to_string());
        self.section.set_not_ready(true);
        self.effects.push(Effect::LoadRoot(run_id.to_string()));
    }

    pub fn on_root_loaded(&mut self, loaded: RootLoaded) {
        if self.root_pending.as_deref() != Some(loaded.run_id.as_str()) {
            tracing::debug!(run_id = %loaded.run_id, "discarding superseded root load");
            return;
        }
        self.root_pending = None;
        match loaded.result {
            Ok((run, resolution)) => {
                self.section.set_filter(Filter::root_runs_of(&run.function_path));
                if let Some(binding) = self.push.bind(Some(&run.function_path)) {
                    self.effects.push(Effect::Rebind(binding));
                }
                self.root = Some(run);
                self.resolution = resolution;
                self.section_cursor = 0;
                self.section.set_not_ready(false);
            }
            Err(e) => {
                self.set_error(format!("Could not load run {}: {e}", loaded.run_id));
                // Fall back to the previous root's pipeline, if any.
                if self.root.is_some() {
                    self.section.set_not_ready(false);
                }
            }
        }
    }

    pub fn on_driver_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Fetched(done) => self.on_fetch_complete(done),
            DriverEvent::RootLoaded(loaded) => self.on_root_loaded(loaded),
            DriverEvent::Crashed { label, message } => {
                self.set_error(format!("{label} crashed: {message}"));
            }
        }
    }

    fn on_fetch_complete(&mut self, done: FetchCompleted) {
        let feed = match done.feed {
            LIST_FEED => &mut self.list,
            SECTION_FEED => &mut self.section,
            other => {
                tracing::warn!(feed = other, "result for unknown feed");
                return;
            }
        };
        match feed.on_fetch_complete(done.seq, done.result) {
            FetchOutcome::Applied => {
                let transitions = self.tracker.detect_changes(feed.runs());
                self.clamp_cursors();
                for transition in transitions {
                    self.add_notification(transition.run_id.clone(), transition.message());
                    if self.desktop_notify && transition.reached_terminal() {
                        self.effects.push(Effect::Notify(transition));
                    }
                }
            }
            FetchOutcome::Failed(err) => self.set_error(err.to_string()),
            FetchOutcome::Stale | FetchOutcome::Corrected { .. } => {}
        }
    }

    pub fn on_subscription_event(&mut self, event: &SubscriptionEvent) {
        let action = self.push.handle(event);
        if event.generation() == self.push.generation() {
            match event {
                SubscriptionEvent::Failed {
                    subject_key,
                    reason,
                    ..
                } => {
                    let err = FeedError::Subscription {
                        key: subject_key.clone(),
                        reason: reason.clone(),
                    };
                    self.set_error(format!("{err}. Press s to retry."));
                }
                SubscriptionEvent::Dropped { subject_key, .. } => {
                    self.add_notification(
                        String::new(),
                        format!("Live updates for {subject_key} dropped. Press s to retry."),
                    );
                }
                SubscriptionEvent::Opened { .. } | SubscriptionEvent::Event(_) => {}
            }
        }
        if let Some(FeedAction::Reload) = action {
            tracing::debug!("push event, reloading section");
            self.section.reload();
        }
    }

    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::DismissError => self.clear_error(),
            Action::MoveUp => self.move_cursor_up(),
            Action::MoveDown => self.move_cursor_down(),
            Action::NextPage => {
                if self.focused_feed_mut().next_page() {
                    *self.focused_cursor_mut() = 0;
                }
            }
            Action::PreviousPage => {
                if self.focused_feed_mut().previous_page() {
                    *self.focused_cursor_mut() = 0;
                }
            }
            Action::Reload => self.focused_feed_mut().reload(),
            Action::SelectRun => {
                if let Some(id) = self.selected_run().map(|r| r.id.clone()) {
                    self.select_root(&id);
                }
            }
            Action::SwitchFocus => self.switch_focus(),
            Action::RetrySubscription => {
                if self.push.link() == LinkState::Offline {
                    self.effects.push(Effect::RetrySubscription);
                }
            }
            Action::None => {}
        }
    }

    /// The section can only take focus once it has a root.
    pub fn switch_focus(&mut self) {
        self.focus = match self.focus {
            Focus::List if self.root.is_some() => Focus::Section,
            Focus::List => Focus::List,
            Focus::Section => Focus::List,
        };
    }

    pub fn move_cursor_up(&mut self) {
        let cursor = self.focused_cursor_mut();
        *cursor = cursor.saturating_sub(1);
    }

    pub fn move_cursor_down(&mut self) {
        let len = self.focused_feed().runs().len();
        let cursor = self.focused_cursor_mut();
        if *cursor + 1 < len {
            *cursor += 1;
        }
    }

    fn clamp_cursors(&mut self) {
        self.list_cursor = self.list_cursor.min(self.list.runs().len().saturating_sub(1));
        self.section_cursor = self
            .section_cursor
            .min(self.section.runs().len().saturating_sub(1));
    }

    pub fn add_notification(&mut self, run_id: String, message: String) {
        self.notifications.push(Notification {
            run_id,
            message,
            timestamp: std::time::Instant::now(),
        });
    }

    pub fn prune_notifications(&mut self) {
        let now = std::time::Instant::now();
        self.notifications
            .retain(|n| now.duration_since(n.timestamp).as_secs() < NOTIFICATION_TTL_SECS);
    }

    pub fn advance_spinner(&mut self) {
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAME_COUNT;
    }

    pub fn set_error(&mut self, msg: String) {
        self.error = Some((msg, std::time::Instant::now()));
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn prune_error(&mut self) {
        if let Some((_, ts)) = &self.error {
            if ts.elapsed().as_secs() >= ERROR_TTL_SECS {
                self.error = None;
            }
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|(msg, _)| msg.as_str())
    }
}
