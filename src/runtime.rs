//! Glue between [`AppState`] and the async world: drains feed requests and
//! effects into tasks, and folds incoming [`AppEvent`]s back into the state.

use crate::app::{AppState, Effect};
use crate::diff::Transition;
use crate::driver;
use crate::events::AppEvent;
use crate::input::{self, InputContext};
use crate::push::{LinkState, SubscriptionTask};
use crate::traits::RunFetcher;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Starts everything the last state change asked for.
pub fn pump(
    state: &mut AppState,
    fetcher: &Arc<dyn RunFetcher>,
    subscriptions: &SubscriptionTask,
    tx: &mpsc::UnboundedSender<AppEvent>,
) {
    driver::dispatch(fetcher, &mut state.list, tx);
    driver::dispatch(fetcher, &mut state.section, tx);

    for effect in state.take_effects() {
        match effect {
            Effect::LoadRoot(run_id) => driver::spawn_root_load(fetcher.clone(), run_id, tx.clone()),
            Effect::Rebind(binding) => subscriptions.rebind(binding),
            Effect::RetrySubscription => subscriptions.retry(),
            Effect::Notify(transition) => notify_desktop(transition, tx.clone()),
        }
    }
}

pub fn handle_event(state: &mut AppState, event: AppEvent) {
    match event {
        AppEvent::Key(key) => {
            let ctx = InputContext {
                has_error: state.error.is_some(),
                link_offline: state.link() == LinkState::Offline,
            };
            state.apply(input::map_key(key, &ctx));
        }
        AppEvent::Tick => state.advance_spinner(),
        AppEvent::Driver(event) => state.on_driver_event(event),
        AppEvent::Subscription(event) => state.on_subscription_event(&event),
        AppEvent::Error(e) => state.set_error(e),
    }
}

#[cfg(feature = "desktop-notify")]
fn notify_desktop(transition: Transition, tx: mpsc::UnboundedSender<AppEvent>) {
    tokio::task::spawn_blocking(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            crate::notify::send_desktop(&transition)
        }));
        let error = match result {
            Ok(None) => return,
            Ok(Some(err)) => err,
            Err(payload) => {
                let msg = driver::panic_message(payload);
                tracing::error!("notify panicked: {msg}");
                format!("Notification crashed: {msg}")
            }
        };
        if tx.send(AppEvent::Error(error)).is_err() {
            tracing::warn!("notify: channel closed");
        }
    });
}

#[cfg(not(feature = "desktop-notify"))]
fn notify_desktop(transition: Transition, _tx: mpsc::UnboundedSender<AppEvent>) {
    tracing::debug!(run_id = %transition.run_id, "desktop notifications not compiled in");
}
