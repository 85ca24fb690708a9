use crate::driver::DriverEvent;
use crate::push::SubscriptionEvent;
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Tick,
    Driver(DriverEvent),
    Subscription(SubscriptionEvent),
    Error(String),
}

impl From<DriverEvent> for AppEvent {
    fn from(event: DriverEvent) -> Self {
        AppEvent::Driver(event)
    }
}

impl From<SubscriptionEvent> for AppEvent {
    fn from(event: SubscriptionEvent) -> Self {
        AppEvent::Subscription(event)
    }
}

/// Every producer posts into one channel: the terminal input thread, fetch
/// and root-load tasks, and the subscription task.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    tx: mpsc::UnboundedSender<AppEvent>,
    shutdown: Arc<AtomicBool>,
    input: Option<JoinHandle<()>>,
}

impl EventHandler {
    /// Starts the input thread. A `Tick` is posted whenever `tick_rate` passes without a key.
    pub fn new(tick_rate: Duration) -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let input = std::thread::Builder::new().name("runfeed-input".to_string()).spawn({
            let tx = tx.clone();
            let shutdown = shutdown.clone();
            move || read_terminal(tick_rate, &tx, &shutdown)
        })?;
        Ok(Self {
            rx,
            tx,
            shutdown,
            input: Some(input),
        })
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.tx.clone()
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    /// Joins the input thread; it notices within one tick.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.input.take() {
            if handle.join().is_err() {
                tracing::warn!("input thread panicked");
            }
        }
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_terminal(tick_rate: Duration, tx: &mpsc::UnboundedSender<AppEvent>, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        let polled = event::poll(tick_rate).and_then(|ready| ready.then(event::read).transpose());
        let event = match polled {
            Ok(None) => AppEvent::Tick,
            Ok(Some(CrosstermEvent::Key(key))) => AppEvent::Key(key),
            // Resizes redraw on the next tick
            Ok(Some(_)) => continue,
            Err(e) => {
                report_input_failure(tx, &e);
                return;
            }
        };
        if tx.send(event).is_err() {
            return;
        }
    }
}

fn report_input_failure(tx: &mpsc::UnboundedSender<AppEvent>, err: &io::Error) {
    tracing::error!("terminal input failed: {err}");
    if tx
        .send(AppEvent::Error(format!("Terminal input failed: {err}")))
        .is_err()
    {
        tracing::warn!("input: channel closed while reporting error");
    }
}
