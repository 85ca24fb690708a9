use super::parser::parse_event_line;
use crate::push::RemoteEvent;
use crate::traits::{PushChannel, Subscription};
use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

/// Push channel backed by a long-lived `<bridge> watch <subject_key>` process per subscription.
pub struct BridgePushChannel {
    pub program: String,
}

impl BridgePushChannel {
    pub fn new(program: String) -> Self {
        Self { program }
    }
}

#[async_trait]
impl PushChannel for BridgePushChannel {
    async fn open_subscription(&self, subject_key: &str) -> Result<Box<dyn Subscription>> {
        let mut child = Command::new(&self.program)
            .args(["watch", subject_key])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    eyre!("Bridge program `{}` not found", self.program)
                } else {
                    eyre!("Failed to start watch for {subject_key}: {e}")
                }
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| eyre!("watch for {subject_key} has no stdout"))?;
        Ok(Box::new(BridgeSubscription {
            subject_key: subject_key.to_string(),
            child,
            lines: BufReader::new(stdout).lines(),
        }))
    }
}

/// The child is spawned with `kill_on_drop`, so an aborted task still reaps it.
struct BridgeSubscription {
    subject_key: String,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl Subscription for BridgeSubscription {
    fn subject_key(&self) -> &str {
        &self.subject_key
    }

    async fn next_event(&mut self) -> Option<RemoteEvent> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => match parse_event_line(&line) {
                    Ok(Some(event)) => return Some(event),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(key = %self.subject_key, "skipping push line: {e}"),
                },
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(key = %self.subject_key, "watch stream failed: {e}");
                    return None;
                }
            }
        }
    }

    async fn close(mut self: Box<Self>) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(key = %self.subject_key, "watch already exited: {e}");
        }
    }
}
