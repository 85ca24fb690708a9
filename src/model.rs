//! Run data as served by the pipeline backend. Consumed read-only.

use chrono::{DateTime, Utc};

/// Observed page size of both the run list and the run section dropdown.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FutureState {
    Created,
    Retrying,
    Scheduled,
    Ran,
    Resolved,
    Failed,
    NestedFailed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl FutureState {
    /// Terminal states never transition again without a new run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FutureState::Resolved
                | FutureState::Failed
                | FutureState::NestedFailed
                | FutureState::Canceled
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(self, FutureState::Failed | FutureState::NestedFailed)
    }

    pub fn label(self) -> &'static str {
        match self {
            FutureState::Created => "Submitted",
            FutureState::Retrying => "Retrying",
            FutureState::Scheduled => "Scheduled",
            FutureState::Ran => "Running",
            FutureState::Resolved => "Succeeded",
            FutureState::Failed => "Failed",
            FutureState::NestedFailed => "Failed (nested)",
            FutureState::Canceled => "Canceled",
            FutureState::Unknown => "Unknown",
        }
    }

    /// Wire name, as used in filters.
    pub fn as_str(self) -> &'static str {
        match self {
            FutureState::Created => "CREATED",
            FutureState::Retrying => "RETRYING",
            FutureState::Scheduled => "SCHEDULED",
            FutureState::Ran => "RAN",
            FutureState::Resolved => "RESOLVED",
            FutureState::Failed => "FAILED",
            FutureState::NestedFailed => "NESTED_FAILED",
            FutureState::Canceled => "CANCELED",
            FutureState::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct User {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl User {
    /// Two-letter initials from first/last name, falling back to the email's first letter.
    pub fn initials(&self) -> String {
        let first = self.first_name.as_deref().and_then(|s| s.chars().next());
        let last = self.last_name.as_deref().and_then(|s| s.chars().next());
        match (first, last) {
            (Some(f), Some(l)) => format!("{f}{l}").to_uppercase(),
            (Some(c), None) | (None, Some(c)) => c.to_uppercase().to_string(),
            (None, None) => self
                .email
                .chars()
                .next()
                .map(|c| c.to_uppercase().to_string())
                .unwrap_or_default(),
        }
    }

    /// "First Last" with missing parts dropped; empty when neither is known.
    pub fn display_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub root_id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub function_path: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub future_state: FutureState,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub user: Option<User>,
}

impl Run {
    /// The timestamp the status column shows next to the state.
    pub fn status_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.future_state {
            FutureState::Resolved => self.resolved_at.or(self.created_at),
            s if s.is_failure() => self.failed_at.or(self.created_at),
            _ => self.created_at,
        }
    }

    pub fn short_id(&self) -> &str {
        self.id.get(..6).unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionKind {
    Kubernetes,
    Local,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Resolution {
    pub root_id: String,
    pub kind: ResolutionKind,
}

/// Name of the runner that executed a pipeline, `"-"` until the resolution is known.
pub fn resolver_label(resolution: Option<&Resolution>) -> &'static str {
    match resolution.map(|r| r.kind) {
        None => "-",
        Some(ResolutionKind::Kubernetes) => "CloudRunner",
        Some(_) => "LocalRunner",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct PageResult {
    pub runs: Vec<Run>,
    pub total_count: u64,
}
