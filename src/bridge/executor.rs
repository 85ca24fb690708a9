use super::parser::{parse_page, parse_resolution, parse_run};
use crate::model::{PageResult, Resolution, Run};
use crate::query::Query;
use crate::traits::RunFetcher;
use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};
use std::time::Duration;
use tokio::process::Command;

const BRIDGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Answers run queries by running the bridge program once per request.
pub struct BridgeFetcher {
    pub program: String,
}

impl BridgeFetcher {
    pub fn new(program: String) -> Self {
        Self { program }
    }
}

#[async_trait]
impl RunFetcher for BridgeFetcher {
    async fn fetch_runs(&self, query: &Query) -> Result<PageResult> {
        let args = query_args(query);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = run_bridge(&self.program, &args).await?;
        Ok(parse_page(&output)?)
    }

    async fn fetch_run(&self, run_id: &str) -> Result<Run> {
        let output = run_bridge(&self.program, &["run", run_id]).await?;
        Ok(parse_run(&output)?)
    }

    async fn fetch_resolution(&self, root_id: &str) -> Result<Option<Resolution>> {
        let output = run_bridge(&self.program, &["resolution", root_id]).await?;
        Ok(parse_resolution(&output)?)
    }
}

/// `runs [--filter <json>] --page N --limit L`. The match-all filter is left off.
pub fn query_args(query: &Query) -> Vec<String> {
    let mut args = vec!["runs".to_string()];
    if !query.filter.is_all() {
        args.push("--filter".to_string());
        args.push(query.filter.to_json().to_string());
    }
    args.push("--page".to_string());
    args.push(query.page.to_string());
    args.push("--limit".to_string());
    args.push(query.limit.to_string());
    args
}

pub async fn run_bridge(program: &str, args: &[&str]) -> Result<String> {
    let start = std::time::Instant::now();
    let output = tokio::time::timeout(BRIDGE_TIMEOUT, Command::new(program).args(args).output())
        .await
        .map_err(|_| eyre!("bridge command timed out after {}s", BRIDGE_TIMEOUT.as_secs()))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                eyre!("Bridge program `{program}` not found. Pass --bridge with its path.")
            } else {
                eyre!("Failed to run {program}: {e}")
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(eyre!("{}", classify_bridge_error(&stderr)));
    }

    tracing::debug!(
        args = ?args,
        elapsed_ms = start.elapsed().as_millis(),
        "bridge command completed"
    );
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

pub fn classify_bridge_error(stderr: &str) -> String {
    let lower = stderr.to_lowercase();
    if lower.contains("unauthorized") || lower.contains("401") || lower.contains("403") {
        "Not authorized with the pipeline backend. Log in with the bridge first.".to_string()
    } else if lower.contains("connection refused") || lower.contains("unreachable") {
        "Pipeline backend unreachable. Is the server running?".to_string()
    } else if lower.contains("no such run") || lower.contains("404") {
        "Run not found".to_string()
    } else {
        let trimmed = stderr.trim();
        if trimmed.is_empty() {
            "bridge command failed".to_string()
        } else {
            format!("bridge command failed: {trimmed}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, RunField};
    use pretty_assertions::assert_eq;

    #[test]
    fn query_args_for_root_runs() {
        let query = Query::new(Filter::root_runs_of("pipelines.train"), 2, 10);
        assert_eq!(
            query_args(&query),
            vec![
                "runs",
                "--filter",
                r#"{"AND":[{"parent_id":{"eq":null}},{"function_path":{"eq":"pipelines.train"}}]}"#,
                "--page",
                "2",
                "--limit",
                "10",
            ]
        );
    }

    #[test]
    fn query_args_omit_match_all_filter() {
        let query = Query::new(Filter::all(), 0, 25);
        assert_eq!(query_args(&query), vec!["runs", "--page", "0", "--limit", "25"]);
    }

    #[test]
    fn query_args_single_predicate() {
        let query = Query::new(Filter::eq(RunField::Id, "abc"), 0, 1);
        assert_eq!(query_args(&query)[2], r#"{"id":{"eq":"abc"}}"#);
    }

    #[test]
    fn classify_unauthorized() {
        let msg = classify_bridge_error("HTTP 401 Unauthorized");
        assert!(msg.contains("Not authorized"));
    }

    #[test]
    fn classify_connection_refused() {
        let msg = classify_bridge_error("error: Connection refused (os error 111)");
        assert!(msg.contains("unreachable"));
    }

    #[test]
    fn classify_missing_run() {
        assert_eq!(classify_bridge_error("no such run: 123"), "Run not found");
    }

    #[test]
    fn classify_generic_error() {
        let msg = classify_bridge_error("something went wrong");
        assert_eq!(msg, "bridge command failed: something went wrong");
    }

    #[test]
    fn classify_empty_stderr() {
        assert_eq!(classify_bridge_error("  \n "), "bridge command failed");
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let err = run_bridge("/nonexistent/runfeed-bridge", &["runs"])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
