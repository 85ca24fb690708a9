use crate::error::FeedError;
use crate::model::{PageResult, Resolution, Run};
use crate::push::RemoteEvent;

pub fn parse_page(json: &str) -> Result<PageResult, FeedError> {
    serde_json::from_str(json).map_err(|e| FeedError::Parse(format!("run page: {e}")))
}

pub fn parse_run(json: &str) -> Result<Run, FeedError> {
    serde_json::from_str(json).map_err(|e| FeedError::Parse(format!("run: {e}")))
}

/// `null` (or nothing at all) means the root has no resolution yet.
pub fn parse_resolution(json: &str) -> Result<Option<Resolution>, FeedError> {
    if json.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(json).map_err(|e| FeedError::Parse(format!("resolution: {e}")))
}

/// One line of `watch` output. Blank lines are keep-alives.
pub fn parse_event_line(line: &str) -> Result<Option<RemoteEvent>, FeedError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| FeedError::Parse(format!("event line {line:?}: {e}")))
}
