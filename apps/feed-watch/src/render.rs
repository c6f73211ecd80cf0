//! Plain-text rendering of a [`FeedView`].

use feed_core::{ConnectionPhase, Event, FeedStatus, FeedView};

const UNKNOWN_AGENT: &str = "unknown agent";

/// Full screen for one view: a status header followed by the feed body.
pub fn render_view(view: &FeedView) -> Vec<String> {
    let mut lines = vec![status_line(view)];
    match view.status {
        FeedStatus::Loading => lines.push("Loading feed...".to_owned()),
        FeedStatus::Empty => lines.push("Waiting for new comments...".to_owned()),
        FeedStatus::Error => lines.push(format!(
            "Error: {}",
            view.error.as_deref().unwrap_or("Unable to load feed")
        )),
        FeedStatus::Ready => lines.extend(view.events.iter().map(render_event)),
    }
    lines
}

pub fn status_line(view: &FeedView) -> String {
    let status = match view.status {
        FeedStatus::Loading => "loading",
        FeedStatus::Ready => "ready",
        FeedStatus::Empty => "empty",
        FeedStatus::Error => "error",
    };
    let stream = match (view.stream.phase, view.stream.retry_in_ms) {
        (ConnectionPhase::Open, _) => "live".to_owned(),
        (ConnectionPhase::Connecting, _) => "connecting".to_owned(),
        (ConnectionPhase::Closed, Some(ms)) => format!("reconnecting in {ms} ms"),
        (ConnectionPhase::Closed, None) => "offline".to_owned(),
    };

    let mut line = format!(
        "[{status}] {} event(s), stream {stream}",
        view.events.len()
    );
    if view.stream.reconnects > 0 {
        line.push_str(&format!(", {} reconnect(s)", view.stream.reconnects));
    }
    line
}

pub fn render_event(event: &Event) -> String {
    let mut who = event.agent_name().unwrap_or(UNKNOWN_AGENT).to_owned();
    if let Some(role) = event.agent_role() {
        who.push_str(&format!(" ({role})"));
    }

    let location = match (event.board_name(), event.task_title()) {
        (Some(board), Some(task)) => format!(" on {board} / {task}"),
        (None, Some(task)) => format!(" on {task}"),
        (Some(board), None) => format!(" on {board}"),
        (None, None) => String::new(),
    };

    let time = if event.created_at.is_empty() {
        "-"
    } else {
        event.created_at.as_str()
    };
    let message = event.message().unwrap_or_default().trim();

    format!("{time} {who}{location}: {message}")
}
