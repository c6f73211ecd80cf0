//! Tracing/logging bootstrap for `feed-watch`.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,feed_watch=debug,feed_core=debug,feed_http=debug";

/// Install the global subscriber. Logs go to stderr, leaving stdout to the feed.
///
/// Filter precedence:
/// 1) `RUST_LOG`
/// 2) `FEED_WATCH_LOG`
/// 3) internal default filter
///
/// A blank or unparsable value falls through to the next source.
pub fn init() {
    let directives = select_directives(env::var("RUST_LOG").ok(), env::var("FEED_WATCH_LOG").ok());
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(directives))
        .try_init();
}

fn select_directives(rust_log: Option<String>, app_log: Option<String>) -> String {
    [rust_log, app_log]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty() && EnvFilter::try_new(value).is_ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_owned())
}
