//! `feed-watch`: follow the live activity feed in a terminal.
//!
//! Type `r` and Enter to reload after a failure; Ctrl-C unmounts and exits.

mod config;
mod logging;
mod render;

use feed_core::{FeedHandle, FeedStore};
use feed_http::mount_http_feed;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::config::WatchConfig;

#[tokio::main]
async fn main() {
    logging::init();

    let config = match WatchConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid feed-watch configuration: {err}");
            std::process::exit(2);
        }
    };

    let handle = match mount_http_feed(
        &config.http_config(),
        config.max_items,
        config.connector_config(),
    ) {
        Ok(handle) => handle,
        Err(err) => {
            error!(error = %err, "failed to mount activity feed");
            std::process::exit(1);
        }
    };
    info!(
        mount_id = %handle.mount_id(),
        api_url = %config.api_url,
        "watching activity feed"
    );

    watch(&handle, handle.store()).await;
    handle.unmount().await;
}

async fn watch(handle: &FeedHandle, mut store: FeedStore) {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    print_view(&store);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted; unmounting feed");
                return;
            }
            changed = store.changed() => match changed {
                Ok(_) => print_view(&store),
                Err(_) => {
                    warn!("feed store closed");
                    return;
                }
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().eq_ignore_ascii_case("r") => {
                    if let Err(err) = handle.reload().await {
                        warn!(error = %err, "reload failed");
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => stdin_open = false,
            },
        }
    }
}

fn print_view(store: &FeedStore) {
    println!();
    for line in render::render_view(&store.view()) {
        println!("{line}");
    }
}
