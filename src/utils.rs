//! Small helpers shared by the binary and the dispatcher.

use tokio::signal;
use tracing::{info, warn};

/// Message size limit used when splitting long lists.
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Join `items` with `separator` into messages of at most `max_len`
/// characters. An item longer than `max_len` on its own is truncated and
/// sent as its own message.
pub fn chunk_messages<I, S>(items: I, max_len: usize, separator: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let sep_len = separator.chars().count();
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;

    for item in items {
        let item = item.as_ref();
        let item_len = item.chars().count();
        let new_len = if current.is_empty() {
            item_len
        } else {
            current_len + sep_len + item_len
        };

        if new_len <= max_len {
            current.push(item.to_string());
            current_len = new_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(current.join(separator));
            current.clear();
            current_len = 0;
        }
        if item_len > max_len {
            chunks.push(item.chars().take(max_len).collect());
        } else {
            current.push(item.to_string());
            current_len = item_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current.join(separator));
    }
    chunks
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
