use crate::repository::cache::MessageCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Periodically purge expired cache entries.
pub async fn run(cache: Arc<MessageCache>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut timer = tokio::time::interval(every);
    // The first tick fires immediately; nothing to sweep yet.
    timer.tick().await;

    loop {
        tokio::select! {
            _ = timer.tick() => {
                let (total, expired) = cache.sweep();
                tracing::debug!("cache sweep: {expired}/{total} entries expired");
            }
            _ = shutdown.changed() => break,
        }
    }
}
