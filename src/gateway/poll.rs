//! Transport poll loop.
//!
//! Fetch errors are never fatal: the loop retries with exponential
//! backoff and resets to the initial delay on the first success.

use super::Gateway;
use courier_core::traits::{Fetch, Transport};
use courier_state::CursorStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub(super) async fn poll_loop(
    gw: Arc<Gateway>,
    transport: Arc<dyn Transport>,
    cursors: Arc<CursorStore>,
    pace: Duration,
) {
    info!("{} poll loop started", transport.name());
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let snapshot = cursors.snapshot();
        match transport.fetch_new(&snapshot).await {
            Ok(fetch) => {
                backoff = INITIAL_BACKOFF;
                process_fetch(&gw, &cursors, fetch).await;
                if !pace.is_zero() {
                    sleep(pace).await;
                }
            }
            Err(e) => {
                error!(
                    "{} poll error (retry in {}s): {e}",
                    transport.name(),
                    backoff.as_secs()
                );
                sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// Persist every observed cursor, then dispatch the text messages in
/// ascending marker order.
///
/// Cursors move first: a restart mid-dispatch drops the unprocessed rest
/// of the batch rather than replaying messages that already reached the
/// backend.
pub(super) async fn process_fetch(gw: &Arc<Gateway>, cursors: &CursorStore, mut fetch: Fetch) {
    for (key, marker) in fetch.cursors.drain() {
        if let Err(e) = cursors.advance(&key, marker) {
            error!("failed to persist cursor {key}: {e}");
        }
    }

    fetch.messages.sort_by(|a, b| a.marker.cmp(&b.marker));
    for msg in fetch.messages {
        gw.dispatch(msg).await;
    }
}
