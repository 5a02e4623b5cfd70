use crate::error::Result;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Per-symbol inbound queues of raw quote events, keyed by symbol.
pub type Deliveries = BTreeMap<String, mpsc::Receiver<Vec<u8>>>;

#[derive(Deserialize)]
struct Envelope {
    trade_event: RoutingKey,
}

#[derive(Deserialize)]
struct RoutingKey {
    symbol: String,
}

/// Counters returned by [`FeedRouter::replay`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub routed: usize,
    pub dropped: usize,
}

/// Fans raw quote events out to one bounded queue per tracked symbol.
///
/// Delivery is at-most-once: events for untracked symbols, events whose symbol
/// cannot be read, and events for a worker that has gone away are logged and
/// dropped. Dropping the router closes every queue.
pub struct FeedRouter {
    routes: HashMap<String, mpsc::Sender<Vec<u8>>>,
}

impl FeedRouter {
    pub fn new<I, S>(symbols: I, capacity: usize) -> (Self, Deliveries)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut routes = HashMap::new();
        let mut deliveries = Deliveries::new();
        for symbol in symbols {
            let symbol = symbol.into();
            let (tx, rx) = mpsc::channel(capacity.max(1));
            routes.insert(symbol.clone(), tx);
            deliveries.insert(symbol, rx);
        }
        (Self { routes }, deliveries)
    }

    /// Routes one raw event by the symbol it carries. Returns whether it was queued.
    pub async fn publish(&self, raw: Vec<u8>) -> bool {
        let symbol = match serde_json::from_slice::<Envelope>(&raw) {
            Ok(envelope) => envelope.trade_event.symbol,
            Err(e) => {
                warn!(error = %e, "Dropping unroutable quote event");
                return false;
            }
        };

        let Some(route) = self.routes.get(&symbol) else {
            debug!(%symbol, "Dropping quote event for untracked symbol");
            return false;
        };

        if route.send(raw).await.is_err() {
            warn!(%symbol, "Dropping quote event, worker queue is closed");
            return false;
        }
        true
    }

    /// Publishes every non-blank line of a JSON-lines source.
    pub async fn replay<R>(&self, reader: R) -> Result<ReplayStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut stats = ReplayStats::default();
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if self.publish(line.as_bytes().to_vec()).await {
                stats.routed += 1;
            } else {
                stats.dropped += 1;
            }
        }
        Ok(stats)
    }
}
