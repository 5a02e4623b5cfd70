use super::router::Deliveries;
use super::shutdown::Shutdown;
use crate::application::price_cache::PriceCache;
use crate::application::supervisor::TaskSupervisor;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Wire format of one quote update: `{"trade_event": {"symbol": .., "price": ..}}`.
#[derive(Debug, Deserialize)]
pub struct QuoteEvent {
    pub trade_event: TradeEvent,
}

#[derive(Debug, Deserialize)]
pub struct TradeEvent {
    pub symbol: String,
    /// Decimal string; JSON numbers are rejected.
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
}

/// Applies quote events from the market data feed to the price cache, one worker
/// per tracked symbol.
#[derive(Clone)]
pub struct PriceFeedConsumer {
    prices: Arc<PriceCache>,
}

impl PriceFeedConsumer {
    pub fn new(prices: Arc<PriceCache>) -> Self {
        Self { prices }
    }

    /// Spawns one supervised worker per delivery queue. Every worker stops when
    /// `shutdown` fires or its queue closes.
    pub fn start(
        &self,
        deliveries: Deliveries,
        shutdown: &Shutdown,
        supervisor: &TaskSupervisor,
    ) -> Vec<JoinHandle<()>> {
        deliveries
            .into_iter()
            .map(|(symbol, delivery)| {
                let consumer = self.clone();
                let stop = shutdown.subscribe();
                supervisor.spawn(format!("price feed consumer for symbol {symbol}"), async move {
                    consumer.run(symbol, delivery, stop).await
                })
            })
            .collect()
    }

    async fn run(
        &self,
        symbol: String,
        mut delivery: mpsc::Receiver<Vec<u8>>,
        mut stop: watch::Receiver<bool>,
    ) {
        if *stop.borrow_and_update() {
            info!(%symbol, "Stopping price feed consumer");
            return;
        }

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        info!(%symbol, "Stopping price feed consumer");
                        return;
                    }
                }
                msg = delivery.recv() => match msg {
                    Some(body) => {
                        self.apply(&body);
                    }
                    None => {
                        info!(%symbol, "Stopping price feed consumer, delivery queue is closed");
                        return;
                    }
                },
            }
        }
    }

    /// Decodes one raw event and stores its price. Malformed events are logged and
    /// skipped; returns whether the cache was updated.
    pub fn apply(&self, body: &[u8]) -> bool {
        let event = match serde_json::from_slice::<QuoteEvent>(body) {
            Ok(event) => event.trade_event,
            Err(e) => {
                warn!(error = %e, "Failed to decode quote event");
                return false;
            }
        };

        if event.price <= Decimal::ZERO {
            warn!(symbol = %event.symbol, price = %event.price, "Ignoring non-positive quote");
            return false;
        }

        self.prices.update_price(&event.symbol, event.price);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::feed::router::FeedRouter;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn consumer() -> (PriceFeedConsumer, Arc<PriceCache>) {
        let prices = Arc::new(PriceCache::new());
        (PriceFeedConsumer::new(Arc::clone(&prices)), prices)
    }

    #[test]
    fn test_apply_updates_cache() {
        let (consumer, prices) = consumer();
        assert!(consumer.apply(br#"{"trade_event":{"symbol":"USDKRW","price":"1300.5"}}"#));
        assert_eq!(prices.lookup("USDKRW").unwrap().current_price, dec!(1300.5));
    }

    #[test]
    fn test_apply_skips_malformed() {
        let (consumer, prices) = consumer();
        assert!(!consumer.apply(b"{not json"));
        assert!(!consumer.apply(br#"{"trade_event":{"symbol":"USDKRW"}}"#));
        assert!(!consumer.apply(br#"{"trade_event":{"symbol":"USDKRW","price":"abc"}}"#));
        assert!(!consumer.apply(br#"{"trade_event":{"symbol":"USDKRW","price":"-1"}}"#));
        assert!(prices.is_empty());
    }

    #[test]
    fn test_apply_rejects_numeric_price() {
        let (consumer, prices) = consumer();
        assert!(!consumer.apply(br#"{"trade_event":{"symbol":"USDKRW","price":1300.5}}"#));
        assert!(!consumer.apply(br#"{"trade_event":{"symbol":"USDKRW","price":1300}}"#));
        assert!(prices.lookup("USDKRW").is_none());
    }

    #[tokio::test]
    async fn test_workers_survive_bad_input_and_exit_on_close() {
        let (consumer, prices) = consumer();
        let supervisor = TaskSupervisor::new();
        let shutdown = Shutdown::new();
        let (router, deliveries) = FeedRouter::new(["USDKRW", "EURUSD"], 8);

        let workers = consumer.start(deliveries, &shutdown, &supervisor);
        assert_eq!(supervisor.active().len(), 2);

        router
            .publish(br#"{"trade_event":{"symbol":"USDKRW","price":"bad"}}"#.to_vec())
            .await;
        router
            .publish(br#"{"trade_event":{"symbol":"USDKRW","price":"1300.5"}}"#.to_vec())
            .await;
        drop(router);

        for worker in workers {
            worker.await.unwrap();
        }
        assert_eq!(prices.lookup("USDKRW").unwrap().current_price, dec!(1300.5));
        assert!(prices.lookup("EURUSD").is_none());
        assert!(supervisor.active().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_every_worker() {
        let (consumer, _prices) = consumer();
        let supervisor = TaskSupervisor::new();
        let shutdown = Shutdown::new();
        let (_router, deliveries) = FeedRouter::new(["USDKRW", "EURUSD", "BTCUSD"], 8);

        consumer.start(deliveries, &shutdown, &supervisor);
        shutdown.trigger();

        let report = supervisor.drain_all(Duration::from_secs(2)).await;
        assert!(report.is_clean());
        assert_eq!(report.ended.len(), 3);
    }

    #[tokio::test]
    async fn test_worker_started_after_shutdown_exits() {
        let (consumer, _prices) = consumer();
        let supervisor = TaskSupervisor::new();
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let (_router, deliveries) = FeedRouter::new(["USDKRW"], 8);

        for worker in consumer.start(deliveries, &shutdown, &supervisor) {
            worker.await.unwrap();
        }
        assert!(supervisor.active().is_empty());
    }
}
