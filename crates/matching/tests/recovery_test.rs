//! Recovery tests
//!
//! A coordinator restart must rebuild every symbol's book from the
//! durable store exactly: same orders, same priority, and matching
//! behavior indistinguishable from before the restart.

use std::sync::Arc;
use std::time::Duration;

use forge_matching::{Coordinator, EngineConfig, MemoryCache, MemoryRepository, Repository};
use forge_sdk::{OrderCommand, OrderStatus, OrderType, Price, Quantity, Side};
use tokio_util::sync::CancellationToken;

fn limit(client: &str, symbol: &str, side: Side, price: u64, qty: u64) -> OrderCommand {
	OrderCommand {
		client_id: client.to_string(),
		client_order_id: None,
		symbol: symbol.to_string(),
		side,
		order_type: OrderType::Limit,
		price: Price::from_u64(price),
		quantity: Quantity::from_u64(qty),
	}
}

async fn start(repo: Arc<MemoryRepository>) -> Coordinator {
	Coordinator::start(
		repo,
		Arc::new(MemoryCache::new(Duration::from_secs(300))),
		EngineConfig::default(),
	)
	.await
	.unwrap()
}

#[tokio::test]
async fn test_restart_reproduces_books() {
	let repo = Arc::new(MemoryRepository::new());
	let token = CancellationToken::new();

	let before = {
		let c = start(repo.clone()).await;

		// A mix of resting, partially filled, filled, and cancelled
		// orders across two symbols.
		c.submit_order(limit("a", "X", Side::Sell, 105, 10), &token)
			.await
			.unwrap();
		c.submit_order(limit("b", "X", Side::Sell, 104, 3), &token)
			.await
			.unwrap();
		c.submit_order(limit("c", "X", Side::Buy, 104, 1), &token)
			.await
			.unwrap();
		c.submit_order(limit("d", "X", Side::Buy, 100, 6), &token)
			.await
			.unwrap();
		let doomed = c.get_orderbook("X").await.unwrap().bids[0].clone();
		c.cancel_order(doomed.id, &doomed.client_id, &token)
			.await
			.unwrap();

		c.submit_order(limit("e", "Y", Side::Buy, 50, 2), &token)
			.await
			.unwrap();

		c.get_orderbook("X").await.unwrap()
	};

	// A new coordinator over the same store, fresh cache: rehydration
	// must reproduce the exact same view.
	let c = start(repo.clone()).await;
	let after = c.get_orderbook("X").await.unwrap();
	assert!(before.content_eq(&after));

	let y = c.get_orderbook("Y").await.unwrap();
	assert_eq!(y.bids.len(), 1);
	assert_eq!(y.bids[0].client_id, "e");

	// FIFO rehydration source: open rows come back in creation order.
	let rows = repo.load_open_orders("X").await.unwrap();
	assert!(rows.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[tokio::test]
async fn test_rehydrated_book_matches_like_before() {
	let repo = Arc::new(MemoryRepository::new());
	let token = CancellationToken::new();

	{
		let c = start(repo.clone()).await;
		c.submit_order(limit("maker", "X", Side::Sell, 100, 10), &token)
			.await
			.unwrap();
		// Leave the maker partially filled across the restart.
		c.submit_order(limit("taker", "X", Side::Buy, 100, 4), &token)
			.await
			.unwrap();
	}

	let c = start(repo).await;
	let trades = c
		.submit_order(limit("late_taker", "X", Side::Buy, 100, 6), &token)
		.await
		.unwrap();

	assert_eq!(trades.len(), 1);
	assert_eq!(trades[0].price, Price::from_u64(100));
	assert_eq!(trades[0].quantity, Quantity::from_u64(6));

	let maker = c.get_order(trades[0].sell_order).await.unwrap();
	assert_eq!(maker.status, OrderStatus::Filled);
	assert_eq!(maker.client_id, "maker");
	assert!(c.get_orderbook("X").await.unwrap().asks.is_empty());
}
