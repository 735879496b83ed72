//! Randomized invariant tests
//!
//! Seeded random submission streams against the coordinator, asserting
//! after every step and at the end:
//! - Quantity conservation: quantity = remaining + executed, for every
//!   non-cancelled order
//! - Book ordering per side and no crossed book
//! - Every trade prices at the passive order's price and has positive
//!   quantity
//! - Per-submit fill totals never exceed the submitted quantity

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use forge_matching::{Coordinator, EngineConfig, MemoryCache, MemoryRepository};
use forge_sdk::{
	ErrorKind, Order, OrderCommand, OrderStatus, OrderType, OrderbookSnapshot, Price, Quantity,
	Side, Trade,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const SYMBOLS: [&str; 2] = ["ALPHA", "BETA"];

async fn coordinator() -> Coordinator {
	Coordinator::start(
		Arc::new(MemoryRepository::new()),
		Arc::new(MemoryCache::new(Duration::from_secs(300))),
		EngineConfig::default(),
	)
	.await
	.unwrap()
}

fn random_command(rng: &mut StdRng, client: &str) -> OrderCommand {
	let symbol = SYMBOLS[rng.gen_range(0..SYMBOLS.len())];
	let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
	let order_type = if rng.gen_bool(0.85) {
		OrderType::Limit
	} else {
		OrderType::Market
	};
	// Prices in [90.00, 110.00], quantities in [0.1, 9.9].
	let price = Price::try_new(Decimal::new(rng.gen_range(9_000..=11_000), 2)).unwrap();
	let quantity = Quantity::try_new(Decimal::new(rng.gen_range(1..100), 1)).unwrap();
	OrderCommand {
		client_id: client.to_string(),
		client_order_id: None,
		symbol: symbol.to_string(),
		side,
		order_type,
		price,
		quantity,
	}
}

/// Prices and owners as last observed, keyed by order id.
#[derive(Default)]
struct Shadow {
	price: HashMap<Uuid, Price>,
	client: HashMap<Uuid, String>,
}

impl Shadow {
	fn learn_book(&mut self, book: &OrderbookSnapshot) {
		for order in book.bids.iter().chain(book.asks.iter()) {
			self.price.insert(order.id, order.price);
			self.client.insert(order.id, order.client_id.clone());
		}
	}
}

fn assert_trades_well_formed(cmd: &OrderCommand, trades: &[Trade], shadow: &Shadow) {
	let mut filled = Quantity::ZERO;
	for trade in trades {
		assert!(!trade.quantity.is_zero(), "trade quantity must be positive");
		filled = filled + trade.quantity;

		let (aggressor_id, passive_id) = match cmd.side {
			Side::Buy => (trade.buy_order, trade.sell_order),
			Side::Sell => (trade.sell_order, trade.buy_order),
		};
		assert_ne!(aggressor_id, passive_id, "order must not trade with itself");

		// Passive pricing: the trade executes at the resting order's
		// price as it stood when the submit began.
		if let Some(passive_price) = shadow.price.get(&passive_id) {
			assert_eq!(trade.price, *passive_price);
		}
		if cmd.order_type == OrderType::Limit {
			match cmd.side {
				Side::Buy => assert!(trade.price <= cmd.price),
				Side::Sell => assert!(trade.price >= cmd.price),
			}
		}
	}
	assert!(
		filled <= cmd.quantity,
		"fills exceed submitted quantity: {filled} > {}",
		cmd.quantity
	);
}

fn assert_book_ordered(book: &OrderbookSnapshot) {
	for pair in book.bids.windows(2) {
		let better = (
			std::cmp::Reverse(pair[0].price),
			pair[0].created_at,
			pair[0].id,
		);
		let worse = (
			std::cmp::Reverse(pair[1].price),
			pair[1].created_at,
			pair[1].id,
		);
		assert!(better < worse, "bids out of priority order");
	}
	for pair in book.asks.windows(2) {
		let better = (pair[0].price, pair[0].created_at, pair[0].id);
		let worse = (pair[1].price, pair[1].created_at, pair[1].id);
		assert!(better < worse, "asks out of priority order");
	}
	if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
		assert!(bid.price < ask.price, "crossed book");
	}
	for order in book.bids.iter().chain(book.asks.iter()) {
		assert!(order.status.is_resting());
		assert!(!order.remaining.is_zero());
	}
}

async fn assert_conservation(c: &Coordinator, order: &Order) {
	let trades = c.get_trades_for_order(order.id).await.unwrap();
	let executed = trades
		.iter()
		.fold(Quantity::ZERO, |acc, t| acc + t.quantity);

	match order.status {
		OrderStatus::Cancelled => {
			// Cancellation zeroes the remainder by definition.
			assert!(order.remaining.is_zero());
			assert!(executed <= order.quantity);
		}
		OrderStatus::Filled => {
			assert!(order.remaining.is_zero());
			assert_eq!(executed, order.quantity);
		}
		OrderStatus::PartiallyFilled => {
			assert!(!order.remaining.is_zero());
			assert!(order.remaining < order.quantity);
			assert_eq!(order.remaining + executed, order.quantity);
		}
		OrderStatus::Open => {
			assert_eq!(order.remaining, order.quantity);
			assert!(executed.is_zero());
		}
	}
}

#[tokio::test]
async fn test_random_submissions_hold_invariants() {
	let c = coordinator().await;
	let token = CancellationToken::new();
	let mut rng = StdRng::seed_from_u64(0x0F0D6E);
	let mut shadow = Shadow::default();

	for step in 0..400 {
		let roll: f64 = rng.r#gen();
		if roll < 0.70 || shadow.price.is_empty() {
			let client = format!("client_{}", rng.gen_range(0..8));
			let cmd = random_command(&mut rng, &client);
			let symbol = cmd.symbol.clone();

			let trades = c.submit_order(cmd.clone(), &token).await.unwrap();
			assert_trades_well_formed(&cmd, &trades, &shadow);
			for trade in &trades {
				shadow
					.client
					.entry(trade.buy_order)
					.or_insert_with(|| cmd.client_id.clone());
				shadow
					.client
					.entry(trade.sell_order)
					.or_insert_with(|| cmd.client_id.clone());
			}

			let book = c.get_orderbook(&symbol).await.unwrap();
			assert_book_ordered(&book);
			shadow.learn_book(&book);
		} else {
			// Pick a random order we have seen resting and poke it.
			let ids: Vec<Uuid> = shadow.price.keys().copied().collect();
			let id = ids[rng.gen_range(0..ids.len())];
			let client = shadow.client[&id].clone();

			if roll < 0.85 {
				let new_price =
					Price::try_new(Decimal::new(rng.gen_range(9_000..=11_000), 2)).unwrap();
				let new_qty = Quantity::try_new(Decimal::new(rng.gen_range(1..100), 1)).unwrap();
				match c.modify_order(id, &client, new_price, new_qty, &token).await {
					Ok(()) => {
						shadow.price.insert(id, new_price);
					}
					// The order may have filled or cancelled since we saw it.
					Err(err) => assert_eq!(err.kind(), ErrorKind::ConflictState, "step {step}"),
				}
			} else {
				match c.cancel_order(id, &client, &token).await {
					Ok(()) => {}
					Err(err) => assert_eq!(err.kind(), ErrorKind::ConflictState, "step {step}"),
				}
			}
		}
	}

	for symbol in SYMBOLS {
		let book = c.get_orderbook(symbol).await.unwrap();
		assert_book_ordered(&book);
		shadow.learn_book(&book);
	}
	for id in shadow.price.keys() {
		let order = c.get_order(*id).await.unwrap();
		assert_conservation(&c, &order).await;
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_submissions_stay_consistent() {
	let c = Arc::new(coordinator().await);
	let mut tasks = Vec::new();

	// Four writers, two symbols: same-symbol traffic serialises through
	// the lane, cross-symbol traffic runs in parallel.
	for task_id in 0..4u64 {
		let c = c.clone();
		tasks.push(tokio::spawn(async move {
			let token = CancellationToken::new();
			let mut rng = StdRng::seed_from_u64(0xBEEF ^ task_id);
			let client = format!("writer_{task_id}");
			let mut trades = Vec::new();
			for _ in 0..40 {
				let cmd = random_command(&mut rng, &client);
				trades.extend(c.submit_order(cmd, &token).await.unwrap());
			}
			trades
		}));
	}

	let mut all_trades = Vec::new();
	for task in tasks {
		all_trades.extend(task.await.unwrap());
	}

	for symbol in SYMBOLS {
		let book = c.get_orderbook(symbol).await.unwrap();
		assert_book_ordered(&book);
	}

	let mut order_ids: Vec<Uuid> = all_trades
		.iter()
		.flat_map(|t| [t.buy_order, t.sell_order])
		.collect();
	order_ids.sort();
	order_ids.dedup();
	for id in order_ids {
		let order = c.get_order(id).await.unwrap();
		assert_conservation(&c, &order).await;
	}
}
