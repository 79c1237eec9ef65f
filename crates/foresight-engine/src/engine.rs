//! The matching engine: continuous double auction, price-time priority.
//!
//! Every mutating entry point funnels through the per-market writer
//! guard — an async mutex around that market's books — so the whole
//! validate-match-events sequence for one order is a critical section.
//! Different markets run concurrently on independent shards.
//!
//! Outbound effects (persistence, settlement queuing, realtime fan-out)
//! go through the [`EngineSink`] port, called synchronously inside the
//! writer context so observers see mutations in book order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use ethers::types::Address;
use foresight_book::{OrderBook, OrderBookManager};
use foresight_types::constants::DEFAULT_DEPTH_LEVELS;
use foresight_types::{
    BookKey, DepthSnapshot, ForesightError, MarketKey, MarketParams, MarketStats, Match, MatchId,
    Order, OrderId, OrderSide, OrderStatus, Price, Result, fee_half_up, notional,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::risk::RiskManager;
use crate::salts::SaltRegistry;

/// Outbound ports the engine calls synchronously within the writer
/// context. Implementations must not block.
pub trait EngineSink: Send + Sync {
    /// An order was admitted, changed status, or changed remaining.
    fn order_updated(&self, order: &Order);
    /// A fill was produced. Receivers project [`foresight_types::SettlementFill`]
    /// and queue it for on-chain submission.
    fn trade_executed(&self, fill: &Match);
    /// A book mutated; `depth` is the fresh aggregate snapshot.
    fn depth_changed(&self, depth: &DepthSnapshot);
    fn stats_changed(&self, stats: &MarketStats);
}

/// Sink that drops every event. Test and bootstrap use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EngineSink for NullSink {
    fn order_updated(&self, _: &Order) {}
    fn trade_executed(&self, _: &Match) {}
    fn depth_changed(&self, _: &DepthSnapshot) {}
    fn stats_changed(&self, _: &MarketStats) {}
}

/// Result of admitting one order.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// The taker order in its final (or resting) state.
    pub order: Order,
    pub matches: Vec<Match>,
}

/// One market's books behind its writer guard.
#[derive(Debug, Default)]
struct MarketShard {
    books: OrderBookManager,
}

/// Orchestrates admit -> risk-reserve -> match -> settle -> broadcast.
pub struct MatchingEngine {
    shards: DashMap<MarketKey, Arc<Mutex<MarketShard>>>,
    /// Which book a resting order lives in, for cancel-by-id.
    locator: DashMap<OrderId, BookKey>,
    risk: Arc<RiskManager>,
    salts: Arc<SaltRegistry>,
    params: MarketParams,
    sink: Arc<dyn EngineSink>,
    /// Monotonic tie-breaker for equal-price time priority.
    sequence: AtomicU64,
}

impl MatchingEngine {
    #[must_use]
    pub fn new(
        params: MarketParams,
        risk: Arc<RiskManager>,
        salts: Arc<SaltRegistry>,
        sink: Arc<dyn EngineSink>,
    ) -> Self {
        Self {
            shards: DashMap::new(),
            locator: DashMap::new(),
            risk,
            salts,
            params,
            sink,
            sequence: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn params(&self) -> &MarketParams {
        &self.params
    }

    #[must_use]
    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    #[must_use]
    pub fn salts(&self) -> &SaltRegistry {
        &self.salts
    }

    fn shard(&self, market: &MarketKey) -> Arc<Mutex<MarketShard>> {
        self.shards
            .entry(market.clone())
            .or_insert_with(|| Arc::new(Mutex::new(MarketShard::default())))
            .clone()
    }

    // =================================================================
    // Admission
    // =================================================================

    /// Admit a validated, signature-checked order: claim its salt,
    /// reserve buy-side collateral, run the matching loop, and dispose
    /// of the remainder per TIF.
    pub async fn submit(&self, mut order: Order) -> Result<SubmitOutcome> {
        let shard = self.shard(&order.market);
        let mut guard = shard.lock().await;

        order.sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let salt_key = order.salt_key();
        self.salts.claim(salt_key, order.id)?;

        match self.submit_locked(&mut guard, order) {
            Ok(outcome) => {
                self.salts.update(&salt_key, outcome.order.status);
                Ok(outcome)
            }
            Err(err) => {
                // Unpin the salt so a rejected submission can be retried.
                self.salts.update(&salt_key, OrderStatus::Rejected);
                Err(err)
            }
        }
    }

    fn submit_locked(&self, shard: &mut MarketShard, mut taker: Order) -> Result<SubmitOutcome> {
        self.risk.reserve(&taker)?;
        match self.match_reserved(shard, &mut taker) {
            Ok(matches) => Ok(SubmitOutcome {
                order: taker,
                matches,
            }),
            Err(err) => {
                // A failed admission must not strand the remainder's
                // reservation; the consumed portion stands with its fills.
                if let Err(release_err) = self.risk.release_remainder(&taker) {
                    warn!(
                        order_id = %taker.id,
                        %release_err,
                        "reservation release after failed admission"
                    );
                }
                Err(err)
            }
        }
    }

    fn match_reserved(&self, shard: &mut MarketShard, taker: &mut Order) -> Result<Vec<Match>> {
        let key = taker.book_key();
        let now = unix_now();
        let exclude = self
            .params
            .self_trade_protection
            .then_some(taker.maker);
        let book = shard.books.get_or_create(&key);

        // FOK: pure all-or-nothing pre-check on the resting side, no
        // mutation. Own and expired liquidity never count toward it.
        if taker.tif.all_or_nothing() {
            let available = book.available_at_or_better(taker.side, taker.price, now, exclude);
            if available < taker.remaining {
                debug!(
                    order_id = %taker.id,
                    market = %taker.market,
                    %available,
                    wanted = %taker.remaining,
                    "FOK pre-check failed"
                );
                self.discard(book, taker, OrderStatus::Canceled)?;
                return Ok(Vec::new());
            }
        }

        let mut matches = Vec::new();
        while !taker.remaining.is_zero() {
            let Some(counter) = book.best_counter_order(taker.side, exclude) else {
                break;
            };
            if !prices_cross(taker.side, taker.price, counter.price) {
                break;
            }
            if counter.is_expired(now) {
                // Self-healing: evict and retry without consuming taker
                // liquidity.
                self.evict(book, counter.id)?;
                continue;
            }
            if taker.post_only {
                // A post-only order that would trade is discarded whole.
                self.discard(book, taker, OrderStatus::Canceled)?;
                return Ok(matches);
            }

            let fill = self.execute_match(book, taker, counter)?;
            matches.push(fill);
        }

        // TIF disposition of the remainder.
        if taker.remaining.is_zero() {
            self.locator.remove(&taker.id);
            self.sink.order_updated(taker);
        } else if taker.tif.rests() {
            if taker.status == OrderStatus::Pending {
                taker.transition(OrderStatus::Open)?;
            }
            book.add_order(taker.clone())?;
            self.locator.insert(taker.id, key.clone());
            self.sink.order_updated(taker);
        } else {
            // IOC/FAK (and a crossed FOK race) never rest.
            self.risk.release_remainder(taker)?;
            taker.transition(OrderStatus::Canceled)?;
            self.sink.order_updated(taker);
        }

        info!(
            order_id = %taker.id,
            market = %taker.market,
            outcome = taker.outcome_index,
            side = %taker.side,
            status = %taker.status,
            matched = matches.len(),
            "order admitted"
        );

        self.sink.depth_changed(&book.depth_snapshot(DEFAULT_DEPTH_LEVELS));
        self.sink.stats_changed(&book.stats());
        Ok(matches)
    }

    /// One fill between the incoming taker and the best resting maker.
    fn execute_match(
        &self,
        book: &mut OrderBook,
        taker: &mut Order,
        counter: Order,
    ) -> Result<Match> {
        let matched = taker.remaining.min(counter.remaining);
        debug_assert!(!matched.is_zero(), "zero-amount match");
        // Maker price improvement for makers, posted price for takers.
        let matched_price = counter.price;

        let value = notional(matched, matched_price).ok_or_else(|| {
            ForesightError::BookCorrupted {
                reason: "notional overflow in match".into(),
            }
        })?;
        let maker_fee = fee_half_up(value, self.params.maker_fee_bps)
            .ok_or_else(|| ForesightError::BookCorrupted {
                reason: "maker fee overflow".into(),
            })?;
        let taker_fee = fee_half_up(value, self.params.taker_fee_bps)
            .ok_or_else(|| ForesightError::BookCorrupted {
                reason: "taker fee overflow".into(),
            })?;

        // Consume the buy side's reservation at its reserved (limit)
        // rate; the sell side holds no USDC reservation.
        if counter.side.is_buy() {
            self.risk.consume(counter.maker, matched, counter.price)?;
        }
        if taker.side.is_buy() {
            self.risk.consume(taker.maker, matched, taker.price)?;
        }

        let mut maker = counter;
        maker.record_fill(matched)?;
        taker.record_fill(matched)?;

        if maker.remaining.is_zero() {
            book.remove_order(maker.id)?;
            self.locator.remove(&maker.id);
        } else {
            book.update_order(maker.clone())?;
        }
        self.salts.update(&maker.salt_key(), maker.status);
        self.sink.order_updated(&maker);

        let fill = Match {
            id: MatchId::new(),
            market: taker.market.clone(),
            outcome_index: taker.outcome_index,
            maker_order_id: maker.id,
            maker: maker.maker,
            taker_order_id: taker.id,
            taker: taker.maker,
            taker_side: taker.side,
            matched_amount: matched,
            matched_price,
            maker_fee,
            taker_fee,
            executed_at: Utc::now(),
        };
        debug!(
            match_id = %fill.id,
            maker_order = %maker.id,
            taker_order = %taker.id,
            matched = %matched,
            price = %matched_price,
            "match executed"
        );
        book.record_trade(fill.clone());
        self.sink.trade_executed(&fill);
        Ok(fill)
    }

    /// Discard an order whole before it trades: release its reservation
    /// and mark it with `status`, leaving the book untouched.
    fn discard(&self, book: &OrderBook, order: &mut Order, status: OrderStatus) -> Result<()> {
        self.risk.release_remainder(order)?;
        order.transition(status)?;
        self.sink.order_updated(order);
        self.sink.depth_changed(&book.depth_snapshot(DEFAULT_DEPTH_LEVELS));
        Ok(())
    }

    /// Evict one expired resting order: remove, release its buy-side
    /// reservation, mark expired, rebroadcast depth.
    fn evict(&self, book: &mut OrderBook, order_id: OrderId) -> Result<()> {
        let mut evicted = book.remove_order(order_id)?;
        self.risk.release_remainder(&evicted)?;
        evicted.transition(OrderStatus::Expired)?;
        self.salts.update(&evicted.salt_key(), OrderStatus::Expired);
        self.locator.remove(&evicted.id);
        info!(order_id = %evicted.id, market = %evicted.market, "expired order evicted");
        self.sink.order_updated(&evicted);
        self.sink.depth_changed(&book.depth_snapshot(DEFAULT_DEPTH_LEVELS));
        Ok(())
    }

    // =================================================================
    // Cancel
    // =================================================================

    /// Cancel a resting order. `caller` must be the order's maker.
    pub async fn cancel(&self, order_id: OrderId, caller: Address) -> Result<Order> {
        let key = self
            .locator
            .get(&order_id)
            .map(|slot| slot.clone())
            .ok_or(ForesightError::OrderNotFound(order_id))?;
        let shard = self.shard(&key.market);
        let mut guard = shard.lock().await;

        let book = guard
            .books
            .get_mut(&key)
            .ok_or(ForesightError::OrderNotFound(order_id))?;
        let resting = book
            .get_order(order_id)
            .ok_or(ForesightError::OrderNotFound(order_id))?;
        if resting.maker != caller {
            return Err(ForesightError::NotOrderMaker(order_id));
        }

        let mut canceled = book.remove_order(order_id)?;
        self.risk.release_remainder(&canceled)?;
        canceled.transition(OrderStatus::Canceled)?;
        self.salts.update(&canceled.salt_key(), OrderStatus::Canceled);
        self.locator.remove(&order_id);

        info!(order_id = %order_id, market = %key.market, "order canceled");
        self.sink.order_updated(&canceled);
        self.sink.depth_changed(&book.depth_snapshot(DEFAULT_DEPTH_LEVELS));
        self.sink.stats_changed(&book.stats());
        Ok(canceled)
    }

    // =================================================================
    // Expiry sweep
    // =================================================================

    /// Periodic pass evicting every expired resting order, exactly like
    /// mid-match eviction. Returns the number evicted.
    pub async fn sweep_expired(&self) -> usize {
        let now = unix_now();
        let markets: Vec<MarketKey> = self.shards.iter().map(|e| e.key().clone()).collect();
        let mut evicted = 0usize;
        for market in markets {
            let shard = self.shard(&market);
            let mut guard = shard.lock().await;
            for (_, book) in guard.books.iter_mut() {
                let expired: Vec<OrderId> = book
                    .all_orders()
                    .into_iter()
                    .filter(|o| o.is_expired(now))
                    .map(|o| o.id)
                    .collect();
                for id in expired {
                    match self.evict(book, id) {
                        Ok(()) => evicted += 1,
                        Err(err) => warn!(order_id = %id, %err, "sweep eviction failed"),
                    }
                }
            }
        }
        if evicted > 0 {
            info!(count = evicted, "expiry sweep evicted orders");
        }
        evicted
    }

    // =================================================================
    // Reads
    // =================================================================

    pub async fn depth(&self, key: &BookKey, levels: usize) -> DepthSnapshot {
        let shard = self.shard(&key.market);
        let guard = shard.lock().await;
        guard
            .books
            .get(key)
            .map_or_else(|| DepthSnapshot::empty(key), |b| b.depth_snapshot(levels))
    }

    pub async fn stats(&self, key: &BookKey) -> MarketStats {
        let shard = self.shard(&key.market);
        let guard = shard.lock().await;
        guard.books.get(key).map_or_else(
            || MarketStats {
                market: key.market.clone(),
                outcome_index: key.outcome_index,
                last_price: None,
                volume_24h: foresight_types::Usdc::ZERO,
                trades_24h: 0,
                best_bid: None,
                best_ask: None,
                timestamp_ms: Utc::now().timestamp_millis(),
            },
            foresight_book::OrderBook::stats,
        )
    }

    /// A resting order by id. Terminal orders are not held in memory;
    /// callers fall back to the persistence mirror.
    pub async fn get_order(&self, order_id: OrderId) -> Option<Order> {
        let key = self.locator.get(&order_id)?.clone();
        let shard = self.shard(&key.market);
        let guard = shard.lock().await;
        guard.books.get(&key)?.get_order(order_id)
    }

    pub async fn recent_trades(&self, key: &BookKey, limit: usize) -> Vec<Match> {
        let shard = self.shard(&key.market);
        let guard = shard.lock().await;
        guard
            .books
            .get(key)
            .map(|b| b.recent_trades(limit))
            .unwrap_or_default()
    }
}

/// Buy takers lift asks at or below their limit; sell takers hit bids at
/// or above.
fn prices_cross(taker_side: OrderSide, taker_price: Price, maker_price: Price) -> bool {
    match taker_side {
        OrderSide::Buy => taker_price >= maker_price,
        OrderSide::Sell => taker_price <= maker_price,
    }
}

#[allow(clippy::cast_sign_loss)]
fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prices_cross_rules() {
        assert!(prices_cross(OrderSide::Buy, Price(500_000), Price(500_000)));
        assert!(prices_cross(OrderSide::Buy, Price(500_000), Price(499_000)));
        assert!(!prices_cross(OrderSide::Buy, Price(500_000), Price(501_000)));
        assert!(prices_cross(OrderSide::Sell, Price(500_000), Price(500_000)));
        assert!(prices_cross(OrderSide::Sell, Price(500_000), Price(501_000)));
        assert!(!prices_cross(OrderSide::Sell, Price(500_000), Price(499_000)));
    }
}
