//! Engine event fan-out.
//!
//! The engine calls this synchronously inside the per-market writer
//! guard, so everything here must be non-blocking: broadcasts push onto
//! unbounded client channels, fills queue in memory for the settler, and
//! relational writes detach onto the runtime.

use std::sync::Arc;

use foresight_engine::EngineSink;
use foresight_settlement::{BatchSettler, EthersSubmitter, OrderStore};
use foresight_types::{DepthSnapshot, MarketStats, Match, Order};
use tracing::warn;

use crate::ws::Hub;

/// Wires engine events to the WebSocket hub, the settlement queue, and
/// the best-effort order store.
pub struct GatewaySink {
    hub: Arc<Hub>,
    settler: Arc<BatchSettler<EthersSubmitter>>,
    store: Option<Arc<OrderStore>>,
}

impl GatewaySink {
    #[must_use]
    pub fn new(
        hub: Arc<Hub>,
        settler: Arc<BatchSettler<EthersSubmitter>>,
        store: Option<Arc<OrderStore>>,
    ) -> Self {
        Self { hub, settler, store }
    }
}

impl EngineSink for GatewaySink {
    fn order_updated(&self, order: &Order) {
        self.hub.broadcast_order(order);
        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let order = order.clone();
            tokio::spawn(async move {
                if let Err(err) = store.upsert_order(&order).await {
                    warn!(order_id = %order.id, %err, "order mirror write failed");
                }
            });
        }
    }

    fn trade_executed(&self, fill: &Match) {
        self.hub.broadcast_trade(fill);
        self.settler.add_fill(fill);
        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let fill = fill.clone();
            tokio::spawn(async move {
                if let Err(err) = store.record_match(&fill).await {
                    warn!(match_id = %fill.id, %err, "match mirror write failed");
                }
            });
        }
    }

    fn depth_changed(&self, depth: &DepthSnapshot) {
        self.hub.broadcast_depth(depth);
    }

    fn stats_changed(&self, stats: &MarketStats) {
        self.hub.broadcast_stats(stats);
    }
}
