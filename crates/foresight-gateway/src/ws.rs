//! Realtime WebSocket fan-out.
//!
//! Channel namespace is `type:marketKey:outcomeIndex` with type one of
//! `depth`, `trades`, `stats`, `orders`. On connect a client gets a
//! `connected` envelope with its id; it then sends `subscribe` /
//! `unsubscribe` (channel arrays) and `ping` (liveness, answered `pong`).
//! Malformed messages get an `error` envelope and are otherwise ignored.
//! A periodic sweep force-closes clients silent past the stale window.

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use dashmap::DashMap;
use foresight_types::constants::{WS_MAX_SUBSCRIPTIONS, WS_STALE_AFTER_SECS};
use foresight_types::{BookKey, ClientId, DepthSnapshot, MarketKey, MarketStats, Match, Order};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Depth,
    Trades,
    Stats,
    Orders,
}

impl ChannelKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::Trades => "trades",
            Self::Stats => "stats",
            Self::Orders => "orders",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "depth" => Some(Self::Depth),
            "trades" => Some(Self::Trades),
            "stats" => Some(Self::Stats),
            "orders" => Some(Self::Orders),
            _ => None,
        }
    }
}

/// One subscription target: `type:marketKey:outcomeIndex`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    pub kind: ChannelKind,
    pub market: MarketKey,
    pub outcome_index: u32,
}

impl Channel {
    #[must_use]
    pub fn new(kind: ChannelKind, key: &BookKey) -> Self {
        Self {
            kind,
            market: key.market.clone(),
            outcome_index: key.outcome_index,
        }
    }

    /// Parse `depth:eth-above-5k:0`. Market keys may not contain `:`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(':');
        let kind = ChannelKind::parse(parts.next()?)?;
        let market = parts.next()?;
        let outcome_index: u32 = parts.next()?.parse().ok()?;
        if market.is_empty() || parts.next().is_some() {
            return None;
        }
        Some(Self {
            kind,
            market: MarketKey::from(market),
            outcome_index,
        })
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.kind.as_str(),
            self.market,
            self.outcome_index
        )
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct HubClient {
    sender: mpsc::UnboundedSender<Message>,
    subscriptions: HashSet<Channel>,
    /// Unix seconds of the last inbound message.
    last_seen: i64,
}

/// What a client may send.
#[derive(Debug, Deserialize)]
struct ClientMessage {
    action: String,
    #[serde(default)]
    channels: Vec<String>,
}

/// Connected clients and their subscriptions.
#[derive(Debug, Default)]
pub struct Hub {
    clients: DashMap<ClientId, HubClient>,
}

impl Hub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and greet it.
    pub fn register(&self, sender: mpsc::UnboundedSender<Message>) -> ClientId {
        let id = ClientId::new();
        self.clients.insert(
            id,
            HubClient {
                sender,
                subscriptions: HashSet::new(),
                last_seen: Utc::now().timestamp(),
            },
        );
        self.send_to(id, &json!({ "type": "connected", "clientId": id }));
        debug!(client = %id, total = self.clients.len(), "ws client connected");
        id
    }

    pub fn disconnect(&self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            debug!(client = %id, total = self.clients.len(), "ws client disconnected");
        }
    }

    /// Handle one inbound text frame.
    pub fn handle_message(&self, id: ClientId, raw: &str) {
        self.touch(id);
        let Ok(msg) = serde_json::from_str::<ClientMessage>(raw) else {
            self.send_to(id, &json!({ "type": "error", "message": "malformed message" }));
            return;
        };
        match msg.action.as_str() {
            "subscribe" => self.subscribe(id, &msg.channels),
            "unsubscribe" => self.unsubscribe(id, &msg.channels),
            "ping" => self.send_to(id, &json!({ "type": "pong" })),
            other => {
                self.send_to(
                    id,
                    &json!({ "type": "error", "message": format!("unknown action: {other}") }),
                );
            }
        }
    }

    fn subscribe(&self, id: ClientId, raw_channels: &[String]) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        if let Some(mut client) = self.clients.get_mut(&id) {
            for raw in raw_channels {
                match Channel::parse(raw) {
                    Some(channel) if client.subscriptions.len() < WS_MAX_SUBSCRIPTIONS => {
                        client.subscriptions.insert(channel);
                        accepted.push(raw.clone());
                    }
                    // Unparseable or over the subscription cap.
                    _ => rejected.push(raw.clone()),
                }
            }
        }
        self.send_to(
            id,
            &json!({ "type": "subscribed", "channels": accepted, "rejected": rejected }),
        );
    }

    fn unsubscribe(&self, id: ClientId, raw_channels: &[String]) {
        let mut removed = Vec::new();
        if let Some(mut client) = self.clients.get_mut(&id) {
            for raw in raw_channels {
                if let Some(channel) = Channel::parse(raw) {
                    if client.subscriptions.remove(&channel) {
                        removed.push(raw.clone());
                    }
                }
            }
        }
        self.send_to(id, &json!({ "type": "unsubscribed", "channels": removed }));
    }

    /// Record liveness for a client.
    pub fn touch(&self, id: ClientId) {
        if let Some(mut client) = self.clients.get_mut(&id) {
            client.last_seen = Utc::now().timestamp();
        }
    }

    fn send_to(&self, id: ClientId, payload: &Value) {
        if let Some(client) = self.clients.get(&id) {
            let _ = client.sender.send(Message::Text(payload.to_string().into()));
        }
    }

    /// Send `payload` to every subscriber of `channel`. Dead senders are
    /// dropped on the way.
    pub fn broadcast(&self, channel: &Channel, payload: &Value) {
        let frame = Message::Text(
            json!({ "type": channel.kind.as_str(), "channel": channel.to_string(), "data": payload })
                .to_string()
                .into(),
        );
        let mut dead = Vec::new();
        for entry in &self.clients {
            if entry.subscriptions.contains(channel)
                && entry.sender.send(frame.clone()).is_err()
            {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.disconnect(id);
        }
    }

    pub fn broadcast_depth(&self, depth: &DepthSnapshot) {
        let key = BookKey::new(depth.market.clone(), depth.outcome_index);
        self.broadcast(
            &Channel::new(ChannelKind::Depth, &key),
            &serde_json::to_value(depth).unwrap_or(Value::Null),
        );
    }

    pub fn broadcast_trade(&self, fill: &Match) {
        let key = BookKey::new(fill.market.clone(), fill.outcome_index);
        self.broadcast(
            &Channel::new(ChannelKind::Trades, &key),
            &serde_json::to_value(fill).unwrap_or(Value::Null),
        );
    }

    pub fn broadcast_stats(&self, stats: &MarketStats) {
        let key = BookKey::new(stats.market.clone(), stats.outcome_index);
        self.broadcast(
            &Channel::new(ChannelKind::Stats, &key),
            &serde_json::to_value(stats).unwrap_or(Value::Null),
        );
    }

    pub fn broadcast_order(&self, order: &Order) {
        self.broadcast(
            &Channel::new(ChannelKind::Orders, &order.book_key()),
            &serde_json::to_value(order).unwrap_or(Value::Null),
        );
    }

    /// Force-close clients silent past the stale window. Returns how many
    /// were closed.
    pub fn sweep_stale(&self) -> usize {
        let cutoff = Utc::now().timestamp() - WS_STALE_AFTER_SECS;
        let stale: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|entry| entry.last_seen < cutoff)
            .map(|entry| *entry.key())
            .collect();
        let count = stale.len();
        for id in stale {
            warn!(client = %id, "closing stale ws client");
            self.disconnect(id);
        }
        count
    }

    /// Drop every connection (shutdown path).
    pub fn close_all(&self) {
        let count = self.clients.len();
        self.clients.clear();
        if count > 0 {
            info!(count, "closed all ws clients");
        }
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    #[cfg(test)]
    fn subscription_count(&self, id: ClientId) -> usize {
        self.clients
            .get(&id)
            .map_or(0, |c| c.subscriptions.len())
    }
}

/// Drives one upgraded socket until it closes.
pub async fn client_loop(hub: Arc<Hub>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let id = hub.register(tx);

    // Writer side: outbound envelopes until the hub drops the sender.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = ws_rx.next().await {
        match frame {
            Message::Text(text) => hub.handle_message(id, &text),
            Message::Ping(_) | Message::Pong(_) => hub.touch(id),
            Message::Close(_) => break,
            Message::Binary(_) => {}
        }
    }

    hub.disconnect(id);
    writer.abort();
}
