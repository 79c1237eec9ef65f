//! Configuration for a Foresight node.
//!
//! All knobs load from `FORESIGHT_`-prefixed environment variables via
//! [`NodeConfig::from_env`]; defaults mirror the prediction-market tick
//! model (prices in `[1, 999999]` with tick 1, amounts in 1e18 units).

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{ForesightError, Result};
use crate::numeric::{Amount, Price, Usdc};

/// Whether this process is the single writer or a read-scaling proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Leader,
    Follower,
}

impl NodeRole {
    #[must_use]
    pub fn is_leader(self) -> bool {
        matches!(self, Self::Leader)
    }
}

/// Economic parameters shared by every market on this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketParams {
    pub min_price: Price,
    pub max_price: Price,
    /// Tick size in raw price units; prices must satisfy
    /// `(price - min_price) % tick == 0`.
    pub tick_size: u64,
    pub min_order_amount: Amount,
    pub max_order_amount: Amount,
    pub maker_fee_bps: u32,
    pub taker_fee_bps: u32,
    /// Furthest a GTD expiry may lie in the future, in seconds.
    pub max_gtd_horizon_secs: u64,
    /// Skip (never cancel) a taker's own resting orders when matching.
    pub self_trade_protection: bool,
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            min_price: Price(1),
            max_price: Price(999_999),
            tick_size: 1,
            min_order_amount: Amount(constants::AMOUNT_ONE / 100), // 0.01 share
            max_order_amount: Amount(1_000_000 * constants::AMOUNT_ONE),
            maker_fee_bps: 0,
            taker_fee_bps: 25,
            max_gtd_horizon_secs: 90 * 24 * 3600,
            self_trade_protection: true,
        }
    }
}

/// Leader/follower topology and circuit-breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub role: NodeRole,
    /// Internal address of the leader; required for follower readiness.
    pub leader_url: Option<String>,
    /// Consecutive proxy failures before a path's breaker opens.
    pub breaker_threshold: u32,
    /// Cooldown before a half-open probe, in seconds.
    pub breaker_cooldown_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            role: NodeRole::Leader,
            leader_url: None,
            breaker_threshold: constants::DEFAULT_BREAKER_THRESHOLD,
            breaker_cooldown_secs: constants::DEFAULT_BREAKER_COOLDOWN_SECS,
        }
    }
}

/// On-chain settlement submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// JSON-RPC endpoint; `None` disables submission (fills still queue).
    pub rpc_url: Option<String>,
    /// Hex-encoded operator signing key.
    pub operator_key: Option<String>,
    /// Deployed exchange contract receiving fill batches.
    pub exchange_contract: Option<String>,
    /// Fills per batch before a flush is forced.
    pub batch_size: usize,
    /// Interval between flush attempts, in seconds.
    pub flush_interval_secs: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            operator_key: None,
            exchange_contract: None,
            batch_size: constants::DEFAULT_SETTLEMENT_BATCH_SIZE,
            flush_interval_secs: constants::DEFAULT_SETTLEMENT_FLUSH_SECS,
        }
    }
}

/// External stores. All optional: missing stores degrade to in-process
/// state with a warning, never a hard failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub idempotency_ttl_secs: u64,
    pub idempotency_max_keys: usize,
    /// Per-maker daily cap on gasless submission notional.
    pub gasless_daily_cap: Usdc,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            idempotency_ttl_secs: constants::IDEMPOTENCY_TTL_SECS,
            idempotency_max_keys: constants::IDEMPOTENCY_MAX_KEYS,
            gasless_daily_cap: Usdc(1_000 * constants::USDC_ONE),
        }
    }
}

/// HTTP/WebSocket listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".parse().expect("static addr"),
        }
    }
}

/// Aggregated configuration for one Foresight process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    pub server: ServerConfig,
    pub cluster: ClusterConfig,
    pub settlement: SettlementConfig,
    pub store: StoreConfig,
    pub market: MarketParams,
    /// Expiry-sweep interval in seconds.
    pub sweep_interval_secs: u64,
}

impl NodeConfig {
    /// Load configuration from `FORESIGHT_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self {
            sweep_interval_secs: constants::DEFAULT_SWEEP_INTERVAL_SECS,
            ..Self::default()
        };

        if let Some(addr) = env_var("FORESIGHT_LISTEN_ADDR") {
            cfg.server.listen_addr = addr.parse().map_err(|_| {
                ForesightError::Configuration(format!("bad FORESIGHT_LISTEN_ADDR: {addr}"))
            })?;
        }
        if let Some(role) = env_var("FORESIGHT_ROLE") {
            cfg.cluster.role = match role.to_ascii_lowercase().as_str() {
                "leader" => NodeRole::Leader,
                "follower" => NodeRole::Follower,
                other => {
                    return Err(ForesightError::Configuration(format!(
                        "bad FORESIGHT_ROLE: {other}"
                    )));
                }
            };
        }
        cfg.cluster.leader_url = env_var("FORESIGHT_LEADER_URL");
        if let Some(v) = env_var("FORESIGHT_BREAKER_THRESHOLD") {
            cfg.cluster.breaker_threshold = parse_num("FORESIGHT_BREAKER_THRESHOLD", &v)?;
        }
        if let Some(v) = env_var("FORESIGHT_BREAKER_COOLDOWN_SECS") {
            cfg.cluster.breaker_cooldown_secs = parse_num("FORESIGHT_BREAKER_COOLDOWN_SECS", &v)?;
        }

        cfg.settlement.rpc_url = env_var("FORESIGHT_RPC_URL");
        cfg.settlement.operator_key = env_var("FORESIGHT_OPERATOR_KEY");
        cfg.settlement.exchange_contract = env_var("FORESIGHT_EXCHANGE_CONTRACT");
        if let Some(v) = env_var("FORESIGHT_SETTLEMENT_BATCH_SIZE") {
            cfg.settlement.batch_size = parse_num("FORESIGHT_SETTLEMENT_BATCH_SIZE", &v)?;
        }
        if let Some(v) = env_var("FORESIGHT_SETTLEMENT_FLUSH_SECS") {
            cfg.settlement.flush_interval_secs = parse_num("FORESIGHT_SETTLEMENT_FLUSH_SECS", &v)?;
        }

        cfg.store.database_url = env_var("FORESIGHT_DATABASE_URL");
        cfg.store.redis_url = env_var("FORESIGHT_REDIS_URL");
        if let Some(v) = env_var("FORESIGHT_IDEMPOTENCY_TTL_SECS") {
            cfg.store.idempotency_ttl_secs = parse_num("FORESIGHT_IDEMPOTENCY_TTL_SECS", &v)?;
        }
        if let Some(v) = env_var("FORESIGHT_GASLESS_DAILY_CAP") {
            cfg.store.gasless_daily_cap = Usdc(parse_num("FORESIGHT_GASLESS_DAILY_CAP", &v)?);
        }

        if let Some(v) = env_var("FORESIGHT_TAKER_FEE_BPS") {
            cfg.market.taker_fee_bps = parse_num("FORESIGHT_TAKER_FEE_BPS", &v)?;
        }
        if let Some(v) = env_var("FORESIGHT_MAKER_FEE_BPS") {
            cfg.market.maker_fee_bps = parse_num("FORESIGHT_MAKER_FEE_BPS", &v)?;
        }
        if let Some(v) = env_var("FORESIGHT_SELF_TRADE_PROTECTION") {
            cfg.market.self_trade_protection = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        if let Some(v) = env_var("FORESIGHT_SWEEP_INTERVAL_SECS") {
            cfg.sweep_interval_secs = parse_num("FORESIGHT_SWEEP_INTERVAL_SECS", &v)?;
        }

        if cfg.cluster.role == NodeRole::Follower && cfg.cluster.leader_url.is_none() {
            tracing::warn!("follower configured without FORESIGHT_LEADER_URL; node is not ready");
        }

        Ok(cfg)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| ForesightError::Configuration(format!("bad {name}: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tick_model() {
        let params = MarketParams::default();
        assert_eq!(params.min_price, Price(1));
        assert_eq!(params.max_price, Price(999_999));
        assert_eq!(params.tick_size, 1);
        assert!(params.self_trade_protection);
    }

    #[test]
    fn default_node_is_leader_and_ready() {
        let cfg = NodeConfig::default();
        assert!(cfg.cluster.role.is_leader());
        assert!(cfg.cluster.leader_url.is_none());
    }

    #[test]
    fn config_serde_roundtrip() {
        let cfg = NodeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cluster.role, cfg.cluster.role);
        assert_eq!(back.market.max_price, cfg.market.max_price);
        assert_eq!(back.store.gasless_daily_cap, cfg.store.gasless_daily_cap);
    }

    #[test]
    fn role_wire_spelling() {
        assert_eq!(serde_json::to_string(&NodeRole::Leader).unwrap(), "\"leader\"");
        let parsed: NodeRole = serde_json::from_str("\"follower\"").unwrap();
        assert_eq!(parsed, NodeRole::Follower);
    }
}
