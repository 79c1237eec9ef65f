//! Shared per-process state behind the router.

use std::sync::Arc;

use ethers::types::{Address, Bytes, H256};
use foresight_engine::{Erc1271Prober, MatchingEngine, NoopProber, RiskManager, RpcProber, SaltRegistry};
use foresight_settlement::{BatchSettler, EthersSubmitter, IntentStore, OrderStore};
use foresight_types::constants::IDEMPOTENCY_TTL_SECS;
use foresight_types::{NodeConfig, Result};
use tracing::{info, warn};

use crate::cluster::ClusterCoordinator;
use crate::idempotency::IdempotencyStore;
use crate::quota::GaslessQuotaStore;
use crate::sink::GatewaySink;
use crate::ws::Hub;

/// ERC-1271 probing with or without an RPC endpoint. Without one, every
/// contract-wallet probe fails closed.
pub enum GatewayProber {
    Rpc(RpcProber),
    Noop(NoopProber),
}

impl Erc1271Prober for GatewayProber {
    async fn is_valid_signature(
        &self,
        wallet: Address,
        digest: H256,
        signature: &Bytes,
    ) -> Result<bool> {
        match self {
            Self::Rpc(prober) => prober.is_valid_signature(wallet, digest, signature).await,
            Self::Noop(prober) => prober.is_valid_signature(wallet, digest, signature).await,
        }
    }
}

/// Everything a request handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<NodeConfig>,
    pub engine: Arc<MatchingEngine>,
    pub hub: Arc<Hub>,
    pub cluster: Arc<ClusterCoordinator>,
    pub idempotency: Arc<IdempotencyStore>,
    pub quota: Arc<GaslessQuotaStore>,
    pub settler: Arc<BatchSettler<EthersSubmitter>>,
    pub store: Option<Arc<OrderStore>>,
    pub prober: Arc<GatewayProber>,
}

impl AppState {
    /// Assemble the process: connect every optional backend (degrading
    /// with a warning), then wire the engine's sink to the hub, the
    /// settlement queue, and the store mirror.
    pub async fn from_config(config: NodeConfig) -> Result<Self> {
        let config = Arc::new(config);
        let hub = Arc::new(Hub::new());
        let cluster = Arc::new(ClusterCoordinator::new(config.cluster.clone()));

        let store = match config.store.database_url.as_deref() {
            Some(url) => match OrderStore::connect(url).await {
                Ok(store) => Some(Arc::new(store)),
                Err(err) => {
                    warn!(%err, "order store unavailable, running without persistence");
                    None
                }
            },
            None => None,
        };

        let redis_url = config.store.redis_url.as_deref();
        let idempotency = Arc::new(
            IdempotencyStore::connect(
                redis_url,
                config.store.idempotency_ttl_secs,
                config.store.idempotency_max_keys,
            )
            .await,
        );
        let quota =
            Arc::new(GaslessQuotaStore::connect(redis_url, config.store.gasless_daily_cap).await);

        let intents = Arc::new(IntentStore::connect(redis_url, IDEMPOTENCY_TTL_SECS).await);
        let submitter = match EthersSubmitter::connect(&config.settlement).await {
            Ok(submitter) => submitter,
            Err(err) => {
                warn!(%err, "settlement submitter unavailable, fills will queue");
                None
            }
        };
        if submitter.is_none() {
            info!("on-chain settlement disabled");
        }
        let settler = Arc::new(BatchSettler::new(
            config.settlement.batch_size,
            submitter,
            intents,
        ));

        let prober = Arc::new(match config.settlement.rpc_url.as_deref() {
            Some(url) => GatewayProber::Rpc(RpcProber::new(url)?),
            None => GatewayProber::Noop(NoopProber),
        });

        let sink = Arc::new(GatewaySink::new(
            Arc::clone(&hub),
            Arc::clone(&settler),
            store.clone(),
        ));
        let engine = Arc::new(MatchingEngine::new(
            config.market.clone(),
            Arc::new(RiskManager::new()),
            Arc::new(SaltRegistry::new()),
            sink,
        ));

        Ok(Self {
            config,
            engine,
            hub,
            cluster,
            idempotency,
            quota,
            settler,
            store,
            prober,
        })
    }
}
