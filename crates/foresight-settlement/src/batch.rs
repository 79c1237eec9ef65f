//! Fill batching and on-chain submission.
//!
//! Each market accumulates its fills in a FIFO queue. A flush drains up
//! to `batch_size` fills into a [`FillBatch`], records a pending intent,
//! and submits the batch through a [`FillSubmitter`]. A failed submission
//! requeues the batch at the front, so every fill is queued at least once
//! until a submission succeeds; the settlement contract deduplicates by
//! match id.
//!
//! The batch id is the SHA-256 over the ordered match ids, so resubmitting
//! the same fills produces the same id.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use ethers::abi::{self, Token};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, TransactionRequest, U64, U256};
use ethers::utils::keccak256;
use foresight_types::{
    ForesightError, MarketKey, Match, Result, SettlementConfig, SettlementFill,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::intents::{BatchIntent, IntentStore};

/// Solidity signature of the settlement entry point.
const SETTLE_FILLS_SIG: &str =
    "settleFills(bytes32,(bytes16,address,address,bool,uint256,uint256,uint256,uint256,uint256)[])";

/// An ordered set of fills bound for one on-chain submission.
#[derive(Debug, Clone)]
pub struct FillBatch {
    /// SHA-256 over the ordered match ids.
    pub digest: [u8; 32],
    pub market: MarketKey,
    pub fills: Vec<SettlementFill>,
}

impl FillBatch {
    #[must_use]
    pub fn new(market: MarketKey, fills: Vec<SettlementFill>) -> Self {
        let mut hasher = Sha256::new();
        for fill in &fills {
            hasher.update(fill.match_id.0.as_bytes());
        }
        Self {
            digest: hasher.finalize().into(),
            market,
            fills,
        }
    }

    /// Hex batch id, the intent-store key.
    #[must_use]
    pub fn id(&self) -> String {
        hex::encode(self.digest)
    }
}

/// Submits one batch to the chain. Abstracted so the settler is testable
/// without an RPC endpoint.
pub trait FillSubmitter: Send + Sync {
    fn submit_batch(
        &self,
        batch: &FillBatch,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Per-market fill queues flushed on size or interval triggers.
///
/// `add_fill` is synchronous so the engine sink can call it inside the
/// writer context; flushing is async and runs from background tasks.
pub struct BatchSettler<S> {
    queues: Mutex<HashMap<MarketKey, VecDeque<SettlementFill>>>,
    /// `None` disables submission; fills still queue.
    submitter: Option<S>,
    intents: Arc<IntentStore>,
    batch_size: usize,
}

impl<S: FillSubmitter> BatchSettler<S> {
    #[must_use]
    pub fn new(batch_size: usize, submitter: Option<S>, intents: Arc<IntentStore>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            submitter,
            intents,
            batch_size: batch_size.max(1),
        }
    }

    /// Queue one fill for its market.
    pub fn add_fill(&self, fill: &Match) {
        let mut queues = self.queues.lock().expect("settler queue lock");
        queues
            .entry(fill.market.clone())
            .or_default()
            .push_back(SettlementFill::from(fill));
        debug!(match_id = %fill.id, market = %fill.market, "fill queued for settlement");
    }

    #[must_use]
    pub fn queued(&self, market: &MarketKey) -> usize {
        self.queues
            .lock()
            .expect("settler queue lock")
            .get(market)
            .map_or(0, VecDeque::len)
    }

    /// Flush one market: drain up to `batch_size` fills and submit them.
    /// Returns the number of fills submitted (0 when the queue is empty or
    /// submission is disabled).
    pub async fn flush_market(&self, market: &MarketKey) -> Result<usize> {
        let Some(submitter) = &self.submitter else {
            return Ok(0);
        };
        let fills = self.take_batch(market);
        if fills.is_empty() {
            return Ok(0);
        }
        let batch = FillBatch::new(market.clone(), fills);
        self.submit(submitter, batch).await
    }

    /// Flush every market whose queue reached the batch size. Returns the
    /// total fills submitted; individual failures are logged and the
    /// affected batch requeued.
    pub async fn flush_ready(&self) -> usize {
        self.flush_where(|len, size| len >= size).await
    }

    /// Flush every non-empty market (interval tick and shutdown path).
    pub async fn flush_all(&self) -> usize {
        self.flush_where(|len, _| len > 0).await
    }

    /// Re-submit batches whose intents survived a restart. Intents load
    /// from the store mirror; a failed resubmission requeues the fills.
    pub async fn resubmit_recovered(&self) -> usize {
        let intents = self.intents.recover().await;
        if intents.is_empty() {
            return 0;
        }
        info!(count = intents.len(), "recovered unconfirmed settlement intents");
        let mut submitted = 0usize;
        for intent in intents {
            let batch = FillBatch::new(intent.market, intent.fills);
            match &self.submitter {
                Some(submitter) => {
                    if let Ok(n) = self.submit(submitter, batch).await {
                        submitted += n;
                    }
                }
                None => self.requeue(batch),
            }
        }
        submitted
    }

    async fn submit(&self, submitter: &S, batch: FillBatch) -> Result<usize> {
        if let Err(err) = self.intents.record(&BatchIntent::from_batch(&batch)).await {
            warn!(batch_id = %batch.id(), %err, "intent record failed, submitting anyway");
        }
        match submitter.submit_batch(&batch).await {
            Ok(()) => {
                if let Err(err) = self.intents.complete(&batch.id()).await {
                    warn!(batch_id = %batch.id(), %err, "intent completion failed");
                }
                info!(
                    batch_id = %batch.id(),
                    market = %batch.market,
                    fills = batch.fills.len(),
                    "settlement batch submitted"
                );
                Ok(batch.fills.len())
            }
            Err(err) => {
                warn!(
                    batch_id = %batch.id(),
                    market = %batch.market,
                    %err,
                    "settlement submission failed, batch requeued"
                );
                self.requeue(batch);
                Err(err)
            }
        }
    }

    fn take_batch(&self, market: &MarketKey) -> Vec<SettlementFill> {
        let mut queues = self.queues.lock().expect("settler queue lock");
        let Some(queue) = queues.get_mut(market) else {
            return Vec::new();
        };
        let take = queue.len().min(self.batch_size);
        queue.drain(..take).collect()
    }

    /// Put a failed batch back at the head of its queue, order preserved.
    fn requeue(&self, batch: FillBatch) {
        let mut queues = self.queues.lock().expect("settler queue lock");
        let queue = queues.entry(batch.market).or_default();
        for fill in batch.fills.into_iter().rev() {
            queue.push_front(fill);
        }
    }

    async fn flush_where(&self, ready: impl Fn(usize, usize) -> bool) -> usize {
        let markets: Vec<MarketKey> = {
            let queues = self.queues.lock().expect("settler queue lock");
            queues
                .iter()
                .filter(|(_, q)| ready(q.len(), self.batch_size))
                .map(|(m, _)| m.clone())
                .collect()
        };
        let mut submitted = 0usize;
        for market in markets {
            if let Ok(n) = self.flush_market(&market).await {
                submitted += n;
            }
        }
        submitted
    }
}

// ---------------------------------------------------------------------------
// EthersSubmitter
// ---------------------------------------------------------------------------

/// Live submitter: abi-encodes the batch and sends it as an operator
/// transaction to the exchange contract.
#[derive(Debug, Clone)]
pub struct EthersSubmitter {
    contract: Address,
    client: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
}

impl EthersSubmitter {
    /// Build a submitter from the settlement config. Returns `Ok(None)`
    /// when the RPC endpoint, operator key or contract address is unset.
    pub async fn connect(cfg: &SettlementConfig) -> Result<Option<Self>> {
        let (Some(rpc_url), Some(operator_key), Some(contract)) =
            (&cfg.rpc_url, &cfg.operator_key, &cfg.exchange_contract)
        else {
            info!("settlement submission disabled: rpc, operator key or contract unset");
            return Ok(None);
        };

        let provider = Provider::<Http>::try_from(rpc_url.as_str()).map_err(|e| {
            ForesightError::Rpc {
                reason: format!("bad settlement rpc url: {e}"),
            }
        })?;
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| ForesightError::Rpc {
                reason: format!("chain id query failed: {e}"),
            })?;
        let wallet: LocalWallet = operator_key
            .parse()
            .map_err(|_| ForesightError::Configuration("bad operator key".into()))?;
        let contract: Address = contract.parse().map_err(|_| {
            ForesightError::Configuration(format!("bad exchange contract: {contract}"))
        })?;

        info!(%contract, chain_id = chain_id.as_u64(), "settlement submitter connected");
        Ok(Some(Self {
            contract,
            client: Arc::new(SignerMiddleware::new(
                provider,
                wallet.with_chain_id(chain_id.as_u64()),
            )),
        }))
    }
}

impl FillSubmitter for EthersSubmitter {
    async fn submit_batch(&self, batch: &FillBatch) -> Result<()> {
        let tx = TransactionRequest::new()
            .to(self.contract)
            .data(encode_settle_call(batch));
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| ForesightError::SettlementFailed {
                reason: e.to_string(),
            })?;
        let receipt = pending
            .await
            .map_err(|e| ForesightError::SettlementFailed {
                reason: e.to_string(),
            })?
            .ok_or_else(|| ForesightError::SettlementFailed {
                reason: "transaction dropped from mempool".into(),
            })?;
        if receipt.status == Some(U64::one()) {
            Ok(())
        } else {
            Err(ForesightError::SettlementFailed {
                reason: format!("reverted in block {:?}", receipt.block_number),
            })
        }
    }
}

fn fill_token(fill: &SettlementFill) -> Token {
    Token::Tuple(vec![
        Token::FixedBytes(fill.match_id.0.as_bytes().to_vec()),
        Token::Address(fill.maker),
        Token::Address(fill.taker),
        Token::Bool(fill.taker_is_buy),
        Token::Uint(U256::from(fill.outcome_index)),
        Token::Uint(U256::from(fill.amount.raw())),
        Token::Uint(U256::from(fill.price.raw())),
        Token::Uint(U256::from(fill.maker_fee.raw())),
        Token::Uint(U256::from(fill.taker_fee.raw())),
    ])
}

/// `selector || abi.encode(batchId, fills[])`.
fn encode_settle_call(batch: &FillBatch) -> Bytes {
    let selector = &keccak256(SETTLE_FILLS_SIG.as_bytes())[..4];
    let args = abi::encode(&[
        Token::FixedBytes(batch.digest.to_vec()),
        Token::Array(batch.fills.iter().map(fill_token).collect()),
    ]);
    let mut data = Vec::with_capacity(4 + args.len());
    data.extend_from_slice(selector);
    data.extend_from_slice(&args);
    Bytes::from(data)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::Utc;
    use ethers::types::Address;
    use foresight_types::{Amount, MatchId, OrderId, OrderSide, Price, Usdc};

    use super::*;

    fn fill(market: &str) -> Match {
        Match {
            id: MatchId::new(),
            market: MarketKey::from(market),
            outcome_index: 0,
            maker_order_id: OrderId::new(),
            maker: Address::repeat_byte(0xaa),
            taker_order_id: OrderId::new(),
            taker: Address::repeat_byte(0xbb),
            taker_side: OrderSide::Buy,
            matched_amount: Amount(4_000_000_000_000_000_000),
            matched_price: Price(500_000),
            maker_fee: Usdc(0),
            taker_fee: Usdc(5_000),
            executed_at: Utc::now(),
        }
    }

    /// Counts submissions; fails while `fail` is set.
    #[derive(Default)]
    struct FlakySubmitter {
        fail: AtomicBool,
        submitted: AtomicUsize,
    }

    impl FillSubmitter for &FlakySubmitter {
        async fn submit_batch(&self, batch: &FillBatch) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ForesightError::SettlementFailed {
                    reason: "rpc down".into(),
                });
            }
            self.submitted.fetch_add(batch.fills.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn settler(submitter: &FlakySubmitter, batch_size: usize) -> BatchSettler<&FlakySubmitter> {
        BatchSettler::new(batch_size, Some(submitter), Arc::new(IntentStore::in_memory(600)))
    }

    #[test]
    fn batch_id_is_order_sensitive_sha256() {
        let a = SettlementFill::from(&fill("m"));
        let b = SettlementFill::from(&fill("m"));
        let fwd = FillBatch::new(MarketKey::from("m"), vec![a.clone(), b.clone()]);
        let same = FillBatch::new(MarketKey::from("m"), vec![a.clone(), b.clone()]);
        let rev = FillBatch::new(MarketKey::from("m"), vec![b, a]);
        assert_eq!(fwd.id(), same.id());
        assert_ne!(fwd.id(), rev.id());
        assert_eq!(fwd.id().len(), 64);
    }

    #[tokio::test]
    async fn flush_drains_up_to_batch_size() {
        let sub = FlakySubmitter::default();
        let settler = settler(&sub, 2);
        let market = MarketKey::from("m");
        for _ in 0..3 {
            settler.add_fill(&fill("m"));
        }

        assert_eq!(settler.flush_market(&market).await.unwrap(), 2);
        assert_eq!(settler.queued(&market), 1);
        assert_eq!(settler.flush_market(&market).await.unwrap(), 1);
        assert_eq!(settler.queued(&market), 0);
        assert_eq!(sub.submitted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_submission_requeues_in_order() {
        let sub = FlakySubmitter::default();
        sub.fail.store(true, Ordering::SeqCst);
        let settler = settler(&sub, 10);
        let market = MarketKey::from("m");
        settler.add_fill(&fill("m"));
        settler.add_fill(&fill("m"));

        assert!(settler.flush_market(&market).await.is_err());
        assert_eq!(settler.queued(&market), 2, "fills retained on failure");

        // Recovery submits the same fills.
        sub.fail.store(false, Ordering::SeqCst);
        assert_eq!(settler.flush_market(&market).await.unwrap(), 2);
        assert_eq!(settler.queued(&market), 0);
        assert_eq!(sub.submitted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn flush_ready_only_triggers_full_queues() {
        let sub = FlakySubmitter::default();
        let settler = settler(&sub, 2);
        settler.add_fill(&fill("full"));
        settler.add_fill(&fill("full"));
        settler.add_fill(&fill("short"));

        assert_eq!(settler.flush_ready().await, 2);
        assert_eq!(settler.queued(&MarketKey::from("short")), 1);

        // The interval path drains everything.
        assert_eq!(settler.flush_all().await, 1);
        assert_eq!(settler.queued(&MarketKey::from("short")), 0);
    }

    #[tokio::test]
    async fn disabled_submitter_keeps_fills_queued() {
        let settler: BatchSettler<&FlakySubmitter> =
            BatchSettler::new(2, None, Arc::new(IntentStore::in_memory(600)));
        let market = MarketKey::from("m");
        settler.add_fill(&fill("m"));
        assert_eq!(settler.flush_market(&market).await.unwrap(), 0);
        assert_eq!(settler.queued(&market), 1);
    }

    #[test]
    fn settle_calldata_has_selector_and_tuple_payload() {
        let batch = FillBatch::new(
            MarketKey::from("m"),
            vec![SettlementFill::from(&fill("m"))],
        );
        let data = encode_settle_call(&batch);
        assert_eq!(&data[..4], &keccak256(SETTLE_FILLS_SIG.as_bytes())[..4]);
        // batchId head word carries the digest.
        assert_eq!(&data[4..36], batch.digest.as_slice());
    }
}
