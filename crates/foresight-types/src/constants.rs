//! System-wide constants for the Foresight Market trading backend.

/// Decimal places in a fixed-point price (USDC per outcome share).
pub const PRICE_DECIMALS: u32 = 6;

/// Decimal places in a fixed-point outcome-token amount.
pub const AMOUNT_DECIMALS: u32 = 18;

/// Decimal places in a USDC value (notional, fees, reservations).
pub const USDC_DECIMALS: u32 = 6;

/// One whole unit of amount (10^18).
pub const AMOUNT_ONE: u128 = 1_000_000_000_000_000_000;

/// One whole USDC (10^6).
pub const USDC_ONE: u128 = 1_000_000;

/// Fee basis-point denominator.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// EIP-712 domain name every order is signed under.
pub const EIP712_DOMAIN_NAME: &str = "Foresight Market";

/// EIP-712 domain version.
pub const EIP712_DOMAIN_VERSION: &str = "1";

/// ERC-1271 magic value returned by a contract wallet for a valid signature.
pub const ERC1271_MAGIC: [u8; 4] = [0x16, 0x26, 0xba, 0x7e];

/// HTTP header a follower attaches when forwarding a write to the leader.
/// Inbound requests already carrying it are refused (proxy loop guard).
pub const PROXY_LOOP_HEADER: &str = "x-foresight-proxy";

/// HTTP header marking a response that was relayed through a follower.
pub const PROXIED_RESPONSE_HEADER: &str = "x-foresight-proxied";

/// Request correlation header, propagated across the proxy hop.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Idempotency key header honored on mutating routes.
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

/// Default number of aggregated price levels in a depth snapshot.
pub const DEFAULT_DEPTH_LEVELS: usize = 20;

/// Maximum price levels a depth query may request.
pub const MAX_DEPTH_LEVELS: usize = 200;

/// Maximum matches retained in a book's trade tape.
pub const TRADE_TAPE_CAPACITY: usize = 1_000;

/// Default expiry-sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// WebSocket liveness sweep interval in seconds.
pub const WS_SWEEP_INTERVAL_SECS: u64 = 30;

/// WebSocket clients silent longer than this are force-closed.
pub const WS_STALE_AFTER_SECS: i64 = 60;

/// Maximum channels a single WebSocket client may hold.
pub const WS_MAX_SUBSCRIPTIONS: usize = 100;

/// Default idempotency cache TTL in seconds.
pub const IDEMPOTENCY_TTL_SECS: u64 = 600;

/// Hard cap on in-process idempotency keys before oldest-first eviction.
pub const IDEMPOTENCY_MAX_KEYS: usize = 50_000;

/// In-process gasless-quota micro-cache lifetime in milliseconds.
pub const QUOTA_MICRO_CACHE_MS: i64 = 2_000;

/// Default fills per settlement batch before a flush is forced.
pub const DEFAULT_SETTLEMENT_BATCH_SIZE: usize = 50;

/// Default settlement flush interval in seconds.
pub const DEFAULT_SETTLEMENT_FLUSH_SECS: u64 = 15;

/// Consecutive proxy failures before a path's circuit breaker opens.
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 5;

/// Circuit-breaker cooldown in seconds before a half-open probe.
pub const DEFAULT_BREAKER_COOLDOWN_SECS: u64 = 30;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Foresight";
