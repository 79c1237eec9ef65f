//! Leader/follower write proxying.
//!
//! Followers serve reads from their own (engine-less) state and forward
//! every mutating request to the leader over HTTP, carrying the loop-guard
//! header so a misrouted hop is refused instead of cycling. Each forwarded
//! path gets its own circuit breaker: consecutive transport or 5xx
//! failures open it, a cooldown later one half-open probe decides whether
//! it closes again.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use foresight_types::config::ClusterConfig;
use foresight_types::constants::{IDEMPOTENCY_KEY_HEADER, PROXY_LOOP_HEADER, REQUEST_ID_HEADER};
use foresight_types::{ForesightError, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-path failure counter. Time is injected so transitions are testable.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            opened_at: None,
            threshold,
            cooldown,
        }
    }

    /// Whether a request may pass right now. An open breaker past its
    /// cooldown transitions to half-open and lets one probe through.
    pub fn allow(&mut self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .map_or(Duration::MAX, |opened| now.duration_since(opened));
                if elapsed >= self.cooldown {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn on_success(&mut self) {
        self.state = BreakerState::Closed;
        self.failures = 0;
        self.opened_at = None;
    }

    pub fn on_failure(&mut self, now: Instant) {
        match self.state {
            // A failed probe reopens immediately.
            BreakerState::HalfOpen => {
                self.state = BreakerState::Open;
                self.opened_at = Some(now);
            }
            BreakerState::Closed => {
                self.failures += 1;
                if self.failures >= self.threshold {
                    self.state = BreakerState::Open;
                    self.opened_at = Some(now);
                }
            }
            BreakerState::Open => {}
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }
}

/// Response relayed back from the leader.
#[derive(Debug)]
pub struct ForwardedResponse {
    pub status: u16,
    pub body: Bytes,
    pub content_type: String,
}

/// Role-aware request routing for one node.
pub struct ClusterCoordinator {
    config: ClusterConfig,
    client: reqwest::Client,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl ClusterCoordinator {
    #[must_use]
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.config.role.is_leader()
    }

    /// A leader is always ready; a follower only once it knows its leader.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.is_leader() || self.config.leader_url.is_some()
    }

    /// Refuse a request that already crossed a proxy hop. Leaders execute
    /// forwarded requests; a follower seeing the header is a routing loop.
    pub fn reject_loop(&self) -> Result<()> {
        if self.is_leader() {
            Ok(())
        } else {
            Err(ForesightError::ProxyLoop)
        }
    }

    /// Forward a mutating request to the leader and relay its response.
    pub async fn forward_write(
        &self,
        path: &str,
        body: Bytes,
        request_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<ForwardedResponse> {
        let Some(leader) = self.config.leader_url.as_deref() else {
            return Err(ForesightError::NoLeader);
        };

        {
            let mut breakers = self.breakers.lock().await;
            let breaker = breakers.entry(path.to_string()).or_insert_with(|| {
                CircuitBreaker::new(
                    self.config.breaker_threshold,
                    Duration::from_secs(self.config.breaker_cooldown_secs),
                )
            });
            if !breaker.allow(Instant::now()) {
                return Err(ForesightError::CircuitOpen {
                    path: path.to_string(),
                });
            }
        }

        let url = format!("{}{path}", leader.trim_end_matches('/'));
        let mut request = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header(PROXY_LOOP_HEADER, "1")
            .header(REQUEST_ID_HEADER, request_id)
            .body(body);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_KEY_HEADER, key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let content_type = response
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("application/json")
                    .to_string();
                let body = response
                    .bytes()
                    .await
                    .map_err(|err| ForesightError::LeaderUnreachable {
                        reason: format!("reading leader response: {err}"),
                    })?;
                // 5xx from the leader counts against the breaker but is
                // still relayed so the client sees the real status.
                if status >= 500 {
                    self.record_failure(path).await;
                } else {
                    self.record_success(path).await;
                }
                debug!(%path, status, "forwarded write to leader");
                Ok(ForwardedResponse {
                    status,
                    body,
                    content_type,
                })
            }
            Err(err) => {
                self.record_failure(path).await;
                warn!(%path, %err, "leader forward failed");
                Err(ForesightError::LeaderUnreachable {
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn record_failure(&self, path: &str) {
        let mut breakers = self.breakers.lock().await;
        if let Some(breaker) = breakers.get_mut(path) {
            breaker.on_failure(Instant::now());
            if breaker.is_open() {
                warn!(%path, "circuit opened for leader path");
            }
        }
    }

    async fn record_success(&self, path: &str) {
        let mut breakers = self.breakers.lock().await;
        if let Some(breaker) = breakers.get_mut(path) {
            breaker.on_success();
        }
    }
}

#[cfg(test)]
mod tests {
    use foresight_types::config::NodeRole;

    use super::*;

    fn follower(leader_url: Option<&str>) -> ClusterCoordinator {
        ClusterCoordinator::new(ClusterConfig {
            role: NodeRole::Follower,
            leader_url: leader_url.map(String::from),
            ..ClusterConfig::default()
        })
    }

    #[test]
    fn leader_is_always_ready_and_accepts_forwarded_requests() {
        let leader = ClusterCoordinator::new(ClusterConfig::default());
        assert!(leader.is_leader());
        assert!(leader.ready());
        assert!(leader.reject_loop().is_ok());
    }

    #[test]
    fn follower_readiness_requires_leader_url() {
        assert!(!follower(None).ready());
        assert!(follower(Some("http://leader:8080")).ready());
    }

    #[test]
    fn follower_refuses_looped_requests() {
        let err = follower(Some("http://leader:8080"))
            .reject_loop()
            .unwrap_err();
        assert_eq!(err.wire_code(), "PROXY_LOOP");
    }

    #[tokio::test]
    async fn forward_without_leader_url_is_no_leader() {
        let err = follower(None)
            .forward_write("/v1/orders", Bytes::new(), "req-1", None)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), "NO_LEADER");
    }
}
