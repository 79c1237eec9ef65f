//! Circuit-breaker state transitions, driven by injected instants.

use std::time::{Duration, Instant};

use foresight_gateway::cluster::CircuitBreaker;

#[test]
fn opens_after_threshold_consecutive_failures() {
    let mut breaker = CircuitBreaker::new(3, Duration::from_secs(30));
    let now = Instant::now();
    assert!(breaker.allow(now));

    breaker.on_failure(now);
    breaker.on_failure(now);
    assert!(breaker.allow(now), "under threshold stays closed");
    breaker.on_failure(now);
    assert!(breaker.is_open());
    assert!(!breaker.allow(now));
}

#[test]
fn half_opens_after_cooldown_and_closes_on_success() {
    let mut breaker = CircuitBreaker::new(1, Duration::from_secs(30));
    let opened = Instant::now();
    breaker.on_failure(opened);
    assert!(!breaker.allow(opened + Duration::from_secs(29)));

    // Cooldown elapsed: exactly one probe passes.
    assert!(breaker.allow(opened + Duration::from_secs(30)));
    breaker.on_success();
    assert!(!breaker.is_open());
    assert!(breaker.allow(opened + Duration::from_secs(31)));
}

#[test]
fn failed_probe_reopens_for_a_fresh_cooldown() {
    let mut breaker = CircuitBreaker::new(1, Duration::from_secs(30));
    let opened = Instant::now();
    breaker.on_failure(opened);

    let probe_at = opened + Duration::from_secs(30);
    assert!(breaker.allow(probe_at));
    breaker.on_failure(probe_at);
    assert!(breaker.is_open());
    // The cooldown restarts from the failed probe, not the first open.
    assert!(!breaker.allow(opened + Duration::from_secs(45)));
    assert!(breaker.allow(probe_at + Duration::from_secs(30)));
}

#[test]
fn success_resets_the_failure_count() {
    let mut breaker = CircuitBreaker::new(3, Duration::from_secs(30));
    let now = Instant::now();
    breaker.on_failure(now);
    breaker.on_failure(now);
    breaker.on_success();
    breaker.on_failure(now);
    breaker.on_failure(now);
    assert!(!breaker.is_open());
}
