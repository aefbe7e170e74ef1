use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Breaker guarding one lookup provider.
pub type LookupBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Consecutive transport failures before the breaker opens.
pub const FAILURE_THRESHOLD: u32 = 5;

/// Creates a circuit breaker for an external lookup provider.
///
/// Five consecutive transport failures open it. While open, lookups are
/// rejected without touching the network; it half-opens after an exponential
/// backoff from 10s to 60s. A "not found" answer is a success here.
pub fn create_lookup_circuit_breaker() -> LookupBreaker {
    let backoff_strategy = backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));

    let failure_policy = failure_policy::consecutive_failures(FAILURE_THRESHOLD, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
