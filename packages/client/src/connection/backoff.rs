//! Reconnection policy.
//!
//! Pure functions deciding whether and when to retry, kept free of side
//! effects so the connection manager's schedule can be tested directly.

use std::time::Duration;

use crate::infrastructure::transport::DisconnectReason;

/// Delay before the given reconnection attempt (1-based).
///
/// `min(base * 2^(attempt-1), cap)`; attempt `0` is treated like attempt `1`.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(cap, |delay| delay.min(cap))
}

/// Check if the client should attempt to reconnect.
///
/// # Arguments
///
/// * `reason` - Why the link went away (`None` for a failed connect)
/// * `current_attempt` - Reconnection attempts already scheduled since the last success
/// * `max_attempts` - The maximum number of reconnection attempts allowed
///
/// # Returns
///
/// `true` if reconnection should be attempted, `false` otherwise
pub fn should_attempt_reconnect(
    reason: Option<&DisconnectReason>,
    current_attempt: u32,
    max_attempts: u32,
) -> bool {
    // Never reconnect after an explicit local disconnect
    if reason.is_some_and(DisconnectReason::is_local) {
        return false;
    }

    current_attempt < max_attempts
}
