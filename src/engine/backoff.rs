use std::time::Duration;

const BASE_DELAY_MS: u64 = 5;

/// Delay between commit retries: exponential over the attempt number with a
/// full-width random jitter so concurrent writers for the same user fan out
/// instead of colliding again in lockstep.
pub async fn sleep_jittered(attempt: u32) {
    let ceiling = BASE_DELAY_MS << attempt.min(6);
    let jitter = rand::random_range(0..=ceiling);

    tokio::time::sleep(Duration::from_millis(ceiling + jitter)).await;
}
