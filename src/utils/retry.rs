//! Retry utilities for runtime reconnects.
//!
//! Uses `backon` with a constant delay and no attempt ceiling: an endpoint
//! that comes back after any number of failed attempts is picked up again.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tracing::{info, warn};

/// Fixed-interval backoff with no maximum number of attempts.
pub fn reconnect_backoff(delay: Duration) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(delay)
        .without_max_times()
}

/// Call `connect` until it succeeds, waiting `delay` between attempts.
///
/// The first attempt is made immediately. Failures are logged and never
/// returned.
pub async fn reconnect_forever<T, E, F, Fut>(endpoint: &str, delay: Duration, mut connect: F) -> T
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    info!(endpoint = %endpoint, "Trying to reconnect");

    loop {
        let attempt = (|| connect())
            .retry(reconnect_backoff(delay))
            .notify(|err: &E, dur: Duration| {
                warn!(
                    endpoint = %endpoint,
                    error = %err,
                    delay_ms = dur.as_millis() as u64,
                    "Reconnect failed, retrying"
                );
            })
            .await;

        match attempt {
            Ok(connection) => return connection,
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Reconnect backoff ended, starting over");
            }
        }
    }
}
