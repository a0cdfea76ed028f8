//! Retry-until-threshold
//!
//! Measure up to `budget` times, publishing each attempt's text, and stop at
//! the first measurement that meets the threshold. A failing call counts as
//! an attempt with a zero reading.

use linecheck_core::{HaltReason, ItemHandle, Measurement, Result, StopSignal, Threshold};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::error_text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempts {
    /// Budget spent or threshold met; `measurement` is the last one taken
    Completed { measurement: Measurement, used: u32 },
    Halted(HaltReason),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub budget: u32,
    pub backoff: Duration,
    pub threshold: Threshold,
}

pub async fn retry_until<F, Fut>(
    handle: &ItemHandle,
    stop: &mut StopSignal,
    policy: RetryPolicy,
    mut measure: F,
) -> Attempts
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Measurement>>,
{
    let budget = policy.budget.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        if let Some(reason) = stop.reason() {
            return Attempts::Halted(reason);
        }
        let result = tokio::select! {
            result = measure() => result,
            reason = stop.halted() => return Attempts::Halted(reason),
        };
        let measurement = match result {
            Ok(measurement) => measurement,
            Err(e) => {
                warn!("{} attempt {}/{} failed: {}", handle.id(), attempt, budget, e);
                Measurement::failed(error_text(&e))
            }
        };
        debug!(
            "{} attempt {}/{}: {} ({})",
            handle.id(),
            attempt,
            budget,
            measurement.value,
            measurement.text
        );
        handle.set_text(&measurement.text);

        if policy.threshold.passes(measurement.value) || attempt >= budget {
            return Attempts::Completed {
                measurement,
                used: attempt,
            };
        }
        if let Some(reason) = stop.sleep(policy.backoff).await {
            return Attempts::Halted(reason);
        }
    }
}
