use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ConductorError, ConductorResult};

/// Per-step timeout and retry policy, generalized from a hand-inlined
/// exponential backoff loop into a reusable value so every step in both
/// orchestrators shares one retry implementation instead of duplicating
/// the loop at each call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, timeout: Duration) -> Self {
        Self {
            max_retries,
            timeout,
        }
    }

    pub async fn run<F, Fut, T>(&self, step_name: &str, mut f: F) -> ConductorResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ConductorResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match tokio::time::timeout(self.timeout, f()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_secs(2u64.saturating_pow(attempt));
                    warn!(step = step_name, attempt, error = %e, "step failed, retrying after backoff");
                    tokio::time::sleep(backoff).await;
                }
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) if attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_secs(2u64.saturating_pow(attempt));
                    warn!(step = step_name, attempt, "step timed out, retrying after backoff");
                    tokio::time::sleep(backoff).await;
                }
                Err(_elapsed) => {
                    return Err(ConductorError::transient(
                        step_name,
                        format!("step exceeded timeout of {:?} after {attempt} retries", self.timeout),
                    ))
                }
            }
        }
    }
}
