use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Exponential backoff with optional jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(800),
            jitter_max: Some(Duration::from_millis(25)),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_max: None,
        }
    }

    fn delay(&self, backoff: Duration) -> Duration {
        match self.jitter_max {
            Some(jitter) if !jitter.is_zero() => {
                let extra = rand::random::<u64>() % (jitter.as_millis() as u64 + 1);
                backoff + Duration::from_millis(extra)
            }
            _ => backoff,
        }
    }
}

/// Run `f` until it succeeds or the policy's attempts are used up; the last
/// error is returned.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, label: &str, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut backoff = policy.base_backoff;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= policy.max_attempts.max(1) => return Err(e),
            Err(e) => {
                debug!(label, attempt, error = %e, "Attempt failed, backing off");
                tokio::time::sleep(policy.delay(backoff)).await;
                backoff = std::cmp::min(backoff * 2, policy.max_backoff);
            }
        }
    }
}
