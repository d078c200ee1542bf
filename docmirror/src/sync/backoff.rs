use rand::Rng;
use std::future::Future;
use std::time::Duration;

use docmirror_core::DriveError;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = attempt.min(16);
        let exp = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        let delay_ms = if self.jitter {
            rng.gen_range(0..=exp)
        } else {
            exp
        };
        Duration::from_millis(delay_ms)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` attempts have been made.
    pub async fn retry<T, F, Fut>(
        &self,
        max_attempts: u32,
        what: &str,
        mut op: F,
    ) -> Result<T, DriveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DriveError>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        "{what} failed (attempt {}/{max_attempts}): {err}; retrying in {delay:?}",
                        attempt + 1
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
