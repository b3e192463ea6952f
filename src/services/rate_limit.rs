use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token bucket shared by every caller of one upstream API.
///
/// Holds at most `capacity` tokens and regains one every `refill_every`.
/// A zero interval disables limiting.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    capacity: u32,
    refill_every: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    pub(crate) fn new(capacity: u32, refill_every: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_every,
            state: Mutex::new(BucketState { tokens: capacity, last_refill: Instant::now() }),
        }
    }

    #[cfg(test)]
    pub(crate) fn unlimited() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Waits until a token is available and takes it.
    pub(crate) async fn acquire(&self) {
        if self.refill_every.is_zero() {
            return;
        }

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens > 0 {
                    state.tokens -= 1;
                    return;
                }
                self.refill_every.saturating_sub(state.last_refill.elapsed())
            };

            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed();
        let earned = elapsed.as_nanos() / self.refill_every.as_nanos();
        if earned == 0 {
            return;
        }

        let earned = u32::try_from(earned).unwrap_or(u32::MAX);
        state.tokens = state.tokens.saturating_add(earned).min(self.capacity);
        if state.tokens == self.capacity {
            state.last_refill = Instant::now();
        } else {
            state.last_refill += self.refill_every * earned;
        }
    }
}
