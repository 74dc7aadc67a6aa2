use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Pacing for a bounded poll: first delay, optional growth, overall deadline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollSchedule {
    interval: Duration,
    max_interval: Duration,
    multiplier: u32,
    timeout: Duration,
}

impl PollSchedule {
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            multiplier: 1,
            timeout,
        }
    }

    pub fn with_backoff(mut self, multiplier: u32, max_interval: Duration) -> Self {
        self.multiplier = multiplier.max(1);
        self.max_interval = max_interval.max(self.interval);
        self
    }

    fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(self.multiplier).min(self.max_interval)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollTimeout {
    pub elapsed: Duration,
    pub attempts: u32,
}

/// Calls `probe` until it yields a value or the schedule's deadline passes.
///
/// The probe always runs once more at the deadline before giving up, so a
/// zero timeout still gets a single attempt.
pub async fn poll_until<T, F, Fut>(schedule: &PollSchedule, mut probe: F) -> Result<T, PollTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    let deadline = start + schedule.timeout;
    let mut delay = schedule.interval;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(value) = probe().await {
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PollTimeout {
                elapsed: now.duration_since(start),
                attempts,
            });
        }

        tokio::time::sleep(delay.min(deadline - now)).await;
        delay = schedule.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_value() {
        let calls = Cell::new(0u32);
        let schedule = PollSchedule::fixed(Duration::from_millis(200), Duration::from_secs(2));
        let value = poll_until(&schedule, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { (n == 3).then_some(n) }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_with_bounded_attempts() {
        let schedule = PollSchedule::fixed(Duration::from_millis(200), Duration::from_secs(1));
        let err = poll_until(&schedule, || async { None::<()> }).await.unwrap_err();
        // t=0,200,400,600,800,1000
        assert_eq!(err.attempts, 6);
        assert!(err.elapsed >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_probes_once() {
        let schedule = PollSchedule::fixed(Duration::from_millis(200), Duration::ZERO);
        let err = poll_until(&schedule, || async { None::<()> }).await.unwrap_err();
        assert_eq!(err.attempts, 1);
    }

    #[test]
    fn test_backoff_growth_is_capped() {
        let schedule = PollSchedule::fixed(Duration::from_millis(50), Duration::from_secs(3))
            .with_backoff(2, Duration::from_millis(300));
        let d1 = schedule.next_delay(Duration::from_millis(50));
        let d2 = schedule.next_delay(d1);
        let d3 = schedule.next_delay(d2);
        let d4 = schedule.next_delay(d3);
        assert_eq!(d1, Duration::from_millis(100));
        assert_eq!(d2, Duration::from_millis(200));
        assert_eq!(d3, Duration::from_millis(300));
        assert_eq!(d4, Duration::from_millis(300));
    }
}
