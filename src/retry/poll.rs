use std::future::Future;
use std::time::Duration;

/// Bounded polling: at most `attempts` probes, `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Enough attempts to cover `timeout` when probing every `interval`.
    pub fn within(timeout: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let attempts = timeout.as_millis().div_ceil(interval_ms).max(1);
        Self {
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            interval,
        }
    }
}

/// Typed result of a polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Found(T),
    Exhausted { attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Exhausted { .. } => None,
        }
    }
}

/// Probe until it yields a value or the attempt budget runs out.
///
/// `probe(attempt)` gets a 1-based attempt number. `Ok(None)` means "not yet";
/// an `Err` aborts the loop immediately. No sleep follows the last attempt.
pub async fn poll_until<T, E, Probe, Fut>(
    policy: &PollPolicy,
    mut probe: Probe,
) -> Result<PollOutcome<T>, E>
where
    Probe: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(value) = probe(attempt).await? {
            return Ok(PollOutcome::Found(value));
        }
        if attempt < attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Ok(PollOutcome::Exhausted { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_rounds_up() {
        let policy = PollPolicy::within(Duration::from_millis(10_000), Duration::from_millis(300));
        assert_eq!(policy.attempts, 34);
        let policy = PollPolicy::within(Duration::from_millis(0), Duration::from_millis(300));
        assert_eq!(policy.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_finds_value_on_third_attempt() {
        let policy = PollPolicy::new(5, Duration::from_millis(100));
        let start = tokio::time::Instant::now();
        let outcome: Result<_, ()> =
            poll_until(&policy, |n| async move { Ok((n == 3).then_some(n)) }).await;
        assert_eq!(outcome, Ok(PollOutcome::Found(3)));
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_reports_exhaustion() {
        let policy = PollPolicy::new(4, Duration::from_millis(50));
        let start = tokio::time::Instant::now();
        let outcome: Result<PollOutcome<()>, ()> =
            poll_until(&policy, |_| async { Ok(None) }).await;
        assert_eq!(outcome, Ok(PollOutcome::Exhausted { attempts: 4 }));
        assert_eq!(start.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test]
    async fn poll_stops_on_error() {
        let policy = PollPolicy::new(4, Duration::from_millis(1));
        let mut calls = 0;
        let outcome: Result<PollOutcome<()>, &str> = poll_until(&policy, |_| {
            calls += 1;
            async { Err("gone") }
        })
        .await;
        assert_eq!(outcome, Err("gone"));
        assert_eq!(calls, 1);
    }
}
