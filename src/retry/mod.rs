//! Bounded retries.
//!
//! Two flavours live here: [`retry_request`] re-sends control-plane HTTP
//! requests that failed transiently, and [`poll_until`] re-probes the page
//! until an element shows up.

mod poll;
mod policy;

pub use poll::{PollOutcome, PollPolicy, poll_until};
pub use policy::RetryPolicy;
pub(crate) use policy::millis;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::future::Future;
use std::time::{Duration, SystemTime};

/// Why a control-plane request is worth sending again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transient {
    /// The backend could not be reached at all.
    Unreachable,
    /// The client gave up waiting.
    TimedOut,
    /// 408 or 429.
    Throttled,
    /// 5xx.
    ServerFault,
}

impl Transient {
    pub fn label(self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::TimedOut => "timed_out",
            Self::Throttled => "throttled",
            Self::ServerFault => "server_fault",
        }
    }
}

/// Verdict on one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Send again, after the server's requested delay if it gave one.
    Again {
        cause: Transient,
        not_before: Option<Duration>,
    },
    Done,
}

/// Passed to the observer right before a retry sleeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryNotice {
    pub attempt: u32,
    pub delay: Duration,
    pub cause: Transient,
}

/// Delay requested by a `Retry-After` header, in seconds or as an HTTP date.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = httpdate::parse_http_date(raw).ok()?;
    Some(
        when.duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

/// Transport failures: timeouts and unreachable hosts are worth another try.
pub fn classify_error(error: &reqwest::Error) -> Verdict {
    let cause = if error.is_timeout() {
        Transient::TimedOut
    } else if error.is_connect() || error.is_request() {
        Transient::Unreachable
    } else {
        return Verdict::Done;
    };
    Verdict::Again {
        cause,
        not_before: None,
    }
}

/// Throttling and server faults are retried, after `Retry-After` if given.
pub fn classify_response(response: &reqwest::Response) -> Verdict {
    let cause = match response.status() {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => Transient::Throttled,
        s if s.is_server_error() => Transient::ServerFault,
        _ => return Verdict::Done,
    };
    Verdict::Again {
        cause,
        not_before: retry_after(response.headers()),
    }
}

/// Run `send` until `classify` says done or `policy.max_attempts` is spent.
///
/// `send` receives the 1-based attempt number. The last result is returned
/// whatever it was.
pub async fn retry_request<T, E, Op, Fut, Classify, Observe>(
    policy: &RetryPolicy,
    mut send: Op,
    mut classify: Classify,
    mut observe: Observe,
) -> Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Classify: FnMut(&Result<T, E>) -> Verdict,
    Observe: FnMut(RetryNotice),
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = send(attempt).await;
        if attempt >= attempts {
            return result;
        }
        let Verdict::Again { cause, not_before } = classify(&result) else {
            return result;
        };
        let delay = policy.with_jitter(not_before.unwrap_or_else(|| policy.backoff_delay(attempt)));
        observe(RetryNotice {
            attempt,
            delay,
            cause,
        });
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
