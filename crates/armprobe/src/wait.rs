//! Wait Mechanisms
//!
//! Bounded polling and network-idle tracking. Every wait in the probe is a
//! poll with a fixed interval against a deadline; nothing blocks unbounded.

use crate::result::{ProbeError, ProbeResult};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (30 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Network idle threshold (500ms without requests)
pub const NETWORK_IDLE_THRESHOLD_MS: u64 = 500;

// =============================================================================
// LOAD STATE
// =============================================================================

/// Page load states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadState {
    /// Wait for the `load` event to fire
    #[default]
    Load,
    /// Wait for `DOMContentLoaded` event
    DomContentLoaded,
    /// Wait for network to be idle (no requests for 500ms)
    NetworkIdle,
}

impl LoadState {
    /// Get the event name for this load state
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "DOMContentLoaded",
            Self::NetworkIdle => "networkidle",
        }
    }

    /// `document.readyState` values that satisfy this state
    #[must_use]
    pub const fn ready_states(&self) -> &'static [&'static str] {
        match self {
            Self::Load | Self::NetworkIdle => &["complete"],
            Self::DomContentLoaded => &["interactive", "complete"],
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The same options with the timeout cut to what is left since `started`
    #[must_use]
    pub fn remaining_since(self, started: Instant) -> Self {
        let left = self.timeout().saturating_sub(started.elapsed());
        self.with_timeout(left.as_millis() as u64)
    }
}

// =============================================================================
// POLLING
// =============================================================================

/// Poll `check` until it yields `Some`, or fail with [`ProbeError::Timeout`].
///
/// `check` runs at least once even with a zero timeout. Errors from `check`
/// abort the wait immediately.
pub async fn poll_until<T, F, Fut>(
    options: WaitOptions,
    waited_for: &str,
    mut check: F,
) -> ProbeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeResult<Option<T>>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = check().await? {
            return Ok(value);
        }
        if start.elapsed() >= options.timeout() {
            return Err(ProbeError::Timeout {
                ms: options.timeout_ms,
                waited_for: waited_for.to_string(),
            });
        }
        tokio::time::sleep(options.poll_interval()).await;
    }
}

// =============================================================================
// NETWORK ACTIVITY
// =============================================================================

#[derive(Debug)]
struct ActivityState {
    in_flight: HashSet<String>,
    last_activity: Instant,
}

/// In-flight request tracker shared with the CDP listener tasks
#[derive(Debug, Clone)]
pub struct NetworkActivity {
    state: Arc<Mutex<ActivityState>>,
}

impl Default for NetworkActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkActivity {
    /// Create a tracker with no requests in flight
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ActivityState {
                in_flight: HashSet::new(),
                last_activity: Instant::now(),
            })),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ActivityState) -> R) -> R {
        // a poisoned lock only means a listener panicked mid-update
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Record a request leaving the page
    pub fn request_started(&self, request_id: impl Into<String>) {
        self.with_state(|s| {
            s.in_flight.insert(request_id.into());
            s.last_activity = Instant::now();
        });
    }

    /// Record a request finishing or failing
    pub fn request_finished(&self, request_id: &str) {
        self.with_state(|s| {
            s.in_flight.remove(request_id);
            s.last_activity = Instant::now();
        });
    }

    /// Forget everything in flight (e.g. on a new navigation)
    pub fn reset(&self) {
        self.with_state(|s| {
            s.in_flight.clear();
            s.last_activity = Instant::now();
        });
    }

    /// Requests currently in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.with_state(|s| s.in_flight.len())
    }

    /// Nothing in flight and nothing observed for `quiet`
    #[must_use]
    pub fn is_idle(&self, quiet: Duration) -> bool {
        self.with_state(|s| s.in_flight.is_empty() && s.last_activity.elapsed() >= quiet)
    }

    /// Wait until the network has been quiet for [`NETWORK_IDLE_THRESHOLD_MS`]
    pub async fn wait_for_idle(&self, options: WaitOptions) -> ProbeResult<()> {
        let quiet = Duration::from_millis(NETWORK_IDLE_THRESHOLD_MS);
        poll_until(options, "network idle", move || async move {
            Ok(self.is_idle(quiet).then_some(()))
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod load_state_tests {
        use super::*;

        #[test]
        fn test_event_names() {
            assert_eq!(LoadState::Load.to_string(), "load");
            assert_eq!(LoadState::DomContentLoaded.event_name(), "DOMContentLoaded");
            assert_eq!(LoadState::NetworkIdle.event_name(), "networkidle");
        }

        #[test]
        fn test_ready_states() {
            assert!(LoadState::DomContentLoaded.ready_states().contains(&"interactive"));
            assert_eq!(LoadState::Load.ready_states(), &["complete"]);
        }

        #[test]
        fn test_options_builder() {
            let opts = WaitOptions::new().with_timeout(5000).with_poll_interval(10);
            assert_eq!(opts.timeout(), Duration::from_millis(5000));
            assert_eq!(opts.poll_interval(), Duration::from_millis(10));
            assert_eq!(WaitOptions::default().poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }

        #[test]
        fn test_remaining_since_shares_one_deadline() {
            let opts = WaitOptions::new().with_timeout(200).with_poll_interval(10);
            let started = Instant::now() - Duration::from_millis(150);
            let rest = opts.remaining_since(started);
            assert!(rest.timeout_ms <= 50);
            assert_eq!(rest.poll_interval_ms, 10);

            let spent = Instant::now() - Duration::from_millis(500);
            assert_eq!(opts.remaining_since(spent).timeout_ms, 0);
        }

        #[tokio::test]
        async fn test_idle_wait_after_slow_poll_stays_within_budget() {
            let activity = NetworkActivity::new();
            activity.request_started("r1");
            let opts = WaitOptions::new().with_timeout(80).with_poll_interval(5);
            let started = Instant::now();
            tokio::time::sleep(Duration::from_millis(60)).await;
            let result = activity.wait_for_idle(opts.remaining_since(started)).await;
            assert!(result.unwrap_err().is_timeout());
            assert!(started.elapsed() < Duration::from_millis(150));
        }
    }

    mod poll_tests {
        use super::*;
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[tokio::test]
        async fn test_poll_until_succeeds_after_retries() {
            let counter = AtomicUsize::new(0);
            let calls = &counter;
            let opts = WaitOptions::new().with_timeout(1000).with_poll_interval(1);
            let value = poll_until(opts, "third call", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok((n >= 3).then_some(n))
            })
            .await
            .unwrap();
            assert_eq!(value, 3);
        }

        #[tokio::test]
        async fn test_poll_until_times_out() {
            let opts = WaitOptions::new().with_timeout(20).with_poll_interval(5);
            let err = poll_until::<(), _, _>(opts, "never", || async { Ok(None) })
                .await
                .unwrap_err();
            assert!(err.is_timeout());
            assert!(err.to_string().contains("never"));
        }

        #[tokio::test]
        async fn test_poll_until_checks_once_with_zero_timeout() {
            let opts = WaitOptions::new().with_timeout(0);
            let value = poll_until(opts, "now", || async { Ok(Some(7)) }).await.unwrap();
            assert_eq!(value, 7);
        }

        #[tokio::test]
        async fn test_poll_until_propagates_errors() {
            let opts = WaitOptions::new().with_timeout(1000);
            let err = poll_until::<(), _, _>(opts, "x", || async {
                Err(ProbeError::script("boom"))
            })
            .await
            .unwrap_err();
            assert!(!err.is_timeout());
        }
    }

    mod network_activity_tests {
        use super::*;

        #[test]
        fn test_in_flight_counting() {
            let activity = NetworkActivity::new();
            activity.request_started("1");
            activity.request_started("2");
            activity.request_started("2");
            assert_eq!(activity.in_flight(), 2);
            activity.request_finished("1");
            assert_eq!(activity.in_flight(), 1);
            assert!(!activity.is_idle(Duration::ZERO));
            activity.reset();
            assert_eq!(activity.in_flight(), 0);
        }

        #[test]
        fn test_idle_requires_quiet_period() {
            let activity = NetworkActivity::new();
            activity.request_started("a");
            activity.request_finished("a");
            assert!(!activity.is_idle(Duration::from_secs(60)));
            assert!(activity.is_idle(Duration::ZERO));
        }

        #[tokio::test]
        async fn test_wait_for_idle_times_out_while_busy() {
            let activity = NetworkActivity::new();
            activity.request_started("pending");
            let err = activity
                .wait_for_idle(WaitOptions::new().with_timeout(30).with_poll_interval(5))
                .await
                .unwrap_err();
            assert!(err.is_timeout());
        }

        #[tokio::test]
        async fn test_wait_for_idle_succeeds_when_quiet() {
            let activity = NetworkActivity::new();
            let opts = WaitOptions::new()
                .with_timeout(NETWORK_IDLE_THRESHOLD_MS * 4)
                .with_poll_interval(10);
            activity.wait_for_idle(opts).await.unwrap();
        }
    }
}
