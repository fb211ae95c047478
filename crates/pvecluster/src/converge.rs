//! Bounded wait for a remote membership change to become visible.
//!
//! Cluster creation and join return before the control plane reports the
//! new membership. Instead of sleeping a fixed time, re-probe at a short
//! interval until the expected state shows up or the deadline passes.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::error::ClusterResult;
use crate::types::MembershipState;

/// Timing of the convergence poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergencePolicy {
    /// Wait before the first probe.
    pub initial_delay: Duration,
    /// Wait between probes.
    pub interval: Duration,
    /// Upper bound on the whole wait, initial delay included.
    pub timeout: Duration,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(120),
        }
    }
}

impl ConvergencePolicy {
    /// Probe once, immediately, with no waiting.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            interval: Duration::ZERO,
            timeout: Duration::ZERO,
        }
    }
}

/// How a convergence wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    /// The node reports membership of the expected cluster.
    Reached(MembershipState),
    /// The node reports membership of a different cluster. Terminal.
    Diverged(MembershipState),
    /// Deadline passed. `last_observed` is `None` if no probe succeeded.
    TimedOut {
        last_observed: Option<MembershipState>,
        waited: Duration,
    },
}

/// Poll `probe` until it reports `Member(expected)`.
///
/// Probe failures are expected while the remote side restarts its services
/// and only count as "not yet converged".
pub async fn await_membership<F, Fut>(
    policy: &ConvergencePolicy,
    expected: &str,
    mut probe: F,
) -> Convergence
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClusterResult<MembershipState>>,
{
    let started = Instant::now();
    // A timeout past the clock's range never expires.
    let deadline = started.checked_add(policy.timeout);
    let mut last_observed = None;
    let mut attempts = 0u32;

    sleep(policy.initial_delay).await;

    loop {
        attempts += 1;
        match probe().await {
            Ok(state) if state.is_member_of(expected) => {
                debug!(attempts, waited = ?started.elapsed(), "membership converged");
                return Convergence::Reached(state);
            }
            Ok(state @ MembershipState::Member(_)) => return Convergence::Diverged(state),
            Ok(state) => {
                debug!(attempts, %state, "membership not converged yet");
                last_observed = Some(state);
            }
            Err(e) => debug!(attempts, error = %e, "convergence probe failed"),
        }

        let now = Instant::now();
        let wait = match deadline {
            Some(deadline) if now >= deadline => {
                return Convergence::TimedOut {
                    last_observed,
                    waited: started.elapsed(),
                };
            }
            Some(deadline) => policy.interval.min(deadline - now),
            None => policy.interval,
        };
        sleep(wait).await;
    }
}
