//! Joining a node into the anchor's cluster.
//!
//! Four steps, each its own failure point:
//!
//! 1. Fetch join info from the anchor and take the first node's
//!    certificate fingerprint (`JoinInfo` on failure).
//! 2. Submit the join to the target (`Join` on failure, with the raw
//!    response body attached).
//! 3. Wait for the remote side to converge.
//! 4. Verify the target reports the expected cluster
//!    (`JoinVerification` otherwise).

use tracing::{info, warn};

use crate::api::{ApiError, ControlPlane, JoinRequest};
use crate::auth::Secret;
use crate::converge::{Convergence, ConvergencePolicy, await_membership};
use crate::error::{ClusterError, ClusterResult};
use crate::probe::probe;
use crate::types::{Endpoint, JoinCredential, MembershipState};

/// Joins a target node into the cluster its anchor belongs to.
pub struct ClusterJoiner<'a, C> {
    control: &'a C,
    policy: ConvergencePolicy,
}

impl<'a, C: ControlPlane> ClusterJoiner<'a, C> {
    pub fn new(control: &'a C, policy: ConvergencePolicy) -> Self {
        Self { control, policy }
    }

    /// Fetch single-use join credentials from the anchor.
    pub async fn fetch_credential(
        &self,
        anchor: &Endpoint,
        anchor_hostname: &str,
    ) -> ClusterResult<JoinCredential> {
        let info = self.control.join_info(anchor).await.map_err(|e| {
            e.into_cluster_error(|e| match e {
                ApiError::Decode(message) => ClusterError::Schema {
                    operation: "join info",
                    message,
                },
                other => ClusterError::JoinInfo {
                    status: other.status(),
                    body: other.body(),
                },
            })
        })?;

        let first = info.nodelist.first().ok_or_else(|| ClusterError::Schema {
            operation: "join info",
            message: "empty nodelist".to_string(),
        })?;

        Ok(JoinCredential {
            trust_fingerprint: first.pve_fp.clone(),
            anchor_hostname: anchor_hostname.to_string(),
        })
    }

    /// Join `target` into cluster `expected` and wait for it to show up.
    ///
    /// Verification probes the target with the anchor's session: the
    /// target's own session does not survive the join.
    pub async fn join(
        &self,
        anchor: &Endpoint,
        target: &Endpoint,
        anchor_hostname: &str,
        root_password: &Secret,
        expected: &str,
    ) -> ClusterResult<MembershipState> {
        let credential = self.fetch_credential(anchor, anchor_hostname).await?;

        let request = JoinRequest {
            fingerprint: credential.trust_fingerprint,
            hostname: credential.anchor_hostname,
            password: root_password.clone(),
        };

        info!(host = %target, anchor = %anchor_hostname, cluster = %expected, "joining cluster");
        self.control
            .join_cluster(target, &request)
            .await
            .map_err(|e| e.into_cluster_error(|e| ClusterError::Join { body: e.body() }))?;

        let verifier = target.with_auth(anchor.auth());
        match await_membership(&self.policy, expected, || probe(self.control, &verifier)).await {
            Convergence::Reached(state) => {
                info!(host = %target, cluster = %expected, "node joined cluster");
                Ok(state)
            }
            Convergence::Diverged(state) => {
                warn!(host = %target, %state, cluster = %expected, "node joined a different cluster");
                Err(ClusterError::JoinVerification {
                    expected: expected.to_string(),
                    observed: Some(state),
                })
            }
            Convergence::TimedOut {
                last_observed,
                waited,
            } => {
                warn!(host = %target, ?waited, cluster = %expected, "node did not report membership in time");
                Err(ClusterError::JoinVerification {
                    expected: expected.to_string(),
                    observed: last_observed,
                })
            }
        }
    }
}
