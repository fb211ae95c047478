//! Cluster creation on the anchor node.

use tracing::info;

use crate::api::{ApiError, ControlPlane, CreateClusterRequest};
use crate::converge::{Convergence, ConvergencePolicy, await_membership};
use crate::error::{ClusterError, ClusterResult};
use crate::probe::probe;
use crate::types::{Endpoint, MembershipState};

/// Creates a new cluster on the anchor and waits until it is queryable.
pub struct ClusterCreator<'a, C> {
    control: &'a C,
    policy: ConvergencePolicy,
}

impl<'a, C: ControlPlane> ClusterCreator<'a, C> {
    pub fn new(control: &'a C, policy: ConvergencePolicy) -> Self {
        Self { control, policy }
    }

    /// Create cluster `name` on `anchor` with `link0` as the first link
    /// address, then poll the anchor until it reports the new cluster.
    pub async fn create(
        &self,
        anchor: &Endpoint,
        name: &str,
        link0: &str,
    ) -> ClusterResult<MembershipState> {
        let request = CreateClusterRequest {
            clustername: name.to_string(),
            link0: link0.to_string(),
        };

        info!(host = %anchor, cluster = %name, %link0, "creating cluster");
        self.control
            .create_cluster(anchor, &request)
            .await
            .map_err(|e| {
                e.into_cluster_error(|e: ApiError| ClusterError::Create {
                    status: e.status(),
                    body: e.body(),
                })
            })?;

        match await_membership(&self.policy, name, || probe(self.control, anchor)).await {
            Convergence::Reached(state) => {
                info!(host = %anchor, cluster = %name, "cluster created");
                Ok(state)
            }
            Convergence::Diverged(state) => Err(ClusterError::Create {
                status: None,
                body: format!("anchor reports {state} after creation"),
            }),
            Convergence::TimedOut { waited, .. } => Err(ClusterError::ConvergenceTimeout {
                endpoint: anchor.host().to_string(),
                expected: name.to_string(),
                waited,
            }),
        }
    }
}
