//! Cluster status probe.
//!
//! Queries an endpoint's `/cluster/status` and reduces the heterogeneous
//! record list to a [`MembershipState`]. Read-only.

use tracing::{debug, warn};

use crate::api::{ApiError, ControlPlane, StatusRecord};
use crate::auth::AuthTicket;
use crate::error::{ClusterError, ClusterResult};
use crate::types::{Endpoint, MembershipState};

/// A probed membership and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub state: MembershipState,
    /// True when the endpoint's own session failed and the anchor's
    /// session was used instead.
    pub via_anchor: bool,
}

/// Reduce status records to a membership state.
///
/// A node belongs to a cluster iff exactly one `cluster` record is present.
/// More than one is a malformed response.
pub fn membership_from_records(records: &[StatusRecord]) -> ClusterResult<MembershipState> {
    let mut clusters = records.iter().filter_map(|record| match record {
        StatusRecord::Cluster(cluster) => Some(cluster),
        _ => None,
    });

    let Some(first) = clusters.next() else {
        return Ok(MembershipState::Unclustered);
    };
    if clusters.next().is_some() {
        return Err(ClusterError::Schema {
            operation: "cluster status",
            message: "more than one cluster record".to_string(),
        });
    }
    Ok(MembershipState::Member(first.name.clone()))
}

/// Probe one endpoint with its own session.
pub async fn probe<C: ControlPlane>(control: &C, endpoint: &Endpoint) -> ClusterResult<MembershipState> {
    let records = control
        .cluster_status(endpoint)
        .await
        .map_err(|e| classify(endpoint, e))?;
    let state = membership_from_records(&records)?;
    debug!(host = %endpoint, %state, "probed cluster status");
    Ok(state)
}

/// Probe a node, retrying once with the anchor's session if the node's own
/// session is rejected or the node cannot be reached with it.
///
/// This is the only automatic retry of a run.
pub async fn probe_with_fallback<C: ControlPlane>(
    control: &C,
    target: &Endpoint,
    anchor_auth: &AuthTicket,
) -> ClusterResult<ProbeOutcome> {
    match probe(control, target).await {
        Ok(state) => Ok(ProbeOutcome {
            state,
            via_anchor: false,
        }),
        Err(err @ ClusterError::Probe { .. }) => {
            warn!(host = %target, error = %err, "probe with node session failed, retrying with anchor session");
            let state = probe(control, &target.with_auth(anchor_auth)).await?;
            Ok(ProbeOutcome {
                state,
                via_anchor: true,
            })
        }
        Err(err) => Err(err),
    }
}

fn classify(endpoint: &Endpoint, err: ApiError) -> ClusterError {
    err.into_cluster_error(|err| match err {
        ApiError::Decode(message) => ClusterError::Schema {
            operation: "cluster status",
            message,
        },
        other => ClusterError::Probe {
            endpoint: endpoint.host().to_string(),
            status: other.status(),
        },
    })
}
