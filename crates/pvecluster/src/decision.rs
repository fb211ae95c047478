//! Membership decision: maps the probed states to a [`JoinPlan`].
//!
//! Pure and deterministic: no I/O and no state beyond the arguments.

use tracing::warn;

use crate::types::{JoinPlan, MembershipState};

/// The cluster name a run works towards.
///
/// An anchor that already belongs to a cluster is authoritative: its name
/// wins over whatever the caller asked for. Returns `None` when the anchor
/// is unclustered and the caller gave no (non-blank) name.
pub fn effective_cluster_name(anchor: &MembershipState, requested: Option<&str>) -> Option<String> {
    let requested = requested.map(str::trim).filter(|name| !name.is_empty());
    match (anchor, requested) {
        (MembershipState::Member(existing), Some(requested)) if existing != requested => {
            warn!(
                %existing,
                %requested,
                "anchor already belongs to a cluster, ignoring requested name"
            );
            Some(existing.clone())
        }
        (MembershipState::Member(existing), _) => Some(existing.clone()),
        (MembershipState::Unclustered, requested) => requested.map(str::to_string),
    }
}

/// Decide the single action for this run.
///
/// 1. A target that is already a member either matches (`NoOp`) or
///    conflicts; this pre-empts everything else.
/// 2. An unclustered anchor that is also the target creates the cluster.
/// 3. Anything else joins the target into the anchor's cluster.
pub fn decide(
    anchor: &MembershipState,
    target: &MembershipState,
    desired: &str,
    anchor_is_target: bool,
) -> JoinPlan {
    if let MembershipState::Member(current) = target {
        return if current == desired {
            JoinPlan::NoOp {
                reason: format!("already a member of {current:?}"),
            }
        } else {
            JoinPlan::Conflict {
                existing: current.clone(),
                desired: desired.to_string(),
            }
        };
    }

    if *anchor == MembershipState::Unclustered && anchor_is_target {
        return JoinPlan::CreateCluster {
            name: desired.to_string(),
        };
    }

    JoinPlan::JoinExisting {
        name: desired.to_string(),
    }
}
