//! Reconciliation state machine.
//!
//! ```text
//! Start ─probe─▶ Probed ─decide─▶ Decided ─┬─ NoOp ───────────────────────────▶ Done
//!                                          ├─ Conflict ─────────────────────────▶ Failed
//!                                          ├─ Create ─▶ Creating ─▶ Created ────────────▶ Done
//!                                          └─ Join ───▶ Joining ─▶ Joined ─▶ Verified ─▶ Done
//! ```
//!
//! A create is only planned when anchor and target are the same node, so
//! it never continues into a join.
//!
//! In dry-run mode a mutating plan stops at `Decided` and is reported as a
//! change without issuing any create, join, or verification call.
//!
//! Runs are strictly sequential. A run that may mutate holds its anchor's
//! lock from before the first probe until the result is reported, so a run
//! that had to wait decides on the state the previous run left behind.
//! Concurrent runs against the same anchor must share an [`AnchorLocks`]
//! (in-process) or be serialized by the caller (across processes).

use tracing::{info, instrument};

use crate::api::ControlPlane;
use crate::converge::ConvergencePolicy;
use crate::create::ClusterCreator;
use crate::decision::{decide, effective_cluster_name};
use crate::error::{ClusterError, ClusterResult};
use crate::join::ClusterJoiner;
use crate::lock::AnchorLocks;
use crate::probe::{probe, probe_with_fallback};
use crate::types::{JoinPlan, MembershipState, Phase, ReconcileRequest, Reconciliation};

/// Drives one membership reconciliation per [`Orchestrator::reconcile`] call.
pub struct Orchestrator<C> {
    control: C,
    policy: ConvergencePolicy,
    locks: AnchorLocks,
    dry_run: bool,
}

impl<C: ControlPlane> Orchestrator<C> {
    pub fn new(control: C) -> Self {
        Self {
            control,
            policy: ConvergencePolicy::default(),
            locks: AnchorLocks::new(),
            dry_run: false,
        }
    }

    pub fn with_policy(mut self, policy: ConvergencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share anchor locks with other orchestrators.
    pub fn with_locks(mut self, locks: AnchorLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    /// Bring the target into the anchor's cluster, creating it if needed.
    #[instrument(skip_all, fields(anchor = %request.anchor, target = %request.target, dry_run = self.dry_run))]
    pub async fn reconcile(&self, request: &ReconcileRequest) -> ClusterResult<Reconciliation> {
        let anchor_is_target = request.anchor.same_node(&request.target);
        let _guard = if self.dry_run {
            None
        } else {
            Some(self.locks.acquire(&request.anchor).await)
        };

        // Start → Probed
        let anchor_state = probe(&self.control, &request.anchor).await?;
        let (target_state, probed_via_anchor) = if anchor_is_target {
            (anchor_state.clone(), false)
        } else {
            let outcome =
                probe_with_fallback(&self.control, &request.target, request.anchor.auth()).await?;
            (outcome.state, outcome.via_anchor)
        };
        info!(phase = %Phase::Probed, anchor_state = %anchor_state, target_state = %target_state);

        // Probed → Decided
        let desired = effective_cluster_name(&anchor_state, request.cluster_name.as_deref())
            .ok_or(ClusterError::MissingClusterName)?;
        let plan = decide(&anchor_state, &target_state, &desired, anchor_is_target);
        info!(phase = %Phase::Decided, ?plan);

        let report = |changed: bool, final_membership: MembershipState, phase: Phase| Reconciliation {
            changed,
            cluster_name: desired.clone(),
            plan: plan.clone(),
            prior_membership: target_state.clone(),
            final_membership,
            probed_via_anchor,
            phase,
            anchor_auth: None,
        };

        match &plan {
            JoinPlan::NoOp { .. } => Ok(report(false, target_state.clone(), Phase::Done)),
            JoinPlan::Conflict { existing, desired } => Err(ClusterError::Conflict {
                existing: existing.clone(),
                desired: desired.clone(),
            }),
            JoinPlan::CreateCluster { .. } | JoinPlan::JoinExisting { .. } if self.dry_run => {
                info!("dry run, not applying plan");
                Ok(report(true, target_state.clone(), Phase::Decided))
            }
            JoinPlan::CreateCluster { name } => {
                debug_assert!(anchor_is_target, "create is only planned on the target itself");
                let link0 = request.link0.as_deref().unwrap_or(request.anchor.host());

                info!(phase = %Phase::Creating, cluster = %name);
                let created = ClusterCreator::new(&self.control, self.policy)
                    .create(&request.anchor, name, link0)
                    .await?;
                info!(phase = %Phase::Created, cluster = %name);

                Ok(Reconciliation {
                    anchor_auth: Some(request.anchor.auth().clone()),
                    ..report(true, created, Phase::Done)
                })
            }
            JoinPlan::JoinExisting { name } => {
                let joined = self.join(request, name).await?;
                Ok(Reconciliation {
                    anchor_auth: Some(request.anchor.auth().clone()),
                    ..report(true, joined, Phase::Done)
                })
            }
        }
    }

    /// Joining → Joined → Verified. Caller holds the anchor lock.
    async fn join(&self, request: &ReconcileRequest, name: &str) -> ClusterResult<MembershipState> {
        info!(phase = %Phase::Joining, cluster = %name);
        let state = ClusterJoiner::new(&self.control, self.policy)
            .join(
                &request.anchor,
                &request.target,
                request.anchor.host(),
                &request.target_root_password,
                name,
            )
            .await?;
        info!(phase = %Phase::Verified, cluster = %name);
        Ok(state)
    }
}
