//! pvecluster: idempotent cluster membership reconciliation for
//! Proxmox VE nodes.
//!
//! Given an anchor node (which is, or will become, the first member of a
//! cluster) and a target node, a run probes both, decides the minimal
//! action, creates or joins as needed, and waits for the control plane to
//! report the new membership before returning.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!   ├── probe            GET /cluster/status → MembershipState
//!   │                    (retry once with the anchor's session)
//!   ├── decision         (anchor, target, name) → JoinPlan
//!   ├── ClusterCreator   POST /cluster/config, await convergence
//!   ├── ClusterJoiner    GET + POST /cluster/config/join, await + verify
//!   └── AnchorLocks      one mutating run per anchor at a time
//!
//! ControlPlane (trait)
//!   └── HttpControlPlane (reqwest, ticket cookie + CSRF header)
//! ```
//!
//! # Concurrency
//!
//! A run is sequential. Runs against the same anchor must not overlap:
//! share one [`AnchorLocks`] between orchestrators in a process, and
//! serialize invocations across processes.

pub mod api;
pub mod auth;
pub mod converge;
pub mod create;
pub mod decision;
pub mod error;
pub mod join;
pub mod lock;
pub mod orchestrator;
pub mod probe;
pub mod types;

pub use api::{ControlPlane, HttpControlPlane};
pub use auth::{AuthTicket, Secret};
pub use converge::ConvergencePolicy;
pub use error::{ClusterError, ClusterResult};
pub use lock::AnchorLocks;
pub use orchestrator::Orchestrator;
pub use types::*;
