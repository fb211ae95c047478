//! Error taxonomy for membership reconciliation.

use std::time::Duration;

use thiserror::Error;

use crate::types::MembershipState;

/// Result type alias for reconciliation operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Every fatal condition a reconciliation run can end in.
///
/// All variants abort the run. None of them trigger a rollback of a
/// partially created or joined cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("cannot fetch cluster status from {endpoint}{}", fmt_status(.status))]
    Probe { endpoint: String, status: Option<u16> },

    #[error("node already in cluster {existing:?}, refusing to move it to {desired:?}")]
    Conflict { existing: String, desired: String },

    #[error("unable to create cluster{}: {body}", fmt_status(.status))]
    Create { status: Option<u16>, body: String },

    #[error("failed to get cluster join info{}: {body}", fmt_status(.status))]
    JoinInfo { status: Option<u16>, body: String },

    #[error("error joining cluster: {body}")]
    Join { body: String },

    #[error("node did not join cluster {expected:?} (observed: {})", fmt_observed(.observed))]
    JoinVerification {
        expected: String,
        observed: Option<MembershipState>,
    },

    #[error("{endpoint} did not report cluster {expected:?} within {waited:?}")]
    ConvergenceTimeout {
        endpoint: String,
        expected: String,
        waited: Duration,
    },

    #[error("unexpected {operation} response: {message}")]
    Schema {
        operation: &'static str,
        message: String,
    },

    #[error("cannot build HTTP client: {0}")]
    ClientSetup(String),

    #[error("no cluster name given and the anchor is not part of a cluster")]
    MissingClusterName,
}

impl ClusterError {
    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredential(_) => "invalid_credential",
            Self::Probe { .. } => "probe",
            Self::Conflict { .. } => "conflict",
            Self::Create { .. } => "create",
            Self::JoinInfo { .. } => "join_info",
            Self::Join { .. } => "join",
            Self::JoinVerification { .. } => "join_verification",
            Self::ConvergenceTimeout { .. } => "convergence_timeout",
            Self::Schema { .. } => "schema",
            Self::ClientSetup(_) => "client_setup",
            Self::MissingClusterName => "missing_cluster_name",
        }
    }

    /// Whether the remote side may have been mutated before the failure.
    pub fn may_have_mutated(&self) -> bool {
        matches!(
            self,
            Self::Create { .. }
                | Self::Join { .. }
                | Self::JoinVerification { .. }
                | Self::ConvergenceTimeout { .. }
        )
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

fn fmt_observed(observed: &Option<MembershipState>) -> String {
    match observed {
        Some(state) => state.to_string(),
        None => "no successful status query".to_string(),
    }
}
