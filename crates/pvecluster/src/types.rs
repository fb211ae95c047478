//! Domain types shared by the probe, decision, and execution steps.

use std::fmt;

use serde::Serialize;

use crate::auth::{AuthTicket, Secret};

/// Default port of the control-plane API.
pub const DEFAULT_API_PORT: u16 = 8006;

// ── Endpoint ───────────────────────────────────────────────────────

/// One addressable node in the control-plane API, with the session used
/// to talk to it. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Endpoint {
    host: String,
    api_base: String,
    auth: AuthTicket,
    validate_certs: bool,
}

impl Endpoint {
    /// An endpoint at `https://<host>:8006/api2/json`.
    pub fn new(host: impl Into<String>, auth: AuthTicket) -> Self {
        let host = host.into();
        let api_base = default_api_base(&host, DEFAULT_API_PORT);
        Self {
            host,
            api_base,
            auth,
            validate_certs: true,
        }
    }

    /// Override the API base URL (proxies, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_validate_certs(mut self, validate: bool) -> Self {
        self.validate_certs = validate;
        self
    }

    /// The same node, addressed with a different session.
    pub fn with_auth(&self, auth: &AuthTicket) -> Self {
        Self {
            auth: auth.clone(),
            ..self.clone()
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn auth(&self) -> &AuthTicket {
        &self.auth
    }

    pub fn validate_certs(&self) -> bool {
        self.validate_certs
    }

    /// Full URL for an API path such as `/cluster/status`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Stable identity of the node, independent of the session.
    pub fn identity(&self) -> String {
        format!("{}@{}", self.host.trim(), self.api_base).to_ascii_lowercase()
    }

    /// Whether both endpoints denote the same node.
    pub fn same_node(&self, other: &Endpoint) -> bool {
        self.identity() == other.identity()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

fn default_api_base(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("https://[{host}]:{port}/api2/json")
    } else {
        format!("https://{host}:{port}/api2/json")
    }
}

// ── Membership ─────────────────────────────────────────────────────

/// What a node reports about its own cluster membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "cluster", rename_all = "snake_case")]
pub enum MembershipState {
    Unclustered,
    Member(String),
}

impl MembershipState {
    pub fn cluster_name(&self) -> Option<&str> {
        match self {
            Self::Unclustered => None,
            Self::Member(name) => Some(name),
        }
    }

    pub fn is_member_of(&self, name: &str) -> bool {
        self.cluster_name() == Some(name)
    }
}

impl fmt::Display for MembershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unclustered => f.write_str("unclustered"),
            Self::Member(name) => write!(f, "member of {name:?}"),
        }
    }
}

// ── Plan ───────────────────────────────────────────────────────────

/// The single action a run decides on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum JoinPlan {
    NoOp { reason: String },
    CreateCluster { name: String },
    JoinExisting { name: String },
    Conflict { existing: String, desired: String },
}

impl JoinPlan {
    /// Whether executing the plan mutates the remote side.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::CreateCluster { .. } | Self::JoinExisting { .. })
    }
}

/// Credentials for a single join attempt, fetched from the anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCredential {
    /// Certificate fingerprint of the anchor node.
    pub trust_fingerprint: String,
    /// Address the joining node uses to reach the anchor.
    pub anchor_hostname: String,
}

// ── Run input / output ─────────────────────────────────────────────

/// Input of one reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub anchor: Endpoint,
    pub target: Endpoint,
    /// Cluster name to create when the anchor has none. Ignored when the
    /// anchor already belongs to a cluster.
    pub cluster_name: Option<String>,
    /// Seed link address for cluster creation. Defaults to the anchor host.
    pub link0: Option<String>,
    pub target_root_password: Secret,
}

/// Where the state machine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Probed,
    Decided,
    Creating,
    Created,
    Joining,
    Joined,
    Verified,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Probed => "probed",
            Self::Decided => "decided",
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Joining => "joining",
            Self::Joined => "joined",
            Self::Verified => "verified",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub changed: bool,
    /// Effective cluster name the run reconciled towards.
    pub cluster_name: String,
    pub plan: JoinPlan,
    pub prior_membership: MembershipState,
    pub final_membership: MembershipState,
    /// True when the target could only be probed with the anchor's session.
    pub probed_via_anchor: bool,
    pub phase: Phase,
    /// The anchor's session, for follow-up steps against the enlarged
    /// cluster. Serializes redacted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_auth: Option<AuthTicket>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> AuthTicket {
        AuthTicket::new("PVE:root@pam:1", "csrf")
    }

    #[test]
    fn default_api_base() {
        let ep = Endpoint::new("10.1.99.21", auth());
        assert_eq!(
            ep.url("/cluster/status"),
            "https://10.1.99.21:8006/api2/json/cluster/status"
        );
    }

    #[test]
    fn ipv6_host_is_bracketed() {
        let ep = Endpoint::new("fd00::21", auth());
        assert_eq!(ep.url("/version"), "https://[fd00::21]:8006/api2/json/version");
    }

    #[test]
    fn api_base_override_drops_trailing_slash() {
        let ep = Endpoint::new("pve-1", auth()).with_api_base("http://127.0.0.1:9000/api2/json/");
        assert_eq!(ep.url("/cluster/status"), "http://127.0.0.1:9000/api2/json/cluster/status");
    }

    #[test]
    fn same_node_ignores_case_and_auth() {
        let a = Endpoint::new("PVE-1", auth());
        let b = Endpoint::new("pve-1", AuthTicket::new("PVE:other", "x"));
        assert!(a.same_node(&b));
        assert!(!a.same_node(&Endpoint::new("pve-2", auth())));
    }

    #[test]
    fn with_auth_keeps_address() {
        let target = Endpoint::new("pve-2", auth()).with_validate_certs(false);
        let other = AuthTicket::new("PVE:anchor", "anchor-csrf");
        let swapped = target.with_auth(&other);
        assert_eq!(swapped.host(), "pve-2");
        assert!(!swapped.validate_certs());
        assert_eq!(swapped.auth(), &other);
    }

    #[test]
    fn membership_serializes_tagged() {
        let json = serde_json::to_value(MembershipState::Member("prod".into())).unwrap();
        assert_eq!(json, serde_json::json!({"state": "member", "cluster": "prod"}));
        let json = serde_json::to_value(MembershipState::Unclustered).unwrap();
        assert_eq!(json, serde_json::json!({"state": "unclustered"}));
    }

    #[test]
    fn reconciliation_redacts_anchor_auth() {
        let result = Reconciliation {
            changed: true,
            cluster_name: "prod".into(),
            plan: JoinPlan::JoinExisting { name: "prod".into() },
            prior_membership: MembershipState::Unclustered,
            final_membership: MembershipState::Member("prod".into()),
            probed_via_anchor: false,
            phase: Phase::Done,
            anchor_auth: Some(auth()),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("root@pam"));
        assert!(json.contains("[REDACTED]"));
    }
}
