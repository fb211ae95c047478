//! In-memory control plane shared by the integration tests.
//!
//! Models each node's membership, the session it accepts, and its
//! certificate fingerprint, and records every call made against it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use pvecluster::api::{
    ApiError, ApiResult, ClusterRecord, ControlPlane, CreateClusterRequest, JoinInfo, JoinNode,
    JoinRequest, NodeRecord, StatusRecord,
};
use pvecluster::{AuthTicket, Endpoint, Secret};

pub const ROOT_PASSWORD: &str = "correct horse";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Status { host: String, ticket: String },
    Create { host: String, name: String, link0: String },
    JoinInfo { host: String },
    Join { host: String, fingerprint: String, hostname: String },
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Call::Create { .. } | Call::Join { .. })
    }

    pub fn host(&self) -> &str {
        match self {
            Call::Status { host, .. }
            | Call::Create { host, .. }
            | Call::JoinInfo { host }
            | Call::Join { host, .. } => host,
        }
    }
}

#[derive(Debug, Clone)]
struct SimNode {
    cluster: Option<String>,
    fingerprint: String,
    own_ticket: String,
    /// The node's own session is rejected (expired or invalidated).
    own_session_rejected: bool,
    /// Node does not answer at all.
    down: bool,
}

#[derive(Default)]
struct SimState {
    nodes: HashMap<String, SimNode>,
    calls: Vec<Call>,
    /// Join calls succeed but membership never changes.
    ignore_joins: bool,
    fail_create: bool,
    /// Delay before every status answer.
    status_latency: Duration,
}

#[derive(Default)]
pub struct FakeControlPlane {
    state: Mutex<SimState>,
}

pub fn ticket_for(host: &str) -> String {
    format!("PVE:root@pam:{host}")
}

/// An endpoint for `host` carrying that node's own session.
pub fn endpoint(host: &str) -> Endpoint {
    Endpoint::new(host, AuthTicket::new(ticket_for(host), format!("csrf-{host}")))
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, host: &str, cluster: Option<&str>) -> Self {
        self.state.lock().unwrap().nodes.insert(
            host.to_string(),
            SimNode {
                cluster: cluster.map(str::to_string),
                fingerprint: format!("FP:{host}"),
                own_ticket: ticket_for(host),
                own_session_rejected: false,
                down: false,
            },
        );
        self
    }

    pub fn rejecting_own_session(self, host: &str) -> Self {
        self.node_mut(host, |n| n.own_session_rejected = true);
        self
    }

    pub fn down(self, host: &str) -> Self {
        self.node_mut(host, |n| n.down = true);
        self
    }

    pub fn ignoring_joins(self) -> Self {
        self.state.lock().unwrap().ignore_joins = true;
        self
    }

    pub fn with_status_latency(self, latency: Duration) -> Self {
        self.state.lock().unwrap().status_latency = latency;
        self
    }

    pub fn failing_create(self) -> Self {
        self.state.lock().unwrap().fail_create = true;
        self
    }

    pub fn membership(&self, host: &str) -> Option<String> {
        self.state.lock().unwrap().nodes[host].cluster.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.is_mutating()).count()
    }

    pub fn calls_other_than_status(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, Call::Status { .. }))
            .count()
    }

    fn node_mut(&self, host: &str, f: impl FnOnce(&mut SimNode)) {
        let mut state = self.state.lock().unwrap();
        f(state.nodes.get_mut(host).expect("unknown node"));
    }

    /// Look up the node and check the session, like pveproxy would.
    fn authorize(state: &SimState, endpoint: &Endpoint) -> ApiResult<SimNode> {
        let node = state
            .nodes
            .get(endpoint.host())
            .ok_or_else(|| ApiError::Transport(format!("no route to {}", endpoint.host())))?;
        if node.down {
            return Err(ApiError::Transport("connection refused".to_string()));
        }

        // Any known node's session is accepted, standing in for the trust
        // relationship between anchor and target.
        let ticket = endpoint.auth().ticket.expose();
        let is_own = ticket == node.own_ticket;
        let is_known = state.nodes.values().any(|peer| peer.own_ticket == ticket);

        if !is_known || (is_own && node.own_session_rejected) {
            return Err(ApiError::Status {
                status: 401,
                body: "authentication failure".to_string(),
            });
        }
        Ok(node.clone())
    }
}

impl ControlPlane for FakeControlPlane {
    async fn cluster_status(&self, endpoint: &Endpoint) -> ApiResult<Vec<StatusRecord>> {
        let latency = self.state.lock().unwrap().status_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Status {
            host: endpoint.host().to_string(),
            ticket: endpoint.auth().ticket.expose().to_string(),
        });
        let node = Self::authorize(&state, endpoint)?;

        let mut records = Vec::new();
        if let Some(name) = &node.cluster {
            records.push(StatusRecord::Cluster(ClusterRecord {
                name: name.clone(),
                version: Some(1),
                nodes: None,
                quorate: Some(1),
            }));
        }
        records.push(StatusRecord::Node(NodeRecord {
            name: endpoint.host().to_string(),
            ip: None,
            nodeid: None,
            online: Some(1),
            local: Some(1),
        }));
        Ok(records)
    }

    async fn create_cluster(
        &self,
        endpoint: &Endpoint,
        request: &CreateClusterRequest,
    ) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create {
            host: endpoint.host().to_string(),
            name: request.clustername.clone(),
            link0: request.link0.clone(),
        });
        let node = Self::authorize(&state, endpoint)?;
        if state.fail_create || node.cluster.is_some() {
            return Err(ApiError::Status {
                status: 500,
                body: "cluster config '/etc/pve/corosync.conf' already exists".to_string(),
            });
        }
        let name = request.clustername.clone();
        state.nodes.get_mut(endpoint.host()).unwrap().cluster = Some(name);
        Ok(())
    }

    async fn join_info(&self, endpoint: &Endpoint) -> ApiResult<JoinInfo> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::JoinInfo {
            host: endpoint.host().to_string(),
        });
        let node = Self::authorize(&state, endpoint)?;
        if node.cluster.is_none() {
            return Err(ApiError::Status {
                status: 500,
                body: "node is not in a cluster, no join info available!".to_string(),
            });
        }
        Ok(JoinInfo {
            nodelist: vec![JoinNode {
                pve_fp: node.fingerprint.clone(),
                name: Some(endpoint.host().to_string()),
                pve_addr: Some(endpoint.host().to_string()),
                ring0_addr: None,
            }],
            preferred_node: Some(endpoint.host().to_string()),
            config_digest: None,
        })
    }

    async fn join_cluster(&self, endpoint: &Endpoint, request: &JoinRequest) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Join {
            host: endpoint.host().to_string(),
            fingerprint: request.fingerprint.clone(),
            hostname: request.hostname.clone(),
        });
        Self::authorize(&state, endpoint)?;

        let anchor = state.nodes.get(&request.hostname).cloned().ok_or_else(|| {
            ApiError::Status {
                status: 500,
                body: format!("unable to reach {}", request.hostname),
            }
        })?;
        if anchor.fingerprint != request.fingerprint {
            return Err(ApiError::Status {
                status: 500,
                body: "fingerprint mismatch".to_string(),
            });
        }
        if request.password != Secret::new(ROOT_PASSWORD) {
            return Err(ApiError::Status {
                status: 500,
                body: "500 Permission denied - invalid PVE ticket".to_string(),
            });
        }
        if state.ignore_joins {
            return Ok(());
        }

        // The node's old session dies with its old auth key.
        let node = state.nodes.get_mut(endpoint.host()).unwrap();
        node.cluster = anchor.cluster;
        node.own_session_rejected = true;
        Ok(())
    }
}
