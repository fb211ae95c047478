//! Control-plane REST surface.
//!
//! Explicit request/response types for the four operations a run uses,
//! the [`ControlPlane`] seam the reconciliation steps are written against,
//! and [`HttpControlPlane`], the reqwest-backed implementation.
//!
//! | Operation | Method/Path |
//! |---|---|
//! | Status query | GET `/cluster/status` |
//! | Create cluster | POST `/cluster/config` |
//! | Fetch join info | GET `/cluster/config/join` |
//! | Submit join | POST `/cluster/config/join` |

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::auth::{Secret, serialize_exposed};
use crate::error::{ClusterError, ClusterResult};
use crate::types::Endpoint;

pub const STATUS_PATH: &str = "/cluster/status";
pub const CONFIG_PATH: &str = "/cluster/config";
pub const JOIN_PATH: &str = "/cluster/config/join";

// ── Schema ─────────────────────────────────────────────────────────

/// Every API response wraps its payload in `{"data": …}`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// One record of `GET /cluster/status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatusRecord {
    Cluster(ClusterRecord),
    Node(NodeRecord),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClusterRecord {
    pub name: String,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub nodes: Option<u32>,
    #[serde(default)]
    pub quorate: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub nodeid: Option<u32>,
    #[serde(default)]
    pub online: Option<u8>,
    #[serde(default)]
    pub local: Option<u8>,
}

/// Body of `POST /cluster/config`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateClusterRequest {
    pub clustername: String,
    pub link0: String,
}

/// Payload of `GET /cluster/config/join`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinInfo {
    pub nodelist: Vec<JoinNode>,
    #[serde(default)]
    pub preferred_node: Option<String>,
    #[serde(default)]
    pub config_digest: Option<String>,
}

/// One cluster node as listed in the join info.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinNode {
    pub pve_fp: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pve_addr: Option<String>,
    #[serde(default)]
    pub ring0_addr: Option<String>,
}

/// Body of `POST /cluster/config/join`.
#[derive(Debug, Clone, Serialize)]
pub struct JoinRequest {
    pub fingerprint: String,
    pub hostname: String,
    #[serde(serialize_with = "serialize_exposed")]
    pub password: Secret,
}

// ── Transport errors ───────────────────────────────────────────────

/// Failure of a single API call, before it is classified by the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error(transparent)]
    Credential(#[from] ClusterError),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify into the run's taxonomy. Credential errors pass through
    /// unchanged, everything else goes to `classify`.
    pub(crate) fn into_cluster_error(
        self,
        classify: impl FnOnce(ApiError) -> ClusterError,
    ) -> ClusterError {
        match self {
            Self::Credential(err) => err,
            other => classify(other),
        }
    }

    /// Response body, or the error text when there was none.
    pub fn body(&self) -> String {
        match self {
            Self::Status { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ── Seam ───────────────────────────────────────────────────────────

/// The operations a reconciliation run needs from the control plane.
///
/// Each call authenticates with the session carried by the endpoint.
pub trait ControlPlane: Send + Sync {
    fn cluster_status(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = ApiResult<Vec<StatusRecord>>> + Send;

    fn create_cluster(
        &self,
        endpoint: &Endpoint,
        request: &CreateClusterRequest,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    fn join_info(&self, endpoint: &Endpoint) -> impl Future<Output = ApiResult<JoinInfo>> + Send;

    fn join_cluster(
        &self,
        endpoint: &Endpoint,
        request: &JoinRequest,
    ) -> impl Future<Output = ApiResult<()>> + Send;
}

impl<C: ControlPlane> ControlPlane for &C {
    fn cluster_status(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = ApiResult<Vec<StatusRecord>>> + Send {
        (**self).cluster_status(endpoint)
    }

    fn create_cluster(
        &self,
        endpoint: &Endpoint,
        request: &CreateClusterRequest,
    ) -> impl Future<Output = ApiResult<()>> + Send {
        (**self).create_cluster(endpoint, request)
    }

    fn join_info(&self, endpoint: &Endpoint) -> impl Future<Output = ApiResult<JoinInfo>> + Send {
        (**self).join_info(endpoint)
    }

    fn join_cluster(
        &self,
        endpoint: &Endpoint,
        request: &JoinRequest,
    ) -> impl Future<Output = ApiResult<()>> + Send {
        (**self).join_cluster(endpoint, request)
    }
}

// ── HTTP implementation ────────────────────────────────────────────

/// [`ControlPlane`] over HTTPS.
///
/// Holds one client that validates certificates and one that does not;
/// each endpoint's `validate_certs` flag picks between them.
#[derive(Clone)]
pub struct HttpControlPlane {
    verified: Client,
    unverified: Client,
}

impl HttpControlPlane {
    pub fn new(timeout: Duration) -> ClusterResult<Self> {
        let build = |validate: bool| {
            Client::builder()
                .timeout(timeout)
                .user_agent(concat!("pvecluster/", env!("CARGO_PKG_VERSION")))
                .danger_accept_invalid_certs(!validate)
                .build()
                .map_err(|e| ClusterError::ClientSetup(e.to_string()))
        };
        Ok(Self {
            verified: build(true)?,
            unverified: build(false)?,
        })
    }

    fn client(&self, endpoint: &Endpoint) -> &Client {
        if endpoint.validate_certs() {
            &self.verified
        } else {
            &self.unverified
        }
    }

    fn get(&self, endpoint: &Endpoint, path: &str) -> ApiResult<RequestBuilder> {
        let headers = endpoint.auth().headers()?;
        Ok(self.client(endpoint).get(endpoint.url(path)).headers(headers))
    }

    fn post(&self, endpoint: &Endpoint, path: &str) -> ApiResult<RequestBuilder> {
        let headers = endpoint.auth().headers()?;
        Ok(self.client(endpoint).post(endpoint.url(path)).headers(headers))
    }
}

/// Send a request and return the raw body of a 200 response.
async fn send(request: RequestBuilder) -> ApiResult<String> {
    let response = request
        .send()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;

    if status != reqwest::StatusCode::OK {
        debug!(status = status.as_u16(), "control plane rejected request");
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

/// Parse the `data` payload of a response body.
pub fn decode_data<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(|envelope| envelope.data)
        .map_err(|e| ApiError::Decode(e.to_string()))
}

impl ControlPlane for HttpControlPlane {
    async fn cluster_status(&self, endpoint: &Endpoint) -> ApiResult<Vec<StatusRecord>> {
        let body = send(self.get(endpoint, STATUS_PATH)?).await?;
        decode_data(&body)
    }

    async fn create_cluster(
        &self,
        endpoint: &Endpoint,
        request: &CreateClusterRequest,
    ) -> ApiResult<()> {
        send(self.post(endpoint, CONFIG_PATH)?.json(request)).await?;
        Ok(())
    }

    async fn join_info(&self, endpoint: &Endpoint) -> ApiResult<JoinInfo> {
        let body = send(self.get(endpoint, JOIN_PATH)?).await?;
        decode_data(&body)
    }

    async fn join_cluster(&self, endpoint: &Endpoint, request: &JoinRequest) -> ApiResult<()> {
        send(self.post(endpoint, JOIN_PATH)?.json(request)).await?;
        Ok(())
    }
}
