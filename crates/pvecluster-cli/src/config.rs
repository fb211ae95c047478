//! `cluster.toml` configuration.
//!
//! ```toml
//! [anchor]
//! host = "10.1.99.21"
//! auth_file = "auth/pve-1.json"
//!
//! [target]
//! host = "10.1.99.22"
//! auth_file = "auth/pve-2.json"
//! root_password_env = "PVE_ROOT_PASSWORD"
//!
//! [cluster]
//! name = "prod"
//!
//! [tls]
//! validate_certs = false
//!
//! [convergence]
//! initial_delay = "5s"
//! interval = "3s"
//! timeout = "2m"
//! ```
//!
//! Auth files hold the JSON returned by `POST /access/ticket`. Relative
//! paths are resolved against the directory of the config file.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use pvecluster::{AuthTicket, ConvergencePolicy, Endpoint, ReconcileRequest, Secret};

const DEFAULT_PASSWORD_ENV: &str = "PVE_ROOT_PASSWORD";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    pub anchor: NodeConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub cluster: ClusterSection,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub convergence: ConvergenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub host: String,
    pub auth_file: PathBuf,
    /// Full API base URL, for nodes behind a proxy.
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub host: String,
    pub auth_file: PathBuf,
    pub api_base: Option<String>,
    /// Environment variable holding the target's root@pam password.
    pub root_password_env: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterSection {
    pub name: Option<String>,
    pub link0: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    #[serde(default = "default_true")]
    pub validate_certs: bool,
    pub request_timeout: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            validate_certs: true,
            request_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvergenceConfig {
    pub initial_delay: Option<String>,
    pub interval: Option<String>,
    pub timeout: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ClusterConfig {
    /// Parse a config file. Relative auth file paths become absolute
    /// against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: ClusterConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.anchor.auth_file = base.join(&config.anchor.auth_file);
        config.target.auth_file = base.join(&config.target.auth_file);
        Ok(config)
    }

    pub fn policy(&self) -> Result<ConvergencePolicy> {
        let defaults = ConvergencePolicy::default();
        let c = &self.convergence;
        Ok(ConvergencePolicy {
            initial_delay: duration_or(c.initial_delay.as_deref(), defaults.initial_delay)?,
            interval: duration_or(c.interval.as_deref(), defaults.interval)?,
            timeout: duration_or(c.timeout.as_deref(), defaults.timeout)?,
        })
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        duration_or(self.tls.request_timeout.as_deref(), Duration::from_secs(30))
    }

    /// Build the run input, loading credentials and the root password.
    pub fn to_request(&self) -> Result<ReconcileRequest> {
        let validate = self.tls.validate_certs;
        let anchor = endpoint(
            &self.anchor.host,
            &self.anchor.auth_file,
            self.anchor.api_base.as_deref(),
            validate,
        )?;
        let target = endpoint(
            &self.target.host,
            &self.target.auth_file,
            self.target.api_base.as_deref(),
            validate,
        )?;

        let var = self
            .target
            .root_password_env
            .as_deref()
            .unwrap_or(DEFAULT_PASSWORD_ENV);
        let password = std::env::var(var)
            .with_context(|| format!("root password variable {var} is not set"))?;
        if password.is_empty() {
            bail!("root password variable {var} is empty");
        }

        Ok(ReconcileRequest {
            anchor,
            target,
            cluster_name: self.cluster.name.clone(),
            link0: self.cluster.link0.clone(),
            target_root_password: Secret::new(password),
        })
    }
}

/// Load an endpoint's session from its auth file.
pub fn endpoint(
    host: &str,
    auth_file: &Path,
    api_base: Option<&str>,
    validate_certs: bool,
) -> Result<Endpoint> {
    let auth = load_auth(auth_file)?;
    let endpoint = Endpoint::new(host, auth).with_validate_certs(validate_certs);
    Ok(match api_base {
        Some(base) => endpoint.with_api_base(base),
        None => endpoint,
    })
}

/// Read an auth file. Accepts the bare ticket object or the full
/// `{"data": {...}}` response of `/access/ticket`.
pub fn load_auth(path: &Path) -> Result<AuthTicket> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AuthFile {
        Wrapped { data: AuthTicket },
        Bare(AuthTicket),
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading auth file {}", path.display()))?;
    let parsed: AuthFile = serde_json::from_str(&content)
        .with_context(|| format!("parsing auth file {}", path.display()))?;
    Ok(match parsed {
        AuthFile::Wrapped { data } => data,
        AuthFile::Bare(auth) => auth,
    })
}

fn duration_or(value: Option<&str>, default: Duration) -> Result<Duration> {
    let Some(s) = value else {
        return Ok(default);
    };
    let duration = parse_duration(s).with_context(|| format!("invalid duration {s:?}"))?;
    if Instant::now().checked_add(duration).is_none() {
        bail!("duration {s:?} is too large");
    }
    Ok(duration)
}

/// Parse a duration string like "5s", "500ms", "2m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
