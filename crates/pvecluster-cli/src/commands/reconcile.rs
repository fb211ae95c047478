use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{error, info};

use pvecluster::{AuthTicket, ClusterError, HttpControlPlane, Orchestrator};

use crate::config::ClusterConfig;

pub struct Options {
    pub config: PathBuf,
    pub dry_run: bool,
    pub cluster_name: Option<String>,
    pub insecure: bool,
    pub emit_auth: Option<PathBuf>,
}

pub async fn run(options: Options) -> anyhow::Result<()> {
    let mut config = ClusterConfig::from_file(&options.config)?;
    if let Some(name) = options.cluster_name {
        config.cluster.name = Some(name);
    }
    if options.insecure {
        config.tls.validate_certs = false;
    }

    let request = config.to_request()?;
    let control = HttpControlPlane::new(config.request_timeout()?)?;
    let orchestrator = Orchestrator::new(control)
        .with_policy(config.policy()?)
        .with_dry_run(options.dry_run);

    let result = match orchestrator.reconcile(&request).await {
        Ok(result) => result,
        Err(e) => {
            error!(kind = e.kind(), may_have_mutated = e.may_have_mutated(), "reconcile failed: {e}");
            return Err(failure_context(e));
        }
    };

    info!(
        changed = result.changed,
        phase = %result.phase,
        membership = %result.final_membership,
        "reconcile finished"
    );

    if let (Some(path), Some(auth)) = (&options.emit_auth, &result.anchor_auth) {
        write_auth(path, auth)?;
        info!(path = %path.display(), "wrote cluster session");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn failure_context(e: ClusterError) -> anyhow::Error {
    let hint = if e.may_have_mutated() {
        "cluster state may have changed, inspect the nodes before retrying"
    } else {
        "no changes were made"
    };
    anyhow::Error::new(e).context(hint)
}

/// Write the plaintext session, readable by the owner only.
fn write_auth(path: &Path, auth: &AuthTicket) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(&auth.reveal())?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    // `mode` only applies to newly created files.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("restricting permissions of {}", path.display()))?;
    }
    file.write_all(&json)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
