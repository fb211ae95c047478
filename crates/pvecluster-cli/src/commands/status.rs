use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use pvecluster::HttpControlPlane;

use crate::config;

pub async fn run(host: &str, auth_file: &Path, insecure: bool) -> anyhow::Result<()> {
    let endpoint = config::endpoint(host, auth_file, None, !insecure)?;
    let control = HttpControlPlane::new(Duration::from_secs(30))?;

    let state = pvecluster::probe::probe(&control, &endpoint)
        .await
        .with_context(|| format!("querying cluster status of {host}"))?;

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
