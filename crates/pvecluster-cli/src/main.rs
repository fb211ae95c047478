use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod config;

#[derive(Parser)]
#[command(
    name = "pvecluster",
    about = "Idempotently form and grow Proxmox VE clusters",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the target node into the anchor's cluster.
    ///
    /// Creates the cluster on the anchor if it does not exist yet and joins
    /// the target unless it is already a member. Running it again once the
    /// desired state is reached changes nothing.
    Reconcile {
        /// Path to cluster.toml
        #[arg(short, long, default_value = "cluster.toml")]
        config: PathBuf,
        /// Report the planned action without changing anything
        #[arg(long)]
        dry_run: bool,
        /// Override [cluster].name
        #[arg(long)]
        cluster_name: Option<String>,
        /// Skip TLS certificate validation
        #[arg(long)]
        insecure: bool,
        /// Write the session usable on the cluster to this file (mode 0600)
        #[arg(long)]
        emit_auth: Option<PathBuf>,
    },
    /// Show a node's cluster membership
    Status {
        /// Node address
        #[arg(long)]
        host: String,
        /// Auth file holding the node's ticket and CSRF token
        #[arg(long)]
        auth_file: PathBuf,
        /// Skip TLS certificate validation
        #[arg(long)]
        insecure: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,pvecluster=debug".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Reconcile {
            config,
            dry_run,
            cluster_name,
            insecure,
            emit_auth,
        } => {
            commands::reconcile::run(commands::reconcile::Options {
                config,
                dry_run,
                cluster_name,
                insecure,
                emit_auth,
            })
            .await
        }
        Commands::Status {
            host,
            auth_file,
            insecure,
        } => commands::status::run(&host, &auth_file, insecure).await,
    }
}
