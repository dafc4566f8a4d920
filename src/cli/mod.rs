//! # ATCTL CLI
//!
//! Command-line interface for the ApplicationTemplate Controller.
//!
//! ```bash
//! # Trigger reconciliation for an ApplicationTemplate
//! atctl reconcile applicationtemplate my-app
//! atctl reconcile apptemp my-app --namespace apps
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kube::Client;

mod reconcile;

/// ApplicationTemplate Controller CLI
#[derive(Parser)]
#[command(name = "atctl")]
#[command(
    about = "ApplicationTemplate Controller CLI",
    long_about = None,
    after_help = "\
Available resource types:
  applicationtemplate (or 'apptemp') - ApplicationTemplate resource

Examples:
  atctl reconcile apptemp my-app
  atctl reconcile applicationtemplate my-app --namespace apps
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to "default")
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger reconciliation for an ApplicationTemplate resource
    Reconcile {
        #[arg(
            value_enum,
            value_name = "RESOURCE_TYPE",
            help = "Resource type\nAvailable types:\n  applicationtemplate (or 'apptemp') - ApplicationTemplate resource"
        )]
        resource_type: ResourceType,

        /// Name of the ApplicationTemplate resource
        #[arg(value_name = "NAME")]
        name: String,
    },
}

/// Resource types supported by atctl
#[derive(Clone, Copy, ValueEnum)]
enum ResourceType {
    #[value(name = "applicationtemplate", alias = "apptemp")]
    ApplicationTemplate,
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::Reconcile {
            resource_type: ResourceType::ApplicationTemplate,
            name,
        } => reconcile::reconcile_command(client, name, cli.namespace).await,
    }
}
