//! # GTMCTL CLI
//!
//! Command-line interface for the GitHub Token Manager.
//!
//! ## Usage
//!
//! ```bash
//! # List Tokens and ClusterTokens
//! gtmctl list
//!
//! # List Tokens in one namespace
//! gtmctl list token --namespace builds
//!
//! # Show status of a Token
//! gtmctl status token ci-token --namespace builds
//!
//! # Show status of a ClusterToken
//! gtmctl status ghct flux-source
//!
//! # Print both CRDs
//! gtmctl crd
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use github_token_manager::crd::{ClusterToken, Token};
use kube::core::CustomResourceExt;
use kube::Client;

mod list;
mod status;

/// GitHub Token Manager CLI
#[derive(Parser)]
#[command(name = "gtmctl")]
#[command(
    about = "GitHub Token Manager CLI",
    long_about = None,
    after_help = "\
Available resource types:
  token (or 'ght')          - Token resource (namespaced)
  clustertoken (or 'ghct')  - ClusterToken resource (cluster-scoped)

Examples:
  gtmctl list
  gtmctl list token -n builds
  gtmctl status token ci-token -n builds
  gtmctl status ghct flux-source
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace for Tokens (defaults to all namespaces for `list`, `default` for `status`)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List Token and ClusterToken resources
    List {
        /// Resource type, both kinds when omitted
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: Option<ResourceType>,
    },
    /// Show status of a Token or ClusterToken
    Status {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: ResourceType,

        /// Name of the resource
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Print the CustomResourceDefinitions as YAML
    Crd,
}

#[derive(Clone, Copy, ValueEnum)]
enum ResourceType {
    #[value(name = "token", alias = "ght")]
    Token,
    #[value(name = "clustertoken", alias = "ghct")]
    ClusterToken,
}

#[tokio::main]
async fn main() -> Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gtmctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Crd = cli.command {
        let token = serde_yaml::to_string(&Token::crd())?;
        let cluster_token = serde_yaml::to_string(&ClusterToken::crd())?;
        print!("---\n{token}---\n{cluster_token}");
        return Ok(());
    }

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::List { resource_type } => {
            if matches!(resource_type, None | Some(ResourceType::Token)) {
                list::list_tokens(client.clone(), cli.namespace.as_deref()).await?;
            }
            if matches!(resource_type, None | Some(ResourceType::ClusterToken)) {
                list::list_cluster_tokens(client).await?;
            }
            Ok(())
        }
        Commands::Status {
            resource_type: ResourceType::Token,
            name,
        } => {
            let namespace = cli.namespace.as_deref().unwrap_or("default");
            status::token_status(client, &name, namespace).await
        }
        Commands::Status {
            resource_type: ResourceType::ClusterToken,
            name,
        } => status::cluster_token_status(client, &name).await,
        Commands::Crd => Ok(()),
    }
}
