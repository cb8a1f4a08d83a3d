//! # CRD Generator
//!
//! Generates the Kubernetes CustomResourceDefinition YAML for `Token` and
//! `ClusterToken` from their Rust type definitions.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/github.as-code.io.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use github_token_manager::crd::{ClusterToken, Token};
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let token = serde_yaml::to_string(&Token::crd())?;
    let cluster_token = serde_yaml::to_string(&ClusterToken::crd())?;
    print!("---\n{token}---\n{cluster_token}");
    Ok(())
}
