//! # List Command
//!
//! Lists Token and ClusterToken resources with their Ready state, managed
//! Secret and token expiry.

use anyhow::{Context, Result};
use github_token_manager::constants::CONDITION_TYPE_READY;
use github_token_manager::crd::{ClusterToken, Token, TokenStatus};
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};

fn ready(status: Option<&TokenStatus>) -> String {
    status
        .and_then(|s| s.conditions.get(CONDITION_TYPE_READY))
        .map_or_else(|| "Unknown".to_string(), |c| c.status.to_string())
}

fn secret(status: Option<&TokenStatus>) -> String {
    status
        .filter(|s| !s.managed_secret.is_unset())
        .map_or_else(|| "-".to_string(), |s| s.managed_secret.to_string())
}

fn expires(status: Option<&TokenStatus>) -> String {
    status
        .and_then(|s| s.installation_access_token)
        .map_or_else(|| "-".to_string(), |t| t.expires_at.to_rfc3339())
}

/// List Tokens in one namespace, or in all namespaces
pub async fn list_tokens(client: Client, namespace: Option<&str>) -> Result<()> {
    let api: Api<Token> = if let Some(ns) = namespace {
        println!("Listing Token resources in namespace '{ns}'...");
        Api::namespaced(client, ns)
    } else {
        println!("Listing Token resources in all namespaces...");
        Api::all(client)
    };

    let tokens = api
        .list(&ListParams::default())
        .await
        .context("Failed to list Token resources")?;

    if tokens.items.is_empty() {
        println!("No Token resources found.");
        return Ok(());
    }

    println!(
        "\n{:<30} {:<20} {:<10} {:<40} {:<25}",
        "NAME", "NAMESPACE", "READY", "SECRET", "EXPIRES"
    );
    println!("{}", "-".repeat(128));

    for token in &tokens.items {
        let status = token.status.as_ref();
        println!(
            "{:<30} {:<20} {:<10} {:<40} {:<25}",
            token.name_any(),
            token.namespace().unwrap_or_default(),
            ready(status),
            secret(status),
            expires(status)
        );
    }

    Ok(())
}

/// List all ClusterTokens
pub async fn list_cluster_tokens(client: Client) -> Result<()> {
    println!("Listing ClusterToken resources...");
    let api: Api<ClusterToken> = Api::all(client);

    let tokens = api
        .list(&ListParams::default())
        .await
        .context("Failed to list ClusterToken resources")?;

    if tokens.items.is_empty() {
        println!("No ClusterToken resources found.");
        return Ok(());
    }

    println!(
        "\n{:<30} {:<10} {:<40} {:<25}",
        "NAME", "READY", "SECRET", "EXPIRES"
    );
    println!("{}", "-".repeat(107));

    for token in &tokens.items {
        let status = token.status.as_ref();
        println!(
            "{:<30} {:<10} {:<40} {:<25}",
            token.name_any(),
            ready(status),
            secret(status),
            expires(status)
        );
    }

    Ok(())
}
