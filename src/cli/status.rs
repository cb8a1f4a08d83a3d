//! # Status Command
//!
//! Shows the detailed status of one Token or ClusterToken.

use anyhow::{Context, Result};
use github_token_manager::crd::{ClusterToken, Permissions, Token, TokenStatus};
use kube::{api::Api, Client};

/// Show detailed status of a Token
pub async fn token_status(client: Client, name: &str, namespace: &str) -> Result<()> {
    let api: Api<Token> = Api::namespaced(client, namespace);
    let token = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get Token '{namespace}/{name}'"))?;

    println!("Status for Token '{namespace}/{name}'");
    println!();
    println!("Spec:");
    println!(
        "  Secret: {}",
        token.spec.secret.name.as_deref().unwrap_or(name)
    );
    println!("  Basic Auth: {}", token.spec.secret.basic_auth);
    print_common(
        token.spec.installation_id,
        &token.spec.refresh_interval,
        &token.spec.retry_interval,
        token.spec.permissions.as_ref(),
        &token.spec.repositories,
    );
    print_status(token.metadata.generation, token.status.as_ref());
    Ok(())
}

/// Show detailed status of a ClusterToken
pub async fn cluster_token_status(client: Client, name: &str) -> Result<()> {
    let api: Api<ClusterToken> = Api::all(client);
    let token = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get ClusterToken '{name}'"))?;

    println!("Status for ClusterToken '{name}'");
    println!();
    println!("Spec:");
    println!(
        "  Secret: {}/{}",
        token.spec.secret.namespace,
        token.spec.secret.name.as_deref().unwrap_or(name)
    );
    println!("  Basic Auth: {}", token.spec.secret.basic_auth);
    print_common(
        token.spec.installation_id,
        &token.spec.refresh_interval,
        &token.spec.retry_interval,
        token.spec.permissions.as_ref(),
        &token.spec.repositories,
    );
    print_status(token.metadata.generation, token.status.as_ref());
    Ok(())
}

fn print_common(
    installation_id: Option<i64>,
    refresh_interval: &str,
    retry_interval: &str,
    permissions: Option<&Permissions>,
    repositories: &[String],
) {
    match installation_id {
        Some(id) => println!("  Installation ID: {id}"),
        None => println!("  Installation ID: <operator default>"),
    }
    println!("  Refresh Interval: {refresh_interval}");
    println!("  Retry Interval: {retry_interval}");
    if let Some(permissions) = permissions {
        println!("  Permissions:");
        for (scope, level) in permissions.to_request_map() {
            println!("    {scope}: {level}");
        }
    }
    if !repositories.is_empty() {
        println!("  Repositories: {}", repositories.join(", "));
    }
}

fn print_status(generation: Option<i64>, status: Option<&TokenStatus>) {
    println!();
    println!("Status:");
    let Some(status) = status else {
        println!("  <not yet reconciled>");
        return;
    };

    if !status.managed_secret.is_unset() {
        println!("  Managed Secret: {}", status.managed_secret);
    }
    if let Some(token) = &status.installation_access_token {
        println!("  Token Created: {}", token.created_at.to_rfc3339());
        println!("  Token Expires: {}", token.expires_at.to_rfc3339());
    }

    if !status.conditions.is_empty() {
        println!();
        println!("Conditions:");
        for condition in status.conditions.iter() {
            println!("  {}: {}", condition.r#type, condition.status);
            println!("    Reason: {}", condition.reason);
            println!("    Message: {}", condition.message);
            if let Some(time) = condition.last_transition_time {
                println!("    Last Transition: {}", time.to_rfc3339());
            }
            if condition.observed_generation != generation {
                println!("    (observed generation is behind the spec)");
            }
        }
    }
}
