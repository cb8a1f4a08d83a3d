//! # Installation Permissions
//!
//! Requested permissions for an installation access token, expressed as a
//! subset of the GitHub App's own permissions. Keys follow the GitHub REST
//! API naming (`snake_case`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Access level for a single permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Read,
    Write,
    Admin,
}

impl PermissionLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
            PermissionLevel::Admin => "admin",
        }
    }
}

/// Permissions requested for a token
///
/// Unset fields are not requested; an empty set inherits all of the App's
/// permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct Permissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administration: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codespaces: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependabot_secrets: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployments: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_addresses: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environments: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_administration: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_custom_roles: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_hooks: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_packages: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_plan: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_projects: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_secrets: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_self_hosted_runners: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_user_blocking: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_requests: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_custom_properties: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_hooks: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_projects: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_scanning_alerts: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_events: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_file: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statuses: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_discussions: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerability_alerts: Option<PermissionLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflows: Option<PermissionLevel>,
}

impl Permissions {
    /// Permissions as sent in the access token request body
    ///
    /// The API names the email permission `emails` even though the App
    /// manifest calls it `email_addresses`.
    #[must_use]
    pub fn to_request_map(&self) -> BTreeMap<String, String> {
        let entries: [(&str, Option<PermissionLevel>); 36] = [
            ("actions", self.actions),
            ("administration", self.administration),
            ("checks", self.checks),
            ("codespaces", self.codespaces),
            ("contents", self.contents),
            ("dependabot_secrets", self.dependabot_secrets),
            ("deployments", self.deployments),
            ("emails", self.email_addresses),
            ("environments", self.environments),
            ("followers", self.followers),
            ("issues", self.issues),
            ("metadata", self.metadata),
            ("members", self.members),
            ("organization_administration", self.organization_administration),
            ("organization_custom_roles", self.organization_custom_roles),
            ("organization_hooks", self.organization_hooks),
            ("organization_packages", self.organization_packages),
            ("organization_plan", self.organization_plan),
            ("organization_projects", self.organization_projects),
            ("organization_secrets", self.organization_secrets),
            ("organization_self_hosted_runners", self.organization_self_hosted_runners),
            ("organization_user_blocking", self.organization_user_blocking),
            ("packages", self.packages),
            ("pages", self.pages),
            ("pull_requests", self.pull_requests),
            ("repository_custom_properties", self.repository_custom_properties),
            ("repository_hooks", self.repository_hooks),
            ("repository_projects", self.repository_projects),
            ("secrets", self.secrets),
            ("secret_scanning_alerts", self.secret_scanning_alerts),
            ("security_events", self.security_events),
            ("single_file", self.single_file),
            ("statuses", self.statuses),
            ("team_discussions", self.team_discussions),
            ("vulnerability_alerts", self.vulnerability_alerts),
            ("workflows", self.workflows),
        ];

        entries
            .into_iter()
            .filter_map(|(key, level)| level.map(|l| (key.to_string(), l.as_str().to_string())))
            .collect()
    }
}
