//! # Token Status
//!
//! Status types shared by `Token` and `ClusterToken`: the managed Secret
//! reference, the timestamps of the current installation access token and
//! the condition set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed state of a token owner
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    /// Coordinates of the Secret currently managed for this owner
    #[serde(default, skip_serializing_if = "ManagedSecretRef::is_unset")]
    pub managed_secret: ManagedSecretRef,
    /// Issue and expiry times of the token stored in the managed Secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_access_token: Option<InstallationAccessToken>,
    /// Generation the token in the managed Secret was issued for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Conditions,
}

/// Where the managed Secret lives and how it is shaped
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedSecretRef {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub basic_auth: bool,
}

impl ManagedSecretRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, basic_auth: bool) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            basic_auth,
        }
    }

    /// A reference with no name has never been recorded
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.name.is_empty()
    }

    /// True when both references point at the same Secret with the same shape
    #[must_use]
    pub fn matches(&self, other: &ManagedSecretRef) -> bool {
        self == other
    }
}

impl fmt::Display for ManagedSecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Timestamps of the installation access token currently held in the Secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstallationAccessToken {
    #[schemars(with = "String")]
    pub created_at: DateTime<Utc>,
    #[schemars(with = "String")]
    pub expires_at: DateTime<Utc>,
}

/// Tri-state condition status, as used by Kubernetes conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A single observation about the owner
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub r#type: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn new(
        r#type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            r#type: r#type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: None,
            observed_generation: None,
        }
    }

    /// Same observation, ignoring the transition timestamp
    fn same_observation(&self, other: &Condition) -> bool {
        self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
            && self.observed_generation == other.observed_generation
    }
}

/// Condition list keyed by condition type
///
/// At most one condition exists per type. Setting a condition replaces the
/// existing entry of that type or appends a new one; `lastTransitionTime`
/// only moves when the status value changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    #[must_use]
    pub fn get(&self, r#type: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.r#type == r#type)
    }

    /// Set a condition, returning whether anything changed
    pub fn set(&mut self, mut condition: Condition, now: DateTime<Utc>) -> bool {
        match self.0.iter_mut().find(|c| c.r#type == condition.r#type) {
            Some(existing) => {
                if existing.same_observation(&condition) {
                    return false;
                }
                condition.last_transition_time = if existing.status == condition.status {
                    existing.last_transition_time.or(Some(now))
                } else {
                    Some(now)
                };
                *existing = condition;
                true
            }
            None => {
                condition.last_transition_time = Some(now);
                self.0.push(condition);
                true
            }
        }
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(conditions: Vec<Condition>) -> Self {
        Self(conditions)
    }
}
