//! Per-kind resource declarations
//!
//! Each resource kind has its own closed set of attributes. The provider
//! attribute names used during synthesis follow the Google provider.

use super::expr::{Expr, Output, Ref};
use crate::asset::AssetDescriptor;
use serde::Serialize;
use std::collections::BTreeMap;

/// Kind of a declared node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    NetworkIdentity,
    StorageLocation,
    PermissionBinding,
    DeployableArtifact,
    ArtifactObject,
    ServerlessFunction,
    /// Pre-existing identity owned outside this graph (read-only lookup)
    ExternalIdentity,
}

impl ResourceKind {
    /// Lookups are read, never created or named
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::ExternalIdentity)
    }

    /// Whether nodes of this kind expose `output`
    pub fn exposes(&self, output: Output) -> bool {
        match self {
            Self::NetworkIdentity => matches!(output, Output::Name | Output::Email),
            Self::StorageLocation | Self::ArtifactObject => output == Output::Name,
            Self::PermissionBinding => false,
            Self::DeployableArtifact => {
                matches!(output, Output::Hash | Output::Path | Output::ObjectName)
            }
            Self::ServerlessFunction => matches!(output, Output::Name | Output::Uri),
            Self::ExternalIdentity => output == Output::EmailAddress,
        }
    }
}

/// Service account created by the stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySpec {
    pub account_id: String,
    pub display_name: Option<String>,
}

impl IdentitySpec {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            display_name: None,
        }
    }
}

/// Storage bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSpec {
    pub name: String,
    pub location: String,
    pub force_destroy: bool,
    pub uniform_bucket_level_access: bool,
}

impl LocationSpec {
    pub fn new(name: &str, location: &str) -> Self {
        Self {
            name: name.to_string(),
            location: location.to_string(),
            force_destroy: false,
            uniform_bucket_level_access: false,
        }
    }
}

/// Where a role is granted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Project(String),
}

/// How a binding combines with grants made outside the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingMode {
    /// The stack owns the full member list of the role
    Authoritative,
    /// The stack adds a single member to the role
    Additive,
}

/// Role granted to one subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    /// IAM member string, e.g. `serviceAccount:<email>`
    pub member: Expr,
    pub role: String,
    pub scope: Scope,
    pub mode: BindingMode,
}

/// Object uploaded into a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSpec {
    pub bucket: Expr,
    pub name: Expr,
    /// Local path of the bytes to upload
    pub source: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSource {
    pub bucket: Expr,
    pub object: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub entry_point: String,
    pub runtime: String,
    pub source: StorageSource,
}

/// Exact-match filter on a CloudEvent attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub attribute: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    DoNotRetry,
    Retry,
}

impl RetryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoNotRetry => "RETRY_POLICY_DO_NOT_RETRY",
            Self::Retry => "RETRY_POLICY_RETRY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTrigger {
    pub event_type: String,
    pub trigger_region: Option<String>,
    pub filters: Vec<EventFilter>,
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Values read by the function at runtime
    pub environment: BTreeMap<String, Expr>,
    pub min_instance_count: Option<u32>,
    pub max_instance_count: Option<u32>,
    pub available_memory: Option<String>,
    pub timeout_seconds: Option<u32>,
    pub service_account_email: Expr,
}

/// Event-triggered serverless function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    pub build: BuildConfig,
    pub event_trigger: Option<EventTrigger>,
    pub service: ServiceConfig,
}

/// Lookup of the project's Cloud Storage service agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSpec {
    pub project: String,
}

/// Attributes of a node, one variant per kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attributes {
    Identity(IdentitySpec),
    Location(LocationSpec),
    Binding(BindingSpec),
    Artifact(AssetDescriptor),
    Object(ObjectSpec),
    Function(FunctionSpec),
    ExternalIdentity(LookupSpec),
}

impl Attributes {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Identity(_) => ResourceKind::NetworkIdentity,
            Self::Location(_) => ResourceKind::StorageLocation,
            Self::Binding(_) => ResourceKind::PermissionBinding,
            Self::Artifact(_) => ResourceKind::DeployableArtifact,
            Self::Object(_) => ResourceKind::ArtifactObject,
            Self::Function(_) => ResourceKind::ServerlessFunction,
            Self::ExternalIdentity(_) => ResourceKind::ExternalIdentity,
        }
    }

    /// Provider resource (or data source) type
    pub fn provider_type(&self) -> &'static str {
        match self {
            Self::Identity(_) => "google_service_account",
            Self::Location(_) => "google_storage_bucket",
            Self::Binding(b) => match b.mode {
                BindingMode::Authoritative => "google_project_iam_binding",
                BindingMode::Additive => "google_project_iam_member",
            },
            Self::Artifact(_) => "local_asset",
            Self::Object(_) => "google_storage_bucket_object",
            Self::Function(_) => "google_cloudfunctions2_function",
            Self::ExternalIdentity(_) => "google_storage_project_service_account",
        }
    }

    /// Every reference held by these attributes, in attribute order
    pub fn references(&self) -> Vec<Ref> {
        let mut refs = Vec::new();
        match self {
            Self::Identity(_)
            | Self::Location(_)
            | Self::Artifact(_)
            | Self::ExternalIdentity(_) => {}
            Self::Binding(b) => b.member.collect_refs(&mut refs),
            Self::Object(o) => {
                o.bucket.collect_refs(&mut refs);
                o.name.collect_refs(&mut refs);
                o.source.collect_refs(&mut refs);
            }
            Self::Function(f) => {
                f.build.source.bucket.collect_refs(&mut refs);
                f.build.source.object.collect_refs(&mut refs);
                if let Some(trigger) = &f.event_trigger {
                    for filter in &trigger.filters {
                        filter.value.collect_refs(&mut refs);
                    }
                }
                for value in f.service.environment.values() {
                    value.collect_refs(&mut refs);
                }
                f.service.service_account_email.collect_refs(&mut refs);
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_type_follows_mode() {
        let mut binding = BindingSpec {
            member: Expr::from("user:someone@example.com"),
            role: "roles/viewer".to_string(),
            scope: Scope::Project("demo-project".to_string()),
            mode: BindingMode::Authoritative,
        };
        assert_eq!(
            Attributes::Binding(binding.clone()).provider_type(),
            "google_project_iam_binding"
        );
        binding.mode = BindingMode::Additive;
        assert_eq!(
            Attributes::Binding(binding).provider_type(),
            "google_project_iam_member"
        );
    }

    #[test]
    fn test_outputs_per_kind() {
        assert!(ResourceKind::NetworkIdentity.exposes(Output::Email));
        assert!(!ResourceKind::StorageLocation.exposes(Output::Email));
        assert!(!ResourceKind::PermissionBinding.exposes(Output::Name));
        assert!(ResourceKind::ExternalIdentity.exposes(Output::EmailAddress));
        assert!(!ResourceKind::ExternalIdentity.exposes(Output::Name));
    }
}
