//! Image pipeline stack
//!
//! Declares the event-triggered image-processing pipeline: an upload to the
//! source bucket runs the function, which calls the prediction endpoint and
//! writes into the destination bucket, as its own service account.

use crate::asset::AssetDescriptor;
use crate::config::StackConfig;
use crate::error::{Result, SynthError};
use crate::graph::{
    BindingMode, BindingSpec, BuildConfig, EventFilter, EventTrigger, Expr, FunctionSpec, Graph,
    GraphBuilder, IdentitySpec, LocationSpec, ObjectSpec, Scope, ServiceConfig, StorageSource,
};
use crate::synth::{ProviderBlock, SynthOptions};
use std::collections::BTreeMap;

/// Event emitted when an object is written to a bucket
pub const STORAGE_FINALIZED_EVENT: &str = "google.cloud.storage.object.v1.finalized";

/// Roles held by the function's service account in the full variant
pub const FUNCTION_ROLES: &[(&str, &str)] = &[
    ("function-account-ai", "roles/aiplatform.user"),
    ("function-account-storage", "roles/storage.objectAdmin"),
];

/// Role the storage service agent needs to publish trigger events
pub const PUBLISHER_ROLE: &str = "roles/pubsub.publisher";

const DEFAULT_MIN_INSTANCES: u32 = 0;
const DEFAULT_MAX_INSTANCES: u32 = 1;

/// Which shape of the stack to declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// Function IAM bindings, a dataset bucket and instance-count bounds
    #[default]
    Full,
    /// Buckets, artifact and function only
    Minimal,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Minimal => "minimal",
        }
    }
}

/// Instance-count bounds with the defaults applied; fails when min > max
pub fn instance_bounds(min: Option<u32>, max: Option<u32>) -> Result<(u32, u32)> {
    let min = min.unwrap_or(DEFAULT_MIN_INSTANCES);
    let max = max.unwrap_or(DEFAULT_MAX_INSTANCES);
    if min > max {
        return Err(SynthError::InvalidInstanceBounds { min, max });
    }
    Ok((min, max))
}

/// Declare the pipeline for `config` around an already packaged `asset`
pub fn build_pipeline(
    config: &StackConfig,
    asset: AssetDescriptor,
    variant: Variant,
) -> Result<Graph> {
    let project = config.project.as_str();
    let region = config.region.as_str();
    let mut graph = GraphBuilder::new();

    let account = graph.declare_identity("function-account", IdentitySpec::new("function-account"))?;

    if variant == Variant::Full {
        for (id, role) in FUNCTION_ROLES {
            graph.declare_binding(
                id,
                BindingSpec {
                    member: account.member(),
                    role: role.to_string(),
                    scope: Scope::Project(project.to_string()),
                    mode: BindingMode::Authoritative,
                },
            )?;
        }

        graph.declare_location(
            "dataset",
            LocationSpec::new(&format!("dataset-{project}"), region),
        )?;
    }

    let asset_bucket = graph.declare_location(
        "asset-bucket",
        LocationSpec::new(&format!("asset-{project}"), region),
    )?;
    let source_bucket = graph.declare_location(
        "source-bucket",
        LocationSpec::new(&format!("source-{project}"), region),
    )?;
    let destination_bucket = graph.declare_location(
        "destination-bucket",
        LocationSpec::new(&format!("destination-{project}"), region),
    )?;

    let artifact = graph.declare_artifact("asset", asset)?;
    let object = graph.declare_object(
        "asset-object",
        ObjectSpec {
            bucket: asset_bucket.name().into(),
            name: artifact.object_name().into(),
            source: artifact.path().into(),
        },
    )?;

    let mut environment = BTreeMap::new();
    environment.insert(
        "DESTINATION_BUCKET".to_string(),
        Expr::from(destination_bucket.name()),
    );
    environment.insert("PROJECT_ID".to_string(), Expr::from(project));
    environment.insert("ENDPOINT_ID".to_string(), Expr::from(&config.endpoint_id));

    let (min_instance_count, max_instance_count) = match variant {
        Variant::Full => {
            let (min, max) =
                instance_bounds(config.min_instance_count, config.max_instance_count)?;
            (Some(min), Some(max))
        }
        Variant::Minimal => {
            if config.min_instance_count.is_some() || config.max_instance_count.is_some() {
                tracing::warn!("Instance-count bounds are ignored by the minimal variant");
            }
            (None, None)
        }
    };

    graph.declare_function(
        "function",
        FunctionSpec {
            name: config.function_name.clone(),
            location: region.to_string(),
            description: None,
            build: BuildConfig {
                entry_point: config.entry_point.clone(),
                runtime: config.runtime.clone(),
                source: StorageSource {
                    bucket: asset_bucket.name().into(),
                    object: object.name().into(),
                },
            },
            event_trigger: Some(EventTrigger {
                event_type: STORAGE_FINALIZED_EVENT.to_string(),
                trigger_region: None,
                filters: vec![EventFilter {
                    attribute: "bucket".to_string(),
                    value: source_bucket.name().into(),
                }],
                retry_policy: None,
            }),
            service: ServiceConfig {
                environment,
                min_instance_count,
                max_instance_count,
                available_memory: None,
                timeout_seconds: None,
                service_account_email: account.email().into(),
            },
        },
    )?;

    // GCS CloudEvent triggers need the storage service agent to publish to Pub/Sub
    let storage_account = graph.lookup_storage_service_account("storage-account", project)?;
    graph.declare_binding(
        "storage-account-pubsub",
        BindingSpec {
            member: storage_account.member(),
            role: PUBLISHER_ROLE.to_string(),
            scope: Scope::Project(project.to_string()),
            mode: BindingMode::Additive,
        },
    )?;

    tracing::info!("Declared {} pipeline for project {}", variant.as_str(), project);
    graph.build()
}

/// Synthesis options carrying the provider defaults and remote workspace
pub fn synth_options(config: &StackConfig) -> SynthOptions {
    SynthOptions {
        backend: config.backend.clone(),
        provider: Some(ProviderBlock {
            project: config.project.clone(),
            region: config.region.clone(),
        }),
    }
}
