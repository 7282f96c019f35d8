//! Integration tests for the image pipeline stack
//!
//! These tests package a function source, declare the full and minimal
//! pipelines and check the synthesized document end to end.

use pipesynth::asset::{AssetDescriptor, AssetPackager};
use pipesynth::config::StackConfig;
use pipesynth::graph::{GraphBuilder, LocationSpec, ObjectSpec, Output, Ref};
use pipesynth::pipeline::{build_pipeline, synth_options, Variant};
use pipesynth::synth::{synthesize, topological_order, Backend, Document};
use pipesynth::SynthError;
use std::fs;
use std::path::Path;

const PROJECT: &str = "ideal-adventure";
const ENDPOINT: &str = "7212484016908271616";

fn stack() -> StackConfig {
    let mut stack = StackConfig::new(PROJECT, ENDPOINT);
    stack.backend = Some(Backend {
        hostname: "app.terraform.io".to_string(),
        organization: "example-org".to_string(),
        workspace: "ideal-adventure".to_string(),
    });
    stack
}

fn package_source(root: &Path, main_go: &[u8]) -> AssetDescriptor {
    let source = root.join("function");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("main.go"), main_go).unwrap();
    AssetPackager::new(root.join("synth.out"))
        .package(&source)
        .unwrap()
}

fn synth(variant: Variant, asset: AssetDescriptor) -> Document {
    let stack = stack();
    let graph = build_pipeline(&stack, asset, variant).unwrap();
    synthesize(&graph, &synth_options(&stack)).unwrap()
}

fn position(doc: &Document, id: &str) -> usize {
    doc.resources
        .iter()
        .position(|r| r.id == id)
        .unwrap_or_else(|| panic!("{id} missing from document"))
}

/// Test the emitted order satisfies every pipeline edge
#[test]
fn test_full_pipeline_order() {
    let dir = tempfile::tempdir().unwrap();
    let doc = synth(Variant::Full, package_source(dir.path(), b"package main\n"));

    let identity = position(&doc, "function-account");
    assert!(identity < position(&doc, "function-account-ai"));
    assert!(identity < position(&doc, "function-account-storage"));

    let function = position(&doc, "function");
    for bucket in ["dataset", "asset-bucket", "source-bucket", "destination-bucket"] {
        assert!(position(&doc, bucket) < function, "{bucket} must precede function");
    }

    assert!(position(&doc, "asset") < position(&doc, "asset-object"));
    assert!(position(&doc, "asset-object") < function);

    // Every record comes after all of its dependencies
    for (index, record) in doc.resources.iter().enumerate() {
        for dep in &record.depends_on {
            if let Some(dep_index) = doc.resources.iter().position(|r| &r.id == dep) {
                assert!(dep_index < index, "{} must precede {}", dep, record.id);
            }
        }
    }
}

/// Test the function node carries the resolved wiring
#[test]
fn test_function_wiring_is_resolved() {
    let dir = tempfile::tempdir().unwrap();
    let asset = package_source(dir.path(), b"package main\n");
    let hash = asset.hash.clone();
    let doc = synth(Variant::Full, asset);

    let function = doc.resource("function").unwrap();
    let attrs = &function.attributes;
    assert_eq!(function.resource_type, "google_cloudfunctions2_function");
    assert_eq!(attrs["build_config"]["entry_point"], "imageUploaded");
    assert_eq!(attrs["build_config"]["runtime"], "go119");
    assert_eq!(
        attrs["build_config"]["source"]["storage_source"]["bucket"],
        "asset-ideal-adventure"
    );
    assert_eq!(
        attrs["build_config"]["source"]["storage_source"]["object"],
        format!("{hash}.tar.gz")
    );
    assert_eq!(
        attrs["event_trigger"]["event_type"],
        "google.cloud.storage.object.v1.finalized"
    );
    assert_eq!(attrs["event_trigger"]["event_filters"][0]["attribute"], "bucket");
    assert_eq!(
        attrs["event_trigger"]["event_filters"][0]["value"],
        "source-ideal-adventure"
    );

    let service = &attrs["service_config"];
    assert_eq!(
        service["environment_variables"]["DESTINATION_BUCKET"],
        "destination-ideal-adventure"
    );
    assert_eq!(service["environment_variables"]["PROJECT_ID"], PROJECT);
    assert_eq!(service["environment_variables"]["ENDPOINT_ID"], ENDPOINT);
    assert_eq!(service["min_instance_count"], 0);
    assert_eq!(service["max_instance_count"], 1);
    assert_eq!(
        service["service_account_email"],
        "${google_service_account.function-account.email}"
    );

    assert_eq!(
        function.depends_on,
        vec![
            "asset-bucket",
            "asset-object",
            "destination-bucket",
            "function-account",
            "source-bucket",
        ]
    );
}

/// Test the storage service agent is looked up, never created
#[test]
fn test_lookup_identity_is_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let doc = synth(Variant::Full, package_source(dir.path(), b"package main\n"));

    assert!(doc.resource("storage-account").is_none());
    let lookup = doc.lookup("storage-account").unwrap();
    assert_eq!(lookup.resource_type, "google_storage_project_service_account");

    let binding = doc.resource("storage-account-pubsub").unwrap();
    assert_eq!(binding.resource_type, "google_project_iam_member");
    assert_eq!(binding.attributes["role"], "roles/pubsub.publisher");
    assert_eq!(
        binding.attributes["member"],
        "serviceAccount:${data.google_storage_project_service_account.storage-account.email_address}"
    );
}

/// Test synthesizing twice yields byte-identical documents
#[test]
fn test_synthesis_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let asset = package_source(dir.path(), b"package main\n");
    let stack = stack();
    let graph = build_pipeline(&stack, asset.clone(), Variant::Full).unwrap();

    let first = synthesize(&graph, &synth_options(&stack)).unwrap().to_json().unwrap();
    let second = synthesize(&graph, &synth_options(&stack)).unwrap().to_json().unwrap();
    assert_eq!(first, second);

    // A fresh declaration against the same source matches as well
    let rebuilt = build_pipeline(&stack, asset, Variant::Full).unwrap();
    let third = synthesize(&rebuilt, &synth_options(&stack)).unwrap().to_json().unwrap();
    assert_eq!(first, third);
}

/// Test a source change only renames the artifact object
#[test]
fn test_source_change_renames_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let v1 = package_source(dir.path(), b"package main\n");
    let v2 = package_source(dir.path(), b"package main\n\n");
    assert_ne!(v1.hash, v2.hash);

    let doc1 = synth(Variant::Full, v1.clone());
    let doc2 = synth(Variant::Full, v2.clone());

    assert_eq!(
        doc1.resource("asset-object").unwrap().attributes["name"],
        format!("{}.tar.gz", v1.hash)
    );
    assert_eq!(
        doc2.resource("asset-object").unwrap().attributes["name"],
        format!("{}.tar.gz", v2.hash)
    );
    assert_eq!(
        doc1.resource("source-bucket"),
        doc2.resource("source-bucket")
    );
    assert_ne!(doc1.resource("function"), doc2.resource("function"));
}

/// Test the minimal variant drops the IAM bindings, dataset and bounds
#[test]
fn test_minimal_variant() {
    let dir = tempfile::tempdir().unwrap();
    let doc = synth(Variant::Minimal, package_source(dir.path(), b"package main\n"));

    assert!(doc.resource("function-account-ai").is_none());
    assert!(doc.resource("function-account-storage").is_none());
    assert!(doc.resource("dataset").is_none());

    let service = &doc.resource("function").unwrap().attributes["service_config"];
    assert!(service.get("min_instance_count").is_none());
    assert!(service.get("max_instance_count").is_none());
    assert!(doc.resource("storage-account-pubsub").is_some());
}

/// Test the document carries the backend and provider blocks
#[test]
fn test_backend_and_provider_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let doc = synth(Variant::Full, package_source(dir.path(), b"package main\n"));
    let json: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();

    assert_eq!(json["backend"]["workspace"], "ideal-adventure");
    assert_eq!(json["backend"]["hostname"], "app.terraform.io");
    assert_eq!(json["provider"]["project"], PROJECT);
    assert_eq!(json["provider"]["region"], "us-central1");
    assert_eq!(json["resources"].as_array().unwrap().len(), 11);
    assert_eq!(json["lookups"].as_array().unwrap().len(), 1);
}

/// Test a second bucket with the same name is rejected at declaration
#[test]
fn test_duplicate_bucket_name_collides() {
    let mut graph = GraphBuilder::new();
    graph
        .declare_location("source-bucket", LocationSpec::new("source-ideal-adventure", "us-central1"))
        .unwrap();
    let err = graph
        .declare_location("mirror-bucket", LocationSpec::new("source-ideal-adventure", "us-central1"))
        .unwrap_err();
    assert!(matches!(err, SynthError::NameCollision { namespace: "location", .. }));
}

/// Test a transitive self reference is reported with its full path
#[test]
fn test_cycle_is_reported() {
    let mut graph = GraphBuilder::new();
    let object = |bucket: &str, name: &str| ObjectSpec {
        bucket: Ref::to(bucket, Output::Name).into(),
        name: name.into(),
        source: "/tmp/src".into(),
    };
    graph.declare_object("first", object("second", "first.txt")).unwrap();
    graph.declare_object("second", object("first", "second.txt")).unwrap();

    let err = graph.build().unwrap_err();
    match err {
        SynthError::CyclicDependency { cycle } => {
            assert_eq!(cycle, vec!["first", "second", "first"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Test the asset node is emitted with its hash and staged path
#[test]
fn test_artifact_record() {
    let dir = tempfile::tempdir().unwrap();
    let asset = package_source(dir.path(), b"package main\n");
    let stack = stack();
    let graph = build_pipeline(&stack, asset.clone(), Variant::Full).unwrap();
    let order = topological_order(&graph).unwrap();
    assert_eq!(order.len(), graph.len());

    let doc = synthesize(&graph, &synth_options(&stack)).unwrap();
    let record = doc.resource("asset").unwrap();
    assert_eq!(record.attributes["hash"], asset.hash);
    assert_eq!(record.attributes["type"], "archive");
    assert_eq!(
        doc.resource("asset-object").unwrap().attributes["source"],
        asset.staged_path.to_string_lossy().into_owned()
    );
}

/// Test a lone minimum above the default maximum fails the full variant
#[test]
fn test_min_instances_above_default_max_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let asset = package_source(dir.path(), b"package main\n");
    let mut stack = stack();
    stack.min_instance_count = Some(3);

    let err = build_pipeline(&stack, asset, Variant::Full).unwrap_err();
    assert!(matches!(err, SynthError::InvalidInstanceBounds { min: 3, max: 1 }));
}
