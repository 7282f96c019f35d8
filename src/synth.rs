//! Graph Synthesizer
//!
//! Orders a frozen [`Graph`] topologically and emits one record per node with
//! every reference replaced by its final value. Values only the provisioning
//! engine can know (service account emails, function URIs, lookup results)
//! are emitted as `${type.id.attr}` placeholders.

use crate::error::{Result, SynthError};
use crate::graph::{
    Attributes, BindingMode, Expr, Graph, NodeId, Output, Ref, ResourceKind, ResourceNode, Scope,
};
use crate::naming::name_artifact;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Remote workspace the document is associated with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    pub hostname: String,
    pub organization: String,
    pub workspace: String,
}

/// Provider defaults applied to every resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderBlock {
    pub project: String,
    pub region: String,
}

#[derive(Debug, Clone, Default)]
pub struct SynthOptions {
    pub backend: Option<Backend>,
    pub provider: Option<ProviderBlock>,
}

/// One emitted node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRecord {
    pub id: String,
    pub kind: ResourceKind,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub depends_on: Vec<String>,
    pub attributes: Value,
}

/// Serialized resource graph handed to the provisioning engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderBlock>,
    /// Read-only references to resources owned elsewhere
    pub lookups: Vec<ResourceRecord>,
    /// Resources to create, in dependency order
    pub resources: Vec<ResourceRecord>,
}

impl Document {
    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn resource(&self, id: &str) -> Option<&ResourceRecord> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn lookup(&self, id: &str) -> Option<&ResourceRecord> {
        self.lookups.iter().find(|r| r.id == id)
    }
}

/// Emit `graph` as a document. Nothing is returned unless every node resolves.
pub fn synthesize(graph: &Graph, options: &SynthOptions) -> Result<Document> {
    let order = topological_order(graph)?;
    let resolver = Resolver { graph };

    let mut lookups = Vec::new();
    let mut resources = Vec::new();

    for index in order {
        let node = &graph.nodes()[index];
        let record = ResourceRecord {
            id: node.id().to_string(),
            kind: node.kind(),
            resource_type: node.attributes().provider_type().to_string(),
            depends_on: node.dependencies().iter().map(|d| d.to_string()).collect(),
            attributes: resolver.attributes(node)?,
        };
        if node.kind().is_lookup() {
            lookups.push(record);
        } else {
            resources.push(record);
        }
    }

    tracing::info!(
        "Synthesized {} resources and {} lookups",
        resources.len(),
        lookups.len()
    );

    Ok(Document {
        backend: options.backend.clone(),
        provider: options.provider.clone(),
        lookups,
        resources,
    })
}

/// Declaration indices in dependency order; ties keep declaration order
pub fn topological_order(graph: &Graph) -> Result<Vec<usize>> {
    validate_references(graph)?;

    let n = graph.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (index, node) in graph.nodes().iter().enumerate() {
        for dep in node.dependencies() {
            let Some(dep_index) = graph.position(dep) else {
                continue;
            };
            in_degree[index] += 1;
            dependents[dep_index].push(index);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse(index)) = ready.pop() {
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() != n {
        return Err(SynthError::CyclicDependency {
            cycle: graph.find_cycle().unwrap_or_default(),
        });
    }

    Ok(order)
}

/// Group nodes by DAG depth. Nodes in one phase share no edges and may be
/// applied concurrently; phase N only depends on phases before it.
pub fn plan_phases(graph: &Graph) -> Result<Vec<Vec<NodeId>>> {
    let order = topological_order(graph)?;
    let mut depth = vec![0usize; graph.len()];
    let mut phases: Vec<Vec<NodeId>> = Vec::new();

    for index in order {
        let node = &graph.nodes()[index];
        let d = node
            .dependencies()
            .iter()
            .filter_map(|dep| graph.position(dep))
            .map(|dep| depth[dep] + 1)
            .max()
            .unwrap_or(0);
        depth[index] = d;

        if phases.len() <= d {
            phases.resize_with(d + 1, Vec::new);
        }
        phases[d].push(node.id().clone());
    }

    Ok(phases)
}

/// Every ref must name a declared node and an output that node exposes
fn validate_references(graph: &Graph) -> Result<()> {
    for node in graph.nodes() {
        for reference in node.attributes().references() {
            let exposed = graph
                .node(&reference.node)
                .map(|target| target.kind().exposes(reference.output))
                .unwrap_or(false);
            if !exposed {
                return Err(unresolved(node.id(), &reference));
            }
        }
    }
    Ok(())
}

fn unresolved(node: &NodeId, reference: &Ref) -> SynthError {
    SynthError::UnresolvedReference {
        node: node.to_string(),
        reference: reference.to_string(),
    }
}

/// Provider placeholder for a value computed at apply time
fn placeholder(node: &ResourceNode, output: Output) -> String {
    let prefix = if node.kind().is_lookup() { "data." } else { "" };
    format!(
        "${{{}{}.{}.{}}}",
        prefix,
        node.attributes().provider_type(),
        node.id(),
        output.as_str()
    )
}

struct Resolver<'a> {
    graph: &'a Graph,
}

impl Resolver<'_> {
    fn expr(&self, from: &NodeId, expr: &Expr) -> Result<String> {
        match expr {
            Expr::Literal(s) => Ok(s.clone()),
            Expr::Ref(r) => self.reference(from, r),
            Expr::Concat(parts) => parts
                .iter()
                .map(|p| self.expr(from, p))
                .collect::<Result<Vec<_>>>()
                .map(|parts| parts.concat()),
        }
    }

    fn reference(&self, from: &NodeId, r: &Ref) -> Result<String> {
        let target = self
            .graph
            .node(&r.node)
            .filter(|t| t.kind().exposes(r.output))
            .ok_or_else(|| unresolved(from, r))?;

        let value = match (target.attributes(), r.output) {
            (Attributes::Identity(spec), Output::Name) => spec.account_id.clone(),
            (Attributes::Location(spec), Output::Name) => spec.name.clone(),
            (Attributes::Artifact(asset), Output::Hash) => asset.hash.clone(),
            (Attributes::Artifact(asset), Output::Path) => {
                asset.staged_path.to_string_lossy().into_owned()
            }
            (Attributes::Artifact(asset), Output::ObjectName) => {
                name_artifact(&asset.hash, &asset.extension)
            }
            (Attributes::Object(spec), Output::Name) => self.expr(target.id(), &spec.name)?,
            (Attributes::Function(spec), Output::Name) => spec.name.clone(),
            _ => placeholder(target, r.output),
        };
        Ok(value)
    }

    fn attributes(&self, node: &ResourceNode) -> Result<Value> {
        let id = node.id();
        let value = match node.attributes() {
            Attributes::Identity(spec) => {
                let mut map = Map::new();
                map.insert("account_id".into(), json!(spec.account_id));
                if let Some(display_name) = &spec.display_name {
                    map.insert("display_name".into(), json!(display_name));
                }
                Value::Object(map)
            }
            Attributes::Location(spec) => json!({
                "name": spec.name,
                "location": spec.location,
                "force_destroy": spec.force_destroy,
                "uniform_bucket_level_access": spec.uniform_bucket_level_access,
            }),
            Attributes::Binding(spec) => {
                let member = self.expr(id, &spec.member)?;
                let Scope::Project(project) = &spec.scope;
                match spec.mode {
                    BindingMode::Authoritative => json!({
                        "project": project,
                        "role": spec.role,
                        "members": [member],
                    }),
                    BindingMode::Additive => json!({
                        "project": project,
                        "role": spec.role,
                        "member": member,
                    }),
                }
            }
            Attributes::Artifact(asset) => json!({
                "type": asset.asset_type,
                "source": asset.source_path.to_string_lossy(),
                "path": asset.staged_path.to_string_lossy(),
                "hash": asset.hash,
            }),
            Attributes::Object(spec) => json!({
                "bucket": self.expr(id, &spec.bucket)?,
                "name": self.expr(id, &spec.name)?,
                "source": self.expr(id, &spec.source)?,
            }),
            Attributes::Function(spec) => {
                let mut map = Map::new();
                map.insert("name".into(), json!(spec.name));
                map.insert("location".into(), json!(spec.location));
                if let Some(description) = &spec.description {
                    map.insert("description".into(), json!(description));
                }
                map.insert(
                    "build_config".into(),
                    json!({
                        "entry_point": spec.build.entry_point,
                        "runtime": spec.build.runtime,
                        "source": {
                            "storage_source": {
                                "bucket": self.expr(id, &spec.build.source.bucket)?,
                                "object": self.expr(id, &spec.build.source.object)?,
                            }
                        }
                    }),
                );

                if let Some(trigger) = &spec.event_trigger {
                    let filters = trigger
                        .filters
                        .iter()
                        .map(|f| -> Result<Value> {
                            Ok(json!({
                                "attribute": f.attribute,
                                "value": self.expr(id, &f.value)?,
                            }))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let mut event = Map::new();
                    event.insert("event_type".into(), json!(trigger.event_type));
                    event.insert("event_filters".into(), Value::Array(filters));
                    if let Some(region) = &trigger.trigger_region {
                        event.insert("trigger_region".into(), json!(region));
                    }
                    if let Some(policy) = trigger.retry_policy {
                        event.insert("retry_policy".into(), json!(policy.as_str()));
                    }
                    map.insert("event_trigger".into(), Value::Object(event));
                }

                let mut environment = Map::new();
                for (key, value) in &spec.service.environment {
                    environment.insert(key.clone(), json!(self.expr(id, value)?));
                }
                let mut service = Map::new();
                service.insert("environment_variables".into(), Value::Object(environment));
                if let Some(min) = spec.service.min_instance_count {
                    service.insert("min_instance_count".into(), json!(min));
                }
                if let Some(max) = spec.service.max_instance_count {
                    service.insert("max_instance_count".into(), json!(max));
                }
                if let Some(memory) = &spec.service.available_memory {
                    service.insert("available_memory".into(), json!(memory));
                }
                if let Some(timeout) = spec.service.timeout_seconds {
                    service.insert("timeout_seconds".into(), json!(timeout));
                }
                service.insert(
                    "service_account_email".into(),
                    json!(self.expr(id, &spec.service.service_account_email)?),
                );
                map.insert("service_config".into(), Value::Object(service));

                Value::Object(map)
            }
            Attributes::ExternalIdentity(spec) => json!({ "project": spec.project }),
        };
        Ok(value)
    }
}
