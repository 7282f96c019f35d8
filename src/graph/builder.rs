//! Graph Builder
//!
//! Nodes are declared one at a time and each declaration returns a typed
//! handle. Edges are never declared: they are derived from the refs found in
//! a node's attributes.

use super::expr::{Expr, NodeId, Output, Ref};
use super::spec::{
    Attributes, BindingSpec, FunctionSpec, IdentitySpec, LocationSpec, LookupSpec, ObjectSpec,
    ResourceKind,
};
use crate::asset::AssetDescriptor;
use crate::error::{Result, SynthError};
use crate::naming::{NameResolver, Namespace};
use std::collections::{BTreeSet, HashMap};

/// A declared resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNode {
    id: NodeId,
    attrs: Attributes,
    deps: BTreeSet<NodeId>,
}

impl ResourceNode {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.attrs.kind()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    /// Nodes that must be resolved before this one
    pub fn dependencies(&self) -> &BTreeSet<NodeId> {
        &self.deps
    }
}

/// Handle to a declared service account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityHandle {
    id: NodeId,
}

impl IdentityHandle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// The account id
    pub fn name(&self) -> Ref {
        Ref::to(self.id.clone(), Output::Name)
    }

    pub fn email(&self) -> Ref {
        Ref::to(self.id.clone(), Output::Email)
    }

    /// IAM member string for this account
    pub fn member(&self) -> Expr {
        Expr::prefixed("serviceAccount:", self.email())
    }
}

/// Handle to a declared bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationHandle {
    id: NodeId,
}

impl LocationHandle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn name(&self) -> Ref {
        Ref::to(self.id.clone(), Output::Name)
    }
}

/// Handle to a declared IAM binding; bindings expose no outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingHandle {
    id: NodeId,
}

impl BindingHandle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }
}

/// Handle to a packaged artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    id: NodeId,
}

impl ArtifactHandle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn hash(&self) -> Ref {
        Ref::to(self.id.clone(), Output::Hash)
    }

    /// Staged path of the artifact bytes
    pub fn path(&self) -> Ref {
        Ref::to(self.id.clone(), Output::Path)
    }

    /// Hash-derived object name, e.g. `<hash>.tar.gz`
    pub fn object_name(&self) -> Ref {
        Ref::to(self.id.clone(), Output::ObjectName)
    }
}

/// Handle to an uploaded object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHandle {
    id: NodeId,
}

impl ObjectHandle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn name(&self) -> Ref {
        Ref::to(self.id.clone(), Output::Name)
    }
}

/// Handle to a declared function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionHandle {
    id: NodeId,
}

impl FunctionHandle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn name(&self) -> Ref {
        Ref::to(self.id.clone(), Output::Name)
    }

    pub fn uri(&self) -> Ref {
        Ref::to(self.id.clone(), Output::Uri)
    }
}

/// Handle to an externally owned identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentityHandle {
    id: NodeId,
}

impl ExternalIdentityHandle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn email_address(&self) -> Ref {
        Ref::to(self.id.clone(), Output::EmailAddress)
    }

    pub fn member(&self) -> Expr {
        Expr::prefixed("serviceAccount:", self.email_address())
    }
}

/// Accumulates declarations for one synthesis run
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<ResourceNode>,
    index: HashMap<NodeId, usize>,
    names: NameResolver,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_identity(&mut self, id: &str, spec: IdentitySpec) -> Result<IdentityHandle> {
        let claim = Some((Namespace::Identity, spec.account_id.clone()));
        let id = self.insert(id, Attributes::Identity(spec), claim)?;
        Ok(IdentityHandle { id })
    }

    pub fn declare_location(&mut self, id: &str, spec: LocationSpec) -> Result<LocationHandle> {
        let claim = Some((Namespace::Location, spec.name.clone()));
        let id = self.insert(id, Attributes::Location(spec), claim)?;
        Ok(LocationHandle { id })
    }

    pub fn declare_binding(&mut self, id: &str, spec: BindingSpec) -> Result<BindingHandle> {
        let id = self.insert(id, Attributes::Binding(spec), None)?;
        Ok(BindingHandle { id })
    }

    /// Declare a packaged artifact; its name comes from the content hash
    pub fn declare_artifact(&mut self, id: &str, asset: AssetDescriptor) -> Result<ArtifactHandle> {
        let id = self.insert(id, Attributes::Artifact(asset), None)?;
        Ok(ArtifactHandle { id })
    }

    pub fn declare_object(&mut self, id: &str, spec: ObjectSpec) -> Result<ObjectHandle> {
        // Hash-derived names are resolved from the artifact, not claimed here
        let claim = spec
            .name
            .as_literal()
            .map(|name| (Namespace::Artifact, name.to_string()));
        let id = self.insert(id, Attributes::Object(spec), claim)?;
        Ok(ObjectHandle { id })
    }

    pub fn declare_function(&mut self, id: &str, spec: FunctionSpec) -> Result<FunctionHandle> {
        let claim = Some((Namespace::Function, spec.name.clone()));
        let id = self.insert(id, Attributes::Function(spec), claim)?;
        Ok(FunctionHandle { id })
    }

    /// Reference the project's Cloud Storage service agent without owning it
    pub fn lookup_storage_service_account(
        &mut self,
        id: &str,
        project: &str,
    ) -> Result<ExternalIdentityHandle> {
        let attrs = Attributes::ExternalIdentity(LookupSpec {
            project: project.to_string(),
        });
        let id = self.insert(id, attrs, None)?;
        Ok(ExternalIdentityHandle { id })
    }

    /// Freeze the declarations, rejecting dependency cycles
    pub fn build(self) -> Result<Graph> {
        let graph = Graph {
            nodes: self.nodes,
            index: self.index,
        };
        if let Some(cycle) = graph.find_cycle() {
            return Err(SynthError::CyclicDependency { cycle });
        }
        tracing::debug!("Built graph with {} nodes", graph.len());
        Ok(graph)
    }

    /// Record a node; nothing is claimed or stored if any check fails
    fn insert(
        &mut self,
        id: &str,
        attrs: Attributes,
        claim: Option<(Namespace, String)>,
    ) -> Result<NodeId> {
        let id = NodeId::from(id);
        if self.index.contains_key(&id) {
            return Err(SynthError::DuplicateNode(id.to_string()));
        }

        let deps: BTreeSet<NodeId> = attrs.references().into_iter().map(|r| r.node).collect();
        if deps.contains(&id) {
            return Err(SynthError::CyclicDependency {
                cycle: vec![id.to_string(), id.to_string()],
            });
        }

        if let Some((namespace, name)) = claim {
            self.names.resolve(namespace, id.as_str(), &name)?;
        }

        tracing::debug!(
            "Declared {:?} '{}' depending on {:?}",
            attrs.kind(),
            id,
            deps.iter().map(|d| d.as_str()).collect::<Vec<_>>()
        );

        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(ResourceNode {
            id: id.clone(),
            attrs,
            deps,
        });
        Ok(id)
    }
}

/// Frozen set of declared nodes in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    nodes: Vec<ResourceNode>,
    index: HashMap<NodeId, usize>,
}

impl Graph {
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn node(&self, id: &NodeId) -> Option<&ResourceNode> {
        self.position(id).map(|i| &self.nodes[i])
    }

    /// Declaration index of `id`
    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First cycle found by a DFS in declaration order, as a closed path.
    /// Dependencies on undeclared nodes are ignored here.
    pub(crate) fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        fn visit(
            graph: &Graph,
            node: usize,
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Option<Vec<String>> {
            marks[node] = Mark::Active;
            stack.push(node);

            for dep in &graph.nodes[node].deps {
                let Some(next) = graph.position(dep) else {
                    continue;
                };
                match marks[next] {
                    Mark::Active => {
                        let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                        let mut cycle: Vec<String> = stack[start..]
                            .iter()
                            .map(|&n| graph.nodes[n].id.to_string())
                            .collect();
                        cycle.push(graph.nodes[next].id.to_string());
                        return Some(cycle);
                    }
                    Mark::New => {
                        if let Some(cycle) = visit(graph, next, marks, stack) {
                            return Some(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }

            stack.pop();
            marks[node] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut stack = Vec::new();
        for node in 0..self.nodes.len() {
            if marks[node] == Mark::New {
                if let Some(cycle) = visit(self, node, &mut marks, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::spec::{BindingMode, Scope};

    fn binding(member: Expr) -> BindingSpec {
        BindingSpec {
            member,
            role: "roles/viewer".to_string(),
            scope: Scope::Project("demo-project".to_string()),
            mode: BindingMode::Additive,
        }
    }

    fn object(bucket: Ref, name: &str) -> ObjectSpec {
        ObjectSpec {
            bucket: bucket.into(),
            name: name.into(),
            source: "/tmp/source".into(),
        }
    }

    #[test]
    fn test_edges_derived_from_references() {
        let mut graph = GraphBuilder::new();
        let account = graph
            .declare_identity("account", IdentitySpec::new("function-account"))
            .unwrap();
        let bound = graph.declare_binding("bound", binding(account.member())).unwrap();
        let graph = graph.build().unwrap();

        let node = graph.node(bound.id()).unwrap();
        assert_eq!(node.kind(), ResourceKind::PermissionBinding);
        assert_eq!(
            node.dependencies().iter().collect::<Vec<_>>(),
            vec![account.id()]
        );
        assert!(graph.node(account.id()).unwrap().dependencies().is_empty());
    }

    #[test]
    fn test_duplicate_location_name_collides() {
        let mut graph = GraphBuilder::new();
        graph
            .declare_location("first", LocationSpec::new("shared-name", "us-central1"))
            .unwrap();
        let err = graph
            .declare_location("second", LocationSpec::new("shared-name", "us-central1"))
            .unwrap_err();
        assert!(matches!(err, SynthError::NameCollision { .. }));
    }

    #[test]
    fn test_duplicate_node_id_rejected() {
        let mut graph = GraphBuilder::new();
        graph
            .declare_location("bucket", LocationSpec::new("bucket-one", "us-central1"))
            .unwrap();
        let err = graph
            .declare_location("bucket", LocationSpec::new("bucket-two", "us-central1"))
            .unwrap_err();
        assert!(matches!(err, SynthError::DuplicateNode(id) if id == "bucket"));
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let mut graph = GraphBuilder::new();
        let err = graph
            .declare_object("obj", object(Ref::to("obj", Output::Name), "obj.txt"))
            .unwrap_err();
        match err {
            SynthError::CyclicDependency { cycle } => assert_eq!(cycle, vec!["obj", "obj"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_transitive_cycle_reports_full_path() {
        let mut graph = GraphBuilder::new();
        graph
            .declare_object("a", object(Ref::to("c", Output::Name), "a.txt"))
            .unwrap();
        graph
            .declare_object("b", object(Ref::to("a", Output::Name), "b.txt"))
            .unwrap();
        graph
            .declare_object("c", object(Ref::to("b", Output::Name), "c.txt"))
            .unwrap();

        match graph.build().unwrap_err() {
            SynthError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["a", "c", "b", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_forward_reference_without_cycle_builds() {
        let mut graph = GraphBuilder::new();
        graph
            .declare_object("obj", object(Ref::to("late-bucket", Output::Name), "obj.txt"))
            .unwrap();
        graph
            .declare_location("late-bucket", LocationSpec::new("late-bucket", "us-central1"))
            .unwrap();
        let graph = graph.build().unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_lookup_is_not_named() {
        let mut graph = GraphBuilder::new();
        let agent = graph
            .lookup_storage_service_account("storage-account", "demo-project")
            .unwrap();
        // Same id space, but no name was claimed for the lookup
        graph
            .declare_identity("account", IdentitySpec::new("storage-account"))
            .unwrap();
        let graph = graph.build().unwrap();
        assert!(graph.node(agent.id()).unwrap().kind().is_lookup());
    }
}
