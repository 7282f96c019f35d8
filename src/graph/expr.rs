//! Deferred references between declared nodes
//!
//! A [`Ref`] names an output of another node before that output has a
//! value. Attribute values are [`Expr`]s built from literals and refs; they
//! are only turned into strings during synthesis.

use serde::Serialize;
use std::fmt;

/// Graph-local, stable node identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Output fields a node may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Output {
    Name,
    Email,
    EmailAddress,
    Hash,
    Path,
    ObjectName,
    Uri,
}

impl Output {
    /// Attribute name used in provider placeholders
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::EmailAddress => "email_address",
            Self::Hash => "hash",
            Self::Path => "path",
            Self::ObjectName => "object_name",
            Self::Uri => "uri",
        }
    }
}

/// Placeholder for `output` of `node`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ref {
    pub node: NodeId,
    pub output: Output,
}

impl Ref {
    /// Reference a node by id, whether or not it has been declared yet
    pub fn to(node: impl Into<NodeId>, output: Output) -> Self {
        Self {
            node: node.into(),
            output,
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.output.as_str())
    }
}

/// Attribute value, possibly depending on other nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(String),
    Ref(Ref),
    Concat(Vec<Expr>),
}

impl Expr {
    /// `prefix` followed by the resolved value of `reference`
    pub fn prefixed(prefix: &str, reference: Ref) -> Self {
        Expr::Concat(vec![Expr::Literal(prefix.to_string()), Expr::Ref(reference)])
    }

    /// Push every ref in this expression onto `out`
    pub fn collect_refs(&self, out: &mut Vec<Ref>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ref(r) => out.push(r.clone()),
            Expr::Concat(parts) => parts.iter().for_each(|p| p.collect_refs(out)),
        }
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Expr::Literal(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(s.to_string())
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(s)
    }
}

impl From<&String> for Expr {
    fn from(s: &String) -> Self {
        Expr::Literal(s.clone())
    }
}

impl From<Ref> for Expr {
    fn from(r: Ref) -> Self {
        Expr::Ref(r)
    }
}
