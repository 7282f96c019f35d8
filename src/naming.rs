//! Name Resolver
//!
//! Final names for declared resources. Each namespace is independent: a
//! bucket and a service account may share a name, two buckets may not.
//! Artifact object names are derived from the content hash and are never
//! considered collisions.

use crate::error::{Result, SynthError};
use std::collections::HashMap;

/// Independent naming namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Identity,
    Location,
    Artifact,
    Function,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Location => "location",
            Self::Artifact => "artifact",
            Self::Function => "function",
        }
    }
}

/// Name of the object holding the artifact with `hash`
pub fn name_artifact(hash: &str, extension: &str) -> String {
    format!("{}.{}", hash, extension.trim_start_matches('.'))
}

/// Registry of claimed names, owned by one graph builder
#[derive(Debug, Default)]
pub struct NameResolver {
    /// (namespace, final name) -> node that claimed it
    claimed: HashMap<(Namespace, String), String>,
}

impl NameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `base` as the final name of `node` within `namespace`
    pub fn resolve(&mut self, namespace: Namespace, node: &str, base: &str) -> Result<String> {
        validate_name(namespace, base)?;

        if let Some(first) = self.owner(namespace, base) {
            return Err(SynthError::NameCollision {
                namespace: namespace.as_str(),
                name: base.to_string(),
                first: first.to_string(),
                second: node.to_string(),
            });
        }

        tracing::debug!("Resolved {} name '{}' for node '{}'", namespace.as_str(), base, node);
        self.claimed.insert((namespace, base.to_string()), node.to_string());
        Ok(base.to_string())
    }

    /// Node that claimed `name` in `namespace`, if any
    pub fn owner(&self, namespace: Namespace, name: &str) -> Option<&str> {
        self.claimed
            .get(&(namespace, name.to_string()))
            .map(|s| s.as_str())
    }
}

fn validate_name(namespace: Namespace, name: &str) -> Result<()> {
    let check = match namespace {
        Namespace::Identity => validate_account_id(name),
        Namespace::Location => validate_bucket_name(name),
        Namespace::Function => validate_function_name(name),
        Namespace::Artifact => validate_object_name(name),
    };
    check.map_err(|reason| SynthError::InvalidName {
        namespace: namespace.as_str(),
        name: name.to_string(),
        reason,
    })
}

/// Service account ids must be 6-30 characters, lowercase letters, digits
/// and hyphens, start with a letter and not end with a hyphen
fn validate_account_id(id: &str) -> std::result::Result<(), &'static str> {
    if id.len() < 6 || id.len() > 30 {
        return Err("must be 6-30 characters");
    }
    match id.chars().next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return Err("must start with a lowercase letter"),
    }
    if id.ends_with('-') {
        return Err("must not end with a hyphen");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("may only contain lowercase letters, digits and hyphens");
    }
    Ok(())
}

fn validate_bucket_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.len() < 3 || name.len() > 63 {
        return Err("must be 3-63 characters");
    }
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !name.starts_with(alnum) || !name.ends_with(alnum) {
        return Err("must start and end with a lowercase letter or digit");
    }
    if !name
        .chars()
        .all(|c| alnum(c) || c == '-' || c == '_' || c == '.')
    {
        return Err("may only contain lowercase letters, digits, '-', '_' and '.'");
    }
    Ok(())
}

fn validate_function_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() || name.len() > 63 {
        return Err("must be 1-63 characters");
    }
    match name.chars().next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return Err("must start with a lowercase letter"),
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("may only contain lowercase letters, digits and hyphens");
    }
    Ok(())
}

fn validate_object_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() || name.len() > 1024 {
        return Err("must be 1-1024 bytes");
    }
    if name.contains(['\r', '\n']) {
        return Err("must not contain line breaks");
    }
    Ok(())
}
