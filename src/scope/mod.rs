use anyhow::{Context, Result};

use crate::core::{Scope, ScopeKind, Target};
use crate::exit;

/// Cloud-side lookups the resolver depends on.
pub trait Inventory {
    /// Describes one target; an error means it cannot be reached.
    fn describe_target(&self, id: &str) -> Result<Target>;
    /// Lists the member targets of an umbrella, in the provider's order.
    fn list_targets(&self, umbrella_id: &str) -> Result<Vec<Target>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeRequest {
    pub kind: String,
    pub single_id: Option<String>,
    pub umbrella_id: Option<String>,
}

impl ScopeRequest {
    pub fn project(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Project.as_str().to_string(),
            single_id: Some(id.into()),
            umbrella_id: None,
        }
    }

    pub fn organization(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Organization.as_str().to_string(),
            single_id: None,
            umbrella_id: Some(id.into()),
        }
    }
}

pub fn resolve(request: &ScopeRequest, inventory: &dyn Inventory) -> Result<Scope> {
    let kind = request
        .kind
        .parse::<ScopeKind>()
        .map_err(exit::invalid_scope)?;

    match kind {
        ScopeKind::Project => {
            let id = required_id(request.single_id.as_deref(), "--project", kind)?;
            let target = inventory
                .describe_target(id)
                .with_context(|| format!("project {id} could not be described"))
                .map_err(exit::target_unreachable)?;
            if !target.reachable {
                return Err(exit::target_unreachable(anyhow::anyhow!(
                    "project {id} is not active"
                )));
            }
            Ok(Scope {
                kind,
                requested_id: id.to_string(),
                targets: vec![target],
            })
        }
        ScopeKind::Organization => {
            let id = required_id(request.umbrella_id.as_deref(), "--org", kind)?;
            let listed = inventory
                .list_targets(id)
                .with_context(|| format!("projects of organization {id} could not be listed"))
                .map_err(exit::enumeration_failed)?;

            let mut targets: Vec<Target> = Vec::with_capacity(listed.len());
            for target in listed {
                if !target.reachable {
                    continue;
                }
                if targets.iter().any(|t| t.id == target.id) {
                    continue;
                }
                targets.push(target);
            }
            if targets.is_empty() {
                return Err(exit::empty_scope(format!(
                    "organization {id} has no active projects to assess"
                )));
            }
            Ok(Scope {
                kind,
                requested_id: id.to_string(),
                targets,
            })
        }
    }
}

fn required_id<'a>(id: Option<&'a str>, flag: &str, kind: ScopeKind) -> Result<&'a str> {
    match id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(exit::invalid_scope(format!(
            "scope {kind} requires {flag} <ID>"
        ))),
    }
}

/// Resolves once per run and hands out the same scope afterwards.
pub struct ScopeResolver<'a> {
    inventory: &'a dyn Inventory,
    resolved: Option<Scope>,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(inventory: &'a dyn Inventory) -> Self {
        Self {
            inventory,
            resolved: None,
        }
    }

    pub fn resolve(&mut self, request: &ScopeRequest) -> Result<&Scope> {
        if self.resolved.is_none() {
            self.resolved = Some(resolve(request, self.inventory)?);
        }
        self.resolved
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("scope was not resolved"))
    }
}
