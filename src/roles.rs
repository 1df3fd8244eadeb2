use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;

use crate::context::DeployContext;
use crate::inventory::{Inventory, ENV_ALL};

/// Role name -> hosts holding that role, resolved for one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleMap {
    roles: BTreeMap<String, Vec<String>>,
}

impl RoleMap {
    pub fn resolve(environment: &str, inventory: &Inventory) -> Self {
        let mut roles: BTreeMap<String, Vec<String>> = BTreeMap::new();

        // Every role named anywhere in the inventory gets a key, even when
        // no host holds it in the selected environment.
        for server in &inventory.servers {
            for role in &server.roles {
                roles.entry(role.clone()).or_default();
            }
        }

        for (role, hosts) in roles.iter_mut() {
            for server in &inventory.servers {
                if server.roles.iter().any(|r| r == role)
                    && (server.environment == environment || server.environment == ENV_ALL)
                {
                    hosts.push(server.host.clone());
                }
            }
        }

        Self { roles }
    }

    pub fn hosts(&self, role: &str) -> Option<&[String]> {
        self.roles.get(role).map(|h| h.as_slice())
    }

    pub fn contains(&self, role: &str, host: &str) -> bool {
        self.roles
            .get(role)
            .is_some_and(|hosts| hosts.iter().any(|h| h == host))
    }

    /// Roles that resolved to at least one host.
    pub fn active_roles(&self) -> Vec<String> {
        self.roles
            .iter()
            .filter(|(_, hosts)| !hosts.is_empty())
            .map(|(role, _)| role.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.roles.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Roles a step is restricted to, fixed when the step is defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRequirement {
    roles: Vec<String>,
}

impl RoleRequirement {
    pub fn of(roles: &[&str]) -> Self {
        Self {
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// True when the host appears under at least one required role. A role
    /// absent from the map counts as an empty host list.
    pub fn permits(&self, map: &RoleMap, host: &str) -> bool {
        self.roles.iter().any(|role| map.contains(role, host))
    }
}

/// Outcome of a guarded step. A skip is not a success and not a failure,
/// it means the step did not apply to the current host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    Executed(T),
    Skipped,
}

impl<T> Outcome<T> {
    pub fn was_executed(&self) -> bool {
        matches!(self, Outcome::Executed(_))
    }

    pub fn was_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped)
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Executed(value) => Some(value),
            Outcome::Skipped => None,
        }
    }
}

/// Gate that only lets a step run on hosts holding one of its required
/// roles. Without it every step would run on every dispatched host.
pub struct RoleGuard {
    requirement: RoleRequirement,
}

impl RoleGuard {
    pub fn of(roles: &[&str]) -> Self {
        Self {
            requirement: RoleRequirement::of(roles),
        }
    }

    pub fn permits(&self, ctx: &DeployContext) -> bool {
        match ctx.current_host() {
            Some(host) => self.requirement.permits(ctx.role_map(), host),
            None => false,
        }
    }

    /// Run `task` against the current host only when it qualifies. A
    /// mismatch returns `Skipped` without invoking the task; task errors
    /// propagate as-is.
    pub async fn run<T, F, Fut>(&self, ctx: &DeployContext, task: F) -> Result<Outcome<T>>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let host = match ctx.current_host() {
            Some(host) => host.to_string(),
            None => return Ok(Outcome::Skipped),
        };
        if !self.requirement.permits(ctx.role_map(), &host) {
            return Ok(Outcome::Skipped);
        }
        Ok(Outcome::Executed(task(host).await?))
    }
}
