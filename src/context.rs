use crate::deploy::{GitInfo, DEPLOY_USER, GIT_DIR};
use crate::inventory::Inventory;
use crate::roles::RoleMap;

/// Per-invocation deploy state. Built fresh for every run; the dispatcher
/// is the only writer of `current_host`, environment selection the only
/// writer of the role map.
#[derive(Debug, Clone)]
pub struct DeployContext {
    environment: String,
    pub branch: String,
    pub revision: Option<String>,
    pub git_info: Option<GitInfo>,
    pub user: String,
    pub git_dir: String,
    pub dry_run: bool,
    role_map: RoleMap,
    active_roles: Vec<String>,
    current_host: Option<String>,
}

impl DeployContext {
    pub fn new(environment: &str, inventory: &Inventory) -> Self {
        let mut ctx = Self {
            environment: String::new(),
            branch: String::new(),
            revision: None,
            git_info: None,
            user: DEPLOY_USER.to_string(),
            git_dir: GIT_DIR.to_string(),
            dry_run: false,
            role_map: RoleMap::default(),
            active_roles: Vec::new(),
            current_host: None,
        };
        ctx.set_environment(environment, inventory);
        ctx
    }

    /// `prod` shorthand: production environment, master branch.
    pub fn for_production(inventory: &Inventory) -> Self {
        let mut ctx = Self::new("prod", inventory);
        ctx.branch = "master".to_string();
        ctx
    }

    /// Select an environment and (re)resolve the role map. Reselecting the
    /// same environment against an unchanged inventory yields the same map.
    /// The branch defaults to the environment name.
    pub fn set_environment(&mut self, environment: &str, inventory: &Inventory) {
        self.environment = environment.to_string();
        self.role_map = RoleMap::resolve(environment, inventory);
        self.active_roles = self.role_map.active_roles();
        self.branch = environment.to_string();
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn role_map(&self) -> &RoleMap {
        &self.role_map
    }

    pub fn active_roles(&self) -> &[String] {
        &self.active_roles
    }

    pub fn set_current_host(&mut self, host: &str) {
        self.current_host = Some(host.to_string());
    }

    pub fn current_host(&self) -> Option<&str> {
        self.current_host.as_deref()
    }

    /// Union of the active roles' hosts, deduplicated, first-seen order.
    pub fn target_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = Vec::new();
        for role in &self.active_roles {
            if let Some(role_hosts) = self.role_map.hosts(role) {
                for host in role_hosts {
                    if !hosts.contains(host) {
                        hosts.push(host.clone());
                    }
                }
            }
        }
        hosts
    }
}
