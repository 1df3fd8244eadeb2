//! Test suite for the slipway crate.
//! Covers inventory loading, role resolution, guarding, context state and
//! the dry-run deploy dispatch.

use crate::inventory::{Inventory, Server};

fn server(name: &str, host: &str, environment: &str, roles: &[&str]) -> Server {
    Server {
        name: name.to_string(),
        host: host.to_string(),
        environment: environment.to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
    }
}

fn test_inventory(servers: Vec<Server>) -> Inventory {
    Inventory { servers }
}

#[cfg(test)]
mod inventory_tests {
    use super::*;

    #[test]
    fn test_builtin_has_transcript_server() {
        let inventory = Inventory::builtin();
        assert!(!inventory.servers.is_empty());
        let transcript = inventory
            .find_server("transcript")
            .expect("builtin table should define the transcript server");
        assert_eq!(transcript.environment, "prod");
        assert!(transcript.roles.contains(&"transcript".to_string()));
    }

    #[test]
    fn test_parse_inventory_toml() {
        let content = r#"
            [[servers]]
            name = "app"
            host = "app.internal"
            environment = "prod"
            roles = ["transcript"]

            [[servers]]
            name = "bare"
            host = "bare.internal"
            environment = "staging"
        "#;
        let inventory: Inventory = toml::from_str(content).expect("valid inventory TOML");
        assert_eq!(inventory.servers.len(), 2);
        assert_eq!(inventory.servers[0].host, "app.internal");
        // roles default to empty when omitted
        assert!(inventory.servers[1].roles.is_empty());
    }

    #[test]
    fn test_find_server_by_name() {
        let inventory = test_inventory(vec![server("app", "app.internal", "prod", &["web"])]);
        assert!(inventory.find_server("app").is_some());
        assert!(inventory.find_server("missing").is_none());
    }
}

#[cfg(test)]
mod role_map_tests {
    use super::*;
    use crate::roles::RoleMap;

    #[test]
    fn test_resolves_only_matching_environment() {
        let inventory = test_inventory(vec![
            server("a", "host1", "prod", &["x"]),
            server("b", "host2", "staging", &["x"]),
        ]);
        let map = RoleMap::resolve("prod", &inventory);
        assert_eq!(map.hosts("x"), Some(&["host1".to_string()][..]));
    }

    #[test]
    fn test_wildcard_environment_always_included() {
        let inventory = test_inventory(vec![
            server("a", "host1", "all", &["x"]),
            server("b", "host2", "staging", &["x"]),
        ]);
        let map = RoleMap::resolve("staging", &inventory);
        let hosts = map.hosts("x").unwrap();
        assert!(hosts.contains(&"host1".to_string()));
        assert!(hosts.contains(&"host2".to_string()));
    }

    #[test]
    fn test_unknown_role_is_absent() {
        let inventory = test_inventory(vec![server("a", "host1", "prod", &["x"])]);
        let map = RoleMap::resolve("prod", &inventory);
        assert!(
            map.hosts("search").is_none(),
            "role nobody exposes must not appear"
        );
    }

    #[test]
    fn test_role_with_no_hosts_in_environment_is_retained_empty() {
        let inventory = test_inventory(vec![server("a", "host1", "staging", &["x"])]);
        let map = RoleMap::resolve("prod", &inventory);
        assert_eq!(
            map.hosts("x"),
            Some(&[][..]),
            "role exists in the inventory, so the key stays with no hosts"
        );
    }

    #[test]
    fn test_inventory_order_preserved_for_shared_role() {
        let inventory = test_inventory(vec![
            server("a", "host1", "prod", &["x"]),
            server("b", "host2", "prod", &["x"]),
        ]);
        let map = RoleMap::resolve("prod", &inventory);
        assert_eq!(
            map.hosts("x"),
            Some(&["host1".to_string(), "host2".to_string()][..])
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let inventory = test_inventory(vec![
            server("a", "host1", "prod", &["x", "y"]),
            server("b", "host2", "staging", &["y"]),
        ]);
        assert_eq!(
            RoleMap::resolve("prod", &inventory),
            RoleMap::resolve("prod", &inventory)
        );
    }

    #[test]
    fn test_active_roles_excludes_empty() {
        let inventory = test_inventory(vec![
            server("a", "host1", "prod", &["x"]),
            server("b", "host2", "staging", &["y"]),
        ]);
        let map = RoleMap::resolve("prod", &inventory);
        assert_eq!(map.active_roles(), vec!["x".to_string()]);
    }
}

#[cfg(test)]
mod guard_tests {
    use super::*;
    use crate::context::DeployContext;
    use crate::roles::{RoleGuard, RoleMap, RoleRequirement};

    #[test]
    fn test_requirement_permits_member_host() {
        let inventory = test_inventory(vec![
            server("a", "host1", "prod", &["x"]),
            server("b", "host2", "staging", &["x"]),
        ]);
        let map = RoleMap::resolve("prod", &inventory);
        let requirement = RoleRequirement::of(&["x"]);
        assert!(requirement.permits(&map, "host1"));
        assert!(!requirement.permits(&map, "host2"));
    }

    #[test]
    fn test_requirement_denies_on_missing_role() {
        let inventory = test_inventory(vec![server("a", "host1", "prod", &["x"])]);
        let map = RoleMap::resolve("prod", &inventory);
        let requirement = RoleRequirement::of(&["search"]);
        assert!(!requirement.permits(&map, "host1"));
    }

    #[test]
    fn test_requirement_permits_any_of_multiple_roles() {
        let inventory = test_inventory(vec![server("a", "host1", "prod", &["web"])]);
        let map = RoleMap::resolve("prod", &inventory);
        let requirement = RoleRequirement::of(&["search", "web"]);
        assert!(requirement.permits(&map, "host1"));
    }

    #[tokio::test]
    async fn test_guard_runs_task_on_qualifying_host() {
        let inventory = test_inventory(vec![server("a", "host1", "prod", &["x"])]);
        let mut ctx = DeployContext::new("prod", &inventory);
        ctx.set_current_host("host1");

        let outcome = RoleGuard::of(&["x"])
            .run(&ctx, |host| async move {
                assert_eq!(host, "host1");
                Ok(42)
            })
            .await
            .unwrap();
        assert_eq!(outcome.into_value(), Some(42));
    }

    #[tokio::test]
    async fn test_guard_skips_foreign_host_without_running_task() {
        let inventory = test_inventory(vec![
            server("a", "host1", "prod", &["x"]),
            server("b", "host2", "staging", &["x"]),
        ]);
        let mut ctx = DeployContext::new("prod", &inventory);
        ctx.set_current_host("host2");

        let ran = std::cell::Cell::new(false);
        let outcome = RoleGuard::of(&["x"])
            .run(&ctx, |_host| async {
                ran.set(true);
                Ok(())
            })
            .await
            .unwrap();
        assert!(outcome.was_skipped());
        assert!(!ran.get(), "guarded task must not run on a foreign host");
    }

    #[tokio::test]
    async fn test_guard_skips_when_no_current_host() {
        let inventory = test_inventory(vec![server("a", "host1", "prod", &["x"])]);
        let ctx = DeployContext::new("prod", &inventory);

        let outcome = RoleGuard::of(&["x"])
            .run(&ctx, |_host| async { Ok(()) })
            .await
            .unwrap();
        assert!(outcome.was_skipped());
    }
}

#[cfg(test)]
mod context_tests {
    use super::*;
    use crate::context::DeployContext;

    #[test]
    fn test_branch_defaults_to_environment() {
        let inventory = test_inventory(vec![server("a", "host1", "staging", &["x"])]);
        let ctx = DeployContext::new("staging", &inventory);
        assert_eq!(ctx.branch, "staging");
        assert_eq!(ctx.environment(), "staging");
    }

    #[test]
    fn test_production_context_deploys_master() {
        let inventory = Inventory::builtin();
        let ctx = DeployContext::for_production(&inventory);
        assert_eq!(ctx.environment(), "prod");
        assert_eq!(ctx.branch, "master");
    }

    #[test]
    fn test_reselecting_environment_is_idempotent() {
        let inventory = test_inventory(vec![server("a", "host1", "prod", &["x"])]);
        let mut ctx = DeployContext::new("prod", &inventory);
        let before = ctx.role_map().clone();
        ctx.set_environment("prod", &inventory);
        assert_eq!(ctx.role_map(), &before);
        assert_eq!(ctx.active_roles(), &["x".to_string()][..]);
    }

    #[test]
    fn test_switching_environment_reresolves() {
        let inventory = test_inventory(vec![
            server("a", "host1", "prod", &["x"]),
            server("b", "host2", "staging", &["x"]),
        ]);
        let mut ctx = DeployContext::new("prod", &inventory);
        assert_eq!(ctx.target_hosts(), vec!["host1".to_string()]);
        ctx.set_environment("staging", &inventory);
        assert_eq!(ctx.target_hosts(), vec!["host2".to_string()]);
        assert_eq!(ctx.branch, "staging");
    }

    #[test]
    fn test_target_hosts_deduplicated_across_roles() {
        let inventory = test_inventory(vec![
            server("a", "host1", "prod", &["web", "worker"]),
            server("b", "host2", "prod", &["worker"]),
        ]);
        let ctx = DeployContext::new("prod", &inventory);
        assert_eq!(
            ctx.target_hosts(),
            vec!["host1".to_string(), "host2".to_string()]
        );
    }

    #[test]
    fn test_current_host_roundtrip() {
        let inventory = test_inventory(vec![server("a", "host1", "prod", &["x"])]);
        let mut ctx = DeployContext::new("prod", &inventory);
        assert!(ctx.current_host().is_none());
        ctx.set_current_host("host1");
        assert_eq!(ctx.current_host(), Some("host1"));
    }
}

#[cfg(test)]
mod deploy_tests {
    use super::*;
    use crate::context::DeployContext;
    use crate::deploy::Deployer;

    fn dry_run_context(inventory: &Inventory, environment: &str) -> DeployContext {
        let mut ctx = DeployContext::new(environment, inventory);
        ctx.dry_run = true;
        ctx
    }

    #[tokio::test]
    async fn test_dry_run_executes_all_steps_on_role_host() {
        let inventory = test_inventory(vec![server("a", "host1", "prod", &["transcript"])]);
        let mut ctx = dry_run_context(&inventory, "prod");

        let report = Deployer::deploy(&mut ctx, None).await.unwrap();
        assert_eq!(report.hosts.len(), 1);
        assert_eq!(report.hosts[0].host, "host1");
        assert_eq!(report.hosts[0].executed_steps(), 5);
        assert_eq!(report.hosts[0].skipped_steps(), 0);
        // branch defaulted to the environment; dry run pins the branch tip
        assert_eq!(ctx.revision.as_deref(), Some("remotes/origin/prod"));
    }

    #[tokio::test]
    async fn test_dry_run_skips_every_step_on_foreign_role_host() {
        let inventory = test_inventory(vec![
            server("a", "host1", "prod", &["transcript"]),
            server("b", "host2", "prod", &["search"]),
        ]);
        let mut ctx = dry_run_context(&inventory, "prod");

        let report = Deployer::deploy(&mut ctx, None).await.unwrap();
        assert_eq!(report.hosts.len(), 2);

        let by_host = |host: &str| {
            report
                .hosts
                .iter()
                .find(|h| h.host == host)
                .expect("host report")
        };
        assert_eq!(by_host("host1").executed_steps(), 5);
        assert_eq!(by_host("host2").executed_steps(), 0);
        assert_eq!(by_host("host2").skipped_steps(), 5);
    }

    #[tokio::test]
    async fn test_revision_override_survives_deploy() {
        let inventory = test_inventory(vec![server("a", "host1", "prod", &["transcript"])]);
        let mut ctx = dry_run_context(&inventory, "prod");
        ctx.revision = Some("abc123".to_string());

        Deployer::deploy(&mut ctx, None).await.unwrap();
        assert_eq!(ctx.revision.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_branch_override_beats_context_branch() {
        let inventory = test_inventory(vec![server("a", "host1", "prod", &["transcript"])]);
        let mut ctx = dry_run_context(&inventory, "prod");

        Deployer::deploy(&mut ctx, Some("hotfix".to_string()))
            .await
            .unwrap();
        assert_eq!(ctx.revision.as_deref(), Some("remotes/origin/hotfix"));
    }

    #[tokio::test]
    async fn test_environment_without_hosts_deploys_nothing() {
        let inventory = test_inventory(vec![server("a", "host1", "staging", &["transcript"])]);
        let mut ctx = dry_run_context(&inventory, "prod");

        let report = Deployer::deploy(&mut ctx, None).await.unwrap();
        assert!(report.hosts.is_empty());
        assert!(ctx.git_info.is_none());
    }
}

#[cfg(test)]
mod shell_tests {
    use crate::shell::Shell;

    #[test]
    fn test_ssh_args_shape() {
        let args = Shell::ssh_args("transcript", "host1", "uptime");
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"transcript@host1".to_string()));
        assert_eq!(args.last(), Some(&"uptime".to_string()));
    }
}
