use anyhow::Result;
use serde::Serialize;

use crate::context::DeployContext;
use crate::roles::{Outcome, RoleGuard};
use crate::shell::Shell;

pub const REPO: &str = "git@github.com:archive-tools/transcript-editor.git";
pub const DEPLOY_USER: &str = "transcript";
pub const GIT_DIR: &str = "/opt/transcript/transcript-editor";
pub const SERVICE: &str = "transcript";

const APP_ROLE: &str = "transcript";
const RAKE_PROJECT: &str = "archives";

fn app_guard() -> RoleGuard {
    RoleGuard::of(&[APP_ROLE])
}

/// Snapshot of the remote branch taken once per run, before syncing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitInfo {
    pub revision: String,
    pub previous_commit: String,
    pub deployed_commit: String,
    pub changed_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    pub executed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub host: String,
    pub steps: Vec<StepReport>,
}

impl HostReport {
    pub fn executed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.executed).count()
    }

    pub fn skipped_steps(&self) -> usize {
        self.steps.len() - self.executed_steps()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeployReport {
    pub hosts: Vec<HostReport>,
}

pub struct Deployer;

impl Deployer {
    /// Full deploy sequence: one host at a time, steps in order within a
    /// host. The first failing remote command aborts the whole run,
    /// remaining hosts included.
    pub async fn deploy(ctx: &mut DeployContext, branch: Option<String>) -> Result<DeployReport> {
        let branch = branch.unwrap_or_else(|| ctx.branch.clone());
        let hosts = ctx.target_hosts();

        if hosts.is_empty() {
            println!(
                "⚠️  No hosts hold any role in '{}'. Nothing to do.",
                ctx.environment()
            );
            return Ok(DeployReport::default());
        }

        println!(
            "🚀 Deploying branch '{}' to {} host(s) in '{}'...",
            branch,
            hosts.len(),
            ctx.environment()
        );

        let mut report = DeployReport::default();
        for host in hosts {
            println!("\n--- {} ---", host);
            ctx.set_current_host(&host);

            let mut steps = Vec::new();
            let outcome = Self::ensure_repo(ctx).await?;
            steps.push(StepReport {
                step: "ensure-repo",
                executed: outcome.was_executed(),
            });
            let outcome = Self::fetch_git_info(ctx, &branch).await?;
            steps.push(StepReport {
                step: "git-info",
                executed: outcome.was_executed(),
            });
            let outcome = Self::sync_repo(ctx, &branch).await?;
            steps.push(StepReport {
                step: "sync-repo",
                executed: outcome.was_executed(),
            });
            let outcome = Self::install(ctx).await?;
            steps.push(StepReport {
                step: "install",
                executed: outcome.was_executed(),
            });
            let outcome = Self::restart(ctx).await?;
            steps.push(StepReport {
                step: "restart",
                executed: outcome.was_executed(),
            });

            let host_report = HostReport { host, steps };
            println!(
                "   ✔ {} step(s) run, {} skipped",
                host_report.executed_steps(),
                host_report.skipped_steps()
            );
            report.hosts.push(host_report);
        }

        Ok(report)
    }

    /// Clone the repository when the deploy directory is missing. The
    /// existence check is the only warn-only command in the sequence.
    pub async fn ensure_repo(ctx: &DeployContext) -> Result<Outcome<()>> {
        let user = ctx.user.clone();
        let git_dir = ctx.git_dir.clone();
        let dry_run = ctx.dry_run;

        app_guard()
            .run(ctx, |host| async move {
                let check = Shell::exec_remote_unchecked(
                    &user,
                    &host,
                    &format!("test -d {}", git_dir),
                    dry_run,
                )
                .await?;
                if !check.success {
                    println!("   📥 Deploy directory missing, cloning...");
                    Shell::exec_remote(&user, &host, &format!("git clone {}", REPO), dry_run)
                        .await?;
                }
                Ok(())
            })
            .await
    }

    /// Snapshot the remote branch: revision to check out, commits on both
    /// sides of the update, changed files. Taken once per run; later hosts
    /// reuse it. Also fills the revision unless `-r` pinned one already.
    pub async fn fetch_git_info(ctx: &mut DeployContext, branch: &str) -> Result<Outcome<()>> {
        // Guard before the memoization check, so a host outside the role
        // reports a skip even once the snapshot exists.
        if !app_guard().permits(ctx) {
            return Ok(Outcome::Skipped);
        }

        if ctx.git_info.is_none() {
            let user = ctx.user.clone();
            let git_dir = ctx.git_dir.clone();
            let dry_run = ctx.dry_run;
            let branch = branch.to_string();

            let outcome = app_guard()
                .run(&*ctx, |host| async move {
                    if dry_run {
                        // No live output to parse; the branch tip stands in
                        // for the revision.
                        return Ok(GitInfo {
                            revision: format!("remotes/origin/{}", branch),
                            previous_commit: String::new(),
                            deployed_commit: String::new(),
                            changed_files: Vec::new(),
                        });
                    }

                    let fetch = format!(
                        "cd {0} && git fetch -q origin +{1}:remotes/origin/{1}",
                        git_dir, branch
                    );
                    Shell::exec_remote_quiet(&user, &host, &fetch, false).await?;

                    let revision = Shell::exec_remote_quiet(
                        &user,
                        &host,
                        &format!("cd {} && git rev-parse remotes/origin/{}", git_dir, branch),
                        false,
                    )
                    .await?;
                    let changed = Shell::exec_remote_quiet(
                        &user,
                        &host,
                        &format!(
                            "cd {0} && git diff --no-color --name-only remotes/origin/{1} | cat",
                            git_dir, branch
                        ),
                        false,
                    )
                    .await?;
                    let previous_commit = Shell::exec_remote_quiet(
                        &user,
                        &host,
                        &format!(
                            "cd {} && git log --no-color -1 --full-history HEAD | cat",
                            git_dir
                        ),
                        false,
                    )
                    .await?;
                    let deployed_commit = Shell::exec_remote_quiet(
                        &user,
                        &host,
                        &format!(
                            "cd {0} && git log --no-color -1 --full-history remotes/origin/{1} | cat",
                            git_dir, branch
                        ),
                        false,
                    )
                    .await?;

                    Ok(GitInfo {
                        revision,
                        previous_commit,
                        deployed_commit,
                        changed_files: changed
                            .lines()
                            .filter(|l| !l.trim().is_empty())
                            .map(str::to_string)
                            .collect(),
                    })
                })
                .await?;

            match outcome {
                Outcome::Executed(info) => {
                    println!("   🔎 Branch tip is {}", info.revision);
                    if !info.changed_files.is_empty() {
                        println!("   📄 {} file(s) will change:", info.changed_files.len());
                        for file in &info.changed_files {
                            println!("      - {}", file);
                        }
                    }
                    ctx.git_info = Some(info);
                }
                Outcome::Skipped => return Ok(Outcome::Skipped),
            }
        }

        if ctx.revision.is_none() {
            if let Some(info) = &ctx.git_info {
                ctx.revision = Some(info.revision.clone());
            }
        }

        Ok(Outcome::Executed(()))
    }

    /// Force the working tree to the fetched branch, then pin the checkout
    /// to the resolved revision.
    pub async fn sync_repo(ctx: &DeployContext, branch: &str) -> Result<Outcome<()>> {
        let user = ctx.user.clone();
        let git_dir = ctx.git_dir.clone();
        let dry_run = ctx.dry_run;
        let branch = branch.to_string();
        let revision = ctx.revision.clone();

        app_guard()
            .run(ctx, |host| async move {
                let revision = revision
                    .ok_or_else(|| anyhow::anyhow!("No revision resolved for checkout"))?;

                let fetch = format!(
                    "cd {0} && git fetch -q origin +{1}:remotes/origin/{1}",
                    git_dir, branch
                );
                Shell::exec_remote(&user, &host, &fetch, dry_run).await?;
                Shell::exec_remote(
                    &user,
                    &host,
                    &format!("cd {0} && git reset --hard remotes/origin/{1}", git_dir, branch),
                    dry_run,
                )
                .await?;
                Shell::exec_remote(
                    &user,
                    &host,
                    &format!("cd {} && git checkout {}", git_dir, revision),
                    dry_run,
                )
                .await?;
                Ok(())
            })
            .await
    }

    /// Bundler install, config symlinks, database setup, project load.
    pub async fn install(ctx: &DeployContext) -> Result<Outcome<()>> {
        let user = ctx.user.clone();
        let git_dir = ctx.git_dir.clone();
        let dry_run = ctx.dry_run;

        app_guard()
            .run(ctx, |host| async move {
                let commands = [
                    format!("cd {} && bundle install --path vendor/bundle", git_dir),
                    format!(
                        "cd {} && (test -e config/application.yml || ln -s /etc/transcript-editor/application.yml config/application.yml)",
                        git_dir
                    ),
                    format!(
                        "cd {} && (test -e config/database.yml || ln -s /etc/transcript-editor/database.yml config/database.yml)",
                        git_dir
                    ),
                    format!(
                        "cd {} && (RAILS_ENV=production rake db:version || RAILS_ENV=production rake db:setup)",
                        git_dir
                    ),
                    format!(
                        "cd {} && RAILS_ENV=production rake 'project:load[{}]'",
                        git_dir, RAKE_PROJECT
                    ),
                ];
                for cmd in &commands {
                    Shell::exec_remote(&user, &host, cmd, dry_run).await?;
                }
                Ok(())
            })
            .await
    }

    pub async fn restart(ctx: &DeployContext) -> Result<Outcome<()>> {
        let user = ctx.user.clone();
        let dry_run = ctx.dry_run;

        app_guard()
            .run(ctx, |host| async move {
                println!("   ♻️  Restarting {}...", SERVICE);
                Shell::exec_remote(
                    &user,
                    &host,
                    &format!("sudo systemctl restart {}", SERVICE),
                    dry_run,
                )
                .await?;
                Ok(())
            })
            .await
    }
}
