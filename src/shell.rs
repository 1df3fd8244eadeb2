use anyhow::{Context, Result};
use tokio::process::Command;

/// Result of one remote command: exact exit signal plus captured output.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub struct Shell;

impl Shell {
    /// Build the argument list for `ssh`. Kept separate so tests can check
    /// the exact invocation without spawning anything.
    pub fn ssh_args(user: &str, host: &str, cmd: &str) -> Vec<String> {
        vec![
            // Never prompt for passwords or host keys mid-deploy
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            format!("{}@{}", user, host),
            cmd.to_string(),
        ]
    }

    async fn ssh(user: &str, host: &str, cmd: &str) -> Result<CmdOutput> {
        let output = Command::new("ssh")
            .args(Self::ssh_args(user, host, cmd))
            .output()
            .await
            .context("SSH connection failed")?;

        Ok(CmdOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn run_checked(
        user: &str,
        host: &str,
        cmd: &str,
        dry_run: bool,
        echo: bool,
    ) -> Result<String> {
        if dry_run {
            println!("   [DRY RUN] {}@{}: {}", user, host, cmd);
            return Ok(String::new());
        }

        if echo {
            println!("   [{}] $ {}", host, cmd);
        }

        let output = Self::ssh(user, host, cmd).await?;
        if !output.success {
            return Err(anyhow::anyhow!(
                "Remote command failed (Exit: {:?}): STDERR: [{}] STDOUT: [{}]",
                output.code,
                output.stderr.trim(),
                output.stdout.trim()
            ));
        }

        Ok(output.stdout.trim().to_string())
    }

    /// Execute a command on a remote host via SSH. Nonzero exit is fatal.
    pub async fn exec_remote(user: &str, host: &str, cmd: &str, dry_run: bool) -> Result<String> {
        Self::run_checked(user, host, cmd, dry_run, true).await
    }

    /// Like `exec_remote` without echoing the command, for info queries
    /// whose output is parsed rather than shown.
    pub async fn exec_remote_quiet(
        user: &str,
        host: &str,
        cmd: &str,
        dry_run: bool,
    ) -> Result<String> {
        Self::run_checked(user, host, cmd, dry_run, false).await
    }

    /// Warn-only mode: a failing command is data, not an error. Only a
    /// failure to spawn or connect errors.
    pub async fn exec_remote_unchecked(
        user: &str,
        host: &str,
        cmd: &str,
        dry_run: bool,
    ) -> Result<CmdOutput> {
        if dry_run {
            println!("   [DRY RUN] {}@{}: {}", user, host, cmd);
            return Ok(CmdOutput {
                success: true,
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        println!("   [{}] $ {}", host, cmd);
        Self::ssh(user, host, cmd).await
    }
}
