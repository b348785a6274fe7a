//! Chart deployment through the `helm` binary
//!
//! Values are streamed on stdin so rendered overrides never touch disk.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::installer::error::{Error, Result};
use crate::installer::pipeline::{ChartDeployer, ChartRelease};

/// Default wait for `helm upgrade --wait`
pub const DEFAULT_HELM_TIMEOUT: Duration = Duration::from_secs(300);

/// [`ChartDeployer`] backed by the helm CLI
#[derive(Clone, Debug)]
pub struct HelmCli {
    /// Path or name of the helm binary
    pub binary: String,
    /// Block until the release's resources are ready
    pub wait: bool,
    pub timeout: Duration,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self {
            binary: "helm".to_string(),
            wait: true,
            timeout: DEFAULT_HELM_TIMEOUT,
        }
    }
}

impl HelmCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Default::default()
        }
    }

    /// Arguments for an idempotent install of `release`, values read from stdin
    pub fn upgrade_args(&self, release: &ChartRelease) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            release.name.clone(),
            release.chart.clone(),
            "--namespace".to_string(),
            release.namespace.clone(),
            "--create-namespace".to_string(),
            "-f".to_string(),
            "-".to_string(),
        ];
        if self.wait {
            args.push("--wait".to_string());
            args.push("--timeout".to_string());
            args.push(format!("{}s", self.timeout.as_secs()));
        }
        args
    }

    pub fn uninstall_args(&self, release: &ChartRelease) -> Vec<String> {
        vec![
            "uninstall".to_string(),
            release.name.clone(),
            "--namespace".to_string(),
            release.namespace.clone(),
        ]
    }

    /// Run helm with `args`, optionally feeding `stdin`, and return stdout
    async fn run(&self, args: &[String], stdin: Option<&str>) -> Result<String> {
        debug!(binary = %self.binary, args = ?args, "Running helm");

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // The pipe is closed at the end of the match so helm sees EOF.
        // A failed write is only reported after the child is reaped, and only
        // if helm itself succeeded; otherwise its stderr explains more.
        let written = match (stdin, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => pipe.write_all(input.as_bytes()).await,
            _ => Ok(()),
        };

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(Error::DeployError {
                command: format!("{} {}", self.binary, args.join(" ")),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        written?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ChartDeployer for HelmCli {
    async fn deploy(&self, release: &ChartRelease) -> Result<()> {
        self.run(&self.upgrade_args(release), Some(&release.values))
            .await?;
        info!(release = %release.name, namespace = %release.namespace, "Chart deployed");
        Ok(())
    }

    async fn uninstall(&self, release: &ChartRelease) -> Result<()> {
        self.run(&self.uninstall_args(release), None).await?;
        info!(release = %release.name, namespace = %release.namespace, "Chart release removed");
        Ok(())
    }
}
