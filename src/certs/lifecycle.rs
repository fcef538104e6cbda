// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client certificate procedures
//!
//! Each procedure checks its arguments, runs the VPN image's own PKI tooling
//! through the orchestration CLI, then applies its local side effects. A failed
//! command is only fatal in strict mode; otherwise it is logged and the
//! procedure carries on with its remaining steps.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::ledger::{ClientAction, ClientLog, LogEntry};
use crate::compose::{CommandOutput, CommandRunner, Compose, Invocation, IoMode};
use crate::config::Config;
use crate::envfile::EnvFile;
use crate::error::{OutpostError, Result};

pub const CREATE_USAGE: &str = "Usage: outpost create-client <client_name>";
pub const REVOKE_USAGE: &str = "Usage: outpost revoke-client <client_name>";

/// Outcome of one procedure
#[derive(Debug, Default)]
pub struct LifecycleReport {
    /// Command lines in the order they were run
    pub commands: Vec<String>,
    /// How many of them failed
    pub commands_failed: usize,
    /// Client configuration written or removed, if any
    pub artifact: Option<PathBuf>,
    /// Whether a log line was appended
    pub logged: bool,
}

impl LifecycleReport {
    pub fn success(&self) -> bool {
        self.commands_failed == 0
    }
}

/// Runs the PKI procedures against a [`CommandRunner`]
pub struct CertManager<'a> {
    runner: &'a dyn CommandRunner,
    compose: Compose,
    env_file: PathBuf,
    conf_dir: PathBuf,
    log: ClientLog,
    nopass: bool,
    strict: bool,
    dry_run: bool,
}

impl<'a> CertManager<'a> {
    pub fn new(config: &Config, runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            compose: Compose::from_config(&config.compose),
            env_file: config.compose.env_file.clone(),
            conf_dir: config.clients.conf_dir.clone(),
            log: ClientLog::new(&config.clients.log_file),
            nopass: config.clients.nopass,
            strict: config.strict,
            dry_run: false,
        }
    }

    /// Skip local side effects (file writes, removals, log lines)
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Stop at the first failed command
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Path of a client's exported configuration
    pub fn client_conf_path(&self, name: &str) -> PathBuf {
        self.conf_dir.join(format!("{}.ovpn", name))
    }

    /// Generate the server configuration and initialise the PKI
    pub async fn init_pki(&self) -> Result<LifecycleReport> {
        let env = EnvFile::load(&self.env_file)?;
        let proto = env.require("PROTO")?;
        let hostname = env.require("HOSTNAME")?;
        let url = format!("{}://{}", proto, hostname);

        info!(url = %url, "Initialising PKI");
        let mut report = LifecycleReport::default();

        let genconfig = self
            .compose
            .run(&["ovpn_genconfig", "-u", url.as_str()], IoMode::Interactive);
        self.step(&genconfig, &mut report).await?;

        let initpki = self.compose.run(&["ovpn_initpki"], IoMode::Interactive);
        self.step(&initpki, &mut report).await?;

        Ok(report)
    }

    /// Issue a client certificate and export its configuration
    pub async fn create_client(&self, name: Option<&str>) -> Result<LifecycleReport> {
        let name = client_name(name, CREATE_USAGE)?;
        info!(client = %name, "Creating client");
        let mut report = LifecycleReport::default();

        let mut build = vec!["easyrsa", "build-client-full", name];
        if self.nopass {
            build.push("nopass");
        }
        let build = self.compose.run(&build, IoMode::Interactive);
        self.step(&build, &mut report).await?;

        let export = self.compose.run(&["ovpn_getclient", name], IoMode::Capture);
        let output = self.step(&export, &mut report).await?;

        if self.dry_run {
            return Ok(report);
        }

        if output.success {
            let path = self.client_conf_path(name);
            write_client_conf(&path, &output.stdout)?;
            info!(path = %path.display(), "Wrote client configuration");
            report.artifact = Some(path);
        } else {
            warn!(client = %name, "No client configuration exported");
        }

        self.log.append(&LogEntry::now(ClientAction::Created, name))?;
        report.logged = true;
        Ok(report)
    }

    /// Revoke a client certificate and drop its exported configuration
    pub async fn revoke_client(&self, name: Option<&str>) -> Result<LifecycleReport> {
        let name = client_name(name, REVOKE_USAGE)?;
        info!(client = %name, "Revoking client");
        let mut report = LifecycleReport::default();

        let revoke = self
            .compose
            .run(&["ovpn_revokeclient", name, "remove"], IoMode::Interactive);
        self.step(&revoke, &mut report).await?;

        if self.dry_run {
            return Ok(report);
        }

        let path = self.client_conf_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Removed client configuration");
                report.artifact = Some(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.log.append(&LogEntry::now(ClientAction::Revoked, name))?;
        report.logged = true;
        Ok(report)
    }

    /// Run one command, applying the strict/lenient failure policy
    async fn step(&self, invocation: &Invocation, report: &mut LifecycleReport) -> Result<CommandOutput> {
        report.commands.push(invocation.display());

        let output = match self.runner.run(invocation).await {
            Ok(output) => output,
            Err(e) if !self.strict => CommandOutput {
                success: false,
                code: None,
                stdout: String::new(),
                stderr: e.to_string(),
            },
            Err(e) => return Err(e),
        };

        if output.success {
            return Ok(output);
        }

        report.commands_failed += 1;
        if self.strict {
            return output.into_result(invocation);
        }

        warn!(
            command = %invocation.display(),
            code = ?output.code,
            "Command failed; continuing"
        );
        Ok(output)
    }
}

fn client_name<'n>(name: Option<&'n str>, usage: &str) -> Result<&'n str> {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() && !name.contains(['/', '\\']) => Ok(name),
        _ => Err(OutpostError::Usage {
            usage: usage.to_string(),
        }),
    }
}

fn write_client_conf(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, contents)?;
    Ok(())
}
