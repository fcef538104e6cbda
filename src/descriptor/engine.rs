// SPDX-License-Identifier: AGPL-3.0-or-later
//! Handoff to the external reconciliation engine

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::{info, warn};

use super::render::render;
use super::DescriptorSet;
use crate::compose::{CommandRunner, Invocation, IoMode};
use crate::config::EngineConfig;
use crate::error::{OutpostError, Result};

/// File name of the rendered configuration inside the work directory
pub const RENDERED_FILE: &str = "main.tf.json";

/// Provider tokens, read once per run
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// namespace -> (variable name, token)
    tokens: BTreeMap<String, (String, String)>,
}

impl Credentials {
    /// Placeholder used when rendering for display
    pub const REDACTED: &'static str = "<redacted>";

    /// Read every binding's `token_env` from the process environment
    pub fn from_env(set: &DescriptorSet) -> Result<Self> {
        let mut tokens = BTreeMap::new();

        for binding in &set.providers {
            let Some(var) = &binding.token_env else {
                continue;
            };
            match std::env::var(var) {
                Ok(token) if !token.is_empty() => {
                    tokens.insert(binding.namespace.clone(), (var.clone(), token));
                }
                _ => {
                    return Err(OutpostError::MissingConfiguration {
                        message: format!(
                            "{} is not set (token for provider '{}')",
                            var, binding.provider
                        ),
                    })
                }
            }
        }

        Ok(Self { tokens })
    }

    /// Placeholders for every binding that takes a token
    pub fn redacted(set: &DescriptorSet) -> Self {
        let tokens = set
            .providers
            .iter()
            .filter_map(|binding| {
                binding.token_env.as_ref().map(|var| {
                    (
                        binding.namespace.clone(),
                        (var.clone(), Self::REDACTED.to_string()),
                    )
                })
            })
            .collect();
        Self { tokens }
    }

    /// Token for a namespace
    pub fn token(&self, namespace: &str) -> Option<&str> {
        self.tokens.get(namespace).map(|(_, token)| token.as_str())
    }

    /// Variables to export to the engine process
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.tokens.values().cloned().collect()
    }
}

/// Reconciliation step to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    Plan,
    Apply,
    Destroy,
}

impl fmt::Display for EngineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineAction::Plan => write!(f, "plan"),
            EngineAction::Apply => write!(f, "apply"),
            EngineAction::Destroy => write!(f, "destroy"),
        }
    }
}

/// Writes the rendered set and drives the engine CLI
pub struct Engine<'a> {
    runner: &'a dyn CommandRunner,
    program: String,
    work_dir: PathBuf,
    auto_approve: bool,
    dry_run: bool,
}

impl<'a> Engine<'a> {
    pub fn new(config: &EngineConfig, runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            program: config.program.clone(),
            work_dir: config.work_dir.clone(),
            auto_approve: false,
            dry_run: false,
        }
    }

    /// Pass `-auto-approve` to apply and destroy
    pub fn auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    /// Render and list the engine commands without touching the work directory
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Render `set` into the work directory
    pub fn write_config(&self, set: &DescriptorSet, credentials: &Credentials) -> Result<PathBuf> {
        let document = render(set, credentials)?;

        std::fs::create_dir_all(&self.work_dir)?;
        let path = self.work_dir.join(RENDERED_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(&document)?)?;

        info!(path = %path.display(), "Wrote engine configuration");
        Ok(path)
    }

    /// Render, initialise and run `action`, returning the command lines
    pub async fn run(
        &self,
        action: EngineAction,
        set: &DescriptorSet,
        credentials: &Credentials,
    ) -> Result<Vec<String>> {
        if self.dry_run {
            render(set, credentials)?;
        } else {
            self.write_config(set, credentials)?;
        }

        if action == EngineAction::Destroy && !self.auto_approve && !self.dry_run {
            warn!("Destroy requested; the engine will ask for confirmation");
        }

        let mut args = vec![action.to_string()];
        if action != EngineAction::Plan && self.auto_approve {
            args.push("-auto-approve".to_string());
        }

        let steps = [
            self.invocation(&["init", "-input=false"], credentials),
            self.invocation(&args, credentials),
        ];
        let mut commands = Vec::with_capacity(steps.len());

        for invocation in &steps {
            commands.push(invocation.display());
            if self.dry_run {
                continue;
            }
            self.runner
                .run(invocation)
                .await?
                .into_result(invocation)?;
        }

        if !self.dry_run {
            info!(action = %action, "Engine run completed");
        }
        Ok(commands)
    }

    fn invocation<S: AsRef<str>>(&self, args: &[S], credentials: &Credentials) -> Invocation {
        Invocation {
            program: self.program.clone(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            env: credentials.env_pairs(),
            cwd: Some(self.work_dir.clone()),
            mode: IoMode::Interactive,
        }
    }
}
