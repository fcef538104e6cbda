// SPDX-License-Identifier: AGPL-3.0-or-later
//! External command plumbing
//!
//! Every side effect outside this process (the orchestration CLI and the
//! reconciliation engine) goes through a [`CommandRunner`], so procedures can
//! be exercised against a recording runner in tests.

#[cfg(test)]
mod mock;
mod runner;

#[cfg(test)]
pub use mock::RecordingRunner;
pub use runner::{CommandOutput, CommandRunner, Invocation, IoMode, ProcessRunner};

use crate::config::ComposeConfig;

/// Builds `<program> [args..] run --rm <service> <sub-command..>` invocations
#[derive(Debug, Clone)]
pub struct Compose {
    program: String,
    args: Vec<String>,
    service: String,
}

impl Compose {
    /// Create a builder from the `[compose]` configuration section
    pub fn from_config(config: &ComposeConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            service: config.service.clone(),
        }
    }

    /// One-shot container run of `sub_command` in the VPN service
    pub fn run<S: AsRef<str>>(&self, sub_command: &[S], mode: IoMode) -> Invocation {
        let mut args = self.args.clone();
        args.extend(["run", "--rm", self.service.as_str()].map(String::from));
        args.extend(sub_command.iter().map(|s| s.as_ref().to_string()));

        Invocation {
            program: self.program.clone(),
            args,
            env: Vec::new(),
            cwd: None,
            mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_builds_run_invocation() {
        let compose = Compose::from_config(&ComposeConfig::default());
        let invocation = compose.run(&["ovpn_initpki"], IoMode::Interactive);

        assert_eq!(invocation.program, "docker-compose");
        assert_eq!(invocation.args, vec!["run", "--rm", "openvpn", "ovpn_initpki"]);
        assert_eq!(invocation.mode, IoMode::Interactive);
    }

    #[test]
    fn test_compose_prefix_args() {
        let config = ComposeConfig {
            program: "docker".to_string(),
            args: vec!["compose".to_string()],
            service: "vpn".to_string(),
            ..ComposeConfig::default()
        };
        let invocation = Compose::from_config(&config).run(&["ovpn_getclient", "alice"], IoMode::Capture);

        assert_eq!(
            invocation.display(),
            "docker compose run --rm vpn ovpn_getclient alice"
        );
    }
}
