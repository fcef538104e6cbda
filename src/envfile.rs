// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reader for the shell-sourced environment file
//!
//! Only the subset a deployment `.env` actually uses is understood:
//! `KEY=VALUE` assignments, an optional `export ` prefix, single or double
//! quoted values and `#` comment lines. Anything else is skipped.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::{OutpostError, Result};

/// Parsed variables from an environment file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvFile {
    vars: BTreeMap<String, String>,
}

impl EnvFile {
    /// Load and parse an environment file
    ///
    /// An absent file is a [`OutpostError::MissingConfiguration`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.is_file() {
            return Err(OutpostError::MissingConfiguration {
                message: format!("environment file {} not found", path.display()),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        let env = Self::parse(&contents);
        debug!(path = %path.display(), vars = env.vars.len(), "Loaded environment file");
        Ok(env)
    }

    /// Parse environment file contents
    pub fn parse(contents: &str) -> Self {
        let mut vars = BTreeMap::new();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line).trim_start();

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            let key = key.trim();
            if !is_identifier(key) {
                continue;
            }

            vars.insert(key.to_string(), unquote(value.trim()));
        }

        Self { vars }
    }

    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Look up a variable that must be present and non-empty
    pub fn require(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(OutpostError::MissingConfiguration {
                message: format!("{} is not set in the environment file", key),
            }),
        }
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }

    // Unquoted values end at an inline comment
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}
