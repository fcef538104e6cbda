// SPDX-License-Identifier: AGPL-3.0-or-later
//! Append-only record of client certificate actions

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::debug;

use crate::error::Result;

/// Timestamp layout of a log line, e.g. `2024 Mar 05 14:07`
pub const TIMESTAMP_FORMAT: &str = "%Y %b %d %H:%M";

/// What happened to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAction {
    Created,
    Revoked,
}

impl fmt::Display for ClientAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientAction::Created => write!(f, "created"),
            ClientAction::Revoked => write!(f, "revoked"),
        }
    }
}

/// One line of the client log
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub action: ClientAction,
    pub client: String,
}

impl LogEntry {
    /// Entry stamped with the current local time
    pub fn now(action: ClientAction, client: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            action,
            client: client.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.action,
            self.client
        )
    }
}

/// The client log file; only ever appended to
#[derive(Debug, Clone)]
pub struct ClientLog {
    path: PathBuf,
}

impl ClientLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Append one entry as a single line
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry)?;

        debug!(path = %self.path.display(), entry = %entry, "Appended client log entry");
        Ok(())
    }
}
