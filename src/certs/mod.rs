// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client certificate lifecycle
//!
//! Initialising the PKI, issuing and revoking client certificates through
//! the VPN container image, plus the append-only log of client actions.

mod ledger;
mod lifecycle;

pub use ledger::{ClientAction, ClientLog, LogEntry, TIMESTAMP_FORMAT};
pub use lifecycle::{CertManager, LifecycleReport, CREATE_USAGE, REVOKE_USAGE};
