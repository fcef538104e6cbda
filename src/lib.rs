// SPDX-License-Identifier: AGPL-3.0-or-later
//! Outpost: operator tooling for a self-hosted VPN deployment
//!
//! # Features
//!
//! * **Descriptor sets:** typed resource declarations with reference edges,
//!   validated and rendered for the external reconciliation engine
//! * **Client certificates:** PKI initialisation, issuing and revoking clients
//!   through the VPN container image, with an append-only action log
//! * **Bucket certificates:** issuing a certificate for the object-storage
//!   bucket over ACME http-01, or rotating one supplied as PEM files

pub mod certs;
pub mod compose;
pub mod config;
pub mod descriptor;
pub mod envfile;
pub mod error;
pub mod storage;

pub use config::Config;
pub use error::{OutpostError, Result};
