// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object-storage bucket management
//!
//! A thin client for the provider's object-storage API, plus certificate
//! issuance and rotation built on it. The bucket itself is declared in the
//! descriptor set; this covers what the reconciliation engine cannot express.

mod acme;
mod client;
#[cfg(test)]
mod fake;
mod ssl;

pub use acme::{certificate_request, issue_certificate, load_account, ChallengeHost};
pub use client::{Bucket, ObjectStorage, ObjectStorageClient, ObjectUrlRequest};
pub use ssl::{ensure_bucket, rotate_ssl, SslMaterial};
