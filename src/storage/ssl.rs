// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bucket certificate rotation

use std::path::Path;

use tracing::info;

use super::client::ObjectStorage;
use crate::error::{OutpostError, Result};

/// PEM certificate chain and private key
#[derive(Debug, Clone)]
pub struct SslMaterial {
    pub certificate: String,
    pub private_key: String,
}

impl SslMaterial {
    /// Read both PEM files
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(certificate: P, private_key: Q) -> Result<Self> {
        let material = Self {
            certificate: std::fs::read_to_string(certificate.as_ref())?,
            private_key: std::fs::read_to_string(private_key.as_ref())?,
        };
        material.validate()?;
        Ok(material)
    }

    /// Check both parts look like PEM of the right kind
    pub fn validate(&self) -> Result<()> {
        if !self.certificate.contains("-----BEGIN CERTIFICATE-----") {
            return Err(OutpostError::InvalidConfig {
                message: "certificate is not a PEM certificate".to_string(),
            });
        }
        if !(self.private_key.contains("-----BEGIN") && self.private_key.contains("PRIVATE KEY-----")) {
            return Err(OutpostError::InvalidConfig {
                message: "private key is not a PEM private key".to_string(),
            });
        }
        Ok(())
    }
}

/// Replace a bucket's certificate: confirm the bucket, delete, upload
pub async fn rotate_ssl(
    storage: &dyn ObjectStorage,
    cluster: &str,
    bucket: &str,
    material: &SslMaterial,
) -> Result<()> {
    ensure_bucket(storage, cluster, bucket).await?;

    info!(cluster = %cluster, bucket = %bucket, "Deleting old certificate");
    storage.delete_ssl(cluster, bucket).await?;

    info!(cluster = %cluster, bucket = %bucket, "Uploading certificate");
    storage
        .upload_ssl(cluster, bucket, &material.certificate, &material.private_key)
        .await?;
    Ok(())
}

/// Fail with [`OutpostError::BucketNotFound`] unless the bucket is listed
pub async fn ensure_bucket(storage: &dyn ObjectStorage, cluster: &str, bucket: &str) -> Result<()> {
    let found = storage
        .buckets()
        .await?
        .iter()
        .any(|b| b.cluster == cluster && b.label == bucket);

    if found {
        Ok(())
    } else {
        Err(OutpostError::BucketNotFound {
            cluster: cluster.to_string(),
            bucket: bucket.to_string(),
        })
    }
}
