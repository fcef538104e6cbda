// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory object storage for tests

use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{Bucket, ObjectStorage, ObjectUrlRequest};
use crate::error::Result;

/// Lists fixed buckets and records every call
pub struct FakeStorage {
    buckets: Vec<Bucket>,
    url_base: String,
    calls: Mutex<Vec<String>>,
}

impl FakeStorage {
    pub fn with_bucket(cluster: &str, label: &str) -> Self {
        Self {
            buckets: vec![Bucket {
                cluster: cluster.to_string(),
                label: label.to_string(),
                hostname: None,
                created: None,
            }],
            url_base: "https://signed.example".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Presigned URLs point at `<base>/signed<name>`
    pub fn url_base(mut self, base: &str) -> Self {
        self.url_base = base.to_string();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn buckets(&self) -> Result<Vec<Bucket>> {
        self.record("buckets".to_string());
        Ok(self.buckets.clone())
    }

    async fn create_object_url(&self, _cluster: &str, _bucket: &str, request: &ObjectUrlRequest<'_>) -> Result<String> {
        self.record(format!("url {} {}", request.method, request.name));
        Ok(format!("{}/signed{}", self.url_base, request.name))
    }

    async fn update_object_acl(&self, _cluster: &str, _bucket: &str, name: &str, acl: &str) -> Result<()> {
        self.record(format!("acl {} {}", name, acl));
        Ok(())
    }

    async fn ssl_status(&self, _cluster: &str, _bucket: &str) -> Result<bool> {
        Ok(true)
    }

    async fn upload_ssl(&self, cluster: &str, bucket: &str, certificate: &str, _key: &str) -> Result<()> {
        assert!(certificate.starts_with("-----BEGIN CERTIFICATE"));
        self.record(format!("upload {}/{}", cluster, bucket));
        Ok(())
    }

    async fn delete_ssl(&self, cluster: &str, bucket: &str) -> Result<()> {
        self.record(format!("delete {}/{}", cluster, bucket));
        Ok(())
    }
}
