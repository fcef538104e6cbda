// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object-storage API client

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::{OutpostError, Result};

/// A bucket as listed by the API
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Bucket {
    pub cluster: String,
    pub label: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    pub data: Vec<T>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "first_page")]
    pub pages: u32,
}

/// Upper bound on bucket listing pages
const MAX_PAGES: u32 = 100;

fn first_page() -> u32 {
    1
}

/// Body of a presigned URL request
#[derive(Debug, Serialize, PartialEq)]
pub struct ObjectUrlRequest<'a> {
    pub name: &'a str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u32>,
}

#[derive(Debug, Serialize)]
struct AclRequest<'a> {
    name: &'a str,
    acl: &'a str,
}

#[derive(Debug, Serialize)]
struct SslUpload<'a> {
    certificate: &'a str,
    private_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct ObjectUrlResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SslStatusResponse {
    #[serde(default)]
    ssl: bool,
}

/// Bucket-level operations used by the SSL procedures
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Every bucket visible to the token
    async fn buckets(&self) -> Result<Vec<Bucket>>;

    /// Presigned URL for a single object operation
    async fn create_object_url(&self, cluster: &str, bucket: &str, request: &ObjectUrlRequest<'_>) -> Result<String>;

    /// Set an object's ACL (`private`, `public-read`, ...)
    async fn update_object_acl(&self, cluster: &str, bucket: &str, name: &str, acl: &str) -> Result<()>;

    /// Whether the bucket serves a custom certificate
    async fn ssl_status(&self, cluster: &str, bucket: &str) -> Result<bool>;

    /// Install a certificate and key on the bucket
    async fn upload_ssl(&self, cluster: &str, bucket: &str, certificate: &str, private_key: &str) -> Result<()>;

    /// Remove the bucket's certificate
    async fn delete_ssl(&self, cluster: &str, bucket: &str) -> Result<()>;
}

/// Bearer-token client for the provider's object-storage API
pub struct ObjectStorageClient {
    http: Client,
    base: Url,
}

impl ObjectStorageClient {
    /// Build a client from config, reading the token variable once
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let token = match std::env::var(&config.token_env) {
            Ok(token) if !token.is_empty() => token,
            _ => {
                return Err(OutpostError::MissingConfiguration {
                    message: format!("{} is not set", config.token_env),
                })
            }
        };
        Self::new(&config.api_url, &token, &config.user_agent)
    }

    pub fn new(api_url: &str, token: &str, user_agent: &str) -> Result<Self> {
        let base = Url::parse(api_url).map_err(|e| OutpostError::InvalidConfig {
            message: format!("storage.api_url '{}': {}", api_url, e),
        })?;
        if base.cannot_be_a_base() {
            return Err(OutpostError::InvalidConfig {
                message: format!("storage.api_url '{}' cannot be a base URL", api_url),
            });
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            OutpostError::InvalidConfig {
                message: "token contains characters not allowed in a header".to_string(),
            }
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).map_err(|_| OutpostError::InvalidConfig {
                message: format!("invalid user agent: {}", user_agent),
            })?,
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self { http, base })
    }

    /// `v4/object-storage/buckets/<segments..>`, each segment percent-encoded
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        bucket_endpoint(&self.base, segments)
    }
}

#[async_trait]
impl ObjectStorage for ObjectStorageClient {
    async fn buckets(&self) -> Result<Vec<Bucket>> {
        let mut buckets = Vec::new();
        let mut page = 1u32;

        loop {
            let mut url = self.endpoint(&[]);
            url.query_pairs_mut().append_pair("page", &page.to_string());

            let response: Page<Bucket> = self
                .http
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            debug!(page = response.page, pages = response.pages, "Fetched bucket page");
            buckets.extend(response.data);

            // Stop when the server does not advance the page
            if response.page >= response.pages || response.page < page || page >= MAX_PAGES {
                break;
            }
            page = response.page + 1;
        }

        Ok(buckets)
    }

    async fn create_object_url(&self, cluster: &str, bucket: &str, request: &ObjectUrlRequest<'_>) -> Result<String> {
        let url = self.endpoint(&[cluster, bucket, "object-url"]);
        let response: ObjectUrlResponse = self
            .http
            .post(url)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.url)
    }

    async fn update_object_acl(&self, cluster: &str, bucket: &str, name: &str, acl: &str) -> Result<()> {
        let url = self.endpoint(&[cluster, bucket, "object-acl"]);
        self.http
            .put(url)
            .json(&AclRequest { name, acl })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn ssl_status(&self, cluster: &str, bucket: &str) -> Result<bool> {
        let url = self.endpoint(&[cluster, bucket, "ssl"]);
        let response: SslStatusResponse = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.ssl)
    }

    async fn upload_ssl(&self, cluster: &str, bucket: &str, certificate: &str, private_key: &str) -> Result<()> {
        let url = self.endpoint(&[cluster, bucket, "ssl"]);
        self.http
            .post(url)
            .json(&SslUpload {
                certificate,
                private_key,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_ssl(&self, cluster: &str, bucket: &str) -> Result<()> {
        let url = self.endpoint(&[cluster, bucket, "ssl"]);
        self.http.delete(url).send().await?.error_for_status()?;
        Ok(())
    }
}

fn bucket_endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty()
            .extend(["v4", "object-storage", "buckets"])
            .extend(segments);
        if segments.is_empty() {
            path.push("");
        }
    }
    url
}
