// SPDX-License-Identifier: AGPL-3.0-or-later
//! Certificate issuance for a bucket's website endpoint
//!
//! http-01 challenges are answered by writing the key authorization into the
//! bucket itself, under `/.well-known/acme-challenge/<token>`, and making it
//! public-read for the validation window.

use std::path::Path;
use std::time::Duration;

use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, NewAccount,
    NewOrder, Order, OrderStatus,
};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, info, warn};

use super::client::{ObjectStorage, ObjectUrlRequest};
use super::ssl::{ensure_bucket, SslMaterial};
use crate::config::AcmeConfig;
use crate::error::{OutpostError, Result};

const CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Order status checks before giving up
const POLL_ATTEMPTS: u32 = 10;

/// Publishes http-01 key authorizations as bucket objects
pub struct ChallengeHost<'a> {
    storage: &'a dyn ObjectStorage,
    http: Client,
    cluster: &'a str,
    bucket: &'a str,
    domain: &'a str,
    expires_in: u32,
}

impl<'a> ChallengeHost<'a> {
    pub fn new(
        storage: &'a dyn ObjectStorage,
        cluster: &'a str,
        bucket: &'a str,
        domain: &'a str,
        expires_in: u32,
    ) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            storage,
            http,
            cluster,
            bucket,
            domain,
            expires_in,
        })
    }

    /// Object name for a challenge token
    pub fn object_name(token: &str) -> Result<String> {
        let url_safe = !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !url_safe {
            return Err(OutpostError::AcmeFailed {
                step: "challenge".to_string(),
                message: format!("token '{}' is not base64url", token),
            });
        }
        Ok(format!("{}{}", CHALLENGE_PREFIX, token))
    }

    /// Upload the key authorization, make it public and check it is served
    pub async fn publish(&self, name: &str, key_authorization: &str) -> Result<()> {
        let put_url = self
            .signed_url(&ObjectUrlRequest {
                name,
                method: "PUT",
                content_type: Some("text/plain"),
                expires_in: Some(self.expires_in),
            })
            .await?;

        debug!(object = %name, "Uploading challenge response");
        self.http
            .put(put_url)
            .header(CONTENT_TYPE, "text/plain")
            .body(key_authorization.to_string())
            .send()
            .await?
            .error_for_status()?;

        self.storage
            .update_object_acl(self.cluster, self.bucket, name, "public-read")
            .await?;

        let public_url = format!("http://{}{}", self.domain, name);
        debug!(url = %public_url, "Checking challenge response");
        self.http
            .head(public_url.as_str())
            .send()
            .await?
            .error_for_status()
            .map_err(|e| OutpostError::AcmeFailed {
                step: "challenge".to_string(),
                message: format!("{} is not readable: {}", public_url, e),
            })?;
        Ok(())
    }

    /// Delete a challenge object; failures are only logged
    pub async fn remove(&self, name: &str) {
        let request = ObjectUrlRequest {
            name,
            method: "DELETE",
            content_type: None,
            expires_in: Some(self.expires_in),
        };

        let outcome = match self.signed_url(&request).await {
            Ok(url) => self
                .http
                .delete(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map(|_| ())
                .map_err(OutpostError::from),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            warn!(object = %name, error = %e, "Failed to clean up challenge resource");
        }
    }

    async fn signed_url(&self, request: &ObjectUrlRequest<'_>) -> Result<String> {
        self.storage
            .create_object_url(self.cluster, self.bucket, request)
            .await
    }
}

/// Fresh key pair and DER CSR for `domain`
pub fn certificate_request(domain: &str) -> Result<(KeyPair, Vec<u8>)> {
    let key_pair = KeyPair::generate()?;
    let mut params = CertificateParams::new(vec![domain.to_string()])?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, domain);
    params.distinguished_name = name;

    let csr = params.serialize_request(&key_pair)?;
    Ok((key_pair, csr.der().to_vec()))
}

/// Saved account credentials, or a newly registered account
pub async fn load_account(config: &AcmeConfig) -> Result<Account> {
    if config.account_file.exists() {
        debug!(path = %config.account_file.display(), "Loading ACME account");
        let text = std::fs::read_to_string(&config.account_file)?;
        let credentials: AccountCredentials = serde_json::from_str(&text)?;
        return Ok(Account::from_credentials(credentials).await?);
    }

    info!(directory = %config.directory_url, "Registering ACME account");
    let contact: Vec<&str> = config.contact.iter().map(String::as_str).collect();
    let (account, credentials) = Account::create(
        &NewAccount {
            contact: &contact,
            terms_of_service_agreed: config.agree_tos,
            only_return_existing: false,
        },
        &config.directory_url,
        None,
    )
    .await?;

    save_credentials(&config.account_file, &credentials)?;
    Ok(account)
}

fn save_credentials(path: &Path, credentials: &AccountCredentials) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(credentials)?)?;
    info!(path = %path.display(), "Saved ACME account");
    Ok(())
}

/// Order a certificate for `domain`, answering challenges from the bucket
pub async fn issue_certificate(
    storage: &dyn ObjectStorage,
    config: &AcmeConfig,
    cluster: &str,
    bucket: &str,
    domain: &str,
) -> Result<SslMaterial> {
    ensure_bucket(storage, cluster, bucket).await?;

    let account = load_account(config).await?;
    let (key_pair, csr) = certificate_request(domain)?;

    info!(domain = %domain, "Creating order");
    let identifiers = [Identifier::Dns(domain.to_string())];
    let mut order = account
        .new_order(&NewOrder {
            identifiers: &identifiers,
        })
        .await?;

    let host = ChallengeHost::new(storage, cluster, bucket, domain, config.challenge_expiry)?;
    let mut published = Vec::new();
    let outcome = authorize(&mut order, &host, &mut published).await;
    for name in &published {
        host.remove(name).await;
    }
    outcome?;

    info!("Finalizing order");
    order.finalize(&csr).await?;
    let certificate = fetch_certificate(&mut order).await?;

    let material = SslMaterial {
        certificate,
        private_key: key_pair.serialize_pem(),
    };
    material.validate()?;
    Ok(material)
}

async fn authorize(order: &mut Order, host: &ChallengeHost<'_>, published: &mut Vec<String>) -> Result<()> {
    info!("Performing authorizations");
    let authorizations = order.authorizations().await?;

    for authorization in &authorizations {
        match authorization.status {
            AuthorizationStatus::Pending => {}
            AuthorizationStatus::Valid => continue,
            status => {
                return Err(OutpostError::AcmeFailed {
                    step: "authorization".to_string(),
                    message: format!("authorization is {:?}", status),
                })
            }
        }

        let challenge = authorization
            .challenges
            .iter()
            .find(|c| c.r#type == ChallengeType::Http01)
            .ok_or_else(|| OutpostError::AcmeFailed {
                step: "authorization".to_string(),
                message: "No supported challenges (http-01)".to_string(),
            })?;

        let name = ChallengeHost::object_name(&challenge.token)?;
        published.push(name.clone());
        let key_authorization = order.key_authorization(challenge);
        host.publish(&name, key_authorization.as_str()).await?;

        order.set_challenge_ready(&challenge.url).await?;
    }

    match wait_while(order, OrderStatus::Pending).await? {
        OrderStatus::Ready => Ok(()),
        status => Err(OutpostError::AcmeFailed {
            step: "authorization".to_string(),
            message: format!("order is {:?}", status),
        }),
    }
}

async fn wait_while(order: &mut Order, pending: OrderStatus) -> Result<OrderStatus> {
    let mut delay = Duration::from_millis(250);
    for _ in 0..POLL_ATTEMPTS {
        order.refresh().await?;
        let status = order.state().status;
        if status != pending {
            return Ok(status);
        }
        tokio::time::sleep(delay).await;
        delay *= 2;
    }

    Err(OutpostError::AcmeFailed {
        step: "polling".to_string(),
        message: format!("order still {:?} after {} checks", pending, POLL_ATTEMPTS),
    })
}

async fn fetch_certificate(order: &mut Order) -> Result<String> {
    let mut delay = Duration::from_millis(250);
    for _ in 0..POLL_ATTEMPTS {
        if let Some(chain) = order.certificate().await? {
            return Ok(chain);
        }
        if order.state().status == OrderStatus::Invalid {
            break;
        }
        tokio::time::sleep(delay).await;
        delay *= 2;
    }

    Err(OutpostError::AcmeFailed {
        step: "finalize".to_string(),
        message: format!("no certificate issued (order is {:?})", order.state().status),
    })
}
