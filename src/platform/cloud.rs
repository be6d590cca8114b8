//! Cloud Platform — REST client for the contact-center routing API
//!
//! Authenticates with the OAuth client-credentials grant, caches the bearer
//! token until shortly before it expires, and exposes the roster operations
//! the escalation engine needs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{PlatformError, RosterPlatform};
use crate::types::{Page, Queue, RosterMember};

/// Largest member list the routing API accepts per request.
const MAX_MEMBERS_PER_REQUEST: usize = 100;

/// Tokens are refreshed this long before the server-reported expiry.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Connection settings for [`CloudPlatform`].
#[derive(Debug, Clone)]
pub struct CloudPlatformConfig {
    /// API base, e.g. `https://api.mypurecloud.com`
    pub api_base: String,
    /// Login base, e.g. `https://login.mypurecloud.com`
    pub login_base: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
}

impl CloudPlatformConfig {
    /// Derive API and login hosts from a region host such as `mypurecloud.ie`.
    pub fn for_region(region: &str, client_id: &str, client_secret: &str, timeout: Duration) -> Self {
        let region = region.trim().trim_start_matches("https://").trim_end_matches('/');
        Self {
            api_base: format!("https://api.{region}"),
            login_base: format!("https://login.{region}"),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Listing envelope shared by the platform's paginated endpoints.
#[derive(Debug, Deserialize)]
struct EntityListing<T> {
    #[serde(default = "Vec::new")]
    entities: Vec<T>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct EntityRef {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

/// HTTP client for the routing platform.
pub struct CloudPlatform {
    http: reqwest::Client,
    config: CloudPlatformConfig,
    token: Mutex<Option<CachedToken>>,
}

impl CloudPlatform {
    pub fn new(config: CloudPlatformConfig) -> Result<Self, PlatformError> {
        if config.client_id.is_empty() {
            return Err(PlatformError::NotConfigured("platform.client_id is empty".into()));
        }
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config: CloudPlatformConfig {
                api_base: config.api_base.trim_end_matches('/').to_string(),
                login_base: config.login_base.trim_end_matches('/').to_string(),
                ..config
            },
            token: Mutex::new(None),
        })
    }

    /// Return a valid bearer token, logging in when the cache is empty or stale.
    async fn bearer_token(&self) -> Result<String, PlatformError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        debug!(login = %self.config.login_base, "Requesting client-credentials token");
        let resp = self
            .http
            .post(format!("{}/oauth/token", self.config.login_base))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, "Platform login failed");
            return Err(PlatformError::Auth(format!("login returned {status}: {body}")));
        }

        let token: TokenResponse = resp.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_SKEW);
        info!(expires_in = token.expires_in, "Platform login succeeded");

        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Map a non-success response into a [`PlatformError`], dropping the
    /// cached token on 401 so the next call logs in again.
    async fn error_for(&self, resp: reqwest::Response) -> PlatformError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        match status {
            reqwest::StatusCode::UNAUTHORIZED => {
                self.invalidate_token().await;
                PlatformError::Auth(format!("token rejected: {body}"))
            }
            reqwest::StatusCode::BAD_REQUEST | reqwest::StatusCode::UNPROCESSABLE_ENTITY => {
                PlatformError::Rejected(body)
            }
            status => PlatformError::Status { status, body },
        }
    }

    async fn get_listing<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<EntityListing<T>, PlatformError> {
        let token = self.bearer_token().await?;
        let resp = self
            .http
            .get(format!("{}{}", self.config.api_base, path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(self.error_for(resp).await);
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl RosterPlatform for CloudPlatform {
    async fn list_group_members(
        &self,
        group_id: &str,
        page_number: u32,
        page_size: u32,
    ) -> Result<Page<RosterMember>, PlatformError> {
        let listing: EntityListing<EntityRef> = self
            .get_listing(
                &format!("/api/v2/groups/{group_id}/members"),
                &[
                    ("pageSize", page_size.to_string()),
                    ("pageNumber", page_number.to_string()),
                    ("sortOrder", "ASC".to_string()),
                ],
            )
            .await?;

        debug!(group_id, page_number, received = listing.entities.len(), total = listing.total, "Group members page");

        Ok(Page {
            items: listing
                .entities
                .into_iter()
                .map(|e| RosterMember {
                    name: e.name.unwrap_or_default(),
                    id: e.id,
                })
                .collect(),
            total: listing.total,
        })
    }

    async fn list_queues(&self, page_number: u32, page_size: u32) -> Result<Page<Queue>, PlatformError> {
        let listing: EntityListing<EntityRef> = self
            .get_listing(
                "/api/v2/routing/queues",
                &[
                    ("pageSize", page_size.to_string()),
                    ("pageNumber", page_number.to_string()),
                ],
            )
            .await?;

        Ok(Page {
            items: listing
                .entities
                .into_iter()
                .map(|e| Queue {
                    name: e.name.unwrap_or_default(),
                    id: e.id,
                })
                .collect(),
            total: listing.total,
        })
    }

    async fn add_queue_members(&self, queue_id: &str, members: &[RosterMember]) -> Result<(), PlatformError> {
        for chunk in members.chunks(MAX_MEMBERS_PER_REQUEST) {
            let body: Vec<serde_json::Value> = chunk
                .iter()
                .map(|m| serde_json::json!({ "id": m.id }))
                .collect();

            let token = self.bearer_token().await?;
            let resp = self
                .http
                .post(format!("{}/api/v2/routing/queues/{}/members", self.config.api_base, queue_id))
                .bearer_auth(token)
                // delete=true would remove these members instead of adding them
                .query(&[("delete", "false")])
                .json(&body)
                .send()
                .await?;

            if !resp.status().is_success() {
                return Err(self.error_for(resp).await);
            }
        }

        info!(queue_id, added = members.len(), "Queue members added");
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "cloud-routing"
    }
}
