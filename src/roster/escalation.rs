//! Escalation Coordinator
//!
//! Turns an [`EscalationRequest`] into one additive roster change:
//!
//! 1. resolve the reserve pool for the request's category
//! 2. drain the pool's member listing
//! 3. select a severity-proportional prefix of the pool
//! 4. add the selected members to the target queue
//!
//! An unmapped category is a no-op success. A missing severity fraction, a
//! failed listing page or a rejected mutation are failures surfaced to the
//! caller without retry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::pagination::{AggregateError, Paginator};
use super::policy::{PolicyError, SeverityPolicy};
use crate::platform::{PlatformError, RosterPlatform};
use crate::types::{EscalationRequest, Importance, Queue, RosterMember};

/// Category → reserve pool mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolDirectory {
    categories: HashMap<String, String>,
    /// Used for unmapped categories only when explicitly configured.
    default_pool: Option<String>,
}

impl PoolDirectory {
    pub fn new(categories: HashMap<String, String>, default_pool: Option<String>) -> Self {
        Self {
            categories,
            default_pool: default_pool.filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn resolve(&self, category: &str) -> Option<&str> {
        self.categories
            .get(category)
            .or(self.default_pool.as_ref())
            .map(String::as_str)
    }
}

/// Successful escalation results. No-op variants are still successes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EscalationOutcome {
    /// Members were added to the queue.
    Applied {
        queue_id: String,
        pool_id: String,
        severity: Importance,
        pool_size: usize,
        members: Vec<RosterMember>,
    },
    /// The category has no reserve pool; nothing to do.
    NoPoolMapped { category: String },
    /// The policy selected nobody (zero fraction or empty pool).
    NothingSelected {
        pool_id: String,
        severity: Importance,
        pool_size: usize,
    },
}

impl EscalationOutcome {
    pub fn is_no_op(&self) -> bool {
        !matches!(self, EscalationOutcome::Applied { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("configuration error: {0}")]
    Config(#[from] PolicyError),
    #[error("failed to build reserve pool {pool_id}: {source}")]
    Pool {
        pool_id: String,
        #[source]
        source: AggregateError<PlatformError>,
    },
    #[error("failed to add members to queue {queue_id}: {source}")]
    Platform {
        queue_id: String,
        #[source]
        source: PlatformError,
    },
}

/// Coordinates pool aggregation, member selection and the roster mutation.
pub struct EscalationCoordinator<P: RosterPlatform + ?Sized> {
    platform: Arc<P>,
    policy: SeverityPolicy,
    pools: PoolDirectory,
    paginator: Paginator,
    call_timeout: Duration,
}

impl<P: RosterPlatform + ?Sized> EscalationCoordinator<P> {
    pub fn new(platform: Arc<P>, policy: SeverityPolicy, pools: PoolDirectory) -> Self {
        Self {
            platform,
            policy,
            pools,
            paginator: Paginator::default(),
            call_timeout: Duration::from_secs(crate::config::defaults::PLATFORM_CALL_TIMEOUT_SECS),
        }
    }

    pub fn with_paginator(mut self, paginator: Paginator) -> Self {
        self.paginator = paginator;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Perform one escalation.
    pub async fn escalate(&self, request: &EscalationRequest) -> Result<EscalationOutcome, EscalationError> {
        let Some(pool_id) = self.pools.resolve(&request.category) else {
            info!(category = %request.category, "No reserve pool mapped for category, nothing to escalate");
            return Ok(EscalationOutcome::NoPoolMapped {
                category: request.category.clone(),
            });
        };

        // Fail on a missing fraction before touching the platform.
        self.policy.fraction(request.severity)?;

        let pool = self.reserve_pool(pool_id).await?;
        let members = self.policy.select_members(&pool, request.severity)?;

        if members.is_empty() {
            info!(
                pool_id,
                severity = %request.severity,
                pool_size = pool.len(),
                "Staffing policy selected no members"
            );
            return Ok(EscalationOutcome::NothingSelected {
                pool_id: pool_id.to_string(),
                severity: request.severity,
                pool_size: pool.len(),
            });
        }

        let queue_id = request.queue_id.as_str();
        let mutation = self.platform.add_queue_members(queue_id, &members);
        bounded(self.call_timeout, mutation).await.map_err(|source| {
            warn!(queue_id, error = %source, "Roster mutation failed");
            EscalationError::Platform {
                queue_id: request.queue_id.clone(),
                source,
            }
        })?;

        info!(
            platform = self.platform.platform_name(),
            queue_id,
            pool_id,
            severity = %request.severity,
            added = members.len(),
            pool_size = pool.len(),
            "Escalation applied"
        );

        Ok(EscalationOutcome::Applied {
            queue_id: request.queue_id.clone(),
            pool_id: pool_id.to_string(),
            severity: request.severity,
            pool_size: pool.len(),
            members,
        })
    }

    /// Drain a reserve group's member listing.
    pub async fn reserve_pool(&self, pool_id: &str) -> Result<Vec<RosterMember>, EscalationError> {
        let platform = &self.platform;
        let timeout = self.call_timeout;
        self.paginator
            .aggregate(move |page, size| bounded(timeout, platform.list_group_members(pool_id, page, size)))
            .await
            .map_err(|source| {
                warn!(pool_id, error = %source, "Reserve pool aggregation failed");
                EscalationError::Pool {
                    pool_id: pool_id.to_string(),
                    source,
                }
            })
    }

    /// Every routing queue on the platform.
    pub async fn queues(&self) -> Result<Vec<Queue>, AggregateError<PlatformError>> {
        let platform = &self.platform;
        let timeout = self.call_timeout;
        self.paginator
            .aggregate(move |page, size| bounded(timeout, platform.list_queues(page, size)))
            .await
    }
}

/// Run a platform call with a deadline; expiry becomes [`PlatformError::Timeout`].
async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, PlatformError>
where
    F: Future<Output = Result<T, PlatformError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PlatformError::Timeout(limit)),
    }
}
