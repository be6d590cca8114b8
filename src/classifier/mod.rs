//! Classification Alignment Pipeline
//!
//! One classifier call per batch, one [`Classification`] per input article,
//! input order preserved. The classifier itself is an external collaborator
//! behind the [`Classifier`] trait; this module owns prompt construction,
//! reply parsing and the alignment check that ties classification `i` back to
//! article `i`.
//!
//! ## Flow
//!
//! ```text
//! [ArticleInput; k] ─► build_batch_prompt ─► Classifier ─► parse_aligned ─► [Classification; k]
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::types::{ArticleInput, Classification};

pub mod openai;
pub mod parsing;
pub mod prompt;

pub use openai::{OpenAiClassifier, OpenAiSettings};
pub use parsing::{parse_aligned, AlignmentError};
pub use prompt::build_batch_prompt;

/// Errors from the classifier transport.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited by classifier")]
    RateLimited,
    #[error("classifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("classifier call timed out after {0:?}")]
    Timeout(Duration),
    #[error("classifier not configured: {0}")]
    NotConfigured(String),
    #[error("classifier request failed: {0}")]
    Request(String),
    #[error("classifier returned no content")]
    EmptyResponse,
}

/// A generative text classifier: prompt in, free text out.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn propose_classification(&self, prompt: &str) -> Result<String, ClassifierError>;

    /// Model name for logging.
    fn model_name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("classifier reply misaligned: {0}")]
    Alignment(#[from] AlignmentError),
}

/// Stand-in used when no classifier credentials are configured; every call
/// fails with [`ClassifierError::NotConfigured`].
pub struct UnconfiguredClassifier {
    reason: String,
}

impl UnconfiguredClassifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl Classifier for UnconfiguredClassifier {
    async fn propose_classification(&self, _prompt: &str) -> Result<String, ClassifierError> {
        Err(ClassifierError::NotConfigured(self.reason.clone()))
    }

    fn model_name(&self) -> &str {
        "unconfigured"
    }
}

/// Turns batches of articles into positionally aligned classifications.
pub struct ClassificationPipeline<C: Classifier + ?Sized> {
    classifier: Arc<C>,
    call_timeout: Duration,
}

impl<C: Classifier + ?Sized> ClassificationPipeline<C> {
    pub fn new(classifier: Arc<C>) -> Self {
        Self {
            classifier,
            call_timeout: Duration::from_secs(crate::config::defaults::CLASSIFIER_CALL_TIMEOUT_SECS),
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn model_name(&self) -> &str {
        self.classifier.model_name()
    }

    /// Classify one batch with a single classifier call.
    ///
    /// Empty input returns an empty result without calling the classifier.
    /// Any misalignment fails the whole batch.
    pub async fn classify(&self, articles: &[ArticleInput]) -> Result<Vec<Classification>, ClassifyError> {
        if articles.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = build_batch_prompt(articles);
        debug!(
            model = self.classifier.model_name(),
            articles = articles.len(),
            prompt_chars = prompt.len(),
            "Requesting batch classification"
        );

        let reply = match tokio::time::timeout(self.call_timeout, self.classifier.propose_classification(&prompt)).await {
            Ok(result) => result?,
            Err(_) => return Err(ClassifierError::Timeout(self.call_timeout).into()),
        };

        parse_aligned(&reply, articles.len()).map_err(|e| {
            warn!(
                model = self.classifier.model_name(),
                articles = articles.len(),
                error = %e,
                "Classifier reply rejected"
            );
            ClassifyError::Alignment(e)
        })
    }

    /// Classify in chunks of at most `max_batch`, one call per chunk.
    ///
    /// Output stays aligned with `articles`. The first failing chunk fails
    /// the whole call.
    pub async fn classify_in_batches(
        &self,
        articles: &[ArticleInput],
        max_batch: usize,
    ) -> Result<Vec<Classification>, ClassifyError> {
        let mut out = Vec::with_capacity(articles.len());
        for chunk in articles.chunks(max_batch.max(1)) {
            out.extend(self.classify(chunk).await?);
        }
        Ok(out)
    }
}
