use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::{Credentials, ScraperConfig, USER_AGENT};
use crate::error::{ScrapeError, TransportError};
use crate::identifier::Asin;

// ==================== TRANSPORT ====================

/// Request body understood by the realtime endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPayload {
    pub source: String,
    pub url: String,
    pub geo_location: String,
    pub parse: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// One upstream call. Implementations must not retry on their own.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_query(
        &self,
        credentials: &Credentials,
        query: &QueryPayload,
    ) -> Result<TransportResponse, TransportError>;
}

/// `wreq`-backed transport. The client (and its connection pool) is shared
/// by every fetch issued through it.
#[derive(Clone)]
pub struct WreqTransport {
    client: wreq::Client,
    endpoint: String,
}

impl WreqTransport {
    pub fn new(config: &ScraperConfig) -> Result<Self, ScrapeError> {
        let client = wreq::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ScrapeError::Unexpected(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl Transport for WreqTransport {
    async fn post_query(
        &self,
        credentials: &Credentials,
        query: &QueryPayload,
    ) -> Result<TransportResponse, TransportError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("User-Agent", USER_AGENT)
            .basic_auth(credentials.username(), Some(credentials.password()))
            .json(query)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(TransportResponse { status, body })
    }
}

/// Backoff and pacing clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ==================== ATTEMPT CLASSIFICATION ====================

#[derive(Debug, Clone, PartialEq)]
enum AttemptFailure {
    Timeout(String),
    Transport(TransportError),
    RateLimited,
    Server(u16),
    Client(u16),
    Unauthorized,
    Decode(String),
}

impl AttemptFailure {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            AttemptFailure::Timeout(_)
                | AttemptFailure::Transport(_)
                | AttemptFailure::RateLimited
                | AttemptFailure::Server(_)
        )
    }

    fn describe(&self) -> String {
        match self {
            AttemptFailure::Timeout(msg) => msg.clone(),
            AttemptFailure::Transport(err) => err.to_string(),
            AttemptFailure::RateLimited => "HTTP 429 Too Many Requests".to_string(),
            AttemptFailure::Server(status) => format!("Server error {}", status),
            AttemptFailure::Client(status) => format!("HTTP error {}", status),
            AttemptFailure::Unauthorized => "HTTP 401 Unauthorized".to_string(),
            AttemptFailure::Decode(msg) => msg.clone(),
        }
    }

    /// Error surfaced for a failure that ends the fetch.
    fn into_error(self, attempts: u32) -> ScrapeError {
        match self {
            AttemptFailure::Unauthorized => {
                ScrapeError::InvalidCredentials("Invalid API credentials".to_string())
            }
            AttemptFailure::Decode(msg) => {
                ScrapeError::MalformedResponse(format!("Invalid JSON response: {}", msg))
            }
            AttemptFailure::Client(status) => {
                ScrapeError::ConnectionFailure(format!("HTTP error {}", status))
            }
            AttemptFailure::RateLimited => ScrapeError::RateLimited(format!(
                "Rate limit exceeded after {} attempts",
                attempts
            )),
            other => ScrapeError::ConnectionFailure(format!(
                "Request failed after {} attempts. Last error: {}",
                attempts,
                other.describe()
            )),
        }
    }
}

fn classify_response(response: TransportResponse) -> Result<Value, AttemptFailure> {
    match response.status {
        200..=299 => serde_json::from_str(&response.body)
            .map_err(|e| AttemptFailure::Decode(e.to_string())),
        401 => Err(AttemptFailure::Unauthorized),
        429 => Err(AttemptFailure::RateLimited),
        status if status >= 500 => Err(AttemptFailure::Server(status)),
        status => Err(AttemptFailure::Client(status)),
    }
}

// ==================== PIPELINE ====================

/// Issues one logical fetch against the realtime API with retry/backoff.
///
/// Stateless between calls apart from the credentials, the config and the
/// shared transport/clock handles, so one pipeline can serve concurrent
/// fetches.
pub struct RequestPipeline<T: Transport = WreqTransport> {
    credentials: Credentials,
    config: ScraperConfig,
    transport: Arc<T>,
    sleeper: Arc<dyn Sleeper>,
}

impl<T: Transport> Clone for RequestPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            credentials: self.credentials.clone(),
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            sleeper: Arc::clone(&self.sleeper),
        }
    }
}

impl RequestPipeline<WreqTransport> {
    pub fn new(credentials: Credentials, config: ScraperConfig) -> Result<Self, ScrapeError> {
        let transport = WreqTransport::new(&config)?;
        Ok(Self::with_transport(
            credentials,
            config,
            transport,
            Arc::new(TokioSleeper),
        ))
    }
}

impl<T: Transport> RequestPipeline<T> {
    pub fn with_transport(
        credentials: Credentials,
        config: ScraperConfig,
        transport: T,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            credentials,
            config,
            transport: Arc::new(transport),
            sleeper,
        }
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    /// Fetches the parsed product page for `url`.
    ///
    /// Credentials and the ASIN are checked before any network call. Returns
    /// the decoded payload or a classified error; never panics on upstream
    /// faults.
    pub async fn fetch(&self, url: &str, geo_location: &str) -> Result<Value, ScrapeError> {
        self.credentials.validate()?;
        let asin = Asin::from_url(url)?;
        info!(asin = %asin, url, "fetching product");
        self.execute(url, geo_location).await
    }

    /// Fetches a search-results page. Same retry policy as [`fetch`], no
    /// ASIN check.
    ///
    /// [`fetch`]: RequestPipeline::fetch
    pub async fn fetch_search(&self, url: &str, geo_location: &str) -> Result<Value, ScrapeError> {
        self.credentials.validate()?;
        self.execute(url, geo_location).await
    }

    async fn execute(&self, url: &str, geo_location: &str) -> Result<Value, ScrapeError> {
        let query = QueryPayload {
            source: self.config.source.clone(),
            url: url.to_string(),
            geo_location: geo_location.to_string(),
            parse: true,
        };
        let max_attempts = self.config.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            info!(
                url,
                attempt = attempt + 1,
                max_attempts,
                "making request to Oxylabs API"
            );
            let failure = match self.attempt(&query).await {
                Ok(payload) => {
                    info!(url, attempt = attempt + 1, "request successful");
                    return Ok(payload);
                }
                Err(failure) => failure,
            };

            if !failure.is_retryable() {
                let err = failure.into_error(attempt + 1);
                error!(url, error = %err, "request failed without retry");
                return Err(err);
            }

            warn!(
                url,
                attempt = attempt + 1,
                max_attempts,
                error = %failure.describe(),
                "retryable failure"
            );

            if attempt + 1 >= max_attempts {
                let err = failure.into_error(max_attempts);
                error!(url, error = %err, "retries exhausted");
                return Err(err);
            }

            let delay = self
                .config
                .backoff_delay(attempt, failure == AttemptFailure::RateLimited);
            info!(url, delay_ms = delay.as_millis() as u64, "backing off");
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, query: &QueryPayload) -> Result<Value, AttemptFailure> {
        let sent = timeout(
            self.config.timeout,
            self.transport.post_query(&self.credentials, query),
        )
        .await;
        match sent {
            Err(_) => Err(AttemptFailure::Timeout(format!(
                "Request timeout after {} seconds",
                self.config.timeout.as_secs_f64()
            ))),
            Ok(Err(TransportError::Timeout(msg))) => Err(AttemptFailure::Timeout(msg)),
            Ok(Err(err)) => Err(AttemptFailure::Transport(err)),
            Ok(Ok(response)) => classify_response(response),
        }
    }
}
