use std::fmt;
use std::time::Duration;

use crate::error::ScrapeError;
use crate::identifier::Country;

// ==================== CONFIG ====================

pub const OXYLABS_API_ENDPOINT: &str = "https://realtime.oxylabs.io/v1/queries";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_GEO_LOCATION: &str = "10001";
pub const DEFAULT_SOURCE: &str = "amazon";
pub const USER_AGENT: &str = "Oxylabs-Amazon-Scraper/1.0";

pub const USERNAME_ENV: &str = "OXYLABS_USERNAME";
pub const PASSWORD_ENV: &str = "OXYLABS_PASSWORD";

const MIN_CREDENTIAL_LEN: usize = 3;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// API principal and secret. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reads `OXYLABS_USERNAME` / `OXYLABS_PASSWORD`; empty values count as unset.
    pub fn from_env() -> Result<Self, ScrapeError> {
        match (env_var(USERNAME_ENV), env_var(PASSWORD_ENV)) {
            (Some(username), Some(password)) => Ok(Self::new(username, password)),
            _ => Err(ScrapeError::InvalidCredentials(format!(
                "credentials not provided; set {} and {}",
                USERNAME_ENV, PASSWORD_ENV
            ))),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(ScrapeError::InvalidCredentials(
                "Username and password are required".to_string(),
            ));
        }
        if self.username.chars().count() < MIN_CREDENTIAL_LEN
            || self.password.chars().count() < MIN_CREDENTIAL_LEN
        {
            return Err(ScrapeError::InvalidCredentials(
                "Invalid credential format".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Knobs for the request pipeline and the caller-level pacing.
#[derive(Debug, Clone, PartialEq)]
pub struct ScraperConfig {
    pub endpoint: String,
    pub source: String,
    /// Upper bound for a single upstream attempt.
    pub timeout: Duration,
    /// Total attempts per logical fetch, first call included.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub backoff_factor: u32,
    /// Extra factor applied to the backoff after a 429.
    pub rate_limit_multiplier: u32,
    /// Pause between consecutive fetches issued by one caller.
    pub request_delay: Duration,
    pub geo_location: String,
    pub country: Country,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            endpoint: OXYLABS_API_ENDPOINT.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            backoff_factor: 2,
            rate_limit_multiplier: 2,
            request_delay: Duration::from_secs(1),
            geo_location: DEFAULT_GEO_LOCATION.to_string(),
            country: Country::Us,
        }
    }
}

impl ScraperConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_geo_location(mut self, geo_location: impl Into<String>) -> Self {
        self.geo_location = geo_location.into();
        self
    }

    pub fn with_country(mut self, country: Country) -> Self {
        self.country = country;
        self
    }

    /// Backoff after failed attempt `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32, rate_limited: bool) -> Duration {
        let factor = self.backoff_factor.saturating_pow(attempt);
        let delay = self.retry_delay.saturating_mul(factor);
        if rate_limited {
            delay.saturating_mul(self.rate_limit_multiplier)
        } else {
            delay
        }
    }
}
