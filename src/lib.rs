//! Amazon product scraping through the Oxylabs realtime API.
//!
//! [`RequestPipeline`] turns one product URL into a decoded payload or a
//! classified [`ScrapeError`], retrying transient failures with exponential
//! backoff. [`ResponseNormalizer`] turns that result into a fully populated
//! [`CanonicalRecord`], and [`RecordAssembler`] wraps it into the
//! `{product, metadata}` envelope. [`Scraper`] ties the three together.

pub mod config;
pub mod error;
pub mod identifier;
pub mod normalizer;
pub mod pipeline;
pub mod record;
pub mod search;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub use crate::config::{Credentials, ScraperConfig};
pub use crate::error::{ScrapeError, TransportError};
pub use crate::identifier::{build_product_url, resolve_product_url, Asin, Country};
pub use crate::normalizer::{validate_structure, Field, FieldError, ResponseNormalizer};
pub use crate::pipeline::{
    QueryPayload, RequestPipeline, Sleeper, TokioSleeper, Transport, TransportResponse,
    WreqTransport,
};
pub use crate::record::{CanonicalRecord, ExtractionMetadata, ProductEnvelope, RecordAssembler};
pub use crate::search::{build_search_url, parse_search_page, SearchResultItem};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Installs the process-wide `tracing` subscriber. `RUST_LOG` wins over
/// `verbose`; calling it again is a no-op.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

// ==================== MAIN ORCHESTRATOR ====================

/// Fetch, normalize and assemble. Never fails: every problem ends up in the
/// envelope's metadata.
pub struct Scraper<T: Transport = WreqTransport> {
    pipeline: RequestPipeline<T>,
    normalizer: ResponseNormalizer,
    assembler: RecordAssembler,
}

impl Scraper<WreqTransport> {
    pub fn new(credentials: Credentials, config: ScraperConfig) -> Result<Self, ScrapeError> {
        Ok(Self::from_pipeline(RequestPipeline::new(credentials, config)?))
    }
}

impl<T: Transport> Scraper<T> {
    pub fn from_pipeline(pipeline: RequestPipeline<T>) -> Self {
        Self {
            pipeline,
            normalizer: ResponseNormalizer::new(),
            assembler: RecordAssembler,
        }
    }

    pub fn config(&self) -> &ScraperConfig {
        self.pipeline.config()
    }

    /// Scrapes one product given as a URL or a bare ASIN. A bare ASIN is
    /// expanded against the configured country.
    pub async fn scrape_product(
        &self,
        product: &str,
        geo_location: Option<&str>,
    ) -> ProductEnvelope {
        let config = self.pipeline.config();
        let url = resolve_product_url(product, config.country);
        let geo_location = geo_location.unwrap_or(&config.geo_location);
        info!(url = %url, geo_location, "scraping product");

        let fetched = self.pipeline.fetch(&url, geo_location).await;
        let mut record = self.normalizer.normalize(&fetched, &timestamp());
        record.url = url;
        let envelope = self.assembler.assemble(record);
        info!(
            success = envelope.metadata.extraction_successful,
            fields_extracted = envelope.metadata.fields_extracted,
            "product scraped"
        );
        envelope
    }

    /// Scrapes products one after another with the pacing delay in between.
    /// Output order follows input order.
    pub async fn scrape_products<S: AsRef<str>>(
        &self,
        products: &[S],
        geo_location: Option<&str>,
    ) -> Vec<ProductEnvelope> {
        let mut envelopes = Vec::with_capacity(products.len());
        for (idx, product) in products.iter().enumerate() {
            if idx > 0 {
                self.pace().await;
            }
            envelopes.push(self.scrape_product(product.as_ref(), geo_location).await);
        }
        envelopes
    }

    /// Waits out the configured inter-request delay.
    pub async fn pace(&self) {
        let delay = self.pipeline.config().request_delay;
        self.pipeline.sleeper().sleep(delay).await;
    }

    /// Collects product rows from `pages` search-result pages. Pages that
    /// fail or come back without `results`/`content` are logged and skipped.
    pub async fn scrape_search_results(
        &self,
        query: &str,
        geo_location: Option<&str>,
        pages: u32,
    ) -> Vec<SearchResultItem> {
        let geo_location = geo_location.unwrap_or(&self.pipeline.config().geo_location);
        let mut items = Vec::new();

        for page in 1..=pages {
            if page > 1 {
                self.pace().await;
            }
            let url = build_search_url(query, page);
            info!(page, url = %url, "scraping search results page");

            let payload = match self.pipeline.fetch_search(&url, geo_location).await {
                Ok(payload) => payload,
                Err(err) => {
                    error!(page, error = %err, "API error on search page");
                    continue;
                }
            };
            if let Err(err) = validate_structure(&payload) {
                error!(page, error = %err, "unusable search page");
                continue;
            }
            match parse_search_page(&payload, &timestamp()) {
                Some(found) => items.extend(found),
                None => error!(page, "no content in search page"),
            }
        }
        items
    }
}

// ==================== PYO3 BINDINGS ====================

#[cfg(feature = "python")]
mod python {
    use std::time::Duration;

    use pyo3::exceptions::PyRuntimeError;
    use pyo3::prelude::*;
    use pyo3::types::{PyDict, PyList};
    use serde_json::Value;

    use crate::{
        init_logging, timestamp, CanonicalRecord, Country, Credentials, RecordAssembler,
        ScrapeError, Scraper, ScraperConfig,
    };

    fn json_to_py(py: Python<'_>, value: &Value) -> PyResult<PyObject> {
        Ok(match value {
            Value::Null => py.None(),
            Value::Bool(b) => (*b).into_py(py),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i.into_py(py)
                } else if let Some(u) = n.as_u64() {
                    u.into_py(py)
                } else {
                    n.as_f64().unwrap_or_default().into_py(py)
                }
            }
            Value::String(s) => s.as_str().into_py(py),
            Value::Array(items) => {
                let list = PyList::empty_bound(py);
                for item in items {
                    list.append(json_to_py(py, item)?)?;
                }
                list.into_any().unbind()
            }
            Value::Object(map) => {
                let dict = PyDict::new_bound(py);
                for (k, v) in map {
                    dict.set_item(k, json_to_py(py, v)?)?;
                }
                dict.into_any().unbind()
            }
        })
    }

    fn build_scraper(
        username: Option<String>,
        password: Option<String>,
        country: Option<&str>,
        timeout_secs: Option<f64>,
    ) -> Result<Scraper, ScrapeError> {
        let credentials = match (username, password) {
            (Some(username), Some(password)) => Credentials::new(username, password),
            _ => Credentials::from_env()?,
        };
        let mut config = ScraperConfig::default();
        if let Some(code) = country {
            config = config.with_country(Country::from_code(code));
        }
        if let Some(timeout) = timeout_secs.and_then(|t| Duration::try_from_secs_f64(t).ok()) {
            config = config.with_timeout(timeout);
        }
        Scraper::new(credentials, config)
    }

    fn runtime() -> PyResult<tokio::runtime::Runtime> {
        tokio::runtime::Runtime::new().map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    fn to_py<T: serde::Serialize>(py: Python<'_>, data: &T) -> PyResult<PyObject> {
        let value =
            serde_json::to_value(data).map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        json_to_py(py, &value)
    }

    #[pyfunction]
    #[pyo3(signature = (product, username=None, password=None, geo_location=None, country=None, timeout_secs=None))]
    fn scrape_product(
        py: Python,
        product: String,
        username: Option<String>,
        password: Option<String>,
        geo_location: Option<String>,
        country: Option<String>,
        timeout_secs: Option<f64>,
    ) -> PyResult<PyObject> {
        init_logging(false);
        let runtime = runtime()?;
        let envelope = py.allow_threads(|| {
            runtime.block_on(async {
                match build_scraper(username, password, country.as_deref(), timeout_secs) {
                    Ok(scraper) => {
                        scraper
                            .scrape_product(&product, geo_location.as_deref())
                            .await
                    }
                    Err(err) => {
                        RecordAssembler.assemble(CanonicalRecord::failed(err, &timestamp()))
                    }
                }
            })
        });
        to_py(py, &envelope)
    }

    #[pyfunction]
    #[pyo3(signature = (query, username=None, password=None, geo_location=None, pages=1, timeout_secs=None))]
    fn scrape_search(
        py: Python,
        query: String,
        username: Option<String>,
        password: Option<String>,
        geo_location: Option<String>,
        pages: u32,
        timeout_secs: Option<f64>,
    ) -> PyResult<PyObject> {
        init_logging(false);
        let runtime = runtime()?;
        let items = py.allow_threads(|| {
            runtime.block_on(async {
                let scraper = build_scraper(username, password, None, timeout_secs)?;
                Ok::<_, ScrapeError>(
                    scraper
                        .scrape_search_results(&query, geo_location.as_deref(), pages)
                        .await,
                )
            })
        });
        let items = items.map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        to_py(py, &items)
    }

    #[pymodule]
    fn amazon_scraper(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(scrape_product, m)?)?;
        m.add_function(wrap_pyfunction!(scrape_search, m)?)?;
        Ok(())
    }
}
