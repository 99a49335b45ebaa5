use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ScrapeError;

pub const UNKNOWN: &str = "Unknown";
pub const DEFAULT_PRICE: &str = "0.00";
pub const DEFAULT_COUNT: &str = "0";

// ==================== DATA STRUCTURES ====================

/// The caller-facing product record. Every field always holds a value;
/// anything that could not be extracted sits at its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub name: String,
    pub brand: String,
    /// Decimal string, e.g. `"1234.50"`.
    pub price: String,
    pub rating: String,
    pub reviews_count: String,
    pub description: String,
    pub bullet_points: Vec<String>,
    pub images: Vec<String>,
    pub specifications: Map<String, Value>,
    pub availability: String,
    pub url: String,
    pub scraped_at: String,
    #[serde(skip)]
    pub(crate) error: Option<ScrapeError>,
    /// Primary fields the normalizer actually pulled out of the payload,
    /// counted before defaults were filled in.
    #[serde(skip)]
    pub(crate) extracted: Option<u8>,
}

impl Default for CanonicalRecord {
    fn default() -> Self {
        Self {
            name: UNKNOWN.to_string(),
            brand: UNKNOWN.to_string(),
            price: DEFAULT_PRICE.to_string(),
            rating: DEFAULT_COUNT.to_string(),
            reviews_count: DEFAULT_COUNT.to_string(),
            description: String::new(),
            bullet_points: Vec::new(),
            images: Vec::new(),
            specifications: Map::new(),
            availability: String::new(),
            url: String::new(),
            scraped_at: String::new(),
            error: None,
            extracted: None,
        }
    }
}

impl CanonicalRecord {
    /// All-default record carrying `error`.
    pub fn failed(error: ScrapeError, scraped_at: &str) -> Self {
        Self {
            scraped_at: scraped_at.to_string(),
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn error(&self) -> Option<&ScrapeError> {
        self.error.as_ref()
    }

    /// How many of name, brand, price, rating, reviews_count and description
    /// were extracted. Normalized records report what the normalizer found,
    /// so an extracted `0` counts; hand-built records are judged by value.
    pub fn fields_extracted(&self) -> u8 {
        if let Some(count) = self.extracted {
            return count;
        }
        let populated = [
            is_populated(&self.name, UNKNOWN),
            is_populated(&self.brand, UNKNOWN),
            is_populated(&self.price, DEFAULT_PRICE),
            is_populated(&self.rating, DEFAULT_COUNT),
            is_populated(&self.reviews_count, DEFAULT_COUNT),
            !self.description.is_empty(),
        ];
        populated.iter().filter(|p| **p).count() as u8
    }
}

fn is_populated(value: &str, default: &str) -> bool {
    !value.is_empty() && value != default
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub extraction_successful: bool,
    pub error_message: Option<String>,
    pub fields_extracted: u8,
}

/// `{ "product": ..., "metadata": ... }`, the shape persisted and returned
/// to every caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductEnvelope {
    pub product: CanonicalRecord,
    pub metadata: ExtractionMetadata,
}

impl ProductEnvelope {
    pub fn is_success(&self) -> bool {
        self.metadata.extraction_successful
    }
}

/// Packages a normalized record with its metadata. The success flag is
/// decided here and nowhere else.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordAssembler;

impl RecordAssembler {
    pub fn assemble(&self, record: CanonicalRecord) -> ProductEnvelope {
        let metadata = ExtractionMetadata {
            extraction_successful: record.error.is_none(),
            error_message: record.error.as_ref().map(|e| e.to_string()),
            fields_extracted: record.fields_extracted(),
        };
        ProductEnvelope {
            product: record,
            metadata,
        }
    }
}
