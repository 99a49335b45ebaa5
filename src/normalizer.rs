use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ScrapeError;
use crate::record::{CanonicalRecord, DEFAULT_COUNT, DEFAULT_PRICE, UNKNOWN};

lazy_static! {
    static ref RATING_RE: Regex = Regex::new(r"\d+(?:\.\d+)?").unwrap();
    static ref COUNT_RE: Regex = Regex::new(r"\d[\d,]*").unwrap();
    static ref BULLET_SPLIT_RE: Regex = Regex::new(r"[\n•▪▫◦‣⁃]").unwrap();
    static ref PRICE_FORMAT_RE: Regex = Regex::new(r"^\d+(\.\d{1,2})?$").unwrap();
}

// ==================== FIELD TABLE ====================

/// Output fields filled from `results[0].content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Brand,
    Price,
    Rating,
    ReviewsCount,
    Description,
    BulletPoints,
    Images,
    Specifications,
    Availability,
    Url,
}

impl Field {
    pub const PRIMARY: [Field; 6] = [
        Field::Name,
        Field::Brand,
        Field::Price,
        Field::Rating,
        Field::ReviewsCount,
        Field::Description,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Brand => "brand",
            Field::Price => "price",
            Field::Rating => "rating",
            Field::ReviewsCount => "reviews_count",
            Field::Description => "description",
            Field::BulletPoints => "bullet_points",
            Field::Images => "images",
            Field::Specifications => "specifications",
            Field::Availability => "availability",
            Field::Url => "url",
        }
    }

    /// Candidate keys in `content`, most preferred first.
    pub fn keys(self) -> &'static [&'static str] {
        match self {
            Field::Name => &["title", "name", "product_title"],
            Field::Brand => &["brand", "manufacturer", "brand_name"],
            Field::Price => &[
                "price",
                "current_price",
                "sale_price",
                "price_current",
                "price_range",
            ],
            Field::Rating => &["rating", "average_rating", "stars", "rating_average"],
            Field::ReviewsCount => &[
                "reviews_count",
                "review_count",
                "total_reviews",
                "number_of_reviews",
            ],
            Field::Description => &["description", "product_description", "about"],
            Field::BulletPoints => &[
                "bullet_points",
                "features",
                "key_features",
                "highlights",
                "product_features",
            ],
            Field::Images => &["images", "image_urls", "product_images", "photos"],
            Field::Specifications => &[
                "specifications",
                "specs",
                "technical_details",
                "product_details",
                "attributes",
            ],
            Field::Availability => &["availability", "stock_status", "in_stock"],
            Field::Url => &["url", "product_url", "link"],
        }
    }

    /// Whether a value under one of this field's keys is worth coercing.
    /// Numeric fields take any non-null value so an explicit `0` still counts.
    fn considers(self, value: &Value) -> bool {
        match self {
            Field::Rating | Field::ReviewsCount => !value.is_null(),
            _ => is_truthy(value),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a single field fell back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("no candidate key present")]
    Missing,
    #[error("value under '{key}' unusable: {reason}")]
    Unusable { key: &'static str, reason: String },
}

type Coerce<T> = fn(&Value) -> Result<T, String>;

/// Tries `field`'s keys in order and returns the first value `coerce`
/// accepts. When every present key is rejected, the last rejection wins.
pub fn extract_field<T>(
    content: &Map<String, Value>,
    field: Field,
    coerce: Coerce<T>,
) -> Result<T, FieldError> {
    let mut last_error = FieldError::Missing;
    for &key in field.keys() {
        let Some(value) = content.get(key) else {
            continue;
        };
        if !field.considers(value) {
            continue;
        }
        match coerce(value) {
            Ok(extracted) => return Ok(extracted),
            Err(reason) => last_error = FieldError::Unusable { key, reason },
        }
    }
    Err(last_error)
}

// ==================== COERCIONS ====================

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn coerce_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Err("blank string".to_string())
            } else {
                Ok(trimmed.to_string())
            }
        }
        Value::Null => Err("null".to_string()),
        other => Ok(other.to_string()),
    }
}

/// Keeps digits, `.` and `,`, drops thousands separators and parses an exact
/// decimal. Unparseable strings come back trimmed as they were.
pub fn coerce_price(value: &Value) -> Result<String, String> {
    match value {
        Value::String(raw) => {
            let cleaned: String = raw
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            match Decimal::from_str(&cleaned) {
                Ok(price) => Ok(price.to_string()),
                Err(_) => {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        Err("blank string".to_string())
                    } else {
                        Ok(trimmed.to_string())
                    }
                }
            }
        }
        Value::Number(n) => {
            let literal = n.to_string();
            Ok(Decimal::from_str(&literal)
                .or_else(|_| Decimal::from_scientific(&literal))
                .map(|d| d.to_string())
                .unwrap_or(literal))
        }
        Value::Object(map) => match map.get("value").or_else(|| map.get("amount")) {
            Some(inner) => coerce_price(inner),
            None => Err("price object without 'value' or 'amount'".to_string()),
        },
        other => Err(format!("unsupported price value {}", other)),
    }
}

/// `"4.5 out of 5 stars"` -> `"4.5"`.
pub fn coerce_rating(value: &Value) -> Result<String, String> {
    match value {
        Value::String(raw) => match RATING_RE.find(raw) {
            Some(m) => Ok(m.as_str().to_string()),
            None => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    Err("blank string".to_string())
                } else {
                    Ok(trimmed.to_string())
                }
            }
        },
        Value::Number(n) => Ok(n.to_string()),
        Value::Object(map) => match map.get("value") {
            Some(inner) => coerce_rating(inner),
            None => Err("rating object without 'value'".to_string()),
        },
        other => Err(format!("unsupported rating value {}", other)),
    }
}

/// `"25,847 ratings"` -> `"25847"`.
pub fn coerce_count(value: &Value) -> Result<String, String> {
    match value {
        Value::String(raw) => match COUNT_RE.find(raw) {
            Some(m) => {
                let digits = m.as_str().replace(',', "");
                Ok(digits
                    .parse::<u64>()
                    .map(|n| n.to_string())
                    .unwrap_or(digits))
            }
            None => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    Err("blank string".to_string())
                } else {
                    Ok(trimmed.to_string())
                }
            }
        },
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Ok(u.to_string())
            } else {
                let f = n.as_f64().unwrap_or_default();
                Ok((f.trunc() as i64).to_string())
            }
        }
        other => Err(format!("unsupported count value {}", other)),
    }
}

pub fn coerce_bullets(value: &Value) -> Result<Vec<String>, String> {
    let points: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter(|item| is_truthy(item))
            .map(|item| stringify(item).trim().to_string())
            .filter(|point| !point.is_empty())
            .collect(),
        Value::String(raw) => BULLET_SPLIT_RE
            .split(raw)
            .map(str::trim)
            .filter(|point| !point.is_empty())
            .map(String::from)
            .collect(),
        other => return Err(format!("unsupported bullet value {}", other)),
    };
    if points.is_empty() {
        Err("no non-empty bullet points".to_string())
    } else {
        Ok(points)
    }
}

pub fn coerce_images(value: &Value) -> Result<Vec<String>, String> {
    let images: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter(|item| is_truthy(item))
            .map(|item| stringify(item).trim().to_string())
            .filter(|url| !url.is_empty())
            .collect(),
        Value::String(raw) => vec![raw.trim().to_string()],
        other => return Err(format!("unsupported image value {}", other)),
    };
    if images.iter().all(|url| url.is_empty()) {
        Err("no image URLs".to_string())
    } else {
        Ok(images)
    }
}

/// Mappings are taken as-is. Lists are folded: nested mappings merge
/// key-wise and `"key: value"` strings split on the first colon; later
/// entries overwrite earlier ones.
pub fn coerce_specifications(value: &Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        Value::Array(items) => {
            let mut specs = Map::new();
            for item in items {
                match item {
                    Value::Object(entry) => {
                        for (k, v) in entry {
                            specs.insert(k.clone(), v.clone());
                        }
                    }
                    Value::String(line) => {
                        if let Some((k, v)) = line.split_once(':') {
                            specs.insert(k.trim().to_string(), Value::String(v.trim().to_string()));
                        }
                    }
                    _ => {}
                }
            }
            Ok(specs)
        }
        other => Err(format!("unsupported specifications value {}", other)),
    }
}

// ==================== NORMALIZER ====================

/// Converts whatever the API returned into a [`CanonicalRecord`].
///
/// Pure and synchronous: the same input and timestamp always produce the
/// same record. Diagnostics go to the process-wide `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseNormalizer;

impl ResponseNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalizes a fetch result. A classified error short-circuits into an
    /// all-default record carrying that error.
    pub fn normalize(
        &self,
        fetched: &Result<Value, ScrapeError>,
        scraped_at: &str,
    ) -> CanonicalRecord {
        match fetched {
            Ok(payload) => self.normalize_payload(payload, scraped_at),
            Err(err) => {
                warn!(error = %err, "fetch failed, returning default record");
                CanonicalRecord::failed(err.clone(), scraped_at)
            }
        }
    }

    pub fn normalize_payload(&self, payload: &Value, scraped_at: &str) -> CanonicalRecord {
        let content = match validate_structure(payload) {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, "response failed structural validation");
                return CanonicalRecord::failed(err, scraped_at);
            }
        };

        let mut reader = FieldReader::new(content);
        let mut record = CanonicalRecord {
            name: reader.field_or(Field::Name, coerce_text, UNKNOWN.to_string()),
            brand: reader.field_or(Field::Brand, coerce_text, UNKNOWN.to_string()),
            price: reader.field_or(Field::Price, coerce_price, DEFAULT_PRICE.to_string()),
            rating: reader.field_or(Field::Rating, coerce_rating, DEFAULT_COUNT.to_string()),
            reviews_count: reader.field_or(
                Field::ReviewsCount,
                coerce_count,
                DEFAULT_COUNT.to_string(),
            ),
            description: reader.field_or(Field::Description, coerce_text, String::new()),
            bullet_points: reader.field_or(Field::BulletPoints, coerce_bullets, Vec::new()),
            images: reader.field_or(Field::Images, coerce_images, Vec::new()),
            specifications: reader.field_or(
                Field::Specifications,
                coerce_specifications,
                Map::new(),
            ),
            availability: reader.field_or(Field::Availability, coerce_text, String::new()),
            url: reader.field_or(Field::Url, coerce_text, String::new()),
            scraped_at: scraped_at.to_string(),
            ..CanonicalRecord::default()
        };
        record.extracted = Some(reader.primary_hits);

        check_record(&record);
        record
    }
}

/// Reads fields off one content object, keeping count of the primary
/// fields that were really there.
struct FieldReader<'a> {
    content: &'a Map<String, Value>,
    primary_hits: u8,
}

impl<'a> FieldReader<'a> {
    fn new(content: &'a Map<String, Value>) -> Self {
        Self {
            content,
            primary_hits: 0,
        }
    }

    fn field_or<T>(&mut self, field: Field, coerce: Coerce<T>, default: T) -> T {
        match extract_field(self.content, field, coerce) {
            Ok(value) => {
                if Field::PRIMARY.contains(&field) {
                    self.primary_hits += 1;
                }
                value
            }
            Err(FieldError::Missing) => {
                debug!(field = %field, "field not present, using default");
                default
            }
            Err(err) => {
                warn!(field = %field, error = %err, "error extracting field, using default");
                default
            }
        }
    }
}

/// Accepts only `{"results": [{"content": {...}}, ...]}`. An error marker
/// in the payload comes back as its classified error.
pub fn validate_structure(payload: &Value) -> Result<&Map<String, Value>, ScrapeError> {
    let Some(root) = payload.as_object() else {
        return Err(ScrapeError::StructuralValidation(
            "Response must be a dictionary".to_string(),
        ));
    };

    if let Some(marker) = root.get("error") {
        let tag = marker.as_str().unwrap_or("unknown");
        let message = root
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(ScrapeError::from_marker(tag, message));
    }

    let Some(results) = root.get("results") else {
        return Err(ScrapeError::StructuralValidation(
            "No 'results' field found in API response".to_string(),
        ));
    };

    let first = match results.as_array().and_then(|r| r.first()) {
        Some(first) => first,
        None => {
            return Err(ScrapeError::StructuralValidation(
                "Results field must be a non-empty list".to_string(),
            ))
        }
    };

    match first.get("content") {
        None => Err(ScrapeError::StructuralValidation(
            "No 'content' field found in first result".to_string(),
        )),
        Some(Value::Object(content)) => Ok(content),
        Some(_) => Err(ScrapeError::StructuralValidation(
            "Content field must be a dictionary".to_string(),
        )),
    }
}

/// Post-extraction diagnostics. Logs only; never changes the record.
fn check_record(record: &CanonicalRecord) {
    if record.fields_extracted() == 0 {
        warn!("no primary fields extracted");
    }
    for field in Field::PRIMARY {
        let missing = match field {
            Field::Name => record.name == UNKNOWN,
            Field::Brand => record.brand == UNKNOWN,
            Field::Price => record.price == DEFAULT_PRICE,
            Field::Rating => record.rating == DEFAULT_COUNT,
            Field::ReviewsCount => record.reviews_count == DEFAULT_COUNT,
            _ => record.description.is_empty(),
        };
        if missing {
            debug!(field = %field, "required field missing");
        }
    }

    if !PRICE_FORMAT_RE.is_match(&record.price) {
        warn!(price = %record.price, "price format may be invalid");
    }

    match record.rating.parse::<f64>() {
        Ok(rating) if !(0.0..=5.0).contains(&rating) => {
            warn!(rating, "rating value out of range");
        }
        Ok(_) => {}
        Err(_) => warn!(rating = %record.rating, "invalid rating format"),
    }

    match record.reviews_count.replace(',', "").parse::<i64>() {
        Ok(count) if count < 0 => warn!(count, "invalid reviews count"),
        Ok(_) => {}
        Err(_) => warn!(reviews_count = %record.reviews_count, "invalid reviews count format"),
    }
}
