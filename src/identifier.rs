use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ScrapeError;

lazy_static! {
    static ref ASIN_RE: Regex = Regex::new(r"^B[0-9A-Z]{9}$").unwrap();
    // Priority order matters: the first pattern whose capture validates wins.
    static ref ASIN_URL_PATTERNS: [Regex; 4] = [
        Regex::new(r"/dp/([0-9A-Za-z]+)").unwrap(),
        Regex::new(r"/product/([0-9A-Za-z]+)").unwrap(),
        Regex::new(r"/gp/product/([0-9A-Za-z]+)").unwrap(),
        Regex::new(r"[?&]asin=([0-9A-Za-z]+)").unwrap(),
    ];
}

/// A validated ASIN: `B` followed by nine characters from `[0-9A-Z]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Asin(String);

impl Asin {
    pub fn parse(raw: &str) -> Result<Self, ScrapeError> {
        if ASIN_RE.is_match(raw) {
            Ok(Asin(raw.to_string()))
        } else {
            Err(ScrapeError::InvalidIdentifier(format!(
                "Invalid ASIN format: {}",
                raw
            )))
        }
    }

    pub fn is_valid(raw: &str) -> bool {
        ASIN_RE.is_match(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Locates the ASIN in a product URL.
    ///
    /// Tries `/dp/`, `/product/`, `/gp/product/` and the `asin=` query
    /// parameter in that order. A capture that fails validation does not stop
    /// the search; a later pattern may still match.
    pub fn from_url(url: &str) -> Result<Self, ScrapeError> {
        for pattern in ASIN_URL_PATTERNS.iter() {
            let candidate = pattern
                .captures(url)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str());
            if let Some(candidate) = candidate {
                if Self::is_valid(candidate) {
                    return Ok(Asin(candidate.to_string()));
                }
            }
        }
        Err(ScrapeError::InvalidIdentifier(format!(
            "Invalid or missing ASIN in URL: {}",
            url
        )))
    }
}

impl fmt::Display for Asin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Asin {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Asin::parse(s)
    }
}

impl TryFrom<String> for Asin {
    type Error = ScrapeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Asin::parse(&value)
    }
}

impl From<Asin> for String {
    fn from(asin: Asin) -> Self {
        asin.0
    }
}

/// Marketplaces a bare ASIN can be expanded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Country {
    #[default]
    Us,
    Uk,
    De,
    Fr,
    It,
    Es,
    Ca,
    Jp,
    Au,
    In,
}

impl Country {
    pub const ALL: [Country; 10] = [
        Country::Us,
        Country::Uk,
        Country::De,
        Country::Fr,
        Country::It,
        Country::Es,
        Country::Ca,
        Country::Jp,
        Country::Au,
        Country::In,
    ];

    /// Case-insensitive; unknown codes fall back to the US marketplace.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "UK" => Country::Uk,
            "DE" => Country::De,
            "FR" => Country::Fr,
            "IT" => Country::It,
            "ES" => Country::Es,
            "CA" => Country::Ca,
            "JP" => Country::Jp,
            "AU" => Country::Au,
            "IN" => Country::In,
            _ => Country::Us,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Country::Us => "US",
            Country::Uk => "UK",
            Country::De => "DE",
            Country::Fr => "FR",
            Country::It => "IT",
            Country::Es => "ES",
            Country::Ca => "CA",
            Country::Jp => "JP",
            Country::Au => "AU",
            Country::In => "IN",
        }
    }

    pub fn domain(self) -> &'static str {
        match self {
            Country::Us => "amazon.com",
            Country::Uk => "amazon.co.uk",
            Country::De => "amazon.de",
            Country::Fr => "amazon.fr",
            Country::It => "amazon.it",
            Country::Es => "amazon.es",
            Country::Ca => "amazon.ca",
            Country::Jp => "amazon.co.jp",
            Country::Au => "amazon.com.au",
            Country::In => "amazon.in",
        }
    }
}

pub fn build_product_url(asin: &Asin, country: Country) -> String {
    format!("https://www.{}/dp/{}", country.domain(), asin)
}

/// Turns caller input into the URL handed to the pipeline.
///
/// A bare ASIN is expanded against `country`; anything else is passed
/// through as a URL (scheme added when missing) and validated later.
pub fn resolve_product_url(input: &str, country: Country) -> String {
    let trimmed = input.trim();
    if let Ok(asin) = Asin::parse(trimmed) {
        return build_product_url(&asin, country);
    }
    if Url::parse(trimmed).is_ok() {
        return trimmed.to_string();
    }
    let with_scheme = format!("https://{}", trimmed);
    match Url::parse(&with_scheme) {
        Ok(url) if url.host_str().is_some_and(|h| h.contains('.')) => with_scheme,
        _ => trimmed.to_string(),
    }
}
