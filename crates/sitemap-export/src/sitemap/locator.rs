//! Sitemap-safe absolute URLs.
//!
//! Path segments are percent-encoded individually, so identifiers containing
//! `/`, `?`, `#` or whitespace cannot change the shape of the URL. XML entity
//! escaping happens in the writer.

use std::fmt;
use url::Url;

/// Longest URL the sitemap protocol accepts.
pub const MAX_LOCATOR_LEN: usize = 2048;

/// Why a locator could not be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// The encoded URL is longer than [`MAX_LOCATOR_LEN`].
    TooLong(usize),
    /// The input is not an absolute hierarchical URL.
    Invalid(String),
}

impl fmt::Display for LocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong(len) => write!(f, "url is {len} characters, limit is {MAX_LOCATOR_LEN}"),
            Self::Invalid(reason) => write!(f, "invalid url: {reason}"),
        }
    }
}

impl std::error::Error for LocatorError {}

/// An encoded absolute URL of at most [`MAX_LOCATOR_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator(String);

impl Locator {
    /// Append `segments` to the path of `base`, encoding each one.
    pub fn from_segments<S: AsRef<str>>(base: &Url, segments: &[S]) -> Result<Self, LocatorError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| LocatorError::Invalid(format!("{base} cannot be a base")))?
            .pop_if_empty()
            .extend(segments.iter().map(AsRef::as_ref));
        Self::checked(url.into())
    }

    /// Parse and normalize a complete URL.
    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        let url = Url::parse(raw).map_err(|e| LocatorError::Invalid(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(LocatorError::Invalid(format!("{raw} is not hierarchical")));
        }
        Self::checked(url.into())
    }

    fn checked(encoded: String) -> Result<Self, LocatorError> {
        let len = encoded.chars().count();
        if len > MAX_LOCATOR_LEN {
            return Err(LocatorError::TooLong(len));
        }
        Ok(Self(encoded))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse the configured base URL. Path-less bases get a trailing slash.
pub fn parse_base_url(raw: &str) -> Result<Url, LocatorError> {
    let url = Url::parse(raw.trim()).map_err(|e| LocatorError::Invalid(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(LocatorError::Invalid(format!("{raw} cannot be a base")));
    }
    Ok(url)
}
