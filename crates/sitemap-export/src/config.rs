//! Export configuration.
//!
//! Everything has a default except the base URL and the output location. A
//! JSON file (`--config`) can override any subset; command-line flags are
//! applied on top of it by the CLI.

use crate::error::{ExportError, Result};
use crate::export::countries::COUNTRIES_TYPE;
use crate::search::TermsLevel;
use crate::sitemap::changefreq::FrequencyRule;
use crate::sitemap::index::DEFAULT_INDEX_CAP;
use crate::sitemap::locator::{parse_base_url, Locator};
use crate::sitemap::{is_filename_token, LastModified};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use url::Url;

/// Default cap on entries per content sitemap.
pub const DEFAULT_ITEM_CAP: usize = 25_000;
/// Default number of hits per scroll page.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;
/// Default bound of the activity-cache aggregation.
pub const DEFAULT_CACHE_SIZE: usize = 1_000_000;

/// Type names taken by `sitemap_index.xml` and `sitemap_countries.xml`.
const RESERVED_TYPE_NAMES: &[&str] = &["index", COUNTRIES_TYPE];

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub search: SearchSettings,
    pub output: OutputSettings,
    pub paging: PagingSettings,
    /// Restrict every query to one value of a field (e.g. one country).
    pub filter: Option<FilterSettings>,
    /// Country code → slug reference file.
    pub countries_file: Option<PathBuf>,
    /// Last-modified value used when neither the activity cache nor the record has one.
    pub fallback_last_modified: Option<String>,
    /// Export targets, run in order.
    pub targets: Vec<ExportTarget>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            search: SearchSettings::default(),
            output: OutputSettings::default(),
            paging: PagingSettings::default(),
            filter: None,
            countries_file: None,
            fallback_last_modified: None,
            targets: default_targets(),
        }
    }
}

/// Search engine connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub node: String,
    pub request_timeout_secs: u64,
    /// Transport-level retries for connection failures and 502/503/504.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Ask for gzip-compressed responses.
    pub compression: bool,
    pub accept_invalid_certs: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            node: "http://localhost:9200/".to_string(),
            request_timeout_secs: 60,
            max_retries: 10,
            retry_backoff_ms: 250,
            compression: true,
            accept_invalid_certs: false,
        }
    }
}

/// Where and how sitemaps are published.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Public base URL of the site the sitemaps describe.
    pub base_url: Option<String>,
    /// Directory tag under `/static/` where the files are served.
    pub location: Option<String>,
    pub directory: PathBuf,
    pub dry_run: bool,
    /// Separately maintained sitemap listed first in the index.
    pub static_sitemap_url: String,
    /// Also write `sitemap_countries.xml` with one page per observed country.
    pub countries_sitemap: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            location: None,
            directory: PathBuf::from("sitemaps"),
            dry_run: false,
            static_sitemap_url: "https://sociedad.info/sitemap-static.xml".to_string(),
            countries_sitemap: true,
        }
    }
}

/// Page and file sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingSettings {
    pub page_size: usize,
    pub scroll_keep_alive: String,
    pub item_cap: usize,
    pub index_cap: usize,
}

impl Default for PagingSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            scroll_keep_alive: "600s".to_string(),
            item_cap: DEFAULT_ITEM_CAP,
            index_cap: DEFAULT_INDEX_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSettings {
    #[serde(default = "default_filter_field")]
    pub field: String,
    pub value: String,
}

fn default_filter_field() -> String {
    "country.keyword".to_string()
}

impl FilterSettings {
    pub fn country(value: impl Into<String>) -> Self {
        Self {
            field: default_filter_field(),
            value: value.into(),
        }
    }
}

/// One collection/type pair to export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTarget {
    /// Path segment and filename component (`supplier`, `buyer`, ...).
    pub type_name: String,
    pub index: String,
    #[serde(flatten)]
    pub kind: RecordKind,
}

/// The closed set of record kinds, each with its own field bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKind {
    /// Slowly changing reference records walked with a cursor.
    Provider(CursorFields),
    /// Activity records walked with a cursor.
    Transactional(CursorFields),
    /// Entities (and their units) derived from an aggregation.
    Entity(EntityFields),
}

impl RecordKind {
    pub fn frequency_rule(&self) -> FrequencyRule {
        match self {
            Self::Provider(_) => FrequencyRule::Reference,
            Self::Transactional(_) | Self::Entity(_) => FrequencyRule::Activity,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Provider(_) => "provider",
            Self::Transactional(_) => "transactional",
            Self::Entity(_) => "entity",
        }
    }

    /// Whether records are routed by country.
    pub fn is_partitioned(&self) -> bool {
        match self {
            Self::Provider(fields) | Self::Transactional(fields) => fields.partition_field.is_some(),
            Self::Entity(_) => false,
        }
    }
}

/// Field bindings of a cursor-walked record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorFields {
    pub id_field: String,
    #[serde(default)]
    pub last_modified_field: Option<String>,
    #[serde(default)]
    pub partition_field: Option<String>,
    /// Bulk last-modified lookup keyed by the record identifier.
    #[serde(default)]
    pub activity_cache: Option<ActivityCacheSpec>,
}

impl CursorFields {
    /// Fields to request from the engine, without duplicates.
    pub fn requested(&self) -> Vec<String> {
        let mut fields = vec![self.id_field.clone()];
        for field in [&self.last_modified_field, &self.partition_field].into_iter().flatten() {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        fields
    }
}

/// Aggregation that yields the latest activity per identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCacheSpec {
    pub index: String,
    pub key_field: String,
    pub last_modified_field: String,
    #[serde(default = "default_cache_size")]
    pub size: usize,
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

impl ActivityCacheSpec {
    pub fn terms(&self) -> TermsLevel {
        TermsLevel {
            field: self.key_field.clone(),
            size: self.size,
            last_modified_field: Some(self.last_modified_field.clone()),
        }
    }
}

/// Aggregation bindings of an entity target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFields {
    pub groups: TermsLevel,
    #[serde(default)]
    pub units: Option<UnitFields>,
}

/// Nested units, published at `type/entity/{path_segment}/unit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFields {
    pub path_segment: String,
    pub field: String,
    pub size: usize,
    #[serde(default)]
    pub last_modified_field: Option<String>,
}

impl UnitFields {
    pub fn terms(&self) -> TermsLevel {
        TermsLevel {
            field: self.field.clone(),
            size: self.size,
            last_modified_field: self.last_modified_field.clone(),
        }
    }
}

/// Default deployment: providers, entity aggregation, then transactional records.
pub fn default_targets() -> Vec<ExportTarget> {
    vec![
        ExportTarget {
            type_name: "supplier".to_string(),
            index: "sociedad_suppliers".to_string(),
            kind: RecordKind::Provider(CursorFields {
                id_field: "id".to_string(),
                last_modified_field: Some("updated_date".to_string()),
                partition_field: Some("country".to_string()),
                activity_cache: Some(ActivityCacheSpec {
                    index: "sociedad_contracts".to_string(),
                    key_field: "supplier.id.keyword".to_string(),
                    last_modified_field: "date".to_string(),
                    size: DEFAULT_CACHE_SIZE,
                }),
            }),
        },
        ExportTarget {
            type_name: "institution".to_string(),
            index: "sociedad_contracts".to_string(),
            kind: RecordKind::Entity(EntityFields {
                groups: TermsLevel {
                    field: "buyer.institution.keyword".to_string(),
                    size: 25_000,
                    last_modified_field: Some("date".to_string()),
                },
                units: Some(UnitFields {
                    path_segment: "unit".to_string(),
                    field: "buyer.id.keyword".to_string(),
                    size: 1_000,
                    last_modified_field: Some("date".to_string()),
                }),
            }),
        },
        ExportTarget {
            type_name: "buyer".to_string(),
            index: "sociedad_buyers".to_string(),
            kind: RecordKind::Transactional(CursorFields {
                id_field: "id".to_string(),
                last_modified_field: Some("updated_date".to_string()),
                partition_field: Some("country".to_string()),
                activity_cache: None,
            }),
        },
    ]
}

impl ExportConfig {
    /// Read a JSON configuration file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExportError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            ExportError::configuration(format!("invalid config {}: {e}", path.display()))
        })
    }

    /// Check everything that can be checked before contacting the engine.
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        self.location()?;
        self.static_sitemap()?;
        self.fallback()?;
        Url::parse(&self.search.node).map_err(|e| {
            ExportError::configuration(format!("invalid search node {}: {e}", self.search.node))
        })?;

        if self.paging.page_size == 0 {
            return Err(ExportError::configuration("paging.page_size must be positive"));
        }
        if self.paging.item_cap == 0 || self.paging.index_cap == 0 {
            return Err(ExportError::configuration("sitemap caps must be positive"));
        }
        if self.targets.is_empty() {
            return Err(ExportError::configuration("no export targets configured"));
        }
        let mut seen = std::collections::HashSet::new();
        for target in &self.targets {
            if target.type_name.is_empty() || target.index.is_empty() {
                return Err(ExportError::configuration(
                    "every target needs a type_name and an index",
                ));
            }
            check_type_name(&target.type_name)?;
            if !seen.insert(target.type_name.as_str()) {
                return Err(ExportError::configuration(format!(
                    "duplicate target type {}",
                    target.type_name
                )));
            }
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        let raw = self
            .output
            .base_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ExportError::configuration("base URL is required (--base-url)"))?;
        parse_base_url(raw)
            .map_err(|e| ExportError::configuration(format!("invalid base URL {raw}: {e}")))
    }

    pub fn location(&self) -> Result<&str> {
        self.output
            .location
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ExportError::configuration("output location is required (--location)"))
    }

    pub fn static_sitemap(&self) -> Result<Locator> {
        Locator::parse(&self.output.static_sitemap_url).map_err(|e| {
            ExportError::configuration(format!(
                "invalid static sitemap URL {}: {e}",
                self.output.static_sitemap_url
            ))
        })
    }

    pub fn fallback(&self) -> Result<Option<LastModified>> {
        match &self.fallback_last_modified {
            None => Ok(None),
            Some(raw) => LastModified::parse(raw).map(Some).ok_or_else(|| {
                ExportError::configuration(format!("invalid fallback_last_modified {raw}"))
            }),
        }
    }

    /// The query every target runs: `match_all`, or a match on the filter.
    pub fn query(&self) -> Value {
        match &self.filter {
            Some(filter) => json!({ "match": { filter.field.clone(): filter.value } }),
            None => json!({ "match_all": {} }),
        }
    }

    /// Whether any target needs the country reference file.
    pub fn needs_country_lookup(&self) -> bool {
        self.targets.iter().any(|t| t.kind.is_partitioned())
    }
}

/// Type names become filename components. Reserved names and names that
/// could be read as a partition code or an overflow suffix are rejected.
fn check_type_name(type_name: &str) -> Result<()> {
    if RESERVED_TYPE_NAMES.contains(&type_name) {
        return Err(ExportError::configuration(format!(
            "target type {type_name} is reserved"
        )));
    }
    let starts_with_letter = type_name.starts_with(|c: char| c.is_ascii_alphabetic());
    if !starts_with_letter || !is_filename_token(type_name) {
        return Err(ExportError::configuration(format!(
            "target type {type_name:?} must start with a letter and use only letters, digits and '-'"
        )));
    }
    Ok(())
}
