//! # sitemap-export
//!
//! Bulk export of OpenSearch / Elasticsearch collections into sitemap 0.9
//! files, partitioned by country and capped per file, plus a single sitemap
//! index that references every produced file.
//!
//! The pipeline per target is: page the collection ([`search`]), project each
//! record to a URL entry ([`export::projector`]), route it to a per-partition
//! buffer ([`export::batcher`]) and render full buffers ([`sitemap::writer`]).
//! [`export::orchestrator`] sequences targets and writes the index last.

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod search;
pub mod sitemap;

use config::ExportConfig;
use error::{ExportError, Result};
use export::CountryLookup;

/// Load the country reference file if the configuration names one.
///
/// Partitioned targets cannot resolve a single record without it, so its
/// absence is a reference-data error in that case.
pub fn load_country_lookup(config: &ExportConfig) -> Result<CountryLookup> {
    match &config.countries_file {
        Some(path) => CountryLookup::load(path),
        None if config.needs_country_lookup() => Err(ExportError::ReferenceData {
            path: "<unset>".into(),
            reason: "partitioned targets need a country reference file (--countries)".into(),
        }),
        None => Ok(CountryLookup::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::RecordKind;

    #[test]
    fn test_lookup_required_only_for_partitioned_targets() {
        let mut config = ExportConfig::default();
        let err = load_country_lookup(&config).unwrap_err();
        assert_eq!(err.exit_code(), error::EXIT_REFERENCE_DATA);

        config
            .targets
            .retain(|t| matches!(t.kind, RecordKind::Entity(_)));
        let lookup = load_country_lookup(&config).unwrap();
        assert!(lookup.is_empty());
    }
}
