//! Raw record → sitemap entry.

use super::countries::CountryLookup;
use crate::config::CursorFields;
use crate::search::{GroupKey, RawRecord};
use crate::sitemap::{
    classify, classify_unparseable, FrequencyRule, LastModified, Locator, LocatorError,
    UrlDescriptor,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// Why a record produced no entry. Not an error: the record still counts as seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    MissingIdentifier,
    UnknownPartition,
    LocatorTooLong,
    InvalidLocator,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingIdentifier => "missing_identifier",
            Self::UnknownPartition => "unknown_partition",
            Self::LocatorTooLong => "locator_too_long",
            Self::InvalidLocator => "invalid_locator",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LocatorError> for SkipReason {
    fn from(e: LocatorError) -> Self {
        match e {
            LocatorError::TooLong(_) => Self::LocatorTooLong,
            LocatorError::Invalid(_) => Self::InvalidLocator,
        }
    }
}

/// A projected record and, when partitioned, the country it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projected {
    pub descriptor: UrlDescriptor,
    /// `(code, slug)` of the partition, for the countries sitemap.
    pub country: Option<(String, String)>,
}

/// Turns raw records of one target into [`UrlDescriptor`]s.
pub struct RecordProjector<'a> {
    base_url: &'a Url,
    type_name: &'a str,
    rule: FrequencyRule,
    countries: &'a CountryLookup,
    cache: Option<&'a HashMap<String, LastModified>>,
    fallback: Option<LastModified>,
    now: DateTime<Utc>,
}

impl<'a> RecordProjector<'a> {
    pub fn new(
        base_url: &'a Url,
        type_name: &'a str,
        rule: FrequencyRule,
        countries: &'a CountryLookup,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            base_url,
            type_name,
            rule,
            countries,
            cache: None,
            fallback: None,
            now,
        }
    }

    /// Bulk per-identifier last-modified values, consulted before the record itself.
    pub fn with_cache(mut self, cache: &'a HashMap<String, LastModified>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_fallback(mut self, fallback: Option<LastModified>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Project one cursor hit.
    pub fn project_hit(
        &self,
        record: &RawRecord,
        fields: &CursorFields,
    ) -> Result<Projected, SkipReason> {
        let id = record
            .first(&fields.id_field)
            .filter(|id| !id.is_empty())
            .ok_or(SkipReason::MissingIdentifier)?;

        let raw_last_modified = fields
            .last_modified_field
            .as_deref()
            .and_then(|field| record.first(field));
        let from_record = raw_last_modified.as_deref().and_then(LastModified::parse);
        let unparseable = raw_last_modified.is_some() && from_record.is_none();
        let cached = self.cached(&id);
        let last_modified = cached.or(from_record).or(self.fallback);
        let frequency = if cached.is_none() && unparseable {
            classify_unparseable(self.rule)
        } else {
            classify(self.rule, last_modified.as_ref(), self.now)
        };

        let (locator, country) = match &fields.partition_field {
            Some(field) => {
                let code = record.first(field).ok_or(SkipReason::UnknownPartition)?;
                let slug = self.countries.slug(&code).ok_or(SkipReason::UnknownPartition)?;
                let locator =
                    Locator::from_segments(self.base_url, &[slug, self.type_name, id.as_str()])?;
                (locator, Some((code, slug.to_string())))
            }
            None => (
                Locator::from_segments(self.base_url, &[self.type_name, id.as_str()])?,
                None,
            ),
        };

        let partition_key = country.as_ref().map(|(code, _)| code.clone());
        Ok(Projected {
            descriptor: UrlDescriptor::new(locator, last_modified, Some(frequency), partition_key),
            country,
        })
    }

    /// Project one flattened aggregation bucket.
    ///
    /// Units are published under `type/entity/{unit_segment}/unit`.
    pub fn project_group(
        &self,
        group: &GroupKey,
        unit_segment: &str,
    ) -> Result<UrlDescriptor, SkipReason> {
        if group.entity.is_empty() {
            return Err(SkipReason::MissingIdentifier);
        }
        let locator = match group.unit.as_deref() {
            None => Locator::from_segments(self.base_url, &[self.type_name, group.entity.as_str()])?,
            Some("") => return Err(SkipReason::MissingIdentifier),
            Some(unit) => Locator::from_segments(
                self.base_url,
                &[self.type_name, group.entity.as_str(), unit_segment, unit],
            )?,
        };
        let last_modified = self
            .cached(&group.entity)
            .or(group.last_modified)
            .or(self.fallback);
        let frequency = classify(self.rule, last_modified.as_ref(), self.now);
        Ok(UrlDescriptor::new(locator, last_modified, Some(frequency), None))
    }

    fn cached(&self, id: &str) -> Option<LastModified> {
        self.cache.and_then(|cache| cache.get(id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sitemap::locator::parse_base_url;
    use crate::sitemap::{ChangeFrequency, MAX_LOCATOR_LEN};
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn record(fields: Value) -> RawRecord {
        let map = fields
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), vec![v.clone()]))
            .collect();
        RawRecord { fields: map }
    }

    fn lookup() -> CountryLookup {
        [("MX".to_string(), "mexico".to_string())].into_iter().collect()
    }

    fn partitioned() -> CursorFields {
        CursorFields {
            id_field: "id".into(),
            last_modified_field: Some("updated_date".into()),
            partition_field: Some("country".into()),
            activity_cache: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_partitioned_hit() {
        let base = parse_base_url("https://example.com/").unwrap();
        let countries = lookup();
        let projector =
            RecordProjector::new(&base, "buyer", FrequencyRule::Activity, &countries, now());

        let out = projector
            .project_hit(
                &record(json!({ "id": "b 1", "country": "MX", "updated_date": "2024-06-28" })),
                &partitioned(),
            )
            .unwrap();

        assert_eq!(out.descriptor.locator().as_str(), "https://example.com/mexico/buyer/b%201");
        assert_eq!(out.descriptor.partition_key(), Some("MX"));
        assert_eq!(out.descriptor.change_frequency(), Some(ChangeFrequency::Daily));
        assert_eq!(out.country, Some(("MX".to_string(), "mexico".to_string())));
    }

    #[test]
    fn test_skips() {
        let base = parse_base_url("https://example.com/").unwrap();
        let countries = lookup();
        let projector =
            RecordProjector::new(&base, "buyer", FrequencyRule::Activity, &countries, now());
        let fields = partitioned();

        let missing_id = projector.project_hit(&record(json!({ "country": "MX" })), &fields);
        assert_eq!(missing_id.unwrap_err(), SkipReason::MissingIdentifier);

        let unknown = projector.project_hit(&record(json!({ "id": "1", "country": "ZZ" })), &fields);
        assert_eq!(unknown.unwrap_err(), SkipReason::UnknownPartition);

        let no_country = projector.project_hit(&record(json!({ "id": "1" })), &fields);
        assert_eq!(no_country.unwrap_err(), SkipReason::UnknownPartition);

        let long_id = "x".repeat(MAX_LOCATOR_LEN);
        let too_long = projector.project_hit(&record(json!({ "id": long_id, "country": "MX" })), &fields);
        assert_eq!(too_long.unwrap_err(), SkipReason::LocatorTooLong);
    }

    #[test]
    fn test_lastmod_resolution_order() {
        let base = parse_base_url("https://example.com/").unwrap();
        let countries = CountryLookup::default();
        let cache: HashMap<String, LastModified> =
            [("s1".to_string(), LastModified::parse("2024-05-01").unwrap())].into();
        let fallback = LastModified::parse("2015-01-01");
        let projector =
            RecordProjector::new(&base, "supplier", FrequencyRule::Reference, &countries, now())
                .with_cache(&cache)
                .with_fallback(fallback);
        let fields = CursorFields {
            partition_field: None,
            ..partitioned()
        };

        let lm = |fields_json: Value| {
            projector
                .project_hit(&record(fields_json), &fields)
                .unwrap()
                .descriptor
                .last_modified()
                .map(ToString::to_string)
        };
        assert_eq!(lm(json!({ "id": "s1", "updated_date": "2020-01-01" })).as_deref(), Some("2024-05-01"));
        assert_eq!(lm(json!({ "id": "s2", "updated_date": "2020-01-01" })).as_deref(), Some("2020-01-01"));
        assert_eq!(lm(json!({ "id": "s3", "updated_date": "garbage" })).as_deref(), Some("2015-01-01"));
        assert_eq!(lm(json!({ "id": "s4" })).as_deref(), Some("2015-01-01"));

        let out = projector.project_hit(&record(json!({ "id": "s4" })), &fields).unwrap();
        assert_eq!(out.descriptor.locator().as_str(), "https://example.com/supplier/s4");
        assert_eq!(out.descriptor.change_frequency(), Some(ChangeFrequency::Monthly));
        assert!(out.country.is_none());
    }

    #[test]
    fn test_unparseable_activity_timestamp_is_yearly() {
        let base = parse_base_url("https://example.com/").unwrap();
        let countries = CountryLookup::default();
        let fields = CursorFields {
            partition_field: None,
            ..partitioned()
        };
        let garbage = record(json!({ "id": "b1", "updated_date": "not-a-date" }));

        let projector =
            RecordProjector::new(&base, "buyer", FrequencyRule::Activity, &countries, now());
        let out = projector.project_hit(&garbage, &fields).unwrap();
        assert!(out.descriptor.last_modified().is_none());
        assert_eq!(out.descriptor.change_frequency(), Some(ChangeFrequency::Yearly));

        let missing = projector.project_hit(&record(json!({ "id": "b2" })), &fields).unwrap();
        assert_eq!(missing.descriptor.change_frequency(), Some(ChangeFrequency::Daily));

        let with_fallback = RecordProjector::new(
            &base,
            "buyer",
            FrequencyRule::Activity,
            &countries,
            now(),
        )
        .with_fallback(LastModified::parse("2015-01-01"));
        let out = with_fallback.project_hit(&garbage, &fields).unwrap();
        assert_eq!(
            out.descriptor.last_modified().map(ToString::to_string).as_deref(),
            Some("2015-01-01")
        );
        assert_eq!(out.descriptor.change_frequency(), Some(ChangeFrequency::Yearly));

        let cache: HashMap<String, LastModified> =
            [("b1".to_string(), LastModified::parse("2024-06-30").unwrap())].into();
        let cached = RecordProjector::new(&base, "buyer", FrequencyRule::Activity, &countries, now())
            .with_cache(&cache);
        let out = cached.project_hit(&garbage, &fields).unwrap();
        assert_eq!(out.descriptor.change_frequency(), Some(ChangeFrequency::Daily));
    }

    #[test]
    fn test_pre_2000_lastmod_is_omitted_but_entry_kept() {
        let base = parse_base_url("https://example.com/").unwrap();
        let countries = CountryLookup::default();
        let projector =
            RecordProjector::new(&base, "buyer", FrequencyRule::Activity, &countries, now());
        let fields = CursorFields {
            partition_field: None,
            ..partitioned()
        };

        let out = projector
            .project_hit(&record(json!({ "id": "b1", "updated_date": "1999-12-31" })), &fields)
            .unwrap();
        assert!(out.descriptor.last_modified().is_none());
        assert_eq!(out.descriptor.change_frequency(), Some(ChangeFrequency::Yearly));
    }

    #[test]
    fn test_project_group() {
        let base = parse_base_url("https://example.com/").unwrap();
        let countries = CountryLookup::default();
        let projector =
            RecordProjector::new(&base, "institution", FrequencyRule::Activity, &countries, now());

        let entity = GroupKey {
            entity: "Secretaría de Salud".into(),
            unit: None,
            last_modified: LastModified::parse("2024-01-01"),
        };
        let d = projector.project_group(&entity, "unit").unwrap();
        assert_eq!(
            d.locator().as_str(),
            "https://example.com/institution/Secretar%C3%ADa%20de%20Salud"
        );
        assert_eq!(d.change_frequency(), Some(ChangeFrequency::Yearly));

        let unit = GroupKey {
            entity: "SSA".into(),
            unit: Some("U/12".into()),
            last_modified: None,
        };
        let d = projector.project_group(&unit, "unit").unwrap();
        assert_eq!(d.locator().as_str(), "https://example.com/institution/SSA/unit/U%2F12");
        assert_eq!(d.change_frequency(), Some(ChangeFrequency::Daily));

        let blank = GroupKey {
            entity: String::new(),
            unit: None,
            last_modified: None,
        };
        assert_eq!(projector.project_group(&blank, "unit"), Err(SkipReason::MissingIdentifier));
    }
}
