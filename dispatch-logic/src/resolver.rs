use std::collections::HashSet;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{services::LookupService, settings::DispatchSettings, stop::Stop};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SearchErrorKind {
    /// Not a 10 digit phone number
    Malformed,
    /// Valid number, but no customer has it
    NotFound,
    /// The lookup service failed for the batch this number was in
    LookupFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Why one entry of a search didn't produce a stop
pub struct SearchError {
    pub entry: String,
    pub kind: SearchErrorKind,
}

impl SearchError {
    fn new(entry: impl Into<String>, kind: SearchErrorKind) -> Self {
        Self {
            entry: entry.into(),
            kind,
        }
    }
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SearchErrorKind::Malformed => {
                write!(f, "\"{}\" is not a valid 10-digit phone number", self.entry)
            }
            SearchErrorKind::NotFound => write!(f, "No customer found for {}", self.entry),
            SearchErrorKind::LookupFailed(why) => {
                write!(f, "Couldn't look up {}: {why}", self.entry)
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchReport {
    /// Found stops, in lookup order
    pub stops: Vec<Stop>,
    pub errors: Vec<SearchError>,
}

fn is_phone_number(entry: &str) -> bool {
    entry.len() == 10 && entry.bytes().all(|b| b.is_ascii_digit())
}

/// Split a comma separated list of phone numbers into unique valid numbers (first occurrence
/// order) and one error per malformed entry
pub fn parse_phone_numbers(raw: &str) -> (Vec<String>, Vec<SearchError>) {
    let mut seen = HashSet::new();
    let mut numbers = Vec::new();
    let mut errors = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if !is_phone_number(entry) {
            errors.push(SearchError::new(entry, SearchErrorKind::Malformed));
        } else if seen.insert(entry) {
            numbers.push(entry.to_string());
        }
    }

    (numbers, errors)
}

/// Turns free text into stops via a [LookupService]
pub struct SearchResolver<L: LookupService> {
    lookup: L,
    batch_size: usize,
}

impl<L: LookupService> SearchResolver<L> {
    pub fn new(lookup: L, settings: &DispatchSettings) -> Self {
        Self {
            lookup,
            batch_size: settings.lookup_batch_size(),
        }
    }

    pub async fn resolve(&self, raw: &str) -> SearchReport {
        let (numbers, mut errors) = parse_phone_numbers(raw);
        let mut stops = Vec::new();
        let mut found = HashSet::new();

        for batch in numbers.chunks(self.batch_size) {
            debug!("Looking up {} numbers", batch.len());
            match self.lookup.find_by_phone_numbers(batch).await {
                Ok(records) => {
                    for record in records {
                        if batch.contains(&record.mobile_number)
                            && found.insert(record.mobile_number.clone())
                        {
                            stops.push(Stop::from(record));
                        }
                    }
                    errors.extend(
                        batch
                            .iter()
                            .filter(|n| !found.contains(*n))
                            .map(|n| SearchError::new(n.as_str(), SearchErrorKind::NotFound)),
                    );
                }
                Err(why) => {
                    warn!("Customer lookup failed: {why:?}");
                    let why = why.to_string();
                    errors.extend(batch.iter().map(|n| {
                        SearchError::new(n.as_str(), SearchErrorKind::LookupFailed(why.clone()))
                    }));
                }
            }
        }

        SearchReport { stops, errors }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::test;

    use super::*;
    use crate::tests::{MockLookup, mk_record};

    fn resolver(lookup: &Arc<MockLookup>) -> SearchResolver<Arc<MockLookup>> {
        SearchResolver::new(lookup.clone(), &DispatchSettings::default())
    }

    #[test]
    async fn test_validation_and_dedup() {
        let lookup = Arc::new(MockLookup::new([mk_record("9876543210", Some("1,2"))]));

        let report = resolver(&lookup)
            .resolve("987,98765,9876543210,9876543210")
            .await;

        assert_eq!(
            report.errors,
            vec![
                SearchError::new("987", SearchErrorKind::Malformed),
                SearchError::new("98765", SearchErrorKind::Malformed),
            ]
        );
        assert_eq!(report.stops.len(), 1);
        assert_eq!(report.stops[0].id.as_str(), "9876543210");
        assert_eq!(
            lookup.calls(),
            vec![vec!["9876543210".to_string()]],
            "Number wasn't looked up exactly once"
        );
    }

    #[test]
    async fn test_whitespace_and_empty_entries() {
        let (numbers, errors) = parse_phone_numbers(" 1234567890 ,, ,12345abcde,");
        assert_eq!(numbers, vec!["1234567890"]);
        assert_eq!(errors, vec![SearchError::new("12345abcde", SearchErrorKind::Malformed)]);

        let (numbers, errors) = parse_phone_numbers("   ");
        assert!(numbers.is_empty() && errors.is_empty());
    }

    #[test]
    async fn test_not_found() {
        let lookup = Arc::new(MockLookup::new([mk_record("1111111111", None)]));
        let report = resolver(&lookup).resolve("1111111111, 2222222222").await;

        assert_eq!(report.stops.len(), 1);
        assert!(!report.stops[0].has_location());
        assert_eq!(
            report.errors,
            vec![SearchError::new("2222222222", SearchErrorKind::NotFound)]
        );
    }

    #[test]
    async fn test_batches() {
        let numbers = (0..23).map(|i| format!("90000000{i:02}")).collect::<Vec<_>>();
        let lookup = Arc::new(MockLookup::new(
            numbers.iter().map(|n| mk_record(n, Some("1,2"))),
        ));

        let report = resolver(&lookup).resolve(&numbers.join(",")).await;

        assert!(report.errors.is_empty());
        let found = report.stops.iter().map(|s| s.id.to_string()).collect::<Vec<_>>();
        assert_eq!(found, numbers, "Stops not in lookup order");

        let sizes = lookup.calls().iter().map(Vec::len).collect::<Vec<_>>();
        assert_eq!(sizes, vec![10, 10, 3]);
    }

    #[test]
    async fn test_failed_batch_doesnt_block_others() {
        let numbers = (0..12).map(|i| format!("80000000{i:02}")).collect::<Vec<_>>();
        let lookup = Arc::new(
            MockLookup::new(numbers.iter().map(|n| mk_record(n, None))).failing_first(1),
        );

        let report = resolver(&lookup).resolve(&numbers.join(",")).await;

        assert_eq!(report.stops.len(), 2, "Second batch should still resolve");
        assert_eq!(report.errors.len(), 10);
        assert!(
            report
                .errors
                .iter()
                .all(|e| matches!(e.kind, SearchErrorKind::LookupFailed(_)))
        );
    }
}
