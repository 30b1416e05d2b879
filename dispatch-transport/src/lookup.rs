use std::{collections::HashMap, path::Path};

use anyhow::bail;
use log::info;

use dispatch_logic::{CustomerRecord, LookupService, MAX_LOOKUP_BATCH, prelude::*};

/// [LookupService] over a JSON list of customer records, later records for the same number
/// replace earlier ones
pub struct FileLookup {
    records: HashMap<String, CustomerRecord>,
}

impl FileLookup {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read customers from {}", path.display()))?;
        let lookup = Self::from_json(&raw)?;
        info!("Loaded {} customers from {}", lookup.len(), path.display());
        Ok(lookup)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let records = serde_json::from_str::<Vec<CustomerRecord>>(raw)
            .context("Customer file is not a list of customer records")?;
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: impl IntoIterator<Item = CustomerRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.mobile_number.clone(), r))
            .collect();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl LookupService for FileLookup {
    async fn find_by_phone_numbers(&self, numbers: &[String]) -> Result<Vec<CustomerRecord>> {
        if numbers.len() > MAX_LOOKUP_BATCH {
            bail!("At most {MAX_LOOKUP_BATCH} numbers can be looked up at once");
        }
        Ok(numbers
            .iter()
            .filter_map(|n| self.records.get(n).cloned())
            .collect())
    }
}
