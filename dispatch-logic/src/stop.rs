use serde::{Deserialize, Serialize};

use crate::location::Location;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Identifies a stop, this is the customer's phone number
pub struct StopId(String);

impl StopId {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self(phone_number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
/// A customer as stored by the lookup service
pub struct CustomerRecord {
    pub mobile_number: String,
    pub name: Option<String>,
    pub address: Option<String>,
    /// Human readable list of ordered items
    pub order_list: Option<String>,
    /// Total due for the order
    pub price: Option<f64>,
    /// `"lat,long"`, may be missing or garbage
    pub lat_lng: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// A pending delivery
pub struct Stop {
    pub id: StopId,
    pub display_name: String,
    pub address: Option<String>,
    /// Not every customer has been geocoded
    pub location: Option<Location>,
    pub order_summary: String,
    pub amount_due: f64,
}

impl Stop {
    pub fn has_location(&self) -> bool {
        self.location.is_some()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<CustomerRecord> for Stop {
    fn from(record: CustomerRecord) -> Self {
        let location = record.lat_lng.as_deref().and_then(Location::parse_pair);
        Self {
            id: StopId::new(record.mobile_number),
            display_name: non_blank(record.name).unwrap_or_else(|| "Unknown".to_string()),
            address: non_blank(record.address),
            location,
            order_summary: non_blank(record.order_list).unwrap_or_else(|| "N/A".to_string()),
            amount_due: record
                .price
                .filter(|p| p.is_finite() && *p >= 0.0)
                .unwrap_or(0.0),
        }
    }
}
