//! Reverse-geocoded place data and the topic paths derived from it.

use serde::{Deserialize, Serialize};

use crate::country;
use crate::geocoder::PlaceResult;

/// Granularity of a place topic. Ordered coarse to fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Country = 1,
    State = 2,
    City = 3,
}

impl Precision {
    /// The next coarser level, or `None` below country.
    pub fn coarser(self) -> Option<Self> {
        match self {
            Precision::City => Some(Precision::State),
            Precision::State => Some(Precision::Country),
            Precision::Country => None,
        }
    }
}

/// Place hierarchy for a node's position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceInfo {
    pub country_name: Option<String>,
    pub country_iso2: Option<String>,
    pub country_iso3: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub postal: Option<String>,
    pub address: Option<String>,
}

impl PlaceInfo {
    /// Build place data from a geocoder result.
    ///
    /// The result must name a country (alpha-3). The alpha-3 code is resolved
    /// through the ISO table to fill in the country name and alpha-2 code; an
    /// unknown code keeps only the alpha-3.
    pub fn from_result(result: PlaceResult) -> Option<Self> {
        let iso3 = non_empty(result.country_iso3)?;
        let record = country::lookup_alpha3(&iso3);

        Some(Self {
            country_name: record.map(|c| c.name.to_string()),
            country_iso2: record.map(|c| c.alpha2.to_string()),
            country_iso3: Some(iso3),
            state: non_empty(result.state),
            city: non_empty(result.city),
            neighborhood: non_empty(result.neighborhood),
            postal: non_empty(result.postal),
            address: non_empty(result.address),
        })
    }

    /// Country segment: alpha-2 when known, else alpha-3.
    pub fn country_code(&self) -> Option<&str> {
        self.country_iso2
            .as_deref()
            .or(self.country_iso3.as_deref())
            .filter(|code| !code.is_empty())
    }

    /// Topic path at exactly `precision`.
    ///
    /// `CC`, `CC/state`, or `CC/state/city` (city lower-cased). `None` if any
    /// field needed at this precision or a coarser one is missing.
    pub fn topic(&self, precision: Precision) -> Option<String> {
        let mut path = vec![self.country_code()?.to_string()];

        if precision >= Precision::State {
            path.push(present(&self.state)?.to_string());
        }
        if precision >= Precision::City {
            path.push(present(&self.city)?.to_lowercase());
        }

        Some(path.join("/"))
    }

    /// The finest topic available at or below `max_precision`.
    pub fn most_precise_topic(&self, max_precision: Precision) -> Option<String> {
        let mut current = Some(max_precision);
        while let Some(precision) = current {
            if let Some(topic) = self.topic(precision) {
                return Some(topic);
            }
            current = precision.coarser();
        }
        None
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
