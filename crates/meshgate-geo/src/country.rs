//! ISO 3166-1 country lookup.

use isocountry::CountryCode;

/// A country as known to the ISO 3166-1 table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountryRecord {
    pub name: &'static str,
    pub alpha2: &'static str,
    pub alpha3: &'static str,
}

/// Look up a country by its alpha-3 code (case-insensitive).
pub fn lookup_alpha3(code: &str) -> Option<CountryRecord> {
    CountryCode::for_alpha3(&code.trim().to_ascii_uppercase())
        .ok()
        .map(|country| CountryRecord {
            name: country.name(),
            alpha2: country.alpha2(),
            alpha3: country.alpha3(),
        })
}
