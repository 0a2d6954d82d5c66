//! Country lookup against a local MaxMind database.
//!
//! Entirely optional: when the database file is absent at startup the
//! engine runs without country enrichment.

use std::net::IpAddr;
use std::path::Path;

use maxminddb::{geoip2, Reader};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("failed to open geoip database: {0}")]
    Open(#[source] maxminddb::MaxMindDbError),

    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("geoip lookup failed: {0}")]
    Lookup(#[source] maxminddb::MaxMindDbError),
}

/// Country resolution for a single IP. Both fields are empty when the
/// database has no record for the address — that is not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Country {
    /// ISO-3166 alpha-2 code, e.g. "DE".
    pub iso_code: String,
    /// English display name, e.g. "Germany".
    pub name: String,
}

/// In-process reader over an immutable on-disk MMDB file.
pub struct GeoIp {
    reader: Reader<Vec<u8>>,
}

impl GeoIp {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GeoError> {
        let reader = Reader::open_readfile(path).map_err(GeoError::Open)?;
        Ok(Self { reader })
    }

    /// Resolve an IP literal to its country.
    pub fn lookup(&self, ip_str: &str) -> Result<Country, GeoError> {
        let ip: IpAddr = ip_str
            .parse()
            .map_err(|_| GeoError::InvalidAddress(ip_str.to_string()))?;

        let city: Option<geoip2::City> = self.reader.lookup(ip).map_err(GeoError::Lookup)?;

        let Some(city) = city else {
            return Ok(Country::default());
        };

        let Some(country) = city.country else {
            return Ok(Country::default());
        };

        Ok(Country {
            iso_code: country.iso_code.map(String::from).unwrap_or_default(),
            name: country
                .names
                .and_then(|names| names.get("en").copied())
                .map(String::from)
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_fails_on_missing_file() {
        assert!(matches!(
            GeoIp::open("definitely/not/here.mmdb"),
            Err(GeoError::Open(_))
        ));
    }

    #[test]
    fn country_default_is_empty() {
        let country = Country::default();
        assert!(country.iso_code.is_empty());
        assert!(country.name.is_empty());
    }
}
