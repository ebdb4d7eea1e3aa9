// ABOUTME: Validated zone names such as "ch-gva-2".
// ABOUTME: Zones are DNS labels because they are spliced into API hostnames.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ZoneError {
    #[error("zone name cannot be empty")]
    Empty,

    #[error("zone name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("zone name cannot start or end with a hyphen")]
    EdgeHyphen,

    #[error("zone name must be lowercase")]
    NotLowercase,

    #[error("invalid character in zone name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Zone(String);

impl Zone {
    pub fn new(value: &str) -> Result<Self, ZoneError> {
        if value.is_empty() {
            return Err(ZoneError::Empty);
        }

        if value.len() > 63 {
            return Err(ZoneError::TooLong);
        }

        if value.starts_with('-') || value.ends_with('-') {
            return Err(ZoneError::EdgeHyphen);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(ZoneError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
                return Err(ZoneError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Zone {
    type Err = ZoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Zone::new(s)
    }
}

impl Serialize for Zone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Zone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Zone::new(&s).map_err(serde::de::Error::custom)
    }
}
