// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Validates the zone list and rejects blank required strings.

use std::collections::HashSet;

use nonempty::NonEmpty;
use serde::Deserialize;

use crate::types::Zone;

/// Zone list: at least one zone, no repeats. The first is the home zone.
pub fn deserialize_zones<'de, D>(deserializer: D) -> Result<NonEmpty<Zone>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let zones: Vec<Zone> = Vec::deserialize(deserializer)?;

    if let Some(dup) = first_duplicate(&zones) {
        return Err(serde::de::Error::custom(format!(
            "zone {dup} is listed more than once"
        )));
    }

    NonEmpty::from_vec(zones)
        .ok_or_else(|| serde::de::Error::custom("at least one zone is required"))
}

/// First zone that repeats an earlier one.
pub fn first_duplicate<'a>(zones: impl IntoIterator<Item = &'a Zone>) -> Option<&'a Zone> {
    let mut seen = HashSet::new();
    zones.into_iter().find(|zone| !seen.insert(zone.as_str()))
}

pub fn deserialize_non_blank<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    if s.trim().is_empty() {
        return Err(serde::de::Error::custom("value cannot be blank"));
    }
    Ok(s)
}
