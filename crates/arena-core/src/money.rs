//! Money is carried as integer minor units (cents) everywhere inside the system and
//! exposed on the wire as a decimal number of major units, e.g. `25` or `9.99`.
//!
//! Use with serde: `#[serde(with = "arena_core::money")] pub price: i64`.

use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

use crate::CoreError;

const MINOR_PER_MAJOR: f64 = 100.0;

/// Converts a wire amount (major units) into minor units, rejecting negative,
/// non-finite and sub-cent values.
pub fn to_minor_units(amount: f64) -> Result<i64, CoreError> {
    if !amount.is_finite() {
        return Err(CoreError::InvalidAmount(format!("{} is not a number", amount)));
    }
    if amount < 0.0 {
        return Err(CoreError::InvalidAmount(format!(
            "{} must not be negative",
            amount
        )));
    }
    let scaled = amount * MINOR_PER_MAJOR;
    let rounded = scaled.round();
    if (scaled - rounded).abs() > 1e-6 {
        return Err(CoreError::InvalidAmount(format!(
            "{} has more than two decimal places",
            amount
        )));
    }
    if rounded > i64::MAX as f64 {
        return Err(CoreError::InvalidAmount(format!("{} is too large", amount)));
    }
    Ok(rounded as i64)
}

pub fn to_major_units(minor: i64) -> f64 {
    minor as f64 / MINOR_PER_MAJOR
}

pub fn serialize<S>(minor: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(to_major_units(*minor))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let amount = f64::deserialize(deserializer)?;
    to_minor_units(amount).map_err(D::Error::custom)
}

pub mod option {
    use super::*;

    pub fn serialize<S>(minor: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match minor {
            Some(value) => serializer.serialize_some(&to_major_units(*value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer)?
            .map(to_minor_units)
            .transpose()
            .map_err(D::Error::custom)
    }
}
