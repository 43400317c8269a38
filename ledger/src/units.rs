//! # Native Amounts
//!
//! Custodied value is tracked in the smallest native denomination as a
//! `u128`. Humans (and config files) speak in whole units with up to
//! [`NATIVE_DECIMALS`] fractional digits, so `"1.5"` is
//! `1_500_000_000_000_000_000` base units.

use thiserror::Error;

use crate::config::NATIVE_DECIMALS;

/// An amount of native asset, or of an external token, in base units.
pub type Amount = u128;

/// Identifier of an item on an external non-fungible contract.
pub type TokenId = u128;

/// Number of base units in one whole native unit.
pub const ONE_UNIT: Amount = 10u128.pow(NATIVE_DECIMALS);

/// Errors produced when parsing a decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    /// The input is empty or contains something other than digits and one dot.
    #[error("malformed amount: '{0}'")]
    Malformed(String),

    /// More fractional digits than the native precision supports.
    #[error("too many decimal places in '{input}': at most {max} allowed")]
    TooPrecise {
        /// The rejected input.
        input: String,
        /// Maximum number of fractional digits.
        max: u32,
    },

    /// The value does not fit in a `u128`.
    #[error("amount overflow: '{0}'")]
    Overflow(String),
}

/// Parses a decimal string such as `"1000"`, `"0.001"` or `"1.0"` into base units.
pub fn parse_units(input: &str) -> Result<Amount, UnitsError> {
    let s = input.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };

    let digits_only = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !digits_only(whole) || !digits_only(frac) {
        return Err(UnitsError::Malformed(input.to_string()));
    }
    if frac.len() > NATIVE_DECIMALS as usize {
        return Err(UnitsError::TooPrecise {
            input: input.to_string(),
            max: NATIVE_DECIMALS,
        });
    }

    let overflow = || UnitsError::Overflow(input.to_string());

    let whole_value: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };

    let frac_value: Amount = if frac.is_empty() {
        0
    } else {
        let scale = 10u128.pow(NATIVE_DECIMALS - frac.len() as u32);
        let raw: Amount = frac.parse().map_err(|_| overflow())?;
        raw * scale
    };

    whole_value
        .checked_mul(ONE_UNIT)
        .and_then(|w| w.checked_add(frac_value))
        .ok_or_else(overflow)
}

/// Formats base units as a decimal string with trailing zeros trimmed,
/// always keeping at least one fractional digit (`1.0`, `0.001`).
pub fn format_units(amount: Amount) -> String {
    let whole = amount / ONE_UNIT;
    let frac = amount % ONE_UNIT;
    let mut frac_str = format!("{:0width$}", frac, width = NATIVE_DECIMALS as usize);
    while frac_str.len() > 1 && frac_str.ends_with('0') {
        frac_str.pop();
    }
    format!("{whole}.{frac_str}")
}

/// Serde adapter storing an [`Amount`] as a human decimal string.
pub mod as_units {
    use super::{format_units, parse_units, Amount};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_units(*amount))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_units(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter storing a `u128` as a plain decimal integer string.
///
/// Used for token ids and raw external token amounts, which have no
/// native decimal scaling.
pub mod as_integer {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.trim().parse().map_err(serde::de::Error::custom)
    }
}

/// [`as_integer`] for the values of an ordered map.
pub mod as_integer_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<K, S>(map: &BTreeMap<K, u128>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        S: Serializer,
    {
        serializer.collect_map(map.iter().map(|(k, v)| (k, v.to_string())))
    }

    pub fn deserialize<'de, K, D>(deserializer: D) -> Result<BTreeMap<K, u128>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        D: Deserializer<'de>,
    {
        BTreeMap::<K, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, v)| {
                v.trim()
                    .parse()
                    .map(|n| (k, n))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
