// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Arbitrary-precision signed integer carried on the wire as a tagged decimal string.
//!
//! [`Numeric`] serializes to a single-entry marker object (see [`NUMERIC_MARKER`]) so the
//! [`crate::codec`] can locate every numeric in a value tree and emit a tag annotation for it.
//! Deserialization accepts the marker object, a decimal or `0x` hex string, or a JSON integer.

use std::{fmt::Display, str::FromStr};

use num_bigint::{BigInt, Sign};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, MapAccess, Visitor},
    ser::SerializeMap,
};

/// Key of the marker object a [`Numeric`] serializes to.
pub const NUMERIC_MARKER: &str = "$explorer::numeric";

/// Error returned when a string cannot be parsed as a [`Numeric`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Invalid numeric value: '{0}'")]
pub struct ParseNumericError(pub String);

/// An arbitrary-precision signed integer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Numeric(BigInt);

impl Numeric {
    /// Creates a new [`Numeric`] from a big integer.
    #[must_use]
    pub const fn new(value: BigInt) -> Self {
        Self(value)
    }

    /// Returns zero.
    #[must_use]
    pub fn zero() -> Self {
        Self(BigInt::ZERO)
    }

    /// Returns whether the value is below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0.sign() == Sign::Minus
    }

    /// Returns the absolute value.
    #[must_use]
    pub fn abs(&self) -> Self {
        if self.is_negative() {
            Self(-self.0.clone())
        } else {
            self.clone()
        }
    }

    /// Returns the inner big integer.
    #[must_use]
    pub const fn as_bigint(&self) -> &BigInt {
        &self.0
    }

    /// Consumes the value and returns the inner big integer.
    #[must_use]
    pub fn into_inner(self) -> BigInt {
        self.0
    }
}

impl FromStr for Numeric {
    type Err = ParseNumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let parsed = if let Some(hex) = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            BigInt::parse_bytes(hex.as_bytes(), 16)
        } else if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            BigInt::parse_bytes(digits.as_bytes(), 10)
        } else {
            None
        };

        match parsed {
            Some(value) if negative => Ok(Self(-value)),
            Some(value) => Ok(Self(value)),
            None => Err(ParseNumericError(s.to_string())),
        }
    }
}

impl Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<BigInt> for Numeric {
    fn from(value: BigInt) -> Self {
        Self(value)
    }
}

impl From<i64> for Numeric {
    fn from(value: i64) -> Self {
        Self(BigInt::from(value))
    }
}

impl From<u64> for Numeric {
    fn from(value: u64) -> Self {
        Self(BigInt::from(value))
    }
}

impl From<i128> for Numeric {
    fn from(value: i128) -> Self {
        Self(BigInt::from(value))
    }
}

impl Serialize for Numeric {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(NUMERIC_MARKER, &self.0.to_string())?;
        map.end()
    }
}

struct NumericVisitor;

impl<'de> Visitor<'de> for NumericVisitor {
    type Value = Numeric;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("an integer, a decimal string or a numeric marker object")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Numeric::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Numeric::from(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Numeric::from_str(v).map_err(E::custom)
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let Some((key, value)) = map.next_entry::<String, String>()? else {
            return Err(de::Error::custom("empty numeric marker object"));
        };

        if key != NUMERIC_MARKER {
            return Err(de::Error::unknown_field(&key, &[NUMERIC_MARKER]));
        }

        Numeric::from_str(&value).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Numeric {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(NumericVisitor)
    }
}
