//! Claim names and values as carried by an ID token
//!
//! Claim values are modeled as a closed set of variants rather than as
//! arbitrary JSON. The registered time claims (`exp`, `iat`, `nbf`, and
//! `auth_time`) are always parsed into [`ClaimValue::Timestamp`], and the
//! audience claim is always parsed into a [`ClaimValue::StringList`], even
//! when the issuer sent a single string.

use std::{borrow::Cow, collections::BTreeMap, convert::TryFrom, fmt};

use aliri_braid::braid;
use aliri_clock::UnixTime;
use serde_json::{Map, Value};

use crate::error;

/// The name of a claim
///
/// Claim names must contain at least one non-whitespace character.
#[braid(serde, validator, ref_doc = "A borrowed reference to a [`ClaimName`]")]
pub struct ClaimName;

impl aliri_braid::Validator for ClaimName {
    type Error = error::InvalidClaimName;

    fn validate(raw: &str) -> Result<(), Self::Error> {
        if raw.trim().is_empty() {
            Err(error::invalid_claim_name())
        } else {
            Ok(())
        }
    }
}

const TIME_CLAIMS: &[&str] = &["exp", "iat", "nbf", "auth_time"];

/// A single claim value
#[derive(Clone, Debug, PartialEq)]
pub enum ClaimValue {
    /// An explicit JSON `null`
    Null,

    /// A boolean
    Boolean(bool),

    /// A signed integer
    Integer(i64),

    /// A string
    String(String),

    /// A point in time, as used by the registered time claims
    Timestamp(UnixTime),

    /// A list of strings, as used by the audience claim
    StringList(Vec<String>),

    /// Any other JSON value, such as a float or an object
    Json(Value),
}

impl ClaimValue {
    /// A short name for the kind of value held
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::StringList(_) => "string list",
            Self::Json(_) => "JSON",
        }
    }

    /// Whether the value counts as empty
    ///
    /// `null`, `false`, zero, the empty string, and empty collections are
    /// all empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Boolean(b) => !b,
            Self::Integer(i) => *i == 0,
            Self::String(s) => s.is_empty(),
            Self::Timestamp(t) => t.0 == 0,
            Self::StringList(l) => l.is_empty(),
            Self::Json(v) => match v {
                Value::Null => true,
                Value::Bool(b) => !b,
                Value::Number(n) => n.as_f64() == Some(0.0),
                Value::String(s) => s.is_empty(),
                Value::Array(a) => a.is_empty(),
                Value::Object(o) => o.is_empty(),
            },
        }
    }

    /// The value with timestamps converted into integer epoch seconds
    #[must_use]
    pub fn normalized(&self) -> Cow<'_, ClaimValue> {
        match self {
            Self::Timestamp(t) => {
                Cow::Owned(Self::Integer(i64::try_from(t.0).unwrap_or(i64::MAX)))
            }
            _ => Cow::Borrowed(self),
        }
    }

    /// Converts the value back into JSON
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::String(s) => Value::String(s.clone()),
            Self::Timestamp(t) => Value::from(t.0),
            Self::StringList(l) => Value::from(l.clone()),
            Self::Json(v) => v.clone(),
        }
    }

    fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(b),
            Value::String(s) => Self::String(s),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Json(Value::Number(n)),
            },
            Value::Array(items) if items.iter().all(Value::is_string) => Self::StringList(
                items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            other => Self::Json(other),
        }
    }

    fn timestamp_from_json(name: &str, value: &Value) -> Result<Self, error::InvalidTimestamp> {
        let secs = match value {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(truncate_secs)),
            Value::String(s) => s
                .trim()
                .parse::<u64>()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().and_then(truncate_secs)),
            _ => None,
        };

        secs.map(|s| Self::Timestamp(UnixTime(s)))
            .ok_or_else(|| error::invalid_timestamp(name))
    }

    fn audience_from_json(value: Value) -> Result<Self, error::InvalidAudience> {
        match Self::from_json(value) {
            Self::String(s) => Ok(Self::StringList(vec![s])),
            list @ Self::StringList(_) => Ok(list),
            _ => Err(error::invalid_audience()),
        }
    }
}

fn truncate_secs(f: f64) -> Option<u64> {
    if f.is_finite() && f >= 0.0 && f < u64::MAX as f64 {
        Some(f.trunc() as u64)
    } else {
        None
    }
}

impl fmt::Display for ClaimValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => fmt::Display::fmt(b, f),
            Self::Integer(i) => fmt::Display::fmt(i, f),
            Self::String(s) => f.write_str(s),
            Self::Timestamp(t) => fmt::Display::fmt(&t.0, f),
            Self::StringList(l) => write!(f, "[{}]", l.join(", ")),
            Self::Json(v) => fmt::Display::fmt(v, f),
        }
    }
}

impl From<&'_ str> for ClaimValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for ClaimValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for ClaimValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<bool> for ClaimValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<UnixTime> for ClaimValue {
    fn from(t: UnixTime) -> Self {
        Self::Timestamp(t)
    }
}

impl From<Vec<String>> for ClaimValue {
    fn from(l: Vec<String>) -> Self {
        Self::StringList(l)
    }
}

/// The claims carried in the payload of an ID token
#[derive(Clone, Debug, Default, PartialEq)]
#[must_use]
pub struct Claims {
    values: BTreeMap<String, ClaimValue>,
}

impl Claims {
    /// An empty claim set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a claim set from a decoded JSON payload
    ///
    /// # Errors
    ///
    /// Returns an error if a registered time claim is not a timestamp or
    /// if the audience is not a string or list of strings.
    pub fn from_json(payload: Map<String, Value>) -> Result<Self, error::MalformedClaims> {
        let mut values = BTreeMap::new();

        for (name, value) in payload {
            let claim = if TIME_CLAIMS.contains(&name.as_str()) {
                ClaimValue::timestamp_from_json(&name, &value)?
            } else if name == "aud" {
                ClaimValue::audience_from_json(value)?
            } else {
                ClaimValue::from_json(value)
            };

            values.insert(name, claim);
        }

        Ok(Self { values })
    }

    /// Adds or replaces a claim
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<ClaimValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Gets a claim value by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.values.get(name)
    }

    /// Whether the claim is present
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// The number of claims held
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the claim set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the claims in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClaimValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// The values a single verification attempt expects claims to be checked against
///
/// A value that is absent or [empty][ClaimValue::is_empty] causes the
/// corresponding validator to be skipped.
#[derive(Clone, Debug, Default, PartialEq)]
#[must_use]
pub struct ExpectedClaims {
    values: BTreeMap<ClaimName, ClaimValue>,
}

impl ExpectedClaims {
    /// An empty set of expectations
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expected value for a claim
    pub fn insert(&mut self, claim: ClaimName, value: impl Into<ClaimValue>) {
        self.values.insert(claim, value.into());
    }

    /// Sets the expected value for a claim
    pub fn with(mut self, claim: ClaimName, value: impl Into<ClaimValue>) -> Self {
        self.insert(claim, value);
        self
    }

    /// Gets the expected value for a claim, whether or not it is empty
    #[must_use]
    pub fn get(&self, claim: &ClaimNameRef) -> Option<&ClaimValue> {
        self.values.get(claim)
    }

    /// Gets the expected value for a claim, if it is present and not empty
    #[must_use]
    pub fn usable(&self, claim: &ClaimNameRef) -> Option<&ClaimValue> {
        self.get(claim).filter(|v| !v.is_empty())
    }

    /// Whether the claim has an expected value
    #[must_use]
    pub fn contains(&self, claim: &ClaimNameRef) -> bool {
        self.values.contains_key(claim)
    }

    /// Iterates over the expected values in claim name order
    pub fn iter(&self) -> impl Iterator<Item = (&ClaimNameRef, &ClaimValue)> {
        self.values.iter().map(|(k, v)| (&**k, v))
    }
}
