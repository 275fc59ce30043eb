//! The token endpoint response
//!
//! An [`AccessTokenEnvelope`] holds the values returned by the token
//! endpoint of an authorization server. If the response carries an
//! `id_token`, it is parsed into an [`IdentityToken`] when the envelope is
//! built, but it is not verified. Verification is the job of an
//! [`IdTokenVerifier`][crate::IdTokenVerifier].

use std::{convert::TryFrom, fmt};

use aliri::Jwt;
use aliri_braid::braid;
use aliri_clock::{Clock, System, UnixTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{error, IdentityToken};

/// `expires` values at or below this instant are taken to be relative
///
/// This is the publication date of the OAuth 2.0 draft.
const EXPIRATION_TIMESTAMP_FLOOR: u64 = 1_349_067_600;

const ACCESS_TOKEN: &str = "access_token";
const REFRESH_TOKEN: &str = "refresh_token";
const EXPIRES_IN: &str = "expires_in";
const EXPIRES: &str = "expires";
const RESOURCE_OWNER_ID: &str = "resource_owner_id";
const ID_TOKEN: &str = "id_token";

macro_rules! redacted {
    ($ty:ty: $label:literal, $reveal:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    f.write_str("\"")?;
                    reveal_prefix(self.as_str(), &mut *f, $reveal)?;
                    f.write_str("\"")
                } else {
                    f.write_str(concat!("***", $label, "***"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    reveal_prefix(self.as_str(), &mut *f, usize::MAX)
                } else {
                    f.write_str(concat!("***", $label, "***"))
                }
            }
        }
    };
}

/// Writes at most `width` (or `default_len`) characters of a secret,
/// marking a truncation with an ellipsis
fn reveal_prefix(secret: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let max_len = f.width().unwrap_or(default_len);
    if max_len <= 1 {
        return f.write_str("…");
    }

    match secret.char_indices().nth(max_len - 1) {
        Some((idx, _)) if secret[idx..].chars().nth(1).is_some() => {
            f.write_str(&secret[..idx])?;
            f.write_str("…")
        }
        _ => f.write_str(secret),
    }
}

/// An OAuth2 access token
///
/// Formatting hides the token unless the alternate flag is used. With the
/// alternate flag, `Debug` reveals a short prefix and `Display` reveals
/// the whole token, unless limited by a width.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ref_doc = "A borrowed reference to an [`AccessToken`]"
)]
pub struct AccessToken;

redacted!(AccessTokenRef: "ACCESS TOKEN", 15);

/// An OAuth2 refresh token
///
/// Formatted in the same guarded manner as an [`AccessToken`].
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ref_doc = "A borrowed reference to a [`RefreshToken`]"
)]
pub struct RefreshToken;

redacted!(RefreshTokenRef: "REFRESH TOKEN", 5);

/// The values returned by a token endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct AccessTokenEnvelope {
    access_token: AccessToken,
    refresh_token: Option<RefreshToken>,
    expires: Option<UnixTime>,
    resource_owner_id: Option<String>,
    values: Map<String, Value>,
    id_token: Option<IdentityToken>,
}

impl AccessTokenEnvelope {
    /// Builds an envelope from a token endpoint response, using the system
    /// clock to resolve relative expiry
    ///
    /// # Errors
    ///
    /// Returns an error if the response lacks an access token, if a known
    /// value has the wrong type, or if the `id_token` is malformed.
    pub fn from_response(
        response: Map<String, Value>,
    ) -> Result<Self, error::InvalidTokenResponse> {
        Self::from_response_with_clock(response, &System)
    }

    /// Builds an envelope from a token endpoint response, using the given
    /// clock to resolve relative expiry
    ///
    /// # Errors
    ///
    /// Returns an error if the response lacks an access token, if a known
    /// value has the wrong type, or if the `id_token` is malformed.
    pub fn from_response_with_clock<C: Clock>(
        mut response: Map<String, Value>,
        clock: &C,
    ) -> Result<Self, error::InvalidTokenResponse> {
        let access_token = match response.remove(ACCESS_TOKEN) {
            Some(Value::String(s)) if !s.is_empty() => AccessToken::new(s),
            Some(Value::String(_)) | Some(Value::Null) | None => {
                return Err(error::InvalidTokenResponse::MissingAccessToken)
            }
            Some(_) => return Err(invalid_field(ACCESS_TOKEN)),
        };

        let refresh_token = optional_string(response.remove(REFRESH_TOKEN), REFRESH_TOKEN)?
            .map(RefreshToken::new);

        let resource_owner_id = match response.remove(RESOURCE_OWNER_ID) {
            Some(Value::Number(n)) => Some(n.to_string()),
            other => optional_string(other, RESOURCE_OWNER_ID)?,
        };

        let now = clock.now();
        let expires_in = response.remove(EXPIRES_IN);
        let expires = response.remove(EXPIRES);

        let expires = match expires_in {
            Some(v) if !v.is_null() => {
                match seconds(&v).ok_or_else(|| invalid_field(EXPIRES_IN))? {
                    0 => None,
                    secs => Some(offset(now, secs)),
                }
            }
            _ => match expires.as_ref().filter(|v| !v.is_null()).map(seconds) {
                Some(Some(0)) | None => None,
                Some(Some(secs)) if secs <= EXPIRATION_TIMESTAMP_FLOOR as i64 => {
                    Some(offset(now, secs))
                }
                Some(Some(secs)) => Some(UnixTime(secs.unsigned_abs())),
                Some(None) => return Err(invalid_field(EXPIRES)),
            },
        };

        let id_token = optional_string(response.remove(ID_TOKEN), ID_TOKEN)?
            .map(|s| IdentityToken::parse(Jwt::new(s)))
            .transpose()?;

        Ok(Self {
            access_token,
            refresh_token,
            expires,
            resource_owner_id,
            values: response,
            id_token,
        })
    }

    /// The access token
    #[must_use]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// The refresh token, if one was issued
    #[must_use]
    pub fn refresh_token(&self) -> Option<&RefreshTokenRef> {
        self.refresh_token.as_deref()
    }

    /// The instant the access token expires, if known
    #[must_use]
    pub fn expires(&self) -> Option<UnixTime> {
        self.expires
    }

    /// The identifier of the resource owner, if provided
    #[must_use]
    pub fn resource_owner_id(&self) -> Option<&str> {
        self.resource_owner_id.as_deref()
    }

    /// All other values of the response, such as `token_type` and `scope`
    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// A single pass-through value
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The parsed ID token, if the response carried one
    #[must_use]
    pub fn id_token(&self) -> Option<&IdentityToken> {
        self.id_token.as_ref()
    }

    /// Whether the access token has expired according to the system clock
    ///
    /// Returns `None` when the expiry is unknown.
    #[must_use]
    pub fn has_expired(&self) -> Option<bool> {
        self.has_expired_with_clock(&System)
    }

    /// Whether the access token has expired according to the given clock
    ///
    /// Returns `None` when the expiry is unknown.
    #[must_use]
    pub fn has_expired_with_clock<C: Clock>(&self, clock: &C) -> Option<bool> {
        self.expires.map(|exp| exp <= clock.now())
    }

    /// Reconstructs the response, with expiry given as an absolute `expires`
    #[must_use]
    pub fn to_response(&self) -> Map<String, Value> {
        let mut response = self.values.clone();

        response.insert(
            ACCESS_TOKEN.to_owned(),
            Value::String(self.access_token.as_str().to_owned()),
        );

        if let Some(refresh_token) = &self.refresh_token {
            response.insert(
                REFRESH_TOKEN.to_owned(),
                Value::String(refresh_token.as_str().to_owned()),
            );
        }

        if let Some(expires) = self.expires {
            response.insert(EXPIRES.to_owned(), Value::from(expires.0));
        }

        if let Some(resource_owner_id) = &self.resource_owner_id {
            response.insert(
                RESOURCE_OWNER_ID.to_owned(),
                Value::String(resource_owner_id.clone()),
            );
        }

        if let Some(id_token) = &self.id_token {
            response.insert(
                ID_TOKEN.to_owned(),
                Value::String(id_token.as_jwt().as_str().to_owned()),
            );
        }

        response
    }
}

impl TryFrom<Map<String, Value>> for AccessTokenEnvelope {
    type Error = error::InvalidTokenResponse;

    fn try_from(response: Map<String, Value>) -> Result<Self, Self::Error> {
        Self::from_response(response)
    }
}

impl TryFrom<Value> for AccessTokenEnvelope {
    type Error = error::InvalidTokenResponse;

    fn try_from(response: Value) -> Result<Self, Self::Error> {
        match response {
            Value::Object(map) => Self::from_response(map),
            _ => Err(error::InvalidTokenResponse::NotAnObject),
        }
    }
}

impl From<AccessTokenEnvelope> for Map<String, Value> {
    fn from(envelope: AccessTokenEnvelope) -> Self {
        envelope.to_response()
    }
}

const fn invalid_field(field: &'static str) -> error::InvalidTokenResponse {
    error::InvalidTokenResponse::InvalidField { field }
}

fn optional_string(
    value: Option<Value>,
    field: &'static str,
) -> Result<Option<String>, error::InvalidTokenResponse> {
    match value {
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(invalid_field(field)),
    }
}

/// Reads a whole number of seconds from an integer or a numeric string
fn seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn offset(now: UnixTime, secs: i64) -> UnixTime {
    if secs >= 0 {
        UnixTime(now.0.saturating_add(secs.unsigned_abs()))
    } else {
        UnixTime(now.0.saturating_sub(secs.unsigned_abs()))
    }
}
