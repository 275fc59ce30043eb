//! OpenID provider metadata, as published at the discovery endpoint
//!
//! Fetching the document is left to the caller. This module only checks
//! that an already retrieved body carries the metadata a relying party
//! depends on.

use std::convert::TryFrom;

use aliri::{
    jwa,
    jwt::{Issuer, IssuerRef},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error;

const REQUIRED_PARAMETERS: &[&str] = &[
    "issuer",
    "authorization_endpoint",
    "token_endpoint",
    "jwks_uri",
];

/// Metadata describing an OpenID provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    issuer: Issuer,
    authorization_endpoint: String,
    token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    userinfo_endpoint: Option<String>,
    jwks_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scopes_supported: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    id_token_signing_alg_values_supported: Vec<String>,
}

impl ProviderMetadata {
    /// Parses a discovery response body
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a JSON object, if any of
    /// `issuer`, `authorization_endpoint`, `token_endpoint`, or `jwks_uri`
    /// is missing, or if a known parameter has the wrong type.
    pub fn from_json(body: &str) -> Result<Self, error::InvalidDiscovery> {
        let value: Value =
            serde_json::from_str(body).map_err(|_| error::InvalidDiscovery::NotJson)?;
        Self::from_value(value)
    }

    /// Interprets an already decoded discovery response
    ///
    /// # Errors
    ///
    /// As for [`from_json`][Self::from_json].
    pub fn from_value(value: Value) -> Result<Self, error::InvalidDiscovery> {
        let object = value.as_object().ok_or(error::InvalidDiscovery::NotJson)?;

        if let Some(missing) = REQUIRED_PARAMETERS
            .iter()
            .copied()
            .find(|&name| object.get(name).map_or(true, Value::is_null))
        {
            return Err(error::InvalidDiscovery::MissingParameter(missing));
        }

        serde_json::from_value(value).map_err(|_| error::InvalidDiscovery::NotJson)
    }

    /// The issuer identifier of the provider
    pub fn issuer(&self) -> &IssuerRef {
        &self.issuer
    }

    /// The authorization endpoint
    pub fn authorization_endpoint(&self) -> &str {
        &self.authorization_endpoint
    }

    /// The token endpoint
    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    /// The user info endpoint, if published
    pub fn userinfo_endpoint(&self) -> Option<&str> {
        self.userinfo_endpoint.as_deref()
    }

    /// The location of the provider's JWKS
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// The scopes the provider supports, if published
    pub fn scopes_supported(&self) -> Option<&[String]> {
        self.scopes_supported.as_deref()
    }

    /// The ID token signing algorithms advertised by the provider
    pub fn id_token_signing_alg_values_supported(&self) -> &[String] {
        &self.id_token_signing_alg_values_supported
    }

    /// Checks that the provider supports every requested scope
    ///
    /// A provider that does not publish its supported scopes is assumed to
    /// support any scope.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unsupported scope.
    pub fn check_scopes<I, S>(&self, scopes: I) -> Result<(), error::InvalidDiscovery>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let supported = match &self.scopes_supported {
            Some(supported) => supported,
            None => return Ok(()),
        };

        for scope in scopes {
            let scope = scope.as_ref();
            if !supported.iter().any(|s| s == scope) {
                return Err(error::InvalidDiscovery::UnsupportedScope(scope.to_owned()));
            }
        }

        Ok(())
    }

    /// The advertised signing algorithms known to this build, in the order
    /// the provider listed them
    pub fn signing_algorithms(&self) -> impl Iterator<Item = jwa::Algorithm> + '_ {
        self.id_token_signing_alg_values_supported
            .iter()
            .filter_map(|alg| jwa::Algorithm::try_from(alg.as_str()).ok())
    }

    /// Whether the provider advertises the algorithm for ID tokens
    #[must_use]
    pub fn supports_signing_algorithm(&self, alg: jwa::Algorithm) -> bool {
        self.signing_algorithms().any(|a| a == alg)
    }

    /// The first advertised signing algorithm known to this build
    #[must_use]
    pub fn preferred_signing_algorithm(&self) -> Option<jwa::Algorithm> {
        self.signing_algorithms().next()
    }
}

impl TryFrom<Value> for ProviderMetadata {
    type Error = error::InvalidDiscovery;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}
