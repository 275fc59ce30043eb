//! Common errors

use std::{error::Error as StdError, path::PathBuf};

use thiserror::Error;

use crate::{claims::ClaimName, validator::ClaimsReport};

/// A claim name was empty or consisted only of whitespace
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("claim name must not be empty or whitespace")]
pub struct InvalidClaimName {
    _p: (),
}

pub(crate) const fn invalid_claim_name() -> InvalidClaimName {
    InvalidClaimName { _p: () }
}

impl From<std::convert::Infallible> for InvalidClaimName {
    #[inline(always)]
    fn from(x: std::convert::Infallible) -> Self {
        match x {}
    }
}

/// An invalid OAuth2 scope token
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
pub enum InvalidScope {
    /// The scope token was the empty string
    #[error("scope token cannot be empty")]
    EmptyString,
    /// The scope token contained a byte outside of the allowed set
    #[error("invalid scope token byte at position {position}: 0x{value:02x}")]
    InvalidByte {
        /// The index of the offending byte
        position: usize,
        /// The offending byte
        value: u8,
    },
}

impl From<std::convert::Infallible> for InvalidScope {
    #[inline(always)]
    fn from(x: std::convert::Infallible) -> Self {
        match x {}
    }
}

/// No validator is registered for the requested claim
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("no validator registered for claim '{claim}'")]
pub struct UnknownValidator {
    claim: ClaimName,
}

impl UnknownValidator {
    /// The claim that was requested
    #[must_use]
    pub fn claim(&self) -> &ClaimName {
        &self.claim
    }
}

pub(crate) fn unknown_validator(claim: ClaimName) -> UnknownValidator {
    UnknownValidator { claim }
}

/// A validator was handed a value it is not able to compare
///
/// This indicates a caller error or a token carrying a claim of an
/// unexpected shape, rather than a value that merely failed validation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("{validator} validator for claim '{claim}' cannot compare {kind} values")]
pub struct UnsupportedClaimValue {
    validator: &'static str,
    claim: ClaimName,
    kind: &'static str,
}

impl UnsupportedClaimValue {
    /// The claim governed by the validator
    #[must_use]
    pub fn claim(&self) -> &ClaimName {
        &self.claim
    }

    /// The kind of value that was rejected
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

pub(crate) fn unsupported_claim_value(
    validator: &'static str,
    claim: ClaimName,
    kind: &'static str,
) -> UnsupportedClaimValue {
    UnsupportedClaimValue {
        validator,
        claim,
        kind,
    }
}

/// A registered time claim did not hold a usable timestamp
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("claim '{claim}' must be a non-negative numeric timestamp")]
pub struct InvalidTimestamp {
    claim: String,
}

pub(crate) fn invalid_timestamp(claim: impl Into<String>) -> InvalidTimestamp {
    InvalidTimestamp {
        claim: claim.into(),
    }
}

/// The `aud` claim was neither a string nor a list of strings
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("claim 'aud' must be a string or a list of strings")]
pub struct InvalidAudience {
    _p: (),
}

pub(crate) const fn invalid_audience() -> InvalidAudience {
    InvalidAudience { _p: () }
}

/// The payload of an ID token could not be turned into a claim set
#[derive(Debug, Error)]
pub enum MalformedClaims {
    /// The payload is not a JSON object
    #[error("ID token payload is not a JSON object")]
    NotAnObject(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// A time claim is not a timestamp
    #[error(transparent)]
    InvalidTimestamp(#[from] InvalidTimestamp),

    /// The audience claim has an unexpected shape
    #[error(transparent)]
    InvalidAudience(#[from] InvalidAudience),
}

/// The ID token could not be parsed
///
/// Only the structure of the token is considered here. The signature is
/// checked later by the verifier.
#[derive(Debug, Error)]
pub enum MalformedIdToken {
    /// The compact form or the header could not be decoded
    #[error("malformed ID token")]
    Jwt(#[from] aliri::error::JwtVerifyError),

    /// The payload section is not valid base64url
    #[error("malformed ID token payload")]
    Payload(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// The payload decoded, but the claims are unusable
    #[error(transparent)]
    Claims(#[from] MalformedClaims),
}

pub(crate) fn malformed_payload(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedIdToken {
    MalformedIdToken::Payload(source.into())
}

/// A token endpoint response could not be accepted
#[derive(Debug, Error)]
pub enum InvalidTokenResponse {
    /// The response is not a JSON object
    #[error("token response must be a JSON object")]
    NotAnObject,

    /// The required `access_token` value is absent or empty
    #[error("required option not passed: access_token")]
    MissingAccessToken,

    /// A value has the wrong type
    #[error("'{field}' has an invalid value")]
    InvalidField {
        /// The offending response field
        field: &'static str,
    },

    /// The embedded ID token is malformed
    #[error("invalid id_token in token response")]
    MalformedIdToken(#[from] MalformedIdToken),
}

impl InvalidTokenResponse {
    /// Whether the error is due to a malformed ID token
    #[must_use]
    pub fn is_malformed_id_token(&self) -> bool {
        matches!(self, Self::MalformedIdToken(_))
    }
}

/// An ID token was refused by the verifier
#[derive(Debug, Error)]
pub enum IdTokenRejected {
    /// The token response carried no ID token at all
    #[error("Expected an id_token but did not receive one from the authorization server")]
    MissingIdToken,

    /// None of the candidate keys verified the signature
    #[error("Received an invalid id_token from authorization server")]
    SignatureRejected,

    /// The signature is valid, but one or more claims are not
    ///
    /// The per-claim messages are carried in the report.
    #[error("The id_token did not pass validation")]
    ClaimsRejected(ClaimsReport),

    /// A validator was handed a value it cannot compare
    #[error(transparent)]
    UnsupportedClaimValue(#[from] UnsupportedClaimValue),
}

impl IdTokenRejected {
    /// Whether the token itself was found to be invalid
    ///
    /// This covers a missing token, an unverifiable signature, and
    /// failed claim validation.
    #[must_use]
    pub fn is_invalid_token(&self) -> bool {
        matches!(
            self,
            Self::MissingIdToken | Self::SignatureRejected | Self::ClaimsRejected(_)
        )
    }

    /// Whether the error is due to a signature that could not be verified
    #[must_use]
    pub fn is_signature_rejected(&self) -> bool {
        matches!(self, Self::SignatureRejected)
    }

    /// The claim validation report, if claim validation failed
    #[must_use]
    pub fn claims_report(&self) -> Option<&ClaimsReport> {
        match self {
            Self::ClaimsRejected(report) => Some(report),
            _ => None,
        }
    }
}

/// Key material could not be turned into a usable key
#[derive(Debug, Error)]
#[error("key rejected")]
pub struct KeyRejected {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn key_rejected(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> KeyRejected {
    KeyRejected {
        source: source.into(),
    }
}

/// The provider configuration is unusable
#[derive(Debug, Error)]
pub enum InvalidConfiguration {
    /// A required option was not provided
    #[error("required option not passed: {0}")]
    MissingOption(&'static str),

    /// A key file could not be read
    #[error("unable to read key file '{}'", path.display())]
    UnreadableKey {
        /// The path that was read
        path: PathBuf,

        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Key material was read, but could not be used
    #[error(transparent)]
    KeyRejected(#[from] KeyRejected),

    /// The configured key sources held no keys
    #[error("no public keys found in the configured key material")]
    NoKeys,

    /// A configured scope is not a valid scope token
    #[error(transparent)]
    InvalidScope(#[from] InvalidScope),

    /// Applying discovery metadata failed
    #[error(transparent)]
    Discovery(#[from] InvalidDiscovery),
}

/// A discovery document was unusable
#[derive(Debug, Error)]
pub enum InvalidDiscovery {
    /// The body is not a JSON object
    #[error("Invalid response received from discovery. Expected JSON.")]
    NotJson,

    /// A required metadata parameter is absent
    #[error("Required parameter {0} was not found in discovery response")]
    MissingParameter(&'static str),

    /// A requested scope is not advertised by the provider
    #[error("Scope {0} is not supported by the provider")]
    UnsupportedScope(String),

    /// None of the advertised signing algorithms is supported by this build
    #[error("none of the advertised ID token signing algorithms are supported")]
    NoSupportedAlgorithm,
}
