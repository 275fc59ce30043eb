//! The parsed, not yet verified, ID token

use std::{convert::TryFrom, str::FromStr};

use aliri::{
    jwa, jwk,
    jwt::{BasicHeaders, CoreHeaders, HasAlgorithm},
    Jwt, JwtRef,
};
use aliri_base64::{Base64Url, Base64UrlRef};
use aliri_clock::{Clock, System, UnixTime};

use crate::{
    claims::{ClaimValue, Claims},
    error,
};

/// An ID token in compact serialization, split into its parts
///
/// Parsing checks only the structure of the token. Nothing held here is
/// trustworthy until the token has been verified by an
/// [`IdTokenVerifier`][crate::IdTokenVerifier].
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityToken {
    jwt: Jwt,
    message_len: usize,
    header: BasicHeaders,
    claims: Claims,
    signature: Base64Url,
}

impl IdentityToken {
    /// Parses a compact serialized token
    ///
    /// # Errors
    ///
    /// Returns an error if the token does not have exactly three parts, if
    /// any part is not valid base64url, if the header is not a JOSE header
    /// with a known algorithm, or if the payload is not a usable claim set.
    pub fn parse(jwt: Jwt) -> Result<Self, error::MalformedIdToken> {
        let (header, message_len, signature, payload) = {
            let decomposed = jwt.decompose::<BasicHeaders>()?;
            let payload = Base64Url::from_encoded(decomposed.untrusted_payload())
                .map_err(error::malformed_payload)?;

            (
                decomposed.untrusted_header().clone(),
                decomposed.untrusted_message().len(),
                Base64Url::from_raw(decomposed.signature().as_slice()),
                payload,
            )
        };

        let payload: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(payload.as_slice())
                .map_err(|e| error::MalformedClaims::NotAnObject(e.into()))?;

        let claims = Claims::from_json(payload)?;

        Ok(Self {
            jwt,
            message_len,
            header,
            claims,
            signature,
        })
    }

    /// The JOSE header
    pub fn header(&self) -> &BasicHeaders {
        &self.header
    }

    /// The algorithm the token claims to be signed with
    #[must_use]
    pub fn alg(&self) -> jwa::Algorithm {
        self.header.alg()
    }

    /// The ID of the key the token claims to be signed with
    #[must_use]
    pub fn key_id(&self) -> Option<&jwk::KeyIdRef> {
        self.header.kid()
    }

    /// The claim set
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// A single claim
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&ClaimValue> {
        self.claims.get(name)
    }

    /// Whether the token carries the claim
    #[must_use]
    pub fn has_claim(&self, name: &str) -> bool {
        self.claims.contains(name)
    }

    /// The bytes covered by the signature
    ///
    /// This is the encoded header and payload, joined by a `.`.
    #[must_use]
    pub fn signing_input(&self) -> &[u8] {
        &self.jwt.as_str().as_bytes()[..self.message_len]
    }

    /// The raw signature
    #[must_use]
    pub fn signature(&self) -> &Base64UrlRef {
        &self.signature
    }

    /// The token in compact serialization
    #[must_use]
    pub fn as_jwt(&self) -> &JwtRef {
        &self.jwt
    }

    /// Consumes the token, returning the compact serialization
    #[must_use]
    pub fn into_jwt(self) -> Jwt {
        self.jwt
    }

    /// Whether the token has expired according to the system clock
    ///
    /// A token without an `exp` claim never expires.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_with_clock(&System)
    }

    /// Whether the token has expired according to the given clock
    #[must_use]
    pub fn is_expired_with_clock<C: Clock>(&self, clock: &C) -> bool {
        self.is_expired_at(clock.now())
    }

    /// Whether the token has expired at the given time
    ///
    /// The token counts as expired from the instant named by `exp` onward.
    #[must_use]
    pub fn is_expired_at(&self, now: UnixTime) -> bool {
        match self.claims.get("exp") {
            Some(ClaimValue::Timestamp(exp)) => now >= *exp,
            _ => false,
        }
    }
}

impl TryFrom<Jwt> for IdentityToken {
    type Error = error::MalformedIdToken;

    fn try_from(jwt: Jwt) -> Result<Self, Self::Error> {
        Self::parse(jwt)
    }
}

impl FromStr for IdentityToken {
    type Err = error::MalformedIdToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(Jwt::new(s.to_owned()))
    }
}

#[cfg(all(test, feature = "hmac"))]
mod tests {
    use color_eyre::Result;
    use serde_json::json;

    use super::*;
    use crate::test::{self, hmac};

    #[test]
    fn parses_a_signed_token() -> Result<()> {
        let jwt = hmac::token();
        let token = IdentityToken::parse(jwt.clone())?;

        assert_eq!(token.alg(), jwa::Algorithm::HS256);
        assert_eq!(token.key_id(), None);
        assert_eq!(
            token.claim("iss"),
            Some(&ClaimValue::String(test::ISSUER.to_owned()))
        );
        assert_eq!(
            token.claim("aud"),
            Some(&ClaimValue::StringList(vec![test::CLIENT_ID.to_owned()]))
        );
        assert!(token.has_claim("auth_time"));
        assert!(!token.has_claim("nonce"));
        assert_eq!(token.as_jwt(), &*jwt);

        Ok(())
    }

    #[test]
    fn signing_input_is_the_first_two_segments() -> Result<()> {
        let jwt = hmac::token();
        let token: IdentityToken = jwt.as_str().parse()?;

        let (message, signature) = jwt
            .as_str()
            .rsplit_once('.')
            .expect("compact tokens have three parts");

        assert_eq!(token.signing_input(), message.as_bytes());
        assert_eq!(
            token.signature().as_slice(),
            Base64Url::from_encoded(signature)?.as_slice()
        );

        Ok(())
    }

    #[test]
    fn signing_input_verifies_with_the_signing_key() -> Result<()> {
        use aliri::jws::Verifier;

        let token = IdentityToken::parse(hmac::token())?;

        hmac::key().verify(
            token.alg(),
            token.signing_input(),
            token.signature().as_slice(),
        )?;

        Ok(())
    }

    #[test]
    fn rejects_tokens_without_three_parts() {
        assert!("abc.def".parse::<IdentityToken>().is_err());
        assert!("".parse::<IdentityToken>().is_err());
        assert!("a.b.c.d".parse::<IdentityToken>().is_err());
    }

    #[test]
    fn rejects_non_object_payloads() {
        let jwt = Jwt::try_from_parts_with_signature(
            &BasicHeaders::new(jwa::Algorithm::HS256),
            &json!(["not", "claims"]),
            &hmac::key(),
        )
        .expect("signing should succeed");

        let err = IdentityToken::parse(jwt).unwrap_err();
        assert!(matches!(
            err,
            error::MalformedIdToken::Claims(error::MalformedClaims::NotAnObject(_))
        ));
    }

    #[test]
    fn rejects_malformed_time_claims() {
        let jwt = hmac::token_with(json!({ "exp": "soon" }));

        let err = IdentityToken::parse(jwt).unwrap_err();
        assert!(matches!(
            err,
            error::MalformedIdToken::Claims(error::MalformedClaims::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn expiry_follows_the_exp_claim() -> Result<()> {
        let token = IdentityToken::parse(hmac::token())?;
        let exp = UnixTime(test::NOW.0 + 600);

        assert!(!token.is_expired_with_clock(&test::clock()));
        assert!(!token.is_expired_at(UnixTime(exp.0 - 1)));
        assert!(token.is_expired_at(exp));
        assert!(token.is_expired_at(UnixTime(exp.0 + 1)));

        let token = IdentityToken::parse(hmac::token_with(json!({ "exp": null })))?;
        assert!(!token.is_expired_at(UnixTime(u64::MAX)));

        Ok(())
    }
}
