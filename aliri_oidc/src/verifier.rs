//! ID token verification
//!
//! An [`IdTokenVerifier`] checks the ID token carried in a token endpoint
//! response in two stages:
//!
//! 1. The signature must verify against at least one of the configured
//!    keys, using the configured algorithm. Keys are tried in order, and the
//!    first success ends the search.
//! 2. The claims must pass the [`ValidatorChain`], evaluated against values
//!    derived from the verifier configuration and the current time.
//!
//! ```
//! # #[cfg(feature = "hmac")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use aliri::{jwa, jwt, Jwk};
//! use aliri_base64::Base64Url;
//! use aliri_oidc::{ClientId, IdTokenVerifier};
//!
//! let key = Jwk::from(jwa::Hmac::new(Base64Url::from_raw(b"shared secret".to_vec())))
//!     .with_algorithm(jwa::Algorithm::HS256);
//!
//! let verifier = IdTokenVerifier::new(
//!     vec![key],
//!     jwa::Algorithm::HS256,
//!     jwt::Issuer::from_static("https://server.example.com"),
//!     ClientId::from_static("s6BhdRkqt3"),
//! )
//! .with_nbf_tolerance_secs(30);
//!
//! assert!(verifier
//!     .validator_chain()
//!     .has_validator(&aliri_oidc::ClaimName::from_static("aud")));
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "hmac"))]
//! # fn main() {}
//! ```

use aliri::{
    jwa, jws,
    jwt::{self, Issuer},
    Jwk,
};
use aliri_clock::{Clock, System, UnixTime};

use crate::{
    claims::{ClaimName, ExpectedClaims},
    config::{ClientId, ClientIdRef, NonceRef, ProviderConfig},
    envelope::AccessTokenEnvelope,
    error,
    validator::{
        EqualsTo, EqualsToOrContains, GreaterOrEqualsTo, LesserOrEqualsTo, NotEmpty,
        ValidatorChain,
    },
    IdentityToken,
};

/// The validators applied to every ID token unless replaced
///
/// | Claim | Validator | Required |
/// |---|---|---|
/// | `iat` | [`NotEmpty`] | yes |
/// | `exp` | [`GreaterOrEqualsTo`] | yes |
/// | `iss` | [`EqualsTo`] | yes |
/// | `aud` | [`EqualsToOrContains`] | yes |
/// | `sub` | [`NotEmpty`] | yes |
/// | `nbf` | [`LesserOrEqualsTo`] | no |
/// | `jti` | [`EqualsTo`] | no |
/// | `azp` | [`EqualsTo`] | no |
/// | `nonce` | [`EqualsTo`] | no |
pub fn default_validator_chain() -> ValidatorChain {
    ValidatorChain::new()
        .with_validator(NotEmpty::required(ClaimName::from_static("iat")))
        .with_validator(GreaterOrEqualsTo::required(ClaimName::from_static("exp")))
        .with_validator(EqualsTo::required(ClaimName::from_static("iss")))
        .with_validator(EqualsToOrContains::required(ClaimName::from_static("aud")))
        .with_validator(NotEmpty::required(ClaimName::from_static("sub")))
        .with_validator(LesserOrEqualsTo::optional(ClaimName::from_static("nbf")))
        .with_validator(EqualsTo::optional(ClaimName::from_static("jti")))
        .with_validator(EqualsTo::optional(ClaimName::from_static("azp")))
        .with_validator(EqualsTo::optional(ClaimName::from_static("nonce")))
}

/// Verifies the ID tokens issued by a single OpenID provider to a single client
#[derive(Debug)]
pub struct IdTokenVerifier<K = Jwk> {
    keys: Vec<K>,
    algorithm: jwa::Algorithm,
    issuer: Issuer,
    client_id: ClientId,
    nbf_tolerance_secs: u64,
    chain: ValidatorChain,
}

impl IdTokenVerifier<Jwk> {
    /// Constructs a verifier from provider configuration, using the default
    /// validator chain
    ///
    /// # Errors
    ///
    /// Returns an error if the key material cannot be read or is unusable
    /// with the configured algorithm.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, error::InvalidConfiguration> {
        Self::from_config_with_chain(config, default_validator_chain())
    }

    /// Constructs a verifier from provider configuration, using the given
    /// validator chain
    ///
    /// # Errors
    ///
    /// Returns an error if the key material cannot be read or is unusable
    /// with the configured algorithm.
    pub fn from_config_with_chain(
        config: &ProviderConfig,
        chain: ValidatorChain,
    ) -> Result<Self, error::InvalidConfiguration> {
        let keys = config.load_keys()?;

        tracing::info!(
            issuer = %config.id_token_issuer(),
            client_id = %config.client_id(),
            alg = %config.signing_algorithm(),
            keys = keys.len(),
            "ID token verifier configured"
        );

        Ok(Self::new(
            keys,
            config.signing_algorithm(),
            config.id_token_issuer().to_owned(),
            config.client_id().to_owned(),
        )
        .with_nbf_tolerance_secs(config.nbf_tolerance_secs())
        .with_validator_chain(chain))
    }
}

impl<K> IdTokenVerifier<K>
where
    K: jws::Verifier<Algorithm = jwa::Algorithm>,
{
    /// Constructs a verifier with the default validator chain
    ///
    /// Candidate keys are tried in the order given.
    pub fn new(
        keys: impl IntoIterator<Item = K>,
        algorithm: jwa::Algorithm,
        issuer: Issuer,
        client_id: ClientId,
    ) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            algorithm,
            issuer,
            client_id,
            nbf_tolerance_secs: 0,
            chain: default_validator_chain(),
        }
    }

    /// Allows the `nbf` claim to lie up to the given number of seconds in
    /// the future
    pub fn with_nbf_tolerance_secs(mut self, secs: u64) -> Self {
        self.nbf_tolerance_secs = secs;
        self
    }

    /// Replaces the validator chain
    pub fn with_validator_chain(mut self, chain: ValidatorChain) -> Self {
        self.chain = chain;
        self
    }

    /// The validator chain
    pub fn validator_chain(&self) -> &ValidatorChain {
        &self.chain
    }

    /// The validator chain, for adding or replacing validators
    pub fn validator_chain_mut(&mut self) -> &mut ValidatorChain {
        &mut self.chain
    }

    /// The candidate keys, in trial order
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// The algorithm tokens must be signed with
    #[must_use]
    pub fn algorithm(&self) -> jwa::Algorithm {
        self.algorithm
    }

    /// The expected issuer
    #[must_use]
    pub fn issuer(&self) -> &jwt::IssuerRef {
        &self.issuer
    }

    /// The client ID expected in the audience
    #[must_use]
    pub fn client_id(&self) -> &ClientIdRef {
        &self.client_id
    }

    /// Verifies the ID token in a token endpoint response
    ///
    /// The envelope is handed back unchanged on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the response carries no ID token, if its
    /// signature cannot be verified, or if its claims are invalid.
    pub fn verify(
        &self,
        envelope: AccessTokenEnvelope,
    ) -> Result<AccessTokenEnvelope, error::IdTokenRejected> {
        self.verify_with_clock(envelope, None, &System)
    }

    /// Verifies the ID token in a token endpoint response, additionally
    /// requiring the `nonce` sent in the authentication request
    ///
    /// # Errors
    ///
    /// Returns an error if the response carries no ID token, if its
    /// signature cannot be verified, or if its claims are invalid.
    pub fn verify_with_nonce(
        &self,
        envelope: AccessTokenEnvelope,
        nonce: &NonceRef,
    ) -> Result<AccessTokenEnvelope, error::IdTokenRejected> {
        self.verify_with_clock(envelope, Some(nonce), &System)
    }

    /// Verifies the ID token in a token endpoint response against the
    /// given clock
    ///
    /// # Errors
    ///
    /// Returns an error if the response carries no ID token, if its
    /// signature cannot be verified, or if its claims are invalid.
    pub fn verify_with_clock<C: Clock>(
        &self,
        envelope: AccessTokenEnvelope,
        nonce: Option<&NonceRef>,
        clock: &C,
    ) -> Result<AccessTokenEnvelope, error::IdTokenRejected> {
        let token = envelope.id_token().ok_or_else(|| {
            tracing::warn!("token response carried no ID token");
            error::IdTokenRejected::MissingIdToken
        })?;

        self.verify_id_token_with_clock(token, nonce, clock)?;

        Ok(envelope)
    }

    /// Verifies a parsed ID token
    ///
    /// # Errors
    ///
    /// Returns an error if the signature cannot be verified or if the
    /// claims are invalid.
    pub fn verify_id_token(
        &self,
        token: &IdentityToken,
        nonce: Option<&NonceRef>,
    ) -> Result<(), error::IdTokenRejected> {
        self.verify_id_token_with_clock(token, nonce, &System)
    }

    /// Verifies a parsed ID token against the given clock
    ///
    /// # Errors
    ///
    /// Returns an error if the signature cannot be verified or if the
    /// claims are invalid.
    pub fn verify_id_token_with_clock<C: Clock>(
        &self,
        token: &IdentityToken,
        nonce: Option<&NonceRef>,
        clock: &C,
    ) -> Result<(), error::IdTokenRejected> {
        self.verify_signature(token)?;

        let expected = self.expected_claims(token, nonce, clock.now());
        let report = self.chain.validate(&expected, token.claims())?;

        if report.is_valid() {
            Ok(())
        } else {
            tracing::warn!(
                failed_claims = report.messages().len(),
                "ID token did not pass claim validation"
            );
            Err(error::IdTokenRejected::ClaimsRejected(report))
        }
    }

    fn verify_signature(&self, token: &IdentityToken) -> Result<(), error::IdTokenRejected> {
        let alg = token.alg();
        if alg != self.algorithm {
            tracing::warn!(
                %alg,
                expected = %self.algorithm,
                "ID token signed with an unexpected algorithm"
            );
            return Err(error::IdTokenRejected::SignatureRejected);
        }

        for (idx, key) in self.keys.iter().enumerate() {
            if !key.can_verify(alg) {
                tracing::debug!(key = idx, %alg, "key cannot verify algorithm");
                continue;
            }

            match key.verify(alg, token.signing_input(), token.signature().as_slice()) {
                Ok(()) => {
                    tracing::debug!(key = idx, %alg, "ID token signature verified");
                    return Ok(());
                }
                Err(err) => {
                    tracing::debug!(
                        key = idx,
                        %alg,
                        error = %err,
                        "key did not verify ID token signature"
                    );
                }
            }
        }

        tracing::warn!(
            keys = self.keys.len(),
            "no configured key verified the ID token signature"
        );
        Err(error::IdTokenRejected::SignatureRejected)
    }

    /// The values the claims of the given token are validated against
    ///
    /// `exp`, `iat`, and `auth_time` are expected relative to `now`, and
    /// `nbf` relative to `now` plus the configured tolerance. `azp` is only
    /// expected when the token carries it, and `nonce` only when supplied.
    pub fn expected_claims(
        &self,
        token: &IdentityToken,
        nonce: Option<&NonceRef>,
        now: UnixTime,
    ) -> ExpectedClaims {
        let mut expected = ExpectedClaims::new()
            .with(ClaimName::from_static("iss"), self.issuer.as_str())
            .with(ClaimName::from_static("exp"), now)
            .with(ClaimName::from_static("auth_time"), now)
            .with(ClaimName::from_static("iat"), now)
            .with(
                ClaimName::from_static("nbf"),
                UnixTime(now.0.saturating_add(self.nbf_tolerance_secs)),
            )
            .with(ClaimName::from_static("aud"), self.client_id.as_str());

        if token.has_claim("azp") {
            expected.insert(ClaimName::from_static("azp"), self.client_id.as_str());
        }

        if let Some(nonce) = nonce {
            expected.insert(ClaimName::from_static("nonce"), nonce.as_str());
        }

        expected
    }
}
