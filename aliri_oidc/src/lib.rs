//! OpenID Connect ID token verification for relying parties
//!
//! After a relying party redeems an authorization code at the token
//! endpoint, the response carries an `id_token` alongside the access
//! token. This crate checks that ID token before its claims are trusted:
//! the signature must verify against one of the provider keys, and the
//! claims (`iss`, `aud`, `exp`, `iat`, `nbf`, `sub`, and optionally
//! `nonce`, `azp`, or `jti`) must match what the relying party expects.
//!
//! The claim checks are performed by a [`ValidatorChain`], an ordered set
//! of per-claim [`Validator`]s. Every failing claim contributes a message
//! to the [`ClaimsReport`] carried by a rejection, so a caller can see all
//! of the reasons a token was refused at once.
//!
//! # Feature flags
//!
//! The `hmac` and `rsa` features are enabled by default and forward to
//! the corresponding `aliri` algorithm families. `ec` adds the elliptic
//! curve algorithms. `pem` allows RSA public keys to be configured as PEM
//! documents, and requires OpenSSL.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod claims;
pub mod config;
pub mod discovery;
pub mod envelope;
pub mod error;
mod id_token;
pub mod keys;
pub mod validator;
mod verifier;

pub use claims::{ClaimName, ClaimNameRef, ClaimValue, Claims, ExpectedClaims};
pub use config::{ClientId, ClientIdRef, Nonce, NonceRef, ProviderConfig, Scope, ScopeRef};
pub use discovery::ProviderMetadata;
pub use envelope::{
    AccessToken, AccessTokenEnvelope, AccessTokenRef, RefreshToken, RefreshTokenRef,
};
pub use id_token::IdentityToken;
pub use keys::KeySource;
pub use validator::{
    ClaimRule, ClaimsReport, EqualsTo, EqualsToOrContains, GreaterOrEqualsTo, LesserOrEqualsTo,
    NotEmpty, Validator, ValidatorChain, Verdict,
};
pub use verifier::{default_validator_chain, IdTokenVerifier};
